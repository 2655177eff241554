//! Active-tab tracking and page eligibility.
//!
//! The hosting browser reports URL changes through the `tab.navigated` RPC;
//! the tracker keeps only the latest URL. Transitions into and out of the
//! multiplayer sub-route toggle the panel's analyze affordance — gating and
//! hint swapping only, never analysis itself and never cancellation of
//! in-flight work.

use serde::Serialize;
use std::sync::RwLock;

use crate::error::CoachError;

/// Marker for the eligible game domain.
const GAME_DOMAIN: &str = "geoguessr.com";
/// Sub-route marker for multiplayer games, where the coach is disabled.
const MULTIPLAYER_MARKER: &str = "/multiplayer";

/// Hint illustration variant shown in the idle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HintVariant {
    /// "Analyze the current GeoGuessr view"
    Default,
    /// "Disabled on multiplayer games"
    Multiplayer,
}

/// Whether the analyze trigger is currently offered, and which hint goes
/// with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Capability {
    pub analyze_enabled: bool,
    pub hint: HintVariant,
}

impl Capability {
    fn enabled() -> Self {
        Self {
            analyze_enabled: true,
            hint: HintVariant::Default,
        }
    }

    fn multiplayer() -> Self {
        Self {
            analyze_enabled: false,
            hint: HintVariant::Multiplayer,
        }
    }
}

/// Latest reported active-tab URL plus the derived analyze capability.
pub struct TabTracker {
    inner: RwLock<Inner>,
}

struct Inner {
    url: Option<String>,
    capability: Capability,
}

impl Default for TabTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl TabTracker {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                url: None,
                capability: Capability::enabled(),
            }),
        }
    }

    pub fn active_url(&self) -> Option<String> {
        self.inner.read().expect("tab tracker poisoned").url.clone()
    }

    pub fn capability(&self) -> Capability {
        self.inner.read().expect("tab tracker poisoned").capability
    }

    /// Record a navigation. Returns `Some(capability)` when the analyze
    /// affordance changed and clients should be notified.
    ///
    /// A multiplayer URL disables the trigger; a non-multiplayer URL on the
    /// game domain restores it. URLs off the game domain leave the
    /// affordance untouched — the trigger state only moves on game-domain
    /// navigation, matching the side panel's update rules.
    pub fn navigated(&self, url: &str) -> Option<Capability> {
        let mut inner = self.inner.write().expect("tab tracker poisoned");
        inner.url = Some(url.to_string());

        let next = if url.contains(MULTIPLAYER_MARKER) {
            Capability::multiplayer()
        } else if url.contains(GAME_DOMAIN) {
            Capability::enabled()
        } else {
            return None;
        };

        if next == inner.capability {
            return None;
        }
        inner.capability = next;
        Some(next)
    }
}

/// Validate that a URL is an analyzable game page.
///
/// Domain first, then the multiplayer exclusion — so a multiplayer URL on
/// the game domain reports `MultiplayerDisabled`, not `IneligiblePage`.
pub fn check_eligibility(url: Option<&str>) -> Result<(), CoachError> {
    let url = url.ok_or(CoachError::IneligiblePage)?;
    if !url.contains(GAME_DOMAIN) {
        return Err(CoachError::IneligiblePage);
    }
    if url.contains(MULTIPLAYER_MARKER) {
        return Err(CoachError::MultiplayerDisabled);
    }
    Ok(())
}
