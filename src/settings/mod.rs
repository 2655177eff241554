//! Persisted panel settings — the Gemini API key and the selected model.
//!
//! Two scalar values in the `settings` table, written only through `set()`
//! and read on every panel action. A save is rejected unless the candidate
//! key survives a live probe against the inference endpoint, so previously
//! stored settings are never clobbered by a bad key.

use anyhow::{bail, Result};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

use crate::gemini::Provider;
use crate::ipc::event::EventBroadcaster;
use crate::storage::Storage;

/// Model used when none has been chosen yet.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Model identifiers the settings page may select between.
pub const SUPPORTED_MODELS: &[&str] = &[
    "gemini-2.5-flash",
    "gemini-2.5-pro",
    "gemini-3-flash-preview",
];

const KEY_API_KEY: &str = "gemini_api_key";
const KEY_MODEL: &str = "selected_model";

/// Read-only snapshot of the stored settings. Call sites hold at most a
/// transient copy; the store owns the persisted state.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// The Gemini API key, if one has been saved.
    pub api_key: Option<String>,
    /// Selected model id; [`DEFAULT_MODEL`] when none was ever saved.
    pub model: String,
}

impl Settings {
    pub fn has_key(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }
}

pub struct SettingsStore {
    storage: Arc<Storage>,
    broadcaster: Arc<EventBroadcaster>,
}

impl SettingsStore {
    pub fn new(storage: Arc<Storage>, broadcaster: Arc<EventBroadcaster>) -> Self {
        Self {
            storage,
            broadcaster,
        }
    }

    pub async fn get(&self) -> Result<Settings> {
        let api_key = self.storage.get_setting(KEY_API_KEY).await?;
        let model = self
            .storage
            .get_setting(KEY_MODEL)
            .await?
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        Ok(Settings { api_key, model })
    }

    /// Validate and persist both settings.
    ///
    /// The key is probed against the live endpoint first; a failed probe (or
    /// an unsupported model id) leaves the stored settings untouched and
    /// reports the failure. On success both values land in one transaction
    /// and `settings.changed` is broadcast when the credential actually
    /// changed, so dependent UI refreshes without polling.
    pub async fn set(&self, provider: &dyn Provider, api_key: &str, model: &str) -> Result<()> {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            bail!("Please enter an API key");
        }
        if !SUPPORTED_MODELS.contains(&model) {
            bail!("Unsupported model: {model}");
        }

        if !provider.probe(api_key).await? {
            bail!("Invalid API key. Please check and try again.");
        }

        let previous = self.get().await?;
        self.storage
            .put_settings(&[(KEY_API_KEY, api_key), (KEY_MODEL, model)])
            .await?;
        info!(model = %model, "settings saved");

        if previous.api_key.as_deref() != Some(api_key) {
            self.broadcaster.broadcast(
                "settings.changed",
                json!({ "hasKey": true, "model": model }),
            );
        }
        Ok(())
    }
}
