//! The panel state machine and its orchestration.
//!
//! `PanelSession` holds all session-scoped mutable UI state as explicit
//! fields with a lifecycle tied to panel open/close. `PanelManager` wires
//! the session to its collaborators and broadcasts a fresh view after every
//! transition.
//!
//! Re-entrancy is prevented by the pending flags mirrored into the view's
//! control-enabled fields; there is no queue and no cancellation. A response
//! that completes after a reset still applies its transition under the
//! session lock — the short-lived session model accepts stale updates.

pub mod view;

use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::capture::{capture_active_tab, Capturer};
use crate::error::CoachError;
use crate::gemini::model::{AnalysisResult, ChatTurn, Role};
use crate::gemini::Provider;
use crate::ipc::event::EventBroadcaster;
use crate::settings::{Settings, SettingsStore};
use crate::tabs::{Capability, TabTracker};
use view::{render_inline_markup, ChatMessageView, PanelView, ResultView, StateTag};

/// Placeholder text shown while a chat reply is pending.
const THINKING: &str = "Thinking...";

/// The four mutually exclusive panel states.
///
/// Entering `Loading` drops the previous result, so the analysis lives
/// inside `Result` and can never outlast the state that displays it.
#[derive(Debug, Clone)]
pub enum PanelState {
    Idle,
    Loading,
    Error {
        message: String,
        settings_link: bool,
    },
    Result(AnalysisResult),
}

/// Session-scoped mutable UI state.
pub struct PanelSession {
    state: PanelState,
    /// Provider-facing history. Append-only between resets; cleared together
    /// with the result whenever a new analysis starts, so chat can never
    /// reference a stale analysis.
    history: Vec<ChatTurn>,
    /// Displayed thread, including the pending placeholder and error turns.
    thread: Vec<ChatMessageView>,
    hidden: bool,
    chat_visible: bool,
    analyze_pending: bool,
    chat_pending: bool,
}

impl Default for PanelSession {
    fn default() -> Self {
        Self::new()
    }
}

impl PanelSession {
    pub fn new() -> Self {
        Self {
            state: PanelState::Idle,
            history: Vec::new(),
            thread: Vec::new(),
            hidden: false,
            chat_visible: false,
            analyze_pending: false,
            chat_pending: false,
        }
    }

    /// Back to the idle baseline. Pending flags survive — they describe
    /// requests that are still in flight, not session data.
    fn reset(&mut self) {
        self.state = PanelState::Idle;
        self.history.clear();
        self.thread.clear();
        self.hidden = false;
        self.chat_visible = false;
    }

    fn last_analysis(&self) -> Option<&AnalysisResult> {
        match &self.state {
            PanelState::Result(analysis) => Some(analysis),
            _ => None,
        }
    }

    /// Enter `Loading`: chat history, thread, and the previous result are
    /// dropped together before anything new is rendered.
    fn begin_analysis(&mut self) {
        self.history.clear();
        self.thread.clear();
        self.chat_visible = false;
        self.state = PanelState::Loading;
        self.analyze_pending = true;
    }

    fn finish_analysis(&mut self, outcome: Result<AnalysisResult, CoachError>) {
        self.analyze_pending = false;
        match outcome {
            Ok(analysis) => {
                self.state = PanelState::Result(analysis);
                self.chat_visible = true;
            }
            Err(err) => self.enter_error(&err),
        }
    }

    fn enter_error(&mut self, err: &CoachError) {
        self.state = PanelState::Error {
            message: err.to_string(),
            settings_link: matches!(err, CoachError::MissingCredential),
        };
    }

    /// Append the user turn and the pending placeholder.
    fn begin_chat(&mut self, text: &str) {
        self.history.push(ChatTurn::user(text));
        self.thread.push(ChatMessageView {
            id: Uuid::new_v4().to_string(),
            role: Role::User,
            html: render_inline_markup(text),
            pending: false,
        });
        self.thread.push(ChatMessageView {
            id: Uuid::new_v4().to_string(),
            role: Role::Assistant,
            html: THINKING.to_string(),
            pending: true,
        });
        self.chat_pending = true;
    }

    /// Resolve the pending placeholder. A failed turn is not appended to the
    /// history — the user's turn stays recorded, nothing is rolled back.
    fn finish_chat(&mut self, outcome: Result<String, CoachError>) {
        self.chat_pending = false;
        match outcome {
            Ok(reply) => {
                if let Some(entry) = self.thread.iter_mut().rev().find(|e| e.pending) {
                    entry.html = render_inline_markup(&reply);
                    entry.pending = false;
                }
                self.history.push(ChatTurn::assistant(reply));
            }
            Err(err) => {
                if let Some(entry) = self.thread.iter_mut().rev().find(|e| e.pending) {
                    entry.html = format!("Error: {err}");
                    entry.pending = false;
                }
            }
        }
    }

    fn toggle_hidden(&mut self) {
        self.hidden = !self.hidden;
    }

    /// Project the session into a render-ready view, total over all four
    /// states.
    pub fn render(&self, capability: Capability) -> PanelView {
        let (state, error_message, settings_link, result) = match &self.state {
            PanelState::Idle => (StateTag::Idle, None, false, None),
            PanelState::Loading => (StateTag::Loading, None, false, None),
            PanelState::Error {
                message,
                settings_link,
            } => (
                StateTag::Error,
                Some(message.clone()),
                *settings_link,
                None,
            ),
            PanelState::Result(analysis) => (
                StateTag::Result,
                None,
                false,
                Some(ResultView::from_analysis(analysis)),
            ),
        };

        PanelView {
            state,
            error_message,
            settings_link,
            result,
            result_hidden: self.hidden,
            chat_visible: self.chat_visible,
            chat: self.thread.clone(),
            analyze_enabled: capability.analyze_enabled && !self.analyze_pending,
            chat_enabled: !self.chat_pending,
            hint: capability.hint,
        }
    }
}

// ─── Orchestration ───────────────────────────────────────────────────────────

/// Owns the one panel session and drives it against the collaborators.
pub struct PanelManager {
    session: Mutex<PanelSession>,
    settings: Arc<SettingsStore>,
    tabs: Arc<TabTracker>,
    provider: Arc<dyn Provider>,
    capturer: Arc<dyn Capturer>,
    broadcaster: Arc<EventBroadcaster>,
}

impl PanelManager {
    pub fn new(
        settings: Arc<SettingsStore>,
        tabs: Arc<TabTracker>,
        provider: Arc<dyn Provider>,
        capturer: Arc<dyn Capturer>,
        broadcaster: Arc<EventBroadcaster>,
    ) -> Self {
        Self {
            session: Mutex::new(PanelSession::new()),
            settings,
            tabs,
            provider,
            capturer,
            broadcaster,
        }
    }

    /// Panel (re)opened — reset to idle and hand the client its first view.
    pub async fn open(&self) -> PanelView {
        let mut session = self.session.lock().await;
        session.reset();
        let view = session.render(self.tabs.capability());
        self.broadcaster.panel_state_changed(&view);
        view
    }

    pub async fn view(&self) -> PanelView {
        let session = self.session.lock().await;
        session.render(self.tabs.capability())
    }

    pub async fn toggle_hidden(&self) -> PanelView {
        let mut session = self.session.lock().await;
        session.toggle_hidden();
        let view = session.render(self.tabs.capability());
        self.broadcaster.panel_state_changed(&view);
        view
    }

    /// One full analyze action: credential guard, chat reset, capture,
    /// inference, terminal transition. Guard failures render as the error
    /// state; only a busy collision is an RPC-level error.
    pub async fn analyze(&self) -> anyhow::Result<PanelView> {
        let settings = {
            let mut session = self.session.lock().await;
            if session.analyze_pending {
                return Err(CoachError::Busy.into());
            }

            let settings = self.settings.get().await?;
            if !settings.has_key() {
                // No key — straight to the error state, nothing is invoked.
                session.enter_error(&CoachError::MissingCredential);
                let view = session.render(self.tabs.capability());
                self.broadcaster.panel_state_changed(&view);
                return Ok(view);
            }

            session.begin_analysis();
            let view = session.render(self.tabs.capability());
            self.broadcaster.panel_state_changed(&view);
            settings
        };

        // Lock released while the capture and the provider call run, so the
        // panel stays responsive (toggles, state queries) during the wait.
        let outcome = self.run_analysis(&settings).await;

        let mut session = self.session.lock().await;
        match &outcome {
            Ok(analysis) => {
                info!(country = %analysis.country, confidence = analysis.confidence, "analysis complete")
            }
            Err(err) => warn!(err = %err, "analysis failed"),
        }
        session.finish_analysis(outcome);
        let view = session.render(self.tabs.capability());
        self.broadcaster.panel_state_changed(&view);
        Ok(view)
    }

    async fn run_analysis(&self, settings: &Settings) -> Result<AnalysisResult, CoachError> {
        let image = capture_active_tab(&self.tabs, self.capturer.as_ref()).await?;
        let api_key = settings.api_key.as_deref().unwrap_or_default();
        self.provider
            .analyze_image(api_key, &settings.model, &image)
            .await
    }

    /// One chat turn. Blank input is a silent no-op; a failed turn resolves
    /// the placeholder to an error string and leaves history otherwise
    /// untouched — subsequent sends are not blocked.
    pub async fn send_chat(&self, text: &str) -> anyhow::Result<PanelView> {
        let trimmed = text.trim().to_string();

        let (settings, history, context) = {
            let mut session = self.session.lock().await;
            if trimmed.is_empty() {
                return Ok(session.render(self.tabs.capability()));
            }
            if session.chat_pending {
                return Err(CoachError::Busy.into());
            }

            let settings = self.settings.get().await?;
            session.begin_chat(&trimmed);
            let view = session.render(self.tabs.capability());
            self.broadcaster.panel_state_changed(&view);

            // History travels by value; the provider never sees the live
            // session.
            (
                settings,
                session.history.clone(),
                session.last_analysis().cloned(),
            )
        };

        let outcome = if !settings.has_key() {
            Err(CoachError::Provider("API key not configured".to_string()))
        } else {
            self.provider
                .chat(
                    settings.api_key.as_deref().unwrap_or_default(),
                    &settings.model,
                    &history,
                    context.as_ref(),
                )
                .await
        };

        let mut session = self.session.lock().await;
        if let Err(err) = &outcome {
            warn!(err = %err, "chat turn failed");
        }
        session.finish_chat(outcome);
        let view = session.render(self.tabs.capability());
        self.broadcaster.panel_state_changed(&view);
        Ok(view)
    }
}
