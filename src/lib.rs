pub mod capture;
pub mod config;
pub mod error;
pub mod gemini;
pub mod ipc;
pub mod panel;
pub mod settings;
pub mod storage;
pub mod tabs;

// Re-export auth so main.rs can use coachd::auth directly.
pub use error::CoachError;
pub use ipc::auth;

use std::sync::Arc;

use config::DaemonConfig;
use gemini::Provider;
use ipc::event::EventBroadcaster;
use panel::PanelManager;
use settings::SettingsStore;
use storage::Storage;
use tabs::TabTracker;

/// Shared application state passed to every RPC handler and background task.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<DaemonConfig>,
    pub storage: Arc<Storage>,
    pub broadcaster: Arc<EventBroadcaster>,
    pub settings: Arc<SettingsStore>,
    /// Latest reported active-tab URL + the derived analyze capability.
    pub tabs: Arc<TabTracker>,
    /// The inference provider. Swapped for a scripted stub in tests.
    pub provider: Arc<dyn Provider>,
    /// The one panel session and its orchestration.
    pub panel: Arc<PanelManager>,
    pub started_at: std::time::Instant,
    /// Local WebSocket auth token.  Every new connection must send a
    /// `daemon.auth` RPC with this token before any other method call.
    /// Empty string means auth is disabled (not recommended).
    pub auth_token: String,
}
