//! State-machine properties of the panel: the credential guard, eligibility
//! gating, the chat lifecycle, and the reset invariants. Uses a scripted
//! provider and capturer — no network, no browser spawn.

use async_trait::async_trait;
use coachd::capture::Capturer;
use coachd::error::CoachError;
use coachd::gemini::model::{Alternative, AnalysisResult, ChatTurn, Clue, Role};
use coachd::gemini::Provider;
use coachd::ipc::event::EventBroadcaster;
use coachd::panel::view::StateTag;
use coachd::panel::PanelManager;
use coachd::settings::SettingsStore;
use coachd::storage::Storage;
use coachd::tabs::TabTracker;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::sync::Notify;

// ─── Scripted collaborators ──────────────────────────────────────────────────

struct StubProvider {
    analyze_calls: AtomicUsize,
    chat_calls: AtomicUsize,
    analyze_result: Mutex<Result<AnalysisResult, CoachError>>,
    chat_result: Mutex<Result<String, CoachError>>,
    /// Country of the context block seen by the last chat call.
    seen_context: Mutex<Option<String>>,
    /// History passed (by value) to the last chat call.
    seen_history: Mutex<Vec<ChatTurn>>,
    /// When set, analyze blocks until notified — used to exercise the
    /// in-flight guard.
    gate: Mutex<Option<Arc<Notify>>>,
}

impl StubProvider {
    fn new() -> Self {
        Self {
            analyze_calls: AtomicUsize::new(0),
            chat_calls: AtomicUsize::new(0),
            analyze_result: Mutex::new(Ok(france())),
            chat_result: Mutex::new(Ok("sure".to_string())),
            seen_context: Mutex::new(None),
            seen_history: Mutex::new(Vec::new()),
            gate: Mutex::new(None),
        }
    }

    fn set_analyze_result(&self, result: Result<AnalysisResult, CoachError>) {
        *self.analyze_result.lock().unwrap() = result;
    }

    fn set_chat_result(&self, result: Result<String, CoachError>) {
        *self.chat_result.lock().unwrap() = result;
    }

    fn set_gate(&self, gate: Arc<Notify>) {
        *self.gate.lock().unwrap() = Some(gate);
    }
}

#[async_trait]
impl Provider for StubProvider {
    async fn analyze_image(
        &self,
        _api_key: &str,
        _model: &str,
        _image_base64: &str,
    ) -> Result<AnalysisResult, CoachError> {
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.analyze_calls.fetch_add(1, Ordering::SeqCst);
        self.analyze_result.lock().unwrap().clone()
    }

    async fn chat(
        &self,
        _api_key: &str,
        _model: &str,
        history: &[ChatTurn],
        last_analysis: Option<&AnalysisResult>,
    ) -> Result<String, CoachError> {
        self.chat_calls.fetch_add(1, Ordering::SeqCst);
        *self.seen_context.lock().unwrap() = last_analysis.map(|a| a.country.clone());
        *self.seen_history.lock().unwrap() = history.to_vec();
        self.chat_result.lock().unwrap().clone()
    }

    async fn probe(&self, _api_key: &str) -> Result<bool, CoachError> {
        Ok(true)
    }
}

#[derive(Default)]
struct StubCapturer {
    calls: AtomicUsize,
}

#[async_trait]
impl Capturer for StubCapturer {
    async fn capture(&self, _url: &str) -> Result<String, CoachError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok("c2NyZWVuc2hvdA==".to_string())
    }
}

fn france() -> AnalysisResult {
    AnalysisResult {
        country: "France".to_string(),
        region: None,
        confidence: 82.0,
        clues: vec![Clue {
            kind: "road".to_string(),
            description: "yellow center line".to_string(),
        }],
        alternatives: vec![Alternative {
            country: "Belgium".to_string(),
            confidence: 10.0,
        }],
        meta_tip: "Yellow lines indicate...".to_string(),
    }
}

// ─── Harness ─────────────────────────────────────────────────────────────────

struct Harness {
    panel: Arc<PanelManager>,
    provider: Arc<StubProvider>,
    capturer: Arc<StubCapturer>,
    settings: Arc<SettingsStore>,
    tabs: Arc<TabTracker>,
    _dir: TempDir,
}

/// Build a panel over a fresh settings database, with the active tab already
/// on an eligible game page.
async fn harness() -> Harness {
    let dir = TempDir::new().unwrap();
    let storage = Arc::new(Storage::new(dir.path()).await.unwrap());
    let broadcaster = Arc::new(EventBroadcaster::new());
    let settings = Arc::new(SettingsStore::new(storage, broadcaster.clone()));
    let tabs = Arc::new(TabTracker::new());
    tabs.navigated("https://www.geoguessr.com/game/test");
    let provider = Arc::new(StubProvider::new());
    let capturer = Arc::new(StubCapturer::default());
    let panel = Arc::new(PanelManager::new(
        settings.clone(),
        tabs.clone(),
        provider.clone(),
        capturer.clone(),
        broadcaster,
    ));
    Harness {
        panel,
        provider,
        capturer,
        settings,
        tabs,
        _dir: dir,
    }
}

async fn save_key(h: &Harness) {
    h.settings
        .set(h.provider.as_ref(), "test-key", "gemini-2.5-flash")
        .await
        .unwrap();
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn analyze_without_key_errors_without_invoking_anything() {
    let h = harness().await;

    let view = h.panel.analyze().await.unwrap();
    assert_eq!(view.state, StateTag::Error);
    assert_eq!(
        view.error_message.as_deref(),
        Some("Please set your API key in settings")
    );
    assert!(view.settings_link);
    assert_eq!(h.capturer.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.provider.analyze_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn multiplayer_tab_fails_before_capture() {
    let h = harness().await;
    save_key(&h).await;
    h.tabs.navigated("https://www.geoguessr.com/multiplayer/abc");

    let view = h.panel.analyze().await.unwrap();
    assert_eq!(view.state, StateTag::Error);
    assert_eq!(
        view.error_message.as_deref(),
        Some("Disabled on multiplayer games")
    );
    assert_eq!(h.capturer.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.provider.analyze_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn off_domain_tab_is_ineligible() {
    let h = harness().await;
    save_key(&h).await;
    h.tabs.navigated("https://example.com/maps");

    let view = h.panel.analyze().await.unwrap();
    assert_eq!(view.state, StateTag::Error);
    assert_eq!(view.error_message.as_deref(), Some("Not on a GeoGuessr page"));
}

#[tokio::test]
async fn successful_analysis_renders_result_and_reveals_chat() {
    let h = harness().await;
    save_key(&h).await;

    let view = h.panel.analyze().await.unwrap();
    assert_eq!(view.state, StateTag::Result);
    assert!(view.chat_visible);
    assert!(view.analyze_enabled);

    let result = view.result.unwrap();
    assert_eq!(result.country, "France");
    assert_eq!(result.confidence_pct, "82%");
    assert_eq!(result.confidence_label, "high");
    assert_eq!(result.alternatives_text, "Belgium (10%)");
    assert_eq!(result.clues.len(), 1);
}

#[tokio::test]
async fn provider_failure_renders_its_message() {
    let h = harness().await;
    save_key(&h).await;
    h.provider
        .set_analyze_result(Err(CoachError::Provider("quota exceeded".to_string())));

    let view = h.panel.analyze().await.unwrap();
    assert_eq!(view.state, StateTag::Error);
    assert_eq!(view.error_message.as_deref(), Some("quota exceeded"));
    assert!(!view.settings_link);
}

#[tokio::test]
async fn capture_failure_surfaces_verbatim() {
    let h = harness().await;
    save_key(&h).await;

    struct FailingCapturer;
    #[async_trait]
    impl Capturer for FailingCapturer {
        async fn capture(&self, _url: &str) -> Result<String, CoachError> {
            Err(CoachError::CaptureFailure(
                "browser exited but produced no screenshot file".to_string(),
            ))
        }
    }

    let panel = PanelManager::new(
        h.settings.clone(),
        h.tabs.clone(),
        h.provider.clone(),
        Arc::new(FailingCapturer),
        Arc::new(EventBroadcaster::new()),
    );
    let view = panel.analyze().await.unwrap();
    assert_eq!(view.state, StateTag::Error);
    assert_eq!(
        view.error_message.as_deref(),
        Some("browser exited but produced no screenshot file")
    );
}

#[tokio::test]
async fn new_analysis_clears_the_chat_thread() {
    let h = harness().await;
    save_key(&h).await;

    h.panel.analyze().await.unwrap();
    let view = h.panel.send_chat("was it France?").await.unwrap();
    assert_eq!(view.chat.len(), 2);

    let view = h.panel.analyze().await.unwrap();
    assert!(view.chat.is_empty());
    assert_eq!(view.state, StateTag::Result);

    // The next chat turn starts from a fresh history.
    h.panel.send_chat("and now?").await.unwrap();
    let history = h.provider.seen_history.lock().unwrap().clone();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].content, "and now?");
}

#[tokio::test]
async fn chat_context_always_references_the_latest_analysis() {
    let h = harness().await;
    save_key(&h).await;

    h.panel.analyze().await.unwrap();
    h.panel.send_chat("which country?").await.unwrap();
    assert_eq!(
        h.provider.seen_context.lock().unwrap().as_deref(),
        Some("France")
    );

    let spain = AnalysisResult {
        country: "Spain".to_string(),
        ..france()
    };
    h.provider.set_analyze_result(Ok(spain));
    h.panel.analyze().await.unwrap();
    h.panel.send_chat("still sure?").await.unwrap();
    assert_eq!(
        h.provider.seen_context.lock().unwrap().as_deref(),
        Some("Spain")
    );
}

#[tokio::test]
async fn chat_renders_the_inline_markup_subset() {
    let h = harness().await;
    save_key(&h).await;
    h.panel.analyze().await.unwrap();
    h.provider
        .set_chat_result(Ok("**Yes** - likely:\n- France\n- Belgium".to_string()));

    let view = h.panel.send_chat("sure?").await.unwrap();
    let reply = view.chat.last().unwrap();
    assert_eq!(reply.role, Role::Assistant);
    assert!(!reply.pending);
    assert!(reply.html.contains("<strong>Yes</strong>"));
    assert!(reply.html.contains("<ul><li>France</li><br><li>Belgium</li></ul>"));
}

#[tokio::test]
async fn failed_chat_turn_is_scoped_and_does_not_block_the_next() {
    let h = harness().await;
    save_key(&h).await;
    h.panel.analyze().await.unwrap();

    h.provider
        .set_chat_result(Err(CoachError::Provider("boom".to_string())));
    let view = h.panel.send_chat("first").await.unwrap();
    assert_eq!(view.chat.last().unwrap().html, "Error: boom");
    assert!(view.chat_enabled);

    h.provider.set_chat_result(Ok("recovered".to_string()));
    let view = h.panel.send_chat("second").await.unwrap();
    assert_eq!(view.chat.last().unwrap().html, "recovered");

    // The failed assistant turn was never recorded; both user turns were.
    let history = h.provider.seen_history.lock().unwrap().clone();
    let contents: Vec<_> = history.iter().map(|t| t.content.as_str()).collect();
    assert_eq!(contents, vec!["first", "second"]);
}

#[tokio::test]
async fn whitespace_chat_send_is_a_silent_noop() {
    let h = harness().await;
    save_key(&h).await;
    h.panel.analyze().await.unwrap();

    let view = h.panel.send_chat("   ").await.unwrap();
    assert!(view.chat.is_empty());
    assert!(view.chat_enabled);
    assert_eq!(h.provider.chat_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn chat_without_key_resolves_the_placeholder_to_an_error() {
    let h = harness().await;

    let view = h.panel.send_chat("hello?").await.unwrap();
    assert_eq!(view.chat.len(), 2);
    assert_eq!(
        view.chat.last().unwrap().html,
        "Error: API key not configured"
    );
    assert_eq!(h.provider.chat_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn second_analyze_while_pending_is_rejected_busy() {
    let h = harness().await;
    save_key(&h).await;

    let gate = Arc::new(Notify::new());
    h.provider.set_gate(gate.clone());

    let panel = h.panel.clone();
    let task = tokio::spawn(async move { panel.analyze().await });

    // Wait for the first analyze to reach the loading state.
    loop {
        if h.panel.view().await.state == StateTag::Loading {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    assert!(!h.panel.view().await.analyze_enabled);

    let err = h.panel.analyze().await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<CoachError>(),
        Some(CoachError::Busy)
    ));

    gate.notify_one();
    let view = task.await.unwrap().unwrap();
    assert_eq!(view.state, StateTag::Result);
    assert!(view.analyze_enabled);
}

#[tokio::test]
async fn toggle_hidden_is_cosmetic_and_reversible() {
    let h = harness().await;
    save_key(&h).await;
    h.panel.analyze().await.unwrap();

    let view = h.panel.toggle_hidden().await;
    assert!(view.result_hidden);
    assert_eq!(view.state, StateTag::Result);
    assert!(view.result.is_some());

    let view = h.panel.toggle_hidden().await;
    assert!(!view.result_hidden);
}

#[tokio::test]
async fn open_resets_to_idle() {
    let h = harness().await;
    save_key(&h).await;
    h.panel.analyze().await.unwrap();
    h.panel.send_chat("hi").await.unwrap();
    h.panel.toggle_hidden().await;

    let view = h.panel.open().await;
    assert_eq!(view.state, StateTag::Idle);
    assert!(view.chat.is_empty());
    assert!(!view.chat_visible);
    assert!(!view.result_hidden);
}
