// Viewport capture for the active game tab.
//
// Strategy:
//   1. check_eligibility() validates the tracked active-tab URL.
//   2. The headless capturer spawns a browser with --headless, --screenshot,
//      and --window-size=WxH into a scratch directory.
//   3. The PNG the browser writes is re-encoded as JPEG at the configured
//      quality (default 85) and returned as a raw base64 payload — no
//      data-URI envelope, transport-ready for the inference API.
//
// No retries: every failure maps to CaptureFailure and is surfaced verbatim
// to the panel.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tempfile::TempDir;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::config::CaptureConfig;
use crate::error::CoachError;
use crate::tabs::{check_eligibility, TabTracker};

/// Maximum size of the raw screenshot file (10 MB).
const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

/// Browser binaries to probe, in preference order.
const CANDIDATE_BROWSERS: &[&str] = &["chromium", "chrome", "google-chrome", "chromium-browser"];

/// Produces a still image of a page's visible viewport.
///
/// A seam around the browser spawn so the panel state machine can be tested
/// with a scripted capturer.
#[async_trait]
pub trait Capturer: Send + Sync {
    /// Capture `url` and return the base64 JPEG payload.
    async fn capture(&self, url: &str) -> Result<String, CoachError>;
}

/// Query the active tab, validate eligibility, and capture its viewport.
///
/// This is the whole Capture Adapter contract: `IneligiblePage` off the game
/// domain, `MultiplayerDisabled` on a multiplayer sub-route (in that order,
/// without invoking the capturer), otherwise one capture attempt.
pub async fn capture_active_tab(
    tabs: &TabTracker,
    capturer: &dyn Capturer,
) -> Result<String, CoachError> {
    let url = tabs.active_url().ok_or(CoachError::IneligiblePage)?;
    check_eligibility(Some(&url))?;
    capturer.capture(&url).await
}

// ─── Headless capturer ───────────────────────────────────────────────────────

/// Captures via a headless Chromium-family browser found on PATH.
pub struct HeadlessCapturer {
    config: CaptureConfig,
}

impl HeadlessCapturer {
    pub fn new(config: CaptureConfig) -> Self {
        Self { config }
    }

    /// Detect the first headless-capable browser binary on PATH.
    pub fn detect_browser() -> Option<String> {
        for candidate in CANDIDATE_BROWSERS {
            if which_browser(candidate) {
                debug!(browser = *candidate, "headless browser detected on PATH");
                return Some((*candidate).to_string());
            }
        }
        None
    }
}

#[async_trait]
impl Capturer for HeadlessCapturer {
    async fn capture(&self, url: &str) -> Result<String, CoachError> {
        let browser = Self::detect_browser().ok_or_else(|| {
            CoachError::CaptureFailure(
                "No headless browser found on PATH. Install Chromium or Chrome and ensure \
                 one of these binaries is available: chromium, chrome, google-chrome, \
                 chromium-browser."
                    .to_string(),
            )
        })?;

        // Scratch directory for output isolation; the browser writes
        // `screenshot.png` into the CWD.
        let tmp = TempDir::new()
            .map_err(|e| CoachError::CaptureFailure(format!("scratch dir: {e}")))?;
        let screenshot_path = tmp.path().join("screenshot.png");

        let window_size = format!(
            "{},{}",
            self.config.viewport_width, self.config.viewport_height
        );
        let mut cmd = Command::new(&browser);
        cmd.arg("--headless")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--screenshot")
            .arg(screenshot_path.to_string_lossy().as_ref())
            .arg(format!("--window-size={window_size}"))
            .arg(url)
            .current_dir(tmp.path())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        debug!(browser = %browser, url = %url, "spawning headless browser");

        let mut child = cmd
            .spawn()
            .map_err(|e| CoachError::CaptureFailure(format!("failed to start browser: {e}")))?;

        let wait_result =
            timeout(Duration::from_secs(self.config.timeout_secs), child.wait()).await;

        match wait_result {
            Err(_elapsed) => {
                // Timeout — kill the child to avoid zombie processes.
                let _ = child.kill().await;
                warn!(url = %url, secs = self.config.timeout_secs, "viewport capture timed out");
                return Err(CoachError::CaptureFailure(format!(
                    "capture did not complete within {} seconds",
                    self.config.timeout_secs
                )));
            }
            Ok(Err(e)) => {
                return Err(CoachError::CaptureFailure(format!("browser process: {e}")));
            }
            Ok(Ok(status)) => {
                if !status.success() {
                    warn!(url = %url, status = ?status, "browser exited with non-zero status");
                    // Fall through: a partial screenshot may still have been written.
                }
            }
        }

        if !screenshot_path.exists() {
            return Err(CoachError::CaptureFailure(
                "browser exited but produced no screenshot file".to_string(),
            ));
        }

        encode_jpeg_base64(&screenshot_path, self.config.jpeg_quality)
    }
}

/// Check if a browser binary is available on PATH using `which` semantics.
fn which_browser(binary: &str) -> bool {
    if let Ok(path_var) = std::env::var("PATH") {
        for dir in path_var.split(':') {
            let candidate = Path::new(dir).join(binary);
            if candidate.is_file() {
                return true;
            }
        }
    }
    false
}

/// Read the browser's PNG output, re-encode it as JPEG at `quality`, and
/// return the base64 payload.
fn encode_jpeg_base64(png_path: &Path, quality: u8) -> Result<String, CoachError> {
    let bytes = std::fs::read(png_path)
        .map_err(|e| CoachError::CaptureFailure(format!("could not read screenshot: {e}")))?;
    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(CoachError::CaptureFailure(format!(
            "screenshot is too large ({} bytes)",
            bytes.len()
        )));
    }

    let decoded = image::load_from_memory(&bytes)
        .map_err(|e| CoachError::CaptureFailure(format!("could not decode screenshot: {e}")))?;

    let mut jpeg = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut jpeg, quality);
    encoder
        .encode_image(&image::DynamicImage::ImageRgb8(decoded.to_rgb8()))
        .map_err(|e| CoachError::CaptureFailure(format!("could not encode JPEG: {e}")))?;

    Ok(BASE64.encode(&jpeg))
}
