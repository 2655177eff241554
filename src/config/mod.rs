use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::error;

const DEFAULT_PORT: u16 = 4800;
const DEFAULT_API_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

// ─── CaptureConfig ───────────────────────────────────────────────────────────

/// Viewport capture configuration (`[capture]` in config.toml).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Viewport width in pixels. Defaults to 1280.
    pub viewport_width: u32,
    /// Viewport height in pixels. Defaults to 720.
    pub viewport_height: u32,
    /// JPEG quality for the captured viewport, 1–100. Defaults to 85.
    pub jpeg_quality: u8,
    /// Capture timeout in seconds. Defaults to 15.
    pub timeout_secs: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            viewport_width: 1280,
            viewport_height: 720,
            jpeg_quality: 85,
            timeout_secs: 15,
        }
    }
}

// ─── DaemonConfig ────────────────────────────────────────────────────────────

/// Resolved daemon configuration.
///
/// Built once at startup from CLI/env flags, `{data_dir}/config.toml`, and
/// built-in defaults; shared read-only across the process.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub port: u16,
    pub data_dir: PathBuf,
    pub log: String,
    /// Bind address for the WebSocket server (COACHD_BIND env var, default: "127.0.0.1").
    pub bind_address: String,
    /// Gemini API base URL (COACHD_API_URL env var). Overridden in tests to
    /// point at a local mock endpoint.
    pub api_base_url: String,
    /// Log output format: "pretty" (default) | "json".
    pub log_format: String,
    /// Viewport capture settings.
    pub capture: CaptureConfig,
}

/// On-disk layer of the config (`{data_dir}/config.toml`). All fields optional.
#[derive(Debug, Default, Deserialize)]
struct TomlConfig {
    /// WebSocket server port (default: 4800).
    port: Option<u16>,
    /// Log level filter string, e.g. "debug", "info,coachd=trace" (default: "info").
    log: Option<String>,
    /// Override the Gemini API base URL.
    api_base_url: Option<String>,
    /// Bind address for the WebSocket server (default: "127.0.0.1").
    bind_address: Option<String>,
    /// Log output format: "pretty" | "json".
    log_format: Option<String>,
    /// Viewport capture settings (`[capture]`).
    capture: Option<CaptureConfig>,
}

fn load_toml(data_dir: &Path) -> Option<TomlConfig> {
    let path = data_dir.join("config.toml");
    let contents = std::fs::read_to_string(&path).ok()?;
    match toml::from_str::<TomlConfig>(&contents) {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            error!(path = %path.display(), err = %e, "failed to parse config.toml — using defaults");
            None
        }
    }
}

impl DaemonConfig {
    /// Build config from CLI/env args + optional TOML file.
    ///
    /// Priority (highest to lowest):
    ///   1. CLI / env — passed as `Some(value)` from clap
    ///   2. TOML file at `{data_dir}/config.toml`
    ///   3. Built-in defaults
    pub fn new(
        port: Option<u16>,
        data_dir: Option<PathBuf>,
        log: Option<String>,
        bind_address: Option<String>,
    ) -> Self {
        let data_dir = data_dir.unwrap_or_else(default_data_dir);

        // Load TOML as the lowest-priority override layer
        let toml = load_toml(&data_dir).unwrap_or_default();

        let port = port.or(toml.port).unwrap_or(DEFAULT_PORT);
        let log = log.or(toml.log).unwrap_or_else(|| "info".to_string());

        let api_base_url = std::env::var("COACHD_API_URL")
            .ok()
            .filter(|s| !s.is_empty())
            .or(toml.api_base_url)
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());

        let bind_address = bind_address
            .or(std::env::var("COACHD_BIND").ok().filter(|s| !s.is_empty()))
            .or(toml.bind_address)
            .unwrap_or_else(default_bind_address);

        let log_format = std::env::var("COACHD_LOG_FORMAT")
            .ok()
            .filter(|s| !s.is_empty())
            .or(toml.log_format)
            .unwrap_or_else(|| "pretty".to_string());

        let capture = toml.capture.unwrap_or_default();

        Self {
            port,
            data_dir,
            log,
            bind_address,
            api_base_url,
            log_format,
            capture,
        }
    }
}

fn default_data_dir() -> PathBuf {
    #[cfg(target_os = "macos")]
    {
        // ~/Library/Application Support/coachd
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join("Library")
                .join("Application Support")
                .join("coachd");
        }
    }
    #[cfg(target_os = "linux")]
    {
        // $XDG_DATA_HOME/coachd or ~/.local/share/coachd
        if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
            return PathBuf::from(xdg).join("coachd");
        }
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join(".local")
                .join("share")
                .join("coachd");
        }
    }
    #[cfg(target_os = "windows")]
    {
        // %APPDATA%\coachd
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata).join("coachd");
        }
    }
    // Fallback
    PathBuf::from(".coachd")
}
