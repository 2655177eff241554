use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use coachd::{
    auth,
    capture::{Capturer, HeadlessCapturer},
    config::DaemonConfig,
    gemini::{GeminiClient, Provider},
    ipc,
    ipc::event::EventBroadcaster,
    panel::PanelManager,
    settings::SettingsStore,
    storage::Storage,
    tabs::TabTracker,
    AppContext,
};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(
    name = "coachd",
    about = "GeoCoach Host — side-panel coach daemon",
    version
)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// JSON-RPC WebSocket server port
    #[arg(long, env = "COACHD_PORT")]
    port: Option<u16>,

    /// Data directory for settings, config, and the SQLite database
    #[arg(long, env = "COACHD_DATA_DIR")]
    data_dir: Option<std::path::PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "COACHD_LOG")]
    log: Option<String>,

    /// Bind address for the WebSocket server (default: 127.0.0.1)
    #[arg(long, env = "COACHD_BIND")]
    bind_address: Option<String>,

    /// Write logs to this file path (rotated daily). Optional.
    #[arg(long, env = "COACHD_LOG_FILE")]
    log_file: Option<std::path::PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Start the daemon server (default when no subcommand given).
    ///
    /// Runs coachd in the foreground. When invoked with no subcommand, this
    /// is the default.
    ///
    /// Examples:
    ///   coachd serve
    ///   coachd
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    match &args.command {
        Some(Command::Serve) | None => serve(args).await,
    }
}

async fn serve(args: Args) -> Result<()> {
    let config = Arc::new(DaemonConfig::new(
        args.port,
        args.data_dir,
        args.log,
        args.bind_address,
    ));
    let _log_guard = setup_logging(&config.log, args.log_file.as_deref(), &config.log_format);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        data_dir = %config.data_dir.display(),
        "coachd starting"
    );

    let storage = Arc::new(
        Storage::new(&config.data_dir)
            .await
            .context("failed to open settings database")?,
    );
    let broadcaster = Arc::new(EventBroadcaster::new());
    let settings = Arc::new(SettingsStore::new(storage.clone(), broadcaster.clone()));
    let tabs = Arc::new(TabTracker::new());
    let provider: Arc<dyn Provider> = Arc::new(GeminiClient::new(config.api_base_url.clone()));
    let capturer: Arc<dyn Capturer> = Arc::new(HeadlessCapturer::new(config.capture.clone()));

    if HeadlessCapturer::detect_browser().is_none() {
        warn!("no headless browser found on PATH — viewport capture will fail until one is installed");
    }

    let panel = Arc::new(PanelManager::new(
        settings.clone(),
        tabs.clone(),
        provider.clone(),
        capturer,
        broadcaster.clone(),
    ));

    let auth_token = auth::get_or_create_token(&config.data_dir).unwrap_or_else(|e| {
        warn!(err = %e, "could not create auth token — local auth disabled");
        String::new()
    });

    let ctx = Arc::new(AppContext {
        config,
        storage,
        broadcaster,
        settings,
        tabs,
        provider,
        panel,
        started_at: std::time::Instant::now(),
        auth_token,
    });

    ipc::run(ctx).await
}

fn setup_logging(
    log_level: &str,
    log_file: Option<&std::path::Path>,
    log_format: &str,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let use_json = log_format == "json";

    if let Some(path) = log_file {
        let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
        let filename = path
            .file_name()
            .unwrap_or_else(|| std::ffi::OsStr::new("coachd.log"));

        // Ensure the directory exists before tracing-appender tries to open it.
        if let Err(e) = std::fs::create_dir_all(dir) {
            // Fall back to stdout-only — don't panic on a bad log path.
            eprintln!(
                "warn: could not create log directory '{}': {e} — falling back to stdout",
                dir.display()
            );
            if use_json {
                tracing_subscriber::fmt().json().with_env_filter(log_level).init();
            } else {
                tracing_subscriber::fmt().with_env_filter(log_level).compact().init();
            }
            return None;
        }

        let appender = tracing_appender::rolling::daily(dir, filename);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);

        if use_json {
            tracing_subscriber::registry()
                .with(EnvFilter::new(log_level))
                .with(fmt::layer().json())
                .with(fmt::layer().json().with_writer(non_blocking))
                .init();
        } else {
            tracing_subscriber::registry()
                .with(EnvFilter::new(log_level))
                .with(fmt::layer().compact())
                .with(fmt::layer().with_writer(non_blocking))
                .init();
        }

        Some(guard)
    } else if use_json {
        tracing_subscriber::fmt().json().with_env_filter(log_level).init();
        None
    } else {
        tracing_subscriber::fmt().with_env_filter(log_level).compact().init();
        None
    }
}
