//! Lookout: live camera stream with periodic AI scene description

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use color_eyre::{eyre::eyre, eyre::WrapErr, Result};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use lookout::analysis::{AnalysisService, AnalysisState, OllamaClient};
use lookout::capture::{CaptureService, V4l2Opener};
use lookout::cli::{CliArgs, USAGE};
use lookout::server::{self, AppState};
use lookout::{utils, Config, FrameBus};

/// How long startup waits for the first frame before warning
const FIRST_FRAME_TIMEOUT: Duration = Duration::from_secs(3);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize error handling and logging
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("lookout=info,tower_http=info")),
        )
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .init();

    let args: Vec<String> = std::env::args().collect();
    let cli = CliArgs::parse(&args).map_err(|e| eyre!("{e}\n\n{USAGE}"))?;
    if cli.help {
        println!("{USAGE}");
        return Ok(());
    }

    info!("Lookout launching...");

    // Load configuration: defaults, file, environment, then flags
    let mut config = Config::load(cli.config.as_deref()).wrap_err("Failed to load configuration")?;
    cli.apply(&mut config);
    config.validate().wrap_err("Invalid configuration")?;

    // Auto-detect capture device if needed
    if config.capture.device.is_empty() {
        let probe = config.capture.clone();
        let found = tokio::task::spawn_blocking(move || utils::auto_detect_device(&probe)).await??;
        info!("Auto-detected capture device: {}", found.path);
        config.capture.device = found.path;
        config.capture.format = found.format;
    }
    info!("Using capture device: {}", config.capture.device);

    let frames = Arc::new(FrameBus::new());
    let analysis = Arc::new(AnalysisState::new(config.analysis.enabled));

    // Capture runs on its own thread
    let stop = Arc::new(AtomicBool::new(false));
    let capture = CaptureService::new(V4l2Opener, config.capture.clone(), frames.clone());
    let capture_status = capture.status_handle();
    let capture_handle = capture
        .spawn(stop.clone())
        .wrap_err("Failed to start capture thread")?;

    let client = OllamaClient::new(&config.analysis)?;
    let state = AppState::new(
        frames.clone(),
        capture_status,
        analysis.clone(),
        client.model(),
        &config.server,
    );
    let _analysis_handle =
        AnalysisService::new(client, config.analysis.clone(), frames.clone(), analysis).spawn();

    // Give the camera a moment to deliver its first frame
    let first_frame = frames.wait_newer(0, config.server.frame_poll());
    if tokio::time::timeout(FIRST_FRAME_TIMEOUT, first_frame).await.is_err() {
        warn!("No frames captured yet, check the camera output above");
    }

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .wrap_err_with(|| format!("Failed to bind {addr}"))?;

    let ip = utils::local_ip();
    let port = config.server.port;
    info!("Web interface:     http://{ip}:{port}/");
    info!("Direct video feed: http://{ip}:{port}/video_feed");
    info!("Status API:        http://{ip}:{port}/status");
    info!("Analysis API:      http://{ip}:{port}/analysis");
    info!(
        model = %config.analysis.model,
        enabled = config.analysis.enabled,
        "Press Ctrl+C to stop"
    );

    tokio::select! {
        result = server::serve(listener, state) => {
            if let Err(e) = result {
                error!("HTTP server failed: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down...");
        }
    }

    // Release the camera before exiting
    stop.store(true, Ordering::Relaxed);
    if tokio::task::spawn_blocking(move || capture_handle.join())
        .await?
        .is_err()
    {
        error!("Capture thread panicked");
    }

    info!("Lookout shut down");
    Ok(())
}
