use crowd_density::api;
use crowd_density::capture::ffmpeg::FfmpegGrabber;
use crowd_density::capture::{self, CaptureSettings};
use crowd_density::config::{self, Config};
use crowd_density::congestion::CongestionScorer;
use crowd_density::detector::remote::RemoteDetector;
use crowd_density::detector::{Detector, DetectorHandle};
use crowd_density::pipeline::queue::{LocalTaskQueue, TaskQueue};
use crowd_density::pipeline::{self, Orchestrator};
use crowd_density::roi::overlay::SvgOverlayWriter;
use crowd_density::roi::{self, RoiEstimator};
use crowd_density::state::{AppState, CycleStatus};
use crowd_density::store::{MemoryStore, Store};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use time::OffsetDateTime;
use tokio::time::MissedTickBehavior;

fn init_tracing(level: &str) {
    let level = level.parse::<tracing::Level>().unwrap_or(tracing::Level::INFO);
    let subscriber = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(level)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = config::load_default()?;
    init_tracing(config.log_level());
    tracing::info!(
        config_path = config::DEFAULT_CONFIG_PATH,
        app = %config.app.name,
        cameras = config.cameras.len(),
        "crowd-density starting"
    );

    let store = Arc::new(MemoryStore::with_cameras(config.cameras()));
    let queue = Arc::new(LocalTaskQueue::new());
    let detector = build_detector(&config);
    let state = Arc::new(RwLock::new(AppState::new(
        config.detector_endpoint().is_some(),
        config.roi_enabled(),
    )));
    let stop_flag = Arc::new(AtomicBool::new(false));

    let orchestrator = Arc::new(Orchestrator::new(
        store.clone(),
        detector,
        config.detection_filter(),
        CongestionScorer::new(store.clone(), config.scoring_settings()),
        queue.clone(),
    ));
    let _worker_handle = pipeline::spawn_worker(
        orchestrator,
        Arc::clone(&queue),
        Arc::clone(&state),
        Arc::clone(&stop_flag),
    );

    let _roi_handle = if config.roi_enabled() {
        let mut estimator = RoiEstimator::new(store.clone(), config.roi_settings());
        if let Some(dir) = config.overlay_dir() {
            estimator = estimator.with_overlay(Arc::new(SvgOverlayWriter::new(dir)));
        }
        tracing::info!(
            interval_secs = config.roi_refresh_interval().as_secs(),
            "Starting ROI refresh thread"
        );
        Some(roi::spawn_refresh_thread(
            estimator,
            Arc::clone(&state),
            config.roi_refresh_interval(),
            Arc::clone(&stop_flag),
        ))
    } else {
        tracing::warn!("ROI estimation disabled, congestion needs a manual ROI per camera");
        None
    };

    let grabber = Arc::new(FfmpegGrabber::new(
        config.ffmpeg_path(),
        config.ffprobe_path(),
        config.probe_timeout(),
    ));
    match capture::probe_cameras(grabber.as_ref(), store.as_ref()).await {
        Ok(report) => tracing::info!(
            reachable = report.succeeded,
            unreachable = report.failed,
            "Camera probe complete"
        ),
        Err(err) => tracing::warn!(error = %err, "Camera probe failed"),
    }

    let capture_task = tokio::spawn(run_capture_loop(
        grabber,
        store.clone(),
        queue.clone(),
        Arc::clone(&state),
        config.capture_settings(),
        config.capture_interval(),
    ));

    let app = api::router(Arc::clone(&state));
    let port = config.server_port();
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "API server listening");
    axum::serve(listener, app).await?;

    // Signal background loops to stop
    stop_flag.store(true, Ordering::Relaxed);
    capture_task.abort();
    if let Err(err) = queue.close() {
        tracing::warn!(error = %err, "Failed to close task queue");
    }

    Ok(())
}

/// Remote detector when an endpoint is configured; otherwise every AI stage fails fast.
fn build_detector(config: &Config) -> Arc<DetectorHandle> {
    let Some(endpoint) = config.detector_endpoint() else {
        tracing::warn!("No [detector].endpoint configured, AI stages will fail");
        return Arc::new(DetectorHandle::disabled());
    };
    tracing::info!(endpoint, "Using remote detector");
    let endpoint = endpoint.to_string();
    let timeout = config.detector_timeout();
    Arc::new(DetectorHandle::new(move || {
        Ok(Arc::new(RemoteDetector::new(endpoint.clone(), timeout)) as Arc<dyn Detector>)
    }))
}

async fn run_capture_loop(
    grabber: Arc<FfmpegGrabber>,
    store: Arc<dyn Store>,
    queue: Arc<dyn TaskQueue>,
    state: Arc<RwLock<AppState>>,
    settings: CaptureSettings,
    interval: Duration,
) {
    tracing::info!(interval_secs = interval.as_secs(), "Starting capture loop");
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        let report = match capture::capture_all_active_cameras(
            Arc::clone(&grabber),
            Arc::clone(&store),
            Arc::clone(&queue),
            &settings,
        )
        .await
        {
            Ok(report) => report,
            Err(err) => {
                tracing::warn!(error = %err, "Error running capture cycle");
                continue;
            }
        };
        match state.write() {
            Ok(mut guard) => guard.set_capture_cycle(CycleStatus {
                report,
                finished_at: OffsetDateTime::now_utc(),
            }),
            Err(_) => tracing::warn!("State lock poisoned while recording capture cycle"),
        }
    }
}
