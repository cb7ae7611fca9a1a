//! Image Classifier - Main Entry Point
//!
//! Loads the label file and ONNX model, then serves `POST /image` until a
//! shutdown signal arrives.

use anyhow::{Context, Result};
use image_classifier::{
    config::{AppConfig, LoggingConfig},
    labels::LabelSet,
    metrics::{MetricsReporter, ServiceMetrics},
    models::inference::OnnxGateway,
    server::{self, AppState},
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load()?;
    init_logging(&config.logging)?;

    info!("Starting Image Classifier");
    info!(
        model = %config.model.model_path.display(),
        labels = %config.model.labels_path.display(),
        top_k = config.prediction.top_k,
        timeout_ms = config.server.request_timeout_ms,
        "Configuration loaded"
    );

    // Missing labels or model are fatal: never serve without them.
    let labels = Arc::new(
        LabelSet::load(&config.model.labels_path).context("Failed to load label file")?,
    );
    if labels.is_empty() {
        warn!("Label file is empty, every classification will fail with a dimension mismatch");
    }

    let gateway = Arc::new(OnnxGateway::new(&config.model).context("Failed to load model")?);

    let metrics = Arc::new(ServiceMetrics::new());
    if config.metrics.report_interval_secs > 0 {
        let reporter = MetricsReporter::new(metrics.clone(), config.metrics.report_interval_secs);
        tokio::spawn(reporter.start());
    }

    let state = AppState {
        gateway,
        labels,
        metrics: metrics.clone(),
        top_k: config.prediction.top_k,
        request_timeout: Duration::from_millis(config.server.request_timeout_ms),
        inference_permits: Arc::new(Semaphore::new(config.server.max_pending_inferences)),
    };
    let app = server::router(state, config.server.body_limit_bytes);

    let listener = TcpListener::bind(config.bind_address())
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_address()))?;
    info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutting down...");
    metrics.print_summary();

    Ok(())
}

fn init_logging(logging: &LoggingConfig) -> Result<()> {
    let rust_log = std::env::var("RUST_LOG").ok();
    let filter = logging.env_filter(rust_log.as_deref())?;

    if logging.format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
