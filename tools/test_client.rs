//! Test Classification Client
//!
//! Posts image files to a running classifier and logs the ranked labels.
//!
//! Usage: `test_client [url] <image>...`

use base64::prelude::{Engine, BASE64_STANDARD};
use serde::Deserialize;
use std::path::Path;
use std::time::Instant;
use tracing::{error, info, warn};

/// Ranked label as returned by the service
#[derive(Debug, Deserialize)]
struct Prediction {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Precent")]
    percent: i32,
}

fn encode_image(path: &Path) -> anyhow::Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(BASE64_STANDARD.encode(bytes))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("test_client=info".parse()?),
        )
        .init();

    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let url = if args.first().is_some_and(|a| a.starts_with("http")) {
        args.remove(0)
    } else {
        "http://localhost:8000/image".to_string()
    };
    if args.is_empty() {
        anyhow::bail!("usage: test_client [url] <image>...");
    }

    info!(url = %url, images = args.len(), "Starting Test Classification Client");

    let client = reqwest::Client::new();
    let mut reachable = true;

    for image in &args {
        let path = Path::new(image);
        let encoded = match encode_image(path) {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!(image = %path.display(), error = %e, "Skipping unreadable image");
                continue;
            }
        };

        if !reachable {
            info!(image = %path.display(), payload_bytes = encoded.len(), "Dry run");
            continue;
        }

        let start = Instant::now();
        let response = match client.post(&url).form(&[("img", &encoded)]).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Failed to reach classifier. Running in dry-run mode.");
                reachable = false;
                info!(image = %path.display(), payload_bytes = encoded.len(), "Dry run");
                continue;
            }
        };

        let status = response.status();
        let body = response.bytes().await?;
        if !status.is_success() {
            error!(
                image = %path.display(),
                status = %status,
                body = %String::from_utf8_lossy(&body),
                "Classification failed"
            );
            continue;
        }

        let predictions: Vec<Prediction> = serde_json::from_slice(&body)?;
        info!(
            image = %path.display(),
            latency_ms = start.elapsed().as_millis(),
            "Classified"
        );
        for (rank, prediction) in predictions.iter().enumerate() {
            info!("  {}. {:<30} {:>3}%", rank + 1, prediction.name, prediction.percent);
        }
    }

    Ok(())
}
