//! Configuration management for the classification service

use anyhow::{Context, Result};
use config::{Config, ConfigBuilder, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Default location of the configuration file
pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";

/// Environment variable naming an alternative configuration file
pub const CONFIG_PATH_ENV: &str = "IMAGE_CLASSIFIER_CONFIG";

/// Prefix for environment overrides, e.g. `IMAGE_CLASSIFIER__SERVER__PORT`
pub const ENV_PREFIX: &str = "IMAGE_CLASSIFIER";

/// Memory layout of the model's image input tensor
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TensorLayout {
    /// `[batch, channels, height, width]`
    #[default]
    Nchw,
    /// `[batch, height, width, channels]`
    Nhwc,
}

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub model: ModelConfig,
    pub prediction: PredictionConfig,
    pub metrics: MetricsConfig,
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Maximum accepted request body, in bytes
    pub body_limit_bytes: usize,
    /// Upper bound on a single inference call, in milliseconds
    pub request_timeout_ms: u64,
    /// Inferences allowed to run or wait for the model at once; requests
    /// beyond this are refused with 503
    pub max_pending_inferences: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            body_limit_bytes: 16 * 1024 * 1024,
            request_timeout_ms: 10_000,
            max_pending_inferences: 32,
        }
    }
}

/// Model and preprocessing configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// ONNX model file
    pub model_path: PathBuf,
    /// Newline-delimited label file, one label per model output
    pub labels_path: PathBuf,
    /// Width the image is resized to before inference
    pub input_width: u32,
    /// Height the image is resized to before inference
    pub input_height: u32,
    /// Per-channel (RGB) mean subtracted after scaling to [0, 1]
    pub mean: [f32; 3],
    /// Per-channel (RGB) standard deviation
    pub std: [f32; 3],
    /// Input tensor layout
    pub layout: TensorLayout,
    /// Number of intra-op threads for ONNX Runtime
    pub onnx_threads: usize,
    /// Input tensor name; the model's first input when unset
    pub input_name: Option<String>,
    /// Output tensor name; detected from the model when unset
    pub output_name: Option<String>,
    /// Apply softmax to the raw output (for models that emit logits)
    pub apply_softmax: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("model/model.onnx"),
            labels_path: PathBuf::from("model/labels.txt"),
            input_width: 224,
            input_height: 224,
            mean: [0.485, 0.456, 0.406],
            std: [0.229, 0.224, 0.225],
            layout: TensorLayout::Nchw,
            onnx_threads: 1,
            input_name: None,
            output_name: None,
            apply_softmax: false,
        }
    }
}

/// Ranking configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PredictionConfig {
    /// Number of labels returned per request
    pub top_k: usize,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self { top_k: 5 }
    }
}

/// Metrics reporting configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Seconds between summary reports; 0 disables the reporter
    pub report_interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            report_interval_secs: 60,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl LoggingConfig {
    /// Build the subscriber filter.
    ///
    /// Valid `RUST_LOG` directives replace the configured level entirely;
    /// otherwise the level applies to this crate and `tower_http`.
    pub fn env_filter(&self, rust_log: Option<&str>) -> Result<EnvFilter> {
        if let Some(filter) = rust_log
            .filter(|directives| !directives.trim().is_empty())
            .and_then(|directives| EnvFilter::try_new(directives).ok())
        {
            return Ok(filter);
        }

        EnvFilter::try_new(format!(
            "image_classifier={0},tower_http={0}",
            self.level
        ))
        .with_context(|| format!("Invalid logging.level `{}`", self.level))
    }
}

/// Environment source for `IMAGE_CLASSIFIER__SECTION__KEY` overrides.
///
/// Array settings take comma-separated values, e.g.
/// `IMAGE_CLASSIFIER__MODEL__MEAN=0.5,0.5,0.5`.
fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("model.mean")
        .with_list_parse_key("model.std")
}

impl AppConfig {
    /// Load configuration from the default file (if present) and the environment.
    ///
    /// `IMAGE_CLASSIFIER_CONFIG` replaces the default file path. Variables of
    /// the form `IMAGE_CLASSIFIER__SECTION__KEY` override file values, and a
    /// bare `PORT` overrides `server.port`.
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

        let builder = Config::builder()
            .add_source(File::from(path.as_path()).required(false))
            .add_source(environment())
            .set_override_option("server.port", std::env::var("PORT").ok())
            .context("Failed to apply PORT override")?;

        Self::finish(builder)
    }

    /// Load configuration from a specific file, without environment overrides
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let builder = Config::builder().add_source(File::from(path.as_ref()));
        Self::finish(builder)
    }

    fn finish(builder: ConfigBuilder<config::builder::DefaultState>) -> Result<Self> {
        let config: AppConfig = builder
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the service cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.prediction.top_k == 0 {
            anyhow::bail!("prediction.top_k must be at least 1");
        }
        if self.model.input_width == 0 || self.model.input_height == 0 {
            anyhow::bail!(
                "model input size must be non-zero, got {}x{}",
                self.model.input_width,
                self.model.input_height
            );
        }
        if self.model.std.iter().any(|&s| s == 0.0) {
            anyhow::bail!("model.std components must be non-zero");
        }
        if self.server.request_timeout_ms == 0 {
            anyhow::bail!("server.request_timeout_ms must be non-zero");
        }
        if self.server.max_pending_inferences == 0 {
            anyhow::bail!("server.max_pending_inferences must be at least 1");
        }
        Ok(())
    }

    /// Socket address string the server binds to
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.prediction.top_k, 5);
        assert_eq!(config.model.layout, TensorLayout::Nchw);
        assert_eq!(config.bind_address(), "0.0.0.0:8000");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_top_k() {
        let mut config = AppConfig::default();
        config.prediction.top_k = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_std() {
        let mut config = AppConfig::default();
        config.model.std = [0.5, 0.0, 0.5];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_path_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[server]
port = 9100

[model]
labels_path = "data/flowers.txt"
layout = "nhwc"
input_width = 299
input_height = 299
apply_softmax = true

[prediction]
top_k = 3
"#
        )
        .unwrap();

        let config = AppConfig::load_from_path(file.path()).unwrap();

        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.model.labels_path, PathBuf::from("data/flowers.txt"));
        assert_eq!(config.model.layout, TensorLayout::Nhwc);
        assert_eq!(config.model.input_width, 299);
        assert!(config.model.apply_softmax);
        assert_eq!(config.model.mean, [0.485, 0.456, 0.406]);
        assert_eq!(config.prediction.top_k, 3);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_load_from_path_validates() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[prediction]\ntop_k = 0").unwrap();

        assert!(AppConfig::load_from_path(file.path()).is_err());
    }

    #[test]
    fn test_validate_rejects_zero_pending_inferences() {
        let mut config = AppConfig::default();
        config.server.max_pending_inferences = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_environment_overrides_arrays() {
        let mut vars = config::Map::new();
        vars.insert(
            "IMAGE_CLASSIFIER__MODEL__MEAN".to_string(),
            "0.5,0.5,0.5".to_string(),
        );
        vars.insert(
            "IMAGE_CLASSIFIER__MODEL__STD".to_string(),
            "0.25,0.25,0.25".to_string(),
        );
        vars.insert(
            "IMAGE_CLASSIFIER__SERVER__MAX_PENDING_INFERENCES".to_string(),
            "4".to_string(),
        );
        vars.insert(
            "IMAGE_CLASSIFIER__LOGGING__LEVEL".to_string(),
            "debug".to_string(),
        );

        let builder = Config::builder().add_source(environment().source(Some(vars)));
        let config = AppConfig::finish(builder).unwrap();

        assert_eq!(config.model.mean, [0.5, 0.5, 0.5]);
        assert_eq!(config.model.std, [0.25, 0.25, 0.25]);
        assert_eq!(config.server.max_pending_inferences, 4);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_env_filter_uses_configured_level() {
        let logging = LoggingConfig {
            level: "debug".to_string(),
            ..Default::default()
        };

        let filter = logging.env_filter(None).unwrap().to_string();
        assert!(filter.contains("image_classifier=debug"));
        assert!(filter.contains("tower_http=debug"));

        let blank = logging.env_filter(Some("  ")).unwrap().to_string();
        assert!(blank.contains("image_classifier=debug"));
    }

    #[test]
    fn test_env_filter_prefers_rust_log() {
        let logging = LoggingConfig::default();

        let filter = logging
            .env_filter(Some("image_classifier=trace"))
            .unwrap()
            .to_string();

        assert!(filter.contains("image_classifier=trace"));
        assert!(!filter.contains("tower_http"));
    }

    #[test]
    fn test_env_filter_rejects_bad_level() {
        let logging = LoggingConfig {
            level: "very=loud=please".to_string(),
            ..Default::default()
        };
        assert!(logging.env_filter(None).is_err());
    }
}
