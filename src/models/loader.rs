//! ONNX model loader

use crate::config::ModelConfig;
use crate::error::ClassifierError;
use anyhow::{Context, Result};
use ort::session::{builder::GraphOptimizationLevel, Session};
use std::path::Path;
use tracing::info;

/// Loaded ONNX model with resolved tensor names
pub struct LoadedModel {
    /// Model name (file stem)
    pub name: String,
    /// ONNX Runtime session
    pub session: Session,
    /// Input name for the image tensor
    pub input_name: String,
    /// Output name for the class probabilities
    pub output_name: String,
}

/// Loader for ONNX models
pub struct ModelLoader {
    /// Number of threads for ONNX inference
    onnx_threads: usize,
}

impl ModelLoader {
    /// Create a new model loader with specified number of threads
    pub fn with_threads(onnx_threads: usize) -> Result<Self> {
        ort::init().commit()?;
        info!(onnx_threads = onnx_threads, "ONNX Runtime initialized");
        Ok(Self { onnx_threads })
    }

    /// Load the classification model described by `config`
    pub fn load(&self, config: &ModelConfig) -> Result<LoadedModel> {
        self.load_model(
            &config.model_path,
            config.input_name.as_deref(),
            config.output_name.as_deref(),
        )
    }

    /// Load a single ONNX model from file
    pub fn load_model<P: AsRef<Path>>(
        &self,
        path: P,
        input_name: Option<&str>,
        output_name: Option<&str>,
    ) -> Result<LoadedModel> {
        let path = path.as_ref();

        // The runtime's own error for a missing file is opaque.
        std::fs::metadata(path).map_err(|source| ClassifierError::ResourceUnavailable {
            path: path.to_path_buf(),
            source,
        })?;

        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "model".to_string());

        info!(model = %name, path = %path.display(), threads = self.onnx_threads, "Loading ONNX model");

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(self.onnx_threads)?
            .commit_from_file(path)
            .context(format!("Failed to load model from {:?}", path))?;

        let input_name = match input_name {
            Some(name) => name.to_string(),
            None => session
                .inputs
                .first()
                .map(|i| i.name.clone())
                .context("Model declares no inputs")?,
        };

        let output_names: Vec<&str> = session.outputs.iter().map(|o| o.name.as_str()).collect();
        let output_name = match output_name {
            Some(name) => name.to_string(),
            None => select_output_name(&output_names)
                .context("Model declares no outputs")?
                .to_string(),
        };

        info!(
            model = %name,
            input = %input_name,
            output = %output_name,
            "Model loaded successfully"
        );

        Ok(LoadedModel {
            name,
            session,
            input_name,
            output_name,
        })
    }
}

/// Pick the output most likely to carry class probabilities.
fn select_output_name<'a>(names: &[&'a str]) -> Option<&'a str> {
    names
        .iter()
        .copied()
        .find(|name| {
            let name = name.to_ascii_lowercase();
            name.contains("prob") || name.contains("softmax") || name.contains("output")
        })
        .or_else(|| names.last().copied())
}
