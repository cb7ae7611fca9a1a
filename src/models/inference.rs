//! Inference gateway: raw image bytes in, probability vector out

use crate::config::ModelConfig;
use crate::error::ClassifierError;
use crate::models::loader::{LoadedModel, ModelLoader};
use crate::models::preprocess::ImagePreprocessor;
use anyhow::Result;
use ort::value::Tensor;
use std::sync::Mutex;
use tracing::{debug, info};

/// Runs one forward pass over an encoded image.
///
/// Implementations are shared across concurrent requests and must handle
/// their own synchronization. `infer` blocks for the duration of the pass.
pub trait InferenceGateway: Send + Sync {
    fn infer(&self, image_bytes: &[u8]) -> Result<Vec<f32>, ClassifierError>;

    /// Name reported by the health endpoint
    fn model_name(&self) -> &str {
        "unknown"
    }
}

/// Inference gateway backed by an ONNX Runtime session
pub struct OnnxGateway {
    /// `Session::run` needs exclusive access, so requests take turns
    model: Mutex<LoadedModel>,
    name: String,
    preprocessor: ImagePreprocessor,
    apply_softmax: bool,
}

impl OnnxGateway {
    /// Load the model and build the gateway from configuration
    pub fn new(config: &ModelConfig) -> Result<Self> {
        let loader = ModelLoader::with_threads(config.onnx_threads)?;
        let model = loader.load(config)?;
        let preprocessor = ImagePreprocessor::from_config(config);

        info!(
            model = %model.name,
            input_shape = ?preprocessor.shape(),
            apply_softmax = config.apply_softmax,
            "Inference gateway initialized"
        );

        Ok(Self {
            name: model.name.clone(),
            model: Mutex::new(model),
            preprocessor,
            apply_softmax: config.apply_softmax,
        })
    }

    fn run(&self, model: &mut LoadedModel, input: Tensor<f32>) -> Result<Vec<f32>, ClassifierError> {
        let outputs = model
            .session
            .run(ort::inputs![model.input_name.as_str() => input])
            .map_err(ClassifierError::inference)?;

        let output = outputs.get(model.output_name.as_str()).ok_or_else(|| {
            ClassifierError::inference(format!("model produced no output named {}", model.output_name))
        })?;

        let (shape, data) = output
            .try_extract_tensor::<f32>()
            .map_err(ClassifierError::inference)?;

        let dims: Vec<i64> = shape.iter().copied().collect();
        debug!(model = %model.name, shape = ?dims, "Extracted output tensor");

        class_scores(&dims, data)
    }
}

impl InferenceGateway for OnnxGateway {
    fn infer(&self, image_bytes: &[u8]) -> Result<Vec<f32>, ClassifierError> {
        let image = self.preprocessor.process(image_bytes)?;
        let input =
            Tensor::from_array((image.shape, image.data)).map_err(ClassifierError::inference)?;

        let mut probabilities = {
            let mut model = self
                .model
                .lock()
                .map_err(|e| ClassifierError::inference(format!("lock error: {e}")))?;
            self.run(&mut model, input)?
        };

        if self.apply_softmax {
            softmax(&mut probabilities);
        }

        Ok(probabilities)
    }

    fn model_name(&self) -> &str {
        &self.name
    }
}

/// Pull the class scores for the single image out of the output tensor.
///
/// Accepts `[classes]` or `[1, classes]`, and any shape whose leading
/// dimensions are all 1.
fn class_scores(shape: &[i64], data: &[f32]) -> Result<Vec<f32>, ClassifierError> {
    let batch: i64 = shape.iter().rev().skip(1).product();
    if shape.is_empty() || batch != 1 {
        return Err(ClassifierError::inference(format!(
            "expected a single score vector, got output shape {shape:?}"
        )));
    }
    Ok(data.to_vec())
}

/// In-place numerically stable softmax
pub fn softmax(values: &mut [f32]) {
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    if !max.is_finite() {
        return;
    }

    let mut sum = 0.0;
    for v in values.iter_mut() {
        *v = (*v - max).exp();
        sum += *v;
    }
    if sum > 0.0 {
        for v in values.iter_mut() {
            *v /= sum;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_scores_accepts_batch_of_one() {
        let data = [0.1, 0.9];
        assert_eq!(class_scores(&[1, 2], &data).unwrap(), vec![0.1, 0.9]);
        assert_eq!(class_scores(&[2], &data).unwrap(), vec![0.1, 0.9]);
        assert_eq!(class_scores(&[1, 1, 2], &data).unwrap(), vec![0.1, 0.9]);
    }

    #[test]
    fn test_class_scores_rejects_batches() {
        let data = [0.1, 0.9, 0.4, 0.6];
        assert!(matches!(
            class_scores(&[2, 2], &data),
            Err(ClassifierError::InferenceFailure(_))
        ));
        assert!(class_scores(&[], &data).is_err());
    }

    #[test]
    fn test_softmax() {
        let mut values = [1.0, 2.0, 3.0];
        softmax(&mut values);

        let sum: f32 = values.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
        assert!(values[2] > values[1] && values[1] > values[0]);
        assert!((values[2] - 0.665_240_9).abs() < 1e-5);
    }

    #[test]
    fn test_softmax_large_logits() {
        let mut values = [1000.0, 1000.0];
        softmax(&mut values);
        assert!((values[0] - 0.5).abs() < 1e-6);
        assert!((values[1] - 0.5).abs() < 1e-6);
    }
}
