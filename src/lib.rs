//! Image Classifier Library
//!
//! Serves top-K label predictions for base64-encoded images over HTTP,
//! running a pre-trained ONNX model through ONNX Runtime.

pub mod config;
pub mod error;
pub mod labels;
pub mod metrics;
pub mod models;
pub mod server;
pub mod types;

pub use config::AppConfig;
pub use error::ClassifierError;
pub use labels::LabelSet;
pub use models::inference::{InferenceGateway, OnnxGateway};
pub use models::ranking::select_top_k;
pub use types::prediction::RankedPrediction;
