//! Model inference components

pub mod inference;
pub mod loader;
pub mod preprocess;
pub mod ranking;

pub use inference::{InferenceGateway, OnnxGateway};
pub use loader::ModelLoader;
pub use preprocess::ImagePreprocessor;
pub use ranking::select_top_k;
