//! Type definitions for the classification service

pub mod prediction;
pub mod request;

pub use prediction::RankedPrediction;
pub use request::ClassifyForm;
