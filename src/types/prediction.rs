//! Ranked prediction returned to clients

use serde::{Deserialize, Serialize};

/// One entry of the classification result.
///
/// Field names are part of the wire format: clients expect `Name` and
/// `Precent`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedPrediction {
    /// Label text for the predicted class
    #[serde(rename = "Name")]
    pub name: String,

    /// Confidence as a truncated integer percentage
    #[serde(rename = "Precent")]
    pub percent: i32,
}

impl RankedPrediction {
    pub fn new(name: impl Into<String>, percent: i32) -> Self {
        Self {
            name: name.into(),
            percent,
        }
    }

    /// Convert a probability to a percentage by truncation, in `f32`.
    ///
    /// `0.7_f32 * 100.0` is exactly 70.0 in single precision but 69.99.. in
    /// double precision, so widening before multiplying changes results.
    pub fn percent_from_probability(probability: f32) -> i32 {
        (probability * 100.0) as i32
    }
}
