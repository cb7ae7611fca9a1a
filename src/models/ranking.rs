//! Top-K ranking of a probability vector against the label set

use crate::error::ClassifierError;
use crate::labels::LabelSet;
use crate::types::prediction::RankedPrediction;

/// Return the `k` most probable labels, highest first.
///
/// Scans `probabilities` once while keeping a bounded buffer of the best
/// entries seen so far. Equal scores keep their scan order, so the lower index
/// always ranks first. When fewer than `k` entries exist, all of them are
/// returned. NaN scores are never ranked.
pub fn select_top_k(
    probabilities: &[f32],
    labels: &LabelSet,
    k: usize,
) -> Result<Vec<RankedPrediction>, ClassifierError> {
    if probabilities.len() != labels.len() {
        return Err(ClassifierError::DimensionMismatch {
            probabilities: probabilities.len(),
            labels: labels.len(),
        });
    }

    let capacity = k.min(probabilities.len());
    let mut best: Vec<(usize, f32)> = Vec::with_capacity(capacity + 1);

    for (index, &probability) in probabilities.iter().enumerate() {
        if capacity == 0 {
            break;
        }
        if probability.is_nan() {
            continue;
        }
        if best.len() == capacity {
            match best.last() {
                Some(&(_, weakest)) if probability <= weakest => continue,
                _ => {}
            }
        }

        // Strict comparison: an equal, earlier entry is never displaced.
        let position = best
            .iter()
            .position(|&(_, held)| held < probability)
            .unwrap_or(best.len());
        best.insert(position, (index, probability));
        best.truncate(capacity);
    }

    best.into_iter()
        .map(|(index, probability)| {
            let name = labels.get(index).ok_or(ClassifierError::DimensionMismatch {
                probabilities: probabilities.len(),
                labels: labels.len(),
            })?;
            Ok(RankedPrediction::new(
                name,
                RankedPrediction::percent_from_probability(probability),
            ))
        })
        .collect()
}
