//! Shapley value sampling over random permutations of the units.

use super::AttributionError;
use rand::seq::SliceRandom;
use rand::Rng;

/// Monte Carlo Shapley estimate.
///
/// Each sample draws a permutation, grows a coalition from empty in that
/// order and credits every unit with its marginal gain. The estimate is the
/// mean gain over `n_samples` permutations. Costs up to
/// `n_samples * (n + 1)` evaluations before memoisation.
pub fn shapley_value_sampling<R, F>(
    n: usize,
    n_samples: usize,
    rng: &mut R,
    mut value: F,
) -> Result<Vec<f64>, AttributionError>
where
    R: Rng + ?Sized,
    F: FnMut(&[bool]) -> Result<f64, AttributionError>,
{
    if n_samples == 0 {
        return Err(AttributionError::InvalidInput(
            "sample count must be at least 1".to_string(),
        ));
    }
    let mut totals = vec![0.0; n];
    let mut order: Vec<usize> = (0..n).collect();
    let mut mask = vec![false; n];

    for _ in 0..n_samples {
        order.shuffle(rng);
        mask.iter_mut().for_each(|m| *m = false);
        let mut prev = value(&mask)?;
        for &idx in &order {
            mask[idx] = true;
            let current = value(&mask)?;
            totals[idx] += current - prev;
            prev = current;
        }
    }

    let scale = n_samples as f64;
    Ok(totals.into_iter().map(|t| t / scale).collect())
}
