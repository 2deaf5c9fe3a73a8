//! Feature ablation: drop one unit at a time and measure the change.

use super::AttributionError;

/// Attribution of unit `i` is `v(all) - v(all without i)`.
///
/// `value` scores a coalition given as an inclusion mask. Deterministic for
/// a deterministic `value`; costs `n + 1` evaluations.
pub fn feature_ablation<F>(n: usize, mut value: F) -> Result<Vec<f64>, AttributionError>
where
    F: FnMut(&[bool]) -> Result<f64, AttributionError>,
{
    let mut mask = vec![true; n];
    let full = value(&mask)?;
    let mut attributions = Vec::with_capacity(n);
    for i in 0..n {
        mask[i] = false;
        let ablated = value(&mask)?;
        mask[i] = true;
        attributions.push(full - ablated);
    }
    Ok(attributions)
}
