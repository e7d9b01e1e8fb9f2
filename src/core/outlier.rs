//! Reduces a raw observation set to one representative price.

/// Width of the retention band, in population standard deviations.
pub const OUTLIER_SIGMA: f64 = 2.0;

/// Arithmetic mean, shifted by the first sample so that a run of identical
/// values yields that value exactly.
pub fn mean(values: &[f64]) -> Option<f64> {
    let pivot = *values.first()?;
    let offset: f64 = values.iter().map(|v| v - pivot).sum();
    Some(pivot + offset / values.len() as f64)
}

pub fn population_std_dev(values: &[f64]) -> Option<f64> {
    let mu = mean(values)?;
    let variance = values
        .iter()
        .map(|v| {
            let diff = v - mu;
            diff * diff
        })
        .sum::<f64>()
        / values.len() as f64;
    Some(variance.sqrt())
}

/// Samples within `[μ - 2σ, μ + 2σ]`. Sets of two or fewer are returned as-is.
pub fn retain_within_band(values: &[f64]) -> Vec<f64> {
    if values.len() <= 2 {
        return values.to_vec();
    }

    let (mu, sigma) = match (mean(values), population_std_dev(values)) {
        (Some(mu), Some(sigma)) => (mu, sigma),
        _ => return values.to_vec(),
    };
    let lower = mu - OUTLIER_SIGMA * sigma;
    let upper = mu + OUTLIER_SIGMA * sigma;

    let kept: Vec<f64> = values
        .iter()
        .copied()
        .filter(|v| *v >= lower && *v <= upper)
        .collect();

    // 母體標準差下不可能全數剔除，保留此退路
    if kept.is_empty() {
        tracing::debug!(
            "Outlier band [{:.2}, {:.2}] kept no samples, using all {}",
            lower,
            upper,
            values.len()
        );
        return values.to_vec();
    }

    kept
}

/// Representative price of one (municipality, service) pair, `None` without samples.
pub fn representative_price(values: &[f64]) -> Option<f64> {
    mean(&retain_within_band(values))
}
