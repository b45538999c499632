//! Linear trend extraction and bounded extrapolation

/// Extrapolations may overshoot the observed range by this fraction of it
pub const FORECAST_MARGIN: f64 = 0.2;

/// Ordinary least-squares slope of `values` against their index
///
/// Returns 0.0 for fewer than two points or a degenerate denominator.
pub fn calculate_trend(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let n = values.len() as f64;
    let sum_x: f64 = (0..values.len()).map(|i| i as f64).sum();
    let sum_y: f64 = values.iter().sum();
    let sum_xy: f64 = values.iter().enumerate().map(|(i, y)| i as f64 * y).sum();
    let sum_x2: f64 = (0..values.len()).map(|i| (i as f64).powi(2)).sum();
    let denom = n * sum_x2 - sum_x.powi(2);
    if denom.abs() < f64::EPSILON {
        return 0.0;
    }
    (n * sum_xy - sum_x * sum_y) / denom
}

/// Project `periods_ahead` steps past the last value along the trend
///
/// The result is clamped to the historical range widened by
/// [`FORECAST_MARGIN`] on each side. An empty history forecasts 0.0.
pub fn forecast_value(history: &[f64], periods_ahead: f64) -> f64 {
    let Some(&last) = history.last() else {
        return 0.0;
    };
    let trend = calculate_trend(history);
    let projected = last + trend * periods_ahead;

    let min = history.iter().copied().fold(f64::INFINITY, f64::min);
    let max = history.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let margin = (max - min) * FORECAST_MARGIN;

    projected.clamp(min - margin, max + margin)
}

/// Population variance
pub fn variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calculate_trend_linear() {
        let values = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        assert!((calculate_trend(&values) - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_calculate_trend_cpu_ramp() {
        let values = vec![50.0, 55.0, 60.0, 65.0, 70.0];
        assert!((calculate_trend(&values) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_constant_series_has_zero_trend() {
        for n in 2..20 {
            let values = vec![42.5; n];
            assert_eq!(calculate_trend(&values), 0.0);
        }
    }

    #[test]
    fn test_trend_needs_two_points() {
        assert_eq!(calculate_trend(&[]), 0.0);
        assert_eq!(calculate_trend(&[3.0]), 0.0);
    }

    #[test]
    fn test_forecast_zero_periods_returns_last() {
        let history = vec![3.0, 9.0, 4.0, 7.0];
        assert_eq!(forecast_value(&history, 0.0), 7.0);
    }

    #[test]
    fn test_forecast_clamped_to_widened_range() {
        let history = vec![10.0, 20.0, 30.0, 40.0, 50.0];
        // slope 10 → 50 + 10*6 = 110, clamped to 50 + 0.2*40 = 58
        assert!((forecast_value(&history, 6.0) - 58.0).abs() < 1e-9);
        // falling below the window is clamped too
        let falling = vec![50.0, 40.0, 30.0, 20.0, 10.0];
        assert!((forecast_value(&falling, 6.0) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_forecast_within_range_unclamped() {
        let history = vec![10.0, 20.0, 30.0, 40.0, 50.0];
        assert!((forecast_value(&history, 0.5) - 55.0).abs() < 1e-9);
    }

    #[test]
    fn test_forecast_empty_history() {
        assert_eq!(forecast_value(&[], 3.0), 0.0);
    }

    #[test]
    fn test_variance() {
        assert_eq!(variance(&[]), 0.0);
        assert!((variance(&[0.9, 0.95, 0.2]) - 0.1172).abs() < 1e-3);
    }
}
