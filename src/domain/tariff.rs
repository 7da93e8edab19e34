use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

/// Buy tariff at or above `PEAK_RATIO * median` is peak
pub const PEAK_RATIO: f64 = 1.2;
/// Buy tariff at or below `LOW_RATIO * median` is low
pub const LOW_RATIO: f64 = 0.8;

/// Median of a series; the mean of the two middle values for even lengths.
/// Returns 0.0 for an empty series.
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted: Vec<OrderedFloat<f64>> = values.iter().copied().map(OrderedFloat).collect();
    sorted.sort_unstable();
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1].0 + sorted[mid].0) / 2.0
    } else {
        sorted[mid].0
    }
}

/// Time-of-use classification thresholds derived from the buy tariff.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TariffBands {
    pub median: f64,
    pub peak_threshold: f64,
    pub low_threshold: f64,
}

impl TariffBands {
    pub fn from_buy_tariff(tariff_buy: &[f64]) -> Self {
        let median = median(tariff_buy);
        Self {
            median,
            peak_threshold: median * PEAK_RATIO,
            low_threshold: median * LOW_RATIO,
        }
    }

    pub fn is_peak(&self, tariff: f64) -> bool {
        tariff >= self.peak_threshold
    }

    pub fn is_low(&self, tariff: f64) -> bool {
        tariff <= self.low_threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_median_odd_and_even() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
        assert!((median(&[0.3, 0.5, 0.3, 0.5]) - 0.4).abs() < 1e-12);
        assert_eq!(median(&[]), 0.0);
    }

    #[test]
    fn test_bands() {
        let bands = TariffBands::from_buy_tariff(&[0.3, 0.3, 0.3, 0.5]);
        assert!((bands.median - 0.3).abs() < 1e-12);
        assert!(bands.is_peak(0.5));
        assert!(!bands.is_peak(0.3));
        assert!(bands.is_low(0.2));
        assert!(!bands.is_low(0.3));
    }

    #[test]
    fn test_flat_tariff_is_never_peak() {
        let bands = TariffBands::from_buy_tariff(&[0.25; 6]);
        assert!(!bands.is_peak(0.25));
        assert!(!bands.is_low(0.25));
    }
}
