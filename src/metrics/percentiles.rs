use hdrhistogram::Histogram;
use serde::Serialize;

/// Percentile breakdown of one histogram, in the histogram's own unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PercentileSet {
    pub count: u64,
    pub min: u64,
    pub max: u64,
    pub mean: f64,
    pub p50: u64,
    pub p90: u64,
    pub p99: u64,
}

impl PercentileSet {
    /// All zeros for an empty histogram.
    pub fn from_histogram(hist: &Histogram<u64>) -> Self {
        if hist.is_empty() {
            return Self::default();
        }

        Self {
            count: hist.len(),
            min: hist.min(),
            max: hist.max(),
            mean: hist.mean(),
            p50: hist.value_at_quantile(0.50),
            p90: hist.value_at_quantile(0.90),
            p99: hist.value_at_quantile(0.99),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_histogram_is_all_zero() {
        let hist = Histogram::<u64>::new(3).unwrap();
        assert_eq!(PercentileSet::from_histogram(&hist), PercentileSet::default());
    }

    #[test]
    fn percentiles_follow_recorded_values() {
        let mut hist = Histogram::<u64>::new(3).unwrap();
        for v in 1..=100 {
            hist.record(v).unwrap();
        }
        let set = PercentileSet::from_histogram(&hist);
        assert_eq!(set.count, 100);
        assert_eq!(set.min, 1);
        assert_eq!(set.max, 100);
        assert_eq!(set.p50, 50);
        assert_eq!(set.p99, 99);
    }
}
