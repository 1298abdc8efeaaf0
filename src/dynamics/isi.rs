//! Spike detection and inter-spike-interval statistics
//!
//! A spike is an upward crossing of a threshold by `x`: the previous value is
//! below the threshold and the current value is above it. With the default
//! threshold of zero this is the sign change from negative to positive
//! membrane potential.

use std::collections::BTreeMap;

/// Streaming upward-crossing detector
#[derive(Debug, Clone)]
pub struct SpikeDetector {
    threshold: f64,
    previous: Option<f64>,
}

impl Default for SpikeDetector {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl SpikeDetector {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            previous: None,
        }
    }

    /// Detector that has already seen `previous`
    pub fn primed(threshold: f64, previous: f64) -> Self {
        Self {
            threshold,
            previous: Some(previous),
        }
    }

    /// Feed the next potential; true when it completes an upward crossing
    #[inline]
    pub fn observe(&mut self, x: f64) -> bool {
        let spiked = matches!(self.previous, Some(prev) if prev < self.threshold && x > self.threshold);
        self.previous = Some(x);
        spiked
    }
}

/// Step indices at which spikes occurred, in increasing order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpikeTrain {
    pub times: Vec<u64>,
}

impl SpikeTrain {
    /// Detect spikes in a potential trace; index 0 is the first trace value
    pub fn detect(trace: impl IntoIterator<Item = f64>, threshold: f64) -> Self {
        Self::detect_with(SpikeDetector::new(threshold), trace)
    }

    /// Like `detect`, with `previous` as the potential just before the trace,
    /// so a crossing into the first trace value counts
    pub fn detect_after(previous: f64, trace: impl IntoIterator<Item = f64>, threshold: f64) -> Self {
        Self::detect_with(SpikeDetector::primed(threshold, previous), trace)
    }

    fn detect_with(mut detector: SpikeDetector, trace: impl IntoIterator<Item = f64>) -> Self {
        let times = trace
            .into_iter()
            .zip(0u64..)
            .filter_map(|(x, step)| detector.observe(x).then_some(step))
            .collect();
        Self { times }
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Consecutive differences of spike times
    pub fn intervals(&self) -> impl Iterator<Item = u64> + '_ {
        self.times.windows(2).map(|w| w[1] - w[0])
    }

    pub fn histogram(&self) -> IsiHistogram {
        let mut histogram = IsiHistogram::default();
        for isi in self.intervals() {
            histogram.record(isi);
        }
        histogram
    }

    pub fn summary(&self) -> IsiSummary {
        let histogram = self.histogram();
        IsiSummary {
            spike_count: self.times.len() as u64,
            mean_isi: histogram.mean(),
            period: histogram.mode(),
        }
    }
}

/// ISI value -> frequency, ordered by ISI
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IsiHistogram {
    counts: BTreeMap<u64, u64>,
}

impl IsiHistogram {
    pub fn record(&mut self, isi: u64) {
        *self.counts.entry(isi).or_insert(0) += 1;
    }

    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        self.counts.iter().map(|(&isi, &freq)| (isi, freq))
    }

    /// Mean ISI, 0 when there are no intervals
    pub fn mean(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        let weighted: u64 = self.counts.iter().map(|(isi, freq)| isi * freq).sum();
        weighted as f64 / total as f64
    }

    /// Most frequent ISI; ties go to the shorter interval
    pub fn mode(&self) -> Option<u64> {
        let mut best: Option<(u64, u64)> = None;
        for (&isi, &freq) in &self.counts {
            if best.map_or(true, |(_, f)| freq > f) {
                best = Some((isi, freq));
            }
        }
        best.map(|(isi, _)| isi)
    }
}

/// Per-trajectory ISI statistic
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IsiSummary {
    pub spike_count: u64,
    /// 0 with fewer than two spikes
    pub mean_isi: f64,
    /// None with fewer than two spikes (infinite ISI)
    pub period: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detector_upward_crossing_only() {
        let mut detector = SpikeDetector::default();
        assert!(!detector.observe(-0.5)); // no previous value
        assert!(detector.observe(0.5)); // - -> +
        assert!(!detector.observe(0.7)); // stays positive
        assert!(!detector.observe(-0.2)); // downward
        assert!(!detector.observe(0.0)); // touches threshold
        assert!(!detector.observe(0.3)); // from exactly zero is not a crossing
    }

    #[test]
    fn test_spike_train_detect() {
        let trace = [-1.0, 1.0, -1.0, -1.0, 1.0, -1.0, -1.0, -1.0, 1.0];
        let train = SpikeTrain::detect(trace, 0.0);
        assert_eq!(train.times, vec![1, 4, 8]);
        assert_eq!(train.intervals().collect::<Vec<_>>(), vec![3, 4]);
    }

    #[test]
    fn test_primed_detector_sees_first_crossing() {
        let mut detector = SpikeDetector::primed(0.0, -0.5);
        assert!(detector.observe(0.5));

        let trace = [1.0, -1.0, -1.0, 1.0];
        assert_eq!(SpikeTrain::detect(trace, 0.0).times, vec![3]);
        assert_eq!(SpikeTrain::detect_after(-1.0, trace, 0.0).times, vec![0, 3]);
        assert_eq!(SpikeTrain::detect_after(1.0, trace, 0.0).times, vec![3]);
    }

    #[test]
    fn test_histogram_mean_and_mode() {
        let train = SpikeTrain {
            times: vec![0, 3, 6, 10, 13],
        };
        let histogram = train.histogram();
        assert_eq!(histogram.iter().collect::<Vec<_>>(), vec![(3, 3), (4, 1)]);
        assert_eq!(histogram.total(), 4);
        assert!((histogram.mean() - 13.0 / 4.0).abs() < 1e-12);
        assert_eq!(histogram.mode(), Some(3));
    }

    #[test]
    fn test_mode_tie_prefers_shorter_interval() {
        let train = SpikeTrain {
            times: vec![0, 5, 7],
        };
        assert_eq!(train.histogram().mode(), Some(2));
    }

    #[test]
    fn test_summary_without_intervals() {
        let summary = SpikeTrain { times: vec![4] }.summary();
        assert_eq!(summary.spike_count, 1);
        assert_eq!(summary.mean_isi, 0.0);
        assert_eq!(summary.period, None);
    }
}
