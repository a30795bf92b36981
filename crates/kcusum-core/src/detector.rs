//! Kernel CUSUM Change-Point Detector
//!
//! Sequential detector over a test stream and a reference stream. At every
//! second index the paired MMD statistic is reduced by the expected drift
//! `delta` and accumulated with a zero floor:
//!
//!   Z(i) = max(0, Z(i-2) + mmd(a[i], b[i-1], r[i], s[i-1]) - delta)
//!
//! The first index where `Z > h` is reported as the change point. A run is a
//! small state machine: `Accumulating → {Detected, Exhausted, Truncated}`.

use crate::kernel::mmd;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// First sequence index visited by the recursion
pub const FIRST_INDEX: usize = 2;
/// Distance between consecutive visited indices
pub const STRIDE: usize = 2;
/// Shortest stream the indexing scheme accepts
pub const MIN_STREAM_LEN: usize = 3;

pub const DEFAULT_THRESHOLD: f64 = 0.015;
pub const DEFAULT_DELTA: f64 = 0.1;

/// Detector calibration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Alarm level `h` on the accumulated statistic
    #[serde(alias = "h")]
    pub threshold: f64,
    /// Expected no-change discrepancy subtracted at each step
    pub delta: f64,
    /// Optional bound on the number of recursion steps
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_steps: Option<usize>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            delta: DEFAULT_DELTA,
            max_steps: None,
        }
    }
}

impl DetectorConfig {
    pub fn new(threshold: f64, delta: f64) -> Self {
        Self {
            threshold,
            delta,
            max_steps: None,
        }
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = Some(max_steps);
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.threshold.is_finite() || self.threshold <= 0.0 {
            return Err(ConfigError::Threshold(self.threshold));
        }
        if !self.delta.is_finite() {
            return Err(ConfigError::Delta(self.delta));
        }
        if self.max_steps == Some(0) {
            return Err(ConfigError::MaxSteps);
        }
        Ok(())
    }
}

/// Invalid detector calibration
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("threshold must be positive and finite, got {0}")]
    Threshold(f64),

    #[error("delta must be finite, got {0}")]
    Delta(f64),

    #[error("max_steps must be at least 1")]
    MaxSteps,
}

/// Streams that cannot be consumed by the indexing scheme
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InputError {
    #[error("stream `{stream}` has {len} samples, at least 3 are required")]
    TooShort { stream: &'static str, len: usize },

    #[error("stream `{stream}` has {len} samples, expected {expected}")]
    LengthMismatch {
        stream: &'static str,
        len: usize,
        expected: usize,
    },

    #[error("stream `{stream}` holds a non-finite value at index {index}")]
    NonFinite { stream: &'static str, index: usize },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DetectorError {
    #[error("invalid detector configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("invalid detector input: {0}")]
    Input(#[from] InputError),
}

/// Lifecycle of a single detector run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunState {
    Accumulating,
    /// Threshold crossed at sequence index `index`
    Detected { index: usize },
    /// All indices consumed without crossing
    Exhausted,
    /// Step budget spent without crossing
    Truncated { steps: usize },
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Accumulating)
    }
}

/// Result of a completed run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionOutcome {
    /// Index of the first threshold crossing, if any
    pub change_point: Option<usize>,
    /// Floored statistic after each step; `trace[k]` belongs to index `2 + 2k`
    pub trace: Vec<f64>,
    /// Drift-corrected increments `mmd - delta`, before flooring
    pub increments: Vec<f64>,
    pub state: RunState,
}

impl DetectionOutcome {
    pub fn detected(&self) -> bool {
        self.change_point.is_some()
    }

    /// Sequence index that `trace[k]` was computed at
    pub fn index_at(k: usize) -> usize {
        FIRST_INDEX + STRIDE * k
    }

    /// `(sequence index, statistic)` pairs
    pub fn indexed_trace(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.trace
            .iter()
            .enumerate()
            .map(|(k, &z)| (Self::index_at(k), z))
    }

    /// Largest statistic value reached during the run
    pub fn peak(&self) -> f64 {
        self.trace.iter().copied().fold(0.0, f64::max)
    }
}

/// Transient state of one run: the accumulated statistic and its history
#[derive(Debug, Clone)]
pub struct DetectorRun {
    config: DetectorConfig,
    statistic: f64,
    trace: Vec<f64>,
    increments: Vec<f64>,
    state: RunState,
}

impl DetectorRun {
    pub fn new(config: DetectorConfig) -> Self {
        Self {
            config,
            statistic: 0.0,
            trace: Vec::new(),
            increments: Vec::new(),
            state: RunState::Accumulating,
        }
    }

    fn with_capacity(config: DetectorConfig, steps: usize) -> Self {
        Self {
            trace: Vec::with_capacity(steps),
            increments: Vec::with_capacity(steps),
            ..Self::new(config)
        }
    }

    /// Feed the discrepancy observed at sequence index `index`.
    ///
    /// Terminal runs ignore further input.
    pub fn step(&mut self, index: usize, discrepancy: f64) -> RunState {
        if self.state.is_terminal() {
            return self.state;
        }

        let increment = discrepancy - self.config.delta;
        self.increments.push(increment);

        // Floor before recording and before the threshold comparison
        self.statistic = (self.statistic + increment).max(0.0);
        self.trace.push(self.statistic);

        if self.statistic > self.config.threshold {
            self.state = RunState::Detected { index };
        } else if let Some(max_steps) = self.config.max_steps {
            if self.trace.len() >= max_steps {
                self.state = RunState::Truncated {
                    steps: self.trace.len(),
                };
            }
        }

        self.state
    }

    pub fn statistic(&self) -> f64 {
        self.statistic
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn trace(&self) -> &[f64] {
        &self.trace
    }

    /// Close the run; an unfinished run becomes `Exhausted`
    pub fn finish(self) -> DetectionOutcome {
        let state = match self.state {
            RunState::Accumulating => RunState::Exhausted,
            other => other,
        };
        let change_point = match state {
            RunState::Detected { index } => Some(index),
            _ => None,
        };

        DetectionOutcome {
            change_point,
            trace: self.trace,
            increments: self.increments,
            state,
        }
    }
}

/// Kernel CUSUM detector with a validated configuration
#[derive(Debug, Clone)]
pub struct KernelCusum {
    config: DetectorConfig,
}

impl KernelCusum {
    pub fn new(config: DetectorConfig) -> Result<Self, DetectorError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Run the recursion over two test streams and two reference streams.
    ///
    /// All four streams must share one length of at least
    /// [`MIN_STREAM_LEN`] and hold only finite values.
    pub fn run(
        &self,
        test_a: &[f64],
        test_b: &[f64],
        ref_a: &[f64],
        ref_b: &[f64],
    ) -> Result<DetectionOutcome, DetectorError> {
        let streams = [
            ("test_a", test_a),
            ("test_b", test_b),
            ("ref_a", ref_a),
            ("ref_b", ref_b),
        ];
        let n = validate_streams(&streams)?;

        debug!(
            len = n,
            threshold = self.config.threshold,
            delta = self.config.delta,
            "Starting kernel CUSUM run."
        );

        let steps = (n - FIRST_INDEX).div_ceil(STRIDE);
        let mut run = DetectorRun::with_capacity(self.config, steps);

        for i in (FIRST_INDEX..n).step_by(STRIDE) {
            let discrepancy = mmd(test_a[i], test_b[i - 1], ref_a[i], ref_b[i - 1]);
            if run.step(i, discrepancy).is_terminal() {
                break;
            }
        }

        let outcome = run.finish();
        match outcome.state {
            RunState::Detected { index } => debug!(
                index,
                statistic = outcome.trace.last().copied().unwrap_or_default(),
                threshold = self.config.threshold,
                "Change point detected."
            ),
            RunState::Truncated { steps } => {
                debug!(steps, peak = outcome.peak(), "Run truncated by step budget.")
            }
            _ => debug!(
                steps = outcome.trace.len(),
                peak = outcome.peak(),
                "Run exhausted without change point."
            ),
        }

        Ok(outcome)
    }
}

fn validate_streams(streams: &[(&'static str, &[f64])]) -> Result<usize, InputError> {
    for &(stream, values) in streams {
        if values.len() < MIN_STREAM_LEN {
            return Err(InputError::TooShort {
                stream,
                len: values.len(),
            });
        }
    }

    let expected = streams[0].1.len();
    for &(stream, values) in streams {
        if values.len() != expected {
            return Err(InputError::LengthMismatch {
                stream,
                len: values.len(),
                expected,
            });
        }
        if let Some(index) = values.iter().position(|v| !v.is_finite()) {
            return Err(InputError::NonFinite { stream, index });
        }
    }

    Ok(expected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tracing::{Event, Level, Metadata, Subscriber, span};

    fn run_single(config: DetectorConfig, test: &[f64], reference: &[f64]) -> DetectionOutcome {
        KernelCusum::new(config)
            .unwrap()
            .run(test, test, reference, reference)
            .unwrap()
    }

    #[test]
    fn test_constant_streams_never_alarm() {
        let series = vec![4.2; 12];
        let outcome = run_single(DetectorConfig::new(0.015, 0.1), &series, &series);

        assert_eq!(outcome.change_point, None);
        assert_eq!(outcome.state, RunState::Exhausted);
        assert_eq!(outcome.trace.len(), 5); // indices 2, 4, 6, 8, 10
        assert!(outcome.trace.iter().all(|&z| z == 0.0));
        assert!(outcome.increments.iter().all(|&c| (c + 0.1).abs() < 1e-15));
    }

    #[test]
    fn test_detects_jump_in_test_stream() {
        let base: Vec<f64> = (0..200).map(|i| 10.0 + 0.05 * (i as f64 * 0.3).sin()).collect();
        let mut test = base.clone();
        for v in test.iter_mut().skip(100) {
            *v += 5.0;
        }

        let outcome = run_single(DetectorConfig::new(1.0, 0.1), &test, &base);

        let index = outcome.change_point.expect("jump should be detected");
        assert!((100..=110).contains(&index), "detected at {index}");
        assert_eq!(outcome.state, RunState::Detected { index });

        // Identical streams before the jump keep the statistic at zero
        let pre_jump = outcome
            .indexed_trace()
            .filter(|&(i, _)| i < 100)
            .map(|(_, z)| z);
        assert!(pre_jump.into_iter().all(|z| z == 0.0));

        // After the jump the statistic grows monotonically to the alarm
        let post_jump: Vec<f64> = outcome
            .indexed_trace()
            .filter(|&(i, _)| i >= 100)
            .map(|(_, z)| z)
            .collect();
        assert!(post_jump.windows(2).all(|w| w[1] >= w[0]));
    }

    #[test]
    fn test_sharp_jump_detected_one_pair_later() {
        let reference = vec![0.0; 40];
        let mut test = reference.clone();
        for v in test.iter_mut().skip(20) {
            *v = 5.0;
        }

        // The pair straddling the jump cancels out, the next pair alarms
        let outcome = run_single(DetectorConfig::new(1.0, 0.1), &test, &reference);
        assert_eq!(outcome.change_point, Some(22));
        assert_eq!(outcome.trace.len(), 11);
    }

    #[test]
    fn test_max_steps_truncates_run() {
        let series = vec![1.0; 50];
        let config = DetectorConfig::new(0.5, 0.1).with_max_steps(3);
        let outcome = run_single(config, &series, &series);

        assert_eq!(outcome.state, RunState::Truncated { steps: 3 });
        assert_eq!(outcome.change_point, None);
        assert_eq!(outcome.trace.len(), 3);
    }

    #[test]
    fn test_minimum_length_runs_one_step() {
        let outcome = run_single(DetectorConfig::default(), &[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]);
        assert_eq!(outcome.trace.len(), 1);
        assert_eq!(outcome.state, RunState::Exhausted);
    }

    #[test]
    fn test_rejects_invalid_config() {
        for threshold in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                KernelCusum::new(DetectorConfig::new(threshold, 0.1)),
                Err(DetectorError::Config(ConfigError::Threshold(_)))
            ));
        }
        assert!(matches!(
            KernelCusum::new(DetectorConfig::new(1.0, f64::NAN)),
            Err(DetectorError::Config(ConfigError::Delta(_)))
        ));
        assert!(matches!(
            KernelCusum::new(DetectorConfig::new(1.0, 0.1).with_max_steps(0)),
            Err(DetectorError::Config(ConfigError::MaxSteps))
        ));
    }

    #[test]
    fn test_rejects_short_streams() {
        let detector = KernelCusum::new(DetectorConfig::default()).unwrap();
        let ok = [1.0, 2.0, 3.0, 4.0];
        let short = [1.0, 2.0];

        let err = detector.run(&ok, &ok, &short, &ok).unwrap_err();
        assert_eq!(
            err,
            DetectorError::Input(InputError::TooShort {
                stream: "ref_a",
                len: 2
            })
        );
    }

    #[test]
    fn test_rejects_mismatched_lengths() {
        let detector = KernelCusum::new(DetectorConfig::default()).unwrap();
        let four = [1.0, 2.0, 3.0, 4.0];
        let five = [1.0, 2.0, 3.0, 4.0, 5.0];

        let err = detector.run(&four, &four, &four, &five).unwrap_err();
        assert_eq!(
            err,
            DetectorError::Input(InputError::LengthMismatch {
                stream: "ref_b",
                len: 5,
                expected: 4
            })
        );
    }

    #[test]
    fn test_rejects_non_finite_values() {
        let detector = KernelCusum::new(DetectorConfig::default()).unwrap();
        let ok = [1.0, 2.0, 3.0, 4.0];
        let bad = [1.0, f64::NAN, 3.0, 4.0];

        let err = detector.run(&ok, &bad, &ok, &ok).unwrap_err();
        assert_eq!(
            err,
            DetectorError::Input(InputError::NonFinite {
                stream: "test_b",
                index: 1
            })
        );
    }

    #[test]
    fn test_terminal_run_ignores_further_steps() {
        let mut run = DetectorRun::new(DetectorConfig::new(0.5, 0.0));
        assert_eq!(run.step(2, 1.0), RunState::Detected { index: 2 });
        assert_eq!(run.step(4, 1.0), RunState::Detected { index: 2 });
        assert_eq!(run.trace().len(), 1);
        assert_eq!(run.finish().change_point, Some(2));
    }

    #[test]
    fn test_outcome_serializes_state_tag() {
        let outcome = run_single(DetectorConfig::default(), &[1.0; 5], &[1.0; 5]);
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["state"]["state"], "exhausted");
        assert!(json["change_point"].is_null());
    }

    #[derive(Default)]
    struct LevelCounts {
        info: AtomicUsize,
        debug: AtomicUsize,
    }

    /// Counts events per level; spans are ignored
    struct LevelCounter(Arc<LevelCounts>);

    impl Subscriber for LevelCounter {
        fn enabled(&self, _: &Metadata<'_>) -> bool {
            true
        }
        fn new_span(&self, _: &span::Attributes<'_>) -> span::Id {
            span::Id::from_u64(1)
        }
        fn record(&self, _: &span::Id, _: &span::Record<'_>) {}
        fn record_follows_from(&self, _: &span::Id, _: &span::Id) {}
        fn event(&self, event: &Event<'_>) {
            let level = *event.metadata().level();
            if level == Level::INFO {
                self.0.info.fetch_add(1, Ordering::SeqCst);
            } else if level == Level::DEBUG {
                self.0.debug.fetch_add(1, Ordering::SeqCst);
            }
        }
        fn enter(&self, _: &span::Id) {}
        fn exit(&self, _: &span::Id) {}
    }

    #[test]
    fn test_detection_is_logged_at_debug_only() {
        let counts = Arc::new(LevelCounts::default());
        let reference = vec![0.0; 40];
        let mut test = reference.clone();
        for v in test.iter_mut().skip(20) {
            *v = 5.0;
        }

        let outcome = tracing::subscriber::with_default(LevelCounter(counts.clone()), || {
            run_single(DetectorConfig::new(1.0, 0.1), &test, &reference)
        });

        assert!(outcome.detected());
        assert_eq!(counts.info.load(Ordering::SeqCst), 0);
        assert!(counts.debug.load(Ordering::SeqCst) >= 2);
    }

    proptest! {
        #[test]
        fn trace_never_negative(
            values in proptest::collection::vec(-5.0f64..5.0, 12..80),
            delta in -0.5f64..0.5,
        ) {
            let reference: Vec<f64> = values.iter().rev().copied().collect();
            let outcome = run_single(DetectorConfig::new(1e6, delta), &values, &reference);
            prop_assert!(outcome.trace.iter().all(|&z| z >= 0.0));
        }

        #[test]
        fn change_point_is_first_crossing(
            values in proptest::collection::vec(-3.0f64..3.0, 12..80),
            threshold in 0.05f64..2.0,
        ) {
            let reference: Vec<f64> = values.iter().map(|v| v * 0.5).collect();
            let outcome = run_single(DetectorConfig::new(threshold, 0.0), &values, &reference);

            match outcome.change_point {
                Some(index) => {
                    let last = outcome.trace.len() - 1;
                    prop_assert_eq!(index, DetectionOutcome::index_at(last));
                    prop_assert!(outcome.trace[last] > threshold);
                    prop_assert!(outcome.trace[..last].iter().all(|&z| z <= threshold));
                }
                None => prop_assert!(outcome.trace.iter().all(|&z| z <= threshold)),
            }
        }
    }
}
