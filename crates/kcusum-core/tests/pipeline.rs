use kcusum_core::fitting::FitError;
use kcusum_core::{
    DetectorConfig, DistributionKind, Error, JsonReporter, KernelCusum, Pipeline, PipelineConfig,
    Reporter, RunReport, RunState, fit, generate, generate_named,
};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::BTreeMap;

const SHIFT: f64 = 8.0;

fn standard_normal(count: usize, seed: u64) -> Vec<f64> {
    let params = BTreeMap::from([("loc".to_string(), 0.0), ("scale".to_string(), 1.0)]);
    generate_named("norm", &params, count, &mut StdRng::seed_from_u64(seed)).unwrap()
}

#[test]
fn test_shift_is_detected_after_it_happens() {
    // Calibrate on a clean window, then replay the reference with a level shift
    let calibration = standard_normal(2000, 1);
    let fitted = fit(&calibration, &DistributionKind::COMMON).unwrap();

    let reference = generate(&fitted, 400, &mut StdRng::seed_from_u64(2)).unwrap();
    let shift_at = 201;
    let monitored: Vec<f64> = reference
        .iter()
        .enumerate()
        .map(|(i, &r)| if i >= shift_at { r + SHIFT } else { r })
        .collect();

    let detector = KernelCusum::new(DetectorConfig::default()).unwrap();
    let outcome = detector
        .run(&monitored, &monitored, &reference, &reference)
        .unwrap();

    let change_point = outcome.change_point.expect("shift should be detected");
    assert!(change_point > shift_at, "detected at {change_point}");
    assert!(change_point < shift_at + 40, "detected at {change_point}");
    assert_eq!(change_point % 2, 0);
    assert_eq!(outcome.state, RunState::Detected { index: change_point });

    // Identical streams never move the statistic before the shift
    let before = (shift_at - 2) / 2;
    assert!(outcome.trace[..before].iter().all(|&z| z == 0.0));
}

#[test]
fn test_identical_streams_never_alarm() {
    let reference = standard_normal(300, 9);
    let detector = KernelCusum::new(DetectorConfig::default()).unwrap();
    let outcome = detector
        .run(&reference, &reference, &reference, &reference)
        .unwrap();

    assert_eq!(outcome.change_point, None);
    assert_eq!(outcome.state, RunState::Exhausted);
    assert_eq!(outcome.trace.len(), 149);
}

#[test]
fn test_pipeline_is_reproducible_with_seed() {
    let config = PipelineConfig {
        seed: Some(42),
        ..PipelineConfig::default()
    };
    let signal = standard_normal(120, 3);

    let first = {
        let pipeline = Pipeline::new(config.clone()).unwrap();
        pipeline.run(&signal, &mut pipeline.rng()).unwrap()
    };
    let second = {
        let pipeline = Pipeline::new(config).unwrap();
        pipeline.run(&signal, &mut pipeline.rng()).unwrap()
    };

    assert_eq!(first, second);
    assert_eq!(first.reference.len(), signal.len());
}

#[test]
fn test_pipeline_rejects_constant_signal() {
    let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
    let err = pipeline
        .run(&[1.0; 50], &mut StdRng::seed_from_u64(0))
        .unwrap_err();
    assert!(matches!(err, Error::Fit(FitError::ZeroVariance)));
}

#[test]
fn test_pipeline_report_serializes() {
    let config = PipelineConfig {
        seed: Some(8),
        ..PipelineConfig::default()
    };
    let pipeline = Pipeline::new(config.clone()).unwrap();
    let signal = standard_normal(80, 4);
    let result = pipeline.run(&signal, &mut pipeline.rng()).unwrap();

    let mut reporter = JsonReporter::new(Vec::new());
    reporter.report(&result.report(&config)).unwrap();

    let restored: RunReport = serde_json::from_slice(&reporter.into_inner()).unwrap();
    assert_eq!(restored.outcome, result.outcome);
    assert_eq!(restored.fitted, Some(result.fitted));
}
