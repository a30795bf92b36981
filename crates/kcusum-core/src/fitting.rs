//! Distribution Fitting
//!
//! Fits a scalar sample against a catalog of parametric families and ranks
//! the candidates by the sum-of-squared error between the fitted density and
//! a density histogram of the sample:
//!
//!   SSE = Σ_bins (pdf(centre) - height)²
//!
//! Parameters are estimated per family with closed-form moment estimators,
//! except `weibull_min` which uses Newton-Raphson maximum likelihood.

use crate::distribution::{DistributionKind, FittedDistribution, Model, Parameters};
use serde::{Deserialize, Serialize};
use statrs::statistics::{Data, Median, OrderStatistics, Statistics};
use std::f64::consts::PI;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Smallest sample the fitter accepts
pub const MIN_SAMPLE_LEN: usize = 5;
pub const DEFAULT_BINS: usize = 100;

/// Shape estimates beyond this are numerically degenerate
const MAX_SHAPE: f64 = 1e7;

/// Newton-Raphson budget for the Weibull shape
const WEIBULL_MAX_ITER: usize = 100;
const WEIBULL_TOL: f64 = 1e-10;

/// Fitter settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitterConfig {
    /// Number of histogram bins in the shared discretisation
    pub bins: usize,
    /// Histogram range; the sample range when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range: Option<(f64, f64)>,
    /// Families to evaluate, in order
    pub catalog: Vec<DistributionKind>,
}

impl Default for FitterConfig {
    fn default() -> Self {
        Self {
            bins: DEFAULT_BINS,
            range: None,
            catalog: DistributionKind::COMMON.to_vec(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FitError {
    #[error("sample is empty")]
    EmptySample,

    #[error("sample holds a non-finite value at index {index}")]
    NonFinite { index: usize },

    #[error("sample has {len} values, at least {min} are required")]
    TooFewValues { len: usize, min: usize },

    #[error("sample has zero variance")]
    ZeroVariance,

    #[error("candidate catalog is empty")]
    EmptyCatalog,

    #[error("invalid fitter configuration: {0}")]
    InvalidConfig(String),

    #[error("no candidate in the catalog could be fit ({} failed)", .failures.len())]
    NoCandidate { failures: Vec<FitFailure> },
}

/// A candidate that could not be fit, with the reason
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitFailure {
    pub kind: DistributionKind,
    pub reason: String,
}

/// One evaluated candidate with its diagnostics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateFit {
    pub fitted: FittedDistribution,
    pub log_likelihood: f64,
    pub aic: f64,
    pub bic: f64,
    /// Kolmogorov-Smirnov distance between the sample and the fitted CDF
    pub ks_statistic: f64,
}

/// All candidates ranked by ascending error, plus the failures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitSummary {
    pub ranked: Vec<CandidateFit>,
    pub failures: Vec<FitFailure>,
}

impl FitSummary {
    pub fn best(&self) -> Option<&CandidateFit> {
        self.ranked.first()
    }
}

/// Fit over `catalog` with the default histogram settings
pub fn fit(sample: &[f64], catalog: &[DistributionKind]) -> Result<FittedDistribution, FitError> {
    Fitter::with_catalog(catalog).fit(sample)
}

/// Rank all candidates in `catalog` with the default histogram settings
pub fn summarize(sample: &[f64], catalog: &[DistributionKind]) -> Result<FitSummary, FitError> {
    Fitter::with_catalog(catalog).summarize(sample)
}

#[derive(Debug, Clone, Default)]
pub struct Fitter {
    config: FitterConfig,
}

impl Fitter {
    pub fn new(config: FitterConfig) -> Self {
        Self { config }
    }

    fn with_catalog(catalog: &[DistributionKind]) -> Self {
        Self::new(FitterConfig {
            catalog: catalog.to_vec(),
            ..FitterConfig::default()
        })
    }

    pub fn config(&self) -> &FitterConfig {
        &self.config
    }

    /// Best-fitting candidate of the configured catalog by minimum error
    pub fn fit(&self, sample: &[f64]) -> Result<FittedDistribution, FitError> {
        let (candidates, failures) = self.evaluate(sample)?;
        let best = select_best(candidates).ok_or(FitError::NoCandidate { failures })?;
        info!(
            kind = %best.fitted.kind,
            error = best.fitted.error,
            "Selected best-fitting distribution."
        );
        Ok(best.fitted)
    }

    /// Every candidate ranked by error, for diagnostics
    pub fn summarize(&self, sample: &[f64]) -> Result<FitSummary, FitError> {
        let (mut ranked, failures) = self.evaluate(sample)?;
        if ranked.is_empty() {
            return Err(FitError::NoCandidate { failures });
        }

        // Stable: equal errors keep catalog order
        ranked.sort_by(|a, b| a.fitted.error.total_cmp(&b.fitted.error));
        Ok(FitSummary { ranked, failures })
    }

    fn evaluate(&self, sample: &[f64]) -> Result<(Vec<CandidateFit>, Vec<FitFailure>), FitError> {
        let catalog = &self.config.catalog;
        let stats = SampleStats::compute(sample)?;
        if catalog.is_empty() {
            return Err(FitError::EmptyCatalog);
        }
        let histogram = self.histogram(sample, &stats)?;

        let mut candidates = Vec::with_capacity(catalog.len());
        let mut failures = Vec::new();
        let mut seen = Vec::with_capacity(catalog.len());

        for &kind in catalog.iter() {
            if seen.contains(&kind) {
                continue;
            }
            seen.push(kind);

            match fit_candidate(kind, &stats, &histogram) {
                Ok(candidate) => {
                    debug!(kind = %kind, error = candidate.fitted.error, "Fitted candidate.");
                    candidates.push(candidate);
                }
                Err(reason) => {
                    warn!(kind = %kind, reason = %reason, "Candidate could not be fit.");
                    failures.push(FitFailure { kind, reason });
                }
            }
        }

        Ok((candidates, failures))
    }

    fn histogram(&self, sample: &[f64], stats: &SampleStats) -> Result<Histogram, FitError> {
        if self.config.bins == 0 {
            return Err(FitError::InvalidConfig("bins must be at least 1".into()));
        }
        let (lo, hi) = self.config.range.unwrap_or((stats.min, stats.max));
        if !lo.is_finite() || !hi.is_finite() || lo >= hi {
            return Err(FitError::InvalidConfig(format!(
                "histogram range [{lo}, {hi}] is empty"
            )));
        }
        Ok(Histogram::density(sample, self.config.bins, lo, hi))
    }
}

/// Minimum-error candidate; strict comparison so the first of exact ties wins
fn select_best(candidates: Vec<CandidateFit>) -> Option<CandidateFit> {
    let mut best: Option<CandidateFit> = None;
    for candidate in candidates {
        let better = best
            .as_ref()
            .is_none_or(|b| candidate.fitted.error < b.fitted.error);
        if better {
            best = Some(candidate);
        }
    }
    best
}

/// Moments and order statistics shared by all estimators
#[derive(Debug, Clone)]
struct SampleStats {
    /// Sorted copy of the sample
    sorted: Vec<f64>,
    mean: f64,
    /// Population standard deviation
    std: f64,
    skewness: f64,
    min: f64,
    max: f64,
    median: f64,
    iqr: f64,
}

impl SampleStats {
    fn compute(sample: &[f64]) -> Result<Self, FitError> {
        if sample.is_empty() {
            return Err(FitError::EmptySample);
        }
        if let Some(index) = sample.iter().position(|v| !v.is_finite()) {
            return Err(FitError::NonFinite { index });
        }
        if sample.len() < MIN_SAMPLE_LEN {
            return Err(FitError::TooFewValues {
                len: sample.len(),
                min: MIN_SAMPLE_LEN,
            });
        }

        let min = Statistics::min(sample);
        let max = Statistics::max(sample);
        if min == max {
            return Err(FitError::ZeroVariance);
        }

        let mean = Statistics::mean(sample);
        let std = Statistics::population_std_dev(sample);
        if std <= 0.0 {
            return Err(FitError::ZeroVariance);
        }

        let n = sample.len() as f64;
        let third = sample.iter().map(|x| (x - mean).powi(3)).sum::<f64>() / n;
        let skewness = third / std.powi(3);

        let mut sorted = sample.to_vec();
        sorted.sort_by(f64::total_cmp);

        let mut data = Data::new(sorted.clone());
        let median = data.median();
        let iqr = data.interquartile_range();

        Ok(Self {
            sorted,
            mean,
            std,
            skewness,
            min,
            max,
            median,
            iqr,
        })
    }

    fn len(&self) -> usize {
        self.sorted.len()
    }
}

/// Density histogram evaluated at bin centres
#[derive(Debug, Clone)]
struct Histogram {
    centres: Vec<f64>,
    heights: Vec<f64>,
}

impl Histogram {
    /// Equal-width bins over `[lo, hi]`; the last bin is closed on the right
    /// and values outside the range are dropped.
    fn density(sample: &[f64], bins: usize, lo: f64, hi: f64) -> Self {
        let width = (hi - lo) / bins as f64;
        let mut counts = vec![0_usize; bins];

        for &x in sample {
            if x < lo || x > hi {
                continue;
            }
            let bin = (((x - lo) / width).floor() as usize).min(bins - 1);
            counts[bin] += 1;
        }

        let norm = sample.len() as f64 * width;
        let centres = (0..bins).map(|i| lo + (i as f64 + 0.5) * width).collect();
        let heights = counts.iter().map(|&c| c as f64 / norm).collect();

        Self { centres, heights }
    }

    fn squared_error(&self, model: &Model) -> f64 {
        self.centres
            .iter()
            .zip(&self.heights)
            .map(|(&x, &h)| (model.pdf(x) - h).powi(2))
            .sum()
    }
}

fn fit_candidate(
    kind: DistributionKind,
    stats: &SampleStats,
    histogram: &Histogram,
) -> Result<CandidateFit, String> {
    let params = estimate(kind, stats)?;
    let model = Model::new(kind, params).map_err(|e| e.to_string())?;

    let error = histogram.squared_error(&model);
    if !error.is_finite() {
        return Err("goodness-of-fit error is not finite".into());
    }

    let n = stats.len() as f64;
    let k = kind.param_count() as f64;
    let log_likelihood = log_likelihood(&model, &stats.sorted);

    Ok(CandidateFit {
        fitted: FittedDistribution::from_parameters(kind, params, error),
        log_likelihood,
        aic: 2.0 * k - 2.0 * log_likelihood,
        bic: k * n.ln() - 2.0 * log_likelihood,
        ks_statistic: ks_statistic(&model, &stats.sorted),
    })
}

fn estimate(kind: DistributionKind, s: &SampleStats) -> Result<Parameters, String> {
    match kind {
        DistributionKind::Normal => Ok(Parameters::new(None, s.mean, s.std)),
        DistributionKind::Exponential => Ok(Parameters::new(None, s.min, s.mean - s.min)),
        DistributionKind::Uniform => Ok(Parameters::new(None, s.min, s.max - s.min)),
        DistributionKind::Cauchy => {
            if s.iqr <= 0.0 {
                return Err("interquartile range is zero".into());
            }
            Ok(Parameters::new(None, s.median, s.iqr / 2.0))
        }
        DistributionKind::Rayleigh => {
            let scale = s.std / (2.0 - PI / 2.0).sqrt();
            Ok(Parameters::new(None, s.mean - scale * (PI / 2.0).sqrt(), scale))
        }
        DistributionKind::Gamma => {
            let skew = positive_skewness(s)?;
            let a = bounded_shape(4.0 / (skew * skew))?;
            let scale = s.std * skew / 2.0;
            Ok(Parameters::new(Some(a), s.mean - a * scale, scale))
        }
        DistributionKind::ChiSquared => {
            let skew = positive_skewness(s)?;
            let df = bounded_shape(8.0 / (skew * skew))?;
            let scale = s.std / (2.0 * df).sqrt();
            Ok(Parameters::new(Some(df), s.mean - df * scale, scale))
        }
        DistributionKind::LogNormal => {
            // Skewness of a log-normal is u³ + 3u with u = √(w - 1), w = exp(s²)
            let skew = positive_skewness(s)?;
            let root = (skew * skew + 4.0).sqrt();
            let u = ((skew + root) / 2.0).cbrt() + ((skew - root) / 2.0).cbrt();
            let w = 1.0 + u * u;
            let shape = bounded_shape(w.ln().sqrt())?;
            let scale = s.std / (w * (w - 1.0)).sqrt();
            if !scale.is_finite() || scale <= 0.0 {
                return Err("skewness too small for a log-normal".into());
            }
            Ok(Parameters::new(Some(shape), s.mean - scale * w.sqrt(), scale))
        }
        DistributionKind::Weibull => {
            if s.min <= 0.0 {
                return Err("weibull_min requires strictly positive values".into());
            }
            let (shape, scale) = weibull_mle(&s.sorted)
                .ok_or_else(|| "maximum-likelihood iteration did not converge".to_string())?;
            Ok(Parameters::new(Some(bounded_shape(shape)?), 0.0, scale))
        }
    }
}

fn positive_skewness(s: &SampleStats) -> Result<f64, String> {
    if s.skewness > 0.0 {
        Ok(s.skewness)
    } else {
        Err(format!(
            "requires positive skewness, sample skewness is {:.4}",
            s.skewness
        ))
    }
}

fn bounded_shape(shape: f64) -> Result<f64, String> {
    if shape.is_finite() && shape > 0.0 && shape <= MAX_SHAPE {
        Ok(shape)
    } else {
        Err(format!("shape estimate {shape} is degenerate"))
    }
}

/// Two-parameter Weibull MLE (location fixed at zero).
///
/// Solves the profile likelihood equation for the shape β
///
///   f(β) = n/β + Σ ln t - n · Σ t^β ln t / Σ t^β = 0
///
/// by Newton-Raphson, then η = (Σ t^β / n)^(1/β). Values are rescaled by
/// their maximum first so that t^β stays within range for large β.
fn weibull_mle(values: &[f64]) -> Option<(f64, f64)> {
    let t_max = values.iter().copied().fold(f64::MIN, f64::max);
    if t_max <= 0.0 {
        return None;
    }

    let ln_t: Vec<f64> = values.iter().map(|t| (t / t_max).ln()).collect();
    let n = values.len() as f64;
    let sum_ln_t: f64 = ln_t.iter().sum();

    let mut beta = 1.2_f64;
    for _ in 0..WEIBULL_MAX_ITER {
        let (mut s0, mut s1, mut s2) = (0.0_f64, 0.0_f64, 0.0_f64);
        for &lt in &ln_t {
            let t_beta = (beta * lt).exp();
            s0 += t_beta;
            s1 += t_beta * lt;
            s2 += t_beta * lt * lt;
        }
        if s0 == 0.0 {
            return None;
        }

        let f = n / beta + sum_ln_t - n * s1 / s0;
        let f_prime = -n / (beta * beta) - n * (s2 * s0 - s1 * s1) / (s0 * s0);
        if f_prime.abs() < 1e-30 {
            return None;
        }

        let step = f / f_prime;
        // Keep the iterate positive by halving towards zero
        beta = if beta - step <= 0.0 { beta / 2.0 } else { beta - step };

        if step.abs() < WEIBULL_TOL * beta.max(1.0) {
            let s0: f64 = ln_t.iter().map(|lt| (beta * lt).exp()).sum();
            let eta = t_max * (s0 / n).powf(1.0 / beta);
            return (beta.is_finite() && eta.is_finite()).then_some((beta, eta));
        }
    }

    None
}

fn log_likelihood(model: &Model, sample: &[f64]) -> f64 {
    let ll: f64 = sample.iter().map(|&x| model.ln_pdf(x)).sum();
    if ll.is_nan() { f64::NEG_INFINITY } else { ll }
}

/// Two-sided KS distance of a sorted sample against the model CDF
fn ks_statistic(model: &Model, sorted: &[f64]) -> f64 {
    let n = sorted.len() as f64;
    sorted
        .iter()
        .enumerate()
        .map(|(i, &x)| {
            let f = model.cdf(x);
            let above = (i as f64 + 1.0) / n - f;
            let below = f - i as f64 / n;
            above.max(below)
        })
        .fold(0.0, f64::max)
}
