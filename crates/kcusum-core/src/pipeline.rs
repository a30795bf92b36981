//! Fit → generate → detect
//!
//! The end-to-end run over one observed signal. The signal is fitted, a
//! reference stream of the same length is drawn from the winning family, and
//! the detector compares the signal against that reference. The signal feeds
//! both test streams and the single reference stream feeds both reference
//! streams.

use crate::config::PipelineConfig;
use crate::detector::{DetectionOutcome, KernelCusum};
use crate::distribution::FittedDistribution;
use crate::error::Result;
use crate::fitting::{FitSummary, Fitter};
use crate::generator::generate;
use crate::report::RunReport;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
    fitter: Fitter,
    detector: KernelCusum,
}

/// Everything one pipeline run produced
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutcome {
    pub fitted: FittedDistribution,
    pub reference: Vec<f64>,
    pub outcome: DetectionOutcome,
}

impl PipelineOutcome {
    pub fn report(&self, config: &PipelineConfig) -> RunReport {
        RunReport::new(
            config.detector,
            Some(self.fitted.clone()),
            self.outcome.clone(),
        )
    }
}

impl Pipeline {
    /// Build a pipeline; the detector settings are checked here
    pub fn new(config: PipelineConfig) -> Result<Self> {
        let detector = KernelCusum::new(config.detector)?;
        let fitter = Fitter::new(config.fitter.clone());
        Ok(Self {
            config,
            fitter,
            detector,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Random source for the reference stream: seeded when configured,
    /// OS entropy otherwise
    pub fn rng(&self) -> StdRng {
        match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        }
    }

    /// Ranked fit diagnostics for `signal` under the configured catalog
    pub fn summarize(&self, signal: &[f64]) -> Result<FitSummary> {
        Ok(self.fitter.summarize(signal)?)
    }

    pub fn run<R: Rng + ?Sized>(&self, signal: &[f64], rng: &mut R) -> Result<PipelineOutcome> {
        debug!(
            len = signal.len(),
            candidates = self.config.fitter.catalog.len(),
            "Starting pipeline run."
        );

        let fitted = self.fitter.fit(signal)?;
        let reference = generate(&fitted, signal.len(), rng)?;
        debug!(kind = %fitted.kind, len = reference.len(), "Generated reference stream.");

        let outcome = self.detector.run(signal, signal, &reference, &reference)?;

        info!(
            reference = %fitted.kind,
            change_point = ?outcome.change_point,
            steps = outcome.trace.len(),
            "Pipeline run complete."
        );

        Ok(PipelineOutcome {
            fitted,
            reference,
            outcome,
        })
    }
}
