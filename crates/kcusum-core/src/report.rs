//! Run Reporting
//!
//! Presentation of a finished detection run. The detector itself never
//! prints; callers hand a [`RunReport`] to one or more [`Reporter`]s.

use crate::detector::{DetectionOutcome, DetectorConfig, RunState};
use crate::distribution::FittedDistribution;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Everything needed to describe one run after the fact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub generated_at: DateTime<Utc>,
    pub config: DetectorConfig,
    /// Reference distribution, when the run went through the fitter
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fitted: Option<FittedDistribution>,
    pub outcome: DetectionOutcome,
}

impl RunReport {
    pub fn new(
        config: DetectorConfig,
        fitted: Option<FittedDistribution>,
        outcome: DetectionOutcome,
    ) -> Self {
        Self {
            generated_at: Utc::now(),
            config,
            fitted,
            outcome,
        }
    }
}

pub trait Reporter {
    fn report(&mut self, report: &RunReport) -> Result<(), ReportError>;
}

/// Emits a one-event summary through `tracing`
#[derive(Debug, Default)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn report(&mut self, report: &RunReport) -> Result<(), ReportError> {
        let outcome = &report.outcome;
        let reference = report
            .fitted
            .as_ref()
            .map(|f| f.kind.name())
            .unwrap_or("none");

        match outcome.state {
            RunState::Detected { index } => info!(
                change_point = index,
                steps = outcome.trace.len(),
                peak = outcome.peak(),
                reference,
                "Change point detected."
            ),
            RunState::Truncated { steps } => info!(
                steps,
                peak = outcome.peak(),
                reference,
                "Step budget spent without a detection."
            ),
            RunState::Exhausted | RunState::Accumulating => info!(
                steps = outcome.trace.len(),
                peak = outcome.peak(),
                reference,
                "No change point detected."
            ),
        }
        Ok(())
    }
}

/// Writes the whole report as pretty-printed JSON
#[derive(Debug)]
pub struct JsonReporter<W: Write> {
    writer: W,
}

impl<W: Write> JsonReporter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> Reporter for JsonReporter<W> {
    fn report(&mut self, report: &RunReport) -> Result<(), ReportError> {
        serde_json::to_writer_pretty(&mut self.writer, report)?;
        writeln!(self.writer)?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Writes the statistic trace as CSV for plotting.
///
/// Columns: `index,statistic,increment,threshold`.
#[derive(Debug)]
pub struct CsvTraceReporter<W: Write> {
    writer: W,
}

impl<W: Write> CsvTraceReporter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> Reporter for CsvTraceReporter<W> {
    fn report(&mut self, report: &RunReport) -> Result<(), ReportError> {
        let threshold = report.config.threshold;
        writeln!(self.writer, "index,statistic,increment,threshold")?;
        for ((index, statistic), increment) in report
            .outcome
            .indexed_trace()
            .zip(report.outcome.increments.iter())
        {
            writeln!(
                self.writer,
                "{index},{statistic},{increment},{threshold}"
            )?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
