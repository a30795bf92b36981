//! # kcusum-core - Kernel CUSUM Change-Point Detection
//!
//! Detects a distributional change in a scalar series by comparing it with a
//! reference stream drawn from a parametric fit of the series itself.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────────┐   ┌─────────────────────┐
//! │   Fitter     │──▶│ ReferenceSampler │──▶│    KernelCusum      │
//! │ (histogram   │   │ (rand_distr,     │   │ (Gaussian-kernel    │
//! │  SSE ranking)│   │  loc + scale·z)  │   │  MMD, floored sum)  │
//! └──────────────┘   └──────────────────┘   └─────────────────────┘
//!        ▲                                             │
//!        │                                             ▼
//!  series / trajectory                          report (log, JSON, CSV)
//! ```
//!
//! [`pipeline::Pipeline`] wires the three stages together; each stage is
//! also usable on its own.

pub mod config;
pub mod detector;
pub mod distribution;
pub mod error;
pub mod fitting;
pub mod generator;
pub mod kernel;
pub mod pipeline;
pub mod report;
pub mod series;
pub mod trajectory;

pub use config::PipelineConfig;
pub use detector::{DetectionOutcome, DetectorConfig, DetectorRun, KernelCusum, RunState};
pub use distribution::{DistributionKind, FittedDistribution, Model, Parameters};
pub use error::{Error, Result};
pub use fitting::{CandidateFit, FitSummary, Fitter, FitterConfig, fit, summarize};
pub use generator::{ReferenceSampler, generate, generate_named};
pub use kernel::{gaussian_kernel, mmd};
pub use pipeline::{Pipeline, PipelineOutcome};
pub use report::{CsvTraceReporter, JsonReporter, LogReporter, Reporter, RunReport};
pub use trajectory::{Axis, Frame};
