use crate::config::ConfigFileError;
use crate::detector::DetectorError;
use crate::fitting::FitError;
use crate::generator::GenerateError;
use crate::report::ReportError;
use crate::series::SeriesError;
use crate::trajectory::TrajectoryError;
use thiserror::Error;

/// Any failure surfaced by the crate
#[derive(Debug, Error)]
pub enum Error {
    #[error("fitting failed: {0}")]
    Fit(#[from] FitError),

    #[error("reference generation failed: {0}")]
    Generate(#[from] GenerateError),

    #[error("detection failed: {0}")]
    Detect(#[from] DetectorError),

    #[error("trajectory error: {0}")]
    Trajectory(#[from] TrajectoryError),

    #[error("series error: {0}")]
    Series(#[from] SeriesError),

    #[error(transparent)]
    Config(#[from] ConfigFileError),

    #[error("report error: {0}")]
    Report(#[from] ReportError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
