//! XYZ Trajectory Reader
//!
//! Reads multi-frame XYZ files and reduces each frame to a single scalar,
//! the mean of one Cartesian coordinate over all atoms. Frame layout:
//!
//! ```text
//! N
//! comment line
//! symbol x y z      (N lines, extra columns ignored)
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Upper bound on per-frame preallocation
const MAX_PREALLOC_ATOMS: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    #[default]
    X,
    Y,
    Z,
}

impl Axis {
    fn index(self) -> usize {
        match self {
            Self::X => 0,
            Self::Y => 1,
            Self::Z => 2,
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::X => "x",
            Self::Y => "y",
            Self::Z => "z",
        })
    }
}

impl FromStr for Axis {
    type Err = TrajectoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "x" => Ok(Self::X),
            "y" => Ok(Self::Y),
            "z" => Ok(Self::Z),
            _ => Err(TrajectoryError::UnknownAxis(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
pub enum TrajectoryError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("line {line}: expected an atom count, found `{text}`")]
    BadCount { line: usize, text: String },

    #[error("line {line}: frame ends after {found} of {expected} atoms")]
    Truncated {
        line: usize,
        expected: usize,
        found: usize,
    },

    #[error("line {line}: malformed atom record `{text}`")]
    BadAtom { line: usize, text: String },

    #[error("frame {frame} has no atoms")]
    EmptyFrame { frame: usize },

    #[error("unknown axis `{0}`, expected x, y or z")]
    UnknownAxis(String),
}

/// One trajectory frame
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub comment: String,
    pub symbols: Vec<String>,
    pub positions: Vec<[f64; 3]>,
}

impl Frame {
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Mean of one coordinate over all atoms; `None` for an empty frame
    pub fn mean_coordinate(&self, axis: Axis) -> Option<f64> {
        if self.positions.is_empty() {
            return None;
        }
        let sum: f64 = self.positions.iter().map(|p| p[axis.index()]).sum();
        Some(sum / self.positions.len() as f64)
    }
}

/// Per-frame mean coordinate; `series[k]` belongs to frame `k`.
///
/// An empty frame has no mean and fails the whole series.
pub fn mean_coordinate_series(frames: &[Frame], axis: Axis) -> Result<Vec<f64>, TrajectoryError> {
    frames
        .iter()
        .enumerate()
        .map(|(frame, f)| {
            f.mean_coordinate(axis)
                .ok_or(TrajectoryError::EmptyFrame { frame })
        })
        .collect()
}

pub fn read_xyz<R: BufRead>(reader: R) -> Result<Vec<Frame>, TrajectoryError> {
    let mut lines = reader.lines().enumerate().map(|(i, l)| (i + 1, l));
    let mut frames = Vec::new();

    while let Some((line_no, line)) = lines.next() {
        let line = line?;
        let text = line.trim();
        if text.is_empty() {
            continue;
        }

        let expected: usize = text.parse().map_err(|_| TrajectoryError::BadCount {
            line: line_no,
            text: text.to_string(),
        })?;

        let comment = match lines.next() {
            Some((_, l)) => l?.trim().to_string(),
            None => {
                return Err(TrajectoryError::Truncated {
                    line: line_no,
                    expected,
                    found: 0,
                });
            }
        };

        // The count is untrusted input
        let capacity = expected.min(MAX_PREALLOC_ATOMS);
        let mut symbols = Vec::with_capacity(capacity);
        let mut positions = Vec::with_capacity(capacity);
        let mut last_line = line_no + 1;

        while positions.len() < expected {
            let Some((atom_line, l)) = lines.next() else {
                return Err(TrajectoryError::Truncated {
                    line: last_line,
                    expected,
                    found: positions.len(),
                });
            };
            last_line = atom_line;
            let l = l?;
            let (symbol, position) = parse_atom(&l).ok_or_else(|| TrajectoryError::BadAtom {
                line: atom_line,
                text: l.trim().to_string(),
            })?;
            symbols.push(symbol);
            positions.push(position);
        }

        frames.push(Frame {
            comment,
            symbols,
            positions,
        });
    }

    Ok(frames)
}

pub fn load_xyz(path: impl AsRef<Path>) -> Result<Vec<Frame>, TrajectoryError> {
    read_xyz(BufReader::new(File::open(path)?))
}

fn parse_atom(line: &str) -> Option<(String, [f64; 3])> {
    let mut fields = line.split_whitespace();
    let symbol = fields.next()?.to_string();
    let mut position = [0.0; 3];
    for slot in &mut position {
        *slot = fields.next()?.parse().ok()?;
    }
    Some((symbol, position))
}
