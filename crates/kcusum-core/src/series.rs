//! Flat-file persistence of scalar series, one value per line.

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SeriesError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("line {line}: cannot parse `{text}` as a number")]
    Parse { line: usize, text: String },
}

/// Write one value per line in scientific notation
pub fn write_series<W: Write>(mut writer: W, values: &[f64]) -> io::Result<()> {
    for v in values {
        writeln!(writer, "{v:.18e}")?;
    }
    writer.flush()
}

/// Read one value per line; blank lines and `#` comments are skipped
pub fn read_series<R: BufRead>(reader: R) -> Result<Vec<f64>, SeriesError> {
    let mut values = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        let text = line.trim();
        if text.is_empty() || text.starts_with('#') {
            continue;
        }
        let value = text.parse::<f64>().map_err(|_| SeriesError::Parse {
            line: i + 1,
            text: text.to_string(),
        })?;
        values.push(value);
    }
    Ok(values)
}

pub fn load_series(path: impl AsRef<Path>) -> Result<Vec<f64>, SeriesError> {
    read_series(BufReader::new(File::open(path)?))
}

pub fn save_series(path: impl AsRef<Path>, values: &[f64]) -> Result<(), SeriesError> {
    write_series(BufWriter::new(File::create(path)?), values)?;
    Ok(())
}
