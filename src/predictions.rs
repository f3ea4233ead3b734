//! Writing scores into a prediction file.
//!
//! The rows and columns of a prediction file are dictated by a format file: its first column
//! is the record id, and the score column is filled with the computed scores. Rows are
//! written back in the order of the format file.

use std::{
    fs::File,
    path::{Path, PathBuf},
};

use csv::StringRecord;
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::model::Scores;

/// Name of the score column of the financial-crime prediction format.
pub const FINCRIME_SCORE_COLUMN: &str = "Score";

/// Name of the score column of the pandemic prediction format.
pub const PANDEMIC_SCORE_COLUMN: &str = "score";

#[derive(Error, Debug)]
/// Errors raised while writing predictions.
pub enum PredictionsError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid prediction format: {0}")]
    Csv(#[from] csv::Error),

    #[error("prediction format has no {0:?} column")]
    MissingColumn(String),

    #[error("prediction format has no id column")]
    NoIdColumn,
}

/// Where to read the prediction format from and where to write the predictions to.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PredictionPaths {
    pub format: PathBuf,
    pub dest: PathBuf,
}

impl PredictionPaths {
    pub fn new(format: impl Into<PathBuf>, dest: impl Into<PathBuf>) -> Self {
        Self {
            format: format.into(),
            dest: dest.into(),
        }
    }

    /// Fills the `score_column` of the format file with the given scores and writes the
    /// result to the destination. Ids without a score get an empty cell.
    ///
    /// Returns the number of rows written.
    pub fn write(&self, score_column: &str, scores: &Scores) -> Result<usize, PredictionsError> {
        let mut reader = csv::Reader::from_reader(open(&self.format)?);
        let headers = reader.headers()?.clone();
        if headers.is_empty() {
            return Err(PredictionsError::NoIdColumn);
        }
        let position = headers
            .iter()
            .position(|header| header == score_column)
            .ok_or_else(|| PredictionsError::MissingColumn(score_column.to_string()))?;

        // every row is filled before the destination is created
        let lookup = scores.to_map();
        let mut filled = Vec::new();
        let mut missing = 0;
        for record in reader.records() {
            let record = record?;
            let score = record
                .get(0)
                .and_then(|id| lookup.get(id))
                .map(|score| score.to_string());
            if score.is_none() {
                missing += 1;
            }
            let row: StringRecord = record
                .iter()
                .enumerate()
                .map(|(column, value)| {
                    if column == position {
                        score.as_deref().unwrap_or_default()
                    } else {
                        value
                    }
                })
                .collect();
            filled.push(row);
        }

        let rows = filled.len();
        let mut writer = csv::Writer::from_writer(create(&self.dest)?);
        writer.write_record(&headers)?;
        for row in &filled {
            writer.write_record(row)?;
        }
        writer.flush().map_err(|source| PredictionsError::Io {
            path: self.dest.clone(),
            source,
        })?;

        if missing > 0 {
            warn!("{} of {} predictions have no score", missing, rows);
        }
        info!("wrote {} predictions to {}", rows, self.dest.display());
        Ok(rows)
    }
}

fn open(path: &Path) -> Result<File, PredictionsError> {
    File::open(path).map_err(|source| PredictionsError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn create(path: &Path) -> Result<File, PredictionsError> {
    File::create(path).map_err(|source| PredictionsError::Io {
        path: path.to_path_buf(),
        source,
    })
}
