//! Local models fitted and evaluated inside a single partition.
//!
//! The financial-crime models are [`NaiveBayesPipeline`]s: missing values are imputed with
//! [`MISSING_CATEGORY`], categories are ordinally encoded, and a categorical naive Bayes
//! classifier estimates the probability of the positive class. The [`SirModel`] is the
//! population-health risk model.

mod encoder;
mod naive_bayes;
mod pipeline;
mod sir;

use std::{collections::HashMap, path::Path};

use thiserror::Error;

pub use self::{
    encoder::OrdinalEncoder,
    naive_bayes::CategoricalNb,
    pipeline::{NaiveBayesPipeline, MISSING_CATEGORY},
    sir::SirModel,
};
use crate::common::Label;

/// Name of the model artifact in a client directory.
pub const MODEL_FILE: &str = "model.bin";

/// Errors raised by the local models.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("the model is used before being fitted")]
    NotFitted,

    #[error("cannot fit a model without training data")]
    EmptyTrainingSet,

    #[error("expected {expected} values, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("expected {expected} features per row, got {actual}")]
    FeatureCount { expected: usize, actual: usize },

    #[error("duplicate index value {0:?}")]
    DuplicateIndex(String),

    #[error("numerator and denominator must be set together")]
    PartialParameters,

    #[error("failed to access model artifact: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid model artifact: {0}")]
    Codec(#[from] bincode::Error),

    #[error("invalid model artifact: {0}")]
    Json(#[from] serde_json::Error),
}

/// Categorical features of indexed records, one row per record.
#[derive(Debug, Clone, PartialEq)]
pub struct Features {
    index: Vec<String>,
    rows: Vec<Vec<Option<String>>>,
}

impl Features {
    /// Creates a feature frame.
    ///
    /// # Errors
    /// Fails if the index and the rows have different lengths or if rows have different widths.
    pub fn new(index: Vec<String>, rows: Vec<Vec<Option<String>>>) -> Result<Self, ModelError> {
        if index.len() != rows.len() {
            return Err(ModelError::LengthMismatch {
                expected: index.len(),
                actual: rows.len(),
            });
        }
        if let Some(first) = rows.first() {
            if let Some(row) = rows.iter().find(|row| row.len() != first.len()) {
                return Err(ModelError::FeatureCount {
                    expected: first.len(),
                    actual: row.len(),
                });
            }
        }
        Ok(Self { index, rows })
    }

    /// Creates a frame with a single feature.
    pub fn single(index: Vec<String>, column: Vec<Option<String>>) -> Result<Self, ModelError> {
        Self::new(index, column.into_iter().map(|value| vec![value]).collect())
    }

    pub fn index(&self) -> &[String] {
        &self.index
    }

    pub fn rows(&self) -> &[Vec<Option<String>>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

/// Per-record scores, indexed identically to the records they were computed for.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scores {
    index: Vec<String>,
    values: Vec<f64>,
}

impl Scores {
    pub(crate) fn from_parts(index: Vec<String>, values: Vec<f64>) -> Self {
        debug_assert_eq!(index.len(), values.len());
        Self { index, values }
    }

    /// The same score for every record of the index.
    pub fn constant(index: Vec<String>, value: f64) -> Self {
        let values = vec![value; index.len()];
        Self { index, values }
    }

    pub fn index(&self) -> &[String] {
        &self.index
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.index
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().copied())
    }

    /// Looks up scores by record id.
    pub fn to_map(&self) -> HashMap<&str, f64> {
        self.iter().collect()
    }

    /// Concatenates scores in order.
    ///
    /// # Errors
    /// Fails if a record id appears more than once.
    pub fn concat(parts: impl IntoIterator<Item = Scores>) -> Result<Self, ModelError> {
        let mut concatenated = Scores::default();
        let mut seen = std::collections::HashSet::new();
        for part in parts {
            for id in &part.index {
                if !seen.insert(id.clone()) {
                    return Err(ModelError::DuplicateIndex(id.clone()));
                }
            }
            concatenated.index.extend(part.index);
            concatenated.values.extend(part.values);
        }
        Ok(concatenated)
    }
}

/// A model that is fitted and evaluated locally, and persisted between the train and test
/// stages.
pub trait LocalModel: Sized {
    /// Fits the model on the given features and labels.
    fn fit(&mut self, features: &Features, labels: &[Label]) -> Result<&mut Self, ModelError>;

    /// Predicts the probability of the positive class for every record.
    ///
    /// # Errors
    /// Fails with [`ModelError::NotFitted`] if the model hasn't been fitted or loaded.
    fn predict(&self, features: &Features) -> Result<Scores, ModelError>;

    fn save(&self, path: &Path) -> Result<(), ModelError>;

    fn load(path: &Path) -> Result<Self, ModelError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_features_shape() {
        assert!(Features::new(vec!["a".into()], vec![]).is_err());
        assert!(matches!(
            Features::new(
                vec!["a".into(), "b".into()],
                vec![vec![None], vec![None, None]]
            ),
            Err(ModelError::FeatureCount {
                expected: 1,
                actual: 2
            })
        ));
        let features = Features::single(vec!["a".into()], vec![Some("x".into())]).unwrap();
        assert_eq!(features.rows(), &[vec![Some("x".to_string())]]);
    }

    #[test]
    fn test_concat_scores() {
        let first = Scores::from_parts(vec!["a".into()], vec![0.5]);
        let second = Scores::from_parts(vec!["b".into(), "c".into()], vec![0.1, 0.2]);
        let all = Scores::concat(vec![first.clone(), second]).unwrap();
        assert_eq!(all.index(), &["a", "b", "c"]);
        assert_eq!(all.values(), &[0.5, 0.1, 0.2]);

        assert!(matches!(
            Scores::concat(vec![first.clone(), first]),
            Err(ModelError::DuplicateIndex(id)) if id == "a"
        ));
    }
}
