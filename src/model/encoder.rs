use serde::{Deserialize, Serialize};

use super::ModelError;

/// Encodes categories as integers, per feature.
///
/// The categories of every feature are learnt once, sorted, during [`fit`](Self::fit) and
/// then reused unchanged. Categories that were not seen during fitting are encoded as
/// `None`, the unknown bucket.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrdinalEncoder {
    categories: Vec<Vec<String>>,
}

impl OrdinalEncoder {
    pub fn fit<R: AsRef<[String]>>(rows: &[R]) -> Result<Self, ModelError> {
        let width = rows.first().map_or(0, |row| row.as_ref().len());
        let mut categories = vec![Vec::new(); width];
        for row in rows {
            let row = row.as_ref();
            if row.len() != width {
                return Err(ModelError::FeatureCount {
                    expected: width,
                    actual: row.len(),
                });
            }
            for (feature, value) in categories.iter_mut().zip(row) {
                feature.push(value.clone());
            }
        }
        for feature in categories.iter_mut() {
            feature.sort_unstable();
            feature.dedup();
        }
        Ok(Self { categories })
    }

    /// Number of features.
    pub fn width(&self) -> usize {
        self.categories.len()
    }

    /// Number of known categories of every feature.
    pub fn category_counts(&self) -> Vec<usize> {
        self.categories.iter().map(Vec::len).collect()
    }

    pub fn transform(&self, row: &[String]) -> Result<Vec<Option<usize>>, ModelError> {
        if row.len() != self.width() {
            return Err(ModelError::FeatureCount {
                expected: self.width(),
                actual: row.len(),
            });
        }
        Ok(self
            .categories
            .iter()
            .zip(row)
            .map(|(feature, value)| feature.binary_search(value).ok())
            .collect())
    }
}
