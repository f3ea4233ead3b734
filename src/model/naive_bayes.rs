use serde::{Deserialize, Serialize};

use super::ModelError;
use crate::common::Label;

/// Naive Bayes classifier for ordinally encoded categorical features.
///
/// Category likelihoods use additive (Laplace) smoothing with `alpha`:
/// `P(x_i = k | c) = (N_cik + alpha) / (N_c + alpha * K_i)` where `K_i` is the number of
/// categories of feature `i`. Features in the unknown bucket carry no evidence and are
/// skipped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoricalNb {
    alpha: f64,
    classes: Vec<Label>,
    class_counts: Vec<f64>,
    /// `[feature][class][category]`
    category_counts: Vec<Vec<Vec<f64>>>,
}

impl CategoricalNb {
    pub const DEFAULT_ALPHA: f64 = 1.0;

    /// Fits the classifier.
    ///
    /// `n_categories` holds the number of categories of every feature; encoded rows must
    /// only contain known categories.
    pub fn fit(
        rows: &[Vec<usize>],
        labels: &[Label],
        n_categories: &[usize],
        alpha: f64,
    ) -> Result<Self, ModelError> {
        if rows.len() != labels.len() {
            return Err(ModelError::LengthMismatch {
                expected: rows.len(),
                actual: labels.len(),
            });
        }
        if rows.is_empty() {
            return Err(ModelError::EmptyTrainingSet);
        }

        let mut classes = labels.to_vec();
        classes.sort_unstable();
        classes.dedup();

        let mut class_counts = vec![0.; classes.len()];
        let mut category_counts: Vec<Vec<Vec<f64>>> = n_categories
            .iter()
            .map(|&count| vec![vec![0.; count]; classes.len()])
            .collect();
        for (row, label) in rows.iter().zip(labels) {
            if row.len() != n_categories.len() {
                return Err(ModelError::FeatureCount {
                    expected: n_categories.len(),
                    actual: row.len(),
                });
            }
            // the label was taken from `labels`, so it is one of the classes
            let class = classes.binary_search(label).unwrap_or_default();
            class_counts[class] += 1.;
            for (feature, &category) in row.iter().enumerate() {
                category_counts[feature][class][category] += 1.;
            }
        }

        Ok(Self {
            alpha,
            classes,
            class_counts,
            category_counts,
        })
    }

    pub fn classes(&self) -> &[Label] {
        &self.classes
    }

    /// Joint log likelihood of every class.
    fn joint_log_likelihood(&self, row: &[Option<usize>]) -> Vec<f64> {
        let total: f64 = self.class_counts.iter().sum();
        self.class_counts
            .iter()
            .enumerate()
            .map(|(class, &class_count)| {
                let prior = (class_count / total).ln();
                let evidence: f64 = row
                    .iter()
                    .zip(&self.category_counts)
                    .filter_map(|(category, counts)| {
                        let counts = &counts[class];
                        category.map(|category| {
                            ((counts[category] + self.alpha)
                                / (class_count + self.alpha * counts.len() as f64))
                                .ln()
                        })
                    })
                    .sum();
                prior + evidence
            })
            .collect()
    }

    /// Probability of the given class for an encoded row. `0` for a class never seen.
    pub fn predict_proba(&self, row: &[Option<usize>], class: Label) -> f64 {
        let class = match self.classes.binary_search(&class) {
            Ok(class) => class,
            Err(_) => return 0.,
        };
        let jll = self.joint_log_likelihood(row);
        let max = jll.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let norm: f64 = jll.iter().map(|ll| (ll - max).exp()).sum();
        (jll[class] - max).exp() / norm
    }
}
