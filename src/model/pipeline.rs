use std::{
    fs::File,
    io::{BufReader, BufWriter},
    path::Path,
};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{CategoricalNb, Features, LocalModel, ModelError, OrdinalEncoder, Scores};
use crate::common::{Label, POSITIVE};

/// The category substituted for missing values.
pub const MISSING_CATEGORY: &str = "-1";

/// Imputation, ordinal encoding and categorical naive Bayes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NaiveBayesPipeline {
    fitted: Option<Fitted>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Fitted {
    encoder: OrdinalEncoder,
    classifier: Classifier,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Classifier {
    /// The training labels all had the same class.
    Constant(Label),
    NaiveBayes(CategoricalNb),
}

impl NaiveBayesPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }

    /// The classes seen during training.
    pub fn classes(&self) -> Option<Vec<Label>> {
        self.fitted.as_ref().map(|fitted| match &fitted.classifier {
            Classifier::Constant(label) => vec![*label],
            Classifier::NaiveBayes(nb) => nb.classes().to_vec(),
        })
    }
}

fn impute(features: &Features) -> Vec<Vec<String>> {
    features
        .rows()
        .iter()
        .map(|row| {
            row.iter()
                .map(|value| value.clone().unwrap_or_else(|| MISSING_CATEGORY.to_string()))
                .collect()
        })
        .collect()
}

impl LocalModel for NaiveBayesPipeline {
    fn fit(&mut self, features: &Features, labels: &[Label]) -> Result<&mut Self, ModelError> {
        if features.len() != labels.len() {
            return Err(ModelError::LengthMismatch {
                expected: features.len(),
                actual: labels.len(),
            });
        }
        if labels.is_empty() {
            return Err(ModelError::EmptyTrainingSet);
        }

        let rows = impute(features);
        let encoder = OrdinalEncoder::fit(&rows)?;
        let classifier = if labels.iter().all(|label| *label == labels[0]) {
            debug!("training labels only contain class {}", labels[0]);
            Classifier::Constant(labels[0])
        } else {
            let encoded = rows
                .iter()
                .map(|row| {
                    // every category was seen by the encoder during fitting
                    encoder
                        .transform(row)
                        .map(|codes| codes.into_iter().map(Option::unwrap_or_default).collect())
                })
                .collect::<Result<Vec<Vec<usize>>, _>>()?;
            Classifier::NaiveBayes(CategoricalNb::fit(
                &encoded,
                labels,
                &encoder.category_counts(),
                CategoricalNb::DEFAULT_ALPHA,
            )?)
        };
        self.fitted = Some(Fitted {
            encoder,
            classifier,
        });
        Ok(self)
    }

    fn predict(&self, features: &Features) -> Result<Scores, ModelError> {
        let fitted = self.fitted.as_ref().ok_or(ModelError::NotFitted)?;
        let index = features.index().to_vec();
        let nb = match &fitted.classifier {
            // zero whichever class was seen
            Classifier::Constant(_) => return Ok(Scores::constant(index, 0.)),
            Classifier::NaiveBayes(nb) => nb,
        };
        let values = impute(features)
            .iter()
            .map(|row| {
                fitted
                    .encoder
                    .transform(row)
                    .map(|codes| nb.predict_proba(&codes, POSITIVE))
            })
            .collect::<Result<_, _>>()?;
        Ok(Scores::from_parts(index, values))
    }

    fn save(&self, path: &Path) -> Result<(), ModelError> {
        let fitted = self.fitted.as_ref().ok_or(ModelError::NotFitted)?;
        let writer = BufWriter::new(File::create(path)?);
        bincode::serialize_into(writer, fitted)?;
        Ok(())
    }

    fn load(path: &Path) -> Result<Self, ModelError> {
        let reader = BufReader::new(File::open(path)?);
        Ok(Self {
            fitted: Some(bincode::deserialize_from(reader)?),
        })
    }
}
