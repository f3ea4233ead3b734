//! Centralized population-health baseline built on the SIR risk model.

use std::path::Path;

use tracing::info;

use super::{create_model_dir, CentralizedError};
use crate::{
    data::read_disease_outcomes,
    model::SirModel,
    predictions::{PredictionPaths, PANDEMIC_SCORE_COLUMN},
};

/// Name of the SIR model artifact.
pub const SIR_MODEL_FILE: &str = "sir_model.json";

/// Estimates the contact rate from the disease outcomes and saves the model to `model_dir`.
///
/// `lookahead` is the prediction window in days.
pub fn fit(
    disease_outcome_path: &Path,
    model_dir: &Path,
    lookahead: u32,
) -> Result<(), CentralizedError> {
    let outcomes = read_disease_outcomes(disease_outcome_path)?;
    create_model_dir(model_dir)?;

    info!("fitting SIR model on {} disease outcomes", outcomes.len());
    let mut model = SirModel::new(lookahead, None, None)?;
    model.fit(&outcomes);
    if let Some(beta) = model.beta() {
        info!("estimated contact rate {}", beta);
    }
    model.save(&model_dir.join(SIR_MODEL_FILE))?;
    Ok(())
}

/// Predicts the infection risk of everyone present on the last day of the disease outcomes.
///
/// Returns the number of predictions written.
pub fn predict(
    disease_outcome_path: &Path,
    model_dir: &Path,
    predictions: &PredictionPaths,
) -> Result<usize, CentralizedError> {
    let outcomes = read_disease_outcomes(disease_outcome_path)?;
    let model = SirModel::load(&model_dir.join(SIR_MODEL_FILE))?;
    let scores = model.predict(&outcomes)?;
    info!("predicted infection risk of {} people", scores.len());
    Ok(predictions.write(PANDEMIC_SCORE_COLUMN, &scores)?)
}
