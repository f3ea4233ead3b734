//! Centralized baselines, fitted and evaluated on all data in a single process.
//!
//! The financial-crime baseline joins the account flags of all banks onto the transactions
//! directly, fits the same two models as the federation and combines their scores the same
//! way.

pub mod pandemic;

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

use crate::{
    common::Label,
    data::{join::transaction_keys, join_flags, DataError, FlagTable, TransactionTable},
    model::{Features, LocalModel, ModelError, NaiveBayesPipeline, Scores},
    predictions::{PredictionPaths, PredictionsError, FINCRIME_SCORE_COLUMN},
};

/// Name of the artifact of the model fitted on the transactions.
pub const CENTRAL_MODEL_FILE: &str = "central_model.bin";

/// Name of the artifact of the model fitted on the account flags.
pub const ENTITY_MODEL_FILE: &str = "entity_model.bin";

/// Errors raised by the centralized baselines.
#[derive(Error, Debug)]
pub enum CentralizedError {
    #[error("failed to create model directory {path}: {source}")]
    ModelDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to load data: {0}")]
    Data(#[from] DataError),

    #[error("model failure: {0}")]
    Model(#[from] ModelError),

    #[error("failed to write predictions: {0}")]
    Predictions(#[from] PredictionsError),
}

/// The transactions with the flags of their beneficiary accounts.
struct Joined {
    central: Features,
    entity: Features,
    labels: Vec<Label>,
}

fn prepare(swift_path: &Path, bank_path: &Path) -> Result<Joined, CentralizedError> {
    let transactions = TransactionTable::from_path(swift_path)?;
    let flags = FlagTable::from_path(bank_path)?;

    info!("preparing {} transactions", transactions.len());
    let keys = transaction_keys(&transactions, true)?;
    let currencies = transactions
        .rows()
        .iter()
        .map(|row| row.instructed_currency.clone())
        .collect();
    let central = Features::single(transactions.index(), currencies)?;
    let entity = Features::single(transactions.index(), join_flags(keys.keys(), &flags))?;
    Ok(Joined {
        central,
        entity,
        labels: keys.labels().unwrap_or_default().to_vec(),
    })
}

pub(crate) fn create_model_dir(model_dir: &Path) -> Result<(), CentralizedError> {
    std::fs::create_dir_all(model_dir).map_err(|source| CentralizedError::ModelDir {
        path: model_dir.to_path_buf(),
        source,
    })
}

/// Fits the central and the entity models and saves them to `model_dir`.
pub fn fit(swift_path: &Path, bank_path: &Path, model_dir: &Path) -> Result<(), CentralizedError> {
    let joined = prepare(swift_path, bank_path)?;
    create_model_dir(model_dir)?;

    info!("fitting central model");
    let mut central = NaiveBayesPipeline::new();
    central.fit(&joined.central, &joined.labels)?;
    central.save(&model_dir.join(CENTRAL_MODEL_FILE))?;

    info!("fitting entity model");
    let mut entity = NaiveBayesPipeline::new();
    entity.fit(&joined.entity, &joined.labels)?;
    entity.save(&model_dir.join(ENTITY_MODEL_FILE))?;
    Ok(())
}

/// Scores the transactions with the models saved in `model_dir` and writes the predictions.
///
/// Returns the number of predictions written.
pub fn predict(
    swift_path: &Path,
    bank_path: &Path,
    model_dir: &Path,
    predictions: &PredictionPaths,
) -> Result<usize, CentralizedError> {
    let joined = prepare(swift_path, bank_path)?;

    info!("loading models");
    let central = NaiveBayesPipeline::load(&model_dir.join(CENTRAL_MODEL_FILE))?;
    let entity = NaiveBayesPipeline::load(&model_dir.join(ENTITY_MODEL_FILE))?;

    info!("predicting on {} transactions", joined.central.len());
    let central = central.predict(&joined.central)?;
    let entity = entity.predict(&joined.entity)?;
    let entity = entity.to_map();
    let combined = Scores::from_parts(
        central.index().to_vec(),
        central
            .iter()
            .map(|(id, score)| score * entity.get(id).copied().unwrap_or(1.))
            .collect(),
    );
    Ok(predictions.write(FINCRIME_SCORE_COLUMN, &combined)?)
}
