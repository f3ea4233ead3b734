use std::path::PathBuf;

use tracing::{debug, info};

use super::ClientError;
use crate::{
    common::{ClientId, Label, Role, Round, Stage, UnexpectedRound},
    data::{join::transaction_keys, TransactionTable},
    message::FitRes,
    model::{Features, LocalModel, NaiveBayesPipeline, Scores, MODEL_FILE},
    payload::Parameters,
    predictions::{PredictionPaths, FINCRIME_SCORE_COLUMN},
};

/// The client holding the transactions.
///
/// It fits a model on the instructed currency of the transactions, shares the join keys of
/// every transaction with the partition clients and combines their account scores with its
/// own into the final prediction.
#[derive(Debug)]
pub struct CentralClient {
    cid: ClientId,
    stage: Stage,
    transactions: TransactionTable,
    client_dir: PathBuf,
    predictions: Option<PredictionPaths>,
}

impl CentralClient {
    pub fn new(
        cid: ClientId,
        stage: Stage,
        transactions: TransactionTable,
        client_dir: impl Into<PathBuf>,
        predictions: Option<PredictionPaths>,
    ) -> Self {
        Self {
            cid,
            stage,
            transactions,
            client_dir: client_dir.into(),
            predictions,
        }
    }

    pub fn cid(&self) -> &ClientId {
        &self.cid
    }

    pub(super) fn fit(
        &mut self,
        round: Round,
        parameters: &Parameters,
    ) -> Result<FitRes, ClientError> {
        match (self.stage, round) {
            (Stage::Train, Round::One) => self.train(),
            (Stage::Test, Round::One) => self.share_keys(),
            (Stage::Test, Round::Three) => self.predict(parameters),
            (_, round) => Err(UnexpectedRound(round.number()).into()),
        }
    }

    fn features(&self) -> Result<Features, ClientError> {
        let currencies = self
            .transactions
            .rows()
            .iter()
            .map(|row| row.instructed_currency.clone())
            .collect();
        Ok(Features::single(self.transactions.index(), currencies)?)
    }

    fn model_path(&self) -> PathBuf {
        self.client_dir.join(MODEL_FILE)
    }

    fn train(&mut self) -> Result<FitRes, ClientError> {
        info!(
            "computing join keys of {} transactions",
            self.transactions.len()
        );
        let keys = transaction_keys(&self.transactions, true)?;
        let labels: &[Label] = keys.labels().unwrap_or_default();

        info!("fitting central model");
        let mut model = NaiveBayesPipeline::new();
        model.fit(&self.features()?, labels)?;
        model.save(&self.model_path())?;
        debug!("saved central model to {}", self.model_path().display());

        Ok(FitRes::new(Role::Central, keys.to_parameters()?, 0))
    }

    fn share_keys(&mut self) -> Result<FitRes, ClientError> {
        info!(
            "computing join keys of {} transactions",
            self.transactions.len()
        );
        let keys = transaction_keys(&self.transactions, false)?;
        Ok(FitRes::new(Role::Central, keys.to_parameters()?, 0))
    }

    fn predict(&mut self, parameters: &Parameters) -> Result<FitRes, ClientError> {
        let paths = self
            .predictions
            .as_ref()
            .ok_or_else(|| ClientError::NoPredictionOutput(self.cid.clone()))?;
        let received = Scores::from_parameters(parameters)?;
        debug!("received {} account scores", received.len());

        info!("predicting with central model");
        let model = NaiveBayesPipeline::load(&self.model_path())?;
        let central = model.predict(&self.features()?)?;

        info!("combining central and account scores");
        let received = received.to_map();
        let combined = Scores::from_parts(
            central.index().to_vec(),
            central
                .iter()
                .map(|(id, score)| score * received.get(id).copied().unwrap_or(1.))
                .collect(),
        );
        let rows = paths.write(FINCRIME_SCORE_COLUMN, &combined)?;

        Ok(FitRes::new(Role::Central, Parameters::empty(), rows))
    }
}
