use std::path::PathBuf;

use tracing::{debug, info};

use super::ClientError;
use crate::{
    common::{ClientId, Role, Round, Stage, UnexpectedRound},
    data::{join_flags, FlagTable},
    message::FitRes,
    model::{Features, LocalModel, NaiveBayesPipeline, MODEL_FILE},
    payload::{Membership, Parameters, TransactionKeys},
};

/// A client holding the account flags of one or more banks.
#[derive(Debug)]
pub struct PartitionClient {
    cid: ClientId,
    stage: Stage,
    flags: FlagTable,
    banks: Membership,
    client_dir: PathBuf,
}

impl PartitionClient {
    pub fn new(
        cid: ClientId,
        stage: Stage,
        flags: FlagTable,
        client_dir: impl Into<PathBuf>,
    ) -> Self {
        let banks = flags.banks();
        Self {
            cid,
            stage,
            flags,
            banks,
            client_dir: client_dir.into(),
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
            (_, Round::One) => self.declare_banks(),
            (Stage::Train, Round::Two) => self.train(parameters),
            (Stage::Test, Round::Two) => self.predict(parameters),
            (_, round) => Err(UnexpectedRound(round.number()).into()),
        }
    }

    fn model_path(&self) -> PathBuf {
        self.client_dir.join(MODEL_FILE)
    }

    fn declare_banks(&self) -> Result<FitRes, ClientError> {
        debug!("declaring {} banks", self.banks.len());
        Ok(FitRes::new(Role::Partition, self.banks.to_parameters()?, 0))
    }

    /// Keeps the transactions routed to the banks of this partition and attaches their flags.
    fn join(&self, keys: &TransactionKeys) -> Result<(TransactionKeys, Features), ClientError> {
        let keys = keys.retain_members(&self.banks);
        info!("joining flags onto {} transactions", keys.len());
        let flags = join_flags(keys.keys(), &self.flags);
        let features = Features::single(keys.index().to_vec(), flags)?;
        Ok((keys, features))
    }

    fn train(&mut self, parameters: &Parameters) -> Result<FitRes, ClientError> {
        let (keys, features) = self.join(&TransactionKeys::from_parameters(parameters, true)?)?;

        info!("fitting account model");
        let mut model = NaiveBayesPipeline::new();
        model.fit(&features, keys.labels().unwrap_or_default())?;
        model.save(&self.model_path())?;
        debug!("saved account model to {}", self.model_path().display());

        Ok(FitRes::new(Role::Partition, Parameters::empty(), keys.len()))
    }

    fn predict(&mut self, parameters: &Parameters) -> Result<FitRes, ClientError> {
        let (keys, features) = self.join(&TransactionKeys::from_parameters(parameters, false)?)?;

        info!("predicting with account model");
        let model = NaiveBayesPipeline::load(&self.model_path())?;
        let scores = model.predict(&features)?;

        Ok(FitRes::new(Role::Partition, scores.to_parameters()?, keys.len()))
    }
}
