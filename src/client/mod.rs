//! The clients of the federation.
//!
//! A client owns one data partition and a state directory. It is driven externally: every
//! fit instruction carries the round number, and the client reacts according to its role,
//! the stage and that round.

mod central;
mod partition;

use std::{convert::TryFrom, path::PathBuf};

use thiserror::Error;

pub use self::{central::CentralClient, partition::PartitionClient};
use crate::{
    common::{ClientId, Role, Round, Stage, UnexpectedRound},
    data::{DataError, Partition},
    message::{FitIns, FitRes},
    model::ModelError,
    payload::PayloadError,
    predictions::{PredictionPaths, PredictionsError},
};

/// Errors raised by a client while handling a fit instruction. Every error is fatal for the
/// run.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error(transparent)]
    UnexpectedRound(#[from] UnexpectedRound),

    #[error("invalid payload: {0}")]
    Payload(#[from] PayloadError),

    #[error("failed to load partition: {0}")]
    Data(#[from] DataError),

    #[error("model failure: {0}")]
    Model(#[from] ModelError),

    #[error("failed to write predictions: {0}")]
    Predictions(#[from] PredictionsError),

    #[error("no prediction output configured for client {0}")]
    NoPredictionOutput(ClientId),
}

/// A client of the federation.
#[derive(Debug)]
pub enum Client {
    Central(CentralClient),
    Partition(PartitionClient),
}

impl Client {
    /// Creates the client owning the given partition.
    ///
    /// `client_dir` is the state directory of the client, shared by the train and test
    /// stages. `predictions` is only used by the central client in the test stage.
    pub fn new(
        cid: ClientId,
        stage: Stage,
        partition: Partition,
        client_dir: impl Into<PathBuf>,
        predictions: Option<PredictionPaths>,
    ) -> Self {
        match partition {
            Partition::Central(transactions) => Client::Central(CentralClient::new(
                cid,
                stage,
                transactions,
                client_dir,
                predictions,
            )),
            Partition::Entity(flags) => {
                Client::Partition(PartitionClient::new(cid, stage, flags, client_dir))
            }
        }
    }

    pub fn cid(&self) -> &ClientId {
        match self {
            Client::Central(client) => client.cid(),
            Client::Partition(client) => client.cid(),
        }
    }

    pub fn role(&self) -> Role {
        match self {
            Client::Central(_) => Role::Central,
            Client::Partition(_) => Role::Partition,
        }
    }

    /// Handles a fit instruction.
    ///
    /// # Errors
    /// Fails with [`ClientError::UnexpectedRound`] if the round is not part of the protocol
    /// for this client and stage, and on any data, model or payload failure.
    pub fn fit(&mut self, ins: FitIns) -> Result<FitRes, ClientError> {
        let round = Round::try_from(ins.config.round)?;
        match self {
            Client::Central(client) => client.fit(round, &ins.parameters),
            Client::Partition(client) => client.fit(round, &ins.parameters),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{
        data::{
            tests::{BANK_CSV, SWIFT_CSV},
            FlagTable,
            TransactionTable,
        },
        payload::Parameters,
    };

    pub fn central(stage: Stage, dir: &std::path::Path) -> Client {
        let transactions = TransactionTable::from_reader(SWIFT_CSV.as_bytes()).unwrap();
        Client::new(
            "swift".into(),
            stage,
            Partition::Central(transactions),
            dir,
            None,
        )
    }

    pub fn partition(stage: Stage, dir: &std::path::Path) -> Client {
        let flags = FlagTable::from_reader(BANK_CSV.as_bytes()).unwrap();
        Client::new("bank01".into(), stage, Partition::Entity(flags), dir, None)
    }

    #[test]
    fn test_roles() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(central(Stage::Train, dir.path()).role(), Role::Central);
        let client = partition(Stage::Train, dir.path());
        assert_eq!(client.role(), Role::Partition);
        assert_eq!(client.cid().as_str(), "bank01");
    }

    #[test]
    fn test_round_out_of_protocol() {
        let dir = tempfile::tempdir().unwrap();
        let clients = vec![
            central(Stage::Test, dir.path()),
            partition(Stage::Test, dir.path()),
        ];
        for mut client in clients {
            let ins = FitIns {
                config: crate::message::FitConfig { round: 7 },
                parameters: Parameters::empty(),
            };
            assert!(matches!(
                client.fit(ins),
                Err(ClientError::UnexpectedRound(UnexpectedRound(7)))
            ));
        }
    }
}
