//! Read-only access to the private data partitions.
//!
//! Every client owns exactly one partition, loaded from a CSV file: the central client holds
//! the [`TransactionTable`], every partition client holds a [`FlagTable`] with the account
//! flags of the banks it represents.

pub mod join;

use std::{
    collections::{BTreeMap, HashSet},
    fs::File,
    io::Read,
    path::{Path, PathBuf},
};

use serde::{de::DeserializeOwned, Deserialize};
use thiserror::Error;
use tracing::debug;

use crate::{
    common::{ClientId, Label, Role},
    payload::Membership,
};

pub use self::join::{add_final_receiver, join_flags, JoinKey};

/// Errors raised while loading partition data.
#[derive(Error, Debug)]
pub enum DataError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse CSV data: {0}")]
    Csv(#[from] csv::Error),

    #[error("duplicate message id {0:?}")]
    DuplicateMessageId(String),

    #[error("transaction {0:?} has no label")]
    MissingLabel(String),

    #[error("no partition registered for client {0}")]
    UnknownPartition(ClientId),
}

/// A transaction leg of the central partition.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Transaction {
    pub message_id: String,
    pub timestamp: String,
    #[serde(rename = "UETR")]
    pub uetr: String,
    pub receiver: String,
    pub beneficiary_account: String,
    #[serde(default)]
    pub instructed_currency: Option<String>,
    /// Only available in the training data.
    #[serde(default)]
    pub label: Option<Label>,
}

/// The transactions of the central partition, indexed by message id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionTable {
    rows: Vec<Transaction>,
}

impl TransactionTable {
    /// Creates a table, checking that message ids are unique.
    pub fn new(rows: Vec<Transaction>) -> Result<Self, DataError> {
        let mut seen = HashSet::with_capacity(rows.len());
        for row in &rows {
            if !seen.insert(row.message_id.as_str()) {
                return Err(DataError::DuplicateMessageId(row.message_id.clone()));
            }
        }
        Ok(Self { rows })
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, DataError> {
        Self::new(read_csv(path)?)
    }

    pub fn from_reader(reader: impl Read) -> Result<Self, DataError> {
        Self::new(deserialize_csv(reader)?)
    }

    pub fn rows(&self) -> &[Transaction] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn index(&self) -> Vec<String> {
        self.rows.iter().map(|row| row.message_id.clone()).collect()
    }
}

/// An account flag held by a bank partition.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AccountFlag {
    pub bank: String,
    pub account: String,
    #[serde(default)]
    pub flags: Option<String>,
}

/// The account flags of a bank partition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlagTable {
    rows: Vec<AccountFlag>,
}

impl FlagTable {
    pub fn new(rows: Vec<AccountFlag>) -> Self {
        Self { rows }
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, DataError> {
        Ok(Self::new(read_csv(path)?))
    }

    pub fn from_reader(reader: impl Read) -> Result<Self, DataError> {
        Ok(Self::new(deserialize_csv(reader)?))
    }

    pub fn rows(&self) -> &[AccountFlag] {
        &self.rows
    }

    /// The banks present in this partition.
    pub fn banks(&self) -> Membership {
        self.rows.iter().map(|row| row.bank.clone()).collect()
    }
}

/// The daily disease state of a person.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DiseaseOutcome {
    pub pid: String,
    pub day: u32,
    /// One of `S`, `I` or `R`.
    pub state: String,
}

pub fn read_disease_outcomes(path: impl AsRef<Path>) -> Result<Vec<DiseaseOutcome>, DataError> {
    read_csv(path)
}

/// The data of a single partition.
#[derive(Debug, Clone, PartialEq)]
pub enum Partition {
    Central(TransactionTable),
    Entity(FlagTable),
}

/// Where the data of every client lives, keyed by client id.
#[derive(Debug, Clone, Default)]
pub struct PartitionStore {
    sources: BTreeMap<ClientId, (Role, PathBuf)>,
}

impl PartitionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the partition of a client.
    pub fn insert(&mut self, cid: ClientId, role: Role, path: impl Into<PathBuf>) {
        self.sources.insert(cid, (role, path.into()));
    }

    /// The registered clients and their roles.
    pub fn roles(&self) -> impl Iterator<Item = (&ClientId, Role)> {
        self.sources.iter().map(|(cid, (role, _))| (cid, *role))
    }

    /// Loads the partition of the given client.
    ///
    /// # Errors
    /// Fails if the client is unknown or its data cannot be read.
    pub fn load(&self, cid: &ClientId) -> Result<Partition, DataError> {
        let (role, path) = self
            .sources
            .get(cid)
            .ok_or_else(|| DataError::UnknownPartition(cid.clone()))?;
        debug!(
            "loading {} partition of {} from {}",
            role,
            cid,
            path.display()
        );
        Ok(match role {
            Role::Central => Partition::Central(TransactionTable::from_path(path)?),
            Role::Partition => Partition::Entity(FlagTable::from_path(path)?),
        })
    }
}

fn read_csv<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<Vec<T>, DataError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| DataError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    deserialize_csv(file)
}

fn deserialize_csv<T: DeserializeOwned>(reader: impl Read) -> Result<Vec<T>, DataError> {
    csv::Reader::from_reader(reader)
        .deserialize()
        .collect::<Result<_, _>>()
        .map_err(DataError::from)
}
