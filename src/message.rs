//! Messages exchanged between the coordinator and the clients in every round.

use serde::{Deserialize, Serialize};

use crate::{
    common::{Role, Round},
    payload::{Parameters, PayloadError},
};

/// The configuration sent along with a fit instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FitConfig {
    /// The raw round number, validated by the client.
    pub round: u32,
}

impl From<Round> for FitConfig {
    fn from(round: Round) -> Self {
        Self {
            round: round.number(),
        }
    }
}

/// A fit instruction sent by the coordinator to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitIns {
    pub config: FitConfig,
    pub parameters: Parameters,
}

impl FitIns {
    pub fn new(round: Round, parameters: Parameters) -> Self {
        Self {
            config: round.into(),
            parameters,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, PayloadError> {
        Ok(bincode::serialize(self)?)
    }
}

/// The result of a fit instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitRes {
    /// The role of the client that produced this result.
    pub role: Role,
    pub parameters: Parameters,
    /// Number of records the client fitted or scored in this round.
    pub num_examples: usize,
}

impl FitRes {
    pub fn new(role: Role, parameters: Parameters, num_examples: usize) -> Self {
        Self {
            role,
            parameters,
            num_examples,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, PayloadError> {
        Ok(bincode::serialize(self)?)
    }
}

/// An evaluation instruction. The protocol never schedules any.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluateIns {
    pub parameters: Parameters,
}
