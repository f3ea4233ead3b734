use std::{convert::TryFrom, fmt};

use derive_more::{AsRef, Display, From, Into};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Hash,
    Debug,
    Clone,
    Display,
    From,
    Into,
    AsRef,
    Serialize,
    Deserialize,
)]
#[serde(transparent)]
/// The identifier of a client, constant over a simulation and between
/// the train and test stages.
pub struct ClientId(String);

impl ClientId {
    pub fn new(cid: impl Into<String>) -> Self {
        Self(cid.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ClientId {
    fn from(cid: &str) -> Self {
        Self::new(cid)
    }
}

/// The role a client plays in the federation. Every result sent back
/// to the coordinator carries the role of its sender.
#[derive(Eq, PartialEq, Hash, Debug, Copy, Clone, Display, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The node holding the transaction records.
    #[display(fmt = "central")]
    Central,
    /// A node holding the account flags of one or more banks.
    #[display(fmt = "partition")]
    Partition,
}

/// Whether a federation run trains models or produces predictions.
#[derive(Eq, PartialEq, Debug, Copy, Clone, Display, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    #[display(fmt = "train")]
    Train,
    #[display(fmt = "test")]
    Test,
}

impl Stage {
    /// Number of rounds the coordinator runs for this stage.
    pub fn num_rounds(self) -> u32 {
        match self {
            Stage::Train => 2,
            Stage::Test => 3,
        }
    }

    /// The rounds of this stage, in order.
    pub fn rounds(self) -> impl Iterator<Item = Round> {
        Round::ALL.iter().copied().take(self.num_rounds() as usize)
    }
}

/// A round of the protocol.
#[derive(Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Copy, Clone, Serialize, Deserialize)]
pub enum Round {
    One,
    Two,
    Three,
}

impl Round {
    const ALL: [Round; 3] = [Round::One, Round::Two, Round::Three];

    pub fn number(self) -> u32 {
        match self {
            Round::One => 1,
            Round::Two => 2,
            Round::Three => 3,
        }
    }
}

impl fmt::Display for Round {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.number())
    }
}

#[derive(Error, Debug, Eq, PartialEq, Copy, Clone)]
#[error("unexpected round {0}")]
/// A round number outside of the protocol.
pub struct UnexpectedRound(pub u32);

impl TryFrom<u32> for Round {
    type Error = UnexpectedRound;

    fn try_from(round: u32) -> Result<Self, Self::Error> {
        match round {
            1 => Ok(Round::One),
            2 => Ok(Round::Two),
            3 => Ok(Round::Three),
            other => Err(UnexpectedRound(other)),
        }
    }
}

/// A class label. Fraudulent transactions are labelled `1`.
pub type Label = u8;

/// The positive class.
pub const POSITIVE: Label = 1;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_try_from() {
        assert_eq!(Round::try_from(1), Ok(Round::One));
        assert_eq!(Round::try_from(3), Ok(Round::Three));
        assert_eq!(Round::try_from(0), Err(UnexpectedRound(0)));
        assert_eq!(
            Round::try_from(4).unwrap_err().to_string(),
            "unexpected round 4"
        );
    }

    #[test]
    fn test_stage_rounds() {
        let train: Vec<_> = Stage::Train.rounds().collect();
        assert_eq!(train, vec![Round::One, Round::Two]);
        let test: Vec<_> = Stage::Test.rounds().collect();
        assert_eq!(test, vec![Round::One, Round::Two, Round::Three]);
    }
}
