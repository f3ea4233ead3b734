//! The coordinator drives the fixed sequence of rounds.
//!
//! In every round it configures the fit instructions of the clients taking part, and
//! aggregates their results once all of them have answered. Results of a round are
//! stashed in a [`RoundContext`] which is consumed while configuring the next round.

mod context;
mod protocol;

use thiserror::Error;

pub use self::{context::RoundContext, protocol::Coordinator};
use crate::{
    common::{ClientId, Round, UnexpectedRound},
    model::ModelError,
    payload::PayloadError,
};

/// Errors raised by the coordinator.
#[derive(Error, Debug)]
pub enum CoordinatorError {
    #[error(transparent)]
    UnexpectedRound(#[from] UnexpectedRound),

    #[error("round {round} failed for {count} client(s)")]
    Failures { round: Round, count: usize },

    #[error("round {round} requires results that were not stashed (found {found} context)")]
    NotStashed { round: Round, found: &'static str },

    #[error("expected exactly one central client, found {0}")]
    CentralCount(usize),

    #[error("unexpected result from client {cid} in round {round}")]
    UnexpectedResult { round: Round, cid: ClientId },

    #[error("invalid client result: {0}")]
    Payload(#[from] PayloadError),

    #[error("failed to concatenate scores: {0}")]
    Scores(#[from] ModelError),
}
