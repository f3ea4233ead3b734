use std::collections::BTreeMap;

use crate::{
    common::ClientId,
    payload::{Membership, Parameters},
};

/// Partial results carried by the coordinator from the end of a round into the next one.
///
/// The context is consumed while configuring the next round and never persisted.
#[derive(Debug, Clone, PartialEq)]
pub enum RoundContext {
    /// Nothing was stashed yet.
    Empty,
    /// The outcome of round 1: the join keys of the central client and the banks declared
    /// by every partition client.
    Routed {
        central: ClientId,
        transactions: Parameters,
        memberships: BTreeMap<ClientId, Membership>,
    },
    /// Round 2 was configured: the routed join keys were handed out and only the central
    /// client is kept.
    Dispatched { central: ClientId },
    /// The outcome of round 2 in the test stage: the scores of all partition clients,
    /// concatenated in client id order.
    Scored {
        central: ClientId,
        predictions: Parameters,
    },
}

impl Default for RoundContext {
    fn default() -> Self {
        RoundContext::Empty
    }
}

impl RoundContext {
    pub fn name(&self) -> &'static str {
        match self {
            RoundContext::Empty => "empty",
            RoundContext::Routed { .. } => "routed",
            RoundContext::Dispatched { .. } => "dispatched",
            RoundContext::Scored { .. } => "scored",
        }
    }
}
