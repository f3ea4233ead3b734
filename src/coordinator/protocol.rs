use std::{collections::BTreeMap, convert::TryFrom, mem};

use tracing::{debug, error, info};

use super::{CoordinatorError, RoundContext};
use crate::{
    common::{ClientId, Role, Round, Stage, UnexpectedRound},
    message::{EvaluateIns, FitIns, FitRes},
    model::Scores,
    payload::{Membership, Parameters, TransactionKeys},
};

/// The coordinator state machine.
#[derive(Debug)]
pub struct Coordinator {
    stage: Stage,
    /// Every client known to the federation.
    clients: Vec<ClientId>,
    /// Partial results of the last aggregated round.
    context: RoundContext,
}

impl Coordinator {
    pub fn new(stage: Stage, clients: impl IntoIterator<Item = ClientId>) -> Self {
        let mut clients: Vec<ClientId> = clients.into_iter().collect();
        clients.sort();
        clients.dedup();
        Self {
            stage,
            clients,
            context: RoundContext::Empty,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn context(&self) -> &RoundContext {
        &self.context
    }

    /// Checks that `round` is a round of the current stage.
    fn round(&self, round: u32) -> Result<Round, CoordinatorError> {
        if round > self.stage.num_rounds() {
            return Err(UnexpectedRound(round).into());
        }
        Ok(Round::try_from(round)?)
    }

    fn not_stashed(&self, round: Round) -> CoordinatorError {
        CoordinatorError::NotStashed {
            round,
            found: self.context.name(),
        }
    }

    /// Configures the fit instructions of the given round, keyed by client id.
    ///
    /// Rounds 2 and 3 consume the results stashed by the previous round.
    ///
    /// # Errors
    /// Fails if the round isn't part of the stage or if the results of the previous round
    /// weren't aggregated.
    pub fn configure_fit(
        &mut self,
        round: u32,
    ) -> Result<Vec<(ClientId, FitIns)>, CoordinatorError> {
        let round = self.round(round)?;
        match (round, mem::take(&mut self.context)) {
            (Round::One, context) => {
                self.context = context;
                debug!("broadcasting to {} clients", self.clients.len());
                Ok(self
                    .clients
                    .iter()
                    .map(|cid| (cid.clone(), FitIns::new(round, Parameters::empty())))
                    .collect())
            }
            (
                Round::Two,
                RoundContext::Routed {
                    central,
                    transactions,
                    memberships,
                },
            ) => {
                let labelled = self.stage == Stage::Train;
                let keys = TransactionKeys::from_parameters(&transactions, labelled)?;
                let ins = memberships
                    .iter()
                    .map(|(cid, banks)| -> Result<_, CoordinatorError> {
                        let routed = keys.retain_members(banks);
                        debug!(
                            "routing {} of {} transactions to {}",
                            routed.len(),
                            keys.len(),
                            cid
                        );
                        Ok((cid.clone(), FitIns::new(round, routed.to_parameters()?)))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                self.context = RoundContext::Dispatched { central };
                Ok(ins)
            }
            (
                Round::Three,
                RoundContext::Scored {
                    central,
                    predictions,
                },
            ) => {
                debug!("sending account scores to {}", central);
                Ok(vec![(central, FitIns::new(round, predictions))])
            }
            (round, context) => {
                self.context = context;
                Err(self.not_stashed(round))
            }
        }
    }

    /// Aggregates the results of the given round and stashes them for the next round.
    ///
    /// # Errors
    /// Fails if any client failed in this round, or if the results don't match the protocol.
    pub fn aggregate_fit(
        &mut self,
        round: u32,
        results: BTreeMap<ClientId, FitRes>,
        failures: usize,
    ) -> Result<(), CoordinatorError> {
        let round = self.round(round)?;
        if failures > 0 {
            error!("{} client(s) failed in round {}", failures, round);
            return Err(CoordinatorError::Failures {
                round,
                count: failures,
            });
        }

        match (self.stage, round) {
            (_, Round::One) => self.aggregate_routing(results),
            (Stage::Test, Round::Two) => self.aggregate_scores(results),
            (_, round) => {
                info!("nothing to aggregate in round {}", round);
                self.context = RoundContext::Empty;
                Ok(())
            }
        }
    }

    /// Dispatches the results of round 1 on their role.
    fn aggregate_routing(
        &mut self,
        results: BTreeMap<ClientId, FitRes>,
    ) -> Result<(), CoordinatorError> {
        let mut centrals = Vec::new();
        let mut memberships = BTreeMap::new();
        for (cid, res) in results {
            match res.role {
                Role::Central => {
                    debug!("stashing join keys of {}", cid);
                    centrals.push((cid, res.parameters));
                }
                Role::Partition => {
                    let banks = Membership::from_parameters(&res.parameters)?;
                    debug!("stashing {} banks of {}", banks.len(), cid);
                    memberships.insert(cid, banks);
                }
            }
        }
        if centrals.len() != 1 {
            return Err(CoordinatorError::CentralCount(centrals.len()));
        }
        let (central, transactions) = centrals.remove(0);
        self.context = RoundContext::Routed {
            central,
            transactions,
            memberships,
        };
        Ok(())
    }

    /// Concatenates the scores of every partition client in client id order.
    fn aggregate_scores(
        &mut self,
        results: BTreeMap<ClientId, FitRes>,
    ) -> Result<(), CoordinatorError> {
        let mut parts = Vec::with_capacity(results.len());
        for (cid, res) in results {
            if res.role != Role::Partition {
                return Err(CoordinatorError::UnexpectedResult {
                    round: Round::Two,
                    cid,
                });
            }
            parts.push(Scores::from_parameters(&res.parameters)?);
        }
        let scores = Scores::concat(parts)?;
        info!("collected {} account scores", scores.len());

        match mem::take(&mut self.context) {
            RoundContext::Dispatched { central } => {
                self.context = RoundContext::Scored {
                    central,
                    predictions: scores.to_parameters()?,
                };
                Ok(())
            }
            context => {
                self.context = context;
                Err(self.not_stashed(Round::Two))
            }
        }
    }

    /// Evaluation is not part of the protocol: no client is ever instructed.
    pub fn configure_evaluate(&self, _round: u32) -> Vec<(ClientId, EvaluateIns)> {
        Vec::new()
    }

    /// Always `None`: no evaluation is performed.
    pub fn evaluate(&self, _round: u32, _parameters: &Parameters) -> Option<f64> {
        None
    }
}
