//! In-process simulation of a federation.
//!
//! The [`Federation`] instantiates one client per partition and runs the rounds of the
//! stage: rounds are strictly sequential, while the clients of a round are driven
//! concurrently and their results are collected before the coordinator aggregates them.

mod proxy;
#[cfg(test)]
mod tests;

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use futures::future;
use thiserror::Error;
use tokio::fs;
use tracing::{debug, error, info, info_span};
use tracing_futures::Instrument;

#[cfg(test)]
pub use self::proxy::MockClientProxy;
pub use self::proxy::{ClientProxy, LocalClientProxy};
use crate::{
    client::Client,
    common::{ClientId, Role},
    coordinator::{Coordinator, CoordinatorError},
    data::{DataError, PartitionStore},
    payload::{Parameters, PayloadError},
    settings::{FederationSettings, PartitionSettings},
};

/// Errors raised while running a federation.
#[derive(Error, Debug)]
pub enum FederationError {
    #[error("failed to create directory {path}: {source}")]
    Setup {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to capture payload to {path}: {source}")]
    Capture {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to encode payload: {0}")]
    Payload(#[from] PayloadError),

    #[error("failed to load partition: {0}")]
    Data(#[from] DataError),

    #[error("client {0} is not part of the federation")]
    UnknownClient(ClientId),

    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),
}

/// A federation of clients driven by a coordinator.
pub struct Federation {
    settings: FederationSettings,
    coordinator: Coordinator,
    proxies: BTreeMap<ClientId, Box<dyn ClientProxy>>,
}

impl Federation {
    pub fn new(
        settings: FederationSettings,
        proxies: BTreeMap<ClientId, Box<dyn ClientProxy>>,
    ) -> Self {
        let coordinator = Coordinator::new(settings.stage, proxies.keys().cloned());
        Self {
            settings,
            coordinator,
            proxies,
        }
    }

    /// Loads every partition and creates a local client for it.
    ///
    /// # Errors
    /// Fails if a partition cannot be loaded.
    pub fn from_settings(
        settings: FederationSettings,
        partitions: &[PartitionSettings],
    ) -> Result<Self, FederationError> {
        let mut store = PartitionStore::new();
        for partition in partitions {
            store.insert(partition.cid.clone(), partition.role, &partition.data_path);
        }
        let centrals = store.roles().filter(|(_, role)| *role == Role::Central).count();
        info!(
            "loading {} central and {} partition clients",
            centrals,
            partitions.len() - centrals
        );

        let mut proxies: BTreeMap<ClientId, Box<dyn ClientProxy>> = BTreeMap::new();
        for partition in partitions {
            let cid = partition.cid.clone();
            let client = Client::new(
                cid.clone(),
                settings.stage,
                store.load(&cid)?,
                settings.client_dir(&cid),
                partition.predictions(),
            );
            proxies.insert(cid, Box::new(LocalClientProxy::new(client)));
        }
        Ok(Self::new(settings, proxies))
    }

    /// Runs every round of the stage.
    ///
    /// # Errors
    /// Fails as soon as a round fails. No further round is run.
    pub async fn run(mut self) -> Result<(), FederationError> {
        let stage = self.settings.stage;
        info!(
            "running {} stage with {} clients",
            stage,
            self.proxies.len()
        );
        self.setup().await?;
        for round in stage.rounds() {
            let round = round.number();
            self.run_round(round)
                .instrument(info_span!("round", round))
                .await?;
        }
        info!("{} stage completed", stage);
        Ok(())
    }

    /// Creates the state directories of the coordinator and of every client.
    async fn setup(&self) -> Result<(), FederationError> {
        create_dir(&self.settings.server_dir).await?;
        for cid in self.proxies.keys() {
            create_dir(&self.settings.client_dir(cid)).await?;
        }
        if let Some(dir) = &self.settings.capture_dir {
            create_dir(dir).await?;
        }
        Ok(())
    }

    async fn run_round(&mut self, round: u32) -> Result<(), FederationError> {
        let capture_dir = self.settings.capture_dir.as_deref();
        let mut pending = BTreeMap::new();
        for (cid, ins) in self.coordinator.configure_fit(round)? {
            if !self.proxies.contains_key(&cid) {
                return Err(FederationError::UnknownClient(cid));
            }
            capture(capture_dir, round, &cid, "ins", || ins.to_bytes()).await?;
            pending.insert(cid, ins);
        }
        info!("instructing {} clients", pending.len());

        let outcomes = future::join_all(self.proxies.iter_mut().filter_map(|(cid, proxy)| {
            pending
                .remove(cid)
                .map(|ins| async move { (cid.clone(), proxy.fit(ins).await) })
        }))
        .await;

        let mut results = BTreeMap::new();
        let mut failures = 0;
        for (cid, outcome) in outcomes {
            match outcome {
                Ok(res) => {
                    debug!(
                        "{} client {} handled {} records",
                        res.role, cid, res.num_examples
                    );
                    capture(capture_dir, round, &cid, "res", || res.to_bytes()).await?;
                    results.insert(cid, res);
                }
                Err(err) => {
                    error!("client {} failed: {}", cid, err);
                    failures += 1;
                }
            }
        }
        self.coordinator.aggregate_fit(round, results, failures)?;

        let evaluations = self.coordinator.configure_evaluate(round);
        debug!("scheduled {} evaluations", evaluations.len());
        let loss = self.coordinator.evaluate(round, &Parameters::empty());
        if loss.is_none() {
            debug!("no evaluation performed");
        }
        Ok(())
    }
}

async fn create_dir(path: &Path) -> Result<(), FederationError> {
    fs::create_dir_all(path)
        .await
        .map_err(|source| FederationError::Setup {
            path: path.to_path_buf(),
            source,
        })
}

/// Writes a payload to `<dir>/<round>_<cid>_<kind>.bin` if capturing is enabled.
async fn capture(
    dir: Option<&Path>,
    round: u32,
    cid: &ClientId,
    kind: &str,
    encode: impl FnOnce() -> Result<Vec<u8>, PayloadError>,
) -> Result<(), FederationError> {
    let dir = match dir {
        Some(dir) => dir,
        None => return Ok(()),
    };
    let path = dir.join(format!("{}_{}_{}.bin", round, cid, kind));
    let bytes = encode()?;
    debug!("capturing {} bytes to {}", bytes.len(), path.display());
    fs::write(&path, bytes)
        .await
        .map_err(|source| FederationError::Capture { path, source })
}
