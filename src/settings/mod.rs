//! Loading and validation of settings.
//!
//! Values defined in the configuration file can be overridden by environment variables with
//! the `FEDJOIN` prefix. Examples of configuration files can be found in the `configs/`
//! directory located in the repository root.

use std::{collections::HashSet, fmt, path::Path, path::PathBuf};

use config::{Config, ConfigError, Environment};
use serde::{
    de::{self, Deserializer, Visitor},
    Deserialize,
};
use thiserror::Error;
use tracing_subscriber::filter::EnvFilter;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::{
    common::{ClientId, Role, Stage},
    predictions::PredictionPaths,
};

#[derive(Error, Debug)]
/// An error related to loading and validation of settings.
pub enum SettingsError {
    #[error("configuration loading failed: {0}")]
    Loading(#[from] ConfigError),
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationErrors),
}

#[derive(Debug, Validate, Deserialize)]
#[validate(schema(function = "validate_partitions"))]
/// The combined settings.
///
/// Each section in the configuration file corresponds to the identically named settings field.
pub struct Settings {
    pub log: LoggingSettings,
    pub federation: FederationSettings,
    pub partitions: Vec<PartitionSettings>,
}

impl Settings {
    /// Loads and validates the settings via a configuration file.
    ///
    /// # Errors
    /// Fails when the loading of the configuration file or its validation failed.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let settings: Settings = Self::load(path)?;
        settings.validate()?;
        Ok(settings)
    }

    fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                Environment::with_prefix("fedjoin")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()
    }

    /// The settings of the central partition.
    pub fn central(&self) -> Option<&PartitionSettings> {
        self.partitions
            .iter()
            .find(|partition| partition.role == Role::Central)
    }
}

/// Checks the partitions against the stage of the federation.
fn validate_partitions(settings: &Settings) -> Result<(), ValidationError> {
    let centrals = settings
        .partitions
        .iter()
        .filter(|partition| partition.role == Role::Central)
        .count();
    if centrals != 1 {
        return Err(ValidationError::new("exactly one central partition is required"));
    }

    let mut cids = HashSet::new();
    for partition in &settings.partitions {
        if partition.cid.as_str().is_empty() {
            return Err(ValidationError::new("empty client id"));
        }
        if !cids.insert(&partition.cid) {
            return Err(ValidationError::new("duplicate client id"));
        }
    }

    if settings.federation.stage == Stage::Test
        && settings
            .central()
            .and_then(PartitionSettings::predictions)
            .is_none()
    {
        return Err(ValidationError::new(
            "the central partition requires prediction paths in the test stage",
        ));
    }
    Ok(())
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
/// Federation settings.
pub struct FederationSettings {
    /// The stage to run.
    ///
    /// # Examples
    ///
    /// **TOML**
    /// ```text
    /// [federation]
    /// stage = "train"
    /// # or
    /// stage = "test"
    /// ```
    ///
    /// **Environment variable**
    /// ```text
    /// FEDJOIN_FEDERATION__STAGE=test
    /// ```
    pub stage: Stage,
    /// The state directory of the coordinator.
    pub server_dir: PathBuf,
    /// The directory holding the state directory of every client, named after its client id.
    /// The same directory must be used for the train and the test stages.
    pub clients_dir: PathBuf,
    /// If set, every payload exchanged is written to this directory.
    #[serde(default)]
    pub capture_dir: Option<PathBuf>,
}

impl FederationSettings {
    /// The state directory of a client.
    pub fn client_dir(&self, cid: &ClientId) -> PathBuf {
        self.clients_dir.join(cid.as_str())
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
/// The data partition of a client.
///
/// # Examples
///
/// **TOML**
/// ```text
/// [[partitions]]
/// cid = "swift"
/// role = "central"
/// data_path = "data/swift_transaction_train_dataset.csv"
///
/// [[partitions]]
/// cid = "bank01"
/// role = "partition"
/// data_path = "data/bank01_dataset.csv"
/// ```
pub struct PartitionSettings {
    pub cid: ClientId,
    pub role: Role,
    pub data_path: PathBuf,
    /// The prediction format file, used by the central partition in the test stage.
    #[serde(default)]
    pub predictions_format_path: Option<PathBuf>,
    /// Where the central partition writes its predictions in the test stage.
    #[serde(default)]
    pub predictions_dest_path: Option<PathBuf>,
}

impl PartitionSettings {
    pub fn predictions(&self) -> Option<PredictionPaths> {
        match (&self.predictions_format_path, &self.predictions_dest_path) {
            (Some(format), Some(dest)) => Some(PredictionPaths::new(format, dest)),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
/// Logging settings.
pub struct LoggingSettings {
    /// A comma-separated list of logging directives. More information about logging directives
    /// can be found [here].
    ///
    /// # Examples
    ///
    /// **TOML**
    /// ```text
    /// [log]
    /// filter = "info"
    /// ```
    ///
    /// **Environment variable**
    /// ```text
    /// FEDJOIN_LOG__FILTER=info
    /// ```
    ///
    /// [here]: https://docs.rs/tracing-subscriber/0.3/tracing_subscriber/filter/struct.EnvFilter.html#directives
    #[serde(deserialize_with = "deserialize_env_filter")]
    pub filter: EnvFilter,
}

fn deserialize_env_filter<'de, D>(deserializer: D) -> Result<EnvFilter, D::Error>
where
    D: Deserializer<'de>,
{
    struct EnvFilterVisitor;

    impl<'de> Visitor<'de> for EnvFilterVisitor {
        type Value = EnvFilter;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            write!(formatter, "a valid tracing filter directive: https://docs.rs/tracing-subscriber/0.3/tracing_subscriber/filter/struct.EnvFilter.html#directives")
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            EnvFilter::try_new(value)
                .map_err(|_| de::Error::invalid_value(serde::de::Unexpected::Str(value), &self))
        }
    }

    deserializer.deserialize_str(EnvFilterVisitor)
}

#[cfg(test)]
mod tests;
