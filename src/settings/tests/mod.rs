use std::path::PathBuf;

use validator::Validate;

use super::{FederationSettings, LoggingSettings, PartitionSettings, Settings};
use crate::common::{Role, Stage};

fn partition(cid: &str, role: Role) -> PartitionSettings {
    PartitionSettings {
        cid: cid.into(),
        role,
        data_path: PathBuf::from(format!("{}.csv", cid)),
        predictions_format_path: None,
        predictions_dest_path: None,
    }
}

fn settings(stage: Stage, partitions: Vec<PartitionSettings>) -> Settings {
    Settings {
        log: LoggingSettings {
            filter: "info".parse().unwrap(),
        },
        federation: FederationSettings {
            stage,
            server_dir: "server".into(),
            clients_dir: "clients".into(),
            capture_dir: None,
        },
        partitions,
    }
}

#[test]
fn test_settings_new() {
    assert!(Settings::new("configs/train.toml").is_ok());
    assert!(Settings::new("configs/test.toml").is_ok());
    assert!(Settings::new("").is_err());
}

#[test]
fn test_load_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
[log]
filter = "fedjoin=debug"

[federation]
stage = "train"
server_dir = "state/server"
clients_dir = "state/clients"

[[partitions]]
cid = "swift"
role = "central"
data_path = "swift.csv"

[[partitions]]
cid = "bank01"
role = "partition"
data_path = "bank01.csv"
"#,
    )
    .unwrap();

    let settings = Settings::new(&path).unwrap();
    assert_eq!(settings.federation.stage, Stage::Train);
    assert_eq!(settings.federation.capture_dir, None);
    assert_eq!(
        settings.federation.client_dir(&"bank01".into()),
        PathBuf::from("state/clients/bank01")
    );
    assert_eq!(settings.partitions.len(), 2);
    assert_eq!(settings.partitions[1].role, Role::Partition);
    assert_eq!(settings.central().unwrap().cid.as_str(), "swift");
}

#[test]
fn test_invalid_filter() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
[log]
filter = "fedjoin=loud"

[federation]
stage = "train"
server_dir = "s"
clients_dir = "c"

[[partitions]]
cid = "swift"
role = "central"
data_path = "swift.csv"
"#,
    )
    .unwrap();
    assert!(matches!(
        Settings::new(&path),
        Err(super::SettingsError::Loading(_))
    ));
}

#[test]
fn test_validate_partitions() {
    let valid = settings(
        Stage::Train,
        vec![partition("swift", Role::Central), partition("bank01", Role::Partition)],
    );
    assert!(valid.validate().is_ok());

    // no central partition
    assert!(settings(Stage::Train, vec![partition("bank01", Role::Partition)])
        .validate()
        .is_err());

    // two central partitions
    assert!(settings(
        Stage::Train,
        vec![partition("swift", Role::Central), partition("swift2", Role::Central)]
    )
    .validate()
    .is_err());

    // duplicate and empty client ids
    assert!(settings(
        Stage::Train,
        vec![
            partition("swift", Role::Central),
            partition("bank01", Role::Partition),
            partition("bank01", Role::Partition),
        ]
    )
    .validate()
    .is_err());
    assert!(settings(
        Stage::Train,
        vec![partition("swift", Role::Central), partition("", Role::Partition)]
    )
    .validate()
    .is_err());
}

#[test]
fn test_validate_prediction_paths() {
    let mut central = partition("swift", Role::Central);
    assert!(settings(Stage::Test, vec![central.clone()])
        .validate()
        .is_err());

    central.predictions_format_path = Some("format.csv".into());
    assert!(settings(Stage::Test, vec![central.clone()])
        .validate()
        .is_err());

    central.predictions_dest_path = Some("predictions.csv".into());
    assert!(settings(Stage::Test, vec![central.clone()])
        .validate()
        .is_ok());
    assert_eq!(
        central.predictions().unwrap().dest,
        PathBuf::from("predictions.csv")
    );
}
