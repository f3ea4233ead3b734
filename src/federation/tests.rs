use std::{
    collections::{BTreeMap, HashMap},
    path::PathBuf,
};

use tempfile::TempDir;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use super::*;
use crate::{
    client::ClientError,
    common::{Round, Stage},
    message::FitRes,
    model::{Features, LocalModel, NaiveBayesPipeline, MODEL_FILE},
    payload::Membership,
};

const SWIFT_TRAIN: &str = "\
MessageId,Timestamp,UETR,Sender,Receiver,TransactionReference,BeneficiaryAccount,InstructedCurrency,Label
1,2022-01-01 10:00:00,u1,bankA,bankX,r1,acct1,USD,1
2,2022-01-01 11:00:00,u2,bankA,bankY,r2,acct2,EUR,0
3,2022-01-01 12:00:00,u3,bankA,bankY,r3,acct3,EUR,1
";

const SWIFT_TEST: &str = "\
MessageId,Timestamp,UETR,Sender,Receiver,TransactionReference,BeneficiaryAccount,InstructedCurrency
1,2022-02-01 10:00:00,u1,bankA,bankX,r1,acct1,USD
2,2022-02-01 11:00:00,u2,bankA,bankY,r2,acct2,EUR
4,2022-02-01 12:00:00,u4,bankA,bankZ,r4,acct4,USD
5,2022-02-01 13:00:00,u5,bankA,bankY,r5,acct9,EUR
";

const BANK01: &str = "Bank,Account,Name,Flags\nbankX,acct1,Jane,HIGH\n";

const BANK02: &str = "Bank,Account,Name,Flags\nbankY,acct2,John,LOW\nbankY,acct3,Joe,HIGH\n";

const FORMAT: &str = "MessageId,Score\n1,0\n2,0\n4,0\n5,0\n";

fn enable_logging() {
    let _fmt_subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .with_ansi(true)
        .try_init();
}

/// Partition files and state directories of a federation of one central and two partition
/// clients.
struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        for (name, content) in &[
            ("swift_train.csv", SWIFT_TRAIN),
            ("swift_test.csv", SWIFT_TEST),
            ("bank01.csv", BANK01),
            ("bank02.csv", BANK02),
            ("format.csv", FORMAT),
        ] {
            std::fs::write(dir.path().join(name), content).unwrap();
        }
        Self { dir }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn predictions(&self) -> PathBuf {
        self.path("predictions.csv")
    }

    fn settings(&self, stage: Stage) -> (FederationSettings, Vec<PartitionSettings>) {
        let federation = FederationSettings {
            stage,
            server_dir: self.path("server"),
            clients_dir: self.path("clients"),
            capture_dir: None,
        };
        let swift = match stage {
            Stage::Train => "swift_train.csv",
            Stage::Test => "swift_test.csv",
        };
        let partition = |cid: &str, role: Role, data: &str| PartitionSettings {
            cid: cid.into(),
            role,
            data_path: self.path(data),
            predictions_format_path: None,
            predictions_dest_path: None,
        };
        let mut central = partition("swift", Role::Central, swift);
        central.predictions_format_path = Some(self.path("format.csv"));
        central.predictions_dest_path = Some(self.predictions());
        let partitions = vec![
            central,
            partition("bank01", Role::Partition, "bank01.csv"),
            partition("bank02", Role::Partition, "bank02.csv"),
        ];
        (federation, partitions)
    }

    fn federation(&self, stage: Stage) -> Federation {
        let (federation, partitions) = self.settings(stage);
        Federation::from_settings(federation, &partitions).unwrap()
    }

    fn model(&self, cid: &str) -> NaiveBayesPipeline {
        NaiveBayesPipeline::load(&self.path("clients").join(cid).join(MODEL_FILE)).unwrap()
    }

    fn written_predictions(&self) -> HashMap<String, f64> {
        csv::Reader::from_path(self.predictions())
            .unwrap()
            .records()
            .map(|record| {
                let record = record.unwrap();
                (record[0].to_string(), record[1].parse().unwrap())
            })
            .collect()
    }
}

fn features(ids: &[&str], values: &[&str]) -> Features {
    Features::single(
        ids.iter().map(|id| id.to_string()).collect(),
        values.iter().map(|value| Some(value.to_string())).collect(),
    )
    .unwrap()
}

fn local_proxy(
    federation: &FederationSettings,
    partition: &PartitionSettings,
) -> Box<dyn ClientProxy> {
    let mut store = PartitionStore::new();
    store.insert(partition.cid.clone(), partition.role, &partition.data_path);
    let client = Client::new(
        partition.cid.clone(),
        federation.stage,
        store.load(&partition.cid).unwrap(),
        federation.client_dir(&partition.cid),
        partition.predictions(),
    );
    Box::new(LocalClientProxy::new(client))
}

fn failure() -> ClientError {
    ClientError::Data(DataError::UnknownPartition("bank02".into()))
}

#[tokio::test]
async fn test_train_then_test() {
    enable_logging();
    let fixture = Fixture::new();

    fixture.federation(Stage::Train).run().await.unwrap();
    assert!(fixture.path("server").is_dir());
    for cid in &["swift", "bank01", "bank02"] {
        assert!(fixture.path("clients").join(cid).join(MODEL_FILE).exists());
    }
    // the account model of bank01 was fit on [HIGH] -> [1]
    let bank01 = fixture.model("bank01");
    assert_eq!(bank01.classes(), Some(vec![1]));
    assert!(!fixture.predictions().exists());

    fixture.federation(Stage::Test).run().await.unwrap();
    let written = fixture.written_predictions();
    assert_eq!(written.len(), 4);

    let central = fixture
        .model("swift")
        .predict(&features(&["1", "2", "4", "5"], &["USD", "EUR", "USD", "EUR"]))
        .unwrap();
    let bank02 = fixture.model("bank02");
    let low = bank02.predict(&features(&["2"], &["LOW"])).unwrap();
    let unflagged = bank02
        .predict(&Features::single(vec!["5".into()], vec![None]).unwrap())
        .unwrap();
    // a single training class gives a zero account score
    let high = bank01.predict(&features(&["1"], &["HIGH"])).unwrap();
    assert_eq!(high.values(), &[0.]);
    assert_eq!(written["1"], 0.);
    assert_eq!(written["2"], central.values()[1] * low.values()[0]);
    // bankZ is not held by any partition: the account score defaults to 1
    assert_eq!(written["4"], central.values()[2]);
    // acct9 is routed to bank02 but has no flag row: scored as the missing category
    assert_eq!(written["5"], central.values()[3] * unflagged.values()[0]);
    assert!(unflagged.values()[0] < 1.);
}

#[tokio::test]
async fn test_capture() {
    let fixture = Fixture::new();
    let (mut federation, partitions) = fixture.settings(Stage::Train);
    federation.capture_dir = Some(fixture.path("capture"));
    Federation::from_settings(federation, &partitions)
        .unwrap()
        .run()
        .await
        .unwrap();

    let capture = fixture.path("capture");
    for name in &[
        "1_swift_ins.bin",
        "1_swift_res.bin",
        "1_bank01_res.bin",
        "2_bank01_ins.bin",
        "2_bank02_res.bin",
    ] {
        assert!(capture.join(name).exists(), "missing {}", name);
    }
    // the central client takes no part in round 2 of training
    assert!(!capture.join("2_swift_ins.bin").exists());

    let bytes = std::fs::read(capture.join("1_bank01_res.bin")).unwrap();
    let res: FitRes = bincode::deserialize(&bytes).unwrap();
    assert_eq!(res.role, Role::Partition);
    let banks = Membership::from_parameters(&res.parameters).unwrap();
    assert!(banks.contains("bankX"));
}

#[tokio::test]
async fn test_failure_in_round_one() {
    enable_logging();
    let fixture = Fixture::new();
    let (federation, partitions) = fixture.settings(Stage::Test);
    let mut bank = MockClientProxy::new();
    bank.expect_fit().times(1).returning(|_| Err(failure()));

    let mut proxies: BTreeMap<ClientId, Box<dyn ClientProxy>> = BTreeMap::new();
    proxies.insert("swift".into(), local_proxy(&federation, &partitions[0]));
    proxies.insert("bank02".into(), Box::new(bank));

    let err = Federation::new(federation, proxies)
        .run()
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        FederationError::Coordinator(CoordinatorError::Failures {
            round: Round::One,
            count: 1
        })
    ));
    assert!(!fixture.predictions().exists());
}

#[tokio::test]
async fn test_failure_in_round_two() {
    enable_logging();
    let fixture = Fixture::new();
    fixture.federation(Stage::Train).run().await.unwrap();

    let (federation, partitions) = fixture.settings(Stage::Test);
    let mut proxies: BTreeMap<ClientId, Box<dyn ClientProxy>> = BTreeMap::new();
    for partition in &partitions[..2] {
        proxies.insert(partition.cid.clone(), local_proxy(&federation, partition));
    }

    // declares its banks, then fails while scoring
    let mut bank = MockClientProxy::new();
    bank.expect_fit().times(2).returning(|ins| match ins.config.round {
        1 => {
            let banks: Membership = vec!["bankY".to_string()].into_iter().collect();
            Ok(FitRes::new(Role::Partition, banks.to_parameters().unwrap(), 0))
        }
        _ => Err(failure()),
    });
    proxies.insert("bank02".into(), Box::new(bank));

    let err = Federation::new(federation, proxies)
        .run()
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        FederationError::Coordinator(CoordinatorError::Failures {
            round: Round::Two,
            count: 1
        })
    ));
    assert_eq!(err.to_string(), "round 2 failed for 1 client(s)");
    assert!(!fixture.predictions().exists());
}

#[tokio::test]
async fn test_missing_partition_file() {
    let fixture = Fixture::new();
    let (federation, mut partitions) = fixture.settings(Stage::Train);
    partitions[1].data_path = fixture.path("nope.csv");
    assert!(matches!(
        Federation::from_settings(federation, &partitions),
        Err(FederationError::Data(DataError::Open { .. }))
    ));
}
