use std::{path::PathBuf, process};

use anyhow::Context;
use structopt::StructOpt;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use fedjoin::{
    centralized::{self, pandemic},
    federation::Federation,
    predictions::PredictionPaths,
    settings::Settings,
};

#[derive(Debug, StructOpt)]
#[structopt(name = "fedjoin")]
enum Opt {
    /// Runs the stage of the federation named in the configuration
    Federated {
        /// Path of the configuration file
        #[structopt(short, parse(from_os_str))]
        config_path: PathBuf,
    },
    /// Runs a centralized baseline on all data at once
    Centralized(Centralized),
}

#[derive(Debug, StructOpt)]
enum Centralized {
    /// Fits the transaction and account models
    Train {
        #[structopt(long, parse(from_os_str))]
        swift_data: PathBuf,
        #[structopt(long, parse(from_os_str))]
        bank_data: PathBuf,
        #[structopt(long, parse(from_os_str))]
        model_dir: PathBuf,
    },
    /// Scores transactions with the fitted models
    Predict {
        #[structopt(long, parse(from_os_str))]
        swift_data: PathBuf,
        #[structopt(long, parse(from_os_str))]
        bank_data: PathBuf,
        #[structopt(long, parse(from_os_str))]
        model_dir: PathBuf,
        #[structopt(flatten)]
        output: Output,
    },
    /// Fits the SIR infection risk model
    PandemicTrain {
        #[structopt(long, parse(from_os_str))]
        disease_outcome_data: PathBuf,
        #[structopt(long, parse(from_os_str))]
        model_dir: PathBuf,
        /// Prediction window in days
        #[structopt(long, default_value = "7")]
        lookahead: u32,
    },
    /// Predicts the infection risk with the fitted SIR model
    PandemicPredict {
        #[structopt(long, parse(from_os_str))]
        disease_outcome_data: PathBuf,
        #[structopt(long, parse(from_os_str))]
        model_dir: PathBuf,
        #[structopt(flatten)]
        output: Output,
    },
}

#[derive(Debug, StructOpt)]
struct Output {
    /// Path of the prediction format file
    #[structopt(long, parse(from_os_str))]
    preds_format: PathBuf,
    /// Where to write the predictions
    #[structopt(long, parse(from_os_str))]
    preds_dest: PathBuf,
}

impl From<Output> for PredictionPaths {
    fn from(output: Output) -> Self {
        PredictionPaths::new(output.preds_format, output.preds_dest)
    }
}

fn init_logging(filter: EnvFilter) {
    let _fmt_subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_ansi(true)
        .init();
}

#[tokio::main]
async fn main() {
    if let Err(err) = run(Opt::from_args()).await {
        eprintln!("{:?}", err);
        process::exit(1);
    }
}

async fn run(opt: Opt) -> anyhow::Result<()> {
    match opt {
        Opt::Federated { config_path } => {
            let Settings {
                log,
                federation,
                partitions,
            } = Settings::new(&config_path)
                .with_context(|| format!("invalid configuration {}", config_path.display()))?;
            init_logging(log.filter);
            Federation::from_settings(federation, &partitions)?
                .run()
                .await?;
        }
        Opt::Centralized(command) => {
            let filter =
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
            init_logging(filter);
            run_centralized(command)?;
        }
    }
    info!("done");
    Ok(())
}

fn run_centralized(command: Centralized) -> anyhow::Result<()> {
    match command {
        Centralized::Train {
            swift_data,
            bank_data,
            model_dir,
        } => centralized::fit(&swift_data, &bank_data, &model_dir)?,
        Centralized::Predict {
            swift_data,
            bank_data,
            model_dir,
            output,
        } => {
            centralized::predict(&swift_data, &bank_data, &model_dir, &output.into())?;
        }
        Centralized::PandemicTrain {
            disease_outcome_data,
            model_dir,
            lookahead,
        } => pandemic::fit(&disease_outcome_data, &model_dir, lookahead)?,
        Centralized::PandemicPredict {
            disease_outcome_data,
            model_dir,
            output,
        } => {
            pandemic::predict(&disease_outcome_data, &model_dir, &output.into())?;
        }
    }
    Ok(())
}
