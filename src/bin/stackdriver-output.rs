//! Reads newline-delimited JSON events from stdin and ships them to Google Cloud Logging.

use std::{path::PathBuf, process::ExitCode, sync::Arc};

use clap::Parser;
use stackdriver_logging_output::{
    Batcher, BatcherConfig, StackdriverConfig, StackdriverOutput, forward_lines,
};
use tokio::io::BufReader;
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt};

#[derive(Parser, Debug)]
#[clap(version, about = "Ships newline-delimited JSON events from stdin to Google Cloud Logging")]
struct Args {
    /// Path to the JSON output configuration
    #[clap(value_parser, value_name = "CONFIG_FILE", env = "STACKDRIVER_OUTPUT_CONFIG")]
    config: PathBuf,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = Registry::default()
        .with(filter)
        .with(tracing_stackdriver::layer().with_writer(std::io::stderr));

    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("failed to install tracing subscriber: {err}");
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = StackdriverConfig::from_file(&args.config)?;
    let output = Arc::new(StackdriverOutput::register(config).await?);
    let batcher = Batcher::new(output, BatcherConfig::default());

    let forwarded = forward_lines(BufReader::new(tokio::io::stdin()), &batcher).await;
    batcher.shutdown().await;

    tracing::debug!("Forwarded {} events", forwarded?);
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{err}");
            ExitCode::FAILURE
        }
    }
}
