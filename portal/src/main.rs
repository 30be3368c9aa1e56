mod config;

use clap::{Args, Parser, Subcommand};
use config::{CommonConfig, Config, ConfigError};
use feedback::errors::PortalError;
use metrics_exporter_statsd::StatsdBuilder;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

const METRICS_PREFIX: &str = "feedback_portal";

#[derive(Parser)]
#[command(name = "portal", about = "Feedback portal for labs and experiments")]
struct Cli {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Serve the feedback form
    Run(ConfigArgs),
    /// Load and validate a config file, then exit
    CheckConfig(ConfigArgs),
    /// Print the metrics the portal emits
    ListMetrics,
}

#[derive(Args)]
struct ConfigArgs {
    #[arg(long, short)]
    config: PathBuf,
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Portal(#[from] PortalError),
    #[error("could not start runtime: {0}")]
    Runtime(#[from] std::io::Error),
    #[error("could not set up metrics: {0}")]
    Metrics(String),
}

fn main() -> Result<(), CliError> {
    let cli = Cli::parse();

    match cli.command {
        CliCommand::Run(args) => run(args),
        CliCommand::CheckConfig(args) => {
            Config::from_file(&args.config)?;
            println!("{}: ok", args.config.display());
            Ok(())
        }
        CliCommand::ListMetrics => {
            for def in feedback::metrics_defs::ALL_METRICS {
                println!(
                    "{METRICS_PREFIX}.{} ({}): {}",
                    def.name,
                    def.metric_type.as_str(),
                    def.description
                );
            }
            Ok(())
        }
    }
}

fn run(args: ConfigArgs) -> Result<(), CliError> {
    let config = Config::from_file(&args.config)?;
    let _sentry = init_logging(&config.common);
    init_metrics(&config.common)?;

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    rt.block_on(feedback::run(config.feedback)).map_err(|e| {
        tracing::error!(error = %e, "Feedback portal stopped");
        e.into()
    })
}

fn init_logging(common: &CommonConfig) -> Option<sentry::ClientInitGuard> {
    let guard = common.logging.as_ref().map(|logging| {
        sentry::init((
            logging.sentry_dsn.as_str(),
            sentry::ClientOptions {
                release: sentry::release_name!(),
                ..Default::default()
            },
        ))
    });

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let sentry_layer = guard
        .as_ref()
        .map(|_| sentry::integrations::tracing::layer());

    Registry::default()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_layer)
        .init();

    guard
}

fn init_metrics(common: &CommonConfig) -> Result<(), CliError> {
    let Some(metrics_config) = &common.metrics else {
        return Ok(());
    };

    let recorder = StatsdBuilder::from(&metrics_config.statsd_host, metrics_config.statsd_port)
        .build(Some(METRICS_PREFIX))
        .map_err(|e| CliError::Metrics(e.to_string()))?;
    metrics::set_global_recorder(recorder)
        .map_err(|_| CliError::Metrics("a metrics recorder is already installed".to_string()))?;

    tracing::info!(
        host = %metrics_config.statsd_host,
        port = metrics_config.statsd_port,
        "Sending metrics to statsd"
    );
    Ok(())
}
