use std::{env, future, io::Read, net::SocketAddr};

use clap::{Args, Parser, Subcommand};
use jemallocator::Jemalloc;
use metrics::gauge;
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use rustc_hash::FxHashMap;
use spool::{
    agent,
    config::{self, Config, Telemetry},
    signals,
};
use tokio::{
    runtime::Builder,
    signal,
    task::JoinError,
    time::{self, Duration},
};
use tracing::{debug, error, info};
use tracing_subscriber::{EnvFilter, util::SubscriberInitExt};

#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

#[derive(thiserror::Error, Debug)]
enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("Spool config is invalid: {0}")]
    Config(#[from] config::Error),
    #[error("Spool agent returned an error: {0}")]
    Agent(#[from] agent::Error),
    #[error("Parsing Prometheus address failed: {0}")]
    PrometheusAddr(#[from] std::net::AddrParseError),
    #[error("Failed to install prometheus recorder: {0}")]
    Prometheus(#[from] BuildError),
    #[error("Could not join the agent task: {0}")]
    Join(#[from] JoinError),
}

fn default_config_path() -> String {
    "/etc/spool/spool.yaml".to_string()
}

#[derive(Parser)]
#[clap(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run spool with specified configuration
    Run(RunCommand),
    /// Validate configuration file and exit
    ConfigCheck(ConfigCheckCommand),
}

#[derive(Args)]
struct RunCommand {
    /// path on disk to the configuration file
    #[clap(long, default_value_t = default_config_path())]
    config_path: String,
    /// address to bind prometheus exporter to, overrides any configured
    /// telemetry
    #[clap(long)]
    prometheus_addr: Option<String>,
    /// the time, in seconds, to run before shutting down; runs until ctrl-c
    /// when absent
    #[clap(long)]
    duration_seconds: Option<u64>,
    /// the maximum time to wait, in seconds, for controlled shutdown
    #[clap(long, default_value_t = 30)]
    max_shutdown_delay: u16,
}

#[derive(Args)]
struct ConfigCheckCommand {
    /// path on disk to the configuration file
    #[clap(long, default_value_t = default_config_path())]
    config_path: String,
}

fn load_config_contents(config_path: &str) -> Result<String, Error> {
    if let Ok(env_var_value) = env::var("SPOOL_CONFIG") {
        debug!("Using config from env var 'SPOOL_CONFIG'");
        Ok(env_var_value)
    } else {
        debug!("Attempting to open configuration file at: {}", config_path);
        let mut file = std::fs::OpenOptions::new()
            .read(true)
            .open(config_path)
            .map_err(|err| {
                error!("Could not read config file '{}': {}", config_path, err);
                err
            })?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;
        Ok(contents)
    }
}

fn parse_config(contents: &str) -> Result<Config, Error> {
    Config::from_yaml(contents).map_err(|err| {
        error!("Configuration validation failed: {}", err);
        Error::Config(err)
    })
}

fn validate_config(config_path: &str) -> Result<Config, Error> {
    let contents = load_config_contents(config_path)?;
    let config = parse_config(&contents)?;
    info!("Configuration file is valid");
    Ok(config)
}

fn get_config(args: &RunCommand) -> Result<Config, Error> {
    let contents = load_config_contents(&args.config_path)?;
    let mut config = parse_config(&contents)?;

    if let Some(addr) = &args.prometheus_addr {
        let addr: SocketAddr = addr.parse()?;
        let global_labels = match config.telemetry.take() {
            Some(Telemetry::Prometheus { global_labels, .. }) => global_labels,
            None => FxHashMap::default(),
        };
        config.telemetry = Some(Telemetry::Prometheus {
            addr,
            global_labels,
        });
    }
    Ok(config)
}

async fn inner_main(run_duration: Option<Duration>, config: Config) -> Result<(), Error> {
    // Without configured telemetry the metrics macros are no-ops.
    if let Some(Telemetry::Prometheus {
        addr,
        global_labels,
    }) = config.telemetry.clone()
    {
        let mut builder = PrometheusBuilder::new().with_http_listener(addr);
        for (k, v) in global_labels {
            builder = builder.add_global_label(k, v);
        }
        builder.install()?;
        info!("prometheus exporter listening on {addr}");
    }

    let (shutdown_watcher, shutdown_broadcast) = signals::signal();
    let mut agent = tokio::spawn(agent::run(config, shutdown_watcher));

    let timer = async {
        match run_duration {
            Some(duration) => time::sleep(duration).await,
            None => future::pending::<()>().await,
        }
    };
    tokio::pin!(timer);

    let mut interval = time::interval(Duration::from_millis(400));
    let res = loop {
        tokio::select! {
            _ = interval.tick() => {
                gauge!("spool.running").set(1.0);
            },
            _ = signal::ctrl_c() => {
                info!("received ctrl-c");
                break None;
            },
            () = &mut timer => {
                info!("run duration elapsed");
                break None;
            },
            res = &mut agent => {
                error!("agent stopped before shutdown was requested");
                break Some(res);
            },
        }
    };

    shutdown_broadcast.signal();
    let res = match res {
        Some(res) => res,
        None => agent.await,
    };
    gauge!("spool.running").set(0.0);
    res??;
    Ok(())
}

fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_ansi(false)
        .finish()
        .init();

    let version = env!("CARGO_PKG_VERSION");
    info!("Starting spool {version}.");

    let args = match Cli::parse().command {
        Commands::Run(args) => args,
        Commands::ConfigCheck(config_check_cmd) => {
            match validate_config(&config_check_cmd.config_path) {
                Ok(_) => std::process::exit(0),
                Err(_) => std::process::exit(1),
            }
        }
    };

    let config = get_config(&args)?;
    let run_duration = args.duration_seconds.map(Duration::from_secs);
    let max_shutdown_delay = Duration::from_secs(args.max_shutdown_delay.into());

    let runtime = Builder::new_multi_thread()
        .enable_io()
        .enable_time()
        .build()?;
    let res = runtime.block_on(inner_main(run_duration, config));
    info!(
        "Shutting down runtime with a {} second delay. May leave orphaned tasks.",
        max_shutdown_delay.as_secs(),
    );
    runtime.shutdown_timeout(max_shutdown_delay);
    info!("Bye. :)");
    res
}
