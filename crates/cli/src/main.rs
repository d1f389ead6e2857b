mod check;
mod host;

use std::{path::PathBuf, sync::Arc};

use {
    clap::{Parser, Subcommand},
    roomsync_config::RoomsyncConfig,
    roomsync_slack::{ConnectionWorker, SinkHub, SlackConnector, WorkerSettings, WorkerState},
    tokio_util::sync::CancellationToken,
    tracing::{info, warn},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

use crate::host::ConsoleHost;

#[derive(Parser)]
#[command(name = "roomsync", about = "roomsync: Slack ↔ host room relay")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config file (default: roomsync.{toml,yaml,yml,json} in ./ or the
    /// user config dir).
    #[arg(long, global = true, env = "ROOMSYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start one relay worker per configured sink (default).
    Run {
        /// Relay `<conversation> <text>` lines typed on stdin to Slack.
        #[arg(long)]
        stdin: bool,
        /// Sender name used for console lines.
        #[arg(long, default_value = "console")]
        sender: String,
    },
    /// Validate the configuration file and report errors/warnings.
    Check {
        /// Show informational diagnostics in addition to errors and warnings.
        #[arg(long)]
        verbose: bool,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

fn load(cli: &Cli) -> anyhow::Result<RoomsyncConfig> {
    match &cli.config {
        Some(path) => roomsync_config::load_config(path),
        None => Ok(roomsync_config::discover_and_load()),
    }
}

async fn run(config: RoomsyncConfig, stdin: bool, sender: String) -> anyhow::Result<()> {
    if config.sinks.is_empty() {
        warn!("no sinks configured, nothing to relay");
        return Ok(());
    }

    // Several TLS stacks may be linked; pick one process-wide.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let console = Arc::new(ConsoleHost::from_config(&config));
    let connector = Arc::new(SlackConnector::new(config.relay.api_base_url.clone())?);
    let hub = Arc::new(SinkHub::new(console.clone(), connector.clone()));
    let settings = WorkerSettings::from(&config.relay);
    let shutdown = CancellationToken::new();

    let workers: Vec<_> = config
        .sinks
        .iter()
        .enumerate()
        .map(|(i, sink)| {
            ConnectionWorker::new(
                sink.display_name(i),
                sink.clone(),
                settings.clone(),
                connector.clone(),
                console.clone(),
                Arc::clone(&hub),
            )
            .spawn(shutdown.child_token())
        })
        .collect();
    info!(sinks = workers.len(), "relay running, press Ctrl-C to stop");

    if stdin {
        tokio::spawn(host::read_console(Arc::clone(&hub), sender, shutdown.clone()));
    }

    let all_terminated = futures::future::join_all(workers.iter().map(|w| {
        let mut state = w.subscribe();
        async move {
            let _ = state.wait_for(|s| *s == WorkerState::Terminated).await;
        }
    }));

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("shutting down");
        },
        _ = all_terminated => warn!("all workers terminated"),
    }

    shutdown.cancel();
    for worker in workers {
        worker.join().await;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    init_telemetry(&cli);

    match cli.command {
        None => {
            info!(version = env!("CARGO_PKG_VERSION"), "roomsync starting");
            run(load(&cli)?, false, "console".into()).await
        },
        Some(Commands::Run { stdin, ref sender }) => {
            info!(version = env!("CARGO_PKG_VERSION"), "roomsync starting");
            run(load(&cli)?, stdin, sender.clone()).await
        },
        Some(Commands::Check { verbose }) => {
            if check::check(cli.config.as_deref(), verbose) {
                std::process::exit(1);
            }
            Ok(())
        },
    }
}
