use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use herald::banner::{BannerInfo, print_banner, print_goodbye};
use herald::command::{HostApplication, PeerRole, RemoteCommand};
use herald::commands::kill::Kill;
use herald::commands::peer::KillPeers;
use herald::commands::ping::Ping;
use herald::config::EngineConfig;
use herald::connection::{Connection, TcpConnection};
use herald::consts::default_config_path;

#[derive(Parser)]
#[command(name = "herald", version, about = "Carries remote commands to the engines that run them.")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Engine configuration file (TOML)
    #[arg(short, long, conflicts_with = "config_string")]
    config: Option<PathBuf>,

    /// Engine configuration given inline (TOML)
    #[arg(long)]
    config_string: Option<String>,

    /// Log at debug level regardless of RUST_LOG
    #[arg(long, default_value_t = false)]
    debug: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Send a built-in command to a running socket engine
    Send {
        /// Engine to send to, as host:port
        #[arg(long)]
        to: String,

        #[arg(value_enum)]
        command: Builtin,

        /// Where a ping response should be sent, as host:port
        #[arg(long)]
        reply_to: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Builtin {
    Ping,
    Kill,
    KillWorkers,
    KillSlaves,
}

impl Builtin {
    fn build(self, reply_to: Option<String>) -> Box<dyn RemoteCommand> {
        match self {
            Self::Ping => match reply_to {
                Some(reply_to) => Box::new(Ping::request().with_reply_to(reply_to)),
                None => Box::new(Ping::request()),
            },
            Self::Kill => Box::new(Kill::new()),
            Self::KillWorkers => Box::new(KillPeers::new(PeerRole::Worker)),
            Self::KillSlaves => Box::new(KillPeers::new(PeerRole::Slave)),
        }
    }
}

fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Resolve the configuration and describe where it came from.
fn load_config(cli: &Cli) -> anyhow::Result<(EngineConfig, String)> {
    if let Some(text) = &cli.config_string {
        let config = EngineConfig::parse(text).context("invalid --config-string")?;
        return Ok((config, "inline".to_string()));
    }
    let path = match &cli.config {
        Some(path) => path.clone(),
        None => match default_config_path() {
            Some(path) if path.exists() => path,
            _ => bail!("no configuration given: use --config or --config-string"),
        },
    };
    let config = EngineConfig::load(&path)
        .with_context(|| format!("failed to load {}", path.display()))?;
    Ok((config, path.display().to_string()))
}

async fn send(to: &str, command: Box<dyn RemoteCommand>) -> anyhow::Result<()> {
    let connection = TcpConnection::parse(to)?;
    connection.send_request(command.as_ref()).await?;
    println!("sent {} to {}", command.name(), connection.descriptor());
    Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    if let Some(Command::Send {
        to,
        command,
        reply_to,
    }) = &cli.command
    {
        return send(to, command.build(reply_to.clone())).await;
    }

    let (config, source) = load_config(&cli)?;
    let engine = config.build_with(Some(Arc::new(HostApplication::new("herald"))))?;
    let description = engine.configuration();

    print_banner(&BannerInfo {
        engine: &description,
        source: &source,
    });

    // Ctrl+C stops the engine and lets its loop wind down
    let interrupt = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupted, stopping engine");
                engine.stop_execution().await;
            }
        })
    };
    let result = engine.execute().await;
    interrupt.abort();
    result?;
    print_goodbye();
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    if let Err(e) = run(cli).await {
        error!("{e:#}");
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
