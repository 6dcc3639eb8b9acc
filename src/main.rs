mod config;
mod file;
mod logging;
mod server;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{info, warn};

use crate::config::Config;
use crate::file::FileStorage;
use crate::server::api::{self, AppState};
use crate::server::HttpServer;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file
    #[arg(long, global = true)]
    conf: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP file server (default)
    Server {
        #[arg(long)]
        port: Option<u16>,
    },
    /// Print the resolved configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = Config::load(cli.conf.as_deref())?;

    match cli.command {
        Some(Commands::Config) => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Some(Commands::Server { port }) => {
            if let Some(port) = port {
                config.http.ports.http_port = port;
            }
            run_server(config).await?;
        }
        None => run_server(config).await?,
    }

    Ok(())
}

async fn run_server(config: Config) -> anyhow::Result<()> {
    let _log_guard = logging::init(&config.log.log_dir);

    if !config.nodes.is_empty() {
        warn!(
            nodes = ?config.nodes,
            sync_port = config.http.ports.sync_port,
            "Peer nodes are configured but synchronization is not supported; ignoring"
        );
    }

    let storage = FileStorage::new(&config.data.data_dir)?;
    info!(data_dir = %storage.base_path().display(), "File storage ready");

    let timeout = match config.http.timeout {
        0 => None,
        secs => Some(Duration::from_secs(u64::from(secs))),
    };
    let app = api::router(Arc::new(AppState { storage }), timeout);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.http.ports.http_port));
    let server = HttpServer::start(addr, app)?;

    let signal = wait_for_exit_signal().await?;
    info!(signal, "exit");
    server.stop().await?;
    info!("exited!");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_exit_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut quit = signal(SignalKind::quit())?;
    let name = tokio::select! {
        _ = interrupt.recv() => "SIGINT",
        _ = terminate.recv() => "SIGTERM",
        _ = quit.recv() => "SIGQUIT",
    };
    Ok(name)
}

#[cfg(not(unix))]
async fn wait_for_exit_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("ctrl-c")
}
