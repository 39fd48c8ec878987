use anyhow::Context as _;
use clap::Parser;
use filament::{
    limits::{ConnLimits, ServerLimits},
    DocumentRoot, Server,
};
use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::PathBuf,
    time::Duration,
};

#[derive(Parser)]
#[command(name = "filament")]
#[command(about = "Serve a directory over HTTP/1.x")]
#[command(version)]
struct Cli {
    /// Port to listen on
    #[arg(default_value_t = 2019)]
    port: u16,

    /// Worker threads (0 picks one per core)
    #[arg(default_value_t = 0)]
    workers: usize,

    /// Address to bind
    #[arg(default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    address: IpAddr,

    /// Directory files are served from
    #[arg(long, default_value = "./www")]
    root: PathBuf,

    /// Seconds advertised in the `Keep-Alive` header
    #[arg(long, default_value_t = 30)]
    keep_alive_timeout: u64,

    /// Seconds after which a connection is told to close
    #[arg(long, default_value_t = 60)]
    connection_time_limit: u64,

    /// Log every request
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        true => tracing::Level::DEBUG,
        false => tracing::Level::INFO,
    };
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_max_level(level)
        .init();

    let root = DocumentRoot::open(&cli.root)
        .with_context(|| format!("cannot open document root {}", cli.root.display()))?;

    let server = Server::builder()
        .bind(SocketAddr::new(cli.address, cli.port))
        .root(root)
        .server_limits(ServerLimits {
            workers: cli.workers,
            ..ServerLimits::default()
        })
        .connection_limits(ConnLimits {
            keep_alive_timeout: Duration::from_secs(cli.keep_alive_timeout),
            connection_time_limit: Duration::from_secs(cli.connection_time_limit),
            ..ConnLimits::default()
        })
        .build()
        .with_context(|| format!("cannot listen on {}:{}", cli.address, cli.port))?;

    tokio::select! {
        res = server.launch() => {
            res?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    Ok(())
}
