#![warn(rust_2018_idioms)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use hare_messaging::{Broker, VirtualHost};
use tracing::info;

#[derive(Parser)]
#[clap(author, about)]
struct Args {
    /// The port to listen on
    #[clap(short, long, default_value_t = 5555)]
    port: u16,
    /// The address to bind to
    #[clap(long, default_value = "127.0.0.1")]
    host: String,
    /// Where exchanges, queues, bindings and durable messages are stored
    #[clap(long, default_value = "./data")]
    base_dir: PathBuf,
    /// The name of the virtual host
    #[clap(long, default_value = "/")]
    vhost: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    setup_tracing();

    let vhost = VirtualHost::open(args.vhost.as_str(), &args.base_dir)
        .with_context(|| format!("failed to open vhost in {}", args.base_dir.display()))?;
    info!(
        vhost = %vhost.name(),
        base_dir = %args.base_dir.display(),
        "Opened virtual host"
    );

    let broker = Broker::start(vhost);

    hare_transport::connection_loop(broker, (args.host.as_str(), args.port), async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(%err, "Failed to listen for ctrl-c");
        }
    })
    .await
}

fn setup_tracing() {
    tracing_subscriber::fmt()
        .with_level(true)
        .with_timer(tracing_subscriber::fmt::time::time())
        .with_ansi(true)
        .with_thread_names(true)
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()))
        .init();
}
