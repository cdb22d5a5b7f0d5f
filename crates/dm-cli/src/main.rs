//! dmrelay - the client entry point for team messaging.
//!
//! Connects to the relay, authenticates, and delivers inbound mail to the
//! local file-based inbox. With `--host-relay` it also hosts the relay
//! itself, embedded in the same process.

use clap::Parser;
use dmrelay_core::config;
use tracing::error;

mod client;

#[derive(Parser, Debug)]
#[command(name = "dmrelay", about = "Team messaging client for AI agents")]
struct Args {
    /// Also host the relay in this process, instead of connecting to one
    /// run elsewhere.
    #[arg(long)]
    host_relay: bool,
}

#[tokio::main]
async fn main() {
    dmrelay_core::logging::init();
    let args = Args::parse();

    if let Err(err) = run(args).await {
        error!(error = %err, "dmrelay exited with error");
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let root = config::resolve_data_root()?;
    let cfg = config::load_config(&root)?;

    if !cfg.relay_enabled() {
        anyhow::bail!("no relay url/secret configured in config.toml; nothing to connect to");
    }

    let inboxes_dir = root.join(&cfg.workspace).join("inboxes");
    client::run(cfg, inboxes_dir, args.host_relay).await
}
