//! Standalone relay binary: WebSocket session management, presence, and
//! message routing, usable on its own or embedded by the client's "host
//! embedded relay" mode.

use std::net::SocketAddr;

use clap::Parser;
use dmrelay_core::config;
use dmrelay_server::server::{self, RelayState};
use tracing::error;

#[derive(Parser, Debug)]
#[command(name = "dmrelay-relay", about = "WebSocket relay for team messaging")]
struct Args {
    /// Address to bind the WebSocket listener on.
    #[arg(long, default_value = "0.0.0.0:7420")]
    bind: SocketAddr,

    /// Address to bind the `/status` HTTP endpoint on.
    #[arg(long, default_value = "0.0.0.0:7421")]
    status_bind: SocketAddr,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dmrelay_core::logging::init();
    let args = Args::parse();

    let root = config::resolve_data_root()?;
    let cfg = config::load_config(&root)?;
    let secret = cfg.relay.secret.ok_or_else(|| {
        anyhow::anyhow!("config.toml has no [relay] secret set; refusing to host a relay with no auth")
    })?;

    let inboxes_dir = root.join(&cfg.workspace).join("inboxes");
    let state = RelayState::new(inboxes_dir, secret);

    if let Err(err) = server::run(args.bind, args.status_bind, state).await {
        error!(error = %err, "relay exited with error");
        return Err(err);
    }
    Ok(())
}
