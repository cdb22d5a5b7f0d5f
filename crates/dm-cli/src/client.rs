//! Relay client: connect, authenticate, listen, and deliver inbound mail to
//! the local inbox. Reconnects with a fixed backoff if the relay drops.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use dmrelay_core::config::Config;
use dmrelay_core::{inbox, Message};
use dmrelay_server::protocol::{ClientFrame, PresenceStatus, ServerFrame};
use dmrelay_server::server::{self, RelayState};
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{error, info, warn};

const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Runs the client forever: connects to the relay, optionally hosting an
/// embedded relay first, and reconnects on disconnect until the process is
/// killed.
pub async fn run(cfg: Config, inboxes_dir: PathBuf, host_embedded_relay: bool) -> anyhow::Result<()> {
    let url = cfg
        .relay
        .url
        .clone()
        .ok_or_else(|| anyhow::anyhow!("config.toml has no [relay] url set; relay path is disabled"))?;
    let secret = cfg
        .relay
        .secret
        .clone()
        .ok_or_else(|| anyhow::anyhow!("config.toml has no [relay] secret set; relay path is disabled"))?;

    if host_embedded_relay {
        let ws_addr = socket_addr_from_ws_url(&url)?;
        let status_addr = SocketAddr::new(ws_addr.ip(), ws_addr.port() + 1);
        let relay_inboxes = inboxes_dir.clone();
        let relay_secret = secret.clone();
        tokio::spawn(async move {
            let state = RelayState::new(relay_inboxes, relay_secret);
            if let Err(err) = server::run(ws_addr, status_addr, state).await {
                error!(error = %err, "embedded relay exited with error");
            }
        });
        // Give the embedded listener a moment to bind before we connect to it.
        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    loop {
        match connect_and_listen(&url, &secret, &cfg.handle, &cfg.claude_whitelist, &inboxes_dir).await {
            Ok(()) => info!("relay connection closed cleanly"),
            Err(err) => warn!(error = %err, "relay connection dropped"),
        }
        info!(delay_secs = RECONNECT_DELAY.as_secs(), "reconnecting to relay");
        tokio::time::sleep(RECONNECT_DELAY).await;
    }
}

async fn connect_and_listen(
    url: &str,
    secret: &str,
    handle: &str,
    claude_whitelist: &[String],
    inboxes_dir: &Path,
) -> anyhow::Result<()> {
    let (ws, _response) = tokio_tungstenite::connect_async(url).await?;
    let (mut sink, mut stream) = ws.split();

    let whitelist = if claude_whitelist.is_empty() {
        None
    } else {
        Some(claude_whitelist.to_vec())
    };
    let auth = ClientFrame::Auth {
        secret: secret.to_string(),
        username: handle.to_string(),
        status: Some(PresenceStatus::Online),
        claude_whitelist: whitelist,
    };
    let auth_json = serde_json::to_string(&auth)?;
    sink.send(WsMessage::Text(auth_json.into())).await?;

    while let Some(frame) = stream.next().await {
        let frame = match frame? {
            WsMessage::Text(text) => text,
            WsMessage::Close(_) => break,
            _ => continue,
        };

        let parsed: ServerFrame = match serde_json::from_str(&frame) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!(error = %err, "could not parse server frame");
                continue;
            }
        };

        handle_server_frame(parsed, handle, inboxes_dir);
    }

    Ok(())
}

fn handle_server_frame(frame: ServerFrame, handle: &str, inboxes_dir: &Path) {
    match frame {
        ServerFrame::AuthOk { online, .. } => {
            info!(online = online.len(), "authenticated with relay");
        }
        ServerFrame::AuthError { message } => {
            warn!(message = %message, "relay rejected authentication");
        }
        ServerFrame::Message {
            from,
            text,
            priority,
            msg_id,
            timestamp,
            thread,
            reply_to,
            ..
        } => {
            if let Err(err) = deliver_to_local_inbox(
                inboxes_dir, handle, msg_id, from, text, priority, timestamp, thread, reply_to,
            ) {
                error!(error = %err, "failed to write delivered message to local inbox");
            }
        }
        ServerFrame::SendAck { to, delivered, .. } => {
            info!(to = %to, delivered, "send acknowledged");
        }
        ServerFrame::PresenceChange { user, status, .. } => {
            info!(user = %user, status = status.as_str(), "presence changed");
        }
        ServerFrame::Presence { online, .. } => {
            info!(online = online.len(), "presence snapshot");
        }
        ServerFrame::StatusOk { status } => {
            info!(status = status.as_str(), "status updated");
        }
        ServerFrame::Pong => {}
        ServerFrame::Error { message } => {
            warn!(message = %message, "relay reported an error");
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn deliver_to_local_inbox(
    inboxes_dir: &Path,
    handle: &str,
    id: String,
    from: String,
    text: String,
    priority: dmrelay_core::Priority,
    timestamp: String,
    thread: Option<String>,
    reply_to: Option<String>,
) -> Result<(), dmrelay_core::io::InboxError> {
    let existing = inbox::existing_ids(inboxes_dir, handle)?;
    if existing.contains(&id) {
        return Ok(()); // already delivered; relay retried after a missed ack
    }

    let message = Message {
        id,
        from,
        to: handle.to_string(),
        timestamp,
        text,
        priority,
        status: Some(dmrelay_core::StatusTag::Unread),
        thread,
        reply_to,
        task_status: None,
        started_at: None,
        completed_at: None,
        extra: Default::default(),
    };
    inbox::append(inboxes_dir, handle, &message)?;
    Ok(())
}

fn socket_addr_from_ws_url(url: &str) -> anyhow::Result<SocketAddr> {
    let without_scheme = url
        .strip_prefix("ws://")
        .or_else(|| url.strip_prefix("wss://"))
        .unwrap_or(url);
    let host_port = without_scheme.split('/').next().unwrap_or(without_scheme);
    host_port
        .parse()
        .map_err(|e| anyhow::anyhow!("could not parse relay url '{url}' as a socket address: {e}"))
}
