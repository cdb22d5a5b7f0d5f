//! Accept loop: one task per WebSocket connection, dispatching frames
//! through the router and registry.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use subtle::ConstantTimeEq;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::dedup::DedupeStore;
use crate::protocol::{ClientFrame, PresenceStatus, ServerFrame};
use crate::registry::{new_session_registry, SharedSessionRegistry};
use crate::router;
use crate::session::Session;
use crate::{heartbeat, status_http};

const SEND_DEDUPE_TTL: Duration = Duration::from_secs(300);
const SEND_DEDUPE_CAPACITY: usize = 4096;

#[derive(Clone)]
pub struct RelayState {
    pub inboxes_dir: PathBuf,
    pub secret: String,
    pub registry: SharedSessionRegistry,
    pub dedupe: Arc<Mutex<DedupeStore>>,
}

impl RelayState {
    pub fn new(inboxes_dir: PathBuf, secret: String) -> Self {
        RelayState {
            inboxes_dir,
            secret,
            registry: new_session_registry(),
            dedupe: Arc::new(Mutex::new(DedupeStore::new(SEND_DEDUPE_TTL, SEND_DEDUPE_CAPACITY))),
        }
    }
}

/// Runs the WebSocket accept loop and the `/status` HTTP endpoint side by
/// side until one of them fails.
pub async fn run(ws_addr: SocketAddr, status_addr: SocketAddr, state: RelayState) -> anyhow::Result<()> {
    let listener = TcpListener::bind(ws_addr).await?;
    info!(%ws_addr, "relay listening");

    let status_registry = state.registry.clone();
    let status_task = tokio::spawn(async move { status_http::run(status_addr, status_registry).await });

    loop {
        let (stream, peer) = listener.accept().await?;
        let state = state.clone();
        tokio::spawn(async move {
            if let Err(err) = handle_connection(stream, peer, state).await {
                warn!(%peer, error = %err, "connection ended with error");
            }
        });

        if status_task.is_finished() {
            warn!("status endpoint task exited; continuing relay without it");
        }
    }
}

/// What `authenticate` hands back once a connection has joined the
/// registry: enough to run the read loop, watch for displacement, and tear
/// down only this connection's own session on exit.
struct AuthedSession {
    handle: String,
    id: u64,
    cancel: CancellationToken,
}

async fn handle_connection(stream: TcpStream, peer: SocketAddr, state: RelayState) -> anyhow::Result<()> {
    let ws = tokio_tungstenite::accept_async(stream).await?;
    let (mut ws_sink, mut ws_stream) = ws.split();

    let (outbox_tx, mut outbox_rx) = mpsc::unbounded_channel::<ServerFrame>();
    let writer = tokio::spawn(async move {
        while let Some(frame) = outbox_rx.recv().await {
            let Ok(json) = serde_json::to_string(&frame) else {
                continue;
            };
            if ws_sink.send(WsMessage::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    let authed = match authenticate(&mut ws_stream, &outbox_tx, &state).await {
        Some(authed) => authed,
        None => {
            writer.abort();
            return Ok(());
        }
    };
    let AuthedSession { handle, id: session_id, cancel } = authed;

    info!(%peer, %handle, "session authenticated");
    let heartbeat_task = tokio::spawn(heartbeat::run(state.registry.clone(), handle.clone(), session_id));
    router::broadcast_presence_change(&state.registry, &handle, PresenceStatus::Online);

    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => {
                info!(%peer, %handle, "session displaced by reconnect");
                break;
            }
            frame = ws_stream.next() => frame,
        };

        let frame = match frame {
            Some(Ok(WsMessage::Text(text))) => text,
            Some(Ok(WsMessage::Close(_))) | Some(Err(_)) | None => break,
            Some(Ok(_)) => continue,
        };

        if let Some(session) = state.registry.lock().unwrap().get_mut(&handle) {
            session.touch_activity();
        }

        match serde_json::from_str::<ClientFrame>(&frame) {
            Ok(client_frame) => handle_frame(&state, &handle, client_frame),
            Err(err) => {
                if let Some(session) = state.registry.lock().unwrap().get(&handle) {
                    session.send(ServerFrame::Error {
                        message: format!("could not parse frame: {err}"),
                    });
                }
            }
        }
    }

    heartbeat_task.abort();
    if state.registry.lock().unwrap().remove_if_current(&handle, session_id).is_some() {
        router::broadcast_presence(&state.registry);
    }
    writer.abort();
    info!(%peer, %handle, "session closed");
    Ok(())
}

/// Compares the two secrets in constant time, so a bad guess doesn't leak
/// how many leading bytes it got right.
fn secrets_match(given: &str, configured: &str) -> bool {
    given.as_bytes().ct_eq(configured.as_bytes()).into()
}

async fn authenticate(
    ws_stream: &mut (impl StreamExt<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>> + Unpin),
    outbox_tx: &mpsc::UnboundedSender<ServerFrame>,
    state: &RelayState,
) -> Option<AuthedSession> {
    let first = ws_stream.next().await?;
    let WsMessage::Text(text) = first.ok()? else {
        let _ = outbox_tx.send(ServerFrame::AuthError {
            message: "first frame must be auth".to_string(),
        });
        return None;
    };

    let frame: ClientFrame = serde_json::from_str(&text).ok()?;
    let ClientFrame::Auth {
        secret,
        username,
        status,
        claude_whitelist,
    } = frame
    else {
        let _ = outbox_tx.send(ServerFrame::AuthError {
            message: "first frame must be auth".to_string(),
        });
        return None;
    };

    if !secrets_match(&secret, &state.secret) {
        let _ = outbox_tx.send(ServerFrame::AuthError {
            message: "invalid secret".to_string(),
        });
        return None;
    }

    let mut session = Session::new(username.clone(), outbox_tx.clone(), claude_whitelist);
    session.status = status.unwrap_or(PresenceStatus::Online);
    let id = session.id;
    let cancel = session.cancel.clone();

    let (online, statuses) = {
        let mut guard = state.registry.lock().unwrap();
        guard.insert(session);
        (guard.online_handles(), guard.statuses())
    };

    let _ = outbox_tx.send(ServerFrame::AuthOk {
        username: username.clone(),
        online,
        statuses,
    });

    Some(AuthedSession {
        handle: username,
        id,
        cancel,
    })
}

fn handle_frame(state: &RelayState, handle: &str, frame: ClientFrame) {
    match frame {
        ClientFrame::Auth { .. } => {
            if let Some(session) = state.registry.lock().unwrap().get(handle) {
                session.send(ServerFrame::Error {
                    message: "already authenticated".to_string(),
                });
            }
        }
        ClientFrame::Send {
            to,
            text,
            priority,
            msg_id,
            thread,
            reply_to,
        } => {
            let duplicate = state.dedupe.lock().unwrap().check_and_insert(&msg_id, std::time::Instant::now());
            if duplicate {
                if let Some(session) = state.registry.lock().unwrap().get(handle) {
                    session.send(ServerFrame::SendAck {
                        to,
                        delivered: true,
                        auto_replied: None,
                        queued: Some(false),
                    });
                }
                return;
            }

            let outcome = router::route_send(
                &state.inboxes_dir,
                &state.registry,
                handle,
                &to,
                &text,
                priority.unwrap_or_default(),
                thread.as_deref(),
                reply_to.as_deref(),
                Utc::now(),
            );
            if let Some(session) = state.registry.lock().unwrap().get(handle) {
                session.send(ServerFrame::SendAck {
                    to: outcome.to,
                    delivered: outcome.delivered,
                    auto_replied: Some(outcome.auto_replied),
                    queued: Some(!outcome.delivered),
                });
            }
        }
        ClientFrame::Presence => {
            let (online, statuses) = router::snapshot(&state.registry);
            if let Some(session) = state.registry.lock().unwrap().get(handle) {
                session.send(ServerFrame::Presence { online, statuses });
            }
        }
        ClientFrame::StatusChange { status } => {
            {
                let mut guard = state.registry.lock().unwrap();
                if let Some(session) = guard.get_mut(handle) {
                    session.status = status;
                }
            }
            router::broadcast_presence_change(&state.registry, handle, status);
            if let Some(session) = state.registry.lock().unwrap().get(handle) {
                session.send(ServerFrame::StatusOk { status });
            }
        }
        ClientFrame::Ping => {
            if let Some(session) = state.registry.lock().unwrap().get(handle) {
                session.send(ServerFrame::Pong);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secrets_match_accepts_equal_secrets() {
        assert!(secrets_match("s3cr3t", "s3cr3t"));
    }

    #[test]
    fn secrets_match_rejects_different_secrets() {
        assert!(!secrets_match("s3cr3t", "wrong"));
    }

    #[test]
    fn secrets_match_rejects_different_lengths() {
        assert!(!secrets_match("short", "much-longer-secret"));
    }
}
