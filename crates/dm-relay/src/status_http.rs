//! A minimal `GET /status` responder, hand-rolled over a raw TCP listener
//! since nothing else in the relay's dependency stack speaks HTTP.

use std::net::SocketAddr;

use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::registry::SharedSessionRegistry;

pub async fn run(bind_addr: SocketAddr, registry: SharedSessionRegistry) -> std::io::Result<()> {
    let listener = TcpListener::bind(bind_addr).await?;
    info!(%bind_addr, "status endpoint listening");

    loop {
        let (stream, _peer) = listener.accept().await?;
        let registry = registry.clone();
        tokio::spawn(async move {
            if let Err(err) = handle_connection(stream, &registry).await {
                warn!(error = %err, "status connection failed");
            }
        });
    }
}

async fn handle_connection(
    mut stream: tokio::net::TcpStream,
    registry: &SharedSessionRegistry,
) -> std::io::Result<()> {
    // Only the request line is needed; a real client may send headers too,
    // so drain what's immediately available without blocking on a full
    // Content-Length-less body.
    let mut buf = [0u8; 1024];
    let _ = stream.read(&mut buf).await?;

    let body = status_body(registry);
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    );
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await?;
    Ok(())
}

fn status_body(registry: &SharedSessionRegistry) -> String {
    let guard = registry.lock().unwrap();
    let online = guard.online_handles();
    let payload = json!({
        "status": "ok",
        "users_online": online.len(),
        "users": online,
    });
    payload.to_string()
}
