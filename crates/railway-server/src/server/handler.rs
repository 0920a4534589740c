//! Per-connection worker: framing, dispatch and teardown.

use std::net::SocketAddr;

use railway_core::protocol::{LineBuffer, Response};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::Services;
use super::dispatch::{ConnectionState, handle_line, run_follow_up};
use crate::registry::{ConnectionId, ConnectionRegistry};

const READ_CHUNK: usize = 8 * 1024;

/// Serve one client until it disconnects, violates framing, or `cancel`
/// fires. Always unregisters the connection before returning.
#[instrument(skip_all, fields(connection_id = id, peer = %peer))]
pub async fn serve_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    id: ConnectionId,
    services: Services,
    registry: ConnectionRegistry,
    max_line_bytes: usize,
    cancel: CancellationToken,
) {
    let ip = peer.ip().to_string();
    services
        .auth
        .record_event("client_connected", None, Some(&ip), &format!("Client connected from {peer}"))
        .await;

    let mut conn = ConnectionState::new(peer);
    if let Err(e) = read_loop(
        &mut stream,
        &mut conn,
        id,
        &services,
        &registry,
        max_line_bytes,
        &cancel,
    )
    .await
    {
        debug!(error = %e, "Connection I/O error");
    }
    let _ = stream.shutdown().await;

    let user_id = conn.user_id();
    if let Some(session) = conn.session.take() {
        match services.auth.invalidate_session(&session.token).await {
            Ok(_) => debug!(user_id = session.user_id, "Session closed with connection"),
            Err(e) => warn!(user_id = session.user_id, error = %e, "Failed to invalidate session"),
        }
    }
    services
        .auth
        .record_event("client_disconnected", user_id, Some(&ip), "Client disconnected")
        .await;
    registry.unregister(id).await;
    info!(user_id, "Client disconnected");
}

async fn read_loop(
    stream: &mut TcpStream,
    conn: &mut ConnectionState,
    id: ConnectionId,
    services: &Services,
    registry: &ConnectionRegistry,
    max_line_bytes: usize,
    cancel: &CancellationToken,
) -> std::io::Result<()> {
    let mut frames = LineBuffer::new(max_line_bytes);
    let mut chunk = vec![0u8; READ_CHUNK];

    loop {
        let n = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!("Connection cancelled by server");
                return Ok(());
            }
            read = stream.read(&mut chunk) => read?,
        };
        if n == 0 {
            return Ok(());
        }
        frames.extend(&chunk[..n]);

        while let Some(line) = frames.next_line() {
            let before = conn.user_id();
            let outcome = handle_line(services, conn, &line).await;
            if conn.user_id() != before {
                registry.set_user(id, conn.user_id()).await;
            }

            write_response(stream, &outcome.response).await?;

            if let Some(follow_up) = outcome.follow_up {
                let services = services.clone();
                tokio::spawn(async move { run_follow_up(&services, follow_up).await });
            }
        }

        if let Err(e) = frames.check_pending() {
            warn!(error = %e, "Closing connection");
            return Ok(());
        }
    }
}

async fn write_response(stream: &mut TcpStream, response: &Response) -> std::io::Result<()> {
    match response.to_line() {
        Ok(line) => {
            stream.write_all(line.as_bytes()).await?;
            stream.flush().await
        }
        Err(e) => {
            warn!(command = %response.command, error = %e, "Failed to serialize response");
            Ok(())
        }
    }
}
