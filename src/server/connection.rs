//! Per-connection task

use super::Server;
use super::session::{CloseReason, Session};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tokio::net::TcpStream;
use tokio::sync::OwnedSemaphorePermit;
use tracing::debug;

/// Run one client session to completion
pub async fn handle(
    server: Arc<Server>,
    stream: TcpStream,
    peer: SocketAddr,
    _permit: OwnedSemaphorePermit,
) -> CloseReason {
    let id = server.next_id.fetch_add(1, Ordering::Relaxed);
    let cancel = server.cancel_token.child_token();
    let session = Session::new(id, peer, stream, Arc::clone(&server.ctx), cancel.clone());

    server
        .registry
        .register(id, peer, session.activity(), cancel);
    debug!("Session {} opened for {}", id, peer);

    let reason = session.run().await;

    server.registry.remove(id);
    server.ctx.metrics.active_sessions.dec();
    reason
}
