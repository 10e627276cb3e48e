//! TCP listener for client sessions

mod connection;
pub mod registry;
pub mod session;

pub use registry::SessionRegistry;
pub use session::{CloseReason, LastActivity, Session, SessionContext, SessionState};

use crate::config::ServerConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Main server struct
pub struct Server {
    config: ServerConfig,
    pub(crate) ctx: Arc<SessionContext>,
    pub(crate) registry: Arc<SessionRegistry>,
    connection_semaphore: Arc<Semaphore>,
    pub(crate) next_id: AtomicU64,
    pub(crate) cancel_token: CancellationToken,
}

impl Server {
    /// Create a new server
    pub fn new(
        config: ServerConfig,
        ctx: Arc<SessionContext>,
        cancel_token: CancellationToken,
    ) -> Self {
        let connection_semaphore = Arc::new(Semaphore::new(config.max_connections));

        Self {
            config,
            ctx,
            registry: Arc::new(SessionRegistry::new()),
            connection_semaphore,
            next_id: AtomicU64::new(1),
            cancel_token,
        }
    }

    /// Number of open sessions
    pub fn session_count(&self) -> usize {
        self.registry.len()
    }

    /// Bind the configured address and serve until cancelled
    pub async fn run(self: Arc<Self>) -> anyhow::Result<()> {
        let addr: SocketAddr = self.config.listen_addr.parse()?;
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener).await
    }

    /// Serve sessions accepted on `listener` until cancelled
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> anyhow::Result<()> {
        info!("Server listening on {}", listener.local_addr()?);

        if self.config.idle_timeout_secs > 0 {
            let registry = Arc::clone(&self.registry);
            let metrics = Arc::clone(&self.ctx.metrics);
            tokio::spawn(registry.run_reaper(
                Duration::from_secs(self.config.idle_timeout_secs),
                Duration::from_millis(self.config.idle_check_interval_ms.max(1)),
                self.cancel_token.clone(),
                move |closed| metrics.idle_closed_sessions.inc_by(closed as u64),
            ));
        }

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!("Server shutting down");
                    break;
                }
                result = listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            // Replies are single small writes
                            if let Err(e) = stream.set_nodelay(true) {
                                warn!("Failed to set TCP_NODELAY: {}", e);
                            }

                            match self.connection_semaphore.clone().try_acquire_owned() {
                                Ok(permit) => {
                                    self.ctx.metrics.total_sessions.inc();
                                    self.ctx.metrics.active_sessions.inc();
                                    debug!("Accepted connection from {}", peer_addr);

                                    let server = Arc::clone(&self);
                                    tokio::spawn(async move {
                                        connection::handle(server, stream, peer_addr, permit).await;
                                    });
                                }
                                Err(_) => {
                                    self.ctx.metrics.rejected_sessions.inc();
                                    warn!("Connection limit reached, rejecting connection from {}", peer_addr);
                                    drop(stream);
                                }
                            }
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::BuiltinCommands;
    use crate::config::SessionConfig;
    use crate::leader::{LeaderAddress, Leadership, StaticLeadership};
    use crate::metrics::Metrics;
    use crate::stats::SlowLog;
    use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpStream;

    async fn start(
        config: ServerConfig,
        leadership: Arc<StaticLeadership>,
    ) -> (SocketAddr, Arc<Server>, CancellationToken) {
        let leadership: Arc<dyn Leadership> = leadership;
        let metrics = Arc::new(Metrics::new());
        let ctx = SessionContext::new(
            &SessionConfig::default(),
            Arc::new(BuiltinCommands::new(
                Arc::clone(&leadership),
                tokio::runtime::Handle::current(),
            )),
            leadership,
            Arc::new(SlowLog::new(16)),
            metrics,
        )
        .unwrap();

        let cancel = CancellationToken::new();
        let server = Arc::new(Server::new(config, Arc::new(ctx), cancel.clone()));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(Arc::clone(&server).serve(listener));
        (addr, server, cancel)
    }

    async fn roundtrip(reader: &mut BufReader<TcpStream>, request: &str) -> String {
        reader.get_mut().write_all(request.as_bytes()).await.unwrap();
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        line
    }

    #[tokio::test]
    async fn test_end_to_end_over_tcp() {
        let leadership = Arc::new(StaticLeadership::new(true, None));
        let (addr, _server, cancel) = start(ServerConfig::default(), leadership).await;

        let mut client = BufReader::new(TcpStream::connect(addr).await.unwrap());
        assert_eq!(
            roundtrip(&mut client, "ping\r\n").await,
            "{\"state\":\"success\",\"msg\":\"PONG\"}\r\n"
        );
        assert_eq!(
            roundtrip(&mut client, "help\n").await,
            "{\"state\":\"success\",\"data\":[\"echo\",\"help\",\"leader\",\"ping\",\"sleep\"]}\r\n"
        );
        assert_eq!(
            roundtrip(&mut client, "ping now\n").await,
            "ping\r\n"
        );
        assert_eq!(
            roundtrip(&mut client, "cluster_ls\n").await,
            "{\"state\":\"error\",\"msg\":\"ERR command not found\"}\r\n"
        );

        client.get_mut().write_all(b"quit\n").await.unwrap();
        let mut rest = Vec::new();
        client.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());

        cancel.cancel();
    }

    #[tokio::test]
    async fn test_follower_redirects_after_leadership_change() {
        let leadership = Arc::new(StaticLeadership::new(true, None));
        let (addr, _server, cancel) =
            start(ServerConfig::default(), Arc::clone(&leadership)).await;

        let mut client = BufReader::new(TcpStream::connect(addr).await.unwrap());
        assert_eq!(
            roundtrip(&mut client, "echo hi there\n").await,
            "hi there\r\n"
        );

        leadership.set_leader(false);
        leadership.set_leader_address(Some(LeaderAddress::new("10.0.0.3", 1122)));
        assert_eq!(
            roundtrip(&mut client, "echo hi\n").await,
            "{\"state\":\"redirect\",\"data\":{\"ip\":\"10.0.0.3\",\"port\":1122}}\r\n"
        );
        assert_eq!(
            roundtrip(&mut client, "leader\n").await,
            "{\"state\":\"success\",\"data\":{\"ip\":\"10.0.0.3\",\"port\":1122}}\r\n"
        );

        cancel.cancel();
    }

    #[tokio::test]
    async fn test_connection_limit() {
        let config = ServerConfig {
            max_connections: 1,
            ..ServerConfig::default()
        };
        let leadership = Arc::new(StaticLeadership::new(true, None));
        let (addr, server, cancel) = start(config, leadership).await;

        let mut first = BufReader::new(TcpStream::connect(addr).await.unwrap());
        assert_eq!(
            roundtrip(&mut first, "ping\n").await,
            "{\"state\":\"success\",\"msg\":\"PONG\"}\r\n"
        );

        let mut second = TcpStream::connect(addr).await.unwrap();
        let mut rest = Vec::new();
        second.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
        assert_eq!(server.ctx.metrics.rejected_sessions.get(), 1);

        cancel.cancel();
    }

    #[tokio::test]
    async fn test_idle_sessions_are_closed() {
        let config = ServerConfig {
            idle_timeout_secs: 1,
            idle_check_interval_ms: 50,
            ..ServerConfig::default()
        };
        let leadership = Arc::new(StaticLeadership::new(true, None));
        let (addr, server, cancel) = start(config, leadership).await;

        let mut client = TcpStream::connect(addr).await.unwrap();
        let mut rest = Vec::new();
        tokio::time::timeout(Duration::from_secs(5), client.read_to_end(&mut rest))
            .await
            .unwrap()
            .unwrap();

        assert!(rest.is_empty());
        assert_eq!(server.ctx.metrics.idle_closed_sessions.get(), 1);

        // The session task deregisters right after the socket closes
        for _ in 0..100 {
            if server.session_count() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(server.session_count(), 0);

        cancel.cancel();
    }
}
