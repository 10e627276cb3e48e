//! Per-connection session engine
//!
//! A session cycles through three states:
//!
//! ```text
//!   Reading ──request──▶ Dispatched ──reply──▶ Writing ──flushed──▶ Reading
//!      │                     │                    │
//!      └──────── EOF / error / quit / cancel ─────┴──▶ Closed
//! ```
//!
//! While `Dispatched` the connection task does no socket I/O and only waits
//! on a one-shot channel. The command engine's callback, which may run on
//! any thread, encodes the reply and sends it through that channel; that
//! send is the only point where the two sides meet.

use crate::command::{CommandExecutor, JobCallback, JobResult};
use crate::config::SessionConfig;
use crate::error::ProtocolError;
use crate::leader::Leadership;
use crate::metrics::Metrics;
use crate::protocol::{
    Charset, LineAssembler, Reply, ReplyKind, Request, RequestLimits, RequestReader, reply,
};
use crate::stats::{CommandStat, Statistics};
use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace};

/// How long a cancelled session keeps writing an in-flight reply
const CANCEL_WRITE_GRACE: Duration = Duration::from_secs(5);

/// Collaborators and limits shared by every session
pub struct SessionContext {
    pub charset: Charset,
    pub limits: RequestLimits,
    pub slowlog_threshold: Duration,
    pub executor: Arc<dyn CommandExecutor>,
    pub leadership: Arc<dyn Leadership>,
    pub stats: Arc<dyn Statistics>,
    pub metrics: Arc<Metrics>,
}

impl SessionContext {
    pub fn new(
        config: &SessionConfig,
        executor: Arc<dyn CommandExecutor>,
        leadership: Arc<dyn Leadership>,
        stats: Arc<dyn Statistics>,
        metrics: Arc<Metrics>,
    ) -> crate::Result<Self> {
        Ok(Self {
            charset: Charset::for_label(&config.charset)?,
            limits: RequestLimits {
                recv_buffer_size: config.recv_buffer_size,
                max_request_size: config.max_request_size,
            },
            slowlog_threshold: Duration::from_millis(config.slowlog_threshold_ms),
            executor,
            leadership,
            stats,
            metrics,
        })
    }
}

/// Where a session is in its request cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for a complete request (read interest)
    Reading,
    /// Request handed to the command engine (no interest)
    Dispatched,
    /// Reply ready to send (write interest)
    Writing,
    Closed,
}

/// Why a session ended
#[derive(Debug)]
pub enum CloseReason {
    /// Peer closed the connection or the read failed
    Disconnected,
    /// Client sent `quit`
    Quit,
    Protocol(ProtocolError),
    WriteFailed(std::io::Error),
    /// Server shutdown or idle timeout
    Cancelled,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => f.write_str("disconnected"),
            Self::Quit => f.write_str("quit"),
            Self::Protocol(e) => write!(f, "{e}"),
            Self::WriteFailed(e) => write!(f, "write failed: {e}"),
            Self::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Last read or write, in milliseconds since the Unix epoch
#[derive(Debug, Default)]
pub struct LastActivity(AtomicU64);

impl LastActivity {
    pub fn new() -> Self {
        let activity = Self::default();
        activity.touch();
        activity
    }

    pub fn touch(&self) {
        self.touch_at(now_millis());
    }

    pub fn touch_at(&self, now_ms: u64) {
        self.0.store(now_ms, Ordering::Relaxed);
    }

    pub fn millis(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    /// Time since the last activity as of `now_ms`
    pub fn idle_for(&self, now_ms: u64) -> Duration {
        Duration::from_millis(now_ms.saturating_sub(self.millis()))
    }
}

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

enum Phase {
    Reading,
    Dispatched(oneshot::Receiver<Bytes>),
    Writing(Bytes),
    Closed(CloseReason),
}

impl Phase {
    fn state(&self) -> SessionState {
        match self {
            Phase::Reading => SessionState::Reading,
            Phase::Dispatched(_) => SessionState::Dispatched,
            Phase::Writing(_) => SessionState::Writing,
            Phase::Closed(_) => SessionState::Closed,
        }
    }
}

/// One client connection and its protocol state
pub struct Session<S> {
    id: u64,
    peer: SocketAddr,
    stream: S,
    recv: BytesMut,
    reader: RequestReader,
    ctx: Arc<SessionContext>,
    activity: Arc<LastActivity>,
    cancel: CancellationToken,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(
        id: u64,
        peer: SocketAddr,
        stream: S,
        ctx: Arc<SessionContext>,
        cancel: CancellationToken,
    ) -> Self {
        let reader = RequestReader::new(LineAssembler::new(ctx.charset), ctx.limits);
        Self {
            id,
            peer,
            stream,
            recv: BytesMut::with_capacity(ctx.limits.recv_buffer_size),
            reader,
            ctx,
            activity: Arc::new(LastActivity::new()),
            cancel,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Shared handle on the last-activity timestamp
    pub fn activity(&self) -> Arc<LastActivity> {
        Arc::clone(&self.activity)
    }

    /// Drive the session until it closes
    pub async fn run(mut self) -> CloseReason {
        let mut phase = Phase::Reading;
        loop {
            let from = phase.state();
            phase = match phase {
                Phase::Reading => self.on_readable().await,
                Phase::Dispatched(reply) => self.on_reply(reply).await,
                Phase::Writing(send) => self.on_writable(send).await,
                Phase::Closed(reason) => {
                    debug!("Session {} ({}) closed: {}", self.id, self.peer, reason);
                    return reason;
                }
            };
            trace!(
                "Session {} {:?} -> {:?}",
                self.id,
                from,
                phase.state()
            );
        }
    }

    /// Serve the next buffered request, reading from the socket only when
    /// no complete line is buffered.
    async fn on_readable(&mut self) -> Phase {
        loop {
            match self.reader.next_request(&mut self.recv) {
                Ok(Some(request)) => return self.dispatch(request),
                Ok(None) => {}
                Err(e) => {
                    self.ctx.metrics.protocol_errors.inc();
                    error!("Close session {} ({}): {}", self.id, self.peer, e);
                    return Phase::Closed(CloseReason::Protocol(e));
                }
            }

            let remaining = self.reader.limits().recv_buffer_size - self.recv.len();
            let mut limited = (&mut self.recv).limit(remaining);
            let result = tokio::select! {
                () = self.cancel.cancelled() => return Phase::Closed(CloseReason::Cancelled),
                result = self.stream.read_buf(&mut limited) => result,
            };
            self.activity.touch();

            match result {
                Ok(0) => return Phase::Closed(CloseReason::Disconnected),
                Ok(n) => self.ctx.metrics.bytes_read.inc_by(n as u64),
                Err(e) => {
                    debug!("Read error on session {}: {}", self.id, e);
                    return Phase::Closed(CloseReason::Disconnected);
                }
            }
        }
    }

    fn dispatch(&mut self, request: Request) -> Phase {
        if request.is_quit() {
            return Phase::Closed(CloseReason::Quit);
        }

        let (tx, rx) = oneshot::channel();
        let handler = CompletionHandler {
            session_id: self.id,
            peer: self.peer,
            ctx: Arc::clone(&self.ctx),
            reply_tx: tx,
        };

        self.ctx.metrics.requests.inc();
        trace!("Session {} dispatching '{}'", self.id, request.text());
        self.ctx
            .executor
            .perform(request, JobCallback::new(move |result| handler.complete(result)));
        Phase::Dispatched(rx)
    }

    async fn on_reply(&mut self, reply: oneshot::Receiver<Bytes>) -> Phase {
        tokio::select! {
            () = self.cancel.cancelled() => Phase::Closed(CloseReason::Cancelled),
            reply = reply => match reply {
                Ok(send) => Phase::Writing(send),
                Err(_) => {
                    error!("Command engine dropped the reply for session {}", self.id);
                    Phase::Writing(Bytes::from(Reply::internal_error().text))
                }
            },
        }
    }

    async fn on_writable(&mut self, send: Bytes) -> Phase {
        let stream = &mut self.stream;
        let write = async {
            stream.write_all(&send).await?;
            stream.flush().await
        };
        tokio::pin!(write);

        let result = tokio::select! {
            biased;
            result = &mut write => result,
            () = self.cancel.cancelled() => {
                // Never leave a half-written reply line behind
                match tokio::time::timeout(CANCEL_WRITE_GRACE, &mut write).await {
                    Ok(Ok(())) => self.ctx.metrics.bytes_written.inc_by(send.len() as u64),
                    Ok(Err(e)) => debug!("Write error on session {}: {}", self.id, e),
                    Err(_) => debug!(
                        "Session {} reply still pending after {:?}, dropping it",
                        self.id, CANCEL_WRITE_GRACE
                    ),
                }
                return Phase::Closed(CloseReason::Cancelled);
            }
        };
        self.activity.touch();

        match result {
            Ok(()) => {
                self.ctx.metrics.bytes_written.inc_by(send.len() as u64);
                Phase::Reading
            }
            Err(e) => Phase::Closed(CloseReason::WriteFailed(e)),
        }
    }
}

/// Completes one dispatched request. Runs on the executor's thread.
struct CompletionHandler {
    session_id: u64,
    peer: SocketAddr,
    ctx: Arc<SessionContext>,
    reply_tx: oneshot::Sender<Bytes>,
}

impl CompletionHandler {
    fn complete(self, result: JobResult) {
        let reply = reply::encode(&result, self.ctx.leadership.as_ref());
        if reply.kind == ReplyKind::Redirect {
            self.ctx.metrics.redirects.inc();
        }

        let send = match self.ctx.charset.encode(&reply.text) {
            Ok(bytes) => bytes,
            Err(e) => {
                self.ctx.metrics.reply_errors.inc();
                error!(
                    "Reply job result to session {} ({}) failed: {}",
                    self.session_id, self.peer, e
                );
                Bytes::from(Reply::fallback(&e).text)
            }
        };

        self.record(&result);

        if self.reply_tx.send(send).is_err() {
            debug!(
                "Session {} closed before its reply was ready",
                self.session_id
            );
        }
    }

    fn record(&self, result: &JobResult) {
        let stat = CommandStat {
            client: self.peer,
            request: result.request(),
            reply: result.messages(),
            elapsed: result.elapsed(),
            slowlog_threshold: self.ctx.slowlog_threshold,
        };

        self.ctx
            .metrics
            .cmd_latency
            .observe(stat.elapsed.as_secs_f64());
        if stat.is_slow() {
            self.ctx.metrics.slow_commands.inc();
        }

        if let Err(e) = self.ctx.stats.record(&stat) {
            self.ctx.metrics.stats_errors.inc();
            error!("Log slow command failed: {}", e);
        }
    }
}
