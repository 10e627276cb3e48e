//! Live session registry and idle eviction

use super::session::{LastActivity, now_millis};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

struct SessionEntry {
    peer: SocketAddr,
    activity: Arc<LastActivity>,
    cancel: CancellationToken,
}

/// Sessions currently open, keyed by session id
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<u64, SessionEntry>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &self,
        id: u64,
        peer: SocketAddr,
        activity: Arc<LastActivity>,
        cancel: CancellationToken,
    ) {
        self.sessions.lock().insert(
            id,
            SessionEntry {
                peer,
                activity,
                cancel,
            },
        );
    }

    pub fn remove(&self, id: u64) {
        self.sessions.lock().remove(&id);
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cancel sessions idle for longer than `timeout` as of `now_ms`.
    ///
    /// Entries stay registered until their task exits and removes them.
    pub fn close_idle(&self, now_ms: u64, timeout: Duration) -> usize {
        let sessions = self.sessions.lock();
        let mut closed = 0;
        for (id, entry) in sessions.iter() {
            if entry.cancel.is_cancelled() || entry.activity.idle_for(now_ms) <= timeout {
                continue;
            }
            info!(
                "Closing idle session {} ({}), idle for {:?}",
                id,
                entry.peer,
                entry.activity.idle_for(now_ms)
            );
            entry.cancel.cancel();
            closed += 1;
        }
        closed
    }

    /// Reap idle sessions every `interval` until `shutdown` fires
    pub async fn run_reaper(
        self: Arc<Self>,
        timeout: Duration,
        interval: Duration,
        shutdown: CancellationToken,
        on_closed: impl Fn(usize) + Send,
    ) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let closed = self.close_idle(now_millis(), timeout);
                    if closed > 0 {
                        on_closed(closed);
                    }
                }
            }
        }
    }
}
