//! Statistics boundary and slow command log
//!
//! Every completed request is reported to a [`Statistics`] sink. Failures
//! there are the caller's to log; they never reach the client.

use crate::error::StatsError;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::time::{Duration, SystemTime};
use tracing::warn;

/// One completed request
#[derive(Debug, Clone, Copy)]
pub struct CommandStat<'a> {
    pub client: SocketAddr,
    pub request: &'a str,
    pub reply: &'a [String],
    pub elapsed: Duration,
    /// Requests at least this slow count as slow
    pub slowlog_threshold: Duration,
}

impl CommandStat<'_> {
    pub fn is_slow(&self) -> bool {
        self.elapsed >= self.slowlog_threshold
    }
}

/// Sink for per-request statistics
pub trait Statistics: Send + Sync {
    fn record(&self, stat: &CommandStat<'_>) -> Result<(), StatsError>;
}

/// A slow log entry
#[derive(Debug, Clone)]
pub struct SlowLogEntry {
    /// Monotonically increasing entry id
    pub id: u64,
    pub timestamp: SystemTime,
    pub client: SocketAddr,
    pub request: String,
    pub reply: String,
    pub elapsed: Duration,
}

/// Bounded ring of slow commands, newest last
pub struct SlowLog {
    max_len: usize,
    inner: Mutex<SlowLogInner>,
}

struct SlowLogInner {
    entries: VecDeque<SlowLogEntry>,
    next_id: u64,
}

impl SlowLog {
    pub fn new(max_len: usize) -> Self {
        Self {
            max_len,
            inner: Mutex::new(SlowLogInner {
                entries: VecDeque::with_capacity(max_len),
                next_id: 0,
            }),
        }
    }

    /// Most recent entries, newest first. `None` returns everything.
    pub fn get(&self, count: Option<usize>) -> Vec<SlowLogEntry> {
        let inner = self.inner.lock();
        let count = count.unwrap_or(inner.entries.len());
        inner.entries.iter().rev().take(count).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Statistics for SlowLog {
    fn record(&self, stat: &CommandStat<'_>) -> Result<(), StatsError> {
        if !stat.is_slow() || self.max_len == 0 {
            return Ok(());
        }

        let reply = format!("{:?}", stat.reply);
        warn!(
            "Slow command from {}: '{}' took {:?}, reply: {}",
            stat.client, stat.request, stat.elapsed, reply
        );

        let mut inner = self.inner.lock();
        let id = inner.next_id;
        inner.next_id += 1;

        if inner.entries.len() >= self.max_len {
            inner.entries.pop_front();
        }

        inner.entries.push_back(SlowLogEntry {
            id,
            timestamp: SystemTime::now(),
            client: stat.client,
            request: stat.request.to_owned(),
            reply,
            elapsed: stat.elapsed,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stat<'a>(request: &'a str, reply: &'a [String], elapsed_ms: u64) -> CommandStat<'a> {
        CommandStat {
            client: "127.0.0.1:40000".parse().unwrap(),
            request,
            reply,
            elapsed: Duration::from_millis(elapsed_ms),
            slowlog_threshold: Duration::from_millis(100),
        }
    }

    #[test]
    fn test_fast_commands_skipped() {
        let log = SlowLog::new(4);
        log.record(&stat("ping", &[], 99)).unwrap();
        assert!(log.is_empty());
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let log = SlowLog::new(4);
        let reply = vec!["+OK".to_string()];
        log.record(&stat("sleep 100", &reply, 100)).unwrap();

        let entries = log.get(None);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].request, "sleep 100");
        assert_eq!(entries[0].reply, r#"["+OK"]"#);
        assert_eq!(entries[0].elapsed, Duration::from_millis(100));
    }

    #[test]
    fn test_ring_evicts_oldest() {
        let log = SlowLog::new(2);
        for request in ["a", "b", "c"] {
            log.record(&stat(request, &[], 500)).unwrap();
        }

        let entries = log.get(None);
        let requests: Vec<&str> = entries.iter().map(|e| e.request.as_str()).collect();
        assert_eq!(requests, ["c", "b"]);
        assert_eq!(entries[0].id, 2);
        assert_eq!(log.get(Some(1)).len(), 1);
    }

    #[test]
    fn test_disabled_when_zero_length() {
        let log = SlowLog::new(0);
        log.record(&stat("a", &[], 500)).unwrap();
        assert!(log.is_empty());
    }
}
