//! Command engine boundary
//!
//! The session hands each request to a [`CommandExecutor`] together with a
//! [`JobCallback`]. The executor may finish on any thread; the callback is
//! consumed when invoked, so it runs at most once.

pub mod builtin;

pub use builtin::BuiltinCommands;

use crate::error::JobFault;
use crate::protocol::Request;
use std::fmt;
use std::time::{Duration, Instant};

/// Executes requests asynchronously
pub trait CommandExecutor: Send + Sync {
    /// Start executing `request`. Must eventually call `callback.complete`.
    fn perform(&self, request: Request, callback: JobCallback);
}

/// Completion hook bound to one session and one request
pub struct JobCallback {
    inner: Box<dyn FnOnce(JobResult) + Send + 'static>,
}

impl JobCallback {
    pub fn new(f: impl FnOnce(JobResult) + Send + 'static) -> Self {
        Self { inner: Box::new(f) }
    }

    /// Deliver the result
    pub fn complete(self, result: JobResult) {
        (self.inner)(result);
    }
}

impl fmt::Debug for JobCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("JobCallback")
    }
}

/// Outcome of one request: reply messages, faults and timing
#[derive(Debug, Clone)]
pub struct JobResult {
    request: String,
    messages: Vec<String>,
    faults: Vec<JobFault>,
    started_at: Instant,
    finished_at: Instant,
}

impl JobResult {
    /// Start a result for `request`, timed from now
    pub fn new(request: impl Into<String>) -> Self {
        let now = Instant::now();
        Self {
            request: request.into(),
            messages: Vec::new(),
            faults: Vec::new(),
            started_at: now,
            finished_at: now,
        }
    }

    #[must_use]
    pub fn started_at(mut self, started_at: Instant) -> Self {
        self.started_at = started_at;
        self
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.messages.push(message.into());
        self
    }

    #[must_use]
    pub fn with_fault(mut self, fault: JobFault) -> Self {
        self.faults.push(fault);
        self
    }

    /// Stamp the end time
    #[must_use]
    pub fn finish(mut self) -> Self {
        self.finished_at = Instant::now();
        self
    }

    pub fn request(&self) -> &str {
        &self.request
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    pub fn faults(&self) -> &[JobFault] {
        &self.faults
    }

    pub fn elapsed(&self) -> Duration {
        self.finished_at.saturating_duration_since(self.started_at)
    }
}
