//! Error types for confgate

use thiserror::Error;

/// Main error type for confgate
#[derive(Error, Debug)]
pub enum ConfGateError {
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Connection-fatal protocol violations.
///
/// Every variant closes the offending session; none is retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Receive buffer full without line terminator ({length} bytes)")]
    BufferOverflow { length: usize },

    #[error("Request too large ({length} bytes, max {max})")]
    RequestTooLarge { length: usize, max: usize },

    #[error("Malformed {charset} input")]
    Decode { charset: &'static str },
}

/// Faults raised by the command engine and carried inside a job result.
///
/// These never close the connection; the reply encoder turns them into
/// reply text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobFault {
    #[error("command not found")]
    CommandNotFound,

    #[error("wrong arguments")]
    WrongArguments { usage: String },

    #[error("invocation error: {0}")]
    Invocation(String),

    #[error("coordination service error: {0}")]
    Coordination(String),

    #[error("interrupted")]
    Interrupted,

    #[error("io error: {0}")]
    Io(String),

    #[error("{0}")]
    Other(String),
}

/// Failure to put an encoded reply into the session charset
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Reply is not representable in {charset}")]
pub struct EncodeError {
    pub charset: &'static str,
}

/// Leader lookup failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LeaderError {
    #[error("Leader is unknown")]
    Unknown,

    #[error("Invalid leader address: {0}")]
    InvalidAddress(String),
}

/// Statistics sink failure
#[derive(Error, Debug)]
pub enum StatsError {
    #[error("Statistics sink unavailable: {0}")]
    Unavailable(String),
}

pub type Result<T> = std::result::Result<T, ConfGateError>;
