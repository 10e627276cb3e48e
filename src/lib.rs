//! # confgate
//!
//! Client session engine of a cluster configuration master.
//!
//! Operational clients send newline-terminated text commands; each one is
//! handed to a command engine that completes asynchronously, and the
//! result comes back as a single CRLF-terminated JSON-shaped line. Nodes
//! that are not the leader redirect unknown commands to the leader.
//!
//! ## Features
//!
//! - Incremental line framing with a configurable charset
//! - Fixed per-session receive buffer and request size limits
//! - One request in flight per session, answered in arrival order
//! - Completion callbacks may fire from any thread
//! - `success` / `error` / `redirect` reply envelopes
//! - Slow command log, Prometheus metrics and health endpoints
//!
//! ## Example
//!
//! ```ignore
//! use confgate::prelude::*;
//!
//! let config = Config::default();
//! let leadership: Arc<dyn Leadership> = Arc::new(StaticLeadership::from_config(&config));
//! let executor = Arc::new(BuiltinCommands::new(Arc::clone(&leadership), Handle::current()));
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌────────┐ line ┌──────────────────────┐ request ┌────────────────┐
//! │ client │─────▶│ Session              │────────▶│ CommandExecutor│
//! │        │◀─────│  ├─ LineAssembler    │◀────────│ (any thread)   │
//! └────────┘ JSON │  ├─ RequestReader    │ callback└────────────────┘
//!                 │  └─ reply::encode ◀──┼── Leadership
//!                 └──────────────────────┘
//! ```

// Modules
pub mod command;
pub mod config;
pub mod error;
pub mod health;
pub mod leader;
pub mod metrics;
pub mod prelude;
pub mod protocol;
pub mod server;
pub mod stats;

// Re-exports for convenience
pub use error::{ConfGateError, JobFault, ProtocolError, Result};
