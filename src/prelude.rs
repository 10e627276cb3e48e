//! Prelude module for common imports.
//!
//! This module re-exports commonly used types and traits for convenience.
//!
//! # Usage
//!
//! ```ignore
//! use confgate::prelude::*;
//! ```

// Error types
pub use crate::error::{ConfGateError, JobFault, ProtocolError, Result};

// Configuration
pub use crate::config::{ClusterConfig, Config, MetricsConfig, ServerConfig, SessionConfig};

// Collaborator boundaries
pub use crate::command::{BuiltinCommands, CommandExecutor, JobCallback, JobResult};
pub use crate::leader::{LeaderAddress, Leadership, StaticLeadership};
pub use crate::stats::{CommandStat, SlowLog, Statistics};

// Protocol
pub use crate::protocol::{Charset, Reply, ReplyKind, Request};

// Metrics
pub use crate::metrics::Metrics;

// Server
pub use crate::server::{Server, SessionContext};

// Common external crates
pub use std::sync::Arc;
pub use tokio::runtime::Handle;
pub use tracing::{debug, error, info, trace, warn};
