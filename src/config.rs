//! Configuration for confgate

use crate::protocol::Charset;
use serde::Deserialize;

/// Length of the longest line terminator, `\r\n`
const TERMINATOR_LEN: usize = 2;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub session: SessionConfig,
    pub cluster: ClusterConfig,
    pub metrics: MetricsConfig,
}

/// Listener configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to listen on
    pub listen_addr: String,

    /// Maximum number of concurrent sessions
    pub max_connections: usize,

    /// Number of Tokio worker threads (0 = number of CPUs)
    pub worker_threads: usize,

    /// Close sessions idle for this many seconds (0 = never)
    pub idle_timeout_secs: u64,

    /// How often the idle reaper runs
    pub idle_check_interval_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:1122".to_string(),
            max_connections: 1024,
            worker_threads: 0,
            idle_timeout_secs: 0,
            idle_check_interval_ms: 1000,
        }
    }
}

/// Per-session protocol configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Text charset label used to decode requests and encode replies
    pub charset: String,

    /// Fixed receive buffer capacity per session (bytes)
    pub recv_buffer_size: usize,

    /// Maximum accepted request length after trimming (bytes)
    pub max_request_size: usize,

    /// Commands taking at least this long are slow-logged
    pub slowlog_threshold_ms: u64,

    /// Slow log ring buffer length
    pub slowlog_max_len: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            charset: "utf-8".to_string(),
            recv_buffer_size: 100 * 1024,
            max_request_size: 64 * 1024,
            slowlog_threshold_ms: 100,
            slowlog_max_len: 128,
        }
    }
}

/// Leadership as known to this node at startup
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Whether this node starts as leader
    pub leader: bool,

    /// Address of the current leader, if known
    pub leader_ip: Option<String>,

    pub leader_port: u16,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            leader: true,
            leader_ip: None,
            leader_port: 1122,
        }
    }
}

/// Metrics and health check configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Enable metrics collection
    pub enabled: bool,

    /// Address for metrics/health HTTP server
    pub listen_addr: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen_addr: "127.0.0.1:9090".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &str) -> crate::Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            crate::ConfGateError::Config(format!("Failed to read config file: {e}"))
        })?;

        Self::from_toml(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(contents: &str) -> crate::Result<Self> {
        let config: Self = toml::from_str(contents)
            .map_err(|e| crate::ConfGateError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables or use defaults
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("CONFGATE_LISTEN_ADDR") {
            config.server.listen_addr = addr;
        }

        if let Ok(max_conn) = std::env::var("CONFGATE_MAX_CONNECTIONS")
            && let Ok(n) = max_conn.parse()
        {
            config.server.max_connections = n;
        }

        if let Ok(secs) = std::env::var("CONFGATE_IDLE_TIMEOUT_SECS")
            && let Ok(n) = secs.parse()
        {
            config.server.idle_timeout_secs = n;
        }

        if let Ok(charset) = std::env::var("CONFGATE_CHARSET") {
            config.session.charset = charset;
        }

        if let Ok(leader) = std::env::var("CONFGATE_LEADER") {
            config.cluster.leader = leader.to_lowercase() == "true" || leader == "1";
        }

        if let Ok(ip) = std::env::var("CONFGATE_LEADER_IP") {
            config.cluster.leader_ip = Some(ip);
        }

        if let Ok(port) = std::env::var("CONFGATE_LEADER_PORT")
            && let Ok(n) = port.parse()
        {
            config.cluster.leader_port = n;
        }

        if let Ok(addr) = std::env::var("CONFGATE_METRICS_ADDR") {
            config.metrics.listen_addr = addr;
        }

        if let Ok(enabled) = std::env::var("CONFGATE_METRICS_ENABLED") {
            config.metrics.enabled = enabled.to_lowercase() == "true" || enabled == "1";
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the session engine cannot run with
    pub fn validate(&self) -> crate::Result<()> {
        Charset::for_label(&self.session.charset)?;

        let session = &self.session;
        if session.recv_buffer_size == 0 || session.max_request_size == 0 {
            return Err(crate::ConfGateError::Config(
                "recv_buffer_size and max_request_size must be positive".to_string(),
            ));
        }
        // A maximum-length request and its "\r\n" must fit in the buffer together
        if session.max_request_size.saturating_add(TERMINATOR_LEN) > session.recv_buffer_size {
            return Err(crate::ConfGateError::Config(format!(
                "max_request_size ({}) plus line terminator exceeds recv_buffer_size ({})",
                session.max_request_size, session.recv_buffer_size
            )));
        }
        if self.server.max_connections == 0 {
            return Err(crate::ConfGateError::Config(
                "max_connections must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
