//! Leader-election boundary
//!
//! The session engine only reads leadership; whoever runs the election
//! implements [`Leadership`]. [`StaticLeadership`] is driven by
//! configuration and can be flipped at run time.

use crate::config::Config;
use std::net::SocketAddr;
use crate::error::LeaderError;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};

/// Read-only view of the election state. Answers may be stale.
pub trait Leadership: Send + Sync {
    /// Whether this node currently believes it is leader
    fn is_leader(&self) -> bool;

    /// Address clients should be redirected to
    fn current_leader(&self) -> Result<LeaderAddress, LeaderError>;
}

/// Client-facing address of the leader, sent as redirect data
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeaderAddress {
    pub ip: String,
    pub port: u16,
}

impl LeaderAddress {
    pub fn new(ip: impl Into<String>, port: u16) -> Self {
        Self {
            ip: ip.into(),
            port,
        }
    }

    /// JSON object carried in redirect replies
    pub fn to_json(&self) -> Result<String, LeaderError> {
        if self.ip.is_empty() {
            return Err(LeaderError::InvalidAddress("empty ip".to_string()));
        }
        serde_json::to_string(self).map_err(|e| LeaderError::InvalidAddress(e.to_string()))
    }
}

/// Leadership fixed by configuration
#[derive(Debug)]
pub struct StaticLeadership {
    leader: AtomicBool,
    address: RwLock<Option<LeaderAddress>>,
}

impl StaticLeadership {
    pub fn new(leader: bool, address: Option<LeaderAddress>) -> Self {
        Self {
            leader: AtomicBool::new(leader),
            address: RwLock::new(address),
        }
    }

    /// A node configured as leader without `leader_ip` advertises its own
    /// listen address.
    pub fn from_config(config: &Config) -> Self {
        let cluster = &config.cluster;
        let address = match &cluster.leader_ip {
            Some(ip) => Some(LeaderAddress::new(ip.clone(), cluster.leader_port)),
            None if cluster.leader => config
                .server
                .listen_addr
                .parse::<SocketAddr>()
                .ok()
                .map(|addr| LeaderAddress::new(addr.ip().to_string(), addr.port())),
            None => None,
        };
        Self::new(cluster.leader, address)
    }

    pub fn set_leader(&self, leader: bool) {
        self.leader.store(leader, Ordering::SeqCst);
    }

    pub fn set_leader_address(&self, address: Option<LeaderAddress>) {
        *self.address.write() = address;
    }
}

impl Leadership for StaticLeadership {
    fn is_leader(&self) -> bool {
        self.leader.load(Ordering::SeqCst)
    }

    fn current_leader(&self) -> Result<LeaderAddress, LeaderError> {
        self.address.read().clone().ok_or(LeaderError::Unknown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClusterConfig;

    #[test]
    fn test_to_json() {
        let address = LeaderAddress::new("192.168.0.10", 1122);
        assert_eq!(
            address.to_json().unwrap(),
            r#"{"ip":"192.168.0.10","port":1122}"#
        );
        assert!(LeaderAddress::new("", 1).to_json().is_err());
    }

    #[test]
    fn test_from_config() {
        let mut config = Config::default();
        config.cluster = ClusterConfig {
            leader: false,
            leader_ip: Some("10.1.1.1".to_string()),
            leader_port: 2000,
        };
        let leadership = StaticLeadership::from_config(&config);
        assert!(!leadership.is_leader());
        assert_eq!(
            leadership.current_leader().unwrap(),
            LeaderAddress::new("10.1.1.1", 2000)
        );
    }

    #[test]
    fn test_default_leader_advertises_listen_addr() {
        let leadership = StaticLeadership::from_config(&Config::default());
        assert!(leadership.is_leader());
        assert_eq!(
            leadership.current_leader().unwrap(),
            LeaderAddress::new("127.0.0.1", 1122)
        );
    }

    #[test]
    fn test_unknown_leader() {
        let mut config = Config::default();
        config.cluster.leader = false;
        let leadership = StaticLeadership::from_config(&config);
        assert!(!leadership.is_leader());
        assert_eq!(leadership.current_leader(), Err(LeaderError::Unknown));
    }

    #[test]
    fn test_runtime_switch() {
        let leadership = StaticLeadership::new(true, None);
        leadership.set_leader(false);
        leadership.set_leader_address(Some(LeaderAddress::new("10.0.0.9", 1122)));
        assert!(!leadership.is_leader());
        assert_eq!(leadership.current_leader().unwrap().ip, "10.0.0.9");
    }
}
