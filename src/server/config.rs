//! Server configuration

use std::net::{Ipv4Addr, SocketAddr};

use crate::media::gop::DEFAULT_GOP_CACHE_SIZE;

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Maximum concurrent connections (0 = unlimited)
    pub max_connections: usize,

    /// Enable GOP caching for late-joiner support
    pub gop_cache: bool,

    /// Maximum GOP cache size in bytes
    pub gop_cache_max_size: usize,

    /// Outgoing chunk queue per player; a player whose queue fills is dropped
    pub player_queue_capacity: usize,

    /// Enable TCP_NODELAY (disable Nagle's algorithm)
    pub tcp_nodelay: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 8000)),
            max_connections: 0, // Unlimited
            gop_cache: true,
            gop_cache_max_size: DEFAULT_GOP_CACHE_SIZE,
            player_queue_capacity: 1024,
            tcp_nodelay: true, // Important for low latency
        }
    }
}

impl ServerConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set maximum connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Disable GOP caching
    pub fn disable_gop_cache(mut self) -> Self {
        self.gop_cache = false;
        self
    }

    /// Set the GOP cache byte budget
    pub fn gop_cache_max_size(mut self, size: usize) -> Self {
        self.gop_cache_max_size = size;
        self
    }

    /// Set the per-player outgoing queue length
    pub fn player_queue_capacity(mut self, capacity: usize) -> Self {
        self.player_queue_capacity = capacity.max(1);
        self
    }
}
