//! Session context
//!
//! Shared handles every session is created with: the registry it meets
//! other sessions in and the server configuration it runs under.

use std::sync::Arc;

use crate::registry::StreamRegistry;
use crate::server::config::ServerConfig;

/// Context passed to every session at creation
#[derive(Clone)]
pub struct SessionContext {
    /// Registry shared by all sessions of a server
    pub registry: Arc<StreamRegistry>,

    /// Server configuration
    pub config: Arc<ServerConfig>,
}

impl SessionContext {
    /// Create a new context
    pub fn new(registry: Arc<StreamRegistry>, config: Arc<ServerConfig>) -> Self {
        Self { registry, config }
    }

    /// Context with a fresh registry and default configuration
    pub fn standalone() -> Self {
        Self::new(
            Arc::new(StreamRegistry::new()),
            Arc::new(ServerConfig::default()),
        )
    }

    /// Replace the configuration
    pub fn with_config(mut self, config: ServerConfig) -> Self {
        self.config = Arc::new(config);
        self
    }
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("registry", &self.registry.stats())
            .field("config", &self.config)
            .finish()
    }
}
