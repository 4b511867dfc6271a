//! Server configuration. Translates
//! `original_source/server.go`'s `ServerOption` functional options into an
//! idiomatic Rust builder.

use std::sync::Arc;
use std::time::Duration;

use crate::sid::{DefaultGenerator, SidGenerator};

/// Tunables for a [`crate::engine::EngineIo`] server.
pub struct EngineIoConfig {
    pub ping_interval: Duration,
    pub ping_timeout: Duration,
    pub max_payload: usize,
    pub req_path: String,
    pub sid_generator: Arc<dyn SidGenerator>,
}

impl std::fmt::Debug for EngineIoConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineIoConfig")
            .field("ping_interval", &self.ping_interval)
            .field("ping_timeout", &self.ping_timeout)
            .field("max_payload", &self.max_payload)
            .field("req_path", &self.req_path)
            .finish()
    }
}

impl Default for EngineIoConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(25),
            ping_timeout: Duration::from_secs(20),
            max_payload: 1_000_000,
            req_path: "/engine.io".to_string(),
            sid_generator: Arc::new(DefaultGenerator::new()),
        }
    }
}

impl EngineIoConfig {
    pub fn builder() -> EngineIoConfigBuilder {
        EngineIoConfigBuilder::default()
    }
}

#[derive(Default)]
pub struct EngineIoConfigBuilder {
    config: EngineIoConfig,
}

impl EngineIoConfigBuilder {
    pub fn ping_interval(mut self, interval: Duration) -> Self {
        self.config.ping_interval = interval;
        self
    }

    pub fn ping_timeout(mut self, timeout: Duration) -> Self {
        self.config.ping_timeout = timeout;
        self
    }

    pub fn max_payload(mut self, max_payload: usize) -> Self {
        self.config.max_payload = max_payload;
        self
    }

    pub fn req_path(mut self, path: impl Into<String>) -> Self {
        self.config.req_path = path.into();
        self
    }

    pub fn sid_generator(mut self, generator: Arc<dyn SidGenerator>) -> Self {
        self.config.sid_generator = generator;
        self
    }

    pub fn build(self) -> EngineIoConfig {
        self.config
    }
}
