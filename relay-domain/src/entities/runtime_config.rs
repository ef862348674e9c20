// Runtime configuration entity
// Settings the application and HTTP layers need after loading

use std::collections::HashMap;

use crate::entities::Server;

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub bind_addr: String,
    pub servers: HashMap<String, Server>,
    pub max_body_bytes: u64,
    pub request_timeout_seconds: u64,
    pub dedup_ttl_seconds: u64,
    pub dedup_sweep_interval_seconds: u64,
}

impl RuntimeConfig {
    /// Looks up a server by its routing name. The legacy single-secret
    /// setup is registered under the empty name.
    pub fn server(&self, name: &str) -> Option<&Server> {
        self.servers.get(name)
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            servers: HashMap::new(),
            max_body_bytes: 1024 * 1024,
            request_timeout_seconds: 15,
            dedup_ttl_seconds: 120,
            dedup_sweep_interval_seconds: 60,
        }
    }
}
