use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RegistryError, RegistryResult};

/// Registry configuration.
///
/// Every field has a default, so a TOML file only needs the keys it changes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Service domain, first half of the service id (e.g. "system").
    pub domain: String,
    /// Application name, second half of the service id (e.g. "info").
    pub app: String,
    /// Host the service runs on.
    pub hostname: String,
    /// Upper bound on how long `close()` waits for in-flight requests.
    pub close_timeout_ms: u64,
    /// Upper bound on a remote method call.
    pub call_timeout_ms: u64,
    /// Capacity of the tree change event channel.
    pub event_capacity: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            domain: "system".into(),
            app: "info".into(),
            hostname: "localhost".into(),
            close_timeout_ms: 5_000,
            call_timeout_ms: 30_000,
            event_capacity: 256,
        }
    }
}

impl RegistryConfig {
    pub fn new(domain: impl Into<String>, app: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            app: app.into(),
            ..Self::default()
        }
    }

    /// Service id, used as the tree root name.
    pub fn id(&self) -> String {
        format!("{}.{}", self.domain, self.app)
    }

    pub fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout_ms)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn from_toml_str(raw: &str) -> RegistryResult<Self> {
        let config: Self = toml::from_str(raw).map_err(|e| RegistryError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> RegistryResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> RegistryResult<()> {
        vbus_tree::validate_segment(&self.domain)
            .map_err(|e| RegistryError::Config(format!("domain: {e}")))?;
        vbus_tree::validate_segment(&self.app)
            .map_err(|e| RegistryError::Config(format!("app: {e}")))?;
        if self.event_capacity == 0 {
            return Err(RegistryError::Config("event_capacity must be positive".into()));
        }
        Ok(())
    }
}
