use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use vbus_registry::RegistryConfig;
use vbus_server::ServerConfig;

use crate::cli::HostArgs;

/// Everything the demo host needs, as laid out in its TOML file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    pub registry: RegistryConfig,
    pub server: ServerConfig,
}

impl HostConfig {
    /// Load `path` if given, otherwise start from defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
    }

    /// Apply command-line overrides, then validate.
    pub fn with_overrides(mut self, args: &HostArgs) -> anyhow::Result<Self> {
        if let Some(domain) = &args.domain {
            self.registry.domain = domain.clone();
        }
        if let Some(app) = &args.app {
            self.registry.app = app.clone();
        }
        if let Some(hostname) = &args.hostname {
            self.registry.hostname = hostname.clone();
        }
        if let Some(path) = &args.static_path {
            self.server.static_root = Some(path.clone());
        }
        if let Some(bind) = args.bind {
            self.server.bind_addr = bind;
        }
        self.registry.validate().context("invalid registry configuration")?;
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_without_file() {
        let c = HostConfig::load(None).unwrap();
        assert_eq!(c, HostConfig::default());
    }

    #[test]
    fn file_then_overrides() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[registry]\ndomain = \"lab\"\nclose_timeout_ms = 100\n\n[server]\nbind_addr = \"0.0.0.0:9000\""
        )
        .unwrap();

        let c = HostConfig::load(Some(file.path())).unwrap();
        assert_eq!(c.registry.id(), "lab.info");
        assert_eq!(c.registry.close_timeout_ms, 100);
        assert_eq!(c.server.bind_addr.port(), 9000);

        let args = HostArgs {
            app: Some("clock".into()),
            ..HostArgs::default()
        };
        let c = c.with_overrides(&args).unwrap();
        assert_eq!(c.registry.id(), "lab.clock");
    }

    #[test]
    fn invalid_override_is_rejected() {
        let args = HostArgs {
            domain: Some("has.dot".into()),
            ..HostArgs::default()
        };
        assert!(HostConfig::default().with_overrides(&args).is_err());
    }

    #[test]
    fn malformed_file_is_reported() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[registry\n").unwrap();
        let err = HostConfig::load(Some(file.path())).unwrap_err();
        assert!(err.to_string().starts_with("parsing"));
    }
}
