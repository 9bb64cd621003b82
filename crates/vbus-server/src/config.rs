use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{ServerError, ServerResult};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Directory served at `/`. No static hosting when unset.
    pub static_root: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 8080)),
            static_root: None,
        }
    }
}

impl ServerConfig {
    pub fn from_toml_str(raw: &str) -> ServerResult<Self> {
        toml::from_str(raw).map_err(|e| ServerError::Config(e.to_string()))
    }

    /// Check that the static root, if any, is an existing directory.
    pub fn validate(&self) -> ServerResult<()> {
        match &self.static_root {
            Some(root) if !root.is_dir() => Err(ServerError::StaticRoot(root.display().to_string())),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = ServerConfig::default();
        assert_eq!(c.bind_addr, "127.0.0.1:8080".parse::<SocketAddr>().unwrap());
        assert!(c.static_root.is_none());
        assert!(c.validate().is_ok());
    }

    #[test]
    fn parses_partial_toml() {
        let c = ServerConfig::from_toml_str(r#"static_root = "/srv/www""#).unwrap();
        assert_eq!(c.static_root, Some(PathBuf::from("/srv/www")));
        assert_eq!(c.bind_addr, ServerConfig::default().bind_addr);
    }

    #[test]
    fn missing_static_root_is_rejected() {
        let c = ServerConfig {
            static_root: Some(PathBuf::from("/definitely/not/here")),
            ..ServerConfig::default()
        };
        assert!(matches!(c.validate(), Err(ServerError::StaticRoot(_))));
    }
}
