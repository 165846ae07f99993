use std::{net::SocketAddr, path::Path};

use anyhow::Result;
use figment::{
    providers::{Env, Format, Yaml},
    Figment,
};
use image_store::ImageStoreConfig;
use serde::{Deserialize, Serialize};

/// The static credential pair authorizing the write path. Read once at
/// startup; never logged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    pub auth: AuthConfig,
    pub storage: ImageStoreConfig,
}

fn default_listen_addr() -> String {
    "0.0.0.0:8000".to_string()
}

impl ServerConfig {
    /// Load configuration from an optional YAML file merged with
    /// `PIXELBIN_`-prefixed environment variables (nested keys joined
    /// with `__`, e.g. `PIXELBIN_AUTH__USERNAME`). Any missing required
    /// value is fatal here, never per-request.
    pub fn load(path: Option<&Path>) -> Result<ServerConfig> {
        let mut figment = Figment::new();
        if let Some(path) = path {
            let config_str = std::fs::read_to_string(path)?;
            figment = figment.merge(Yaml::string(&config_str));
        }
        let config: ServerConfig = figment
            .merge(Env::prefixed("PIXELBIN_").split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.storage.validate()?;
        if self.auth.username.is_empty() || self.auth.password.is_empty() {
            return Err(anyhow::anyhow!(
                "auth username and password must be non-empty"
            ));
        }
        if self.listen_addr.parse::<SocketAddr>().is_err() {
            return Err(anyhow::anyhow!(
                "invalid listen address: {}",
                self.listen_addr
            ));
        }
        Ok(())
    }
}
