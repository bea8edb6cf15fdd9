//! Configuration loading for the media proxy core.
//!
//! Mirrors the teacher's `figment`-based `Config::load`/`Config::load_from_file`
//! composition, trimmed to the three sections this core actually consumes:
//! the JWT signing secret, the slice-cache/egress knobs, and the bind address.

use anyhow::Result;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub mod duration_serde;

const ENV_PREFIX: &str = "MEDIA_PROXY_";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub jwt: JwtConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub web: WebConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    /// The process-wide HS256 signing secret for target tokens. Read-only
    /// after startup.
    pub secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Size of one cached window, in bytes.
    pub slice_size: u64,
    /// When false, outbound fetches to loopback/private/link-local IPs are
    /// rejected (C9).
    pub allow_proxy_to_local: bool,
    /// Maximum playlist body size accepted by the m3u8 proxy handler, in
    /// bytes.
    pub max_m3u8_size: u64,
    #[serde(with = "duration_serde::duration")]
    pub upstream_connect_timeout: Duration,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            slice_size: 1_048_576,
            allow_proxy_to_local: false,
            max_m3u8_size: 3_145_728,
            upstream_connect_timeout: Duration::from_secs(15),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 4095,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            jwt: JwtConfig {
                secret: String::new(),
            },
            proxy: ProxyConfig::default(),
            web: WebConfig::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_file =
            std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".to_string());
        Self::load_from_file(&config_file)
    }

    pub fn load_from_file(config_file: &str) -> Result<Self> {
        if !std::path::Path::new(config_file).exists() {
            tracing::warn!(
                "Config file '{}' not found, using default configuration values",
                config_file
            );

            let default_config = Self::default();
            let config: Config = Figment::new()
                .merge(Serialized::defaults(default_config))
                .merge(Env::prefixed(ENV_PREFIX).split("__"))
                .extract()?;

            return Ok(config);
        }

        let config: Config = Figment::new()
            .merge(Toml::file(config_file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_proxy_values() {
        let config = Config::default();
        assert_eq!(config.proxy.slice_size, 1_048_576);
        assert!(!config.proxy.allow_proxy_to_local);
        assert_eq!(config.proxy.max_m3u8_size, 3_145_728);
        assert_eq!(config.web.port, 4095);
    }

    #[test]
    fn load_from_missing_file_falls_back_to_defaults() {
        let config = Config::load_from_file("/nonexistent/path/config.toml").unwrap();
        assert_eq!(config.web.host, "0.0.0.0");
    }
}
