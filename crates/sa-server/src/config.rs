//! Server configuration
//!
//! Settings are layered: built-in defaults, then an optional RON file named
//! by `SA_CONFIG`, then individual environment variables.

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use sa_cad::KernelPreference;
use sa_core::DownloadLimits;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable naming a RON configuration file
pub const CONFIG_FILE_ENV: &str = "SA_CONFIG";

const MIB: u64 = 1024 * 1024;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Deserialization error: {0}")]
    Deserialize(String),

    #[error("Invalid value for {key}: '{value}'")]
    InvalidValue { key: &'static str, value: String },
}

/// Service settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address
    pub host: String,
    /// Listen port
    pub port: u16,
    /// Largest accepted upload
    pub max_upload_bytes: u64,
    /// Largest accepted download
    pub max_download_bytes: u64,
    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
    /// Deadline for one analysis, including the wait for a worker
    pub analysis_timeout_secs: u64,
    /// Analyses allowed to run at once
    pub max_concurrent: usize,
    /// `auto`, `opencascade` or `truck`
    pub kernel: String,
    /// Directory for scratch files (system temp dir if unset)
    pub scratch_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            max_upload_bytes: 50 * MIB,
            max_download_bytes: 50 * MIB,
            connect_timeout_secs: 10,
            read_timeout_secs: 30,
            analysis_timeout_secs: 120,
            max_concurrent: 4,
            kernel: "auto".to_string(),
            scratch_dir: None,
        }
    }
}

impl ServerConfig {
    /// Load from the process environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// Load using `lookup` to read environment variables
    pub fn load_with(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = match lookup(CONFIG_FILE_ENV).filter(|p| !p.trim().is_empty()) {
            Some(path) => {
                tracing::info!("Loading configuration from {}", path);
                Self::load_file(path.trim())?
            }
            None => Self::default(),
        };
        config.apply_env(&lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a RON configuration file
    pub fn load_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_ron_str(&content)
    }

    /// Parse RON text; missing fields keep their defaults
    pub fn from_ron_str(content: &str) -> Result<Self, ConfigError> {
        ron::from_str(content).map_err(|e| ConfigError::Deserialize(e.to_string()))
    }

    /// Override fields from environment variables
    pub fn apply_env(&mut self, lookup: &impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(port) = parse_env(lookup, "PORT")? {
            self.port = port;
        }
        if let Some(host) = lookup("SA_HOST").filter(|h| !h.trim().is_empty()) {
            self.host = host.trim().to_string();
        }
        if let Some(bytes) = parse_env(lookup, "SA_MAX_UPLOAD_BYTES")? {
            self.max_upload_bytes = bytes;
        }
        if let Some(bytes) = parse_env(lookup, "SA_MAX_DOWNLOAD_BYTES")? {
            self.max_download_bytes = bytes;
        }
        if let Some(secs) = parse_env(lookup, "SA_CONNECT_TIMEOUT_SECS")? {
            self.connect_timeout_secs = secs;
        }
        if let Some(secs) = parse_env(lookup, "SA_READ_TIMEOUT_SECS")? {
            self.read_timeout_secs = secs;
        }
        if let Some(secs) = parse_env(lookup, "SA_ANALYSIS_TIMEOUT_SECS")? {
            self.analysis_timeout_secs = secs;
        }
        if let Some(count) = parse_env(lookup, "SA_MAX_CONCURRENT")? {
            self.max_concurrent = count;
        }
        if let Some(kernel) = lookup("SA_KERNEL").filter(|k| !k.trim().is_empty()) {
            self.kernel = kernel.trim().to_string();
        }
        if let Some(dir) = lookup("SA_SCRATCH_DIR").filter(|d| !d.trim().is_empty()) {
            self.scratch_dir = Some(PathBuf::from(dir.trim()));
        }
        Ok(())
    }

    /// Reject settings the server cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("max_upload_bytes", self.max_upload_bytes),
            ("max_download_bytes", self.max_download_bytes),
            ("connect_timeout_secs", self.connect_timeout_secs),
            ("read_timeout_secs", self.read_timeout_secs),
            ("analysis_timeout_secs", self.analysis_timeout_secs),
            ("max_concurrent", self.max_concurrent as u64),
        ];
        for (key, value) in positive {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    key,
                    value: value.to_string(),
                });
            }
        }
        self.kernel_preference()?;
        self.socket_addr()?;
        Ok(())
    }

    pub fn kernel_preference(&self) -> Result<KernelPreference, ConfigError> {
        KernelPreference::from_str(&self.kernel).map_err(|_| ConfigError::InvalidValue {
            key: "kernel",
            value: self.kernel.clone(),
        })
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self.host.parse().map_err(|_| ConfigError::InvalidValue {
            key: "host",
            value: self.host.clone(),
        })?;
        Ok(SocketAddr::new(ip, self.port))
    }

    pub fn download_limits(&self) -> DownloadLimits {
        DownloadLimits {
            max_bytes: self.max_download_bytes,
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            read_timeout: Duration::from_secs(self.read_timeout_secs),
        }
    }

    pub fn analysis_timeout(&self) -> Duration {
        Duration::from_secs(self.analysis_timeout_secs)
    }
}

fn parse_env<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(key) {
        Some(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { key, value }),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sa_cad::KernelFlavor;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::load_with(env(&[])).unwrap();
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.port, 8000);
        assert_eq!(config.kernel_preference().unwrap(), KernelPreference::Auto);
        assert_eq!(config.socket_addr().unwrap().to_string(), "0.0.0.0:8000");
    }

    #[test]
    fn test_env_overrides() {
        let config = ServerConfig::load_with(env(&[
            ("PORT", "9100"),
            ("SA_MAX_DOWNLOAD_BYTES", "1024"),
            ("SA_ANALYSIS_TIMEOUT_SECS", "5"),
            ("SA_MAX_CONCURRENT", "2"),
            ("SA_KERNEL", "truck"),
        ]))
        .unwrap();

        assert_eq!(config.port, 9100);
        assert_eq!(config.download_limits().max_bytes, 1024);
        assert_eq!(config.analysis_timeout(), Duration::from_secs(5));
        assert_eq!(config.max_concurrent, 2);
        assert_eq!(
            config.kernel_preference().unwrap(),
            KernelPreference::Only(KernelFlavor::Truck)
        );
    }

    #[test]
    fn test_invalid_env_value() {
        let err = ServerConfig::load_with(env(&[("PORT", "eighty")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "PORT", .. }));

        let err = ServerConfig::load_with(env(&[("SA_MAX_CONCURRENT", "0")])).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                key: "max_concurrent",
                ..
            }
        ));

        let err = ServerConfig::load_with(env(&[("SA_KERNEL", "parasolid")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "kernel", .. }));
    }

    #[test]
    fn test_partial_ron() {
        let config = ServerConfig::from_ron_str("(port: 8080, max_concurrent: 8)").unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.max_concurrent, 8);
        assert_eq!(config.read_timeout_secs, 30);
    }

    #[test]
    fn test_file_then_env() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.ron");
        std::fs::write(&path, "(port: 8080, kernel: \"truck\")").unwrap();
        let path = path.to_string_lossy().to_string();

        let config =
            ServerConfig::load_with(env(&[(CONFIG_FILE_ENV, path.as_str()), ("PORT", "9000")])).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.kernel, "truck");
    }

    #[test]
    fn test_missing_file() {
        let err = ServerConfig::load_with(env(&[(CONFIG_FILE_ENV, "/nonexistent/sa.ron")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn test_bad_ron() {
        assert!(matches!(
            ServerConfig::from_ron_str("(port: \"x\")"),
            Err(ConfigError::Deserialize(_))
        ));
    }
}
