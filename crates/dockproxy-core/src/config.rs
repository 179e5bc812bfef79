//! Configuration types for the dockproxy system
//!
//! This module defines all configuration structures used throughout the crate.
//! Components never read the environment; the daemon builds a [`ProxyConfig`]
//! once and hands each part to the component that needs it.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main dockproxy configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Container runtime connection
    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// Where the rendered documents are committed
    #[serde(default)]
    pub output: OutputConfig,

    /// Proxy engine commands
    #[serde(default)]
    pub engine: EngineConfig,

    /// Controller loop settings
    #[serde(default)]
    pub controller: ControllerConfig,
}

impl ProxyConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.runtime.validate()?;
        self.output.validate()?;
        self.engine.validate()?;
        self.controller.validate()?;
        Ok(())
    }
}

/// Container runtime configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Runtime endpoint (`unix://`, `tcp://` or `http://`)
    #[serde(default = "default_docker_host")]
    pub docker_host: String,

    /// Network to provision before watching, if any
    #[serde(default)]
    pub network: Option<String>,

    /// Buffer between the event subscription task and the controller
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl RuntimeConfig {
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.docker_host.trim().is_empty() {
            return Err(crate::Error::config("Docker host cannot be empty"));
        }
        if self.network.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err(crate::Error::config("Proxy network name cannot be blank"));
        }
        if self.event_buffer == 0 {
            return Err(crate::Error::config("Event buffer must be > 0"));
        }
        Ok(())
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            docker_host: default_docker_host(),
            network: None,
            event_buffer: default_event_buffer(),
        }
    }
}

/// Output document locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Stream (TCP/UDP) document path
    #[serde(default = "default_stream_config_path")]
    pub stream_config_path: PathBuf,

    /// Hostname-routed HTTP document path
    #[serde(default = "default_http_config_path")]
    pub http_config_path: PathBuf,
}

impl OutputConfig {
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.stream_config_path.as_os_str().is_empty() {
            return Err(crate::Error::config("Stream config path cannot be empty"));
        }
        if self.http_config_path.as_os_str().is_empty() {
            return Err(crate::Error::config("HTTP config path cannot be empty"));
        }
        if self.stream_config_path == self.http_config_path {
            return Err(crate::Error::config(format!(
                "Stream and HTTP config paths must differ (both are {})",
                self.stream_config_path.display()
            )));
        }
        Ok(())
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            stream_config_path: default_stream_config_path(),
            http_config_path: default_http_config_path(),
        }
    }
}

/// Proxy engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Shell command that checks the configuration on disk
    #[serde(default = "default_validate_cmd")]
    pub validate_cmd: String,

    /// Shell command that reloads the proxy
    #[serde(default = "default_reload_cmd")]
    pub reload_cmd: String,

    /// Minimum spacing between reloads (in milliseconds)
    ///
    /// A reload requested sooner waits out the remainder instead of firing.
    #[serde(default = "default_min_reload_interval_ms")]
    pub min_reload_interval_ms: u64,
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.validate_cmd.trim().is_empty() {
            return Err(crate::Error::config("Validate command cannot be empty"));
        }
        if self.reload_cmd.trim().is_empty() {
            return Err(crate::Error::config("Reload command cannot be empty"));
        }
        Ok(())
    }

    pub fn min_reload_interval(&self) -> Duration {
        Duration::from_millis(self.min_reload_interval_ms)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            validate_cmd: default_validate_cmd(),
            reload_cmd: default_reload_cmd(),
            min_reload_interval_ms: default_min_reload_interval_ms(),
        }
    }
}

/// Controller configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Quiet period after the last container event before a pass runs
    /// (in milliseconds)
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Capacity of the controller event channel
    ///
    /// When full, new controller events are dropped (with a warning log).
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl ControllerConfig {
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.debounce_ms == 0 {
            return Err(crate::Error::config("Debounce delay must be > 0"));
        }
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        Ok(())
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

fn default_docker_host() -> String {
    "unix:///var/run/docker.sock".to_string()
}

fn default_event_buffer() -> usize {
    256
}

fn default_stream_config_path() -> PathBuf {
    PathBuf::from("/etc/nginx/conf.d/proxy.conf")
}

fn default_http_config_path() -> PathBuf {
    PathBuf::from("/etc/nginx/conf.d/http-proxy.conf")
}

fn default_validate_cmd() -> String {
    "nginx -t".to_string()
}

fn default_reload_cmd() -> String {
    "nginx -s reload".to_string()
}

fn default_min_reload_interval_ms() -> u64 {
    1000
}

fn default_debounce_ms() -> u64 {
    2000
}

fn default_event_channel_capacity() -> usize {
    1000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ProxyConfig::new();
        assert!(config.validate().is_ok());
        assert_eq!(config.controller.debounce(), Duration::from_secs(2));
        assert_eq!(config.engine.min_reload_interval(), Duration::from_secs(1));
        assert_eq!(config.engine.validate_cmd, "nginx -t");
        assert_eq!(config.engine.reload_cmd, "nginx -s reload");
        assert_eq!(config.runtime.network, None);
    }

    #[test]
    fn test_deserialize_fills_defaults() {
        let config: ProxyConfig = serde_json::from_str(
            r#"{"output": {"stream_config_path": "/tmp/stream.conf"}}"#,
        )
        .unwrap();

        assert_eq!(
            config.output.stream_config_path,
            PathBuf::from("/tmp/stream.conf")
        );
        assert_eq!(
            config.output.http_config_path,
            PathBuf::from("/etc/nginx/conf.d/http-proxy.conf")
        );
        assert_eq!(config.runtime.docker_host, "unix:///var/run/docker.sock");
        assert_eq!(config.controller.event_channel_capacity, 1000);
    }

    #[test]
    fn test_same_output_paths_rejected() {
        let mut config = ProxyConfig::new();
        config.output.http_config_path = config.output.stream_config_path.clone();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_commands_rejected() {
        let mut config = ProxyConfig::new();
        config.engine.reload_cmd = "   ".to_string();
        assert!(config.validate().is_err());

        let mut config = ProxyConfig::new();
        config.engine.validate_cmd = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_debounce_rejected() {
        let mut config = ProxyConfig::new();
        config.controller.debounce_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_blank_network_rejected() {
        let mut config = ProxyConfig::new();
        config.runtime.network = Some(" ".to_string());
        assert!(config.validate().is_err());

        config.runtime.network = Some("proxy".to_string());
        assert!(config.validate().is_ok());
    }
}
