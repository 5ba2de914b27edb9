use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;

/// Top-level configuration settings for the application.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Settings {
    pub server: ServerSettings,
    pub hub: HubSettings,
    pub logging: LoggingSettings,
}

/// Where the WebSocket server listens and how long a handshake may take.
///
/// `path` is the request path the hub is mapped at; upgrades to any other
/// path are refused with a 404.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub path: String,
    pub handshake_timeout_ms: u64,
}

impl ServerSettings {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }
}

/// Configuration settings for the hub.
///
/// `outbound_buffer` is the depth of each connection's outbound queue; a
/// recipient whose queue is full counts as a failed delivery.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct HubSettings {
    pub max_connections: usize,
    pub deliver_to_sender: bool,
    pub outbound_buffer: usize,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct LoggingSettings {
    pub level: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Missing values are filled in from `Settings::default()`.
#[derive(Debug, Deserialize, Default)]
pub struct PartialSettings {
    pub server: Option<PartialServerSettings>,
    pub hub: Option<PartialHubSettings>,
    pub logging: Option<PartialLoggingSettings>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialServerSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub path: Option<String>,
    pub handshake_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialHubSettings {
    pub max_connections: Option<usize>,
    pub deliver_to_sender: Option<bool>,
    pub outbound_buffer: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialLoggingSettings {
    pub level: Option<String>,
}

impl Settings {
    /// Reject values the server cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hub.outbound_buffer == 0 {
            return Err(ConfigError::Message(
                "hub.outbound_buffer must be at least 1".to_string(),
            ));
        }
        if !self.server.path.starts_with('/') {
            return Err(ConfigError::Message(format!(
                "server.path must start with '/', got '{}'",
                self.server.path
            )));
        }
        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            hub: HubSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            path: "/chathub".to_string(),
            handshake_timeout_ms: 5000,
        }
    }
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            max_connections: 1000,
            deliver_to_sender: true,
            outbound_buffer: 256,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl PartialSettings {
    /// Overlay the values that were provided onto `defaults`.
    pub fn merge_onto(self, defaults: Settings) -> Settings {
        let server = self.server.unwrap_or_default();
        let hub = self.hub.unwrap_or_default();
        let logging = self.logging.unwrap_or_default();

        Settings {
            server: ServerSettings {
                host: server.host.unwrap_or(defaults.server.host),
                port: server.port.unwrap_or(defaults.server.port),
                path: server.path.unwrap_or(defaults.server.path),
                handshake_timeout_ms: server
                    .handshake_timeout_ms
                    .unwrap_or(defaults.server.handshake_timeout_ms),
            },
            hub: HubSettings {
                max_connections: hub
                    .max_connections
                    .unwrap_or(defaults.hub.max_connections),
                deliver_to_sender: hub
                    .deliver_to_sender
                    .unwrap_or(defaults.hub.deliver_to_sender),
                outbound_buffer: hub
                    .outbound_buffer
                    .unwrap_or(defaults.hub.outbound_buffer),
            },
            logging: LoggingSettings {
                level: logging.level.unwrap_or(defaults.logging.level),
            },
        }
    }
}
