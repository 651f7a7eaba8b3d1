//! Broadcast Controller configuration.
//!
//! Configuration is loaded from environment variables. Credentials embedded in
//! the signaling URL are redacted in Debug output.

use std::collections::HashMap;
use std::env;
use std::fmt;
use thiserror::Error;

/// Default signaling server URL.
pub const DEFAULT_SIGNALING_URL: &str = "http://localhost:8080";

/// Default peer server host.
pub const DEFAULT_PEER_SERVER_HOST: &str = "localhost";

/// Default peer server port.
pub const DEFAULT_PEER_SERVER_PORT: u16 = 9000;

/// Default peer server path.
pub const DEFAULT_PEER_SERVER_PATH: &str = "/peer";

/// Default public URL viewers open.
pub const DEFAULT_PUBLIC_URL: &str = "http://localhost:3000";

/// Default session mailbox capacity.
pub const DEFAULT_MAILBOX_CAPACITY: usize = 256;

/// Default maximum (and ideal) capture width.
pub const DEFAULT_CAPTURE_MAX_WIDTH: u32 = 1920;

/// Default ideal capture height.
pub const DEFAULT_CAPTURE_IDEAL_HEIGHT: u32 = 1080;

/// Default maximum capture frame rate.
pub const DEFAULT_CAPTURE_MAX_FRAME_RATE: u32 = 60;

/// Broadcast Controller configuration.
#[derive(Clone)]
pub struct Config {
    /// This broadcaster's identity, announced to the signaling server.
    pub broadcaster_id: String,

    /// Signaling server URL.
    pub signaling_url: String,

    /// Peer server host used by the peer transport.
    pub peer_server_host: String,

    /// Peer server port.
    pub peer_server_port: u16,

    /// Peer server path.
    pub peer_server_path: String,

    /// Public base URL of the viewer page (no trailing slash).
    pub public_url: String,

    /// Session mailbox capacity.
    pub mailbox_capacity: usize,

    /// Maximum (and ideal) capture width in pixels.
    pub capture_max_width: u32,

    /// Ideal capture height in pixels.
    pub capture_ideal_height: u32,

    /// Maximum capture frame rate, requested when the platform supports it.
    pub capture_max_frame_rate: u32,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("broadcaster_id", &self.broadcaster_id)
            .field("signaling_url", &redact_userinfo(&self.signaling_url))
            .field("peer_server_host", &self.peer_server_host)
            .field("peer_server_port", &self.peer_server_port)
            .field("peer_server_path", &self.peer_server_path)
            .field("public_url", &self.public_url)
            .field("mailbox_capacity", &self.mailbox_capacity)
            .field("capture_max_width", &self.capture_max_width)
            .field("capture_ideal_height", &self.capture_ideal_height)
            .field("capture_max_frame_rate", &self.capture_max_frame_rate)
            .finish()
    }
}

/// Replace `user:password@` in a URL with `[REDACTED]@`.
fn redact_userinfo(url: &str) -> String {
    let Some(scheme_end) = url.find("://") else {
        return url.to_string();
    };
    let authority_start = scheme_end + 3;
    let rest = url.get(authority_start..).unwrap_or_default();
    let authority_end = rest.find('/').unwrap_or(rest.len());
    let authority = rest.get(..authority_end).unwrap_or_default();

    match authority.rfind('@') {
        Some(at) => format!(
            "{}[REDACTED]{}",
            url.get(..authority_start).unwrap_or_default(),
            rest.get(at..).unwrap_or_default()
        ),
        None => url.to_string(),
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let broadcaster_id = match vars.get("BC_BROADCASTER_ID") {
            Some(id) if id.trim().is_empty() => {
                return Err(ConfigError::InvalidValue(
                    "BC_BROADCASTER_ID must not be empty".to_string(),
                ));
            }
            Some(id) => id.clone(),
            None => uuid::Uuid::new_v4().to_string(),
        };

        let signaling_url = vars
            .get("BC_SIGNALING_URL")
            .cloned()
            .unwrap_or_else(|| DEFAULT_SIGNALING_URL.to_string());

        let peer_server_host = vars
            .get("BC_PEER_SERVER_HOST")
            .cloned()
            .unwrap_or_else(|| DEFAULT_PEER_SERVER_HOST.to_string());

        let peer_server_port = parse_var(vars, "BC_PEER_SERVER_PORT", DEFAULT_PEER_SERVER_PORT)?;

        let peer_server_path = vars
            .get("BC_PEER_SERVER_PATH")
            .cloned()
            .unwrap_or_else(|| DEFAULT_PEER_SERVER_PATH.to_string());

        let public_url = vars
            .get("BC_PUBLIC_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_PUBLIC_URL.to_string());

        let mailbox_capacity = parse_var(vars, "BC_MAILBOX_CAPACITY", DEFAULT_MAILBOX_CAPACITY)?;
        if mailbox_capacity == 0 {
            return Err(ConfigError::InvalidValue(
                "BC_MAILBOX_CAPACITY must be greater than zero".to_string(),
            ));
        }

        let capture_max_width = parse_var(vars, "BC_CAPTURE_MAX_WIDTH", DEFAULT_CAPTURE_MAX_WIDTH)?;
        let capture_ideal_height = parse_var(
            vars,
            "BC_CAPTURE_IDEAL_HEIGHT",
            DEFAULT_CAPTURE_IDEAL_HEIGHT,
        )?;
        let capture_max_frame_rate = parse_var(
            vars,
            "BC_CAPTURE_MAX_FRAME_RATE",
            DEFAULT_CAPTURE_MAX_FRAME_RATE,
        )?;

        Ok(Config {
            broadcaster_id,
            signaling_url,
            peer_server_host,
            peer_server_port,
            peer_server_path,
            public_url,
            mailbox_capacity,
            capture_max_width,
            capture_ideal_height,
            capture_max_frame_rate,
        })
    }

    /// Shareable link viewers open to watch this broadcaster.
    #[must_use]
    pub fn viewer_url(&self) -> String {
        format!("{}/watch/{}", self.public_url, self.broadcaster_id)
    }
}

fn parse_var<T: std::str::FromStr>(
    vars: &HashMap<String, String>,
    name: &str,
    default: T,
) -> Result<T, ConfigError> {
    match vars.get(name) {
        Some(raw) => raw
            .parse()
            .map_err(|_| ConfigError::InvalidValue(format!("{name}={raw}"))),
        None => Ok(default),
    }
}
