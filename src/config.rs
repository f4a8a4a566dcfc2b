// Gateway Configuration
//
// Configuration is sourced from the process environment and validated once
// at boot. There is no config file: the gateway is provisioned by the
// installation script, which writes the environment the service starts with.

use anyhow::{bail, Context, Result};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Default listen port, matching the provisioning script.
const DEFAULT_PORT: u16 = 3691;

/// Default directory scanned for drop-in module manifests.
const DEFAULT_TUX_DIR: &str = "./tux";

/// Default audit log location.
const DEFAULT_AUDIT_LOG: &str = "./audit.log";

/// Default directory for persisted state (signal-code store).
const DEFAULT_DATABASE_DIR: &str = "./database";

/// Runtime configuration for the gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Device name advertised on the discovery endpoint.
    pub device_name: String,

    /// Shared-secret PIN. `None` means the API runs unprotected.
    pub pin: Option<String>,

    /// Listen host.
    pub host: String,

    /// Listen port.
    pub port: u16,

    /// Directory scanned for drop-in module manifests.
    pub tux_dir: PathBuf,

    /// Append-only audit log file.
    pub audit_log: PathBuf,

    /// Directory holding persisted state (the signal-code store).
    pub database_dir: PathBuf,

    /// Upper bound on concurrently spawned commands. 0 disables the bound.
    pub max_concurrent_commands: usize,

    /// Read-only mode: state-changing and privileged routes are rejected.
    pub readonly: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device_name: default_device_name(),
            pin: None,
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            tux_dir: PathBuf::from(DEFAULT_TUX_DIR),
            audit_log: PathBuf::from(DEFAULT_AUDIT_LOG),
            database_dir: PathBuf::from(DEFAULT_DATABASE_DIR),
            max_concurrent_commands: 0,
            readonly: false,
        }
    }
}

/// Device name fallback when `DEVICE_NAME` is unset.
fn default_device_name() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "tux-device".to_string())
}

impl Config {
    /// Load configuration from the process environment and validate it.
    ///
    /// Environment variables:
    /// - `DEVICE_NAME` (default: hostname)
    /// - `DEVICE_PIN` (optional; at least four ASCII digits when set)
    /// - `HOST` (default: 0.0.0.0)
    /// - `PORT` (default: 3691)
    /// - `TUX_DIR` (default: ./tux)
    /// - `AUDIT_LOG` (default: ./audit.log)
    /// - `DATABASE_DIR` (default: ./database)
    /// - `MAX_CONCURRENT_COMMANDS` (default: 0 = unbounded)
    /// - `READONLY` (default: false)
    pub fn from_env() -> Result<Self> {
        let config = Self::default().apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(mut self) -> Result<Self> {
        if let Ok(name) = std::env::var("DEVICE_NAME") {
            if !name.is_empty() {
                self.device_name = name;
            }
        }
        if let Ok(pin) = std::env::var("DEVICE_PIN") {
            if !pin.is_empty() {
                self.pin = Some(pin);
            }
        }
        if let Ok(host) = std::env::var("HOST") {
            if !host.is_empty() {
                self.host = host;
            }
        }
        if let Ok(port) = std::env::var("PORT") {
            self.port = port
                .parse::<u16>()
                .with_context(|| format!("invalid PORT value {port:?}"))?;
        }
        if let Ok(dir) = std::env::var("TUX_DIR") {
            self.tux_dir = PathBuf::from(dir);
        }
        if let Ok(path) = std::env::var("AUDIT_LOG") {
            self.audit_log = PathBuf::from(path);
        }
        if let Ok(dir) = std::env::var("DATABASE_DIR") {
            self.database_dir = PathBuf::from(dir);
        }
        if let Ok(max) = std::env::var("MAX_CONCURRENT_COMMANDS") {
            self.max_concurrent_commands = max
                .parse::<usize>()
                .with_context(|| format!("invalid MAX_CONCURRENT_COMMANDS value {max:?}"))?;
        }
        if let Ok(flag) = std::env::var("READONLY") {
            self.readonly = matches!(flag.as_str(), "1" | "true" | "yes");
        }
        Ok(self)
    }

    /// Validate the configuration. Called once at boot.
    pub fn validate(&self) -> Result<()> {
        if self.device_name.is_empty() {
            bail!("device name must not be empty");
        }
        if let Some(pin) = &self.pin {
            if pin.len() < 4 || !pin.chars().all(|c| c.is_ascii_digit()) {
                bail!("DEVICE_PIN must be at least four ASCII digits");
            }
        }
        self.listen_addr()?;
        Ok(())
    }

    /// The socket address the gateway binds to.
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }
}
