//! # Sync Configuration
//!
//! Configuration for the realtime sync engine: endpoint, identity, and
//! channel tuning.
//!
//! ## Configuration File (sync.toml)
//! ```toml
//! [endpoint]
//! origin = "https://aisle.example.com"
//! # ws_url = "wss://sync.aisle.example.com/ws"   # explicit override
//!
//! [identity]
//! user_id = "user-81723"
//! store_id = "store-3"
//!
//! [channel]
//! connect_timeout_secs = 10
//! heartbeat_secs = 30
//! initial_backoff_ms = 1000
//! max_backoff_secs = 30
//! max_attempts = 10
//! ```
//!
//! ## Load Order (later overrides earlier)
//! 1. Default values
//! 2. Config file (sync.toml)
//! 3. Environment variables (AISLE_*)
//!
//! When no `ws_url` is given the endpoint is derived from the origin:
//! http becomes ws, https becomes wss, and the path is `/ws`.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use aisle_core::derive_ws_endpoint;

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Endpoint Settings
// =============================================================================

/// Where to connect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointSettings {
    /// App origin the WebSocket endpoint is derived from.
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Explicit WebSocket URL. When set, wins over derivation.
    #[serde(default)]
    pub ws_url: Option<String>,
}

impl Default for EndpointSettings {
    fn default() -> Self {
        EndpointSettings {
            origin: default_origin(),
            ws_url: None,
        }
    }
}

fn default_origin() -> String {
    "http://localhost:3000".to_string()
}

// =============================================================================
// Identity Settings
// =============================================================================

/// Who this client syncs as. Both fields are optional; events simply carry
/// no origin when they are unset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentitySettings {
    /// User the outbound events belong to.
    #[serde(default)]
    pub user_id: Option<String>,

    /// Store the shopper is currently in.
    #[serde(default)]
    pub store_id: Option<String>,
}

// =============================================================================
// Channel Settings
// =============================================================================

/// Connection and reconnection tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelSettings {
    /// Handshake timeout in seconds.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Interval between heartbeat pings while open, in seconds.
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,

    /// First reconnect delay, in milliseconds.
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Reconnect delay ceiling, in seconds.
    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,

    /// Reconnect attempts before giving up (0 = never give up).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        ChannelSettings {
            connect_timeout_secs: default_connect_timeout_secs(),
            heartbeat_secs: default_heartbeat_secs(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_secs: default_max_backoff_secs(),
            max_attempts: default_max_attempts(),
        }
    }
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_heartbeat_secs() -> u64 {
    30
}

fn default_initial_backoff_ms() -> u64 {
    1000
}

fn default_max_backoff_secs() -> u64 {
    30
}

fn default_max_attempts() -> u32 {
    10
}

// =============================================================================
// Sync Configuration
// =============================================================================

/// Complete sync engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Endpoint settings.
    #[serde(default)]
    pub endpoint: EndpointSettings,

    /// Identity settings.
    #[serde(default)]
    pub identity: IdentitySettings,

    /// Channel settings.
    #[serde(default)]
    pub channel: ChannelSettings,
}

impl SyncConfig {
    /// Creates a config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (sync.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        // Try to load from config file
        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading sync config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        // Override with environment variables
        config.apply_env_overrides();

        // Validate the configuration
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load sync config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> SyncResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| SyncError::ConfigSaveFailed("No config path available".into()))?;

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Sync config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        if self.endpoint.origin.is_empty() && self.endpoint.ws_url.is_none() {
            return Err(SyncError::InvalidConfig(
                "either endpoint.origin or endpoint.ws_url must be set".into(),
            ));
        }

        // Resolving the endpoint exercises both the override scheme check
        // and origin derivation.
        self.ws_endpoint()?;

        if self.channel.connect_timeout_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "connect_timeout_secs must be greater than 0".into(),
            ));
        }
        if self.channel.heartbeat_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "heartbeat_secs must be greater than 0".into(),
            ));
        }
        if self.channel.initial_backoff_ms == 0 {
            return Err(SyncError::InvalidConfig(
                "initial_backoff_ms must be greater than 0".into(),
            ));
        }
        if self.backoff_ceiling() < self.backoff_floor() {
            return Err(SyncError::InvalidConfig(format!(
                "max_backoff_secs ({}) is below initial_backoff_ms ({})",
                self.channel.max_backoff_secs, self.channel.initial_backoff_ms
            )));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        // Origin
        if let Ok(origin) = std::env::var("AISLE_ORIGIN") {
            debug!(origin = %origin, "Overriding origin from environment");
            self.endpoint.origin = origin;
        }

        // Explicit WebSocket URL
        if let Ok(url) = std::env::var("AISLE_WS_URL") {
            debug!(url = %url, "Overriding WebSocket URL from environment");
            self.endpoint.ws_url = Some(url);
        }

        // Identity
        if let Ok(id) = std::env::var("AISLE_USER_ID") {
            self.identity.user_id = Some(id);
        }
        if let Ok(id) = std::env::var("AISLE_STORE_ID") {
            self.identity.store_id = Some(id);
        }

        // Heartbeat interval
        if let Ok(secs) = std::env::var("AISLE_HEARTBEAT_SECS") {
            if let Ok(s) = secs.parse::<u64>() {
                self.channel.heartbeat_secs = s;
            }
        }

        // Reconnect budget
        if let Ok(attempts) = std::env::var("AISLE_MAX_ATTEMPTS") {
            if let Ok(a) = attempts.parse::<u32>() {
                debug!(max_attempts = a, "Overriding reconnect budget from environment");
                self.channel.max_attempts = a;
            }
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "aisle", "app").map(|dirs| {
            let config_dir = dirs.config_dir();
            config_dir.join("sync.toml")
        })
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// The WebSocket endpoint to dial: the explicit override, or the URL
    /// derived from the origin.
    pub fn ws_endpoint(&self) -> SyncResult<Url> {
        if let Some(ref raw) = self.endpoint.ws_url {
            let url = Url::parse(raw)?;
            if !matches!(url.scheme(), "ws" | "wss") {
                return Err(SyncError::InvalidUrl(format!(
                    "ws_url must start with ws:// or wss://, got: {}",
                    raw
                )));
            }
            return Ok(url);
        }
        Ok(derive_ws_endpoint(&self.endpoint.origin)?)
    }

    /// Handshake timeout as a `Duration`.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.channel.connect_timeout_secs)
    }

    /// Heartbeat interval as a `Duration`.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.channel.heartbeat_secs)
    }

    /// First reconnect delay as a `Duration`.
    pub fn backoff_floor(&self) -> Duration {
        Duration::from_millis(self.channel.initial_backoff_ms)
    }

    /// Reconnect delay ceiling as a `Duration`.
    pub fn backoff_ceiling(&self) -> Duration {
        Duration::from_secs(self.channel.max_backoff_secs)
    }
}

// =============================================================================
// Tests
// =============================================================================
