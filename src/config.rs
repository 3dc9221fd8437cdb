//! Runtime Configuration
//!
//! Engine pacing and server settings. Every field has a default; `from_env`
//! overrides individual fields from `PALACE_*` variables.

use std::net::SocketAddr;
use std::time::Duration;

use crate::game::events::DEFAULT_LOG_CAPACITY;

/// Timings and buffer sizes used by rooms.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Simulated thinking time before a bot acts.
    pub bot_think_delay: Duration,
    /// Delay before a stuck human automatically takes the pile.
    pub auto_pickup_delay: Duration,
    /// How long a disconnected human keeps their seat before a bot takes over.
    pub reconnect_grace: Duration,
    /// Event log lines kept per room.
    pub log_capacity: usize,
    /// Buffer of the room-changed notification channel.
    pub notify_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bot_think_delay: Duration::from_millis(1500),
            auto_pickup_delay: Duration::from_millis(1000),
            reconnect_grace: Duration::from_secs(10),
            log_capacity: DEFAULT_LOG_CAPACITY,
            notify_capacity: 256,
        }
    }
}

impl EngineConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bot_think_delay: env_parse("PALACE_BOT_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.bot_think_delay),
            auto_pickup_delay: env_parse("PALACE_AUTO_PICKUP_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.auto_pickup_delay),
            reconnect_grace: env_parse("PALACE_RECONNECT_GRACE_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.reconnect_grace),
            ..defaults
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Room engine settings.
    pub engine: EngineConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            max_connections: 1000,
            engine: EngineConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_addr: env_parse("PALACE_BIND_ADDR").unwrap_or(defaults.bind_addr),
            max_connections: env_parse("PALACE_MAX_CONNECTIONS").unwrap_or(defaults.max_connections),
            engine: EngineConfig::from_env(),
        }
    }
}

/// Parse a variable, ignoring unset or malformed values.
fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.bot_think_delay, Duration::from_millis(1500));
        assert_eq!(config.auto_pickup_delay, Duration::from_secs(1));
        assert_eq!(config.reconnect_grace, Duration::from_secs(10));
        assert_eq!(config.log_capacity, 50);

        let server = ServerConfig::default();
        assert_eq!(server.bind_addr.port(), 3000);
    }

    #[test]
    fn test_env_overrides() {
        std::env::set_var("PALACE_TEST_MS", " 250 ");
        std::env::set_var("PALACE_TEST_BAD", "soon");
        assert_eq!(env_parse::<u64>("PALACE_TEST_MS"), Some(250));
        assert_eq!(env_parse::<u64>("PALACE_TEST_BAD"), None);
        assert_eq!(env_parse::<u64>("PALACE_TEST_UNSET"), None);
    }
}
