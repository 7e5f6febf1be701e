//! Connector settings loaded from environment variables.
//!
//! No credentials are required: the aggregated trade streams and the
//! exchange info endpoint are public.

use std::path::PathBuf;
use std::time::Duration;

/// Which pairs the binary subscribes to at startup.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PairSelection {
    /// Subscribe to nothing.
    #[default]
    None,
    /// Every pair returned by the available-pairs lookup.
    All,
    /// Pairs whose exchange-native name is listed (case-insensitive).
    Listed(Vec<String>),
}

impl PairSelection {
    /// Parse a comma-separated list; `ALL` selects every pair.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        let names = split_list(value);
        if names.is_empty() {
            Self::None
        } else if names.iter().any(|n| n.eq_ignore_ascii_case("all")) {
            Self::All
        } else {
            Self::Listed(names.into_iter().map(|n| n.to_ascii_uppercase()).collect())
        }
    }

    /// Whether a pair with this exchange-native name is selected.
    #[must_use]
    pub fn selects(&self, foreign_name: &str) -> bool {
        match self {
            Self::None => false,
            Self::All => true,
            Self::Listed(names) => names.iter().any(|n| n.eq_ignore_ascii_case(foreign_name)),
        }
    }
}

/// Exchange endpoints.
#[derive(Debug, Clone)]
pub struct ExchangeSettings {
    /// Exchange name stamped on trade records.
    pub name: String,
    /// Raw stream WebSocket base URL.
    pub ws_base_url: String,
    /// REST API base URL.
    pub rest_base_url: String,
    /// REST request timeout.
    pub http_timeout: Duration,
}

impl Default for ExchangeSettings {
    fn default() -> Self {
        Self {
            name: "Binance".to_string(),
            ws_base_url: "wss://stream.binance.com:9443/ws".to_string(),
            rest_base_url: "https://api.binance.com".to_string(),
            http_timeout: Duration::from_secs(10),
        }
    }
}

/// WebSocket reconnection and heartbeat settings.
#[derive(Debug, Clone)]
pub struct WebSocketSettings {
    /// Initial reconnection delay.
    pub reconnect_delay_initial: Duration,
    /// Maximum reconnection delay.
    pub reconnect_delay_max: Duration,
    /// Reconnection delay multiplier for exponential backoff.
    pub reconnect_delay_multiplier: f64,
    /// Consecutive failed attempts before a feed gives up (0 = unlimited).
    pub max_reconnect_attempts: u32,
    /// Interval between client pings.
    pub heartbeat_interval: Duration,
    /// Time allowed for a reply after a ping.
    pub heartbeat_timeout: Duration,
}

impl Default for WebSocketSettings {
    fn default() -> Self {
        Self {
            reconnect_delay_initial: Duration::from_millis(500),
            reconnect_delay_max: Duration::from_secs(30),
            reconnect_delay_multiplier: 2.0,
            max_reconnect_attempts: 10,
            heartbeat_interval: Duration::from_secs(20),
            heartbeat_timeout: Duration::from_secs(20),
        }
    }
}

/// Canonical symbol table settings.
#[derive(Debug, Clone, Default)]
pub struct SymbolSettings {
    /// JSON symbol table replacing the built-in one.
    pub table_path: Option<PathBuf>,
    /// Additional blacklisted symbols.
    pub blacklist: Vec<String>,
}

/// Server port settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Health check HTTP port.
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { health_port: 8083 }
    }
}

/// Complete connector configuration.
#[derive(Debug, Clone)]
pub struct ConnectorConfig {
    /// Exchange endpoints.
    pub exchange: ExchangeSettings,
    /// WebSocket reconnection and heartbeat settings.
    pub websocket: WebSocketSettings,
    /// Symbol table settings.
    pub symbols: SymbolSettings,
    /// Server port settings.
    pub server: ServerSettings,
    /// Pairs subscribed at startup.
    pub pairs: PairSelection,
    /// Output stream capacity.
    pub output_capacity: usize,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            exchange: ExchangeSettings::default(),
            websocket: WebSocketSettings::default(),
            symbols: SymbolSettings::default(),
            server: ServerSettings::default(),
            pairs: PairSelection::None,
            output_capacity: 1,
        }
    }
}

impl ConnectorConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a value is present but invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Returns an error if a value is present but invalid.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env(&lookup);
        let defaults = Self::default();

        let exchange = ExchangeSettings {
            name: env.string("CONNECTOR_EXCHANGE_NAME", &defaults.exchange.name)?,
            ws_base_url: env.string("BINANCE_WS_BASE_URL", &defaults.exchange.ws_base_url)?,
            rest_base_url: env.string("BINANCE_REST_BASE_URL", &defaults.exchange.rest_base_url)?,
            http_timeout: env
                .parse("BINANCE_HTTP_TIMEOUT_SECS", defaults.exchange.http_timeout.as_secs())
                .map(Duration::from_secs)?,
        };

        let websocket = WebSocketSettings {
            reconnect_delay_initial: env
                .parse(
                    "BINANCE_RECONNECT_DELAY_INITIAL_MS",
                    duration_millis(defaults.websocket.reconnect_delay_initial),
                )
                .map(Duration::from_millis)?,
            reconnect_delay_max: env
                .parse(
                    "BINANCE_RECONNECT_DELAY_MAX_SECS",
                    defaults.websocket.reconnect_delay_max.as_secs(),
                )
                .map(Duration::from_secs)?,
            reconnect_delay_multiplier: env.parse(
                "BINANCE_RECONNECT_DELAY_MULTIPLIER",
                defaults.websocket.reconnect_delay_multiplier,
            )?,
            max_reconnect_attempts: env.parse(
                "BINANCE_MAX_RECONNECT_ATTEMPTS",
                defaults.websocket.max_reconnect_attempts,
            )?,
            heartbeat_interval: env
                .parse(
                    "BINANCE_HEARTBEAT_INTERVAL_SECS",
                    defaults.websocket.heartbeat_interval.as_secs(),
                )
                .map(Duration::from_secs)?,
            heartbeat_timeout: env
                .parse(
                    "BINANCE_HEARTBEAT_TIMEOUT_SECS",
                    defaults.websocket.heartbeat_timeout.as_secs(),
                )
                .map(Duration::from_secs)?,
        };

        let multiplier = websocket.reconnect_delay_multiplier;
        if !multiplier.is_finite() || multiplier < 1.0 {
            return Err(ConfigError::InvalidValue {
                key: "BINANCE_RECONNECT_DELAY_MULTIPLIER".to_string(),
                reason: "must be a finite number >= 1.0".to_string(),
            });
        }

        for (key, value) in [
            ("BINANCE_HEARTBEAT_INTERVAL_SECS", websocket.heartbeat_interval),
            ("BINANCE_HEARTBEAT_TIMEOUT_SECS", websocket.heartbeat_timeout),
        ] {
            if value.is_zero() {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    reason: "must be at least 1 second".to_string(),
                });
            }
        }

        let symbols = SymbolSettings {
            table_path: lookup("CONNECTOR_SYMBOL_TABLE_PATH")
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from),
            blacklist: lookup("CONNECTOR_SYMBOL_BLACKLIST")
                .map(|v| {
                    split_list(&v)
                        .into_iter()
                        .map(|s| s.to_ascii_uppercase())
                        .collect()
                })
                .unwrap_or_default(),
        };

        let server = ServerSettings {
            health_port: env.parse("CONNECTOR_HEALTH_PORT", defaults.server.health_port)?,
        };

        let pairs = lookup("CONNECTOR_PAIRS")
            .map(|v| PairSelection::parse(&v))
            .unwrap_or_default();

        let output_capacity = env.parse("CONNECTOR_OUTPUT_CAPACITY", defaults.output_capacity)?;
        if output_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                key: "CONNECTOR_OUTPUT_CAPACITY".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            exchange,
            websocket,
            symbols,
            server,
            pairs,
            output_capacity,
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),

    /// Environment variable has an unusable value.
    #[error("invalid value for {key}: {reason}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// What is wrong with it.
        reason: String,
    },
}

struct Env<'a, F: Fn(&str) -> Option<String>>(&'a F);

impl<F: Fn(&str) -> Option<String>> Env<'_, F> {
    fn string(&self, key: &str, default: &str) -> Result<String, ConfigError> {
        match (self.0)(key) {
            None => Ok(default.to_string()),
            Some(v) if v.trim().is_empty() => Err(ConfigError::EmptyValue(key.to_string())),
            Some(v) => Ok(v.trim().to_string()),
        }
    }

    fn parse<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        (self.0)(key).map_or(Ok(default), |v| {
            v.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                reason: format!("{v:?}: {e}"),
            })
        })
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(vars: &[(&str, &str)]) -> Result<ConnectorConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        ConnectorConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_without_variables() {
        let config = config_from(&[]).unwrap();

        assert_eq!(config.exchange.name, "Binance");
        assert_eq!(config.exchange.ws_base_url, "wss://stream.binance.com:9443/ws");
        assert_eq!(config.exchange.rest_base_url, "https://api.binance.com");
        assert_eq!(config.exchange.http_timeout, Duration::from_secs(10));
        assert_eq!(config.websocket.reconnect_delay_initial, Duration::from_millis(500));
        assert_eq!(config.websocket.reconnect_delay_max, Duration::from_secs(30));
        assert_eq!(config.websocket.max_reconnect_attempts, 10);
        assert_eq!(config.websocket.heartbeat_interval, Duration::from_secs(20));
        assert_eq!(config.websocket.heartbeat_timeout, Duration::from_secs(20));
        assert_eq!(config.server.health_port, 8083);
        assert_eq!(config.pairs, PairSelection::None);
        assert_eq!(config.output_capacity, 1);
        assert!(config.symbols.table_path.is_none());
        assert!(config.symbols.blacklist.is_empty());
    }

    #[test]
    fn overrides_are_applied() {
        let config = config_from(&[
            ("CONNECTOR_EXCHANGE_NAME", "BinanceUS"),
            ("BINANCE_WS_BASE_URL", "wss://stream.binance.us:9443/ws"),
            ("BINANCE_RECONNECT_DELAY_INITIAL_MS", "250"),
            ("BINANCE_MAX_RECONNECT_ATTEMPTS", "0"),
            ("BINANCE_HEARTBEAT_INTERVAL_SECS", "5"),
            ("BINANCE_HEARTBEAT_TIMEOUT_SECS", "3"),
            ("CONNECTOR_PAIRS", "btcusdt, ETHBTC"),
            ("CONNECTOR_OUTPUT_CAPACITY", "64"),
            ("CONNECTOR_SYMBOL_TABLE_PATH", "/etc/connector/symbols.json"),
            ("CONNECTOR_SYMBOL_BLACKLIST", "luna, ust"),
            ("CONNECTOR_HEALTH_PORT", "9000"),
        ])
        .unwrap();

        assert_eq!(config.exchange.name, "BinanceUS");
        assert_eq!(config.exchange.ws_base_url, "wss://stream.binance.us:9443/ws");
        assert_eq!(config.websocket.reconnect_delay_initial, Duration::from_millis(250));
        assert_eq!(config.websocket.max_reconnect_attempts, 0);
        assert_eq!(config.websocket.heartbeat_interval, Duration::from_secs(5));
        assert_eq!(config.websocket.heartbeat_timeout, Duration::from_secs(3));
        assert_eq!(
            config.pairs,
            PairSelection::Listed(vec!["BTCUSDT".to_string(), "ETHBTC".to_string()])
        );
        assert_eq!(config.output_capacity, 64);
        assert_eq!(
            config.symbols.table_path,
            Some(PathBuf::from("/etc/connector/symbols.json"))
        );
        assert_eq!(config.symbols.blacklist, vec!["LUNA", "UST"]);
        assert_eq!(config.server.health_port, 9000);
    }

    #[test]
    fn zero_output_capacity_rejected() {
        let err = config_from(&[("CONNECTOR_OUTPUT_CAPACITY", "0")]).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { ref key, .. } if key == "CONNECTOR_OUTPUT_CAPACITY"
        ));
    }

    #[test]
    fn zero_heartbeat_interval_rejected() {
        let err = config_from(&[("BINANCE_HEARTBEAT_INTERVAL_SECS", "0")]).unwrap_err();
        assert!(err.to_string().contains("BINANCE_HEARTBEAT_INTERVAL_SECS"));
    }

    #[test]
    fn unparsable_number_rejected() {
        let err = config_from(&[("CONNECTOR_HEALTH_PORT", "eighty")]).unwrap_err();
        assert!(err.to_string().contains("CONNECTOR_HEALTH_PORT"));
    }

    #[test]
    fn shrinking_multiplier_rejected() {
        assert!(config_from(&[("BINANCE_RECONNECT_DELAY_MULTIPLIER", "0.5")]).is_err());
    }

    #[test]
    fn empty_url_rejected() {
        let err = config_from(&[("BINANCE_REST_BASE_URL", "  ")]).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyValue(ref key) if key == "BINANCE_REST_BASE_URL"));
    }

    #[test]
    fn pair_selection_parsing() {
        assert_eq!(PairSelection::parse(""), PairSelection::None);
        assert_eq!(PairSelection::parse(" , "), PairSelection::None);
        assert_eq!(PairSelection::parse("all"), PairSelection::All);
        assert_eq!(PairSelection::parse("BTCUSDT,ALL"), PairSelection::All);

        let listed = PairSelection::parse("btcusdt");
        assert!(listed.selects("BTCUSDT"));
        assert!(!listed.selects("ETHUSDT"));
        assert!(PairSelection::All.selects("ANY"));
        assert!(!PairSelection::None.selects("BTCUSDT"));
    }
}
