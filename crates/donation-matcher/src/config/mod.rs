use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use crate::workflows::donations::{AllocationSettings, SelectionStrategy, UnknownStrategy};

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub donations: DonationConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            donations: DonationConfig::from_env()?,
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Allocation engine and webhook intake settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DonationConfig {
    pub strategy: SelectionStrategy,
    /// Only webhook records from this table are treated as donations.
    pub requests_table_id: String,
    pub sender_number: String,
    pub rng_seed: Option<u64>,
    pub record_attempts: u8,
    /// JSON file used to seed the in-memory request ledger.
    pub ledger_path: Option<PathBuf>,
}

impl DonationConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let strategy = match non_empty_var("DONATION_STRATEGY") {
            Some(raw) => raw.parse::<SelectionStrategy>()?,
            None => SelectionStrategy::WeightedLottery,
        };

        let requests_table_id =
            non_empty_var("DONATION_REQUESTS_TABLE_ID").unwrap_or_else(|| "requests".to_string());
        let sender_number = non_empty_var("DONATION_SENDER_NUMBER").unwrap_or_default();

        let rng_seed = non_empty_var("DONATION_RNG_SEED")
            .map(|raw| raw.parse::<u64>().map_err(|_| ConfigError::InvalidSeed))
            .transpose()?;

        let record_attempts = match non_empty_var("DONATION_RECORD_ATTEMPTS") {
            Some(raw) => raw
                .parse::<u8>()
                .ok()
                .filter(|attempts| *attempts > 0)
                .ok_or(ConfigError::InvalidRecordAttempts)?,
            None => 3,
        };

        let ledger_path = non_empty_var("DONATION_LEDGER_PATH").map(PathBuf::from);

        Ok(Self {
            strategy,
            requests_table_id,
            sender_number,
            rng_seed,
            record_attempts,
            ledger_path,
        })
    }

    pub fn allocation_settings(&self) -> AllocationSettings {
        AllocationSettings {
            strategy: self.strategy,
            sender_number: self.sender_number.clone(),
            record_attempts: self.record_attempts,
            rng_seed: self.rng_seed,
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidStrategy(UnknownStrategy),
    InvalidSeed,
    InvalidRecordAttempts,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidStrategy(err) => write!(f, "DONATION_STRATEGY: {err}"),
            ConfigError::InvalidSeed => write!(f, "DONATION_RNG_SEED must be a valid u64"),
            ConfigError::InvalidRecordAttempts => {
                write!(f, "DONATION_RECORD_ATTEMPTS must be between 1 and 255")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidStrategy(err) => Some(err),
            ConfigError::InvalidPort
            | ConfigError::InvalidSeed
            | ConfigError::InvalidRecordAttempts => None,
        }
    }
}

impl From<UnknownStrategy> for ConfigError {
    fn from(value: UnknownStrategy) -> Self {
        Self::InvalidStrategy(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        for key in [
            "APP_ENV",
            "APP_HOST",
            "APP_PORT",
            "APP_LOG_LEVEL",
            "DONATION_STRATEGY",
            "DONATION_REQUESTS_TABLE_ID",
            "DONATION_SENDER_NUMBER",
            "DONATION_RNG_SEED",
            "DONATION_RECORD_ATTEMPTS",
            "DONATION_LEDGER_PATH",
        ] {
            env::remove_var(key);
        }
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.telemetry.log_level, "info");
        assert_eq!(config.donations.strategy, SelectionStrategy::WeightedLottery);
        assert_eq!(config.donations.requests_table_id, "requests");
        assert_eq!(config.donations.record_attempts, 3);
        assert_eq!(config.donations.rng_seed, None);
    }

    #[test]
    fn accepts_localhost_host() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_HOST", "localhost");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 3000));
        reset_env();
    }

    #[test]
    fn reads_donation_settings() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("DONATION_STRATEGY", "sequential_exhaustion");
        env::set_var("DONATION_RNG_SEED", "42");
        env::set_var("DONATION_RECORD_ATTEMPTS", "5");
        env::set_var("DONATION_REQUESTS_TABLE_ID", "tblDonations");

        let config = AppConfig::load().expect("config loads");
        let settings = config.donations.allocation_settings();
        assert_eq!(settings.strategy, SelectionStrategy::SequentialExhaustion);
        assert_eq!(settings.rng_seed, Some(42));
        assert_eq!(settings.record_attempts, 5);
        assert_eq!(config.donations.requests_table_id, "tblDonations");
        reset_env();
    }

    #[test]
    fn rejects_unknown_strategy_instead_of_defaulting() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("DONATION_STRATEGY", "round_robin");
        assert!(matches!(
            AppConfig::load(),
            Err(ConfigError::InvalidStrategy(_))
        ));
        reset_env();
    }

    #[test]
    fn rejects_zero_record_attempts() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("DONATION_RECORD_ATTEMPTS", "0");
        assert!(matches!(
            AppConfig::load(),
            Err(ConfigError::InvalidRecordAttempts)
        ));
        reset_env();
    }
}
