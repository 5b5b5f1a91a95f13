//! Central module for application-wide configuration settings.
//!
//! Settings come from the process environment (optionally seeded from a
//! `.env` file). Token lifetimes use duration strings such as `15m`, `720h`
//! or `1h30m`.

use crate::auth::service::AuthSettings;
use crate::database::{DatabaseSettings, PoolSettings};
use anyhow::{Context, Result, anyhow, bail, ensure};
use std::env;
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_seconds: u64,
    pub server_addr: SocketAddr,
    pub access_token_expires_in: Duration,
    pub refresh_token_expires_in: Duration,
    pub bcrypt_cost: u32,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Loads configuration through `lookup`, which maps a key to its raw value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").context("DATABASE_URL not set")?;

        let max_connections = lookup("DB_MAX_CONNECTIONS")
            .unwrap_or_else(|| "20".to_string())
            .parse::<u32>()
            .context("DB_MAX_CONNECTIONS must be a valid number")?;

        let min_connections = lookup("DB_MIN_CONNECTIONS")
            .unwrap_or_else(|| "2".to_string())
            .parse::<u32>()
            .context("DB_MIN_CONNECTIONS must be a valid number")?;
        ensure!(
            min_connections <= max_connections,
            "DB_MIN_CONNECTIONS must not exceed DB_MAX_CONNECTIONS"
        );

        let acquire_timeout_seconds = lookup("DB_ACQUIRE_TIMEOUT_SECONDS")
            .unwrap_or_else(|| "3".to_string())
            .parse::<u64>()
            .context("DB_ACQUIRE_TIMEOUT_SECONDS must be a valid number")?;

        let server_addr = lookup("SERVER_ADDR")
            .unwrap_or_else(|| "0.0.0.0:3000".to_string())
            .parse::<SocketAddr>()
            .context("SERVER_ADDR must be a socket address")?;

        let access_token_expires_in = lookup("ACCESS_TOKEN_EXPIRES_IN")
            .context("ACCESS_TOKEN_EXPIRES_IN not set")
            .and_then(|raw| parse_ttl(&raw))
            .context("ACCESS_TOKEN_EXPIRES_IN must be a positive duration")?;

        let refresh_token_expires_in = lookup("REFRESH_TOKEN_EXPIRES_IN")
            .context("REFRESH_TOKEN_EXPIRES_IN not set")
            .and_then(|raw| parse_ttl(&raw))
            .context("REFRESH_TOKEN_EXPIRES_IN must be a positive duration")?;

        let bcrypt_cost = match lookup("BCRYPT_COST") {
            Some(raw) => raw
                .parse::<u32>()
                .context("BCRYPT_COST must be a valid number")?,
            None => bcrypt::DEFAULT_COST,
        };
        ensure!(
            (4..=31).contains(&bcrypt_cost),
            "BCRYPT_COST must be between 4 and 31"
        );

        Ok(Config {
            database_url,
            max_connections,
            min_connections,
            acquire_timeout_seconds,
            server_addr,
            access_token_expires_in,
            refresh_token_expires_in,
            bcrypt_cost,
        })
    }

    pub fn database_settings(&self) -> DatabaseSettings {
        let mut settings = DatabaseSettings::new(self.database_url.clone());
        settings.pool = PoolSettings {
            max_connections: self.max_connections,
            min_connections: self.min_connections,
            acquire_timeout: Duration::from_secs(self.acquire_timeout_seconds),
            ..PoolSettings::default()
        };
        settings
    }

    pub fn auth_settings(&self) -> Result<AuthSettings> {
        Ok(AuthSettings {
            access_ttl: chrono::Duration::from_std(self.access_token_expires_in)
                .context("ACCESS_TOKEN_EXPIRES_IN is out of range")?,
            refresh_ttl: chrono::Duration::from_std(self.refresh_token_expires_in)
                .context("REFRESH_TOKEN_EXPIRES_IN is out of range")?,
            bcrypt_cost: self.bcrypt_cost,
        })
    }
}

fn parse_ttl(raw: &str) -> Result<Duration> {
    let ttl = parse_duration(raw)?;
    ensure!(!ttl.is_zero(), "duration must be greater than zero");
    Ok(ttl)
}

/// Parses a duration made of `<number><unit>` terms, e.g. `1h30m` or `1.5s`.
///
/// Units: `ns`, `us` (or `µs`), `ms`, `s`, `m`, `h`. A bare `0` is accepted.
pub fn parse_duration(raw: &str) -> Result<Duration> {
    let input = raw.trim();
    if input == "0" {
        return Ok(Duration::ZERO);
    }
    ensure!(!input.is_empty(), "empty duration");

    let mut total = Duration::ZERO;
    let mut rest = input;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(|| anyhow!("missing unit in duration {raw:?}"))?;
        ensure!(number_len > 0, "invalid duration {raw:?}");
        let value: f64 = rest[..number_len]
            .parse()
            .with_context(|| format!("invalid number in duration {raw:?}"))?;
        rest = &rest[number_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let nanos_per_unit: f64 = match &rest[..unit_len] {
            "ns" => 1.0,
            "us" | "µs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            unit => bail!("unknown unit {unit:?} in duration {raw:?}"),
        };
        rest = &rest[unit_len..];

        let nanos = value * nanos_per_unit;
        ensure!(
            nanos.is_finite() && nanos < u64::MAX as f64,
            "duration {raw:?} is too large"
        );
        total = total
            .checked_add(Duration::from_nanos(nanos as u64))
            .ok_or_else(|| anyhow!("duration {raw:?} is too large"))?;
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    const REQUIRED: &[(&str, &str)] = &[
        ("DATABASE_URL", "sqlite://auth.db?mode=rwc"),
        ("ACCESS_TOKEN_EXPIRES_IN", "15m"),
        ("REFRESH_TOKEN_EXPIRES_IN", "720h"),
    ];

    #[test]
    fn parses_compound_durations() {
        assert_eq!(parse_duration("15m").unwrap(), Duration::from_secs(900));
        assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("1.5s").unwrap(), Duration::from_millis(1500));
        assert_eq!(parse_duration("0").unwrap(), Duration::ZERO);
    }

    #[test]
    fn rejects_malformed_durations() {
        for raw in ["", "15", "m", "10x", "1h-5m", "abc"] {
            assert!(parse_duration(raw).is_err(), "{raw:?} should not parse");
        }
    }

    #[test]
    fn defaults_apply_when_optional_keys_are_absent() {
        let config = Config::from_lookup(lookup_from(REQUIRED)).unwrap();
        assert_eq!(config.max_connections, 20);
        assert_eq!(config.min_connections, 2);
        assert_eq!(config.acquire_timeout_seconds, 3);
        assert_eq!(config.server_addr, "0.0.0.0:3000".parse::<SocketAddr>().unwrap());
        assert_eq!(config.access_token_expires_in, Duration::from_secs(900));
        assert_eq!(config.bcrypt_cost, bcrypt::DEFAULT_COST);

        let settings = config.database_settings();
        assert_eq!(settings.pool.max_connections, 20);
        assert_eq!(settings.pool.acquire_timeout, Duration::from_secs(3));

        let auth = config.auth_settings().unwrap();
        assert_eq!(auth.refresh_ttl, chrono::Duration::hours(720));
    }

    #[test]
    fn token_lifetimes_are_required() {
        let error = Config::from_lookup(lookup_from(&REQUIRED[..2])).unwrap_err();
        assert!(format!("{error:#}").contains("REFRESH_TOKEN_EXPIRES_IN"));

        let mut pairs = REQUIRED.to_vec();
        pairs[1] = ("ACCESS_TOKEN_EXPIRES_IN", "soon");
        let error = Config::from_lookup(lookup_from(&pairs)).unwrap_err();
        assert!(format!("{error:#}").contains("ACCESS_TOKEN_EXPIRES_IN"));

        pairs[1] = ("ACCESS_TOKEN_EXPIRES_IN", "0");
        assert!(Config::from_lookup(lookup_from(&pairs)).is_err());
    }

    #[test]
    fn overrides_are_validated() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("DB_MAX_CONNECTIONS", "4"));
        pairs.push(("DB_MIN_CONNECTIONS", "8"));
        assert!(Config::from_lookup(lookup_from(&pairs)).is_err());

        let mut pairs = REQUIRED.to_vec();
        pairs.push(("BCRYPT_COST", "2"));
        assert!(Config::from_lookup(lookup_from(&pairs)).is_err());

        let mut pairs = REQUIRED.to_vec();
        pairs.push(("BCRYPT_COST", "4"));
        pairs.push(("SERVER_ADDR", "127.0.0.1:8080"));
        let config = Config::from_lookup(lookup_from(&pairs)).unwrap();
        assert_eq!(config.bcrypt_cost, 4);
        assert_eq!(config.server_addr.port(), 8080);
    }
}
