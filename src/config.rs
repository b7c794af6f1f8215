// WorkHole/backend-api/src/config.rs
use chrono::Weekday;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set in environment variables or .env file")]
    Missing(&'static str),
    #[error("{key} has an invalid value '{value}': {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
    pub db_pool_size: u32,
    pub default_office_radius_meters: f64,
    pub default_utc_offset_minutes: i32,
    pub annual_leave_entitlement: i32,
    pub heat_chart_week_start: Weekday,
    pub sweep_interval: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Reads every setting through `lookup` so tests can feed a map instead of
    /// the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let database_url = get("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let frontend_url_dev =
            get("FRONTEND_URL_DEV").unwrap_or_else(|| "http://localhost:3000".to_string());
        let mut cors_origins = vec![frontend_url_dev];
        if let Some(prod) = get("FRONTEND_URL_PROD") {
            cors_origins.push(prod);
        }

        let db_pool_size: u32 = parse_or(&get, "DB_POOL_SIZE", 10)?;
        if db_pool_size == 0 {
            return Err(invalid("DB_POOL_SIZE", "0", "pool size must be at least 1"));
        }
        let default_office_radius_meters: f64 = parse_or(&get, "DEFAULT_OFFICE_RADIUS_METERS", 50.0)?;
        if default_office_radius_meters.is_nan() || default_office_radius_meters <= 0.0 {
            return Err(invalid(
                "DEFAULT_OFFICE_RADIUS_METERS",
                &default_office_radius_meters.to_string(),
                "radius must be positive",
            ));
        }
        let default_utc_offset_minutes: i32 = parse_or(&get, "DEFAULT_UTC_OFFSET_MINUTES", 0)?;
        if default_utc_offset_minutes.abs() >= 24 * 60 {
            return Err(invalid(
                "DEFAULT_UTC_OFFSET_MINUTES",
                &default_utc_offset_minutes.to_string(),
                "offset must be within a day",
            ));
        }
        let sweep_seconds: u64 = parse_or(&get, "SWEEP_INTERVAL_SECONDS", 30)?;
        if sweep_seconds == 0 {
            return Err(invalid("SWEEP_INTERVAL_SECONDS", "0", "interval must be at least 1 second"));
        }

        Ok(AppConfig {
            database_url,
            host: get("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(&get, "PORT", 8080)?,
            cors_origins,
            db_pool_size,
            default_office_radius_meters,
            default_utc_offset_minutes,
            annual_leave_entitlement: parse_or(&get, "ANNUAL_LEAVE_ENTITLEMENT", 21)?,
            heat_chart_week_start: parse_or(&get, "HEAT_CHART_WEEK_START", Weekday::Sun)?,
            sweep_interval: Duration::from_secs(sweep_seconds),
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn invalid(key: &'static str, value: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_or<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Debug,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| invalid(key, &raw, &format!("{:?}", e))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_only_database_url_is_set() {
        let config = config_from(&[("DATABASE_URL", "postgres://localhost/workhole")]).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8080);
        assert_eq!(config.db_pool_size, 10);
        assert_eq!(config.default_office_radius_meters, 50.0);
        assert_eq!(config.default_utc_offset_minutes, 0);
        assert_eq!(config.annual_leave_entitlement, 21);
        assert_eq!(config.heat_chart_week_start, Weekday::Sun);
        assert_eq!(config.sweep_interval, Duration::from_secs(30));
        assert_eq!(config.cors_origins, vec!["http://localhost:3000".to_string()]);
        assert_eq!(config.bind_address(), "0.0.0.0:8080");
    }

    #[test]
    fn database_url_is_required() {
        assert_eq!(config_from(&[]), Err(ConfigError::Missing("DATABASE_URL")));
        assert_eq!(
            config_from(&[("DATABASE_URL", "  ")]),
            Err(ConfigError::Missing("DATABASE_URL"))
        );
    }

    #[test]
    fn overrides_are_parsed() {
        let config = config_from(&[
            ("DATABASE_URL", "postgres://db/workhole"),
            ("PORT", "9000"),
            ("FRONTEND_URL_PROD", "https://workhole.app"),
            ("DEFAULT_OFFICE_RADIUS_METERS", "120.5"),
            ("DEFAULT_UTC_OFFSET_MINUTES", "120"),
            ("HEAT_CHART_WEEK_START", "mon"),
            ("SWEEP_INTERVAL_SECONDS", "5"),
        ])
        .unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.cors_origins.len(), 2);
        assert_eq!(config.default_office_radius_meters, 120.5);
        assert_eq!(config.default_utc_offset_minutes, 120);
        assert_eq!(config.heat_chart_week_start, Weekday::Mon);
        assert_eq!(config.sweep_interval, Duration::from_secs(5));
    }

    #[test]
    fn invalid_values_are_reported_with_their_key() {
        let err = config_from(&[("DATABASE_URL", "postgres://db"), ("PORT", "eighty")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "PORT", .. }));

        let err = config_from(&[("DATABASE_URL", "postgres://db"), ("DB_POOL_SIZE", "0")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "DB_POOL_SIZE", .. }));

        let err = config_from(&[("DATABASE_URL", "postgres://db"), ("HEAT_CHART_WEEK_START", "someday")])
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "HEAT_CHART_WEEK_START", .. }));
    }
}
