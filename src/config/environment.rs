//! Configuración de variables de entorno
//!
//! Este módulo maneja la configuración del entorno y variables de configuración.
//! Todas las variables tienen un valor por defecto razonable salvo las URLs de
//! colaboradores externos, que son opcionales.

use anyhow::{Context, Result};
use std::env;

/// Configuración del entorno
#[derive(Debug, Clone)]
pub struct EnvironmentConfig {
    pub environment: String,
    pub port: u16,
    pub host: String,
    pub log_level: String,
    pub cors_origins: Vec<String>,
    /// Sin URL se usa el almacenamiento en memoria
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub redis_url: Option<String>,
    pub dispatch_events_channel: String,
    pub invoice_webhook_url: Option<String>,
    /// Formato: `S1=06:00-14:00,S2=14:00-22:00`
    pub shift_schedule: String,
    pub station_utc_offset_minutes: i32,
}

pub const DEFAULT_SHIFT_SCHEDULE: &str = "S1=06:00-14:00,S2=14:00-22:00,S3=22:00-06:00";
pub const DEFAULT_EVENTS_CHANNEL: &str = "bus_station:dispatch:status_changed";

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            port: 3000,
            host: "0.0.0.0".to_string(),
            log_level: "info".to_string(),
            cors_origins: Vec::new(),
            database_url: None,
            database_max_connections: 20,
            redis_url: None,
            dispatch_events_channel: DEFAULT_EVENTS_CHANNEL.to_string(),
            invoice_webhook_url: None,
            shift_schedule: DEFAULT_SHIFT_SCHEDULE.to_string(),
            station_utc_offset_minutes: 420,
        }
    }
}

impl EnvironmentConfig {
    /// Leer la configuración desde variables de entorno
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        Ok(Self {
            environment: env::var("ENVIRONMENT").unwrap_or(defaults.environment),
            port: parse_var("PORT", defaults.port)?,
            host: env::var("HOST").unwrap_or(defaults.host),
            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            cors_origins: env::var("CORS_ORIGINS")
                .map(|origins| {
                    origins
                        .split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            database_url: non_empty_var("DATABASE_URL"),
            database_max_connections: parse_var(
                "DATABASE_MAX_CONNECTIONS",
                defaults.database_max_connections,
            )?,
            redis_url: non_empty_var("REDIS_URL"),
            dispatch_events_channel: env::var("DISPATCH_EVENTS_CHANNEL")
                .unwrap_or(defaults.dispatch_events_channel),
            invoice_webhook_url: non_empty_var("INVOICE_WEBHOOK_URL"),
            shift_schedule: env::var("SHIFT_SCHEDULE").unwrap_or(defaults.shift_schedule),
            station_utc_offset_minutes: parse_var(
                "STATION_UTC_OFFSET_MINUTES",
                defaults.station_utc_offset_minutes,
            )?,
        })
    }

    /// Obtener la dirección del servidor
    pub fn server_url(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} must be a valid number, got '{}'", name, raw)),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EnvironmentConfig::default();
        assert_eq!(config.environment, "development");
        assert_eq!(config.server_url(), "0.0.0.0:3000");
        assert!(config.database_url.is_none());
    }

    #[test]
    fn test_parse_var_rejects_garbage() {
        env::set_var("BUS_STATION_TEST_PORT", "not-a-port");
        let parsed: Result<u16> = parse_var("BUS_STATION_TEST_PORT", 3000);
        assert!(parsed.is_err());
        env::remove_var("BUS_STATION_TEST_PORT");

        let parsed: Result<u16> = parse_var("BUS_STATION_TEST_PORT", 3000);
        assert_eq!(parsed.unwrap(), 3000);
    }
}
