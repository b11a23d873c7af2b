//! Configuración de variables de entorno
//!
//! Este módulo maneja la configuración del entorno y variables de configuración.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

/// Errores al leer la configuración
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} must be set")]
    Missing { name: &'static str },

    #[error("{name} has an invalid value: '{value}'")]
    Invalid { name: &'static str, value: String },
}

/// Qué reloj sella los checkpoints de una sesión
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampAuthority {
    /// Hora de recepción en el servidor (por defecto)
    Receipt,
    /// Hora reportada por el dispositivo del equipo
    Device,
}

impl FromStr for TimestampAuthority {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "receipt" | "server" => Ok(Self::Receipt),
            "device" | "client" => Ok(Self::Device),
            _ => Err(()),
        }
    }
}

/// Backend de almacenamiento del estado de seguimiento
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    Postgres,
}

impl FromStr for StoreBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            _ => Err(()),
        }
    }
}

/// Configuración del entorno
#[derive(Debug, Clone)]
pub struct EnvironmentConfig {
    pub environment: String,
    pub port: u16,
    pub host: String,
    pub cors_origins: Vec<String>,
    pub store_backend: StoreBackend,
    /// Archivo JSON con crews y jobs iniciales para el store en memoria
    pub memory_seed: Option<String>,
    pub redis_url: Option<String>,
    pub report_cache_ttl: u64,
    /// Intervalo fijo de sondeo para observadores sin canal push
    pub poll_interval: Duration,
    /// Tiempo máximo de escritura hacia un observador antes de retirarlo
    pub observer_write_timeout: Duration,
    pub observer_buffer: usize,
    pub checkpoint_timestamps: TimestampAuthority,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            port: 3000,
            host: "0.0.0.0".to_string(),
            cors_origins: Vec::new(),
            store_backend: StoreBackend::Memory,
            memory_seed: None,
            redis_url: None,
            report_cache_ttl: 86_400,
            poll_interval: Duration::from_secs(15),
            observer_write_timeout: Duration::from_millis(500),
            observer_buffer: 64,
            checkpoint_timestamps: TimestampAuthority::Receipt,
        }
    }
}

impl EnvironmentConfig {
    /// Leer la configuración de las variables de entorno, con valores por defecto
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        Ok(Self {
            environment: env::var("ENVIRONMENT").unwrap_or(defaults.environment),
            port: parse_var("PORT", defaults.port)?,
            host: env::var("HOST").unwrap_or(defaults.host),
            cors_origins: env::var("CORS_ORIGINS")
                .map(|raw| {
                    raw.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            store_backend: parse_var("STORE_BACKEND", defaults.store_backend)?,
            memory_seed: env::var("MEMORY_SEED").ok().filter(|path| !path.trim().is_empty()),
            redis_url: env::var("REDIS_URL").ok().filter(|url| !url.trim().is_empty()),
            report_cache_ttl: parse_var("REPORT_CACHE_TTL", defaults.report_cache_ttl)?,
            poll_interval: Duration::from_secs(parse_var(
                "POLL_INTERVAL_SECS",
                defaults.poll_interval.as_secs(),
            )?),
            observer_write_timeout: Duration::from_millis(parse_var(
                "OBSERVER_WRITE_TIMEOUT_MS",
                defaults.observer_write_timeout.as_millis() as u64,
            )?),
            observer_buffer: parse_var("OBSERVER_BUFFER", defaults.observer_buffer)?,
            checkpoint_timestamps: parse_var(
                "CHECKPOINT_TIMESTAMPS",
                defaults.checkpoint_timestamps,
            )?,
        })
    }

    /// Verificar si estamos en modo desarrollo
    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }

    /// Verificar si estamos en modo producción
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Obtener la URL del servidor
    pub fn server_url(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_var<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        Err(_) => Ok(default),
    }
}
