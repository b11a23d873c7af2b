//! Cache
//!
//! Este módulo contiene el cache Redis de reportes EOD ya generados.

pub mod cache_config;
pub mod redis_client;
pub mod report_cache;

pub use cache_config::CacheConfig;
pub use redis_client::RedisClient;
pub use report_cache::ReportCache;

use anyhow::Result;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

/// Operaciones de cache clave/valor serializadas en JSON
#[async_trait]
pub trait CacheOperations {
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>>;
    async fn set<T: Serialize + Send + Sync>(&self, key: &str, value: &T, ttl: u64) -> Result<()>;
}
