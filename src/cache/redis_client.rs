use anyhow::Result;
use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, RedisResult};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, error, info, warn};

use super::{CacheConfig, CacheOperations};

/// Cliente Redis con connection manager y operaciones async
#[derive(Clone)]
pub struct RedisClient {
    manager: ConnectionManager,
    config: CacheConfig,
}

impl RedisClient {
    /// Crear nuevo cliente Redis
    pub async fn new(config: CacheConfig) -> Result<Self> {
        info!("🔗 Conectando a Redis: {}", config.redis_url);

        let client = redis::Client::open(config.redis_url.clone())?;
        let manager = ConnectionManager::new(client).await?;

        // Test de conexión usando un comando simple
        let mut conn = manager.clone();
        let _: () = redis::cmd("PING").query_async(&mut conn).await?;

        info!("✅ Redis conectado exitosamente");

        Ok(Self { manager, config })
    }

    /// Generar clave de cache con prefijo
    fn make_key(&self, prefix: &str, identifier: &str) -> String {
        format!("crew_tracking:{}:{}", prefix, identifier)
    }

    /// Generar clave de reporte EOD
    pub fn eod_report_key(&self, team_id: &str, date: &str) -> String {
        self.make_key("eod_report", &format!("{}:{}", team_id, date))
    }

    pub fn default_ttl(&self) -> u64 {
        self.config.default_ttl
    }

    /// Verificar si Redis está conectado
    pub async fn is_connected(&self) -> bool {
        let mut conn = self.manager.clone();
        match redis::cmd("PING").query_async::<_, String>(&mut conn).await {
            Ok(response) => response == "PONG",
            Err(_) => false,
        }
    }
}

#[async_trait]
impl CacheOperations for RedisClient {
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>> {
        let mut conn = self.manager.clone();

        match conn.get::<_, Option<String>>(key).await {
            Ok(Some(value)) => {
                debug!("📥 Cache HIT para clave: {}", key);
                let deserialized: T = serde_json::from_str(&value)?;
                Ok(Some(deserialized))
            }
            Ok(None) => {
                debug!("❌ Cache MISS para clave: {}", key);
                Ok(None)
            }
            Err(e) => {
                warn!("⚠️ Error leyendo cache para clave {}: {}", key, e);
                Ok(None)
            }
        }
    }

    async fn set<T: Serialize + Send + Sync>(&self, key: &str, value: &T, ttl: u64) -> Result<()> {
        let mut conn = self.manager.clone();

        let serialized = serde_json::to_string(value)?;

        let result: RedisResult<()> = redis::cmd("SETEX")
            .arg(key)
            .arg(ttl)
            .arg(serialized)
            .query_async(&mut conn)
            .await;

        match result {
            Ok(()) => {
                debug!("💾 Cache SET para clave: {} (TTL: {}s)", key, ttl);
                Ok(())
            }
            Err(e) => {
                error!("❌ Error guardando en cache para clave {}: {}", key, e);
                Err(anyhow::anyhow!("Error de Redis: {}", e))
            }
        }
    }
}
