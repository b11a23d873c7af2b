use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use dotenvy::dotenv;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crew_tracking::cache::{CacheConfig, RedisClient, ReportCache};
use crew_tracking::config::database::DatabaseConfig;
use crew_tracking::config::{EnvironmentConfig, StoreBackend};
use crew_tracking::database::DatabaseConnection;
use crew_tracking::repositories::{MemorySeed, MemoryStore, PgTrackingStore, TrackingStore};
use crew_tracking::{create_router, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    // Cargar variables de entorno
    dotenv().ok();

    // Configurar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("🚚 Crew Tracking - Seguimiento de equipos en vivo");
    info!("================================================");

    let config = EnvironmentConfig::from_env()?;

    // Inicializar el store
    let store: Arc<dyn TrackingStore> = match config.store_backend {
        StoreBackend::Postgres => {
            let db_config = DatabaseConfig::from_env()?;
            let db_connection = match DatabaseConnection::connect(&db_config).await {
                Ok(conn) => conn,
                Err(e) => {
                    error!("❌ Error conectando a la base de datos: {}", e);
                    return Err(anyhow::anyhow!("Error de base de datos: {}", e));
                }
            };
            let pool = db_connection.pool().clone();
            sqlx::migrate!("./migrations").run(&pool).await?;
            info!("✅ Migraciones aplicadas");
            Arc::new(PgTrackingStore::new(pool))
        }
        StoreBackend::Memory => {
            if config.is_production() {
                warn!("⚠️ Store en memoria en producción: configurar STORE_BACKEND=postgres");
            }
            warn!("⚠️ Usando store en memoria: los datos se pierden al reiniciar");
            let store = MemoryStore::new();
            match &config.memory_seed {
                Some(path) => {
                    let raw = tokio::fs::read_to_string(path)
                        .await
                        .with_context(|| format!("No se pudo leer MEMORY_SEED={}", path))?;
                    let seed = MemorySeed::from_json(&raw)
                        .with_context(|| format!("Seed inválido en {}", path))?;
                    let (crews, jobs) = store.load_seed(seed).await;
                    info!("🌱 Seed cargado desde {}: {} equipos, {} trabajos", path, crews, jobs);
                }
                None => warn!("⚠️ Sin MEMORY_SEED: no hay equipos ni trabajos cargados"),
            }
            Arc::new(store)
        }
    };

    // Redis es opcional: sin él los reportes se leen siempre del store
    let mut app_state = AppState::new(store, config.clone());
    if let Some(redis_url) = config.redis_url.clone() {
        let cache_config = CacheConfig {
            redis_url,
            default_ttl: config.report_cache_ttl,
        };
        match RedisClient::new(cache_config).await {
            Ok(client) => {
                let ttl = client.default_ttl();
                app_state = app_state.with_report_cache(ReportCache::new(client, ttl));
            }
            Err(e) => warn!("⚠️ Redis no disponible, cache de reportes deshabilitado: {}", e),
        }
    }

    // Limpieza periódica de locks de equipos sin escrituras en curso
    let gateway = Arc::clone(&app_state.gateway);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(300));
        loop {
            interval.tick().await;
            gateway.locks().prune().await;
        }
    });

    let app = create_router(app_state);

    let addr: SocketAddr = config.server_url().parse()?;

    info!("🌐 Servidor iniciando en http://{}", addr);
    info!("🔍 Endpoints disponibles:");
    info!("   GET  /health - Estado del servicio");
    info!("📍 Seguimiento:");
    info!("   POST /api/tracking/ping - Ingesta de posición/estado");
    info!("   GET  /api/tracking/snapshot - Snapshot completo (sondeo)");
    info!("   GET  /api/tracking/stream - Stream SSE de sesiones");
    info!("   POST /api/tracking/sessions - Iniciar sesión");
    info!("   GET  /api/tracking/sessions/:id - Obtener sesión");
    info!("   POST /api/tracking/sessions/:id/cancel - Cancelar sesión");
    info!("   GET  /api/tracking/crews/:id/jobs - Trabajo actual y siguiente");
    info!("📊 Fin de día:");
    info!("   POST /api/eod/reports/generate - Generar reportes");
    info!("   GET  /api/eod/reports - Consultar reportes");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("❌ Error del servidor: {}", e);
        return Err(e.into());
    }

    info!("👋 Servidor terminado");
    Ok(())
}

/// Señal de apagado graceful
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("❌ No se pudo escuchar Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("❌ No se pudo escuchar SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("🛑 Señal Ctrl+C recibida, apagando servidor...");
        },
        _ = terminate => {
            info!("🛑 Señal de terminación recibida, apagando servidor...");
        },
    }
}
