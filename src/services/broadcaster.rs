//! Difusión del estado en vivo
//!
//! Mantiene el registro de observadores con canal push y les reparte cada
//! delta. Un observador roto o lento se retira del registro sin afectar al
//! resto ni a la ingesta. Los clientes sin canal push usan el snapshot.

use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

use crate::dto::tracking_dto::{CrewSnapshot, LiveDelta, LiveSessionView, TrackingSnapshot};
use crate::repositories::TrackingStore;
use crate::services::crew_job_resolver::CrewJobResolver;
use crate::utils::errors::AppResult;

pub type ObserverId = u64;

/// Fallo al entregar un delta a un observador
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("observer channel closed")]
    Closed,

    #[error("observer write timed out after {0:?}")]
    TimedOut(Duration),
}

/// Destino de los deltas de un observador (transporte push)
#[async_trait]
pub trait ObserverSink: Send + Sync {
    async fn deliver(&self, delta: Arc<LiveDelta>) -> Result<(), DeliveryError>;
}

/// Observador respaldado por un canal mpsc acotado
pub struct ChannelSink {
    tx: mpsc::Sender<Arc<LiveDelta>>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<Arc<LiveDelta>>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl ObserverSink for ChannelSink {
    async fn deliver(&self, delta: Arc<LiveDelta>) -> Result<(), DeliveryError> {
        self.tx.send(delta).await.map_err(|_| DeliveryError::Closed)
    }
}

/// Resultado de repartir un delta
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub attempted: usize,
    pub delivered: usize,
    pub removed: usize,
}

pub struct Broadcaster {
    observers: RwLock<HashMap<ObserverId, Arc<dyn ObserverSink>>>,
    next_id: AtomicU64,
    write_timeout: Duration,
    buffer: usize,
    queue: mpsc::UnboundedSender<LiveDelta>,
}

impl Broadcaster {
    /// Crear el broadcaster y lanzar su tarea de reparto.
    ///
    /// Los deltas publicados se reparten en orden desde una única tarea, así
    /// `publish` nunca espera a un observador.
    pub fn spawn(write_timeout: Duration, buffer: usize) -> Arc<Self> {
        let (queue, mut rx) = mpsc::unbounded_channel::<LiveDelta>();
        let broadcaster = Arc::new(Self {
            observers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            write_timeout,
            buffer: buffer.max(1),
            queue,
        });

        let weak = Arc::downgrade(&broadcaster);
        tokio::spawn(async move {
            while let Some(delta) = rx.recv().await {
                let Some(broadcaster) = weak.upgrade() else {
                    break;
                };
                broadcaster.broadcast(delta).await;
            }
            debug!("📴 Tarea de reparto de deltas terminada");
        });

        broadcaster
    }

    /// Registrar un observador con su propio transporte
    pub async fn register(&self, sink: Arc<dyn ObserverSink>) -> ObserverId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut observers = self.observers.write().await;
        observers.insert(id, sink);
        info!("👀 Observador {} conectado ({} activos)", id, observers.len());
        id
    }

    /// Registrar un observador de canal y devolver su receptor
    pub async fn subscribe(&self) -> (ObserverId, mpsc::Receiver<Arc<LiveDelta>>) {
        let (tx, rx) = mpsc::channel(self.buffer);
        let id = self.register(Arc::new(ChannelSink::new(tx))).await;
        (id, rx)
    }

    pub async fn unregister(&self, id: ObserverId) -> bool {
        let removed = self.observers.write().await.remove(&id).is_some();
        if removed {
            debug!("👋 Observador {} desconectado", id);
        }
        removed
    }

    pub async fn observer_count(&self) -> usize {
        self.observers.read().await.len()
    }

    /// Encolar un delta para reparto sin esperar a los observadores
    pub fn publish(&self, delta: LiveDelta) {
        if delta.is_empty() {
            return;
        }
        if self.queue.send(delta).is_err() {
            warn!("⚠️ Cola de reparto cerrada, delta descartado");
        }
    }

    /// Repartir un delta a todos los observadores registrados.
    ///
    /// Cada observador recibe exactamente un intento, acotado por
    /// `write_timeout`. Los que fallan se retiran del registro.
    pub async fn broadcast(&self, delta: LiveDelta) -> BroadcastReport {
        let targets: Vec<(ObserverId, Arc<dyn ObserverSink>)> = self
            .observers
            .read()
            .await
            .iter()
            .map(|(id, sink)| (*id, Arc::clone(sink)))
            .collect();

        if targets.is_empty() {
            return BroadcastReport::default();
        }

        let delta = Arc::new(delta);
        let timeout = self.write_timeout;
        let attempts = targets.into_iter().map(|(id, sink)| {
            let delta = Arc::clone(&delta);
            async move {
                let outcome = match tokio::time::timeout(timeout, sink.deliver(delta)).await {
                    Ok(result) => result,
                    Err(_) => Err(DeliveryError::TimedOut(timeout)),
                };
                (id, outcome)
            }
        });
        let results = join_all(attempts).await;

        let mut report = BroadcastReport {
            attempted: results.len(),
            ..BroadcastReport::default()
        };
        let mut failed = Vec::new();
        for (id, outcome) in results {
            match outcome {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!("⚠️ Observador {} retirado: {}", id, e);
                    failed.push(id);
                }
            }
        }

        if !failed.is_empty() {
            let mut observers = self.observers.write().await;
            for id in failed {
                if observers.remove(&id).is_some() {
                    report.removed += 1;
                }
            }
        }

        report
    }
}

/// Recalcular el snapshot completo `{crews, activeSessions}` desde el store
pub async fn build_snapshot(
    store: &dyn TrackingStore,
    poll_interval: Duration,
) -> AppResult<TrackingSnapshot> {
    let crews = store.list_crews().await?;
    let active_sessions = store.list_active_sessions().await?;

    let mut snapshots = Vec::with_capacity(crews.len());
    for mut crew in crews {
        let resolution = CrewJobResolver::resolve_for_crew(store, crew.id).await?;
        crew.status = resolution.effective_status(crew.status);
        snapshots.push(CrewSnapshot {
            current_job: resolution.current_ref(),
            next_job: resolution.next_ref(),
            crew,
        });
    }

    Ok(TrackingSnapshot {
        crews: snapshots,
        active_sessions,
        generated_at: Utc::now(),
        poll_interval_secs: poll_interval.as_secs(),
    })
}

/// Delta con todas las sesiones activas, enviado al abrir un stream
pub async fn full_delta(store: &dyn TrackingStore) -> AppResult<LiveDelta> {
    let crews = store.list_crews().await?;
    let sessions = store
        .list_active_sessions()
        .await?
        .iter()
        .map(|session| {
            let crew = crews.iter().find(|c| c.id == session.team_id);
            LiveSessionView::new(session, crew)
        })
        .collect();
    Ok(LiveDelta {
        sessions,
        crews: crews.iter().map(Into::into).collect(),
    })
}
