//! Feed en vivo del lado del observador
//!
//! Un solo contrato para todos los observadores (tarjeta del dashboard,
//! capa del mapa, vista unificada): con canal push abierto se consumen
//! deltas y el sondeo queda cancelado; cuando el canal cae o no se puede
//! abrir, el sondeo del snapshot se reanuda a intervalo fijo y se reintenta
//! el canal push en paralelo.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::dto::tracking_dto::{LiveDelta, TrackingSnapshot};
use crate::repositories::TrackingStore;
use crate::services::broadcaster::{build_snapshot, Broadcaster};

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("push channel unavailable: {0}")]
    PushUnavailable(String),

    #[error("snapshot fetch failed: {0}")]
    Snapshot(String),
}

/// Transporte push: abre un canal de deltas
#[async_trait]
pub trait PushSource: Send + Sync {
    async fn connect(&self) -> Result<mpsc::Receiver<Arc<LiveDelta>>, FeedError>;
}

/// Transporte pull: devuelve el snapshot completo
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn fetch(&self) -> Result<TrackingSnapshot, FeedError>;
}

/// Lo que recibe el consumidor del feed
#[derive(Debug, Clone)]
pub enum FeedUpdate {
    Delta(Arc<LiveDelta>),
    Snapshot(Box<TrackingSnapshot>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedMode {
    Connecting,
    Push,
    Polling,
}

pub struct LiveFeed<P, S> {
    push: P,
    snapshot: S,
    poll_interval: Duration,
    reconnect_delay: Duration,
    mode: watch::Sender<FeedMode>,
}

impl<P: PushSource, S: SnapshotSource> LiveFeed<P, S> {
    pub fn new(push: P, snapshot: S, poll_interval: Duration, reconnect_delay: Duration) -> Self {
        let (mode, _) = watch::channel(FeedMode::Connecting);
        Self {
            push,
            snapshot,
            poll_interval,
            reconnect_delay,
            mode,
        }
    }

    /// Observar el modo actual (push o sondeo)
    pub fn mode(&self) -> watch::Receiver<FeedMode> {
        self.mode.subscribe()
    }

    /// Ejecutar el feed hasta que el consumidor suelte `out`
    pub async fn run(self, out: mpsc::Sender<FeedUpdate>) {
        loop {
            match self.push.connect().await {
                Ok(mut rx) => {
                    // Canal abierto: el temporizador de sondeo no existe en esta rama
                    self.mode.send_replace(FeedMode::Push);
                    info!("📡 Canal push abierto, sondeo cancelado");
                    while let Some(delta) = rx.recv().await {
                        if out.send(FeedUpdate::Delta(delta)).await.is_err() {
                            return;
                        }
                    }
                    warn!("⚠️ Canal push cerrado, reanudando sondeo");
                }
                Err(e) => warn!("⚠️ {}", e),
            }

            self.mode.send_replace(FeedMode::Polling);
            if !self.poll_until_reconnect(&out).await {
                return;
            }
        }
    }

    /// Sondear a intervalo fijo hasta que toque reintentar el canal push.
    /// Devuelve `false` si el consumidor se fue.
    async fn poll_until_reconnect(&self, out: &mpsc::Sender<FeedUpdate>) -> bool {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let reconnect = tokio::time::sleep(self.reconnect_delay);
        tokio::pin!(reconnect);

        loop {
            tokio::select! {
                _ = &mut reconnect => return !out.is_closed(),
                _ = ticker.tick() => {
                    match self.snapshot.fetch().await {
                        Ok(snapshot) => {
                            if out.send(FeedUpdate::Snapshot(Box::new(snapshot))).await.is_err() {
                                return false;
                            }
                        }
                        Err(e) => debug!("🔁 Sondeo fallido, se reintenta en el próximo intervalo: {}", e),
                    }
                }
            }
        }
    }
}

/// Canal push en proceso sobre el broadcaster
#[async_trait]
impl PushSource for Arc<Broadcaster> {
    async fn connect(&self) -> Result<mpsc::Receiver<Arc<LiveDelta>>, FeedError> {
        Ok(self.subscribe().await.1)
    }
}

/// Snapshot en proceso leído del store
pub struct StoreSnapshotSource {
    store: Arc<dyn TrackingStore>,
    poll_interval: Duration,
}

impl StoreSnapshotSource {
    pub fn new(store: Arc<dyn TrackingStore>, poll_interval: Duration) -> Self {
        Self { store, poll_interval }
    }
}

#[async_trait]
impl SnapshotSource for StoreSnapshotSource {
    async fn fetch(&self) -> Result<TrackingSnapshot, FeedError> {
        build_snapshot(self.store.as_ref(), self.poll_interval)
            .await
            .map_err(|e| FeedError::Snapshot(e.to_string()))
    }
}
