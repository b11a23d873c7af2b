//! Gateway de ingesta de posiciones
//!
//! Recibe los pings `{team_id, lat, lng, status, timestamp}` de los equipos,
//! los valida y los aplica al crew y, si corresponde, a su sesión activa.
//! Las escrituras de un mismo equipo se serializan con `CrewLocks`; equipos
//! distintos avanzan en paralelo.

use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::config::TimestampAuthority;
use crate::dto::tracking_dto::{
    CheckpointDisposition, LiveCrewView, LiveDelta, LiveSessionView, PingRequest, PingResponse,
};
use crate::models::{Checkpoint, Crew, CrewStatus, TrackingSession, TrackingStatus};
use crate::repositories::{PingWrite, TrackingStore};
use crate::services::broadcaster::Broadcaster;
use crate::services::crew_job_resolver::CrewJobResolver;
use crate::services::crew_locks::CrewLocks;
use crate::services::session_machine::{start_session, Transition, TransitionError};
use crate::utils::errors::{conflict_error, not_found_error, validation_error, AppError, AppResult};
use crate::utils::validation::{validate_latitude, validate_longitude};

/// Fuente de la hora de recepción
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Estado reportado por el dispositivo
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PingStatus {
    /// Solo posición, nunca genera checkpoint
    Standby,
    Session(TrackingStatus),
}

impl FromStr for PingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("standby") {
            return Ok(PingStatus::Standby);
        }
        s.parse().map(PingStatus::Session)
    }
}

impl fmt::Display for PingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PingStatus::Standby => f.write_str("standby"),
            PingStatus::Session(status) => status.fmt(f),
        }
    }
}

/// Ping ya validado
#[derive(Debug, Clone, PartialEq)]
pub struct PositionPing {
    pub team_id: Uuid,
    pub lat: f64,
    pub lng: f64,
    pub status: PingStatus,
    pub timestamp: DateTime<Utc>,
}

impl PositionPing {
    pub fn validate(&self) -> AppResult<()> {
        validate_latitude(self.lat).map_err(|_| validation_error("lat", "latitude must be within [-90, 90]"))?;
        validate_longitude(self.lng)
            .map_err(|_| validation_error("lng", "longitude must be within [-180, 180]"))?;
        Ok(())
    }
}

impl TryFrom<PingRequest> for PositionPing {
    type Error = AppError;

    fn try_from(request: PingRequest) -> Result<Self, Self::Error> {
        request.validate()?;

        // `required` ya garantizó que los campos existen
        let (Some(team_id), Some(lat), Some(lng), Some(status), Some(timestamp)) = (
            request.team_id,
            request.lat,
            request.lng,
            request.status,
            request.timestamp,
        ) else {
            return Err(validation_error("ping", "all fields are required"));
        };

        let status = status
            .parse::<PingStatus>()
            .map_err(|e| validation_error("status", &e))?;

        let ping = PositionPing {
            team_id,
            lat,
            lng,
            status,
            timestamp,
        };
        ping.validate()?;
        Ok(ping)
    }
}

/// Resultado de la ingesta de un ping
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    Accepted {
        crew_status: CrewStatus,
        current_job_id: Option<Uuid>,
        session_id: Option<Uuid>,
        checkpoint: CheckpointDisposition,
    },
    /// Timestamp no posterior a la última actualización: sin mutación
    Stale { last_update: DateTime<Utc> },
}

impl From<IngestOutcome> for PingResponse {
    fn from(outcome: IngestOutcome) -> Self {
        match outcome {
            IngestOutcome::Accepted {
                crew_status,
                current_job_id,
                session_id,
                checkpoint,
            } => PingResponse {
                accepted: true,
                reason: None,
                crew_status: Some(crew_status),
                current_job_id,
                session_id,
                checkpoint: Some(checkpoint),
                last_update: None,
            },
            IngestOutcome::Stale { last_update } => PingResponse {
                accepted: false,
                reason: Some("stale".to_string()),
                crew_status: None,
                current_job_id: None,
                session_id: None,
                checkpoint: None,
                last_update: Some(last_update),
            },
        }
    }
}

pub struct IngestionGateway {
    store: Arc<dyn TrackingStore>,
    broadcaster: Arc<Broadcaster>,
    locks: CrewLocks,
    timestamps: TimestampAuthority,
    clock: Arc<dyn Clock>,
}

impl IngestionGateway {
    pub fn new(
        store: Arc<dyn TrackingStore>,
        broadcaster: Arc<Broadcaster>,
        timestamps: TimestampAuthority,
    ) -> Self {
        Self::with_clock(store, broadcaster, timestamps, Arc::new(SystemClock))
    }

    pub fn with_clock(
        store: Arc<dyn TrackingStore>,
        broadcaster: Arc<Broadcaster>,
        timestamps: TimestampAuthority,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            broadcaster,
            locks: CrewLocks::new(),
            timestamps,
            clock,
        }
    }

    pub fn locks(&self) -> &CrewLocks {
        &self.locks
    }

    /// Aplicar un ping validado. Todo o nada: si algo falla antes de
    /// persistir, ni el crew ni la sesión cambian.
    pub async fn ingest(&self, ping: PositionPing) -> AppResult<IngestOutcome> {
        ping.validate()?;
        let _guard = self.locks.acquire(ping.team_id).await;

        let mut crew = self
            .store
            .find_crew(ping.team_id)
            .await?
            .ok_or_else(|| not_found_error("Crew", &ping.team_id.to_string()))?;

        if let Some(last_update) = crew.last_update {
            if ping.timestamp <= last_update {
                warn!(
                    "⏪ Ping viejo descartado para crew {} ({} <= {})",
                    crew.id, ping.timestamp, last_update
                );
                return Ok(IngestOutcome::Stale { last_update });
            }
        }

        let resolution = CrewJobResolver::resolve_for_crew(self.store.as_ref(), crew.id).await?;
        let mut session = self
            .store
            .active_session_for_crew(crew.id)
            .await?
            .filter(|s| Some(s.job_id) == resolution.current_job_id());

        let disposition = match (ping.status, session.as_mut()) {
            (PingStatus::Standby, _) => CheckpointDisposition::PositionOnly,
            (PingStatus::Session(_), None) => {
                debug!("📍 Crew {} sin sesión activa, solo posición", crew.id);
                CheckpointDisposition::NoSession
            }
            (PingStatus::Session(status), Some(active)) => {
                let timestamp = self.checkpoint_timestamp(&ping, active);
                let checkpoint = Checkpoint::new(status, timestamp).at(ping.lat, ping.lng);
                match active.apply_checkpoint(checkpoint) {
                    Ok(transition) => {
                        log_transition(active, transition);
                        CheckpointDisposition::Appended
                    }
                    Err(e) => {
                        warn!("⚠️ Checkpoint descartado en sesión {}: {}", active.id, e);
                        CheckpointDisposition::Rejected
                    }
                }
            }
        };

        crew.current_lat = Some(ping.lat);
        crew.current_lng = Some(ping.lng);
        crew.last_update = Some(ping.timestamp);
        crew.current_job_id = resolution.current_job_id();
        crew.status = derive_crew_status(resolution.base_status(), ping.status);

        let touched_session = match disposition {
            CheckpointDisposition::Appended => session.as_ref(),
            _ => None,
        };
        let write = self.store.apply_ping(&crew, touched_session).await?;
        if let PingWrite::Stale { last_update } = write {
            warn!(
                "⏪ Ping viejo descartado al guardar para crew {} ({} <= {})",
                crew.id, ping.timestamp, last_update
            );
            return Ok(IngestOutcome::Stale { last_update });
        }

        self.broadcaster.publish(LiveDelta {
            sessions: touched_session
                .map(|s| vec![LiveSessionView::new(s, Some(&crew))])
                .unwrap_or_default(),
            crews: vec![LiveCrewView::from(&crew)],
        });

        Ok(IngestOutcome::Accepted {
            crew_status: crew.status,
            current_job_id: crew.current_job_id,
            session_id: session.as_ref().map(|s| s.id),
            checkpoint: disposition,
        })
    }

    /// Arrancar la sesión de un equipo sobre un trabajo asignado.
    ///
    /// Si el equipo ya tiene una sesión abierta para ese mismo trabajo se
    /// devuelve esa; si es para otro trabajo, conflicto.
    pub async fn start_session(&self, job_id: Uuid, team_id: Uuid) -> AppResult<TrackingSession> {
        let _guard = self.locks.acquire(team_id).await;

        let crew = self
            .store
            .find_crew(team_id)
            .await?
            .ok_or_else(|| not_found_error("Crew", &team_id.to_string()))?;
        let job = self
            .store
            .find_job(job_id)
            .await?
            .ok_or_else(|| not_found_error("Job", &job_id.to_string()))?;

        if job.crew_id != Some(team_id) {
            return Err(AppError::Conflict(format!(
                "job '{}' is not assigned to crew '{}'",
                job.display_id, crew.name
            )));
        }
        if job.status.is_terminal() {
            return Err(AppError::Conflict(format!(
                "job '{}' is already {:?}",
                job.display_id, job.status
            )));
        }

        if let Some(active) = self.store.active_session_for_crew(team_id).await? {
            if active.job_id == job_id {
                return Ok(active);
            }
            return Err(conflict_error(
                "Active tracking session",
                "crew",
                &crew.name,
            ));
        }

        let session = start_session(&job, team_id, self.clock.now());
        self.store.insert_session(&session).await?;
        info!(
            "🚚 Sesión {} iniciada: crew {} sobre {} {}",
            session.id, crew.name, job.job_type, job.display_id
        );

        self.broadcaster.publish(LiveDelta {
            sessions: vec![LiveSessionView::new(&session, Some(&crew))],
            crews: Vec::new(),
        });

        Ok(session)
    }

    /// Cancelar una sesión no terminal
    pub async fn cancel_session(&self, session_id: Uuid, note: Option<String>) -> AppResult<TrackingSession> {
        let team_id = self
            .store
            .find_session(session_id)
            .await?
            .ok_or_else(|| not_found_error("TrackingSession", &session_id.to_string()))?
            .team_id;

        let _guard = self.locks.acquire(team_id).await;

        // Releer bajo el lock del equipo
        let mut session = self
            .store
            .find_session(session_id)
            .await?
            .ok_or_else(|| not_found_error("TrackingSession", &session_id.to_string()))?;

        let timestamp = self.clock.now().max(session.checkpoint_floor());
        let mut checkpoint = Checkpoint::new(TrackingStatus::Cancelled, timestamp);
        if let Some(note) = note.filter(|n| !n.trim().is_empty()) {
            checkpoint = checkpoint.with_note(note);
        }

        let transition = session.apply_checkpoint(checkpoint).map_err(|e| match e {
            TransitionError::Terminal { .. } => AppError::Conflict(e.to_string()),
            other => AppError::BadRequest(other.to_string()),
        })?;
        log_transition(&session, transition);

        self.store.save_session(&session).await?;

        let crew = self.store.find_crew(team_id).await?;
        self.broadcaster.publish(LiveDelta {
            sessions: vec![LiveSessionView::new(&session, crew.as_ref())],
            crews: Vec::new(),
        });

        Ok(session)
    }

    fn checkpoint_timestamp(&self, ping: &PositionPing, session: &TrackingSession) -> DateTime<Utc> {
        match self.timestamps {
            TimestampAuthority::Device => ping.timestamp,
            // El reloj del servidor no debe retroceder dentro de una sesión
            TimestampAuthority::Receipt => self.clock.now().max(session.checkpoint_floor()),
        }
    }
}

/// Estado del crew tras un ping: en ruta solo con trabajo actual y un
/// estado de sesión activo.
fn derive_crew_status(base: CrewStatus, status: PingStatus) -> CrewStatus {
    match (base, status) {
        (CrewStatus::EnRoute, PingStatus::Session(s)) if !s.is_terminal() => CrewStatus::EnRoute,
        _ => CrewStatus::Standby,
    }
}

fn log_transition(session: &TrackingSession, transition: Transition) {
    if transition.reached_terminal() {
        info!(
            "🏁 Sesión {} terminada como {} ({} checkpoints)",
            session.id,
            transition.to,
            session.checkpoints.len()
        );
    } else if transition.is_status_change() {
        info!("🔄 Sesión {}: {} -> {}", session.id, transition.from, transition.to);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Job, JobType};
    use crate::repositories::MemoryStore;
    use chrono::{Duration as ChronoDuration, NaiveDate, TimeZone};
    use std::sync::Mutex;
    use std::time::Duration;

    struct FixedClock(Mutex<DateTime<Utc>>);

    impl FixedClock {
        fn new(at: DateTime<Utc>) -> Arc<Self> {
            Arc::new(Self(Mutex::new(at)))
        }

        fn set(&self, at: DateTime<Utc>) {
            *self.0.lock().unwrap() = at;
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            *self.0.lock().unwrap()
        }
    }

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, h, m, 0).unwrap()
    }

    struct Fixture {
        store: MemoryStore,
        gateway: IngestionGateway,
        broadcaster: Arc<Broadcaster>,
        clock: Arc<FixedClock>,
        crew: Crew,
        job: Job,
    }

    async fn fixture(timestamps: TimestampAuthority) -> Fixture {
        let store = MemoryStore::new();
        let crew = Crew::new("Alpha", vec!["Ana".into(), "Luis".into()]);
        let job = Job::new(JobType::Move, "MV-1001", Some(crew.id))
            .scheduled(NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(), None);
        store.insert_crew(crew.clone()).await;
        store.insert_job(job.clone()).await;

        let broadcaster = Broadcaster::spawn(Duration::from_millis(100), 16);
        let clock = FixedClock::new(at(9, 55));
        let gateway = IngestionGateway::with_clock(
            Arc::new(store.clone()),
            Arc::clone(&broadcaster),
            timestamps,
            clock.clone(),
        );
        Fixture {
            store,
            gateway,
            broadcaster,
            clock,
            crew,
            job,
        }
    }

    fn ping(team_id: Uuid, status: PingStatus, timestamp: DateTime<Utc>) -> PositionPing {
        PositionPing {
            team_id,
            lat: 45.5,
            lng: -73.6,
            status,
            timestamp,
        }
    }

    #[tokio::test]
    async fn test_stale_ping_does_not_mutate_crew() {
        let f = fixture(TimestampAuthority::Device).await;
        f.gateway
            .ingest(ping(f.crew.id, PingStatus::Standby, at(10, 0)))
            .await
            .unwrap();

        let mut old = ping(f.crew.id, PingStatus::Standby, at(9, 59));
        old.lat = 10.0;
        let outcome = f.gateway.ingest(old).await.unwrap();
        assert_eq!(outcome, IngestOutcome::Stale { last_update: at(10, 0) });

        let same = ping(f.crew.id, PingStatus::Session(TrackingStatus::EnRoute), at(10, 0));
        assert!(matches!(f.gateway.ingest(same).await.unwrap(), IngestOutcome::Stale { .. }));

        let crew = f.store.find_crew(f.crew.id).await.unwrap().unwrap();
        assert_eq!(crew.current_lat, Some(45.5));
        assert_eq!(crew.last_update, Some(at(10, 0)));
    }

    #[tokio::test]
    async fn test_ping_without_session_is_position_only() {
        let f = fixture(TimestampAuthority::Device).await;
        let outcome = f
            .gateway
            .ingest(ping(f.crew.id, PingStatus::Session(TrackingStatus::EnRoute), at(10, 0)))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            IngestOutcome::Accepted {
                crew_status: CrewStatus::EnRoute,
                current_job_id: Some(f.job.id),
                session_id: None,
                checkpoint: CheckpointDisposition::NoSession,
            }
        );
        assert!(f.store.active_session_for_crew(f.crew.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_checkpoints_follow_session_lifecycle() {
        let f = fixture(TimestampAuthority::Device).await;
        let session = f.gateway.start_session(f.job.id, f.crew.id).await.unwrap();

        for (status, minute) in [
            (TrackingStatus::EnRoute, 0),
            (TrackingStatus::Arrived, 20),
            (TrackingStatus::InProgress, 25),
        ] {
            let outcome = f
                .gateway
                .ingest(ping(f.crew.id, PingStatus::Session(status), at(10, minute)))
                .await
                .unwrap();
            assert!(matches!(
                outcome,
                IngestOutcome::Accepted { checkpoint: CheckpointDisposition::Appended, .. }
            ));
        }

        // Retroceso: se descarta el checkpoint pero la posición se actualiza
        let outcome = f
            .gateway
            .ingest(ping(f.crew.id, PingStatus::Session(TrackingStatus::EnRoute), at(10, 30)))
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            IngestOutcome::Accepted { checkpoint: CheckpointDisposition::Rejected, .. }
        ));

        f.gateway
            .ingest(ping(f.crew.id, PingStatus::Session(TrackingStatus::Completed), at(11, 5)))
            .await
            .unwrap();

        let stored = f.store.find_session(session.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TrackingStatus::Completed);
        assert_eq!(stored.checkpoints.len(), 4);
        assert_eq!(stored.completed_at, Some(at(11, 5)));

        let crew = f.store.find_crew(f.crew.id).await.unwrap().unwrap();
        assert_eq!(crew.status, CrewStatus::Standby);
        assert_eq!(crew.last_update, Some(at(11, 5)));
    }

    #[tokio::test]
    async fn test_receipt_timestamps_ignore_device_clock() {
        let f = fixture(TimestampAuthority::Receipt).await;
        f.gateway.start_session(f.job.id, f.crew.id).await.unwrap();

        f.clock.set(at(10, 2));
        // Dispositivo adelantado una hora
        f.gateway
            .ingest(ping(
                f.crew.id,
                PingStatus::Session(TrackingStatus::EnRoute),
                at(10, 0) + ChronoDuration::hours(1),
            ))
            .await
            .unwrap();

        let session = f.store.active_session_for_crew(f.crew.id).await.unwrap().unwrap();
        assert_eq!(session.checkpoints[0].timestamp, at(10, 2));
    }

    #[tokio::test]
    async fn test_standby_ping_never_creates_checkpoint() {
        let f = fixture(TimestampAuthority::Device).await;
        let session = f.gateway.start_session(f.job.id, f.crew.id).await.unwrap();

        let outcome = f
            .gateway
            .ingest(ping(f.crew.id, PingStatus::Standby, at(10, 0)))
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            IngestOutcome::Accepted {
                crew_status: CrewStatus::Standby,
                checkpoint: CheckpointDisposition::PositionOnly,
                ..
            }
        ));
        let stored = f.store.find_session(session.id).await.unwrap().unwrap();
        assert!(stored.checkpoints.is_empty());
    }

    #[tokio::test]
    async fn test_second_session_for_busy_crew_conflicts() {
        let f = fixture(TimestampAuthority::Device).await;
        let other = Job::new(JobType::Delivery, "DL-7", Some(f.crew.id));
        f.store.insert_job(other.clone()).await;

        let first = f.gateway.start_session(f.job.id, f.crew.id).await.unwrap();
        let again = f.gateway.start_session(f.job.id, f.crew.id).await.unwrap();
        assert_eq!(first.id, again.id);

        let err = f.gateway.start_session(other.id, f.crew.id).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_cancel_is_terminal() {
        let f = fixture(TimestampAuthority::Receipt).await;
        let session = f.gateway.start_session(f.job.id, f.crew.id).await.unwrap();

        let cancelled = f
            .gateway
            .cancel_session(session.id, Some("client rescheduled".into()))
            .await
            .unwrap();
        assert_eq!(cancelled.status, TrackingStatus::Cancelled);
        assert!(cancelled.completed_at.is_some());

        let err = f.gateway.cancel_session(session.id, None).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_accepted_ping_is_broadcast() {
        let f = fixture(TimestampAuthority::Device).await;
        let (_, mut rx) = f.broadcaster.subscribe().await;

        f.gateway
            .ingest(ping(f.crew.id, PingStatus::Standby, at(10, 0)))
            .await
            .unwrap();
        let delta = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(delta.crews.len(), 1);
        assert_eq!(delta.crews[0].id, f.crew.id);

        // Un ping viejo no emite nada
        f.gateway
            .ingest(ping(f.crew.id, PingStatus::Standby, at(9, 0)))
            .await
            .unwrap();
        assert!(tokio::time::timeout(Duration::from_millis(50), rx.recv()).await.is_err());
    }

    #[test]
    fn test_ping_request_validation() {
        let valid = PingRequest {
            team_id: Some(Uuid::new_v4()),
            lat: Some(45.0),
            lng: Some(-73.0),
            status: Some("en_route".into()),
            timestamp: Some(at(10, 0)),
        };
        assert!(PositionPing::try_from(valid.clone()).is_ok());

        let mut missing = valid.clone();
        missing.timestamp = None;
        assert!(matches!(PositionPing::try_from(missing), Err(AppError::Validation(_))));

        let mut bad_lat = valid.clone();
        bad_lat.lat = Some(123.0);
        assert!(matches!(PositionPing::try_from(bad_lat), Err(AppError::Validation(_))));

        let mut bad_status = valid;
        bad_status.status = Some("teleporting".into());
        assert!(matches!(PositionPing::try_from(bad_status), Err(AppError::Validation(_))));
    }
}
