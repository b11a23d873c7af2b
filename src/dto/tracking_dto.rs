use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::{
    Crew, CrewStatus, JobRef, JobType, LatLng, TrackingSession, TrackingStatus,
};

// Request para el ping de posición/estado del dispositivo del equipo
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct PingRequest {
    #[validate(required)]
    pub team_id: Option<Uuid>,

    #[validate(required, range(min = -90.0, max = 90.0))]
    pub lat: Option<f64>,

    #[validate(required, range(min = -180.0, max = 180.0))]
    pub lng: Option<f64>,

    #[validate(required, length(min = 1, max = 32))]
    pub status: Option<String>,

    #[validate(required)]
    pub timestamp: Option<DateTime<Utc>>,
}

// Qué pasó con el checkpoint de un ping aceptado
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointDisposition {
    Appended,
    Rejected,
    NoSession,
    PositionOnly,
}

// Respuesta del endpoint de ingesta
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingResponse {
    pub accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crew_status: Option<CrewStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_job_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<CheckpointDisposition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_update: Option<DateTime<Utc>>,
}

// Request para arrancar la sesión de un equipo sobre un trabajo
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StartSessionRequest {
    pub job_id: Uuid,
    pub team_id: Uuid,
}

// Request para cancelar una sesión
#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate)]
pub struct CancelSessionRequest {
    #[validate(length(max = 500))]
    pub note: Option<String>,
}

// Vista en vivo de una sesión, tal como viaja por el stream
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LiveSessionView {
    pub id: Uuid,
    #[serde(rename = "jobId")]
    pub job_id: Uuid,
    pub job_type: JobType,
    pub status: TrackingStatus,
    #[serde(rename = "teamName")]
    pub team_name: String,
    pub team_id: Uuid,
    #[serde(rename = "lastLocation")]
    pub last_location: Option<LatLng>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
    #[serde(rename = "detailHref")]
    pub detail_href: String,
}

impl LiveSessionView {
    pub fn new(session: &TrackingSession, crew: Option<&Crew>) -> Self {
        Self {
            id: session.id,
            job_id: session.job_id,
            job_type: session.job_type,
            status: session.status,
            team_name: crew.map(|c| c.name.clone()).unwrap_or_default(),
            team_id: session.team_id,
            last_location: session
                .last_location()
                .or_else(|| crew.and_then(Crew::position)),
            updated_at: session.updated_at,
            detail_href: format!("/api/tracking/sessions/{}", session.id),
        }
    }
}

// Vista en vivo de un equipo (posición y estado)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LiveCrewView {
    pub id: Uuid,
    pub name: String,
    pub status: CrewStatus,
    pub position: Option<LatLng>,
    pub current_job_id: Option<Uuid>,
    pub last_update: Option<DateTime<Utc>>,
}

impl From<&Crew> for LiveCrewView {
    fn from(crew: &Crew) -> Self {
        Self {
            id: crew.id,
            name: crew.name.clone(),
            status: crew.status,
            position: crew.position(),
            current_job_id: crew.current_job_id,
            last_update: crew.last_update,
        }
    }
}

// Delta emitido a los observadores: solo las entradas afectadas
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LiveDelta {
    pub sessions: Vec<LiveSessionView>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub crews: Vec<LiveCrewView>,
}

impl LiveDelta {
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty() && self.crews.is_empty()
    }
}

// Equipo dentro del snapshot, con la resolución de trabajo actual/siguiente
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrewSnapshot {
    #[serde(flatten)]
    pub crew: Crew,
    #[serde(rename = "currentJob")]
    pub current_job: Option<JobRef>,
    #[serde(rename = "nextJob")]
    pub next_job: Option<JobRef>,
}

// Snapshot completo para los clientes que sondean
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingSnapshot {
    pub crews: Vec<CrewSnapshot>,
    pub active_sessions: Vec<TrackingSession>,
    pub generated_at: DateTime<Utc>,
    pub poll_interval_secs: u64,
}

// Resolución de trabajos de un equipo para la tarjeta del dashboard
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrewJobsResponse {
    pub team_id: Uuid,
    pub status: CrewStatus,
    pub current_job: Option<JobRef>,
    pub next_job: Option<JobRef>,
}
