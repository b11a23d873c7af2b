//! Modelo de TrackingSession
//!
//! Una sesión registra el progreso de un equipo a través de un trabajo,
//! desde que arranca hasta su estado terminal. Los checkpoints se guardan
//! en orden de timestamp no decreciente.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::Type;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::crew::LatLng;
use super::job::JobType;

/// Estado de seguimiento - mapea al ENUM tracking_status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Type, PartialEq, Eq, Hash)]
#[sqlx(type_name = "tracking_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TrackingStatus {
    NotStarted,
    EnRoute,
    Arrived,
    InProgress,
    Completed,
    Cancelled,
}

impl TrackingStatus {
    /// Posición en la secuencia lineal; `Cancelled` queda fuera de ella
    pub fn rank(&self) -> Option<u8> {
        match self {
            TrackingStatus::NotStarted => Some(0),
            TrackingStatus::EnRoute => Some(1),
            TrackingStatus::Arrived => Some(2),
            TrackingStatus::InProgress => Some(3),
            TrackingStatus::Completed => Some(4),
            TrackingStatus::Cancelled => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TrackingStatus::Completed | TrackingStatus::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TrackingStatus::NotStarted => "not_started",
            TrackingStatus::EnRoute => "en_route",
            TrackingStatus::Arrived => "arrived",
            TrackingStatus::InProgress => "in_progress",
            TrackingStatus::Completed => "completed",
            TrackingStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TrackingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrackingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "not_started" => Ok(TrackingStatus::NotStarted),
            "en_route" => Ok(TrackingStatus::EnRoute),
            "arrived" => Ok(TrackingStatus::Arrived),
            "in_progress" => Ok(TrackingStatus::InProgress),
            "completed" => Ok(TrackingStatus::Completed),
            "cancelled" => Ok(TrackingStatus::Cancelled),
            other => Err(format!("unknown tracking status '{}'", other)),
        }
    }
}

/// Registro de estado/posición con timestamp dentro de una sesión
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Checkpoint {
    pub status: TrackingStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lng: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl Checkpoint {
    pub fn new(status: TrackingStatus, timestamp: DateTime<Utc>) -> Self {
        Self {
            status,
            timestamp,
            lat: None,
            lng: None,
            note: None,
        }
    }

    pub fn at(mut self, lat: f64, lng: f64) -> Self {
        self.lat = Some(lat);
        self.lng = Some(lng);
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn location(&self) -> Option<LatLng> {
        match (self.lat, self.lng) {
            (Some(lat), Some(lng)) => Some(LatLng { lat, lng }),
            _ => None,
        }
    }
}

/// Sesión de seguimiento de un equipo sobre un trabajo
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingSession {
    pub id: Uuid,
    pub job_id: Uuid,
    pub job_type: JobType,
    pub team_id: Uuid,
    pub status: TrackingStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub checkpoints: Vec<Checkpoint>,
    pub updated_at: DateTime<Utc>,
}

impl TrackingSession {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn last_checkpoint(&self) -> Option<&Checkpoint> {
        self.checkpoints.last()
    }

    /// Última posición registrada en un checkpoint
    pub fn last_location(&self) -> Option<LatLng> {
        self.checkpoints.iter().rev().find_map(Checkpoint::location)
    }
}
