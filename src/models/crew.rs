//! Modelo de Crew
//!
//! Un equipo de campo (crew) con su última posición conocida. Solo el
//! gateway de ingesta modifica la posición, el estado y `last_update`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use uuid::Uuid;

/// Estado del equipo - mapea al ENUM crew_status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Type, PartialEq, Eq)]
#[sqlx(type_name = "crew_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CrewStatus {
    Standby,
    EnRoute,
}

/// Par latitud/longitud
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

/// Crew principal - mapea a la tabla crews
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Crew {
    pub id: Uuid,
    pub name: String,
    pub members: Vec<String>,
    pub status: CrewStatus,
    pub current_lat: Option<f64>,
    pub current_lng: Option<f64>,
    pub current_job_id: Option<Uuid>,
    pub last_update: Option<DateTime<Utc>>,
}

impl Crew {
    pub fn new(name: impl Into<String>, members: Vec<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            members,
            status: CrewStatus::Standby,
            current_lat: None,
            current_lng: None,
            current_job_id: None,
            last_update: None,
        }
    }

    /// Última posición conocida, si la hay
    pub fn position(&self) -> Option<LatLng> {
        match (self.current_lat, self.current_lng) {
            (Some(lat), Some(lng)) => Some(LatLng { lat, lng }),
            _ => None,
        }
    }
}
