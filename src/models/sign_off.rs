//! Modelos de SignOff e Incident
//!
//! Ambos los crea el flujo de cliente (colaborador externo). El motor de
//! agregación solo los lee.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::job::JobType;

/// Tipo de incidente que marca un trabajo con daños
pub const DAMAGE_ISSUE_TYPE: &str = "damage";

/// Conformidad firmada por el cliente al cerrar un trabajo
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SignOff {
    pub job_id: Uuid,
    pub job_type: JobType,
    /// Valoración 1-5
    pub rating: Option<i16>,
    pub signed_by: String,
    pub signed_at: DateTime<Utc>,
}

/// Incidente reportado sobre un trabajo
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Incident {
    pub job_id: Uuid,
    pub issue_type: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Incident {
    pub fn is_damage(&self) -> bool {
        self.issue_type.eq_ignore_ascii_case(DAMAGE_ISSUE_TYPE)
    }
}
