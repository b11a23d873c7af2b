//! Modelo de EODReport
//!
//! Instantánea diaria de rendimiento por equipo. Una vez generada no se
//! modifica: regenerar reemplaza el reporte completo.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::job::{JobRef, JobType};
use super::session::TrackingStatus;

/// Resumen agregado del día
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EodSummary {
    pub jobs_completed: u32,
    pub jobs_cancelled: u32,
    pub sign_offs: u32,
    /// Porcentaje 0-100, 0 sin trabajos completados
    pub sign_off_rate: u32,
    /// Minutos promedio por trabajo completado, 0 sin trabajos completados
    pub avg_duration: i64,
    pub total_minutes: i64,
    pub drive_minutes: i64,
    pub loading_minutes: i64,
    pub unloading_minutes: i64,
    pub average_satisfaction: Option<f64>,
    pub damage_count: u32,
    /// Sesiones con datos inconsistentes (duración negativa recortada a 0)
    pub corrupted_sessions: u32,
}

/// Trabajo enriquecido para el detalle del reporte
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EodJobEntry {
    pub job_id: Uuid,
    pub session_id: Uuid,
    pub display_id: Option<String>,
    pub client_name: Option<String>,
    pub job_type: JobType,
    pub status: TrackingStatus,
    pub duration_minutes: i64,
    pub drive_minutes: i64,
    pub loading_minutes: i64,
    pub unloading_minutes: i64,
    pub signed_off: bool,
    pub rating: Option<i16>,
    pub has_damage: bool,
    pub data_warning: bool,
}

/// Banderas de preparación que el equipo marca al cerrar el día
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct ReadinessFlags {
    pub truck_clean: bool,
    pub equipment_returned: bool,
    pub fuel_topped_up: bool,
}

/// Gasto declarado por el equipo
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Expense {
    pub category: String,
    pub amount: Decimal,
    pub note: Option<String>,
}

/// Datos de cierre que el equipo envía por su cuenta (colaborador externo)
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CrewEodInput {
    pub team_id: Uuid,
    pub report_date: NaiveDate,
    pub crew_note: Option<String>,
    pub readiness: ReadinessFlags,
    pub expenses: Vec<Expense>,
}

/// Reporte de fin de día por equipo y fecha
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EodReport {
    pub id: Uuid,
    pub team_id: Uuid,
    pub team_name: String,
    pub report_date: NaiveDate,
    pub summary: EodSummary,
    pub jobs: Vec<EodJobEntry>,
    pub crew_note: Option<String>,
    pub readiness: ReadinessFlags,
    pub expenses: Vec<Expense>,
    /// Próximo trabajo del equipo al momento de generar el reporte
    pub next_job: Option<JobRef>,
    pub generated_at: DateTime<Utc>,
    /// Presente cuando el cálculo de este equipo falló y el reporte es parcial
    pub error: Option<String>,
}
