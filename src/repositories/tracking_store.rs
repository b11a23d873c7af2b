//! Store canónico del estado de seguimiento
//!
//! Los clientes solo reciben proyecciones de lectura. Toda mutación pasa por
//! el gateway de ingesta o la máquina de estados y termina aquí.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::models::{
    Crew, CrewEodInput, EodReport, Incident, Job, SignOff, TrackingSession,
};
use crate::utils::errors::AppResult;

/// Resultado de persistir un ping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PingWrite {
    Applied,
    /// El crew ya tenía un update igual o más nuevo; no se escribió nada
    Stale { last_update: DateTime<Utc> },
}

/// Filtro de sesiones para el motor de agregación
#[derive(Debug, Clone)]
pub struct SessionQuery {
    /// Inicio inclusivo sobre `started_at`
    pub started_from: DateTime<Utc>,
    /// Fin exclusivo sobre `started_at`
    pub started_until: DateTime<Utc>,
    pub team_id: Option<Uuid>,
    pub terminal_only: bool,
}

#[async_trait]
pub trait TrackingStore: Send + Sync {
    // Crews
    async fn find_crew(&self, id: Uuid) -> AppResult<Option<Crew>>;
    async fn list_crews(&self) -> AppResult<Vec<Crew>>;

    // Jobs (solo lectura)
    async fn jobs_for_crew(&self, team_id: Uuid) -> AppResult<Vec<Job>>;
    async fn jobs_by_ids(&self, ids: &[Uuid]) -> AppResult<Vec<Job>>;
    async fn find_job(&self, id: Uuid) -> AppResult<Option<Job>>;

    // Sessions
    async fn find_session(&self, id: Uuid) -> AppResult<Option<TrackingSession>>;
    async fn active_session_for_crew(&self, team_id: Uuid) -> AppResult<Option<TrackingSession>>;
    async fn list_active_sessions(&self) -> AppResult<Vec<TrackingSession>>;
    async fn insert_session(&self, session: &TrackingSession) -> AppResult<()>;
    async fn save_session(&self, session: &TrackingSession) -> AppResult<()>;
    async fn find_sessions(&self, query: &SessionQuery) -> AppResult<Vec<TrackingSession>>;

    /// Persistir de forma atómica la actualización del crew y, si la hay,
    /// la sesión a la que se añadió un checkpoint. Solo escribe si
    /// `crew.last_update` es posterior al guardado.
    async fn apply_ping(&self, crew: &Crew, session: Option<&TrackingSession>)
        -> AppResult<PingWrite>;

    // Colaboradores leídos por la agregación
    async fn sign_offs_for_jobs(&self, job_ids: &[Uuid]) -> AppResult<Vec<SignOff>>;
    async fn incidents_for_jobs(&self, job_ids: &[Uuid]) -> AppResult<Vec<Incident>>;
    async fn crew_eod_input(&self, team_id: Uuid, date: NaiveDate) -> AppResult<Option<CrewEodInput>>;

    // Reportes EOD
    async fn replace_eod_report(&self, report: &EodReport) -> AppResult<()>;
    async fn eod_reports(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        team_id: Option<Uuid>,
    ) -> AppResult<Vec<EodReport>>;
}
