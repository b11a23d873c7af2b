//! Store en memoria
//!
//! Implementación de `TrackingStore` para desarrollo y tests. Las filas de
//! colaboradores (jobs, sign-offs, incidentes) se cargan con los métodos
//! `insert_*`, o desde un archivo `MEMORY_SEED` con crews y jobs.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::tracking_store::{PingWrite, SessionQuery, TrackingStore};
use crate::models::{
    Crew, CrewEodInput, EodReport, Incident, Job, SignOff, TrackingSession,
};
use crate::utils::errors::{not_found_error, AppResult};

#[derive(Default)]
struct MemoryState {
    crews: HashMap<Uuid, Crew>,
    jobs: HashMap<Uuid, Job>,
    sessions: HashMap<Uuid, TrackingSession>,
    sign_offs: Vec<SignOff>,
    incidents: Vec<Incident>,
    eod_inputs: HashMap<(Uuid, NaiveDate), CrewEodInput>,
    reports: HashMap<(Uuid, NaiveDate), EodReport>,
}

/// Crews y jobs iniciales del store en memoria
#[derive(Debug, Default, Deserialize)]
pub struct MemorySeed {
    #[serde(default)]
    pub crews: Vec<Crew>,
    #[serde(default)]
    pub jobs: Vec<Job>,
}

impl MemorySeed {
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_crew(&self, crew: Crew) {
        self.state.write().await.crews.insert(crew.id, crew);
    }

    pub async fn insert_job(&self, job: Job) {
        self.state.write().await.jobs.insert(job.id, job);
    }

    /// Cargar un seed; devuelve (crews, jobs) cargados
    pub async fn load_seed(&self, seed: MemorySeed) -> (usize, usize) {
        let mut state = self.state.write().await;
        let counts = (seed.crews.len(), seed.jobs.len());
        for crew in seed.crews {
            state.crews.insert(crew.id, crew);
        }
        for job in seed.jobs {
            state.jobs.insert(job.id, job);
        }
        counts
    }

    pub async fn insert_sign_off(&self, sign_off: SignOff) {
        self.state.write().await.sign_offs.push(sign_off);
    }

    pub async fn insert_incident(&self, incident: Incident) {
        self.state.write().await.incidents.push(incident);
    }

    pub async fn insert_crew_eod_input(&self, input: CrewEodInput) {
        self.state
            .write()
            .await
            .eod_inputs
            .insert((input.team_id, input.report_date), input);
    }
}

#[async_trait]
impl TrackingStore for MemoryStore {
    async fn find_crew(&self, id: Uuid) -> AppResult<Option<Crew>> {
        Ok(self.state.read().await.crews.get(&id).cloned())
    }

    async fn list_crews(&self) -> AppResult<Vec<Crew>> {
        let state = self.state.read().await;
        let mut crews: Vec<Crew> = state.crews.values().cloned().collect();
        crews.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(crews)
    }

    async fn jobs_for_crew(&self, team_id: Uuid) -> AppResult<Vec<Job>> {
        let state = self.state.read().await;
        Ok(state
            .jobs
            .values()
            .filter(|job| job.crew_id == Some(team_id))
            .cloned()
            .collect())
    }

    async fn jobs_by_ids(&self, ids: &[Uuid]) -> AppResult<Vec<Job>> {
        let state = self.state.read().await;
        Ok(ids.iter().filter_map(|id| state.jobs.get(id).cloned()).collect())
    }

    async fn find_job(&self, id: Uuid) -> AppResult<Option<Job>> {
        Ok(self.state.read().await.jobs.get(&id).cloned())
    }

    async fn find_session(&self, id: Uuid) -> AppResult<Option<TrackingSession>> {
        Ok(self.state.read().await.sessions.get(&id).cloned())
    }

    async fn active_session_for_crew(&self, team_id: Uuid) -> AppResult<Option<TrackingSession>> {
        let state = self.state.read().await;
        Ok(state
            .sessions
            .values()
            .filter(|s| s.team_id == team_id && !s.is_terminal())
            .max_by_key(|s| s.started_at)
            .cloned())
    }

    async fn list_active_sessions(&self) -> AppResult<Vec<TrackingSession>> {
        let state = self.state.read().await;
        let mut sessions: Vec<TrackingSession> = state
            .sessions
            .values()
            .filter(|s| !s.is_terminal())
            .cloned()
            .collect();
        sessions.sort_by_key(|s| s.started_at);
        Ok(sessions)
    }

    async fn insert_session(&self, session: &TrackingSession) -> AppResult<()> {
        self.state
            .write()
            .await
            .sessions
            .insert(session.id, session.clone());
        Ok(())
    }

    async fn save_session(&self, session: &TrackingSession) -> AppResult<()> {
        let mut state = self.state.write().await;
        match state.sessions.get_mut(&session.id) {
            Some(stored) => {
                *stored = session.clone();
                Ok(())
            }
            None => Err(not_found_error("TrackingSession", &session.id.to_string())),
        }
    }

    async fn find_sessions(&self, query: &SessionQuery) -> AppResult<Vec<TrackingSession>> {
        let state = self.state.read().await;
        let mut sessions: Vec<TrackingSession> = state
            .sessions
            .values()
            .filter(|s| s.started_at >= query.started_from && s.started_at < query.started_until)
            .filter(|s| query.team_id.map_or(true, |team| s.team_id == team))
            .filter(|s| !query.terminal_only || s.is_terminal())
            .cloned()
            .collect();
        sessions.sort_by_key(|s| s.started_at);
        Ok(sessions)
    }

    async fn apply_ping(
        &self,
        crew: &Crew,
        session: Option<&TrackingSession>,
    ) -> AppResult<PingWrite> {
        // Un único write lock cubre ambas filas
        let mut state = self.state.write().await;
        let stored = state
            .crews
            .get(&crew.id)
            .ok_or_else(|| not_found_error("Crew", &crew.id.to_string()))?;
        if let (Some(last_update), Some(incoming)) = (stored.last_update, crew.last_update) {
            if incoming <= last_update {
                return Ok(PingWrite::Stale { last_update });
            }
        }
        if let Some(session) = session {
            if !state.sessions.contains_key(&session.id) {
                return Err(not_found_error("TrackingSession", &session.id.to_string()));
            }
            state.sessions.insert(session.id, session.clone());
        }
        state.crews.insert(crew.id, crew.clone());
        Ok(PingWrite::Applied)
    }

    async fn sign_offs_for_jobs(&self, job_ids: &[Uuid]) -> AppResult<Vec<SignOff>> {
        let state = self.state.read().await;
        Ok(state
            .sign_offs
            .iter()
            .filter(|s| job_ids.contains(&s.job_id))
            .cloned()
            .collect())
    }

    async fn incidents_for_jobs(&self, job_ids: &[Uuid]) -> AppResult<Vec<Incident>> {
        let state = self.state.read().await;
        Ok(state
            .incidents
            .iter()
            .filter(|i| job_ids.contains(&i.job_id))
            .cloned()
            .collect())
    }

    async fn crew_eod_input(&self, team_id: Uuid, date: NaiveDate) -> AppResult<Option<CrewEodInput>> {
        Ok(self.state.read().await.eod_inputs.get(&(team_id, date)).cloned())
    }

    async fn replace_eod_report(&self, report: &EodReport) -> AppResult<()> {
        self.state
            .write()
            .await
            .reports
            .insert((report.team_id, report.report_date), report.clone());
        Ok(())
    }

    async fn eod_reports(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        team_id: Option<Uuid>,
    ) -> AppResult<Vec<EodReport>> {
        let state = self.state.read().await;
        let mut reports: Vec<EodReport> = state
            .reports
            .values()
            .filter(|r| r.report_date >= from && r.report_date <= to)
            .filter(|r| team_id.map_or(true, |team| r.team_id == team))
            .cloned()
            .collect();
        reports.sort_by(|a, b| {
            a.report_date
                .cmp(&b.report_date)
                .then_with(|| a.team_name.cmp(&b.team_name))
        });
        Ok(reports)
    }
}
