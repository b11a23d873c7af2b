//! Motor de agregación de fin de día (EOD)
//!
//! Reduce las sesiones terminales de cada equipo, junto con sus sign-offs e
//! incidentes, a un reporte por equipo y fecha. Solo lee: no toma locks
//! sobre el estado en vivo y puede correr en paralelo con la ingesta.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::models::{
    Crew, CrewEodInput, EodJobEntry, EodReport, EodSummary, Incident, Job, JobRef, JobType, SignOff,
    TrackingSession, TrackingStatus,
};
use crate::repositories::{SessionQuery, TrackingStore};
use crate::services::crew_job_resolver::CrewJobResolver;
use crate::utils::errors::{not_found_error, AppResult};

/// Categoría de duración de un checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageLabel {
    Drive,
    Loading,
    Unloading,
}

/// Tabla fija estado → etapa
pub fn stage_for(status: TrackingStatus) -> Option<StageLabel> {
    match status {
        TrackingStatus::EnRoute => Some(StageLabel::Drive),
        TrackingStatus::Arrived => Some(StageLabel::Loading),
        TrackingStatus::InProgress => Some(StageLabel::Unloading),
        TrackingStatus::NotStarted | TrackingStatus::Completed | TrackingStatus::Cancelled => None,
    }
}

/// Duraciones de una sesión, en minutos
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionMetrics {
    pub total_minutes: i64,
    pub drive_minutes: i64,
    pub loading_minutes: i64,
    pub unloading_minutes: i64,
    /// La duración total salió negativa y se recortó a 0
    pub corrupted: bool,
}

fn round_minutes(seconds: i64) -> i64 {
    (seconds.max(0) + 30) / 60
}

/// Calcular las duraciones de una sesión.
///
/// Cada checkpoint con etapa dura hasta el siguiente checkpoint. El último
/// dura hasta `completed_at`, o hasta `now` si la sesión sigue abierta, y
/// nunca pasa del timestamp terminal.
pub fn session_metrics(session: &TrackingSession, now: DateTime<Utc>) -> SessionMetrics {
    let terminal = session.completed_at;
    let mut drive = 0;
    let mut loading = 0;
    let mut unloading = 0;

    for (i, checkpoint) in session.checkpoints.iter().enumerate() {
        let Some(stage) = stage_for(checkpoint.status) else {
            continue;
        };
        let mut end = session
            .checkpoints
            .get(i + 1)
            .map(|next| next.timestamp)
            .unwrap_or_else(|| terminal.unwrap_or(now));
        if let Some(terminal) = terminal {
            end = end.min(terminal);
        }
        let seconds = (end - checkpoint.timestamp).num_seconds().max(0);
        match stage {
            StageLabel::Drive => drive += seconds,
            StageLabel::Loading => loading += seconds,
            StageLabel::Unloading => unloading += seconds,
        }
    }

    let end = terminal
        .or_else(|| session.last_checkpoint().map(|c| c.timestamp))
        .unwrap_or(session.started_at);
    let total_seconds = (end - session.started_at).num_seconds();

    SessionMetrics {
        total_minutes: round_minutes(total_seconds),
        drive_minutes: round_minutes(drive),
        loading_minutes: round_minutes(loading),
        unloading_minutes: round_minutes(unloading),
        corrupted: total_seconds < 0,
    }
}

/// Todo lo que hace falta para el reporte de un equipo en un día
pub struct CrewDay<'a> {
    pub crew: &'a Crew,
    pub date: NaiveDate,
    pub sessions: &'a [TrackingSession],
    pub jobs: &'a [Job],
    pub sign_offs: &'a [SignOff],
    pub incidents: &'a [Incident],
    pub input: Option<CrewEodInput>,
    pub next_job: Option<JobRef>,
    pub now: DateTime<Utc>,
}

/// Construir el reporte de un equipo (función pura)
pub fn build_report(day: CrewDay<'_>) -> EodReport {
    let jobs: HashMap<Uuid, &Job> = day.jobs.iter().map(|job| (job.id, job)).collect();
    let sign_offs: HashMap<(Uuid, JobType), &SignOff> = day
        .sign_offs
        .iter()
        .map(|s| ((s.job_id, s.job_type), s))
        .collect();
    let damaged: HashSet<Uuid> = day
        .incidents
        .iter()
        .filter(|i| i.is_damage())
        .map(|i| i.job_id)
        .collect();

    let mut summary = EodSummary::default();
    let mut ratings: Vec<i16> = Vec::new();
    let mut entries = Vec::with_capacity(day.sessions.len());

    for session in day.sessions {
        let metrics = session_metrics(session, day.now);
        let sign_off = sign_offs.get(&(session.job_id, session.job_type));
        let has_damage = damaged.contains(&session.job_id);
        let job = jobs.get(&session.job_id);

        if metrics.corrupted {
            warn!(
                "⚠️ Sesión {} con duración negativa, recortada a 0 (crew {})",
                session.id, day.crew.name
            );
            summary.corrupted_sessions += 1;
        }
        if has_damage {
            summary.damage_count += 1;
        }

        match session.status {
            TrackingStatus::Completed => {
                summary.jobs_completed += 1;
                summary.total_minutes += metrics.total_minutes;
                summary.drive_minutes += metrics.drive_minutes;
                summary.loading_minutes += metrics.loading_minutes;
                summary.unloading_minutes += metrics.unloading_minutes;
                if let Some(sign_off) = sign_off {
                    summary.sign_offs += 1;
                    if let Some(rating) = sign_off.rating.filter(|r| (1..=5).contains(r)) {
                        ratings.push(rating);
                    }
                }
            }
            TrackingStatus::Cancelled => summary.jobs_cancelled += 1,
            _ => {}
        }

        entries.push(EodJobEntry {
            job_id: session.job_id,
            session_id: session.id,
            display_id: job.map(|j| j.display_id.clone()),
            client_name: job.and_then(|j| j.client_name.clone()),
            job_type: session.job_type,
            status: session.status,
            duration_minutes: metrics.total_minutes,
            drive_minutes: metrics.drive_minutes,
            loading_minutes: metrics.loading_minutes,
            unloading_minutes: metrics.unloading_minutes,
            signed_off: sign_off.is_some(),
            rating: sign_off.and_then(|s| s.rating),
            has_damage,
            data_warning: metrics.corrupted,
        });
    }

    if summary.jobs_completed > 0 {
        let completed = f64::from(summary.jobs_completed);
        summary.sign_off_rate = (f64::from(summary.sign_offs) / completed * 100.0).round() as u32;
        summary.avg_duration = (summary.total_minutes as f64 / completed).round() as i64;
    }
    if !ratings.is_empty() {
        let mean = ratings.iter().map(|r| f64::from(*r)).sum::<f64>() / ratings.len() as f64;
        summary.average_satisfaction = Some((mean * 10.0).round() / 10.0);
    }

    let input = day.input.unwrap_or_default();
    EodReport {
        id: Uuid::new_v4(),
        team_id: day.crew.id,
        team_name: day.crew.name.clone(),
        report_date: day.date,
        summary,
        jobs: entries,
        crew_note: input.crew_note,
        readiness: input.readiness,
        expenses: input.expenses,
        next_job: day.next_job,
        generated_at: day.now,
        error: None,
    }
}

/// Reporte parcial para un equipo cuyo cálculo falló
pub fn error_report(crew: &Crew, date: NaiveDate, message: String, now: DateTime<Utc>) -> EodReport {
    EodReport {
        id: Uuid::new_v4(),
        team_id: crew.id,
        team_name: crew.name.clone(),
        report_date: date,
        summary: EodSummary::default(),
        jobs: Vec::new(),
        crew_note: None,
        readiness: Default::default(),
        expenses: Vec::new(),
        next_job: None,
        generated_at: now,
        error: Some(message),
    }
}

/// Pedido de generación de reportes
#[derive(Debug, Clone)]
pub struct EodRequest {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub team_id: Option<Uuid>,
    /// Solo recorta el detalle `jobs` devuelto; el reporte guardado es siempre completo
    pub job_type: Option<JobType>,
}

impl EodRequest {
    pub fn dates(&self) -> Vec<NaiveDate> {
        self.from
            .iter_days()
            .take_while(|d| *d <= self.to)
            .collect()
    }
}

#[derive(Clone)]
pub struct EodAggregator {
    store: Arc<dyn TrackingStore>,
}

impl EodAggregator {
    pub fn new(store: Arc<dyn TrackingStore>) -> Self {
        Self { store }
    }

    /// Generar y guardar un reporte por equipo y fecha.
    ///
    /// Cada equipo/fecha corre en su propia tarea: un fallo (o pánico) de
    /// uno produce su reporte con `error` y no detiene a los demás.
    pub async fn generate(&self, request: &EodRequest) -> AppResult<Vec<EodReport>> {
        let crews = match request.team_id {
            Some(team_id) => vec![self
                .store
                .find_crew(team_id)
                .await?
                .ok_or_else(|| not_found_error("Crew", &team_id.to_string()))?],
            None => self.store.list_crews().await?,
        };
        let dates = request.dates();

        info!(
            "📊 Generando reportes EOD: {} equipos, {} a {}",
            crews.len(),
            request.from,
            request.to
        );

        let mut tasks = Vec::with_capacity(crews.len() * dates.len());
        for crew in &crews {
            for date in &dates {
                let aggregator = self.clone();
                let task_crew = crew.clone();
                let date = *date;
                let handle = tokio::spawn(async move {
                    aggregator
                        .crew_day_report(&task_crew, date, Utc::now())
                        .await
                });
                tasks.push((crew.clone(), date, handle));
            }
        }

        let mut reports = Vec::with_capacity(tasks.len());
        for (crew, date, handle) in tasks {
            let report = match handle.await {
                Ok(Ok(report)) => report,
                Ok(Err(e)) => {
                    error!("❌ Reporte EOD de {} ({}) falló: {}", crew.name, date, e);
                    error_report(&crew, date, e.to_string(), Utc::now())
                }
                Err(join_error) => {
                    error!("❌ Tarea EOD de {} ({}) abortada: {}", crew.name, date, join_error);
                    error_report(&crew, date, "aggregation task aborted".to_string(), Utc::now())
                }
            };

            // Regenerar reemplaza el reporte completo
            if let Err(e) = self.store.replace_eod_report(&report).await {
                error!("❌ No se pudo guardar el reporte EOD de {} ({}): {}", crew.name, date, e);
            }
            reports.push(report);
        }

        let failed = reports.iter().filter(|r| r.error.is_some()).count();
        info!("✅ {} reportes EOD generados ({} con error)", reports.len(), failed);
        Ok(reports)
    }

    /// Calcular el reporte de un equipo en una fecha, con todos los tipos de trabajo
    pub async fn crew_day_report(
        &self,
        crew: &Crew,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> AppResult<EodReport> {
        let started_from = date.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc();
        let sessions = self
            .store
            .find_sessions(&SessionQuery {
                started_from,
                started_until: started_from + Duration::days(1),
                team_id: Some(crew.id),
                terminal_only: true,
            })
            .await?;

        let job_ids: Vec<Uuid> = sessions.iter().map(|s| s.job_id).collect();
        let jobs = self.store.jobs_by_ids(&job_ids).await?;
        let sign_offs = self.store.sign_offs_for_jobs(&job_ids).await?;
        let incidents = self.store.incidents_for_jobs(&job_ids).await?;
        let input = self.store.crew_eod_input(crew.id, date).await?;
        let resolution = CrewJobResolver::resolve_for_crew(self.store.as_ref(), crew.id).await?;

        Ok(build_report(CrewDay {
            crew,
            date,
            sessions: &sessions,
            jobs: &jobs,
            sign_offs: &sign_offs,
            incidents: &incidents,
            input,
            next_job: resolution.current_ref(),
            now,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Checkpoint;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, h, m, 0).unwrap()
    }

    fn session(job_type: JobType, checkpoints: &[(TrackingStatus, DateTime<Utc>)]) -> TrackingSession {
        let started_at = checkpoints.first().map(|(_, t)| *t).unwrap_or(at(8, 0));
        let mut s = TrackingSession {
            id: Uuid::new_v4(),
            job_id: Uuid::new_v4(),
            job_type,
            team_id: Uuid::new_v4(),
            status: TrackingStatus::NotStarted,
            started_at,
            completed_at: None,
            checkpoints: Vec::new(),
            updated_at: started_at,
        };
        for (status, ts) in checkpoints {
            s.apply_checkpoint(Checkpoint::new(*status, *ts)).unwrap();
        }
        s
    }

    fn scenario_a() -> TrackingSession {
        session(
            JobType::Move,
            &[
                (TrackingStatus::EnRoute, at(10, 0)),
                (TrackingStatus::Arrived, at(10, 20)),
                (TrackingStatus::InProgress, at(10, 25)),
                (TrackingStatus::Completed, at(11, 5)),
            ],
        )
    }

    fn day<'a>(
        crew: &'a Crew,
        sessions: &'a [TrackingSession],
        sign_offs: &'a [SignOff],
        incidents: &'a [Incident],
    ) -> CrewDay<'a> {
        CrewDay {
            crew,
            date: at(0, 0).date_naive(),
            sessions,
            jobs: &[],
            sign_offs,
            incidents,
            input: None,
            next_job: None,
            now: at(23, 0),
        }
    }

    #[test]
    fn test_stage_breakdown_for_full_session() {
        let metrics = session_metrics(&scenario_a(), at(23, 0));
        assert_eq!(
            metrics,
            SessionMetrics {
                total_minutes: 65,
                drive_minutes: 20,
                loading_minutes: 5,
                unloading_minutes: 40,
                corrupted: false,
            }
        );
    }

    #[test]
    fn test_open_session_last_stage_runs_until_now() {
        let s = session(
            JobType::Delivery,
            &[(TrackingStatus::EnRoute, at(10, 0)), (TrackingStatus::Arrived, at(10, 10))],
        );
        let metrics = session_metrics(&s, at(10, 40));
        assert_eq!(metrics.drive_minutes, 10);
        assert_eq!(metrics.loading_minutes, 30);
        assert_eq!(metrics.total_minutes, 10);
    }

    #[test]
    fn test_total_equals_span_between_first_and_last_checkpoint() {
        let s = session(
            JobType::Move,
            &[
                (TrackingStatus::EnRoute, at(8, 0)),
                (TrackingStatus::Arrived, at(8, 47)),
                (TrackingStatus::InProgress, at(9, 3)),
            ],
        );
        let metrics = session_metrics(&s, at(9, 3));
        assert_eq!(metrics.total_minutes, 63);
        assert!(!metrics.corrupted);
    }

    #[test]
    fn test_negative_total_is_clamped_and_flagged() {
        let mut s = scenario_a();
        s.started_at = at(12, 0);
        let metrics = session_metrics(&s, at(23, 0));
        assert_eq!(metrics.total_minutes, 0);
        assert!(metrics.corrupted);
    }

    #[test]
    fn test_single_completed_session_without_sign_off() {
        let crew = Crew::new("Alpha", Vec::new());
        let sessions = vec![scenario_a()];
        let report = build_report(day(&crew, &sessions, &[], &[]));

        assert_eq!(report.summary.jobs_completed, 1);
        assert_eq!(report.summary.sign_off_rate, 0);
        assert_eq!(report.summary.avg_duration, 65);
        assert_eq!(report.summary.average_satisfaction, None);
        assert_eq!(report.jobs.len(), 1);
        assert!(!report.jobs[0].has_damage);
        assert!(!report.jobs[0].signed_off);
        assert!(report.error.is_none());
    }

    #[test]
    fn test_zero_completed_jobs_gives_zero_rates() {
        let crew = Crew::new("Bravo", Vec::new());
        let cancelled = session(
            JobType::Move,
            &[(TrackingStatus::EnRoute, at(9, 0)), (TrackingStatus::Cancelled, at(9, 30))],
        );
        let sessions = vec![cancelled];
        let report = build_report(day(&crew, &sessions, &[], &[]));

        assert_eq!(report.summary.jobs_completed, 0);
        assert_eq!(report.summary.jobs_cancelled, 1);
        assert_eq!(report.summary.sign_off_rate, 0);
        assert_eq!(report.summary.avg_duration, 0);

        let empty = build_report(day(&crew, &[], &[], &[]));
        assert_eq!(empty.summary, EodSummary::default());
        assert!(empty.jobs.is_empty());
    }

    #[test]
    fn test_sign_offs_ratings_and_damage_are_joined() {
        let crew = Crew::new("Charlie", Vec::new());
        let first = scenario_a();
        let second = session(
            JobType::Delivery,
            &[
                (TrackingStatus::EnRoute, at(12, 0)),
                (TrackingStatus::Arrived, at(12, 30)),
                (TrackingStatus::Completed, at(13, 0)),
            ],
        );
        let third = session(
            JobType::Delivery,
            &[(TrackingStatus::EnRoute, at(14, 0)), (TrackingStatus::Completed, at(14, 44))],
        );

        let sign_offs = vec![
            SignOff {
                job_id: first.job_id,
                job_type: JobType::Move,
                rating: Some(5),
                signed_by: "Client A".into(),
                signed_at: at(11, 10),
            },
            SignOff {
                job_id: second.job_id,
                job_type: JobType::Delivery,
                rating: Some(4),
                signed_by: "Client B".into(),
                signed_at: at(13, 5),
            },
            // Mismo id pero otro tipo: no debe unirse
            SignOff {
                job_id: third.job_id,
                job_type: JobType::Move,
                rating: Some(1),
                signed_by: "Wrong".into(),
                signed_at: at(15, 0),
            },
        ];
        let incidents = vec![
            Incident {
                job_id: second.job_id,
                issue_type: "damage".into(),
                description: Some("scratched table".into()),
                created_at: at(13, 1),
            },
            Incident {
                job_id: third.job_id,
                issue_type: "late".into(),
                description: None,
                created_at: at(14, 50),
            },
        ];

        let sessions = vec![first, second, third];
        let report = build_report(day(&crew, &sessions, &sign_offs, &incidents));
        let s = &report.summary;

        assert_eq!(s.jobs_completed, 3);
        assert_eq!(s.sign_offs, 2);
        assert_eq!(s.sign_off_rate, 67);
        assert_eq!(s.total_minutes, 65 + 60 + 44);
        assert_eq!(s.avg_duration, 56);
        assert_eq!(s.average_satisfaction, Some(4.5));
        assert_eq!(s.damage_count, 1);
        assert!(!report.jobs[0].has_damage);
        assert!(report.jobs[1].has_damage);
        assert!(!report.jobs[2].has_damage);
        assert!(!report.jobs[2].signed_off);
    }

    #[test]
    fn test_error_report_is_marked() {
        let crew = Crew::new("Delta", Vec::new());
        let report = error_report(&crew, at(0, 0).date_naive(), "boom".into(), at(23, 0));
        assert_eq!(report.error.as_deref(), Some("boom"));
        assert_eq!(report.summary.jobs_completed, 0);
    }

    #[test]
    fn test_request_dates_are_inclusive() {
        let request = EodRequest {
            from: at(0, 0).date_naive(),
            to: at(0, 0).date_naive() + Duration::days(2),
            team_id: None,
            job_type: None,
        };
        assert_eq!(request.dates().len(), 3);
    }
}
