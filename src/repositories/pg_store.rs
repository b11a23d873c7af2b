//! Store PostgreSQL
//!
//! Implementación de `TrackingStore` sobre SQLx. El esquema está en
//! `migrations/0001_tracking.sql`; los checkpoints viajan como JSONB.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::tracking_store::{PingWrite, SessionQuery, TrackingStore};
use crate::models::{
    Checkpoint, Crew, CrewEodInput, EodReport, Expense, Incident, Job, JobType, ReadinessFlags,
    SignOff, TrackingSession, TrackingStatus,
};
use crate::utils::errors::{not_found_error, AppError, AppResult};

const SESSION_COLUMNS: &str =
    "id, job_id, job_type, team_id, status, started_at, completed_at, checkpoints, updated_at";

const JOB_COLUMNS: &str = "id, job_type, display_id, client_name, crew_id, scheduled_date, \
     scheduled_time, status, origin, destination";

#[derive(Debug, FromRow)]
struct SessionRow {
    id: Uuid,
    job_id: Uuid,
    job_type: JobType,
    team_id: Uuid,
    status: TrackingStatus,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    checkpoints: Json<Vec<Checkpoint>>,
    updated_at: DateTime<Utc>,
}

impl From<SessionRow> for TrackingSession {
    fn from(row: SessionRow) -> Self {
        Self {
            id: row.id,
            job_id: row.job_id,
            job_type: row.job_type,
            team_id: row.team_id,
            status: row.status,
            started_at: row.started_at,
            completed_at: row.completed_at,
            checkpoints: row.checkpoints.0,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct EodInputRow {
    team_id: Uuid,
    report_date: NaiveDate,
    crew_note: Option<String>,
    readiness: Json<ReadinessFlags>,
    expenses: Json<Vec<Expense>>,
}

#[derive(Clone)]
pub struct PgTrackingStore {
    pool: PgPool,
}

impl PgTrackingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TrackingStore for PgTrackingStore {
    async fn find_crew(&self, id: Uuid) -> AppResult<Option<Crew>> {
        let crew = sqlx::query_as::<_, Crew>("SELECT * FROM crews WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(crew)
    }

    async fn list_crews(&self) -> AppResult<Vec<Crew>> {
        let crews = sqlx::query_as::<_, Crew>("SELECT * FROM crews ORDER BY name, id")
            .fetch_all(&self.pool)
            .await?;
        Ok(crews)
    }

    async fn jobs_for_crew(&self, team_id: Uuid) -> AppResult<Vec<Job>> {
        let jobs = sqlx::query_as::<_, Job>(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE crew_id = $1"
        ))
        .bind(team_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(jobs)
    }

    async fn jobs_by_ids(&self, ids: &[Uuid]) -> AppResult<Vec<Job>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let jobs = sqlx::query_as::<_, Job>(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE id = ANY($1)"
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(jobs)
    }

    async fn find_job(&self, id: Uuid) -> AppResult<Option<Job>> {
        let job = sqlx::query_as::<_, Job>(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(job)
    }

    async fn find_session(&self, id: Uuid) -> AppResult<Option<TrackingSession>> {
        let row = sqlx::query_as::<_, SessionRow>(&format!(
            "SELECT {SESSION_COLUMNS} FROM tracking_sessions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn active_session_for_crew(&self, team_id: Uuid) -> AppResult<Option<TrackingSession>> {
        let row = sqlx::query_as::<_, SessionRow>(&format!(
            r#"
            SELECT {SESSION_COLUMNS} FROM tracking_sessions
            WHERE team_id = $1 AND status NOT IN ('completed', 'cancelled')
            ORDER BY started_at DESC
            LIMIT 1
            "#
        ))
        .bind(team_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn list_active_sessions(&self) -> AppResult<Vec<TrackingSession>> {
        let rows = sqlx::query_as::<_, SessionRow>(&format!(
            r#"
            SELECT {SESSION_COLUMNS} FROM tracking_sessions
            WHERE status NOT IN ('completed', 'cancelled')
            ORDER BY started_at
            "#
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn insert_session(&self, session: &TrackingSession) -> AppResult<()> {
        // El índice parcial uq_tracking_sessions_active_team protege la
        // regla de una sesión abierta por equipo
        sqlx::query(
            r#"
            INSERT INTO tracking_sessions
                (id, job_id, job_type, team_id, status, started_at, completed_at, checkpoints, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(session.id)
        .bind(session.job_id)
        .bind(session.job_type)
        .bind(session.team_id)
        .bind(session.status)
        .bind(session.started_at)
        .bind(session.completed_at)
        .bind(Json(&session.checkpoints))
        .bind(session.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => AppError::Conflict(format!(
                "crew '{}' already has an active tracking session",
                session.team_id
            )),
            other => AppError::Database(other),
        })?;
        Ok(())
    }

    async fn save_session(&self, session: &TrackingSession) -> AppResult<()> {
        let result = update_session(&self.pool, session).await?;
        if result == 0 {
            return Err(not_found_error("TrackingSession", &session.id.to_string()));
        }
        Ok(())
    }

    async fn find_sessions(&self, query: &SessionQuery) -> AppResult<Vec<TrackingSession>> {
        let rows = sqlx::query_as::<_, SessionRow>(&format!(
            r#"
            SELECT {SESSION_COLUMNS} FROM tracking_sessions
            WHERE started_at >= $1 AND started_at < $2
              AND ($3::uuid IS NULL OR team_id = $3)
              AND (NOT $4 OR status IN ('completed', 'cancelled'))
            ORDER BY started_at
            "#
        ))
        .bind(query.started_from)
        .bind(query.started_until)
        .bind(query.team_id)
        .bind(query.terminal_only)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn apply_ping(
        &self,
        crew: &Crew,
        session: Option<&TrackingSession>,
    ) -> AppResult<PingWrite> {
        let mut tx = self.pool.begin().await?;

        // La guarda sobre last_update cubre pings concurrentes de otras réplicas
        let updated = sqlx::query(
            r#"
            UPDATE crews
            SET status = $2, current_lat = $3, current_lng = $4, current_job_id = $5, last_update = $6
            WHERE id = $1 AND (last_update IS NULL OR last_update < $6)
            "#,
        )
        .bind(crew.id)
        .bind(crew.status)
        .bind(crew.current_lat)
        .bind(crew.current_lng)
        .bind(crew.current_job_id)
        .bind(crew.last_update)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if updated == 0 {
            let stored = sqlx::query_scalar::<_, Option<DateTime<Utc>>>(
                "SELECT last_update FROM crews WHERE id = $1",
            )
            .bind(crew.id)
            .fetch_optional(&mut *tx)
            .await?;
            return match stored {
                Some(Some(last_update)) => Ok(PingWrite::Stale { last_update }),
                _ => Err(not_found_error("Crew", &crew.id.to_string())),
            };
        }

        if let Some(session) = session {
            if update_session(&mut *tx, session).await? == 0 {
                return Err(not_found_error("TrackingSession", &session.id.to_string()));
            }
        }

        tx.commit().await?;
        Ok(PingWrite::Applied)
    }

    async fn sign_offs_for_jobs(&self, job_ids: &[Uuid]) -> AppResult<Vec<SignOff>> {
        if job_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, SignOff>(
            "SELECT job_id, job_type, rating, signed_by, signed_at FROM sign_offs WHERE job_id = ANY($1)",
        )
        .bind(job_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn incidents_for_jobs(&self, job_ids: &[Uuid]) -> AppResult<Vec<Incident>> {
        if job_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, Incident>(
            "SELECT job_id, issue_type, description, created_at FROM incidents WHERE job_id = ANY($1)",
        )
        .bind(job_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn crew_eod_input(&self, team_id: Uuid, date: NaiveDate) -> AppResult<Option<CrewEodInput>> {
        let row = sqlx::query_as::<_, EodInputRow>(
            r#"
            SELECT team_id, report_date, crew_note, readiness, expenses
            FROM crew_eod_inputs
            WHERE team_id = $1 AND report_date = $2
            "#,
        )
        .bind(team_id)
        .bind(date)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| CrewEodInput {
            team_id: row.team_id,
            report_date: row.report_date,
            crew_note: row.crew_note,
            readiness: row.readiness.0,
            expenses: row.expenses.0,
        }))
    }

    async fn replace_eod_report(&self, report: &EodReport) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO eod_reports (id, team_id, report_date, payload, generated_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (team_id, report_date)
            DO UPDATE SET id = EXCLUDED.id, payload = EXCLUDED.payload, generated_at = EXCLUDED.generated_at
            "#,
        )
        .bind(report.id)
        .bind(report.team_id)
        .bind(report.report_date)
        .bind(Json(report))
        .bind(report.generated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn eod_reports(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        team_id: Option<Uuid>,
    ) -> AppResult<Vec<EodReport>> {
        let rows: Vec<(Json<EodReport>,)> = sqlx::query_as(
            r#"
            SELECT payload FROM eod_reports
            WHERE report_date BETWEEN $1 AND $2
              AND ($3::uuid IS NULL OR team_id = $3)
            ORDER BY report_date, payload->>'teamName'
            "#,
        )
        .bind(from)
        .bind(to)
        .bind(team_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(payload,)| payload.0).collect())
    }
}

async fn update_session<'e, E>(executor: E, session: &TrackingSession) -> Result<u64, sqlx::Error>
where
    E: sqlx::PgExecutor<'e>,
{
    let result = sqlx::query(
        r#"
        UPDATE tracking_sessions
        SET status = $2, completed_at = $3, checkpoints = $4, updated_at = $5
        WHERE id = $1
        "#,
    )
    .bind(session.id)
    .bind(session.status)
    .bind(session.completed_at)
    .bind(Json(&session.checkpoints))
    .bind(session.updated_at)
    .execute(executor)
    .await?;
    Ok(result.rows_affected())
}
