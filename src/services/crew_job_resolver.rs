//! Resolución del trabajo actual de un equipo
//!
//! Única fuente de verdad para "trabajo actual" y "siguiente trabajo". La
//! usan la ingesta, el snapshot del mapa, la tarjeta del dashboard y el
//! motor de agregación.

use serde::Serialize;
use uuid::Uuid;

use crate::models::{CrewStatus, Job, JobRef};
use crate::repositories::TrackingStore;
use crate::utils::errors::AppResult;

/// Trabajo actual y siguiente de un equipo
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResolution {
    pub team_id: Uuid,
    pub current: Option<Job>,
    pub next: Option<Job>,
}

impl JobResolution {
    pub fn current_job_id(&self) -> Option<Uuid> {
        self.current.as_ref().map(|job| job.id)
    }

    /// Sin trabajos pendientes el equipo queda en standby
    pub fn is_standby(&self) -> bool {
        self.current.is_none()
    }

    pub fn base_status(&self) -> CrewStatus {
        if self.is_standby() {
            CrewStatus::Standby
        } else {
            CrewStatus::EnRoute
        }
    }

    /// Estado a mostrar junto a la resolución: sin trabajo actual, standby
    pub fn effective_status(&self, stored: CrewStatus) -> CrewStatus {
        if self.is_standby() {
            CrewStatus::Standby
        } else {
            stored
        }
    }

    pub fn current_ref(&self) -> Option<JobRef> {
        self.current.as_ref().map(JobRef::from)
    }

    pub fn next_ref(&self) -> Option<JobRef> {
        self.next.as_ref().map(JobRef::from)
    }
}

pub struct CrewJobResolver;

impl CrewJobResolver {
    /// Elegir actual/siguiente entre los trabajos asignados al equipo.
    ///
    /// Se descartan los trabajos de otros equipos y los terminales
    /// (`delivered`, `completed`, `cancelled`). El orden es ascendente por
    /// `(scheduled_date, scheduled_time)`; sin hora va al final de su fecha y
    /// sin fecha al final de todo. El id desempata para que sea determinista.
    pub fn resolve(team_id: Uuid, jobs: impl IntoIterator<Item = Job>) -> JobResolution {
        let mut candidates: Vec<Job> = jobs
            .into_iter()
            .filter(|job| job.crew_id == Some(team_id) && !job.status.is_terminal())
            .collect();

        candidates.sort_by(|a, b| {
            let key = |job: &Job| {
                (
                    job.scheduled_date.is_none(),
                    job.scheduled_date,
                    job.scheduled_time.is_none(),
                    job.scheduled_time,
                    job.id,
                )
            };
            key(a).cmp(&key(b))
        });

        let mut ordered = candidates.into_iter();
        JobResolution {
            team_id,
            current: ordered.next(),
            next: ordered.next(),
        }
    }

    /// Cargar los trabajos del equipo desde el store y resolver
    pub async fn resolve_for_crew(store: &dyn TrackingStore, team_id: Uuid) -> AppResult<JobResolution> {
        let jobs = store.jobs_for_crew(team_id).await?;
        Ok(Self::resolve(team_id, jobs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{JobStatus, JobType};
    use chrono::{NaiveDate, NaiveTime};

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn time(s: &str) -> NaiveTime {
        NaiveTime::parse_from_str(s, "%H:%M").unwrap()
    }

    #[test]
    fn test_earliest_date_is_current_and_second_is_next() {
        let team = Uuid::new_v4();
        let later = Job::new(JobType::Move, "MV-3", Some(team)).scheduled(date("2024-05-03"), None);
        let first = Job::new(JobType::Move, "MV-1", Some(team)).scheduled(date("2024-05-01"), None);

        let resolution = CrewJobResolver::resolve(team, vec![later.clone(), first.clone()]);
        assert_eq!(resolution.current_job_id(), Some(first.id));
        assert_eq!(resolution.next.map(|j| j.id), Some(later.id));
        assert_eq!(resolution.current.map(|j| j.id), Some(first.id));
    }

    #[test]
    fn test_no_candidates_means_standby() {
        let team = Uuid::new_v4();
        let done = Job::new(JobType::Delivery, "DL-1", Some(team))
            .scheduled(date("2024-05-01"), None)
            .with_status(JobStatus::Delivered);
        let other_crew = Job::new(JobType::Move, "MV-9", Some(Uuid::new_v4()));

        let resolution = CrewJobResolver::resolve(team, vec![done, other_crew]);
        assert!(resolution.current.is_none());
        assert!(resolution.next.is_none());
        assert_eq!(resolution.base_status(), CrewStatus::Standby);
        assert_eq!(resolution.effective_status(CrewStatus::EnRoute), CrewStatus::Standby);
    }

    #[test]
    fn test_missing_time_sorts_last_within_date() {
        let team = Uuid::new_v4();
        let untimed = Job::new(JobType::Move, "MV-A", Some(team)).scheduled(date("2024-05-01"), None);
        let afternoon = Job::new(JobType::Move, "MV-B", Some(team))
            .scheduled(date("2024-05-01"), Some(time("15:00")));
        let morning = Job::new(JobType::Delivery, "DL-C", Some(team))
            .scheduled(date("2024-05-01"), Some(time("08:30")));

        let resolution = CrewJobResolver::resolve(
            team,
            vec![untimed.clone(), afternoon.clone(), morning.clone()],
        );
        assert_eq!(resolution.current_job_id(), Some(morning.id));
        assert_eq!(resolution.next.map(|j| j.id), Some(afternoon.id));
    }

    #[test]
    fn test_terminal_statuses_are_skipped() {
        let team = Uuid::new_v4();
        let cancelled = Job::new(JobType::Move, "MV-1", Some(team))
            .scheduled(date("2024-04-30"), None)
            .with_status(JobStatus::Cancelled);
        let completed = Job::new(JobType::Move, "MV-2", Some(team))
            .scheduled(date("2024-04-30"), None)
            .with_status(JobStatus::Completed);
        let in_transit = Job::new(JobType::Delivery, "DL-3", Some(team))
            .scheduled(date("2024-05-02"), None)
            .with_status(JobStatus::InTransit);

        let resolution = CrewJobResolver::resolve(team, vec![cancelled, completed, in_transit.clone()]);
        assert_eq!(resolution.current_job_id(), Some(in_transit.id));
        assert!(resolution.next.is_none());
        assert_eq!(resolution.base_status(), CrewStatus::EnRoute);
    }
}
