//! Modelo de Job (move | delivery)
//!
//! Los trabajos pertenecen a la capa CRUD. El núcleo de seguimiento solo lee
//! su estado, su programación y el equipo asignado.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Tipo de trabajo - mapea al ENUM job_type
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Type, PartialEq, Eq, Hash)]
#[sqlx(type_name = "job_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    Move,
    Delivery,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::Move => "move",
            JobType::Delivery => "delivery",
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "move" => Ok(JobType::Move),
            "delivery" => Ok(JobType::Delivery),
            other => Err(format!("unknown job type '{}'", other)),
        }
    }
}

/// Estado del trabajo - mapea al ENUM job_status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Type, PartialEq, Eq)]
#[sqlx(type_name = "job_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Scheduled,
    Confirmed,
    InTransit,
    Delivered,
    Completed,
    Cancelled,
}

impl JobStatus {
    /// Estados que sacan al trabajo de la lista de candidatos del resolver
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Delivered | JobStatus::Completed | JobStatus::Cancelled
        )
    }
}

/// Job - mapea a la vista jobs (moves + deliveries)
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Job {
    pub id: Uuid,
    pub job_type: JobType,
    pub display_id: String,
    pub client_name: Option<String>,
    pub crew_id: Option<Uuid>,
    pub scheduled_date: Option<NaiveDate>,
    pub scheduled_time: Option<NaiveTime>,
    pub status: JobStatus,
    pub origin: Option<String>,
    pub destination: Option<String>,
}

impl Job {
    pub fn new(job_type: JobType, display_id: impl Into<String>, crew_id: Option<Uuid>) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_type,
            display_id: display_id.into(),
            client_name: None,
            crew_id,
            scheduled_date: None,
            scheduled_time: None,
            status: JobStatus::Pending,
            origin: None,
            destination: None,
        }
    }

    pub fn scheduled(mut self, date: NaiveDate, time: Option<NaiveTime>) -> Self {
        self.scheduled_date = Some(date);
        self.scheduled_time = time;
        self
    }

    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_client(mut self, client_name: impl Into<String>) -> Self {
        self.client_name = Some(client_name.into());
        self
    }
}

/// Referencia corta a un trabajo para respuestas y reportes
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobRef {
    pub id: Uuid,
    pub display_id: String,
    pub job_type: JobType,
    pub client_name: Option<String>,
    pub scheduled_date: Option<NaiveDate>,
    pub scheduled_time: Option<NaiveTime>,
}

impl From<&Job> for JobRef {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id,
            display_id: job.display_id.clone(),
            job_type: job.job_type,
            client_name: job.client_name.clone(),
            scheduled_date: job.scheduled_date,
            scheduled_time: job.scheduled_time,
        }
    }
}
