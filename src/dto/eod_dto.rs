use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{EodReport, JobType};
use crate::services::EodRequest;
use crate::utils::errors::{validation_error, AppResult};
use crate::utils::validation::{validate_date, validate_date_range};

// Filtros de fecha/equipo/tipo para generar o consultar reportes EOD.
// `date` sola equivale a `from = to = date`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct EodFilter {
    pub date: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub team_id: Option<Uuid>,
    pub job_type: Option<String>,
}

impl EodFilter {
    /// Resolver el rango de fechas y el tipo de trabajo
    pub fn resolve(&self) -> AppResult<EodRequest> {
        let (from, to) = match (&self.date, &self.from, &self.to) {
            (Some(date), None, None) => {
                let date = parse_date("date", date)?;
                (date, date)
            }
            (None, Some(from), Some(to)) => (parse_date("from", from)?, parse_date("to", to)?),
            (None, Some(from), None) => {
                let from = parse_date("from", from)?;
                (from, from)
            }
            (None, None, None) => {
                return Err(validation_error("date", "date or from/to is required"));
            }
            _ => {
                return Err(validation_error(
                    "date",
                    "use either date or from/to, not both",
                ));
            }
        };
        validate_date_range(from, to).map_err(|_| {
            validation_error("to", "range must be ordered and at most 31 days wide")
        })?;

        let job_type = match &self.job_type {
            Some(raw) => Some(
                raw.parse::<JobType>()
                    .map_err(|_| validation_error("job_type", "must be move or delivery"))?,
            ),
            None => None,
        };

        Ok(EodRequest {
            from,
            to,
            team_id: self.team_id,
            job_type,
        })
    }
}

fn parse_date(field: &'static str, raw: &str) -> AppResult<NaiveDate> {
    validate_date(raw).map_err(|_| validation_error(field, "must be a YYYY-MM-DD date"))
}

// Respuesta de la generación/consulta de reportes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EodReportsResponse {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub count: usize,
    pub failed: usize,
    pub reports: Vec<EodReport>,
}

impl EodReportsResponse {
    pub fn new(request: &EodRequest, reports: Vec<EodReport>) -> Self {
        Self {
            from: request.from,
            to: request.to,
            count: reports.len(),
            failed: reports.iter().filter(|r| r.error.is_some()).count(),
            reports,
        }
    }
}
