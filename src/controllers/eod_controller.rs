use std::sync::Arc;

use tracing::{debug, info};

use crate::cache::ReportCache;
use crate::dto::api_response::ApiResponse;
use crate::dto::eod_dto::{EodFilter, EodReportsResponse};
use crate::models::{EodReport, JobType};
use crate::repositories::TrackingStore;
use crate::services::EodAggregator;
use crate::state::AppState;
use crate::utils::errors::AppError;

pub struct EodController {
    store: Arc<dyn TrackingStore>,
    aggregator: EodAggregator,
    cache: Option<ReportCache>,
}

impl EodController {
    pub fn new(state: &AppState) -> Self {
        Self {
            store: Arc::clone(&state.store),
            aggregator: state.aggregator.clone(),
            cache: state.report_cache.clone(),
        }
    }

    pub async fn generate(
        &self,
        filter: EodFilter,
    ) -> Result<ApiResponse<EodReportsResponse>, AppError> {
        let request = filter.resolve()?;
        let mut reports = self.aggregator.generate(&request).await?;

        if let Some(cache) = &self.cache {
            for report in &reports {
                cache.put(report).await;
            }
        }

        if let Some(job_type) = request.job_type {
            for report in &mut reports {
                retain_job_type(report, job_type);
            }
        }

        let response = EodReportsResponse::new(&request, reports);
        let message = format!("{} reportes EOD generados", response.count);
        Ok(ApiResponse::success_with_message(response, message))
    }

    pub async fn query(&self, filter: EodFilter) -> Result<EodReportsResponse, AppError> {
        let request = filter.resolve()?;

        let cached = match (&self.cache, request.team_id) {
            (Some(cache), Some(team_id)) if request.from == request.to => {
                cache.get(team_id, request.from).await
            }
            _ => None,
        };

        let mut reports = match cached {
            Some(report) => {
                debug!("📥 Reporte EOD servido desde cache: {} {}", report.team_id, report.report_date);
                vec![report]
            }
            None => {
                self.store
                    .eod_reports(request.from, request.to, request.team_id)
                    .await?
            }
        };

        if let Some(job_type) = request.job_type {
            for report in &mut reports {
                retain_job_type(report, job_type);
            }
        }

        info!(
            "📊 Consulta EOD {} a {}: {} reportes",
            request.from,
            request.to,
            reports.len()
        );
        Ok(EodReportsResponse::new(&request, reports))
    }
}

// El filtro por tipo recorta el detalle; el resumen queda como se generó
fn retain_job_type(report: &mut EodReport, job_type: JobType) {
    report.jobs.retain(|job| job.job_type == job_type);
}
