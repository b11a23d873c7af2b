use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::dto::api_response::ApiResponse;
use crate::dto::tracking_dto::{
    CancelSessionRequest, CrewJobsResponse, PingRequest, PingResponse, StartSessionRequest,
    TrackingSnapshot,
};
use crate::models::TrackingSession;
use crate::repositories::TrackingStore;
use crate::services::broadcaster::build_snapshot;
use crate::services::{CrewJobResolver, IngestionGateway, PositionPing};
use crate::state::AppState;
use crate::utils::errors::{not_found_error, AppError};

pub struct TrackingController {
    store: Arc<dyn TrackingStore>,
    gateway: Arc<IngestionGateway>,
    poll_interval: Duration,
}

impl TrackingController {
    pub fn new(state: &AppState) -> Self {
        Self {
            store: Arc::clone(&state.store),
            gateway: Arc::clone(&state.gateway),
            poll_interval: state.config.poll_interval,
        }
    }

    pub async fn ping(&self, request: PingRequest) -> Result<PingResponse, AppError> {
        let ping = PositionPing::try_from(request)?;
        let outcome = self.gateway.ingest(ping).await?;
        Ok(outcome.into())
    }

    pub async fn snapshot(&self) -> Result<TrackingSnapshot, AppError> {
        build_snapshot(self.store.as_ref(), self.poll_interval).await
    }

    pub async fn get_session(&self, id: Uuid) -> Result<TrackingSession, AppError> {
        self.store
            .find_session(id)
            .await?
            .ok_or_else(|| not_found_error("TrackingSession", &id.to_string()))
    }

    pub async fn start_session(
        &self,
        request: StartSessionRequest,
    ) -> Result<ApiResponse<TrackingSession>, AppError> {
        let session = self
            .gateway
            .start_session(request.job_id, request.team_id)
            .await?;

        info!("🟢 Sesión {} activa para el equipo {}", session.id, session.team_id);
        Ok(ApiResponse::success_with_message(
            session,
            "Sesión de seguimiento iniciada".to_string(),
        ))
    }

    pub async fn cancel_session(
        &self,
        id: Uuid,
        request: CancelSessionRequest,
    ) -> Result<ApiResponse<TrackingSession>, AppError> {
        request.validate()?;
        let session = self.gateway.cancel_session(id, request.note).await?;

        Ok(ApiResponse::success_with_message(
            session,
            "Sesión cancelada".to_string(),
        ))
    }

    pub async fn crew_jobs(&self, team_id: Uuid) -> Result<CrewJobsResponse, AppError> {
        let crew = self
            .store
            .find_crew(team_id)
            .await?
            .ok_or_else(|| not_found_error("Crew", &team_id.to_string()))?;
        let resolution = CrewJobResolver::resolve_for_crew(self.store.as_ref(), team_id).await?;

        Ok(CrewJobsResponse {
            team_id,
            status: resolution.effective_status(crew.status),
            current_job: resolution.current_ref(),
            next_job: resolution.next_ref(),
        })
    }
}
