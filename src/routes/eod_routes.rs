use axum::{
    extract::{rejection::JsonRejection, Query, State},
    routing::{get, post},
    Json, Router,
};

use crate::controllers::eod_controller::EodController;
use crate::dto::api_response::ApiResponse;
use crate::dto::eod_dto::{EodFilter, EodReportsResponse};
use crate::state::AppState;
use crate::utils::errors::{validation_error, AppError};

pub fn create_eod_router() -> Router<AppState> {
    Router::new()
        .route("/reports", get(query_reports))
        .route("/reports/generate", post(generate_reports))
}

async fn generate_reports(
    State(state): State<AppState>,
    payload: Result<Json<EodFilter>, JsonRejection>,
) -> Result<Json<ApiResponse<EodReportsResponse>>, AppError> {
    let Json(filter) = payload.map_err(|rejection| validation_error("body", &rejection.body_text()))?;
    let controller = EodController::new(&state);
    let response = controller.generate(filter).await?;
    Ok(Json(response))
}

async fn query_reports(
    State(state): State<AppState>,
    Query(filter): Query<EodFilter>,
) -> Result<Json<EodReportsResponse>, AppError> {
    let controller = EodController::new(&state);
    let response = controller.query(filter).await?;
    Ok(Json(response))
}
