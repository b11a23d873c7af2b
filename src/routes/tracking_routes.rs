use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use tokio_stream::{wrappers::ReceiverStream, Stream, StreamExt};
use tracing::{info, warn};
use uuid::Uuid;

use crate::controllers::tracking_controller::TrackingController;
use crate::dto::api_response::ApiResponse;
use crate::dto::tracking_dto::{
    CancelSessionRequest, CrewJobsResponse, LiveDelta, PingRequest, PingResponse,
    StartSessionRequest, TrackingSnapshot,
};
use crate::models::TrackingSession;
use crate::services::broadcaster::{full_delta, Broadcaster, ObserverId};
use crate::state::AppState;
use crate::utils::errors::{validation_error, AppError};

/// Nombre del evento SSE que transporta los deltas
pub const SESSIONS_EVENT: &str = "sessions";

pub fn create_tracking_router() -> Router<AppState> {
    Router::new()
        .route("/ping", post(ingest_ping))
        .route("/snapshot", get(get_snapshot))
        .route("/stream", get(stream_sessions))
        .route("/sessions", post(start_session))
        .route("/sessions/:id", get(get_session))
        .route("/sessions/:id/cancel", post(cancel_session))
        .route("/crews/:id/jobs", get(get_crew_jobs))
}

// Un cuerpo ilegible es un error de validación, no un 422 genérico de axum
fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| validation_error("body", &rejection.body_text()))
}

async fn ingest_ping(
    State(state): State<AppState>,
    payload: Result<Json<PingRequest>, JsonRejection>,
) -> Result<Json<PingResponse>, AppError> {
    let request = json_body(payload)?;
    let controller = TrackingController::new(&state);
    let response = controller.ping(request).await?;
    Ok(Json(response))
}

async fn get_snapshot(State(state): State<AppState>) -> Result<Json<TrackingSnapshot>, AppError> {
    let controller = TrackingController::new(&state);
    let snapshot = controller.snapshot().await?;
    Ok(Json(snapshot))
}

async fn stream_sessions(
    State(state): State<AppState>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    // Suscribir antes de leer el estado completo para no perder deltas;
    // el primer evento lleva todas las sesiones activas
    let (observer_id, receiver) = state.broadcaster.subscribe().await;
    let guard = ObserverGuard {
        broadcaster: Arc::clone(&state.broadcaster),
        id: observer_id,
    };
    let initial = full_delta(state.store.as_ref()).await?;
    info!("📡 Observador {} conectado al stream de sesiones", observer_id);

    let live = ReceiverStream::new(receiver).map(|delta| (*delta).clone());
    let stream = tokio_stream::once(initial)
        .chain(live)
        .filter_map(move |delta| {
            let _connected = &guard;
            to_event(&delta).map(Ok)
        });

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    ))
}

// Retira al observador en cuanto el cliente cierra la conexión
struct ObserverGuard {
    broadcaster: Arc<Broadcaster>,
    id: ObserverId,
}

impl Drop for ObserverGuard {
    fn drop(&mut self) {
        let broadcaster = Arc::clone(&self.broadcaster);
        let id = self.id;
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                broadcaster.unregister(id).await;
            });
        }
    }
}

fn to_event(delta: &LiveDelta) -> Option<Event> {
    match Event::default().event(SESSIONS_EVENT).json_data(delta) {
        Ok(event) => Some(event),
        Err(e) => {
            warn!("⚠️ Delta no serializable, se omite: {}", e);
            None
        }
    }
}

async fn start_session(
    State(state): State<AppState>,
    payload: Result<Json<StartSessionRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<TrackingSession>>, AppError> {
    let request = json_body(payload)?;
    let controller = TrackingController::new(&state);
    let response = controller.start_session(request).await?;
    Ok(Json(response))
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<TrackingSession>, AppError> {
    let controller = TrackingController::new(&state);
    let session = controller.get_session(id).await?;
    Ok(Json(session))
}

async fn cancel_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    payload: Result<Json<CancelSessionRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<TrackingSession>>, AppError> {
    // Sin cuerpo se cancela sin nota; un cuerpo JSON inválido es un error
    let request = match payload {
        Err(JsonRejection::MissingJsonContentType(_)) => CancelSessionRequest::default(),
        other => json_body(other)?,
    };
    let controller = TrackingController::new(&state);
    let response = controller.cancel_session(id, request).await?;
    Ok(Json(response))
}

async fn get_crew_jobs(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<CrewJobsResponse>, AppError> {
    let controller = TrackingController::new(&state);
    let response = controller.crew_jobs(id).await?;
    Ok(Json(response))
}
