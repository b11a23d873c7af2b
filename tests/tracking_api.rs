use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use futures::StreamExt;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use crew_tracking::config::EnvironmentConfig;
use crew_tracking::models::{Crew, CrewStatus, Job, JobStatus, JobType};
use crew_tracking::repositories::{MemoryStore, TrackingStore};
use crew_tracking::{create_router, AppState};

struct TestApp {
    router: Router,
    state: AppState,
    store: MemoryStore,
    crew: Crew,
    job: Job,
}

async fn create_test_app() -> TestApp {
    let store = MemoryStore::new();
    let crew = Crew::new("Equipo Norte", vec!["Ana".to_string(), "Luis".to_string()]);
    let job = Job::new(JobType::Move, "MV-1001", Some(crew.id)).with_client("Familia Ruiz");
    store.insert_crew(crew.clone()).await;
    store.insert_job(job.clone()).await;

    let state = AppState::new(Arc::new(store.clone()), EnvironmentConfig::default());
    TestApp {
        router: create_router(state.clone()),
        state,
        store,
        crew,
        job,
    }
}

impl TestApp {
    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Request::get(uri).body(Body::empty()).unwrap()).await
    }

    async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    async fn ping(&self, status: &str, at: DateTime<Utc>) -> (StatusCode, Value) {
        self.post(
            "/api/tracking/ping",
            json!({
                "team_id": self.crew.id,
                "lat": 40.4168,
                "lng": -3.7038,
                "status": status,
                "timestamp": at,
            }),
        )
        .await
    }

    async fn start_session(&self) -> Value {
        let (status, body) = self
            .post(
                "/api/tracking/sessions",
                json!({ "job_id": self.job.id, "team_id": self.crew.id }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        body["data"].clone()
    }
}

#[tokio::test]
async fn test_health_check() {
    let app = create_test_app().await;
    let (status, body) = app.get("/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["observers"], 0);
    assert_eq!(body["cache"], "disabled");
}

#[tokio::test]
async fn test_ping_missing_fields_is_validation_error() {
    let app = create_test_app().await;
    let (status, body) = app
        .post(
            "/api/tracking/ping",
            json!({ "team_id": app.crew.id, "lat": 40.0, "lng": -3.0 }),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    // Sin mutación
    let crew = app.state.store.find_crew(app.crew.id).await.unwrap().unwrap();
    assert!(crew.last_update.is_none());
}

#[tokio::test]
async fn test_ping_malformed_body_and_bad_coordinates() {
    let app = create_test_app().await;

    let request = Request::post("/api/tracking/ping")
        .header("content-type", "application/json")
        .body(Body::from("{ not json"))
        .unwrap();
    let (status, body) = app.send(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let (status, body) = app
        .post(
            "/api/tracking/ping",
            json!({
                "team_id": app.crew.id,
                "lat": 123.0,
                "lng": -3.7,
                "status": "en_route",
                "timestamp": Utc::now(),
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let (status, _) = app.ping("teleporting", Utc::now()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_ping_unknown_crew_is_not_found() {
    let app = create_test_app().await;
    let (status, body) = app
        .post(
            "/api/tracking/ping",
            json!({
                "team_id": Uuid::new_v4(),
                "lat": 40.0,
                "lng": -3.0,
                "status": "standby",
                "timestamp": Utc::now(),
            }),
        )
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_ping_without_session_updates_position_only() {
    let app = create_test_app().await;
    let (status, body) = app.ping("en_route", Utc::now()).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["accepted"], true);
    assert_eq!(body["checkpoint"], "no_session");
    assert_eq!(body["current_job_id"], json!(app.job.id));

    let crew = app.state.store.find_crew(app.crew.id).await.unwrap().unwrap();
    assert_eq!(crew.current_lat, Some(40.4168));
    assert!(app
        .state
        .store
        .active_session_for_crew(app.crew.id)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_stale_ping_is_rejected_without_mutation() {
    let app = create_test_app().await;
    let now = Utc::now();

    let (_, first) = app.ping("standby", now).await;
    assert_eq!(first["accepted"], true);

    let (status, stale) = app
        .post(
            "/api/tracking/ping",
            json!({
                "team_id": app.crew.id,
                "lat": 41.0,
                "lng": 2.0,
                "status": "standby",
                "timestamp": now - ChronoDuration::seconds(30),
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stale["accepted"], false);
    assert_eq!(stale["reason"], "stale");

    let crew = app.state.store.find_crew(app.crew.id).await.unwrap().unwrap();
    assert_eq!(crew.current_lat, Some(40.4168));
    assert_eq!(crew.last_update, Some(now));
}

#[tokio::test]
async fn test_full_session_lifecycle() {
    let app = create_test_app().await;
    let session = app.start_session().await;
    let session_id = session["id"].as_str().unwrap().to_string();
    assert_eq!(session["status"], "not_started");

    let start = Utc::now();
    for (i, status) in ["en_route", "arrived", "in_progress", "completed"]
        .iter()
        .enumerate()
    {
        let (code, body) = app
            .ping(status, start + ChronoDuration::seconds(i as i64 + 1))
            .await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(body["checkpoint"], "appended", "status {}", status);
        assert_eq!(body["session_id"], json!(session_id));
    }

    let (status, stored) = app
        .get(&format!("/api/tracking/sessions/{}", session_id))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stored["status"], "completed");
    assert_eq!(stored["checkpoints"].as_array().unwrap().len(), 4);
    assert!(!stored["completed_at"].is_null());

    // Terminada: ya no aparece como activa
    let (_, snapshot) = app.get("/api/tracking/snapshot").await;
    assert!(snapshot["activeSessions"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_backward_checkpoint_is_rejected_but_position_applies() {
    let app = create_test_app().await;
    app.start_session().await;
    let start = Utc::now();

    app.ping("arrived", start + ChronoDuration::seconds(1)).await;
    let (status, body) = app
        .ping("en_route", start + ChronoDuration::seconds(2))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["accepted"], true);
    assert_eq!(body["checkpoint"], "rejected");

    let crew = app.state.store.find_crew(app.crew.id).await.unwrap().unwrap();
    assert_eq!(crew.last_update, Some(start + ChronoDuration::seconds(2)));
}

#[tokio::test]
async fn test_second_session_for_crew_conflicts() {
    let app = create_test_app().await;
    let first = app.start_session().await;

    // Mismo trabajo: idempotente
    let again = app.start_session().await;
    assert_eq!(again["id"], first["id"]);

    let other = Job::new(JobType::Delivery, "DL-2001", Some(app.crew.id));
    app.store.insert_job(other.clone()).await;
    let (status, body) = app
        .post(
            "/api/tracking/sessions",
            json!({ "job_id": other.id, "team_id": app.crew.id }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT, "{}", body);
    assert_eq!(body["code"], "CONFLICT");

    // Trabajo de otro equipo
    let foreign = Job::new(JobType::Move, "MV-3001", Some(Uuid::new_v4()));
    app.store.insert_job(foreign.clone()).await;
    let (status, _) = app
        .post(
            "/api/tracking/sessions",
            json!({ "job_id": foreign.id, "team_id": app.crew.id }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_cancel_session() {
    let app = create_test_app().await;
    let session = app.start_session().await;
    let uri = format!("/api/tracking/sessions/{}/cancel", session["id"].as_str().unwrap());

    let (status, body) = app.post(&uri, json!({ "note": "cliente ausente" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "cancelled");
    let checkpoints = body["data"]["checkpoints"].as_array().unwrap();
    assert_eq!(checkpoints.last().unwrap()["note"], "cliente ausente");

    let (status, body) = app.post(&uri, json!({})).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "CONFLICT");
}

#[tokio::test]
async fn test_cancel_with_malformed_body_keeps_session_active() {
    let app = create_test_app().await;
    let session = app.start_session().await;
    let uri = format!("/api/tracking/sessions/{}/cancel", session["id"].as_str().unwrap());

    let request = Request::post(&uri)
        .header("content-type", "application/json")
        .body(Body::from("{ \"note\": "))
        .unwrap();
    let (status, body) = app.send(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
    assert!(app
        .state
        .store
        .active_session_for_crew(app.crew.id)
        .await
        .unwrap()
        .is_some());

    // Sin cuerpo la cancelación procede sin nota
    let (status, body) = app
        .send(Request::post(&uri).body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "cancelled");
}

#[tokio::test]
async fn test_unknown_session_is_not_found() {
    let app = create_test_app().await;
    let (status, _) = app
        .get(&format!("/api/tracking/sessions/{}", Uuid::new_v4()))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_crew_jobs_and_snapshot() {
    let app = create_test_app().await;

    let (status, body) = app
        .get(&format!("/api/tracking/crews/{}/jobs", app.crew.id))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["currentJob"]["id"], json!(app.job.id));
    assert_eq!(body["currentJob"]["displayId"], "MV-1001");
    assert!(body["nextJob"].is_null());

    app.start_session().await;
    let (status, snapshot) = app.get("/api/tracking/snapshot").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(snapshot["pollIntervalSecs"], 15);
    assert_eq!(snapshot["crews"].as_array().unwrap().len(), 1);
    assert_eq!(snapshot["crews"][0]["currentJob"]["id"], json!(app.job.id));
    assert_eq!(snapshot["activeSessions"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_crew_without_pending_jobs_reports_standby() {
    let app = create_test_app().await;
    let (status, body) = app.ping("en_route", Utc::now()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["accepted"], true);

    let crew = app.state.store.find_crew(app.crew.id).await.unwrap().unwrap();
    assert_eq!(crew.status, CrewStatus::EnRoute);

    app.store
        .insert_job(app.job.clone().with_status(JobStatus::Completed))
        .await;

    let (status, body) = app
        .get(&format!("/api/tracking/crews/{}/jobs", app.crew.id))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["currentJob"].is_null());
    assert!(body["nextJob"].is_null());
    assert_eq!(body["status"], "standby");

    let (_, snapshot) = app.get("/api/tracking/snapshot").await;
    assert_eq!(snapshot["crews"][0]["status"], "standby");
    assert!(snapshot["crews"][0]["currentJob"].is_null());
}

async fn next_event(stream: &mut axum::body::BodyDataStream) -> String {
    let mut event = String::new();
    while !event.contains("\n\n") {
        let chunk = tokio::time::timeout(Duration::from_secs(2), stream.next())
            .await
            .expect("stream quedó en silencio")
            .expect("stream cerrado")
            .unwrap();
        event.push_str(&String::from_utf8_lossy(&chunk));
    }
    event
}

#[tokio::test]
async fn test_stream_sends_full_state_then_deltas() {
    let app = create_test_app().await;
    let session = app.start_session().await;
    let session_id = session["id"].as_str().unwrap().to_string();

    let response = app
        .router
        .clone()
        .oneshot(Request::get("/api/tracking/stream").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let mut stream = response.into_body().into_data_stream();

    let first = next_event(&mut stream).await;
    assert!(first.contains("event: sessions"));
    assert!(first.contains(&session_id));
    assert!(first.contains("detailHref"));
    assert_eq!(app.state.broadcaster.observer_count().await, 1);

    app.ping("en_route", Utc::now()).await;
    // El delta del inicio de sesión puede llegar antes que el del ping
    let mut delta = next_event(&mut stream).await;
    if !delta.contains("\"status\":\"en_route\"") {
        delta = next_event(&mut stream).await;
    }
    assert!(delta.contains("event: sessions"));
    assert!(delta.contains("\"status\":\"en_route\""));
    assert!(delta.contains("Equipo Norte"));
}
