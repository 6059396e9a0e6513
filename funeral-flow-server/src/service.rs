use axum::{
    Router,
    extract::{Path, State},
    http::{HeaderValue, Request, StatusCode},
    middleware::{Next, from_fn},
    response::Json,
    routing::{delete, get, patch, post, put},
};
use dashmap::DashMap;
use funeral_flow::{
    BookingConfig, BookingError, BookingSession, CemeteryCategory, DraftStore, Navigation,
    SessionView,
};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex, MutexGuard};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{Instrument, error, info, warn};
use uuid::Uuid;

use crate::{
    config::ServiceConfig,
    models::{
        CategoryRequest, FieldUpdateRequest, OpenSessionRequest, QuoteResponse, UpdateResponse,
        draft_status,
    },
    profiles::Profiles,
};

type ApiResult<T> = Result<Json<T>, ApiError>;
type ApiError = (StatusCode, Json<Value>);

fn bad_request_error(message: &str) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message })))
}

fn not_found_error(message: &str, id: &str) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": message,
            "session_id": id
        })),
    )
}

fn internal_error(message: &str, details: &str) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "error": message,
            "details": details
        })),
    )
}

fn booking_error(session_id: &str, e: BookingError) -> ApiError {
    match e {
        BookingError::UnknownField(_)
        | BookingError::InvalidFieldValue { .. }
        | BookingError::StepNotFound(_) => {
            info!(session_id = %session_id, error = %e, "Rejected booking request");
            bad_request_error(&e.to_string())
        }
        other => {
            error!(session_id = %session_id, error = %other, "Booking request failed");
            internal_error("Booking request failed", &other.to_string())
        }
    }
}

type SharedSession = Arc<Mutex<BookingSession>>;

#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<DashMap<String, SharedSession>>,
    pub profiles: Arc<Profiles>,
    pub booking: Arc<BookingConfig>,
}

impl AppState {
    pub fn new(profiles: Profiles, booking: BookingConfig) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            profiles: Arc::new(profiles),
            booking: Arc::new(booking),
        }
    }

    pub fn from_config(config: &ServiceConfig) -> Self {
        Self::new(Profiles::from_config(config), config.booking.clone())
    }

    fn session(&self, session_id: &str) -> Result<SharedSession, ApiError> {
        self.sessions
            .get(session_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| not_found_error("Session not found", session_id))
    }
}

fn lock<'a>(
    session: &'a SharedSession,
    session_id: &str,
) -> Result<MutexGuard<'a, BookingSession>, ApiError> {
    session.lock().map_err(|_| {
        error!(session_id = %session_id, "Session lock poisoned");
        internal_error("Session state unavailable", session_id)
    })
}

/// Tags every request with an `x-correlation-id` header and a matching span
async fn correlation_id_middleware(
    mut request: Request<axum::body::Body>,
    next: Next,
) -> axum::response::Response {
    let correlation_id = Uuid::new_v4().to_string();
    if let Ok(value) = HeaderValue::from_str(&correlation_id) {
        request.headers_mut().insert("x-correlation-id", value);
    }

    let span = tracing::info_span!("http_request", correlation_id = %correlation_id);
    next.run(request).instrument(span).await
}

pub fn create_app(config: &ServiceConfig) -> Router {
    build_router(AppState::from_config(config))
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/bookings", post(open_session))
        .route("/bookings/{session_id}", get(get_session).delete(close_session))
        .route("/bookings/{session_id}/fields", patch(update_fields))
        .route("/bookings/{session_id}/step", post(change_step))
        .route("/bookings/{session_id}/category", put(set_category))
        .route("/bookings/{session_id}/quote", get(get_quote))
        .route("/bookings/{session_id}/draft", delete(reset_draft))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(from_fn(correlation_id_middleware)),
        )
        .with_state(app_state)
}

async fn health_check() -> &'static str {
    "OK"
}

async fn open_session(
    State(state): State<AppState>,
    Json(request): Json<OpenSessionRequest>,
) -> ApiResult<SessionView> {
    let session_id = match request.session_id {
        Some(id) => {
            let Ok(parsed) = Uuid::parse_str(&id) else {
                warn!(session_id = %id, "Invalid session ID format");
                return Err(bad_request_error("Invalid session ID format"));
            };
            parsed.to_string()
        }
        None => Uuid::new_v4().to_string(),
    };

    if let Some(existing) = state.sessions.get(&session_id).map(|e| e.value().clone()) {
        let session = lock(&existing, &session_id)?;
        return Ok(Json(session.view()));
    }

    let store = state.profiles.open(&session_id).map_err(|e| {
        error!(session_id = %session_id, error = %e, "Failed to open session store");
        internal_error("Failed to open session store", &e.to_string())
    })?;
    let drafts = DraftStore::new(store, &state.booking);
    let session = BookingSession::open(session_id.clone(), drafts, state.booking.prices.clone());
    let view = session.view();

    state
        .sessions
        .entry(session_id.clone())
        .or_insert_with(|| Arc::new(Mutex::new(session)));
    info!(session_id = %session_id, "Session ready");

    Ok(Json(view))
}

async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<SessionView> {
    let shared = state.session(&session_id)?;
    let session = lock(&shared, &session_id)?;
    Ok(Json(session.view()))
}

/// Drop an open session and release its in-memory store
async fn close_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Value> {
    if state.sessions.remove(&session_id).is_none() {
        return Err(not_found_error("Session not found", &session_id));
    }
    state.profiles.close(&session_id);
    info!(session_id = %session_id, "Session closed");

    Ok(Json(json!({
        "session_id": session_id,
        "status": "closed"
    })))
}

async fn update_fields(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<FieldUpdateRequest>,
) -> ApiResult<UpdateResponse> {
    let shared = state.session(&session_id)?;
    let mut session = lock(&shared, &session_id)?;

    let outcome = match request {
        FieldUpdateRequest::Single(update) => session.update_field(&update.field, update.value),
        FieldUpdateRequest::Batch { updates } => session.update_fields(updates),
    }
    .map_err(|e| booking_error(&session_id, e))?;

    Ok(Json(UpdateResponse {
        draft: draft_status(&outcome),
        view: session.view(),
    }))
}

async fn change_step(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(navigation): Json<Navigation>,
) -> ApiResult<SessionView> {
    let shared = state.session(&session_id)?;
    let mut session = lock(&shared, &session_id)?;
    session
        .navigate(navigation)
        .map_err(|e| booking_error(&session_id, e))?;
    Ok(Json(session.view()))
}

async fn set_category(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<CategoryRequest>,
) -> ApiResult<SessionView> {
    let category = request.category.as_deref().and_then(CemeteryCategory::parse);
    if category.is_none() {
        info!(
            session_id = %session_id,
            requested = ?request.category,
            "Unknown cemetery category, base price will be zero"
        );
    }

    let shared = state.session(&session_id)?;
    let mut session = lock(&shared, &session_id)?;
    session.set_category(category);
    Ok(Json(session.view()))
}

async fn get_quote(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<QuoteResponse> {
    let shared = state.session(&session_id)?;
    let session = lock(&shared, &session_id)?;
    let breakdown = session.breakdown();
    Ok(Json(QuoteResponse {
        session_id: session_id.clone(),
        category: session.category(),
        total: breakdown.total,
        breakdown,
    }))
}

async fn reset_draft(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<SessionView> {
    let shared = state.session(&session_id)?;
    let mut session = lock(&shared, &session_id)?;
    session.reset();
    Ok(Json(session.view()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profiles::ProfileBackend;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn memory_app() -> Router {
        build_router(AppState::new(
            Profiles::new(ProfileBackend::Memory, None),
            BookingConfig::default(),
        ))
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&body).unwrap()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn open_new(app: &Router) -> String {
        let (status, body) = send(app, "POST", "/bookings", Some(json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        body["session_id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_health() {
        let app = memory_app();
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_open_session_starts_at_first_step() {
        let app = memory_app();
        let (status, body) = send(&app, "POST", "/bookings", Some(json!({}))).await;

        assert_eq!(status, StatusCode::OK);
        assert!(Uuid::parse_str(body["session_id"].as_str().unwrap()).is_ok());
        assert_eq!(body["step_index"], 0);
        assert_eq!(body["category"], "standard");
        assert_eq!(body["price_summary"], Value::Null);
        assert_eq!(body["form"]["hallDuration"], 60);
        assert_eq!(body["steps"][0]["status"], "active");
    }

    #[tokio::test]
    async fn test_booking_flow_prices_the_selection() {
        let app = memory_app();
        let id = open_new(&app).await;

        let (status, body) = send(
            &app,
            "PATCH",
            &format!("/bookings/{id}/fields"),
            Some(json!({"updates": [
                {"field": "hallDuration", "value": 30},
                {"field": "needsFamilyTransport", "value": true},
                {"field": "familyTransportSeats", "value": "3"},
                {"field": "selectedAdditionalServices", "value": ["flowers", "music"]}
            ]})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["draft"], "saved");
        assert_eq!(body["form"]["familyTransportSeats"], 3);

        let (status, body) = send(
            &app,
            "PUT",
            &format!("/bookings/{id}/category"),
            Some(json!({"category": "premium"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["category"], "premium");

        let (_, body) = send(
            &app,
            "POST",
            &format!("/bookings/{id}/step"),
            Some(json!({"action": "goto", "step": 2})),
        )
        .await;
        assert_eq!(body["shows_package_chooser"], true);
        assert_eq!(body["price_summary"]["total"], 120_000 + 4_000 + 4_500 + 10_000);

        let (status, body) = send(&app, "GET", &format!("/bookings/{id}/quote"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 120_000 + 4_000 + 4_500 + 10_000);
        assert_eq!(body["breakdown"]["items"].as_array().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_rejected_requests() {
        let app = memory_app();
        let id = open_new(&app).await;

        let (status, _) = send(
            &app,
            "PATCH",
            &format!("/bookings/{id}/fields"),
            Some(json!({"field": "hasHall", "value": "maybe"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &app,
            "PATCH",
            &format!("/bookings/{id}/fields"),
            Some(json!({"field": "shoeSize", "value": 42})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &app,
            "POST",
            &format!("/bookings/{id}/step"),
            Some(json!({"action": "goto", "step": 9})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let unknown = Uuid::new_v4();
        let (status, body) = send(&app, "GET", &format!("/bookings/{unknown}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["session_id"], unknown.to_string());

        let (status, _) =
            send(&app, "POST", "/bookings", Some(json!({"session_id": "../etc"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_closed_session_is_forgotten() {
        let state = AppState::new(
            Profiles::new(ProfileBackend::Memory, None),
            BookingConfig::default(),
        );
        let app = build_router(state.clone());
        let id = open_new(&app).await;
        assert_eq!(state.sessions.len(), 1);
        assert_eq!(state.profiles.held(), 1);

        let (status, body) = send(&app, "DELETE", &format!("/bookings/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "closed");
        assert!(state.sessions.is_empty());
        assert_eq!(state.profiles.held(), 0);

        let (status, _) = send(&app, "GET", &format!("/bookings/{id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(&app, "DELETE", &format!("/bookings/{id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unknown_category_prices_base_at_zero() {
        let app = memory_app();
        let id = open_new(&app).await;
        send(
            &app,
            "PATCH",
            &format!("/bookings/{id}/fields"),
            Some(json!({"field": "hasHall", "value": false})),
        )
        .await;

        let (status, body) = send(
            &app,
            "PUT",
            &format!("/bookings/{id}/category"),
            Some(json!({"category": "royal"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["category"], Value::Null);

        let (_, body) = send(&app, "GET", &format!("/bookings/{id}/quote"), None).await;
        assert_eq!(body["total"], 0);
    }

    #[tokio::test]
    async fn test_draft_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let backend = ProfileBackend::Directory(dir.path().to_path_buf());

        let first = build_router(AppState::new(
            Profiles::new(backend.clone(), None),
            BookingConfig::default(),
        ));
        let id = open_new(&first).await;
        send(
            &first,
            "PATCH",
            &format!("/bookings/{id}/fields"),
            Some(json!({"field": "fullName", "value": "Pyotr Ilyich"})),
        )
        .await;

        let second = build_router(AppState::new(
            Profiles::new(backend, None),
            BookingConfig::default(),
        ));
        let (status, _) = send(&second, "GET", &format!("/bookings/{id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) =
            send(&second, "POST", "/bookings", Some(json!({"session_id": id}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["form"]["fullName"], "Pyotr Ilyich");

        let (status, body) = send(&second, "DELETE", &format!("/bookings/{id}/draft"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["form"]["fullName"], "");
    }
}
