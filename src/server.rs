//! HTTP API over a training session.
//!
//! Provides REST endpoints for logging sets and reading capacity, scores and
//! leaderboards, a WebSocket that pushes engine events, and optional static
//! file serving for a frontend.

use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post, put},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tower_http::services::ServeDir;

use crate::capacity::SetOutcome;
use crate::catalog::ExerciseCatalog;
use crate::config::Tuning;
use crate::domain::{MuscleCapacity, UserProfile};
use crate::error::EngineError;
use crate::leaderboard::LeaderboardQuery;
use crate::ranking::LeaderboardEntry;
use crate::records::CapacityLimits;
use crate::scoring::StrengthScore;
use crate::session::{ProfileUpdate, TrainingSession};

/// Shared application state.
pub struct AppState {
    pub session: Arc<TrainingSession>,
    pub catalog: Arc<ExerciseCatalog>,
}

// === Request / Response Types ===

#[derive(Deserialize)]
pub struct LogSetRequest {
    pub exercise: String,
    /// A weight token: `"135"`, `"Bodyweight"`, `"+25"`, `"-10"`.
    pub weight: String,
    pub reps: u32,
}

#[derive(Deserialize)]
pub struct LeaderboardParams {
    pub sort: Option<String>,
    pub time: Option<String>,
    pub location: Option<String>,
    pub score: Option<String>,
    pub value: Option<String>,
}

#[derive(Serialize)]
pub struct CapacityResponse {
    /// Stored capacity, as of the last applied event.
    pub stored: MuscleCapacity,
    /// Capacity recovered up to now.
    pub projected: MuscleCapacity,
    pub most_fatigued: Option<MuscleStatus>,
}

#[derive(Serialize)]
pub struct MuscleStatus {
    pub muscle: String,
    pub capacity: f64,
}

#[derive(Serialize)]
pub struct ScoreResponse {
    pub profile: UserProfile,
    #[serde(flatten)]
    pub score: StrengthScore,
    /// Best estimated 1RM of every exercise.
    pub limits: CapacityLimits,
    pub sync_pending: bool,
}

#[derive(Serialize)]
pub struct RecomputeResponse {
    pub updated: usize,
}

#[derive(Serialize)]
pub struct ExerciseSummary {
    pub name: String,
    pub weights: Vec<String>,
    pub min_reps: u32,
    pub max_reps: u32,
    pub met: f64,
    pub muscles: Vec<String>,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

/// Maps engine errors onto HTTP status codes.
pub struct ApiError(EngineError);

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            EngineError::InvalidReps
            | EngineError::RepsOutOfRange { .. }
            | EngineError::Parse(_) => StatusCode::BAD_REQUEST,
            EngineError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            EngineError::Sync(_) => StatusCode::BAD_GATEWAY,
        };
        if status.is_server_error() {
            log::error!("Request failed: {}", self.0);
        }
        (
            status,
            Json(ErrorBody {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

// === Router Setup ===

/// Creates the application router.
pub fn create_router(state: Arc<AppState>, static_dir: Option<PathBuf>) -> Router {
    let router = Router::new()
        .route("/api/exercises", get(get_exercises))
        .route("/api/sets", post(log_set))
        .route("/api/capacity", get(get_capacity))
        .route("/api/focus", post(focus))
        .route("/api/score", get(get_score))
        .route("/api/leaderboard", get(get_leaderboard))
        .route("/api/tuning", get(get_tuning))
        .route("/api/reset", post(reset_scores))
        .route("/api/profile", put(update_profile))
        .route("/api/records/recompute", post(recompute_records))
        .route("/ws", get(ws_handler));

    let router = match static_dir {
        Some(dir) => {
            router.fallback_service(ServeDir::new(dir).append_index_html_on_directories(true))
        }
        None => router,
    };
    router.with_state(state)
}

/// Runs the web server until `shutdown` resolves.
pub async fn run_server(
    state: Arc<AppState>,
    port: u16,
    static_dir: Option<PathBuf>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = create_router(state, static_dir);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("Server running at http://localhost:{}", port);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}

// === WebSocket Handler ===

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_ws_connection(socket, state))
}

/// Forwards engine events to one client as JSON text frames.
async fn handle_ws_connection(mut socket: WebSocket, state: Arc<AppState>) {
    log::info!("WebSocket client connected");

    let mut rx = state.session.subscribe();

    loop {
        tokio::select! {
            event = rx.recv() => {
                let text = match event {
                    Ok(event) => match serde_json::to_string(&event) {
                        Ok(text) => text,
                        Err(e) => {
                            log::warn!("Cannot encode event: {}", e);
                            continue;
                        }
                    },
                    // Client fell behind; tell it to refetch everything.
                    Err(broadcast::error::RecvError::Lagged(_)) => r#"{"type":"resync"}"#.to_string(),
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                if socket.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            result = socket.recv() => {
                match result {
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }

    log::info!("WebSocket client disconnected");
}

// === API Handlers ===

/// GET /api/exercises - Catalog with selectable weights.
async fn get_exercises(State(state): State<Arc<AppState>>) -> Json<Vec<ExerciseSummary>> {
    let exercises = state
        .catalog
        .iter()
        .map(|e| ExerciseSummary {
            name: e.name.to_string(),
            weights: e.weight_domain.options(),
            min_reps: *e.rep_domain.start(),
            max_reps: *e.rep_domain.end(),
            met: e.met,
            muscles: e
                .involvement_shares()
                .iter()
                .map(|(m, _)| m.to_string())
                .collect(),
        })
        .collect();
    Json(exercises)
}

/// POST /api/sets - Log a completed set.
async fn log_set(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LogSetRequest>,
) -> ApiResult<SetOutcome> {
    let outcome = state
        .session
        .log_set(&request.exercise, &request.weight, request.reps)
        .await?;
    Ok(Json(outcome))
}

/// GET /api/capacity - Stored and projected capacity.
async fn get_capacity(State(state): State<Arc<AppState>>) -> Json<CapacityResponse> {
    let stored = state.session.capacity_snapshot().await;
    let projected = state.session.projected_capacity(Utc::now()).await;
    let most_fatigued = projected
        .most_fatigued()
        .map(|(muscle, capacity)| MuscleStatus {
            muscle: muscle.to_string(),
            capacity,
        });

    Json(CapacityResponse {
        stored,
        projected,
        most_fatigued,
    })
}

/// POST /api/focus - Client regained focus; catch recovery up.
async fn focus(State(state): State<Arc<AppState>>) -> ApiResult<MuscleCapacity> {
    Ok(Json(state.session.on_focus(Utc::now()).await?))
}

/// GET /api/score - Current strength score.
async fn get_score(State(state): State<Arc<AppState>>) -> Json<ScoreResponse> {
    Json(ScoreResponse {
        profile: state.session.profile().await,
        score: state.session.score().await,
        limits: state.session.limits().await,
        sync_pending: state.session.sync_pending(),
    })
}

/// GET /api/tuning - Recovery rates and drain coefficients in effect.
async fn get_tuning(State(state): State<Arc<AppState>>) -> Json<Tuning> {
    Json(state.session.tuning().await)
}

/// GET /api/leaderboard - Ranked entries for a filter combination.
async fn get_leaderboard(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LeaderboardParams>,
) -> ApiResult<Vec<LeaderboardEntry>> {
    let query = LeaderboardQuery::parse(
        params.sort.as_deref(),
        params.time.as_deref(),
        params.location.as_deref(),
        params.score.as_deref(),
        params.value.as_deref(),
    )
    .map_err(EngineError::from)?;
    Ok(Json(state.session.leaderboard(query).await?))
}

/// POST /api/reset - Reset limits to catalog defaults.
async fn reset_scores(State(state): State<Arc<AppState>>) -> ApiResult<StrengthScore> {
    Ok(Json(state.session.reset_scores().await?))
}

/// PUT /api/profile - Update body data.
async fn update_profile(
    State(state): State<Arc<AppState>>,
    Json(update): Json<ProfileUpdate>,
) -> ApiResult<UserProfile> {
    Ok(Json(state.session.update_profile(update).await?))
}

/// POST /api/records/recompute - Raise limits from history.
async fn recompute_records(State(state): State<Arc<AppState>>) -> ApiResult<RecomputeResponse> {
    let updated = state.session.recompute_records().await?;
    Ok(Json(RecomputeResponse { updated }))
}
