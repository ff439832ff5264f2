//! HTTP handlers and router.

use crate::analysis::{AnalysisError, AnalysisResult};
use crate::auth::AuthUser;
use crate::config::{Config, DotenvStatus};
use crate::credentials::mask;
use crate::db::TrailDocuments;
use crate::emotions::PositiveEmotion;
use crate::gemini::EmotionAnalyzer;
use crate::ranker::{RankedTrail, Ranker, TrailRecommendation};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use utoipa::{OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;
use uuid::Uuid;

const SAMPLE_COLUMN_COUNT: usize = 10;

pub struct AppState {
    pub config: Config,
    pub analyzer: Arc<EmotionAnalyzer>,
    pub ranker: Ranker,
    pub store: Arc<dyn TrailDocuments>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

impl ErrorBody {
    pub fn new(error: &str, message: &str) -> Self {
        Self {
            error: error.to_string(),
            message: message.to_string(),
        }
    }
}

impl From<&AnalysisError> for ErrorBody {
    fn from(err: &AnalysisError) -> Self {
        ErrorBody::new(err.code(), &err.to_string())
    }
}

fn analysis_status(err: &AnalysisError) -> StatusCode {
    match err {
        AnalysisError::EmptyResult => StatusCode::OK,
        AnalysisError::ConfigurationMissing => StatusCode::SERVICE_UNAVAILABLE,
        AnalysisError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        AnalysisError::CallFailed(_) => StatusCode::BAD_GATEWAY,
    }
}

// ---- request / response types ----

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AnalyzeRequest {
    /// Free text describing how the user feels.
    #[serde(default)]
    pub text: String,
    pub location: Option<Location>,
}

#[derive(Debug, Serialize)]
pub struct AnalyzedText {
    #[serde(flatten)]
    pub result: AnalysisResult,
    pub analyzed_at: DateTime<Utc>,
}

/// Either the analysis or the reason it failed.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum AnalysisOutcome {
    Analyzed(AnalyzedText),
    Failed(ErrorBody),
}

#[derive(Debug, Default, Serialize, ToSchema)]
pub struct TrailPayload {
    pub trails: Vec<RankedTrail>,
    pub more: Vec<RankedTrail>,
    #[schema(value_type = Vec<String>)]
    pub positive_emotions_used: Vec<PositiveEmotion>,
}

impl From<TrailRecommendation> for TrailPayload {
    fn from(rec: TrailRecommendation) -> Self {
        Self {
            trails: rec.top,
            more: rec.more,
            positive_emotions_used: rec.positive_emotions_used,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AnalyzeResponse {
    #[schema(value_type = Object)]
    pub analysis: AnalysisOutcome,
    pub trail: TrailPayload,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct KeyDiagnostics {
    pub raw_present: bool,
    pub sanitized_present: bool,
    pub raw_len: usize,
    pub sanitized_len: usize,
    pub raw_preview: Option<String>,
    pub sanitized_preview: Option<String>,
    pub problem: Option<String>,
}

impl KeyDiagnostics {
    fn from_config(config: &Config) -> Self {
        let raw = config.gemini_key_raw.as_deref();
        let sanitized = config.gemini_api_key.as_deref();
        Self {
            raw_present: raw.is_some(),
            sanitized_present: sanitized.is_some(),
            raw_len: raw.map_or(0, |r| r.chars().count()),
            sanitized_len: sanitized.map_or(0, str::len),
            raw_preview: raw.map(|r| mask(r.trim())),
            sanitized_preview: sanitized.map(mask),
            problem: config.key_problem.map(|p| p.to_string()),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScoreDbInfo {
    pub loaded: bool,
    pub rows: usize,
    pub columns: usize,
    pub sample_columns: Vec<String>,
    pub encoding: Option<String>,
    pub csv_path: String,
    pub csv_exists: bool,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub ready: bool,
    pub gemini_configured: bool,
    pub gemini_diag: KeyDiagnostics,
    pub dotenv: DotenvStatus,
    pub score_db_loaded: bool,
    pub score_db_info: ScoreDbInfo,
    pub timeout_sec: f64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DiagResponse {
    pub ok: bool,
    pub model: String,
    pub call_ms: u64,
    pub text: String,
}

// ---- handlers ----

/// Liveness banner
#[utoipa::path(
    get,
    path = "/",
    responses((status = 200, description = "Service is up", body = String)),
    tag = "system"
)]
pub async fn home() -> &'static str {
    "✅ trail-mood-api is running"
}

/// Readiness and configuration diagnostics
#[utoipa::path(
    get,
    path = "/api/health",
    responses((status = 200, description = "Health report", body = HealthResponse)),
    tag = "system"
)]
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let table = state.ranker.table();
    let loaded = table.map_or(false, |t| !t.is_empty());
    let csv_path = &state.config.score_csv_path;

    Json(HealthResponse {
        status: "ok".to_string(),
        ready: state.analyzer.is_ready(),
        gemini_configured: state.analyzer.is_configured(),
        gemini_diag: KeyDiagnostics::from_config(&state.config),
        dotenv: state.config.dotenv.clone(),
        score_db_loaded: loaded,
        score_db_info: ScoreDbInfo {
            loaded,
            rows: table.map_or(0, |t| t.len()),
            columns: table.map_or(0, |t| t.columns.len()),
            sample_columns: table
                .map(|t| t.columns.iter().take(SAMPLE_COLUMN_COUNT).cloned().collect())
                .unwrap_or_default(),
            encoding: table.map(|t| t.encoding.to_string()),
            csv_path: csv_path.display().to_string(),
            csv_exists: csv_path.exists(),
        },
        timeout_sec: state.analyzer.timeout().as_secs_f64(),
    })
}

/// Timed ping of the model
#[utoipa::path(
    get,
    path = "/api/diag",
    responses(
        (status = 200, description = "Model answered", body = DiagResponse),
        (status = 400, description = "No usable API key", body = ErrorBody),
        (status = 504, description = "Model did not answer in time", body = ErrorBody),
        (status = 500, description = "Model call failed", body = ErrorBody)
    ),
    tag = "system"
)]
pub async fn diag(State(state): State<Arc<AppState>>) -> Response {
    match state.analyzer.diagnose().await {
        Ok(report) => Json(DiagResponse {
            ok: true,
            model: state.config.gemini_model.clone(),
            call_ms: report.call_ms as u64,
            text: report.text,
        })
        .into_response(),
        Err(e) => {
            let status = match &e {
                AnalysisError::ConfigurationMissing => StatusCode::BAD_REQUEST,
                AnalysisError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            warn!("Gemini diag failed: {}", e);
            (status, Json(ErrorBody::from(&e))).into_response()
        }
    }
}

/// Usage guidance for the analyze endpoint
#[utoipa::path(
    get,
    path = "/api/analyze",
    responses(
        (status = 200, description = "How to call POST /api/analyze"),
        (status = 401, description = "Missing or invalid token", body = ErrorBody)
    ),
    tag = "analysis"
)]
pub async fn analyze_usage(_user: AuthUser) -> Json<serde_json::Value> {
    Json(json!({
        "message": "Send a POST request with a JSON body to analyze text.",
        "method": "POST",
        "example": {
            "text": "오늘은 하루 종일 비가 와서 조금 우울했어.",
            "location": { "latitude": 37.5665, "longitude": 126.978 }
        }
    }))
}

/// Analyze text and recommend trails
#[utoipa::path(
    post,
    path = "/api/analyze",
    request_body = AnalyzeRequest,
    responses(
        (status = 200, description = "Analysis and trail recommendation", body = AnalyzeResponse),
        (status = 400, description = "Empty or malformed input", body = ErrorBody),
        (status = 401, description = "Missing or invalid token", body = ErrorBody),
        (status = 502, description = "Model call failed", body = AnalyzeResponse),
        (status = 503, description = "Model not configured", body = AnalyzeResponse),
        (status = 504, description = "Model timed out", body = AnalyzeResponse)
    ),
    tag = "analysis"
)]
pub async fn analyze(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    payload: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) if !request.text.trim().is_empty() => request,
        Ok(_) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorBody::new("invalid_input", "text must not be empty")),
            )
                .into_response()
        }
        Err(rejection) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorBody::new("invalid_input", &rejection.body_text())),
            )
                .into_response()
        }
    };

    let request_id = Uuid::new_v4();
    info!(
        %request_id,
        user = %user.id,
        "📝 Analyze request ({} chars)",
        request.text.chars().count()
    );
    if let Some(location) = &request.location {
        info!(%request_id, "📍 Location: {}, {}", location.latitude, location.longitude);
    }

    let music_taste = match state.store.music_taste(&user.id).await {
        Ok(taste) => taste,
        Err(e) => {
            warn!(%request_id, "Could not load music taste: {}", e);
            None
        }
    };

    let (status, response) = match state
        .analyzer
        .analyze(&request.text, music_taste.as_deref())
        .await
    {
        Ok(result) => {
            let trail = state
                .ranker
                .recommend(result.emotion.as_deref().unwrap_or_default())
                .await;
            (
                StatusCode::OK,
                AnalyzeResponse {
                    analysis: AnalysisOutcome::Analyzed(AnalyzedText {
                        result,
                        analyzed_at: Utc::now(),
                    }),
                    trail: trail.into(),
                },
            )
        }
        Err(e) => {
            warn!(%request_id, "❌ Analysis failed ({}): {}", e.code(), e);
            (
                analysis_status(&e),
                AnalyzeResponse {
                    analysis: AnalysisOutcome::Failed(ErrorBody::from(&e)),
                    trail: TrailPayload::default(),
                },
            )
        }
    };

    (status, Json(response)).into_response()
}

#[derive(OpenApi)]
#[openapi(
    paths(home, health, diag, analyze_usage, analyze),
    components(schemas(
        AnalyzeRequest,
        AnalyzeResponse,
        Location,
        TrailPayload,
        ErrorBody,
        HealthResponse,
        KeyDiagnostics,
        ScoreDbInfo,
        DiagResponse,
        crate::config::DotenvStatus,
        crate::analysis::AnalysisResult,
        crate::analysis::MusicRecommendation,
        crate::ranker::RankedTrail,
        crate::ranker::Coordinates,
        crate::ranker::Route
    )),
    tags(
        (name = "system", description = "Liveness and diagnostics"),
        (name = "analysis", description = "Emotion analysis and trail recommendation")
    )
)]
pub struct ApiDoc;

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/", get(home))
        .route("/api/health", get(health))
        .route("/api/diag", get(diag))
        .route("/api/analyze", get(analyze_usage).post(analyze))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
