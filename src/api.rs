//! HTTP trigger surface. Handlers are thin adapters over pipeline components.

use crate::echo::Greeting;
use crate::event_model::{TallySummary, VerifierStatus};
use crate::generator::GeneratorStatus;
use crate::observability::HealthzStatus;
use crate::pipeline::Pipeline;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct ApiState {
    pipeline: Arc<Pipeline>,
    default_rate: Duration,
}

impl ApiState {
    pub fn new(pipeline: Arc<Pipeline>, default_rate: Duration) -> Self {
        Self {
            pipeline,
            default_rate,
        }
    }
}

/// Builds the router with every trigger endpoint.
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/", get(hello))
        .route("/healthz", get(healthz))
        .route("/shutdown", post(shutdown))
        .route("/sendReceiveMessageViaTopic", post(send_receive_message))
        .route("/generateUploads", post(generate_uploads))
        .route("/stopGenerator", post(stop_generator))
        .route("/generatorStatus", get(generator_status))
        .route("/resetVerifier", post(reset_verifier))
        .route("/verifierStatus", get(verifier_status))
        .route("/resetTally", post(reset_tally))
        .route("/tallyStatus", get(tally_status))
        .with_state(state)
}

/// Plain message body used by the root and shutdown endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageDto {
    pub message: String,
}

impl MessageDto {
    fn new(message: &str) -> Json<Self> {
        Json(Self {
            message: message.to_string(),
        })
    }
}

/// Query of `POST /generateUploads`.
#[derive(Debug, Deserialize)]
pub struct GenerateParams {
    /// Inter-event period in milliseconds.
    pub rate: Option<u64>,
    /// Number of events to emit.
    pub number: u64,
}

/// Query of `POST /sendReceiveMessageViaTopic`.
#[derive(Debug, Deserialize)]
pub struct MessageParams {
    pub message: String,
}

async fn hello() -> Json<MessageDto> {
    info!("got request to return hello world");
    MessageDto::new("Hello world!")
}

async fn healthz(State(state): State<ApiState>) -> Json<HealthzStatus> {
    Json(HealthzStatus::new(state.pipeline.roles()))
}

async fn shutdown(State(state): State<ApiState>) -> Json<MessageDto> {
    info!("got request to shutdown service");
    state.pipeline.shutdown_token().cancel();
    MessageDto::new("Shutdown request accepted")
}

async fn send_receive_message(
    State(state): State<ApiState>,
    Query(params): Query<MessageParams>,
) -> Result<Json<Greeting>, ApiError> {
    state
        .pipeline
        .echo()
        .send_and_receive(&params.message)
        .await
        .map(Json)
        .ok_or(ApiError::NoReply)
}

async fn generate_uploads(
    State(state): State<ApiState>,
    Query(params): Query<GenerateParams>,
) -> Result<StatusCode, ApiError> {
    let generator = state
        .pipeline
        .generator()
        .ok_or(ApiError::NotEnabled("generator"))?;
    let rate = match params.rate {
        Some(0) => return Err(ApiError::InvalidInput("rate must be positive".into())),
        Some(ms) => Duration::from_millis(ms),
        None => state.default_rate,
    };
    if params.number == 0 {
        return Err(ApiError::InvalidInput("number must be positive".into()));
    }
    if generator.start(rate, params.number) {
        Ok(StatusCode::ACCEPTED)
    } else {
        Ok(StatusCode::TOO_MANY_REQUESTS)
    }
}

async fn stop_generator(State(state): State<ApiState>) -> Result<Json<GeneratorStatus>, ApiError> {
    let generator = state
        .pipeline
        .generator()
        .ok_or(ApiError::NotEnabled("generator"))?;
    generator.stop();
    Ok(Json(generator.status()))
}

async fn generator_status(
    State(state): State<ApiState>,
) -> Result<Json<GeneratorStatus>, ApiError> {
    let generator = state
        .pipeline
        .generator()
        .ok_or(ApiError::NotEnabled("generator"))?;
    Ok(Json(generator.status()))
}

async fn reset_verifier(State(state): State<ApiState>) -> Result<StatusCode, ApiError> {
    let verifier = state
        .pipeline
        .verifier()
        .ok_or(ApiError::NotEnabled("verifier"))?;
    verifier.reset();
    Ok(StatusCode::OK)
}

async fn verifier_status(
    State(state): State<ApiState>,
) -> Result<Json<VerifierStatus>, ApiError> {
    let verifier = state
        .pipeline
        .verifier()
        .ok_or(ApiError::NotEnabled("verifier"))?;
    Ok(Json(verifier.status()))
}

async fn reset_tally(State(state): State<ApiState>) -> Result<StatusCode, ApiError> {
    let tally = state.pipeline.tally().ok_or(ApiError::NotEnabled("tally"))?;
    tally.reset();
    Ok(StatusCode::OK)
}

async fn tally_status(State(state): State<ApiState>) -> Result<Json<TallySummary>, ApiError> {
    let tally = state.pipeline.tally().ok_or(ApiError::NotEnabled("tally"))?;
    Ok(Json(tally.summary()))
}

/// Failures reported by the trigger surface.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ApiError {
    #[error("invalid request: {0}")]
    InvalidInput(String),
    #[error("{0} is not enabled on this instance")]
    NotEnabled(&'static str),
    #[error("no greeting received within the reply timeout")]
    NoReply,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::NotEnabled(_) | Self::NoReply => StatusCode::NOT_FOUND,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
