// Vote Rewards - Intake Server
// HTTP adapter mapping transport events onto the core dispatcher.
// The chat transport posts inbound events here; outbound traffic is
// handed to the configured notifier.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use vote_rewards::{
    Config, DecisionInput, DecisionKey, Dispatcher, EvidenceInput, ModerationPrompt, Notifier,
    PromptHandle, StaticAdminDirectory, Store, TextInput,
};

/// Shared application state
#[derive(Clone)]
struct AppState {
    dispatcher: Arc<Dispatcher>,
    store: Store,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }

    fn err(data: T, error: impl Into<String>) -> Self {
        Self {
            success: false,
            data,
            error: Some(error.into()),
        }
    }
}

// ============================================================================
// Outbound: log-only notifier
// ============================================================================

/// Notifier that hands outbound traffic to the operator log. A real
/// deployment replaces this with the chat transport's sender.
struct LogNotifier {
    prompt_seq: AtomicU64,
}

impl LogNotifier {
    fn new() -> Self {
        Self {
            prompt_seq: AtomicU64::new(0),
        }
    }
}

impl Notifier for LogNotifier {
    fn reply(&self, participant_id: i64, text: &str) -> anyhow::Result<()> {
        tracing::info!(participant_id, text, "outbound reply");
        Ok(())
    }

    fn send_prompt(&self, prompt: &ModerationPrompt) -> anyhow::Result<PromptHandle> {
        let handle = format!("prompt-{}", self.prompt_seq.fetch_add(1, Ordering::Relaxed) + 1);
        tracing::info!(
            %handle,
            body = %prompt.body,
            accept = %prompt.accept.encode(),
            reject = %prompt.reject.encode(),
            "outbound moderation prompt"
        );
        Ok(handle)
    }

    fn update_prompt(&self, handle: &PromptHandle, outcome: &str) -> anyhow::Result<()> {
        tracing::info!(%handle, outcome, "moderation prompt resolved");
        Ok(())
    }

    fn post_notice(&self, text: &str) -> anyhow::Result<()> {
        tracing::info!(text, "moderation notice");
        Ok(())
    }
}

// ============================================================================
// Request bodies
// ============================================================================

#[derive(Deserialize)]
struct TextBody {
    participant_id: i64,
    text: String,
}

#[derive(Deserialize)]
struct EvidenceBody {
    participant_id: i64,
    evidence_ref: String,
}

#[derive(Deserialize)]
struct DecisionBody {
    admin_id: i64,
    /// Encoded decision token from the moderation prompt's buttons
    token: String,
    #[serde(default)]
    prompt_handle: Option<String>,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// POST /api/events/text - Participant text message
async fn post_text(State(state): State<AppState>, Json(body): Json<TextBody>) -> impl IntoResponse {
    let event = TextInput {
        participant_id: body.participant_id,
        text: body.text,
    };
    match state.dispatcher.handle_text(&event) {
        Ok(()) => (StatusCode::OK, Json(ApiResponse::ok("accepted"))).into_response(),
        Err(e) => {
            tracing::error!("text event failed: {e:#}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::err("", "delivery failed")),
            )
                .into_response()
        }
    }
}

/// POST /api/events/evidence - Participant evidence (photo reference)
async fn post_evidence(
    State(state): State<AppState>,
    Json(body): Json<EvidenceBody>,
) -> impl IntoResponse {
    let event = EvidenceInput {
        participant_id: body.participant_id,
        evidence_ref: body.evidence_ref,
    };
    match state.dispatcher.handle_evidence(&event) {
        Ok(()) => (StatusCode::OK, Json(ApiResponse::ok("accepted"))).into_response(),
        Err(e) => {
            tracing::error!("evidence event failed: {e:#}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::err("", "delivery failed")),
            )
                .into_response()
        }
    }
}

/// POST /api/events/decision - Administrator decision callback
async fn post_decision(
    State(state): State<AppState>,
    Json(body): Json<DecisionBody>,
) -> impl IntoResponse {
    let Some(key) = DecisionKey::decode(&body.token) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::err("", "malformed decision token")),
        )
            .into_response();
    };

    let event = DecisionInput {
        admin_id: body.admin_id,
        kind: key.kind,
        participant_id: key.participant_id,
        key: key.key,
    };
    match state
        .dispatcher
        .handle_decision(&event, body.prompt_handle.as_ref())
    {
        Ok(outcome) => (
            StatusCode::OK,
            Json(ApiResponse::ok(format!("{:?}", outcome))),
        )
            .into_response(),
        Err(e) => {
            tracing::error!("decision event failed: {e:#}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::err(String::new(), "delivery failed")),
            )
                .into_response()
        }
    }
}

/// GET /api/accounts/:id - Best-effort balance snapshot
async fn get_account(
    State(state): State<AppState>,
    Path(participant_id): Path<i64>,
) -> impl IntoResponse {
    match state.store.get_account(participant_id) {
        Ok(Some(account)) => (StatusCode::OK, Json(ApiResponse::ok(Some(account)))).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::err(None::<vote_rewards::Account>, "unknown participant")),
        )
            .into_response(),
        Err(e) => {
            tracing::error!("account lookup failed: {e:#}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::err(None::<vote_rewards::Account>, "store unavailable")),
            )
                .into_response()
        }
    }
}

/// GET /api/stats - Queue counts for operators
async fn get_stats(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.counts() {
        Ok(counts) => (StatusCode::OK, Json(ApiResponse::ok(Some(counts)))).into_response(),
        Err(e) => {
            tracing::error!("stats query failed: {e:#}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::err(None::<vote_rewards::StoreCounts>, "store unavailable")),
            )
                .into_response()
        }
    }
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;
    let store = Store::open(&config.db_path)?;
    tracing::info!("database opened at {}", config.db_path.display());

    let dispatcher = Dispatcher::new(
        store.clone(),
        Arc::new(LogNotifier::new()),
        Arc::new(StaticAdminDirectory::new(config.admin_ids.clone())),
        config.campaign_url.clone(),
    );

    let state = AppState {
        dispatcher: Arc::new(dispatcher),
        store,
    };

    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/events/text", post(post_text))
        .route("/events/evidence", post(post_evidence))
        .route("/events/decision", post(post_decision))
        .route("/accounts/:id", get(get_account))
        .route("/stats", get(get_stats))
        .with_state(state);

    let app = Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("intake server listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}
