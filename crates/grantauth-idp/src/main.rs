//! grantauth identity provider: a development stand-in for the wallet
//! sign-in backend.
//!
//! 1. `POST /login` issues a one-time challenge for an identity.
//! 2. `POST /authentication` verifies the NKey signature over that
//!    challenge, consumes it, and returns a signed session token plus the
//!    identity kind.
//! 3. `GET /health` answers `ok`.

mod challenge;
mod config;
mod error;
mod token;

use std::sync::Arc;

use anyhow::Context as _;
use axum::Router;
use axum::extract::{Json, State};
use axum::routing::{get, post};
use chrono::Utc;
use grantauth_models::Identity;
use grantauth_sdk::provider::{
    AuthenticationRequest, AuthenticationResponse, LoginRequest, LoginResponse,
};
use grantauth_sdk::wallet::verify_nkey_signature;
use tracing::info;

use crate::challenge::ChallengeBook;
use crate::config::AppConfig;
use crate::error::IdpError;

// ---------------------------------------------------------------------------
// Shared application state
// ---------------------------------------------------------------------------

/// State shared across all Axum handlers.
struct AppState {
    config: AppConfig,
    challenges: ChallengeBook,
}

impl AppState {
    fn new(config: AppConfig) -> Self {
        let challenges = ChallengeBook::new(config.challenge_ttl);
        Self { config, challenges }
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `POST /login`: issue a challenge for the identity to sign.
async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, IdpError> {
    let identity = Identity::parse(req.identity.as_str())?;
    let challenge = state.challenges.issue(&identity);
    info!(identity = %identity, "challenge issued");
    Ok(Json(LoginResponse { challenge }))
}

/// `POST /authentication`: exchange a signed challenge for a session token.
async fn authenticate(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AuthenticationRequest>,
) -> Result<Json<AuthenticationResponse>, IdpError> {
    let identity = Identity::parse(req.identity.as_str())?;

    state.challenges.redeem(&identity, |challenge| {
        verify_nkey_signature(&identity, challenge, &req.signature)
    })?;

    let kind = state.config.kind_for(&identity);
    let credential = token::issue_token(
        &state.config.token_secret,
        &identity,
        kind,
        state.config.token_ttl,
        Utc::now(),
    )?;
    info!(
        identity = %identity,
        kind = %kind,
        network = req.network_hint.as_deref().unwrap_or("-"),
        "session token issued"
    );

    Ok(Json(AuthenticationResponse {
        credential: Some(credential),
        identity_kind: kind,
    }))
}

/// `GET /health`
async fn health() -> &'static str {
    "ok"
}

fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/login", post(login))
        .route("/authentication", post(authenticate))
        .route("/health", get(health))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env();
    if std::env::var("IDP_TOKEN_SECRET").is_err() {
        info!("using the development token secret (set IDP_TOKEN_SECRET in production)");
    }
    info!(
        ttl_secs = config.token_ttl.as_secs(),
        contract_identities = config.contract_identities.len(),
        "identity provider configured"
    );

    let addr = format!("0.0.0.0:{}", config.listen_port);
    let app = router(Arc::new(AppState::new(config)));
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!(address = %addr, "identity provider listening");
    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
