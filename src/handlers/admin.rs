use axum::{Extension, Json, extract::State};
use garde::Validate;
use serde::{Deserialize, Serialize};

use crate::{
    crypto::obfuscation::{format_hash, parse_hash},
    error::{AppError, Result},
    models::user::Principal,
    services::reconcile::{self, ReconcileReport},
    state::AppState,
};

/// The request payload for registering an approved loader build.
#[derive(Deserialize, Validate, Debug)]
pub struct RegisterBuildRequest {
    #[garde(length(min = 1, max = 255))]
    pub version: String,
    #[garde(custom(is_integrity_hash))]
    pub expected_hash: String,
}

fn is_integrity_hash(value: &str, _context: &()) -> garde::Result {
    match parse_hash(value) {
        Some(_) => Ok(()),
        None => Err(garde::Error::new("must be a hex hash of at most 16 digits")),
    }
}

/// The request payload for a reconciliation run.
#[derive(Deserialize, Validate, Debug)]
pub struct ReconcileRequest {
    #[garde(length(min = 1, max = 255))]
    pub username: String,
    #[garde(skip)]
    #[serde(default)]
    pub repair: bool,
}

#[derive(Serialize)]
pub struct OkResponse {
    pub ok: bool,
}

/// Handles `POST /admin/loader-build/register`.
pub async fn register_build(
    State(state): State<AppState>,
    Extension(admin): Extension<Principal>,
    Json(payload): Json<RegisterBuildRequest>,
) -> Result<Json<OkResponse>> {
    payload.validate()?;

    let hash = parse_hash(&payload.expected_hash)
        .map(format_hash)
        .ok_or_else(|| AppError::Validation("expected_hash is not a hex hash".to_string()))?;

    state
        .authority
        .register_build(&payload.version, &hash)
        .await?;

    tracing::info!("✅ {} registered loader build {} ({})", admin.username, payload.version, hash);
    Ok(Json(OkResponse { ok: true }))
}

/// Handles `POST /admin/reconcile`.
pub async fn reconcile(
    State(state): State<AppState>,
    Extension(admin): Extension<Principal>,
    Json(payload): Json<ReconcileRequest>,
) -> Result<Json<ReconcileReport>> {
    payload.validate()?;
    tracing::info!("🔎 {} reconciling {} (repair: {})", admin.username, payload.username, payload.repair);

    let report = reconcile::reconcile_user(
        state.authority.as_ref(),
        state.subscriptions.as_ref(),
        state.users.as_ref(),
        &payload.username,
        payload.repair,
    )
    .await?;

    Ok(Json(report))
}
