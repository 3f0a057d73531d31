use axum::{Json, extract::State};
use serde::Deserialize;

use crate::{
    error::{AppError, Result},
    state::AppState,
};

#[derive(Deserialize, Debug)]
pub struct KeyInfoRequest {
    #[serde(default)]
    pub key_id: String,
}

#[derive(Deserialize, Debug)]
pub struct SecurityStateRequest {
    #[serde(default)]
    pub username: String,
}

/// Handles `POST /support/keys/info`.
pub async fn key_info(
    State(state): State<AppState>,
    Json(payload): Json<KeyInfoRequest>,
) -> Result<Json<sonic_rs::Value>> {
    if payload.key_id.trim().is_empty() {
        return Err(AppError::Validation("key_id required".to_string()));
    }
    Ok(Json(state.authority.key_info(payload.key_id.trim()).await?))
}

/// Handles `POST /support/users/security`.
pub async fn user_security(
    State(state): State<AppState>,
    Json(payload): Json<SecurityStateRequest>,
) -> Result<Json<sonic_rs::Value>> {
    if payload.username.trim().is_empty() {
        return Err(AppError::Validation("username required".to_string()));
    }
    Ok(Json(
        state
            .authority
            .user_security_state(payload.username.trim())
            .await?,
    ))
}
