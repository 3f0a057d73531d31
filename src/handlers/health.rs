use axum::{Json, extract::State};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct Health {
    pub status: &'static str,
    pub keys_api_configured: bool,
    pub ipn_configured: bool,
}

/// Handles `GET /health`.
pub async fn health(State(state): State<AppState>) -> Json<Health> {
    Json(Health {
        status: "ok",
        keys_api_configured: state.authority_configured,
        ipn_configured: state.ipn.is_configured(),
    })
}
