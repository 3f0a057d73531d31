use std::convert::Infallible;
use std::net::SocketAddr;

use axum::{
    body::Bytes,
    extract::{ConnectInfo, FromRequestParts, State},
    http::{header::CONTENT_TYPE, request::Parts},
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use crate::{
    error::{AppError, Result},
    services::{authority::HandshakeStage, loader},
    state::AppState,
};

/// Body of every loader request.
#[derive(Deserialize)]
struct LoaderRequest {
    d: String,
}

/// Best-effort originating address of the caller.
#[derive(Debug, Clone)]
pub struct ClientAddr(pub String);

impl<S: Send + Sync> FromRequestParts<S> for ClientAddr {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> std::result::Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        Ok(ClientAddr(loader::client_ip(&parts.headers, peer)))
    }
}

/// Rejects anything that is not `{"d": "<string>"}` before any upstream call.
fn frame_from(body: &Bytes) -> Result<String> {
    sonic_rs::from_slice::<LoaderRequest>(body)
        .map(|req| req.d)
        .map_err(|_| AppError::Validation("invalid payload".to_string()))
}

fn plain(text: impl Into<String>) -> Response {
    ([(CONTENT_TYPE, "text/plain; charset=utf-8")], text.into()).into_response()
}

async fn integrity(state: &AppState, stage: HandshakeStage, body: &Bytes) -> Result<Response> {
    let frame = frame_from(body)?;
    let ok = loader::check_integrity(
        state.authority.as_ref(),
        state.config.integrity_mode,
        stage,
        &frame,
    )
    .await?;
    Ok(plain(if ok { "1" } else { loader::REJECTED }))
}

/// Handles `POST /loader/prehandshake`.
pub async fn prehandshake(State(state): State<AppState>, body: Bytes) -> Result<Response> {
    integrity(&state, HandshakeStage::Prehandshake, &body).await
}

/// Handles `POST /loader/heartbeat`.
pub async fn heartbeat(State(state): State<AppState>, body: Bytes) -> Result<Response> {
    integrity(&state, HandshakeStage::Heartbeat, &body).await
}

/// Handles `POST /loader/auth`.
pub async fn auth(
    State(state): State<AppState>,
    ClientAddr(ip): ClientAddr,
    body: Bytes,
) -> Result<Response> {
    let frame = frame_from(&body)?;
    let line = loader::authenticate(state.authority.as_ref(), &frame, &ip, chrono::Utc::now()).await?;
    Ok(plain(line))
}
