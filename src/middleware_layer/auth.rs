use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};
use tower_cookies::Cookies;

use crate::{
    error::AppError,
    models::user::{Principal, Role},
    state::AppState,
};

/// Extracts the principal token. The cookie takes precedence over an
/// `Authorization: Bearer` header.
///
/// # Arguments
///
/// * `cookies` - The request cookies.
/// * `headers` - The request headers.
/// * `cookie_name` - Name of the cookie carrying the token.
///
/// # Returns
///
/// An `Option` containing the raw token if one was supplied.
pub fn extract_token(cookies: &Cookies, headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    if let Some(cookie) = cookies.get(cookie_name) {
        if !cookie.value().is_empty() {
            return Some(cookie.value().to_string());
        }
    }

    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// Resolves the principal and checks it against `minimum`.
///
/// Outcomes: no token is `MissingCredential` (401), a bad or expired
/// token is `InvalidCredential` (401), a valid token with too small a
/// role is `Forbidden` (403).
pub fn authorize(
    state: &AppState,
    cookies: &Cookies,
    headers: &HeaderMap,
    minimum: Role,
) -> Result<Principal, AppError> {
    let token = extract_token(cookies, headers, &state.config.auth_cookie_name)
        .ok_or(AppError::MissingCredential)?;

    let principal = state.tokens.verify(&token)?;

    if !principal.role.satisfies(minimum) {
        tracing::warn!(
            "❌ {} ({}) lacks {} access",
            principal.username,
            principal.role,
            minimum
        );
        return Err(AppError::Forbidden);
    }

    Ok(principal)
}

async fn gate(
    state: AppState,
    cookies: Cookies,
    mut request: Request<Body>,
    next: Next,
    minimum: Role,
) -> Result<Response, AppError> {
    let principal = authorize(&state, &cookies, request.headers(), minimum)?;
    tracing::debug!("✅ {} authenticated as {}", principal.username, principal.role);

    request.extensions_mut().insert(principal);
    Ok(next.run(request).await)
}

/// Any valid token.
pub async fn require_user(
    State(state): State<AppState>,
    cookies: Cookies,
    request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    gate(state, cookies, request, next, Role::User).await
}

/// Role `support` or `admin`.
pub async fn require_support(
    State(state): State<AppState>,
    cookies: Cookies,
    request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    gate(state, cookies, request, next, Role::Support).await
}

/// Role `admin` only.
pub async fn require_admin(
    State(state): State<AppState>,
    cookies: Cookies,
    request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    gate(state, cookies, request, next, Role::Admin).await
}
