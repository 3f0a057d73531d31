use std::net::SocketAddr;

use chrono::{DateTime, Utc};
use http::HeaderMap;

use crate::config::IntegrityMode;
use crate::crypto::obfuscation;
use crate::error::Result;
use crate::services::authority::{AuthVerdict, AuthorityApi, HandshakeStage};

const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// Reply sent to the loader when a check fails.
pub const REJECTED: &str = "0";

/// Decodes the frame locally, then asks the authority whether the build
/// is approved.
pub async fn check_integrity(
    authority: &dyn AuthorityApi,
    mode: IntegrityMode,
    stage: HandshakeStage,
    frame: &str,
) -> Result<bool> {
    let payload = obfuscation::decode(frame)?;
    tracing::debug!(stage = stage.as_str(), build = %payload, "Loader integrity check");

    let verdict = match mode {
        IntegrityMode::Obfuscated => authority.validate_integrity_secure(stage, frame).await?,
        IntegrityMode::Plain => authority.validate_integrity(&payload).await?,
    };

    if !verdict.integrity_ok {
        tracing::warn!(stage = stage.as_str(), build = %payload, "Loader build rejected");
    }
    Ok(verdict.integrity_ok)
}

/// Runs the authenticated key check and renders the loader's status line.
pub async fn authenticate(
    authority: &dyn AuthorityApi,
    frame: &str,
    ip: &str,
    now: DateTime<Utc>,
) -> Result<String> {
    obfuscation::decode(frame)?;
    let verdict = authority.auth_key_secure(frame, ip).await?;
    if !verdict.auth_ok {
        tracing::info!(ip, "Loader key check failed");
    }
    Ok(status_line(&verdict, now))
}

/// `0` on failure, otherwise `1|<plan>|<remaining>`.
pub fn status_line(verdict: &AuthVerdict, now: DateTime<Utc>) -> String {
    if !verdict.auth_ok {
        return REJECTED.to_string();
    }

    let expires_at = verdict
        .subscription_expires_at
        .as_ref()
        .and_then(|stamp| {
            let at = stamp.to_datetime();
            if at.is_none() {
                tracing::warn!(raw = %stamp, "Unparseable subscription expiry");
            }
            at
        });

    let remaining = match expires_at {
        Some(at) => format_remaining(at, now),
        None => "Active subscription".to_string(),
    };

    format!("1|{}|{}", verdict.plan.as_deref().unwrap_or_default(), remaining)
}

/// Whole days left, rounded up; `Expired` once the expiry has passed.
pub fn format_remaining(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let left_ms = (expires_at - now).num_milliseconds();
    if left_ms <= 0 {
        return "Expired".to_string();
    }

    let days = (left_ms + MILLIS_PER_DAY - 1) / MILLIS_PER_DAY;
    if days == 1 {
        "1 day left".to_string()
    } else {
        format!("{} days left", days)
    }
}

/// Leftmost `x-forwarded-for` entry, else the transport peer.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}
