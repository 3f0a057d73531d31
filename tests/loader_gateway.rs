//! Loader gateway and account surface tests

mod common;

use std::sync::atomic::Ordering;

use axum::http::{Request, StatusCode};
use axum::body::Body;
use chrono::{Duration, Utc};
use serde_json::{Value, json};

use common::*;
use keygate::config::IntegrityMode;
use keygate::crypto::obfuscation::{self, HandshakePayload};
use keygate::models::plan::Plan;
use keygate::models::subscription::NewSubscription;
use keygate::models::user::Role;
use keygate::repositories::subscription::SubscriptionStore;
use keygate::services::authority::{AuthVerdict, ExpiryStamp, HandshakeStage};

fn frame() -> String {
    obfuscation::encode("1.0.3", 0xDEADBEEF, 0x5A).unwrap()
}

fn loader_body(frame: &str) -> String {
    json!({ "d": frame }).to_string()
}

async fn send_full(app: axum::Router, request: Request<Body>) -> (StatusCode, Option<String>, String) {
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let content_type = response
        .headers()
        .get("content-type")
        .map(|v| v.to_str().unwrap().to_string());
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, content_type, String::from_utf8(bytes.to_vec()).unwrap())
}

fn verdict(plan: &str, expires_in: Duration) -> AuthVerdict {
    AuthVerdict {
        auth_ok: true,
        plan: Some(plan.to_string()),
        subscription_expires_at: Some(ExpiryStamp::Text((Utc::now() + expires_in).to_rfc3339())),
    }
}

// ============ Integrity checks ============

#[tokio::test]
async fn test_prehandshake_forwards_raw_frame_in_obfuscated_mode() {
    let harness = Harness::new();
    harness.authority.integrity_ok.store(true, Ordering::SeqCst);

    let (status, content_type, body) =
        send_full(harness.app(), post("/loader/prehandshake", loader_body(&frame()))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "1");
    assert!(content_type.unwrap().starts_with("text/plain"));

    let checks = harness.authority.secure_checks.lock().unwrap().clone();
    assert_eq!(checks, vec![(HandshakeStage::Prehandshake, frame())]);
    assert!(harness.authority.plain_checks.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_heartbeat_reports_rejected_build() {
    let harness = Harness::new();
    harness.authority.integrity_ok.store(false, Ordering::SeqCst);

    let (status, body) = send(harness.app(), post("/loader/heartbeat", loader_body(&frame()))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "0");
    let checks = harness.authority.secure_checks.lock().unwrap().clone();
    assert_eq!(checks[0].0, HandshakeStage::Heartbeat);
}

#[tokio::test]
async fn test_plain_mode_sends_decoded_payload() {
    let mut config = test_config();
    config.integrity_mode = IntegrityMode::Plain;
    let harness = Harness::with_config(config);
    harness.authority.integrity_ok.store(true, Ordering::SeqCst);

    let (status, body) = send(harness.app(), post("/loader/prehandshake", loader_body(&frame()))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "1");
    let checks = harness.authority.plain_checks.lock().unwrap().clone();
    assert_eq!(
        checks,
        vec![HandshakePayload {
            version: "1.0.3".to_string(),
            hash: 0xDEADBEEF,
        }]
    );
    assert!(harness.authority.secure_checks.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_malformed_loader_bodies_never_reach_authority() {
    let harness = Harness::new();
    let bodies = [
        "{}".to_string(),
        r#"{"d": 42}"#.to_string(),
        "not json".to_string(),
        loader_body("zz"),
        loader_body("abc"),
        loader_body(""),
        loader_body("5a"),
    ];

    for path in ["/loader/prehandshake", "/loader/heartbeat", "/loader/auth"] {
        for body in &bodies {
            let (status, _) = send(harness.app(), post(path, body.clone())).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{path} {body}");
        }
    }

    assert_eq!(harness.authority.call_count(), 0);
}

#[tokio::test]
async fn test_authority_outage_is_bad_gateway() {
    let harness = Harness::new();
    *harness.authority.fail_with_status.lock().unwrap() = Some(500);

    let (status, _) = send(harness.app(), post("/loader/prehandshake", loader_body(&frame()))).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
}

// ============ Key authentication ============

#[tokio::test]
async fn test_auth_forwards_leftmost_forwarded_address() {
    let harness = Harness::new();
    *harness.authority.auth_verdict.lock().unwrap() = verdict("week", Duration::hours(36));

    let mut request = post("/loader/auth", loader_body(&frame()));
    request
        .headers_mut()
        .insert("x-forwarded-for", "203.0.113.9, 10.0.0.1".parse().unwrap());
    let (status, content_type, body) = send_full(harness.app(), request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "1|week|2 days left");
    assert!(content_type.unwrap().starts_with("text/plain"));
    let checks = harness.authority.auth_checks.lock().unwrap().clone();
    assert_eq!(checks, vec![(frame(), "203.0.113.9".to_string())]);
}

#[tokio::test]
async fn test_auth_without_peer_information_reports_unknown() {
    let harness = Harness::new();
    *harness.authority.auth_verdict.lock().unwrap() = verdict("day", Duration::hours(20));

    let (status, body) = send(harness.app(), post("/loader/auth", loader_body(&frame()))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "1|day|1 day left");
    assert_eq!(harness.authority.auth_checks.lock().unwrap()[0].1, "unknown");
}

#[tokio::test]
async fn test_auth_status_line_variants() {
    let harness = Harness::new();

    *harness.authority.auth_verdict.lock().unwrap() = AuthVerdict::default();
    let (_, body) = send(harness.app(), post("/loader/auth", loader_body(&frame()))).await;
    assert_eq!(body, "0");

    *harness.authority.auth_verdict.lock().unwrap() = verdict("month", -Duration::hours(1));
    let (_, body) = send(harness.app(), post("/loader/auth", loader_body(&frame()))).await;
    assert_eq!(body, "1|month|Expired");

    *harness.authority.auth_verdict.lock().unwrap() = AuthVerdict {
        auth_ok: true,
        plan: Some("month".to_string()),
        subscription_expires_at: None,
    };
    let (_, body) = send(harness.app(), post("/loader/auth", loader_body(&frame()))).await;
    assert_eq!(body, "1|month|Active subscription");
}

#[tokio::test]
async fn test_auth_reads_epoch_millisecond_expiry() {
    let harness = Harness::new();
    *harness.authority.auth_verdict.lock().unwrap() = AuthVerdict {
        auth_ok: true,
        plan: Some("week".to_string()),
        subscription_expires_at: Some(ExpiryStamp::Millis(
            (Utc::now() + Duration::hours(36)).timestamp_millis(),
        )),
    };

    let (status, body) = send(harness.app(), post("/loader/auth", loader_body(&frame()))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "1|week|2 days left");
}

#[tokio::test]
async fn test_auth_authority_outage_is_bad_gateway() {
    let harness = Harness::new();
    *harness.authority.fail_with_status.lock().unwrap() = Some(503);

    let (status, _) = send(harness.app(), post("/loader/auth", loader_body(&frame()))).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
}

// ============ Checkout and account ============

#[tokio::test]
async fn test_create_payment_builds_order_for_caller() {
    let harness = Harness::new();
    let token = harness.token(1, "alice", Role::User);

    let mut request = post("/payments/create", json!({ "plan": "week" }).to_string());
    request
        .headers_mut()
        .insert("authorization", format!("Bearer {token}").parse().unwrap());
    let (status, body) = send(harness.app(), request).await;

    assert_eq!(status, StatusCode::OK);
    let created: Value = serde_json::from_str(&body).unwrap();
    let order_id = created["orderId"].as_str().unwrap();
    let (prefix, nonce) = order_id.split_at("alice:week:".len());
    assert_eq!(prefix, "alice:week:");
    assert_eq!(nonce.len(), 16);
    assert!(nonce.bytes().all(|b| b.is_ascii_hexdigit()));
    assert_eq!(created["paymentId"], "4242");
    assert_eq!(created["invoiceUrl"], "https://nowpayments.io/payment/?iid=4242");

    let requests = harness.payments.requests.lock().unwrap().clone();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].order_id, order_id);
    assert_eq!(requests[0].price_amount, 12);
    assert_eq!(requests[0].price_currency, "gbp");
    assert_eq!(requests[0].ipn_callback_url, "https://api.test/nowpayments/ipn");
    assert_eq!(requests[0].success_url, "https://shop.test/account");
}

#[tokio::test]
async fn test_create_payment_rejects_unknown_plan() {
    let harness = Harness::new();
    let token = harness.token(1, "alice", Role::User);

    let mut request = post("/payments/create", json!({ "plan": "lifetime" }).to_string());
    request
        .headers_mut()
        .insert("authorization", format!("Bearer {token}").parse().unwrap());
    let (status, body) = send(harness.app(), request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("Invalid plan."));
    assert!(harness.payments.requests.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_create_payment_requires_login() {
    let harness = Harness::new();

    let (status, _) = send(
        harness.app(),
        post("/payments/create", json!({ "plan": "day" }).to_string()),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_account_lists_only_callers_subscriptions() {
    let harness = Harness::new();
    let now = Utc::now();
    for (user_id, order_id, plan) in [
        (1, "alice:day:01", Plan::Day),
        (1, "alice:month:02", Plan::Month),
        (2, "bob_92:week:03", Plan::Week),
    ] {
        let (starts_at, ends_at) = plan.validity_window(now);
        harness
            .store
            .insert_if_absent(NewSubscription {
                user_id,
                plan,
                sub_key: format!("KEY-{order_id}"),
                payment_id: "1".to_string(),
                order_id: order_id.to_string(),
                starts_at,
                ends_at,
            })
            .await
            .unwrap();
    }
    let token = harness.token(1, "alice", Role::User);

    let request = Request::builder()
        .uri("/account/subscriptions")
        .header("authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(harness.app(), request).await;

    assert_eq!(status, StatusCode::OK);
    let listing: Value = serde_json::from_str(&body).unwrap();
    let subs = listing["subscriptions"].as_array().unwrap();
    assert_eq!(subs.len(), 2);
    assert_eq!(subs[0]["plan"], "month");
    assert_eq!(subs[1]["plan"], "day");
    assert_eq!(subs[0]["status"], "active");
}

#[tokio::test]
async fn test_health_reports_configuration() {
    let harness = Harness::new();

    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, body) = send(harness.app(), request).await;

    assert_eq!(status, StatusCode::OK);
    let health: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["keys_api_configured"], true);
    assert_eq!(health["ipn_configured"], true);
}
