#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use tower::ServiceExt;
use uuid::Uuid;
use zeroize::Zeroizing;

use keygate::{
    app,
    config::{Config, IntegrityMode},
    crypto::{ipn_signature, obfuscation::HandshakePayload},
    error::{AppError, Result},
    models::{
        subscription::{InsertOutcome, NewSubscription, Subscription},
        user::{Principal, Role, UserRef},
    },
    repositories::{subscription::SubscriptionStore, user::UserDirectory},
    services::{
        authority::{
            AuthVerdict, AuthorityApi, AuthoritySubscription, HandshakeStage, IntegrityVerdict,
            IssueKeyRequest, IssuedKey,
        },
        payments::{CreatePayment, CreatedPayment, PaymentGateway},
    },
    state::AppState,
};

pub const JWT_SECRET: &str = "test-secret-test-secret-test-secret!";
pub const IPN_SECRET: &str = "ipn-shared-secret";

// ============ Fakes ============

/// Records every call and answers from canned state.
#[derive(Default)]
pub struct FakeAuthority {
    pub calls: AtomicUsize,
    pub integrity_ok: AtomicBool,
    pub fail_with_status: Mutex<Option<u16>>,
    pub auth_verdict: Mutex<AuthVerdict>,
    pub issued: Mutex<Vec<IssueKeyRequest>>,
    pub secure_checks: Mutex<Vec<(HandshakeStage, String)>>,
    pub plain_checks: Mutex<Vec<HandshakePayload>>,
    pub auth_checks: Mutex<Vec<(String, String)>>,
    pub registered: Mutex<Vec<(String, String)>>,
    pub remote_subscriptions: Mutex<Vec<AuthoritySubscription>>,
}

impl FakeAuthority {
    fn enter(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match *self.fail_with_status.lock().unwrap() {
            Some(status) => Err(AppError::Authority {
                status,
                body: "authority unavailable".to_string(),
            }),
            None => Ok(()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn issue_count(&self) -> usize {
        self.issued.lock().unwrap().len()
    }
}

#[async_trait]
impl AuthorityApi for FakeAuthority {
    async fn issue_key(&self, request: &IssueKeyRequest) -> Result<IssuedKey> {
        self.enter()?;
        let mut issued = self.issued.lock().unwrap();
        issued.push(request.clone());
        Ok(IssuedKey {
            key_id: Some(format!("KEY-{}", request.order_id)),
        })
    }

    async fn key_info(&self, key_id: &str) -> Result<sonic_rs::Value> {
        self.enter()?;
        Ok(sonic_rs::json!({ "key_id": key_id, "status": "active" }))
    }

    async fn user_security_state(&self, username: &str) -> Result<sonic_rs::Value> {
        self.enter()?;
        Ok(sonic_rs::json!({ "username": username, "hwid_locked": false }))
    }

    async fn user_subscriptions(&self, _username: &str) -> Result<Vec<AuthoritySubscription>> {
        self.enter()?;
        Ok(self.remote_subscriptions.lock().unwrap().clone())
    }

    async fn register_build(&self, version: &str, expected_hash: &str) -> Result<()> {
        self.enter()?;
        self.registered
            .lock()
            .unwrap()
            .push((version.to_string(), expected_hash.to_string()));
        Ok(())
    }

    async fn validate_integrity(&self, payload: &HandshakePayload) -> Result<IntegrityVerdict> {
        self.enter()?;
        self.plain_checks.lock().unwrap().push(payload.clone());
        Ok(IntegrityVerdict {
            integrity_ok: self.integrity_ok.load(Ordering::SeqCst),
        })
    }

    async fn validate_integrity_secure(
        &self,
        stage: HandshakeStage,
        frame: &str,
    ) -> Result<IntegrityVerdict> {
        self.enter()?;
        self.secure_checks
            .lock()
            .unwrap()
            .push((stage, frame.to_string()));
        Ok(IntegrityVerdict {
            integrity_ok: self.integrity_ok.load(Ordering::SeqCst),
        })
    }

    async fn auth_key_secure(&self, frame: &str, ip: &str) -> Result<AuthVerdict> {
        self.enter()?;
        self.auth_checks
            .lock()
            .unwrap()
            .push((frame.to_string(), ip.to_string()));
        Ok(self.auth_verdict.lock().unwrap().clone())
    }
}

/// In-memory mirror table with the same `order_id` uniqueness rule.
#[derive(Default)]
pub struct MemoryStore {
    pub rows: Mutex<Vec<Subscription>>,
    pub fail_inserts: AtomicBool,
}

impl MemoryStore {
    pub fn count(&self) -> usize {
        self.rows.lock().unwrap().len()
    }
}

#[async_trait]
impl SubscriptionStore for MemoryStore {
    async fn insert_if_absent(&self, new: NewSubscription) -> Result<InsertOutcome> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(AppError::Internal("simulated store outage".to_string()));
        }
        let mut rows = self.rows.lock().unwrap();
        if rows.iter().any(|r| r.order_id == new.order_id) {
            return Ok(InsertOutcome::Duplicate);
        }
        let row = new.into_subscription(Uuid::new_v4());
        rows.push(row.clone());
        Ok(InsertOutcome::Inserted(row))
    }

    async fn find_by_order_id(&self, order_id: &str) -> Result<Option<Subscription>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.order_id == order_id)
            .cloned())
    }

    async fn list_for_user(&self, user_id: i64) -> Result<Vec<Subscription>> {
        let mut rows: Vec<Subscription> = self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.ends_at.cmp(&a.ends_at));
        Ok(rows)
    }
}

pub struct MemoryUsers {
    users: HashMap<String, i64>,
}

#[async_trait]
impl UserDirectory for MemoryUsers {
    async fn find_by_username(&self, username: &str) -> Result<Option<UserRef>> {
        Ok(self.users.get(username).map(|id| UserRef {
            id: *id,
            username: username.to_string(),
        }))
    }
}

#[derive(Default)]
pub struct FakePayments {
    pub requests: Mutex<Vec<CreatePayment>>,
}

#[async_trait]
impl PaymentGateway for FakePayments {
    async fn create_payment(&self, request: &CreatePayment) -> Result<CreatedPayment> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(CreatedPayment {
            payment_id: Some(keygate::models::ipn::ProviderId::Number(4_242)),
            invoice_url: Some("https://nowpayments.io/payment/?iid=4242".to_string()),
            payment_url: None,
        })
    }
}

// ============ Harness ============

pub fn test_config() -> Config {
    Config {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        database_url: "postgres://unused".to_string(),
        db_pool_max_size: 1,
        jwt_secret: Zeroizing::new(JWT_SECRET.to_string()),
        auth_cookie_name: "auth_token".to_string(),
        authority_url: Some("https://keys.test".to_string()),
        authority_api_key: Zeroizing::new("internal".to_string()),
        authority_timeout: Duration::from_secs(1),
        integrity_mode: IntegrityMode::Obfuscated,
        ipn_secret: Some(Zeroizing::new(IPN_SECRET.to_string())),
        nowpayments_api_key: None,
        ipn_callback_url: "https://api.test/nowpayments/ipn".to_string(),
        frontend_base_url: "https://shop.test".to_string(),
    }
}

pub struct Harness {
    pub state: AppState,
    pub authority: Arc<FakeAuthority>,
    pub store: Arc<MemoryStore>,
    pub payments: Arc<FakePayments>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: Config) -> Self {
        let authority = Arc::new(FakeAuthority::default());
        let store = Arc::new(MemoryStore::default());
        let payments = Arc::new(FakePayments::default());
        let users = Arc::new(MemoryUsers {
            users: HashMap::from([
                ("alice".to_string(), 1),
                ("bob_92".to_string(), 2),
                ("john.doe".to_string(), 3),
            ]),
        });

        let state = AppState::from_parts(
            config,
            authority.clone(),
            store.clone(),
            users,
            payments.clone(),
        );

        Self {
            state,
            authority,
            store,
            payments,
        }
    }

    pub fn app(&self) -> Router {
        app::router(self.state.clone())
    }

    pub fn token(&self, id: i64, username: &str, role: Role) -> String {
        self.state
            .tokens
            .issue(&Principal {
                id,
                username: username.to_string(),
                role,
            })
            .unwrap()
    }
}

pub fn sign(body: &[u8]) -> String {
    ipn_signature::sign(IPN_SECRET.as_bytes(), body).unwrap()
}

/// Sends one request through the router and returns status and body text.
pub async fn send(app: Router, request: Request<Body>) -> (StatusCode, String) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

pub fn post(uri: &str, body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(body.into())
        .unwrap()
}
