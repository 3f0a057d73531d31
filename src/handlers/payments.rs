use axum::{Extension, Json, body::Bytes, extract::State, http::HeaderMap};
use serde::{Deserialize, Serialize};

use crate::{
    crypto::{ipn_signature::SIGNATURE_HEADER, nonce},
    error::{AppError, Result},
    models::{plan::Plan, subscription::SubscriptionView, user::Principal},
    services::{
        payments::CreatePayment,
        provisioning::{ProvisionOutcome, Provisioner},
    },
    state::AppState,
    validation::order::{format_order_id, validate_order_username},
};

#[derive(Serialize)]
pub struct Ack {
    pub ok: bool,
}

/// The request payload for starting a checkout.
#[derive(Deserialize, Debug)]
pub struct CreatePaymentRequest {
    #[serde(default)]
    pub plan: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentResponse {
    pub order_id: String,
    pub payment_id: Option<String>,
    pub invoice_url: Option<String>,
}

#[derive(Serialize)]
pub struct SubscriptionsResponse {
    pub subscriptions: Vec<SubscriptionView>,
}

/// Handles `POST /nowpayments/ipn`.
///
/// The signature is checked over `body` exactly as received.
pub async fn nowpayments_ipn(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Ack>> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    let provisioner = Provisioner {
        verifier: &state.ipn,
        authority: state.authority.as_ref(),
        subscriptions: state.subscriptions.as_ref(),
        users: state.users.as_ref(),
    };

    let outcome = provisioner
        .handle_notification(&body, signature, chrono::Utc::now())
        .await?;
    if let ProvisionOutcome::Provisioned(sub) = outcome {
        tracing::debug!("Mirror {} ends at {}", sub.id, sub.ends_at);
    }

    Ok(Json(Ack { ok: true }))
}

/// Handles `POST /payments/create`.
pub async fn create_payment(
    State(state): State<AppState>,
    Extension(user): Extension<Principal>,
    Json(payload): Json<CreatePaymentRequest>,
) -> Result<Json<CreatePaymentResponse>> {
    let plan: Plan = payload
        .plan
        .parse()
        .map_err(|_| AppError::Validation("Invalid plan.".to_string()))?;
    let price = plan.price();

    validate_order_username(&user.username).map_err(|e| {
        tracing::warn!("Checkout refused for {:?}: {}", user.username, e);
        AppError::Validation("Username cannot be used for checkout.".to_string())
    })?;

    let order_id = format_order_id(&user.username, plan, &nonce::order_nonce());
    let frontend = state.config.frontend_base_url.trim_end_matches('/');

    let payment = state
        .payments
        .create_payment(&CreatePayment {
            price_amount: price.amount,
            price_currency: price.currency.to_string(),
            order_id: order_id.clone(),
            ipn_callback_url: state.config.ipn_callback_url.clone(),
            success_url: format!("{}/account", frontend),
            cancel_url: format!("{}/", frontend),
        })
        .await?;

    tracing::info!("💳 Payment created for {} ({}): {}", user.username, plan, order_id);

    Ok(Json(CreatePaymentResponse {
        order_id,
        payment_id: payment.payment_id.as_ref().map(ToString::to_string),
        invoice_url: payment.checkout_url().map(str::to_string),
    }))
}

/// Handles `GET /account/subscriptions`.
pub async fn account_subscriptions(
    State(state): State<AppState>,
    Extension(user): Extension<Principal>,
) -> Result<Json<SubscriptionsResponse>> {
    let subscriptions = state
        .subscriptions
        .list_for_user(user.id)
        .await?
        .into_iter()
        .map(SubscriptionView::from)
        .collect();

    Ok(Json(SubscriptionsResponse { subscriptions }))
}
