use async_trait::async_trait;
use http::header::{ACCEPT, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::{AppError, Result};
use crate::models::ipn::ProviderId;

const API_BASE: &str = "https://api.nowpayments.io/v1";

/// A checkout request sent to the payment provider.
#[derive(Debug, Clone, Serialize)]
pub struct CreatePayment {
    pub price_amount: u32,
    pub price_currency: String,
    pub order_id: String,
    pub ipn_callback_url: String,
    pub success_url: String,
    pub cancel_url: String,
}

/// The provider's answer to a checkout request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreatedPayment {
    #[serde(default)]
    pub payment_id: Option<ProviderId>,
    #[serde(default)]
    pub invoice_url: Option<String>,
    #[serde(default)]
    pub payment_url: Option<String>,
}

impl CreatedPayment {
    pub fn checkout_url(&self) -> Option<&str> {
        self.invoice_url.as_deref().or(self.payment_url.as_deref())
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_payment(&self, request: &CreatePayment) -> Result<CreatedPayment>;
}

/// NOWPayments REST client.
#[derive(Clone)]
pub struct NowPaymentsClient {
    http: reqwest::Client,
    api_key: Option<Zeroizing<String>>,
}

impl NowPaymentsClient {
    pub fn new(http: reqwest::Client, api_key: Option<Zeroizing<String>>) -> Self {
        Self { http, api_key }
    }
}

#[async_trait]
impl PaymentGateway for NowPaymentsClient {
    async fn create_payment(&self, request: &CreatePayment) -> Result<CreatedPayment> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| AppError::Configuration("NOWPAYMENTS_API_KEY not set".to_string()))?;

        let body = sonic_rs::to_string(request)
            .map_err(|e| AppError::Internal(format!("Payment request encoding: {}", e)))?;

        let response = self
            .http
            .post(format!("{}/payment", API_BASE))
            .header("x-api-key", api_key.as_str())
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::PaymentProvider {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        sonic_rs::from_slice(&bytes).map_err(|e| AppError::PaymentProvider {
            status: status.as_u16(),
            body: format!("malformed response: {}", e),
        })
    }
}
