//! HTTP bill provider adapter.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use ppob_types::{
    BillDetails, BillProvider, Currency, Money, PayRequest, ProviderError, ProviderReceipt,
};

use crate::product::BillProduct;

/// Header carrying the transaction id on payment requests.
pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

// ─────────────────────────────────────────────────────────────────────────────
// Wire format
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct InquiryBody<'a> {
    customer_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    area_code: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct InquiryResponse {
    bill_id: String,
    customer_id: String,
    #[serde(default)]
    customer_name: Option<String>,
    /// Minor units
    amount: i64,
    currency: Currency,
    #[serde(default)]
    description: String,
    #[serde(default)]
    due_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
struct PaymentBody<'a> {
    transaction_id: &'a str,
    bill_id: &'a str,
    amount: i64,
    currency: Currency,
    timestamp: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct PaymentResponse {
    reference: String,
    #[serde(default)]
    paid_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    available: Option<i64>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Provider
// ─────────────────────────────────────────────────────────────────────────────

/// Bill provider reached over HTTP with a bearer API key.
pub struct HttpBillProvider {
    product: BillProduct,
    base_url: String,
    api_key: String,
    timeout: Duration,
    http: Client,
}

impl HttpBillProvider {
    pub fn new(product: BillProduct, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            product,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            timeout: DEFAULT_TIMEOUT,
            http: Client::new(),
        }
    }

    /// Provider at the product's default API root.
    pub fn for_product(product: BillProduct, api_key: impl Into<String>, sandbox: bool) -> Self {
        Self::new(product, product.base_url(sandbox), api_key)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn product(&self) -> BillProduct {
        self.product
    }

    fn endpoint(&self, action: &str) -> String {
        format!("{}/bills/{}/{}", self.base_url, self.product.code(), action)
    }

    async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        action: &str,
        body: &B,
        idempotency_key: Option<&str>,
        requested: i64,
    ) -> Result<T, ProviderError> {
        let mut req = self
            .http
            .post(self.endpoint(action))
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .json(body);
        if let Some(key) = idempotency_key {
            req = req.header(IDEMPOTENCY_HEADER, key);
        }

        let resp = req.send().await.map_err(transport_error)?;
        let status = resp.status();
        let text = resp.text().await.map_err(transport_error)?;
        debug!(product = %self.product, action, status = status.as_u16(), "provider answered");

        if status.is_success() {
            // A 2xx we cannot read may still have moved money.
            serde_json::from_str(&text).map_err(|e| {
                ProviderError::UnknownOutcome(format!(
                    "unreadable {} response: {e}",
                    status.as_u16()
                ))
            })
        } else {
            Err(map_status(status, &text, requested))
        }
    }
}

fn transport_error(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout(err.to_string())
    } else {
        ProviderError::Transport(err.to_string())
    }
}

/// Maps a non-2xx answer to the provider error taxonomy.
fn map_status(status: StatusCode, body: &str, requested: i64) -> ProviderError {
    let parsed: ErrorResponse = serde_json::from_str(body).unwrap_or_default();
    let message = parsed.error.unwrap_or_else(|| body.to_string());

    match status {
        StatusCode::PAYMENT_REQUIRED => ProviderError::InsufficientBalance {
            available: parsed.available.unwrap_or(0),
            requested,
        },
        StatusCode::NOT_FOUND => ProviderError::BillNotFound(message),
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => ProviderError::Timeout(message),
        s if s.is_server_error() => {
            ProviderError::Transport(format!("{}: {message}", status.as_u16()))
        }
        _ => ProviderError::Rejected(format!("{}: {message}", status.as_u16())),
    }
}

#[async_trait]
impl BillProvider for HttpBillProvider {
    async fn inquiry(&self, customer_id: &str) -> Result<BillDetails, ProviderError> {
        if !self.validate_customer_id(customer_id) {
            return Err(ProviderError::InvalidCustomerId(customer_id.to_string()));
        }
        let body = InquiryBody {
            customer_id,
            area_code: self.product.area_code(customer_id),
        };
        let resp: InquiryResponse = self.post("inquiry", &body, None, 0).await?;
        let amount = Money::new(resp.amount, resp.currency)
            .map_err(|e| ProviderError::Rejected(e.to_string()))?;

        Ok(BillDetails {
            bill_id: resp.bill_id,
            customer_id: resp.customer_id,
            customer_name: resp.customer_name,
            amount,
            description: resp.description,
            due_date: resp.due_date,
        })
    }

    async fn pay(&self, request: &PayRequest) -> Result<ProviderReceipt, ProviderError> {
        let body = PaymentBody {
            transaction_id: request.transaction_id.as_str(),
            bill_id: &request.bill_id,
            amount: request.amount.amount(),
            currency: request.amount.currency(),
            timestamp: Utc::now(),
        };
        let resp: PaymentResponse = self
            .post(
                "payment",
                &body,
                Some(request.transaction_id.as_str()),
                request.amount.amount(),
            )
            .await?;

        Ok(ProviderReceipt {
            transaction_id: request.transaction_id.clone(),
            provider_reference: resp.reference,
            bill_id: request.bill_id.clone(),
            amount: request.amount,
            paid_at: resp.paid_at.unwrap_or_else(Utc::now),
        })
    }

    fn validate_customer_id(&self, customer_id: &str) -> bool {
        self.product.validate_customer_id(customer_id)
    }
}
