use std::collections::HashMap;

use futures_util::future::BoxFuture;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

const STRIPE_API: &str = "https://api.stripe.com/v1";

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("payments are not configured")]
    Disabled,

    #[error("payment provider request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("payment provider rejected the request: {0}")]
    Rejected(String),
}

/// The subset of a Stripe PaymentIntent the booking flow reads.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    #[serde(default)]
    pub client_secret: Option<String>,
    pub status: String,
    pub amount: i64,
}

impl PaymentIntent {
    pub fn succeeded(&self) -> bool {
        self.status == "succeeded"
    }
}

pub trait PaymentGateway: Send + Sync {
    /// When false, bookings are settled without a payment step.
    fn enabled(&self) -> bool;

    fn create_intent(
        &self,
        amount_cents: i64,
        currency: &str,
        booking_reference: &str,
    ) -> BoxFuture<'static, Result<PaymentIntent, PaymentError>>;

    fn retrieve_intent(&self, intent_id: &str) -> BoxFuture<'static, Result<PaymentIntent, PaymentError>>;
}

#[derive(Debug, Clone, Default)]
pub struct NoPayments;

impl PaymentGateway for NoPayments {
    fn enabled(&self) -> bool {
        false
    }

    fn create_intent(&self, _: i64, _: &str, _: &str) -> BoxFuture<'static, Result<PaymentIntent, PaymentError>> {
        Box::pin(async { Err(PaymentError::Disabled) })
    }

    fn retrieve_intent(&self, _: &str) -> BoxFuture<'static, Result<PaymentIntent, PaymentError>> {
        Box::pin(async { Err(PaymentError::Disabled) })
    }
}

/// Thin client over Stripe's PaymentIntents endpoints.
#[derive(Clone)]
pub struct StripeGateway {
    client: reqwest::Client,
    secret_key: String,
    base_url: String,
}

#[derive(Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Deserialize)]
struct StripeErrorDetail {
    #[serde(default)]
    message: Option<String>,
}

impl StripeGateway {
    pub fn new(secret_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            secret_key,
            base_url: STRIPE_API.to_string(),
        }
    }

    async fn read_intent(resp: reqwest::Response) -> Result<PaymentIntent, PaymentError> {
        let status = resp.status();
        if !status.is_success() {
            let message = resp
                .json::<StripeErrorBody>()
                .await
                .ok()
                .and_then(|b| b.error.message)
                .unwrap_or_else(|| format!("HTTP {status}"));
            return Err(PaymentError::Rejected(message));
        }
        Ok(resp.json::<PaymentIntent>().await?)
    }
}

impl PaymentGateway for StripeGateway {
    fn enabled(&self) -> bool {
        true
    }

    fn create_intent(
        &self,
        amount_cents: i64,
        currency: &str,
        booking_reference: &str,
    ) -> BoxFuture<'static, Result<PaymentIntent, PaymentError>> {
        let request = self
            .client
            .post(format!("{}/payment_intents", self.base_url))
            .bearer_auth(&self.secret_key)
            .form(&HashMap::from([
                ("amount", amount_cents.to_string()),
                ("currency", currency.to_lowercase()),
                ("automatic_payment_methods[enabled]", "true".to_string()),
                ("metadata[booking_reference]", booking_reference.to_string()),
            ]));

        Box::pin(async move {
            let intent = Self::read_intent(request.send().await?).await?;
            debug!(intent = %intent.id, "Created payment intent");
            Ok(intent)
        })
    }

    fn retrieve_intent(&self, intent_id: &str) -> BoxFuture<'static, Result<PaymentIntent, PaymentError>> {
        let request = self
            .client
            .get(format!("{}/payment_intents/{}", self.base_url, intent_id))
            .bearer_auth(&self.secret_key);

        Box::pin(async move { Self::read_intent(request.send().await?).await })
    }
}
