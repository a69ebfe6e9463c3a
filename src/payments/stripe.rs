use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use super::{
    CardSummary, ChargeDetails, ChargeRequest, ChargeState, CreatedCharge, GatewayError,
    PaymentGateway, METADATA_CUSTOMER_ID, METADATA_ORDER_ID,
};
use crate::config::AppConfig;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// HTTP client for a Stripe-compatible payment intents API
#[derive(Clone)]
pub struct StripeGateway {
    client: Client,
    api_base: String,
    secret_key: String,
}

#[derive(Deserialize)]
struct PaymentIntentBody {
    id: String,
    #[serde(default)]
    client_secret: Option<String>,
    status: String,
}

#[derive(Deserialize)]
struct PaymentMethodBody {
    card: Option<CardBody>,
}

#[derive(Deserialize)]
struct CardBody {
    brand: String,
    last4: String,
    exp_month: u32,
    exp_year: u32,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
}

impl StripeGateway {
    pub fn new(
        api_base: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(GatewayError::from)?;
        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            secret_key: secret_key.into(),
        })
    }

    pub fn from_config(cfg: &AppConfig) -> Result<Self, GatewayError> {
        Self::new(cfg.payment_api_base.clone(), cfg.payment_secret_key.clone())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.bearer_auth(&self.secret_key)
    }

    async fn read<T: for<'de> Deserialize<'de>>(response: Response) -> Result<T, GatewayError> {
        let status = response.status();
        if status.is_success() {
            return response.json::<T>().await.map_err(GatewayError::from);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorEnvelope>(&body)
            .ok()
            .map(|env| {
                let kind = env.error.kind.unwrap_or_else(|| "api_error".to_string());
                match env.error.message {
                    Some(msg) => format!("{kind}: {msg}"),
                    None => kind,
                }
            })
            .unwrap_or(body);

        warn!(status = status.as_u16(), %message, "Payment gateway request failed");
        Err(GatewayError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

/// Converts a major-unit amount to the integer minor units the processor expects
pub fn to_minor_units(amount: Decimal) -> Result<i64, GatewayError> {
    if amount.is_sign_negative() {
        return Err(GatewayError::InvalidAmount(amount.to_string()));
    }
    (amount * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .ok_or_else(|| GatewayError::InvalidAmount(amount.to_string()))
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    #[instrument(skip(self, request), fields(order_id = %request.order_id))]
    async fn create_charge(&self, request: &ChargeRequest) -> Result<CreatedCharge, GatewayError> {
        let amount = to_minor_units(request.amount)?;
        let mut form = vec![
            ("amount".to_string(), amount.to_string()),
            ("currency".to_string(), request.currency.to_lowercase()),
            ("payment_method_types[]".to_string(), "card".to_string()),
            (
                format!("metadata[{METADATA_ORDER_ID}]"),
                request.order_id.to_string(),
            ),
            (
                format!("metadata[{METADATA_CUSTOMER_ID}]"),
                request.customer_id.to_string(),
            ),
        ];
        if let Some(email) = &request.receipt_email {
            form.push(("receipt_email".to_string(), email.clone()));
        }

        let response = self
            .authorized(self.client.post(self.url("/v1/payment_intents")))
            .header("Idempotency-Key", request.order_id.to_string())
            .form(&form)
            .send()
            .await?;
        let intent: PaymentIntentBody = Self::read(response).await?;

        let client_secret = intent.client_secret.ok_or_else(|| GatewayError::Api {
            status: 200,
            message: "payment intent returned without a client secret".to_string(),
        })?;

        debug!(charge_id = %intent.id, status = %intent.status, "Payment intent created");
        Ok(CreatedCharge {
            charge_id: intent.id,
            client_secret,
        })
    }

    #[instrument(skip(self))]
    async fn cancel_charge(&self, charge_id: &str) -> Result<ChargeState, GatewayError> {
        let response = self
            .authorized(
                self.client
                    .post(self.url(&format!("/v1/payment_intents/{charge_id}/cancel"))),
            )
            .send()
            .await?;
        let intent: PaymentIntentBody = Self::read(response).await?;
        Ok(ChargeState::parse(&intent.status))
    }

    #[instrument(skip(self))]
    async fn retrieve_charge(&self, charge_id: &str) -> Result<ChargeDetails, GatewayError> {
        let response = self
            .authorized(
                self.client
                    .get(self.url(&format!("/v1/payment_intents/{charge_id}"))),
            )
            .send()
            .await?;
        let intent: PaymentIntentBody = Self::read(response).await?;
        Ok(ChargeDetails {
            charge_id: intent.id,
            state: ChargeState::parse(&intent.status),
        })
    }

    #[instrument(skip(self))]
    async fn retrieve_payment_method(
        &self,
        payment_method_id: &str,
    ) -> Result<CardSummary, GatewayError> {
        let response = self
            .authorized(
                self.client
                    .get(self.url(&format!("/v1/payment_methods/{payment_method_id}"))),
            )
            .send()
            .await?;
        let method: PaymentMethodBody = Self::read(response).await?;
        let card = method.card.ok_or_else(|| GatewayError::Api {
            status: 200,
            message: format!("payment method {payment_method_id} is not a card"),
        })?;
        Ok(CardSummary {
            brand: card.brand,
            last4: card.last4,
            exp_month: card.exp_month,
            exp_year: card.exp_year,
        })
    }
}
