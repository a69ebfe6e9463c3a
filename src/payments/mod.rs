//! Card-payment processor integration.
//!
//! The rest of the crate talks to the processor only through [`PaymentGateway`], so checkout and
//! reconciliation can run against the HTTP client in [`stripe`] or an in-memory double.

pub mod signature;
pub mod stripe;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

pub use signature::{compute_signature, construct_event, SIGNATURE_HEADER};
pub use stripe::StripeGateway;

/// Metadata keys attached to every charge created at checkout
pub const METADATA_ORDER_ID: &str = "order_id";
pub const METADATA_CUSTOMER_ID: &str = "customer_id";

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("invalid event signature: {0}")]
    InvalidSignature(String),

    #[error("malformed event: {0}")]
    MalformedEvent(String),

    #[error("gateway returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("gateway transport error: {0}")]
    Transport(String),

    #[error("invalid charge amount: {0}")]
    InvalidAmount(String),
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        GatewayError::Transport(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChargeRequest {
    /// Amount in major currency units, already rounded to 2 decimal places
    pub amount: Decimal,
    pub currency: String,
    pub order_id: Uuid,
    pub customer_id: Uuid,
    pub receipt_email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedCharge {
    pub charge_id: String,
    /// Opaque handle the client uses to complete card authorization
    pub client_secret: String,
}

/// Processor-side lifecycle of a charge
#[derive(
    Debug, Clone, PartialEq, Eq, strum::EnumString, strum::AsRefStr, strum::Display,
)]
#[strum(serialize_all = "snake_case")]
pub enum ChargeState {
    RequiresPaymentMethod,
    RequiresConfirmation,
    RequiresAction,
    Processing,
    RequiresCapture,
    Canceled,
    Succeeded,
    #[strum(default)]
    Unknown(String),
}

impl ChargeState {
    pub fn parse(raw: &str) -> Self {
        // `default` variant makes parsing infallible
        ChargeState::from_str(raw).unwrap_or_else(|_| ChargeState::Unknown(raw.to_string()))
    }

    /// Whether the processor will no longer move money for this charge
    pub fn is_final(&self) -> bool {
        matches!(self, ChargeState::Canceled | ChargeState::Succeeded)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChargeDetails {
    pub charge_id: String,
    pub state: ChargeState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardSummary {
    pub brand: String,
    pub last4: String,
    pub exp_month: u32,
    pub exp_year: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayEventKind {
    ChargeSucceeded,
    ChargeCancelled,
    Other(String),
}

impl GatewayEventKind {
    fn from_type(event_type: &str) -> Self {
        match event_type {
            "payment_intent.succeeded" => GatewayEventKind::ChargeSucceeded,
            "payment_intent.canceled" => GatewayEventKind::ChargeCancelled,
            other => GatewayEventKind::Other(other.to_string()),
        }
    }
}

/// The charge object carried by an event
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EventCharge {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl EventCharge {
    pub fn order_id(&self) -> Option<Uuid> {
        self.metadata
            .get(METADATA_ORDER_ID)
            .and_then(|raw| Uuid::parse_str(raw).ok())
    }
}

/// A verified, parsed gateway event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayEvent {
    pub id: String,
    pub kind: GatewayEventKind,
    pub charge: EventCharge,
}

#[derive(Deserialize)]
struct RawEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: RawEventData,
}

#[derive(Deserialize)]
struct RawEventData {
    object: EventCharge,
}

impl GatewayEvent {
    pub fn from_json(payload: &[u8]) -> Result<Self, GatewayError> {
        let raw: RawEvent = serde_json::from_slice(payload)
            .map_err(|e| GatewayError::MalformedEvent(e.to_string()))?;
        Ok(Self {
            id: raw.id,
            kind: GatewayEventKind::from_type(&raw.event_type),
            charge: raw.data.object,
        })
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_charge(&self, request: &ChargeRequest) -> Result<CreatedCharge, GatewayError>;

    async fn cancel_charge(&self, charge_id: &str) -> Result<ChargeState, GatewayError>;

    async fn retrieve_charge(&self, charge_id: &str) -> Result<ChargeDetails, GatewayError>;

    async fn retrieve_payment_method(
        &self,
        payment_method_id: &str,
    ) -> Result<CardSummary, GatewayError>;

    /// Verifies `signature_header` against `payload` and parses the event
    fn construct_event(
        &self,
        payload: &[u8],
        signature_header: &str,
        secret: &str,
        tolerance: Duration,
    ) -> Result<GatewayEvent, GatewayError> {
        construct_event(payload, signature_header, secret, tolerance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn charge_state_parses_processor_statuses() {
        assert_eq!(ChargeState::parse("succeeded"), ChargeState::Succeeded);
        assert_eq!(
            ChargeState::parse("requires_payment_method"),
            ChargeState::RequiresPaymentMethod
        );
        assert_eq!(
            ChargeState::parse("something_new"),
            ChargeState::Unknown("something_new".into())
        );
        assert!(ChargeState::Canceled.is_final());
        assert!(!ChargeState::RequiresAction.is_final());
        assert_eq!(ChargeState::RequiresCapture.as_ref(), "requires_capture");
    }

    #[test]
    fn parses_event_metadata() {
        let order_id = Uuid::new_v4();
        let payload = json!({
            "id": "evt_1",
            "type": "payment_intent.canceled",
            "data": { "object": {
                "id": "pi_1",
                "status": "canceled",
                "metadata": { "order_id": order_id.to_string(), "customer_id": "c" }
            }}
        });
        let event = GatewayEvent::from_json(payload.to_string().as_bytes()).unwrap();
        assert_eq!(event.kind, GatewayEventKind::ChargeCancelled);
        assert_eq!(event.charge.order_id(), Some(order_id));
        assert_eq!(event.charge.payment_method, None);
    }

    #[test]
    fn unknown_event_types_are_kept() {
        let payload = json!({
            "id": "evt_2",
            "type": "charge.refunded",
            "data": { "object": { "id": "ch_1" } }
        });
        let event = GatewayEvent::from_json(payload.to_string().as_bytes()).unwrap();
        assert_eq!(event.kind, GatewayEventKind::Other("charge.refunded".into()));
        assert_eq!(event.charge.order_id(), None);
    }
}
