#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use serde_json::{json, Value};
use storefront_api::{
    config::AppConfig,
    db::{self, DbConfig},
    entities::{order, product, product_variant, size_stock},
    notifications::{EmailDelivery, EmailSender},
    payments::{
        compute_signature, CardSummary, ChargeDetails, ChargeRequest, ChargeState, CreatedCharge,
        GatewayError, PaymentGateway, SIGNATURE_HEADER,
    },
    retry::RetryPolicy,
    AppState,
};
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

pub const WEBHOOK_SECRET: &str = "whsec_test_secret";

/// In-memory payment processor double
#[derive(Default)]
pub struct FakeGateway {
    pub charges: Mutex<Vec<ChargeRequest>>,
    pub cancelled: Mutex<Vec<String>>,
    pub fail_create: Mutex<bool>,
    pub charge_state: Mutex<Option<ChargeState>>,
    pub card: Mutex<Option<CardSummary>>,
}

impl FakeGateway {
    pub fn charge_count(&self) -> usize {
        self.charges.lock().unwrap().len()
    }

    pub fn last_charge(&self) -> Option<ChargeRequest> {
        self.charges.lock().unwrap().last().cloned()
    }

    pub fn set_charge_state(&self, state: ChargeState) {
        *self.charge_state.lock().unwrap() = Some(state);
    }

    pub fn fail_next_charges(&self) {
        *self.fail_create.lock().unwrap() = true;
    }

    pub fn set_card(&self, card: CardSummary) {
        *self.card.lock().unwrap() = Some(card);
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_charge(&self, request: &ChargeRequest) -> Result<CreatedCharge, GatewayError> {
        if *self.fail_create.lock().unwrap() {
            return Err(GatewayError::Api {
                status: 402,
                message: "card declined".into(),
            });
        }
        let mut charges = self.charges.lock().unwrap();
        charges.push(request.clone());
        let charge_id = format!("pi_test_{}", charges.len());
        Ok(CreatedCharge {
            client_secret: format!("{charge_id}_secret"),
            charge_id,
        })
    }

    async fn cancel_charge(&self, charge_id: &str) -> Result<ChargeState, GatewayError> {
        self.cancelled.lock().unwrap().push(charge_id.to_string());
        Ok(ChargeState::Canceled)
    }

    async fn retrieve_charge(&self, charge_id: &str) -> Result<ChargeDetails, GatewayError> {
        let state = self
            .charge_state
            .lock()
            .unwrap()
            .clone()
            .unwrap_or(ChargeState::RequiresPaymentMethod);
        Ok(ChargeDetails {
            charge_id: charge_id.to_string(),
            state,
        })
    }

    async fn retrieve_payment_method(
        &self,
        payment_method_id: &str,
    ) -> Result<CardSummary, GatewayError> {
        self.card.lock().unwrap().clone().ok_or_else(|| GatewayError::Api {
            status: 404,
            message: format!("No such payment method: {payment_method_id}"),
        })
    }
}

/// Captures credential emails instead of sending them
#[derive(Default)]
pub struct RecordingEmailSender {
    pub sent: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl EmailSender for RecordingEmailSender {
    async fn send_credentials(&self, email: &str, password: &str) -> EmailDelivery {
        self.sent
            .lock()
            .unwrap()
            .push((email.to_string(), password.to_string()));
        EmailDelivery::delivered(Some("msg_test".into()))
    }
}

/// Handles to a seeded product with a single color and size
#[derive(Debug, Clone)]
pub struct SeededProduct {
    pub product_id: Uuid,
    pub variant_id: Uuid,
    pub stock_id: Uuid,
    pub color: String,
    pub size: String,
}

/// Application backed by a throwaway SQLite database
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub gateway: Arc<FakeGateway>,
    pub email: Arc<RecordingEmailSender>,
    _dir: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let db_path = dir.path().join("storefront.db");
        let url = format!("sqlite://{}?mode=rwc", db_path.display());

        let mut cfg = AppConfig::new(url, "127.0.0.1".into(), 18_080, "test".into());
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        cfg.payment_webhook_secret = Some(WEBHOOK_SECRET.to_string());

        let db_config = DbConfig::from(&cfg);
        let policy = RetryPolicy::new(0, Duration::from_millis(1), Duration::from_millis(1));
        let pool = db::connect_with_retry(&db_config, &policy)
            .await
            .expect("connect sqlite");
        db::run_migrations(&pool).await.expect("migrations");

        let gateway = Arc::new(FakeGateway::default());
        let email = Arc::new(RecordingEmailSender::default());
        let state = AppState::new(
            Arc::new(pool),
            cfg,
            gateway.clone(),
            email.clone(),
            None,
        );
        let router = storefront_api::app_router(state.clone());

        Self {
            router,
            state,
            gateway,
            email,
            _dir: dir,
        }
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        self.router
            .clone()
            .oneshot(builder.body(body).expect("request"))
            .await
            .expect("router response")
    }

    /// Posts `event` to the webhook endpoint with a valid signature
    pub async fn post_webhook(&self, event: &Value) -> axum::response::Response {
        let payload = event.to_string();
        let header = sign(payload.as_bytes(), WEBHOOK_SECRET);
        self.post_raw_webhook(payload, Some(header)).await
    }

    pub async fn post_raw_webhook(
        &self,
        payload: String,
        signature: Option<String>,
    ) -> axum::response::Response {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri("/api/v1/payments/webhook")
            .header("content-type", "application/json");
        if let Some(signature) = signature {
            builder = builder.header(SIGNATURE_HEADER, signature);
        }
        self.router
            .clone()
            .oneshot(builder.body(Body::from(payload)).expect("request"))
            .await
            .expect("router response")
    }

    pub async fn seed_product(
        &self,
        title: &str,
        price: Decimal,
        discount: Decimal,
        color: &str,
        size: &str,
        stock: i32,
    ) -> SeededProduct {
        let db = &*self.state.db;
        let now = Utc::now();
        let product_id = Uuid::new_v4();
        product::ActiveModel {
            id: Set(product_id),
            title: Set(title.to_string()),
            price: Set(price),
            discount: Set(discount),
            sold_count: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(db)
        .await
        .expect("insert product");

        let variant_id = Uuid::new_v4();
        product_variant::ActiveModel {
            id: Set(variant_id),
            product_id: Set(product_id),
            color: Set(color.to_string()),
        }
        .insert(db)
        .await
        .expect("insert variant");

        let stock_id = Uuid::new_v4();
        size_stock::ActiveModel {
            id: Set(stock_id),
            variant_id: Set(variant_id),
            size: Set(size.to_string()),
            stock: Set(stock),
        }
        .insert(db)
        .await
        .expect("insert size stock");

        SeededProduct {
            product_id,
            variant_id,
            stock_id,
            color: color.to_string(),
            size: size.to_string(),
        }
    }

    pub async fn stock(&self, stock_id: Uuid) -> i32 {
        size_stock::Entity::find_by_id(stock_id)
            .one(&*self.state.db)
            .await
            .expect("query stock")
            .expect("stock row")
            .stock
    }

    pub async fn product(&self, product_id: Uuid) -> product::Model {
        product::Entity::find_by_id(product_id)
            .one(&*self.state.db)
            .await
            .expect("query product")
            .expect("product row")
    }

    pub async fn order(&self, order_id: Uuid) -> order::Model {
        order::Entity::find_by_id(order_id)
            .one(&*self.state.db)
            .await
            .expect("query order")
            .expect("order row")
    }

    pub async fn order_count(&self) -> usize {
        order::Entity::find()
            .all(&*self.state.db)
            .await
            .expect("query orders")
            .len()
    }

    /// Places a one-line guest order and returns the response `data`
    pub async fn checkout(&self, seeded: &SeededProduct, quantity: i32, email: &str) -> Value {
        let response = self
            .request(
                Method::POST,
                "/api/v1/orders",
                Some(checkout_body(email, vec![line(seeded, quantity)])),
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        response_json(response).await["data"].clone()
    }
}

pub fn sign(payload: &[u8], secret: &str) -> String {
    let ts = Utc::now().timestamp();
    format!("t={},v1={}", ts, compute_signature(secret, ts, payload))
}

pub fn line(seeded: &SeededProduct, quantity: i32) -> Value {
    json!({
        "product_id": seeded.product_id,
        "quantity": quantity,
        "size": seeded.size,
        "color": seeded.color,
    })
}

pub fn checkout_body(email: &str, items: Vec<Value>) -> Value {
    json!({
        "email": email,
        "items": items,
        "shipping_address": {
            "full_name": "Jane Doe",
            "phone": "+15550100",
            "country": "US",
            "address_line1": "1 Main St",
            "city": "Springfield",
            "postal_code": "12345",
            "state": "IL"
        }
    })
}

pub fn charge_event(event_id: &str, event_type: &str, charge_id: &str, order_id: &str) -> Value {
    json!({
        "id": event_id,
        "type": event_type,
        "data": { "object": {
            "id": charge_id,
            "status": if event_type.ends_with("succeeded") { "succeeded" } else { "canceled" },
            "payment_method": "pm_card_visa",
            "metadata": { "order_id": order_id }
        }}
    })
}

pub async fn response_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("json body")
}
