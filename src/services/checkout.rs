use crate::{
    db::{self, DbPool},
    entities::order::{self, ShippingAddress},
    errors::ServiceError,
    payments::{ChargeRequest, PaymentGateway},
    services::{
        customers::{CustomerLookup, CustomerResolver, GuestCredentials},
        inventory::{InventoryLedger, LineRequest},
        orders::{self, NewOrder},
    },
};
use chrono::Utc;
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, DatabaseTransaction, Set, TransactionTrait};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
pub struct CheckoutItem {
    pub product_id: Uuid,
    #[validate(range(min = 1, max = 1000, message = "Quantity must be between 1 and 1000"))]
    pub quantity: i32,
    #[validate(length(min = 1, max = 32, message = "Size is required"))]
    pub size: String,
    #[validate(length(min = 1, max = 64, message = "Color is required"))]
    pub color: String,
}

/// Checkout request. Identify the buyer with `customer_id` or `email`.
#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
pub struct CreateOrderRequest {
    pub customer_id: Option<Uuid>,
    #[validate(email(message = "Email must be a valid address"))]
    pub email: Option<String>,
    #[validate(length(min = 1, max = 120))]
    pub full_name: Option<String>,
    #[validate(length(min = 3, max = 32))]
    pub phone: Option<String>,
    #[validate(length(min = 1, message = "At least one line item is required"))]
    pub items: Vec<CheckoutItem>,
    pub shipping_address: ShippingAddress,
    /// Client-side item count; when present it must equal the sum of quantities
    pub total_items: Option<i32>,
}

impl CreateOrderRequest {
    /// Field validation plus the cross-field rules the derive cannot express
    pub fn validate_all(&self) -> Result<(), ServiceError> {
        self.validate()?;
        self.shipping_address.validate()?;
        for item in &self.items {
            item.validate()?;
        }

        if self.customer_id.is_none()
            && self
                .email
                .as_deref()
                .map(|e| e.trim().is_empty())
                .unwrap_or(true)
        {
            return Err(ServiceError::ValidationError(
                "Either customer_id or email is required.".into(),
            ));
        }

        if let Some(declared) = self.total_items {
            let counted = self.item_count();
            if declared != counted {
                return Err(ServiceError::ValidationError(format!(
                    "total_items is {declared} but the line items add up to {counted}."
                )));
            }
        }
        Ok(())
    }

    pub fn item_count(&self) -> i32 {
        self.items.iter().map(|i| i.quantity).sum()
    }

    fn lines(&self) -> Vec<LineRequest> {
        self.items
            .iter()
            .map(|item| LineRequest {
                product_id: item.product_id,
                quantity: item.quantity,
                size: item.size.trim().to_string(),
                color: item.color.trim().to_string(),
            })
            .collect()
    }

    fn lookup(&self) -> CustomerLookup {
        CustomerLookup {
            customer_id: self.customer_id,
            email: self.email.clone(),
            full_name: self
                .full_name
                .clone()
                .or_else(|| Some(self.shipping_address.full_name.clone())),
            phone: self
                .phone
                .clone()
                .or_else(|| Some(self.shipping_address.phone.clone())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CheckoutResponse {
    pub order_id: Uuid,
    pub order_number: String,
    /// Handle the client uses to complete card authorization
    pub client_secret: String,
    pub charge_id: String,
    #[schema(value_type = String, example = "26.97")]
    pub total_amount: Decimal,
}

/// Progress of one checkout, used to annotate failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum CheckoutStage {
    Started,
    StockDeducted,
    OrderCreated,
    CustomerLinked,
    ChargeInitiated,
    Committed,
}

struct StagedCheckout {
    response: CheckoutResponse,
    credentials: Option<GuestCredentials>,
}

/// Runs customer resolution, stock deduction, order creation and charge initiation as one unit
#[derive(Clone)]
pub struct CheckoutOrchestrator {
    db_pool: Arc<DbPool>,
    ledger: InventoryLedger,
    customers: CustomerResolver,
    gateway: Arc<dyn PaymentGateway>,
    currency: String,
}

impl CheckoutOrchestrator {
    pub fn new(
        db_pool: Arc<DbPool>,
        ledger: InventoryLedger,
        customers: CustomerResolver,
        gateway: Arc<dyn PaymentGateway>,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            db_pool,
            ledger,
            customers,
            gateway,
            currency: currency.into(),
        }
    }

    /// Places an order. Any failure before commit leaves stock, orders and customers untouched.
    #[instrument(skip(self, request), fields(lines = request.items.len()))]
    pub async fn place_order(
        &self,
        request: CreateOrderRequest,
    ) -> Result<CheckoutResponse, ServiceError> {
        request.validate_all()?;

        let txn = self.db_pool.begin().await?;
        let mut stage = CheckoutStage::Started;

        let staged = match self.run_steps(&txn, &request, &mut stage).await {
            Ok(staged) => staged,
            Err(e) => {
                db::rollback(txn, "checkout").await;
                counter!("storefront.checkout.failed", 1, "stage" => stage.to_string());
                warn!(%stage, error = %e, "Checkout aborted");
                return Err(e);
            }
        };

        if let Err(e) = db::commit(txn, "checkout").await {
            counter!("storefront.checkout.failed", 1, "stage" => "commit");
            self.compensate_charge(&staged.response.charge_id).await;
            return Err(e);
        }
        stage = CheckoutStage::Committed;

        counter!("storefront.checkout.placed", 1);
        info!(
            order_id = %staged.response.order_id,
            order_number = %staged.response.order_number,
            charge_id = %staged.response.charge_id,
            %stage,
            "Checkout committed"
        );

        if let Some(credentials) = &staged.credentials {
            self.customers.deliver_credentials(credentials).await;
        }

        Ok(staged.response)
    }

    async fn run_steps(
        &self,
        txn: &DatabaseTransaction,
        request: &CreateOrderRequest,
        stage: &mut CheckoutStage,
    ) -> Result<StagedCheckout, ServiceError> {
        let resolved = self.customers.resolve(txn, &request.lookup()).await?;
        let customer = &resolved.customer;

        let deduction = self.ledger.deduct(txn, &request.lines()).await?;
        *stage = CheckoutStage::StockDeducted;
        debug!(total = %deduction.total_amount, "Stock deducted");

        let order_number = orders::next_order_number(txn).await?;
        let order_id = Uuid::new_v4();
        let (order, _items) = orders::insert_order(
            txn,
            NewOrder {
                id: order_id,
                customer_id: customer.id,
                customer_email: customer.email.clone(),
                total_items: request.item_count(),
                total_amount: deduction.total_amount,
                currency: self.currency.clone(),
                shipping_address: request.shipping_address.clone(),
            },
            order_number,
            &deduction.items,
        )
        .await?;
        *stage = CheckoutStage::OrderCreated;

        orders::link_customer(txn, customer.id, order.id).await?;
        *stage = CheckoutStage::CustomerLinked;

        let charge = self
            .gateway
            .create_charge(&ChargeRequest {
                amount: deduction.total_amount,
                currency: self.currency.clone(),
                order_id: order.id,
                customer_id: customer.id,
                receipt_email: Some(customer.email.clone()),
            })
            .await?;
        *stage = CheckoutStage::ChargeInitiated;

        let order_number = order.order_number.clone();
        let mut active: order::ActiveModel = order.into();
        active.charge_id = Set(Some(charge.charge_id.clone()));
        active.updated_at = Set(Utc::now());
        active.update(txn).await?;

        Ok(StagedCheckout {
            response: CheckoutResponse {
                order_id,
                order_number,
                client_secret: charge.client_secret,
                charge_id: charge.charge_id,
                total_amount: deduction.total_amount,
            },
            credentials: resolved.credentials,
        })
    }

    /// The charge exists but the order does not; try to void it so the customer is never billed
    async fn compensate_charge(&self, charge_id: &str) {
        match self.gateway.cancel_charge(charge_id).await {
            Ok(state) => warn!(charge_id, %state, "Cancelled charge after failed checkout commit"),
            Err(e) => error!(
                charge_id,
                error = %e,
                "Could not cancel charge after failed checkout commit; manual review required"
            ),
        }
    }
}
