use crate::{
    db::{self, DbPool},
    entities::{
        customer_order,
        order::{self, Entity as OrderEntity, OrderStatus, PaymentStatus, ShippingAddress},
        order_item::{self, Entity as OrderItemEntity},
        order_sequence::{self, Entity as OrderSequenceEntity},
        product::{self, Entity as ProductEntity},
        purchase_history,
    },
    errors::ServiceError,
    services::inventory::{InventoryLedger, ValidatedLine},
};
use chrono::{Datelike, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::{Expr, OnConflict},
    ActiveEnum, ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseTransaction,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

/// Order together with its line-item snapshots, in request order
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OrderDetails {
    pub order: order::Model,
    pub items: Vec<order_item::Model>,
}

/// Fields written when checkout creates an order
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub customer_email: String,
    pub total_items: i32,
    pub total_amount: Decimal,
    pub currency: String,
    pub shipping_address: ShippingAddress,
}

/// Administrative edit; absent fields are left untouched
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct UpdateOrderRequest {
    pub status: Option<OrderStatus>,
    pub payment_status: Option<PaymentStatus>,
    pub is_delivered: Option<bool>,
    pub transaction_id: Option<String>,
}

impl UpdateOrderRequest {
    fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.payment_status.is_none()
            && self.is_delivered.is_none()
            && self.transaction_id.is_none()
    }
}

#[derive(Debug, Clone, Default)]
pub struct OrderListFilter {
    pub page: u64,
    pub limit: u64,
    pub status: Option<OrderStatus>,
    pub search: Option<String>,
}

/// Result of asking to cancel an order inside a transaction
#[derive(Debug, Clone, PartialEq)]
pub enum CancelOutcome {
    /// Status moved to Cancelled and the listed lines were restocked
    Cancelled(Vec<order_item::Model>),
    AlreadyCancelled,
    /// Completed orders keep their inventory effects
    Completed,
}

pub fn format_order_number(year: i32, sequence: i64) -> String {
    format!("ORD-{year}-{sequence:05}")
}

pub fn parse_order_status(raw: &str) -> Result<OrderStatus, ServiceError> {
    OrderStatus::try_from_value(&raw.to_string())
        .map_err(|_| ServiceError::ValidationError(format!("Unknown order status: {raw}")))
}

/// Allocates the next `ORD-{year}-{seq}` number. The counter row stays locked until `txn` ends.
pub async fn next_order_number(txn: &DatabaseTransaction) -> Result<String, ServiceError> {
    let year = Utc::now().year();
    let key = format!("order-{year}");

    OrderSequenceEntity::insert(order_sequence::ActiveModel {
        name: Set(key.clone()),
        value: Set(1),
    })
    .on_conflict(
        OnConflict::column(order_sequence::Column::Name)
            .value(
                order_sequence::Column::Value,
                Expr::col((OrderSequenceEntity, order_sequence::Column::Value)).add(1),
            )
            .to_owned(),
    )
    .exec_without_returning(txn)
    .await?;

    let counter = OrderSequenceEntity::find_by_id(key.clone())
        .one(txn)
        .await?
        .ok_or_else(|| ServiceError::InternalError(format!("order sequence {key} missing")))?;

    Ok(format_order_number(year, counter.value))
}

/// Inserts the order (Processing / Un-Paid) and its line snapshots
pub async fn insert_order(
    txn: &DatabaseTransaction,
    new_order: NewOrder,
    order_number: String,
    lines: &[ValidatedLine],
) -> Result<(order::Model, Vec<order_item::Model>), ServiceError> {
    let now = Utc::now();
    let order = order::ActiveModel {
        id: Set(new_order.id),
        order_number: Set(order_number),
        customer_id: Set(new_order.customer_id),
        customer_email: Set(new_order.customer_email),
        total_items: Set(new_order.total_items),
        total_amount: Set(new_order.total_amount),
        currency: Set(new_order.currency),
        status: Set(OrderStatus::Processing),
        payment_status: Set(PaymentStatus::UnPaid),
        charge_id: Set(None),
        transaction_id: Set(None),
        card_brand: Set(None),
        card_last4: Set(None),
        shipping_address: Set(new_order.shipping_address),
        is_delivered: Set(false),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(txn)
    .await?;

    let mut items = Vec::with_capacity(lines.len());
    for (idx, line) in lines.iter().enumerate() {
        let item = order_item::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            line_number: Set(idx as i32 + 1),
            product_id: Set(line.product_id),
            product_title: Set(line.product_title.clone()),
            original_price: Set(line.original_price),
            discounted_price: Set(line.discounted_price),
            discount: Set(line.discount),
            quantity: Set(line.quantity),
            size: Set(line.size.clone()),
            color: Set(line.color.clone()),
        }
        .insert(txn)
        .await?;
        items.push(item);
    }

    Ok((order, items))
}

/// Adds the order to the customer's back-reference list
pub async fn link_customer(
    txn: &DatabaseTransaction,
    customer_id: Uuid,
    order_id: Uuid,
) -> Result<(), ServiceError> {
    customer_order::ActiveModel {
        customer_id: Set(customer_id),
        order_id: Set(order_id),
        created_at: Set(Utc::now()),
    }
    .insert(txn)
    .await?;
    Ok(())
}

pub async fn load_items<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
) -> Result<Vec<order_item::Model>, ServiceError> {
    Ok(OrderItemEntity::find()
        .filter(order_item::Column::OrderId.eq(order_id))
        .order_by_asc(order_item::Column::LineNumber)
        .all(conn)
        .await?)
}

/// Moves a Processing order to Cancelled / Un-Paid and restocks its lines, at most once.
///
/// The status guard is part of the UPDATE, so concurrent or repeated cancellations of the same
/// order restock exactly once.
pub async fn cancel_order_in_txn(
    txn: &DatabaseTransaction,
    ledger: &InventoryLedger,
    order_id: Uuid,
) -> Result<CancelOutcome, ServiceError> {
    let result = OrderEntity::update_many()
        .col_expr(order::Column::Status, Expr::value(OrderStatus::Cancelled))
        .col_expr(order::Column::PaymentStatus, Expr::value(PaymentStatus::UnPaid))
        .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(order::Column::Id.eq(order_id))
        .filter(order::Column::Status.eq(OrderStatus::Processing))
        .exec(txn)
        .await?;

    if result.rows_affected == 0 {
        let current = OrderEntity::find_by_id(order_id)
            .one(txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {order_id} not found")))?;
        return Ok(match current.status {
            OrderStatus::Completed => CancelOutcome::Completed,
            OrderStatus::Cancelled | OrderStatus::Processing => CancelOutcome::AlreadyCancelled,
        });
    }

    let items = load_items(txn, order_id).await?;
    ledger.revert(txn, &items).await?;
    Ok(CancelOutcome::Cancelled(items))
}

/// Marks the order Completed and, only on that transition, records purchase history and bumps
/// each distinct product's sold counter by one.
async fn complete_order_in_txn(
    txn: &DatabaseTransaction,
    order: &order::Model,
) -> Result<bool, ServiceError> {
    let result = OrderEntity::update_many()
        .col_expr(order::Column::Status, Expr::value(OrderStatus::Completed))
        .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(order::Column::Id.eq(order.id))
        .filter(order::Column::Status.ne(OrderStatus::Completed))
        .exec(txn)
        .await?;
    if result.rows_affected == 0 {
        return Ok(false);
    }

    let items = load_items(txn, order.id).await?;
    let products: BTreeSet<Uuid> = items.iter().map(|i| i.product_id).collect();
    let now = Utc::now();

    for product_id in products {
        purchase_history::ActiveModel {
            id: Set(Uuid::new_v4()),
            customer_id: Set(order.customer_id),
            product_id: Set(product_id),
            order_id: Set(order.id),
            created_at: Set(now),
        }
        .insert(txn)
        .await?;

        ProductEntity::update_many()
            .col_expr(
                product::Column::SoldCount,
                Expr::col(product::Column::SoldCount).add(1),
            )
            .col_expr(product::Column::UpdatedAt, Expr::value(now))
            .filter(product::Column::Id.eq(product_id))
            .exec(txn)
            .await?;
    }

    Ok(true)
}

/// Order lookup, listing and administrative edits
#[derive(Clone)]
pub struct OrderService {
    db_pool: Arc<DbPool>,
    ledger: InventoryLedger,
}

impl OrderService {
    pub fn new(db_pool: Arc<DbPool>, ledger: InventoryLedger) -> Self {
        Self { db_pool, ledger }
    }

    async fn find_model<C: ConnectionTrait>(
        conn: &C,
        id_or_number: &str,
    ) -> Result<order::Model, ServiceError> {
        let query = match Uuid::parse_str(id_or_number) {
            Ok(id) => OrderEntity::find_by_id(id),
            Err(_) => OrderEntity::find()
                .filter(order::Column::OrderNumber.eq(id_or_number.to_uppercase())),
        };
        query
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {id_or_number} not found")))
    }

    /// Looks an order up by UUID or by order number
    #[instrument(skip(self))]
    pub async fn get_order(&self, id_or_number: &str) -> Result<OrderDetails, ServiceError> {
        let db = &*self.db_pool;
        let order = Self::find_model(db, id_or_number).await?;
        let items = load_items(db, order.id).await?;
        Ok(OrderDetails { order, items })
    }

    pub async fn find_by_charge_id<C: ConnectionTrait>(
        conn: &C,
        charge_id: &str,
    ) -> Result<order::Model, ServiceError> {
        OrderEntity::find()
            .filter(order::Column::ChargeId.eq(charge_id))
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("No order for charge {charge_id}")))
    }

    /// Newest first; `search` matches order number or customer email, case-insensitively
    #[instrument(skip(self))]
    pub async fn list_orders(
        &self,
        filter: OrderListFilter,
    ) -> Result<(Vec<order::Model>, u64), ServiceError> {
        let db = &*self.db_pool;
        let mut query = OrderEntity::find();

        if let Some(status) = filter.status {
            query = query.filter(order::Column::Status.eq(status));
        }
        if let Some(search) = filter
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            query = query.filter(
                Condition::any()
                    .add(order::Column::OrderNumber.contains(search.to_uppercase()))
                    .add(order::Column::CustomerEmail.contains(search.to_lowercase())),
            );
        }

        let limit = filter.limit.clamp(1, 100);
        let page = filter.page.max(1);
        let paginator = query
            .order_by_desc(order::Column::CreatedAt)
            .paginate(db, limit);
        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page - 1).await?;

        Ok((orders, total))
    }

    /// Applies an administrative edit. Completed orders are frozen.
    #[instrument(skip(self, request))]
    pub async fn update_order(
        &self,
        id_or_number: &str,
        request: UpdateOrderRequest,
    ) -> Result<OrderDetails, ServiceError> {
        if request.is_empty() {
            return Err(ServiceError::ValidationError(
                "Nothing to update; provide at least one field.".into(),
            ));
        }

        let txn = self.db_pool.begin().await?;
        match self.update_in_txn(&txn, id_or_number, request).await {
            Ok(order_id) => {
                db::commit(txn, "orders.update").await?;
                self.get_order(&order_id.to_string()).await
            }
            Err(e) => {
                db::rollback(txn, "orders.update").await;
                Err(e)
            }
        }
    }

    async fn update_in_txn(
        &self,
        txn: &DatabaseTransaction,
        id_or_number: &str,
        request: UpdateOrderRequest,
    ) -> Result<Uuid, ServiceError> {
        let current = Self::find_model(txn, id_or_number).await?;
        if current.status == OrderStatus::Completed {
            return Err(ServiceError::InvalidOperation(
                "You cannot update after the order is completed".into(),
            ));
        }

        let mut active: order::ActiveModel = current.clone().into();
        let mut touched = false;
        if let Some(payment_status) = request.payment_status {
            active.payment_status = Set(payment_status);
            touched = true;
        }
        if let Some(is_delivered) = request.is_delivered {
            active.is_delivered = Set(is_delivered);
            touched = true;
        }
        if let Some(transaction_id) = request.transaction_id {
            active.transaction_id = Set(Some(transaction_id));
            touched = true;
        }
        if touched {
            active.updated_at = Set(Utc::now());
            active.update(txn).await?;
        }

        match request.status {
            Some(OrderStatus::Completed) if current.status == OrderStatus::Cancelled => {
                return Err(ServiceError::InvalidOperation(
                    "A cancelled order cannot be completed".into(),
                ));
            }
            Some(OrderStatus::Completed) => {
                if complete_order_in_txn(txn, &current).await? {
                    info!(order_id = %current.id, "Order completed");
                    metrics::counter!("storefront.orders.completed", 1);
                }
            }
            Some(OrderStatus::Cancelled) => {
                match cancel_order_in_txn(txn, &self.ledger, current.id).await? {
                    CancelOutcome::Cancelled(_) => {
                        info!(order_id = %current.id, "Order cancelled by administrator");
                        metrics::counter!("storefront.orders.cancelled", 1, "source" => "admin");
                    }
                    outcome => {
                        warn!(order_id = %current.id, ?outcome, "Cancellation had no effect");
                    }
                }
            }
            Some(OrderStatus::Processing) if current.status == OrderStatus::Cancelled => {
                return Err(ServiceError::InvalidOperation(
                    "A cancelled order cannot be reopened".into(),
                ));
            }
            Some(OrderStatus::Processing) | None => {}
        }

        Ok(current.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn order_numbers_are_zero_padded() {
        assert_eq!(format_order_number(2024, 12), "ORD-2024-00012");
        assert_eq!(format_order_number(2025, 123_456), "ORD-2025-123456");
    }

    #[test]
    fn parses_known_statuses_only() {
        assert_eq!(parse_order_status("Completed").unwrap(), OrderStatus::Completed);
        assert_matches!(
            parse_order_status("shipped"),
            Err(ServiceError::ValidationError(_))
        );
    }

    #[test]
    fn empty_update_is_detected() {
        assert!(UpdateOrderRequest::default().is_empty());
        let req = UpdateOrderRequest {
            is_delivered: Some(true),
            ..Default::default()
        };
        assert!(!req.is_empty());
    }
}
