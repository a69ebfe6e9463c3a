use crate::{
    entities::{
        order_item,
        product::{self, Entity as ProductEntity},
        product_variant::{self, Entity as ProductVariantEntity},
        size_stock::{self, Entity as SizeStockEntity},
    },
    errors::ServiceError,
};
use rust_decimal::{Decimal, RoundingStrategy};
use sea_orm::{sea_query::Expr, ColumnTrait, DatabaseTransaction, EntityTrait, QueryFilter};
use std::collections::HashMap;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

/// One requested line: which product, which color/size, how many
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineRequest {
    pub product_id: Uuid,
    pub quantity: i32,
    pub size: String,
    pub color: String,
}

/// A line that passed stock validation, priced from the product at deduction time
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedLine {
    pub product_id: Uuid,
    pub product_title: String,
    pub original_price: Decimal,
    pub discounted_price: Decimal,
    pub discount: Decimal,
    pub quantity: i32,
    pub size: String,
    pub color: String,
}

impl ValidatedLine {
    pub fn line_total(&self) -> Decimal {
        self.discounted_price * Decimal::from(self.quantity)
    }
}

#[derive(Debug, Clone)]
pub struct Deduction {
    pub items: Vec<ValidatedLine>,
    /// Sum of discounted line totals, rounded to cents
    pub total_amount: Decimal,
}

/// Rounds a money amount to two decimal places, halves away from zero
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Sum of `price * (1 - discount/100) * quantity` over `(price, discount, quantity)` lines
pub fn order_total<I>(lines: I) -> Decimal
where
    I: IntoIterator<Item = (Decimal, Decimal, i32)>,
{
    let sum = lines
        .into_iter()
        .fold(Decimal::ZERO, |acc, (price, discount, quantity)| {
            acc + price * (Decimal::ONE - discount / Decimal::ONE_HUNDRED) * Decimal::from(quantity)
        });
    round_money(sum)
}

/// Stock row touched by the current request, with the running quantity claimed against it
struct PendingStock {
    row: size_stock::Model,
    delta: i32,
}

/// Per-product, per-variant, per-size stock counts.
///
/// Every method takes the caller's transaction; nothing here commits.
#[derive(Clone, Copy, Debug, Default)]
pub struct InventoryLedger;

impl InventoryLedger {
    pub fn new() -> Self {
        Self
    }

    async fn load_product(
        txn: &DatabaseTransaction,
        cache: &mut HashMap<Uuid, product::Model>,
        product_id: Uuid,
    ) -> Result<product::Model, ServiceError> {
        if let Some(found) = cache.get(&product_id) {
            return Ok(found.clone());
        }
        let found = ProductEntity::find_by_id(product_id)
            .one(txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product with ID {product_id} not found."))
            })?;
        cache.insert(product_id, found.clone());
        Ok(found)
    }

    async fn locate_stock(
        txn: &DatabaseTransaction,
        product_id: Uuid,
        color: &str,
        size: &str,
    ) -> Result<size_stock::Model, ServiceError> {
        let variant = ProductVariantEntity::find()
            .filter(product_variant::Column::ProductId.eq(product_id))
            .filter(product_variant::Column::Color.eq(color))
            .one(txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Variant not found for color {color}."))
            })?;

        SizeStockEntity::find()
            .filter(size_stock::Column::VariantId.eq(variant.id))
            .filter(size_stock::Column::Size.eq(size))
            .one(txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Size not found for size {size}.")))
    }

    /// Validates every line against current stock, then subtracts the quantities.
    ///
    /// Lines are checked in order and repeated product/color/size lines draw down the same
    /// count. Nothing is written until all lines pass, and each stock row is written once.
    #[instrument(skip(self, txn, lines), fields(lines = lines.len()))]
    pub async fn deduct(
        &self,
        txn: &DatabaseTransaction,
        lines: &[LineRequest],
    ) -> Result<Deduction, ServiceError> {
        let mut products = HashMap::new();
        let mut pending: Vec<PendingStock> = Vec::new();
        let mut pending_index: HashMap<Uuid, usize> = HashMap::new();
        let mut items = Vec::with_capacity(lines.len());

        for line in lines {
            if line.quantity < 1 {
                return Err(ServiceError::ValidationError(format!(
                    "Quantity for product {} must be at least 1.",
                    line.product_id
                )));
            }

            let product = Self::load_product(txn, &mut products, line.product_id).await?;
            let row = Self::locate_stock(txn, line.product_id, &line.color, &line.size).await?;

            let slot = match pending_index.get(&row.id) {
                Some(idx) => *idx,
                None => {
                    pending_index.insert(row.id, pending.len());
                    pending.push(PendingStock { row, delta: 0 });
                    pending.len() - 1
                }
            };
            let entry = &mut pending[slot];
            let available = entry.row.stock - entry.delta;
            if available < line.quantity {
                return Err(ServiceError::InsufficientStock(format!(
                    "Insufficient stock for size {} and color {}.",
                    line.size, line.color
                )));
            }
            entry.delta += line.quantity;

            items.push(ValidatedLine {
                product_id: product.id,
                product_title: product.title.clone(),
                original_price: product.price,
                discounted_price: product.discounted_price(),
                discount: product.discount,
                quantity: line.quantity,
                size: line.size.clone(),
                color: line.color.clone(),
            });
        }

        for entry in &pending {
            let result = SizeStockEntity::update_many()
                .col_expr(
                    size_stock::Column::Stock,
                    Expr::col(size_stock::Column::Stock).sub(entry.delta),
                )
                .filter(size_stock::Column::Id.eq(entry.row.id))
                .filter(size_stock::Column::Stock.gte(entry.delta))
                .exec(txn)
                .await?;

            // Another writer drew the row down between our read and this write
            if result.rows_affected == 0 {
                return Err(ServiceError::InsufficientStock(format!(
                    "Insufficient stock for size {} (stock row {}).",
                    entry.row.size, entry.row.id
                )));
            }
            debug!(stock_id = %entry.row.id, deducted = entry.delta, "Stock deducted");
        }

        let total_amount = order_total(
            items
                .iter()
                .map(|item| (item.original_price, item.discount, item.quantity)),
        );

        Ok(Deduction {
            items,
            total_amount,
        })
    }

    /// Adds each line's quantity back along the same product/color/size path.
    ///
    /// Callers guarantee this runs at most once per order. Lines whose variant or size no
    /// longer exists are skipped with a warning.
    #[instrument(skip(self, txn, items), fields(items = items.len()))]
    pub async fn revert(
        &self,
        txn: &DatabaseTransaction,
        items: &[order_item::Model],
    ) -> Result<(), ServiceError> {
        let mut restock: Vec<(Uuid, i32)> = Vec::new();

        for item in items {
            let row = match Self::locate_stock(txn, item.product_id, &item.color, &item.size).await
            {
                Ok(row) => row,
                Err(ServiceError::NotFound(reason)) => {
                    warn!(
                        product_id = %item.product_id,
                        order_id = %item.order_id,
                        %reason,
                        "Cannot restock line; stock entry no longer exists"
                    );
                    continue;
                }
                Err(e) => return Err(e),
            };

            match restock.iter_mut().find(|(id, _)| *id == row.id) {
                Some((_, qty)) => *qty += item.quantity,
                None => restock.push((row.id, item.quantity)),
            }
        }

        for (stock_id, quantity) in restock {
            SizeStockEntity::update_many()
                .col_expr(
                    size_stock::Column::Stock,
                    Expr::col(size_stock::Column::Stock).add(quantity),
                )
                .filter(size_stock::Column::Id.eq(stock_id))
                .exec(txn)
                .await?;
            debug!(%stock_id, restocked = quantity, "Stock reverted");
        }

        Ok(())
    }
}
