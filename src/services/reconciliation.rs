use crate::{
    db::{self, DbPool},
    entities::order::{self, Entity as OrderEntity, OrderStatus, PaymentStatus},
    errors::ServiceError,
    payments::{CardSummary, ChargeState, GatewayEvent, GatewayEventKind, PaymentGateway},
    services::{
        inventory::InventoryLedger,
        orders::{self, CancelOutcome, OrderService},
    },
    webhooks::WebhookEventLedger,
};
use chrono::Utc;
use metrics::counter;
use sea_orm::{ActiveModelTrait, DatabaseTransaction, EntityTrait, Set, TransactionTrait};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// What a verified gateway event did to local state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconciliationOutcome {
    MarkedPaid { order_id: Uuid },
    Cancelled { order_id: Uuid },
    /// The event's effect is already in place (redelivery)
    AlreadyApplied { order_id: Option<Uuid> },
    /// Acknowledged without touching state
    Ignored { reason: String },
}

impl ReconciliationOutcome {
    fn label(&self) -> &'static str {
        match self {
            Self::MarkedPaid { .. } => "paid",
            Self::Cancelled { .. } => "cancelled",
            Self::AlreadyApplied { .. } => "duplicate",
            Self::Ignored { .. } => "ignored",
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CancelChargeRequest {
    #[validate(length(min = 1, max = 255, message = "charge_id is required"))]
    pub charge_id: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CancelChargeResponse {
    pub order_id: Uuid,
    pub order_number: String,
    pub charge_id: String,
    pub charge_state: String,
}

/// Applies the gateway's charge outcomes to orders and stock
#[derive(Clone)]
pub struct PaymentReconciliationHandler {
    db_pool: Arc<DbPool>,
    ledger: InventoryLedger,
    gateway: Arc<dyn PaymentGateway>,
    webhook_secret: Option<String>,
    tolerance: Duration,
    event_ledger: Option<WebhookEventLedger>,
}

impl PaymentReconciliationHandler {
    pub fn new(
        db_pool: Arc<DbPool>,
        ledger: InventoryLedger,
        gateway: Arc<dyn PaymentGateway>,
        webhook_secret: Option<String>,
        tolerance: Duration,
    ) -> Self {
        Self {
            db_pool,
            ledger,
            gateway,
            webhook_secret: webhook_secret.filter(|s| !s.trim().is_empty()),
            tolerance,
            event_ledger: None,
        }
    }

    pub fn with_event_ledger(mut self, ledger: Option<WebhookEventLedger>) -> Self {
        self.event_ledger = ledger;
        self
    }

    /// Verifies `payload` against `signature_header` and applies the event.
    ///
    /// Signature failures return before any transaction is opened.
    #[instrument(skip(self, payload, signature_header), fields(bytes = payload.len()))]
    pub async fn handle_event(
        &self,
        payload: &[u8],
        signature_header: Option<&str>,
    ) -> Result<ReconciliationOutcome, ServiceError> {
        let secret = self.webhook_secret.as_deref().ok_or_else(|| {
            ServiceError::InternalError("webhook signing secret not configured".into())
        })?;
        let header = signature_header.ok_or_else(|| {
            ServiceError::InvalidSignature("missing signature header".into())
        })?;

        let event = self
            .gateway
            .construct_event(payload, header, secret, self.tolerance)
            .map_err(|e| {
                counter!("storefront.reconciliation.rejected", 1);
                warn!(error = %e, "Rejected gateway event");
                ServiceError::from(e)
            })?;

        if let Some(ledger) = &self.event_ledger {
            if ledger.already_processed(&event.id).await {
                info!(event_id = %event.id, "Gateway event already processed");
                return Ok(ReconciliationOutcome::AlreadyApplied { order_id: None });
            }
        }

        let outcome = self.apply(&event).await?;

        counter!("storefront.reconciliation.events", 1, "outcome" => outcome.label());
        if let Some(ledger) = &self.event_ledger {
            ledger.mark_processed(&event.id).await;
        }
        Ok(outcome)
    }

    async fn apply(&self, event: &GatewayEvent) -> Result<ReconciliationOutcome, ServiceError> {
        if let GatewayEventKind::Other(event_type) = &event.kind {
            info!(event_id = %event.id, %event_type, "Ignoring unhandled gateway event");
            return Ok(ReconciliationOutcome::Ignored {
                reason: format!("unhandled event type {event_type}"),
            });
        }

        let Some(order_id) = event.charge.order_id() else {
            warn!(
                event_id = %event.id,
                charge_id = %event.charge.id,
                "Gateway event carries no order id"
            );
            return Ok(ReconciliationOutcome::Ignored {
                reason: "event has no order metadata".into(),
            });
        };

        match &event.kind {
            GatewayEventKind::ChargeSucceeded => {
                let card = self.card_summary(event).await;
                let txn = self.db_pool.begin().await?;
                match Self::mark_paid(&txn, order_id, &event.charge.id, card).await {
                    Ok(outcome) => {
                        db::commit(txn, "reconciliation.succeeded").await?;
                        Ok(outcome)
                    }
                    Err(e) => {
                        db::rollback(txn, "reconciliation.succeeded").await;
                        Err(e)
                    }
                }
            }
            GatewayEventKind::ChargeCancelled => {
                let txn = self.db_pool.begin().await?;
                match orders::cancel_order_in_txn(&txn, &self.ledger, order_id).await {
                    Ok(outcome) => {
                        db::commit(txn, "reconciliation.cancelled").await?;
                        Ok(match outcome {
                            CancelOutcome::Cancelled(items) => {
                                info!(
                                    %order_id,
                                    lines = items.len(),
                                    "Order cancelled by gateway; stock reverted"
                                );
                                ReconciliationOutcome::Cancelled { order_id }
                            }
                            CancelOutcome::AlreadyCancelled => {
                                info!(%order_id, "Order already cancelled; nothing to do");
                                ReconciliationOutcome::AlreadyApplied {
                                    order_id: Some(order_id),
                                }
                            }
                            CancelOutcome::Completed => {
                                warn!(
                                    %order_id,
                                    "Cancellation received for a completed order; ignored"
                                );
                                ReconciliationOutcome::Ignored {
                                    reason: "order already completed".into(),
                                }
                            }
                        })
                    }
                    Err(e) => {
                        db::rollback(txn, "reconciliation.cancelled").await;
                        Err(e)
                    }
                }
            }
            GatewayEventKind::Other(_) => Ok(ReconciliationOutcome::Ignored {
                reason: "unhandled event type".into(),
            }),
        }
    }

    /// Card details are informational; lookup failures never block reconciliation
    async fn card_summary(&self, event: &GatewayEvent) -> Option<CardSummary> {
        let payment_method = event.charge.payment_method.as_deref()?;
        match self.gateway.retrieve_payment_method(payment_method).await {
            Ok(card) => Some(card),
            Err(e) => {
                warn!(charge_id = %event.charge.id, error = %e, "Could not retrieve card summary");
                None
            }
        }
    }

    async fn mark_paid(
        txn: &DatabaseTransaction,
        order_id: Uuid,
        charge_id: &str,
        card: Option<CardSummary>,
    ) -> Result<ReconciliationOutcome, ServiceError> {
        let current = OrderEntity::find_by_id(order_id)
            .one(txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {order_id} not found")))?;

        if current.payment_status == PaymentStatus::Paid
            && current.transaction_id.as_deref() == Some(charge_id)
        {
            return Ok(ReconciliationOutcome::AlreadyApplied {
                order_id: Some(order_id),
            });
        }
        if current.status == OrderStatus::Cancelled {
            warn!(
                %order_id,
                charge_id,
                "Payment succeeded for a cancelled order; refund may be required"
            );
        }

        let mut active: order::ActiveModel = current.into();
        active.payment_status = Set(PaymentStatus::Paid);
        active.transaction_id = Set(Some(charge_id.to_string()));
        if let Some(card) = card {
            active.card_brand = Set(Some(card.brand));
            active.card_last4 = Set(Some(card.last4));
        }
        active.updated_at = Set(Utc::now());
        active.update(txn).await?;

        info!(%order_id, charge_id, "Order marked paid");
        Ok(ReconciliationOutcome::MarkedPaid { order_id })
    }

    /// Customer-initiated cancellation of a charge that has not completed yet
    #[instrument(skip(self, request), fields(charge_id = %request.charge_id))]
    pub async fn cancel_charge(
        &self,
        request: CancelChargeRequest,
    ) -> Result<CancelChargeResponse, ServiceError> {
        request.validate()?;
        let charge_id = request.charge_id.trim();

        let order = OrderService::find_by_charge_id(&*self.db_pool, charge_id).await?;
        match order.status {
            OrderStatus::Cancelled => {
                return Err(ServiceError::InvalidOperation(
                    "Order is already cancelled.".into(),
                ))
            }
            OrderStatus::Completed => {
                return Err(ServiceError::InvalidOperation(
                    "Completed orders cannot be cancelled.".into(),
                ))
            }
            OrderStatus::Processing => {}
        }

        let details = self.gateway.retrieve_charge(charge_id).await?;
        if details.state.is_final() {
            return Err(ServiceError::InvalidOperation(format!(
                "Charge {charge_id} is already {} and cannot be cancelled.",
                details.state
            )));
        }

        let state = self.gateway.cancel_charge(charge_id).await?;
        if state != ChargeState::Canceled {
            return Err(ServiceError::InvalidOperation(format!(
                "Gateway reported charge {charge_id} as {state} after cancellation."
            )));
        }

        let txn = self.db_pool.begin().await?;
        match orders::cancel_order_in_txn(&txn, &self.ledger, order.id).await {
            Ok(CancelOutcome::Completed) => {
                db::rollback(txn, "cancel_charge").await;
                Err(ServiceError::InvalidOperation(
                    "Completed orders cannot be cancelled.".into(),
                ))
            }
            Ok(outcome) => {
                db::commit(txn, "cancel_charge").await?;
                if matches!(outcome, CancelOutcome::Cancelled(_)) {
                    counter!("storefront.orders.cancelled", 1, "source" => "customer");
                }
                info!(order_id = %order.id, charge_id, "Charge cancelled by customer");
                Ok(CancelChargeResponse {
                    order_id: order.id,
                    order_number: order.order_number,
                    charge_id: charge_id.to_string(),
                    charge_state: state.to_string(),
                })
            }
            Err(e) => {
                db::rollback(txn, "cancel_charge").await;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_labels_are_stable() {
        assert_eq!(
            ReconciliationOutcome::MarkedPaid {
                order_id: Uuid::nil()
            }
            .label(),
            "paid"
        );
        assert_eq!(
            ReconciliationOutcome::Ignored {
                reason: "x".into()
            }
            .label(),
            "ignored"
        );
    }
}
