use crate::db::DbPool;
use crate::entities::{
    order, order_item, Order, OrderItem, OrderItemModel, OrderModel, OrderStatus, PaymentMethod,
    PaymentStatus,
};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::pricing::{PricedLine, PricingBreakdown};
use crate::services::{stock, wallet};
use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DbErr, EntityTrait, QueryFilter, Set, SqlErr, TransactionTrait,
};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

const ORDER_NUMBER_ATTEMPTS: u32 = 3;

/// Everything the writer needs to commit one order. Lines and totals come
/// from the validation/pricing pass that just ran.
#[derive(Debug, Clone)]
pub struct PlaceOrderInput {
    pub user_id: Uuid,
    pub lines: Vec<PricedLine>,
    pub totals: PricingBreakdown,
    pub payment_method: PaymentMethod,
    pub shipping_address_id: Uuid,
    pub billing_address_id: Uuid,
    pub notes: Option<String>,
}

/// Writes orders atomically: header, line snapshots, stock decrements, cart
/// cleanup and (for wallet payments) the debit all commit or roll back as
/// one transaction.
pub struct OrderService {
    db: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl OrderService {
    pub fn new(db: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Commits the order. Retries on an order-number collision only; any
    /// other failure (stock depleted, wallet short) rolls everything back
    /// and surfaces as-is.
    #[instrument(skip(self, input), fields(user_id = %input.user_id, method = ?input.payment_method))]
    pub async fn place_order(&self, input: PlaceOrderInput) -> Result<OrderModel, ServiceError> {
        if input.lines.is_empty() {
            return Err(ServiceError::InvalidOperation(
                "Cannot place an order with no items".to_string(),
            ));
        }

        let mut last_err = None;
        for _ in 0..ORDER_NUMBER_ATTEMPTS {
            let order_number = generate_order_number();
            match self.try_place_order(&input, &order_number).await {
                Ok(order) => {
                    info!(order_id = %order.id, %order_number, "order committed");
                    self.event_sender
                        .send_or_log(Event::OrderPlaced {
                            order_id: order.id,
                            order_number: order.order_number.clone(),
                            user_id: order.user_id,
                        })
                        .await;
                    if order.payment_status == PaymentStatus::Paid {
                        self.event_sender
                            .send_or_log(Event::WalletDebited {
                                user_id: order.user_id,
                                amount: order.total_amount,
                                order_id: order.id,
                            })
                            .await;
                        self.event_sender
                            .send_or_log(Event::OrderPaid { order_id: order.id })
                            .await;
                    }
                    return Ok(order);
                }
                Err(ServiceError::DatabaseError(err)) if is_unique_violation(&err) => {
                    warn!(%order_number, "order number collision, retrying");
                    last_err = Some(ServiceError::DatabaseError(err));
                }
                Err(err) => return Err(err),
            }
        }
        Err(last_err.unwrap_or_else(|| {
            ServiceError::InternalError("order number generation exhausted".to_string())
        }))
    }

    async fn try_place_order(
        &self,
        input: &PlaceOrderInput,
        order_number: &str,
    ) -> Result<OrderModel, ServiceError> {
        let txn = self.db.begin().await?;
        let now = Utc::now();

        // Wallet orders settle inside the transaction; everything else
        // leaves payment pending for its own settlement step.
        let pay_now = input.payment_method == PaymentMethod::Wallet;
        let (status, payment_status) = if pay_now {
            (OrderStatus::Processing, PaymentStatus::Paid)
        } else {
            (OrderStatus::Pending, PaymentStatus::Pending)
        };

        let order = order::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_number: Set(order_number.to_string()),
            user_id: Set(input.user_id),
            status: Set(status),
            payment_method: Set(input.payment_method),
            payment_status: Set(payment_status),
            subtotal: Set(input.totals.subtotal),
            tax_amount: Set(input.totals.tax_amount),
            shipping_amount: Set(input.totals.shipping_amount),
            total_amount: Set(input.totals.total_amount),
            shipping_address_id: Set(input.shipping_address_id),
            billing_address_id: Set(input.billing_address_id),
            notes: Set(input.notes.clone()),
            paypal_order_id: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        for line in &input.lines {
            stock::decrement(&txn, line.product_id(), line.quantity).await?;
            stock::record_sale(&txn, line.product_id(), line.quantity).await?;

            order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order.id),
                product_id: Set(line.product_id()),
                product_name: Set(line.product.name.clone()),
                product_sku: Set(line.product.sku.clone()),
                quantity: Set(line.quantity),
                unit_price: Set(line.unit_price),
                total_price: Set(line.line_total),
            }
            .insert(&txn)
            .await?;
        }

        if pay_now {
            wallet::debit(&txn, input.user_id, input.totals.total_amount, order.id).await?;
        }

        crate::entities::CartItem::delete_many()
            .filter(crate::entities::cart_item::Column::UserId.eq(input.user_id))
            .exec(&txn)
            .await?;

        txn.commit().await?;
        Ok(order)
    }

    #[instrument(skip(self))]
    pub async fn get_order(
        &self,
        order_id: Uuid,
    ) -> Result<(OrderModel, Vec<OrderItemModel>), ServiceError> {
        let order = Order::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;
        let items = OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&*self.db)
            .await?;
        Ok((order, items))
    }

    pub async fn find_by_paypal_order_id(
        &self,
        paypal_order_id: &str,
    ) -> Result<Option<OrderModel>, ServiceError> {
        Ok(Order::find()
            .filter(order::Column::PaypalOrderId.eq(paypal_order_id))
            .one(&*self.db)
            .await?)
    }

    /// Records the gateway's order id against ours after the create call.
    pub async fn set_paypal_order_id(
        &self,
        order_id: Uuid,
        paypal_order_id: &str,
    ) -> Result<(), ServiceError> {
        let order = Order::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;
        let mut active: order::ActiveModel = order.into();
        active.paypal_order_id = Set(Some(paypal_order_id.to_string()));
        active.updated_at = Set(Utc::now());
        active.update(&*self.db).await?;
        Ok(())
    }

    /// Moves a pending order to paid. Returns whether this call did the
    /// move: false means the guard no longer matched, either because the
    /// order was already paid or because it was cancelled underneath us
    /// (the sweep may reclaim an order mid-capture). The caller decides
    /// which of those it is.
    #[instrument(skip(self))]
    pub async fn mark_paid(&self, order_id: Uuid) -> Result<bool, ServiceError> {
        let result = Order::update_many()
            .col_expr(
                order::Column::PaymentStatus,
                sea_orm::sea_query::Expr::value(PaymentStatus::Paid),
            )
            .col_expr(
                order::Column::Status,
                sea_orm::sea_query::Expr::value(OrderStatus::Processing),
            )
            .col_expr(
                order::Column::UpdatedAt,
                sea_orm::sea_query::Expr::value(Utc::now()),
            )
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::PaymentStatus.eq(PaymentStatus::Pending))
            .filter(order::Column::Status.eq(OrderStatus::Pending))
            .exec(&*self.db)
            .await?;

        if result.rows_affected > 0 {
            self.event_sender
                .send_or_log(Event::OrderPaid { order_id })
                .await;
        }
        Ok(result.rows_affected > 0)
    }

    /// Cancels an unpaid order and puts its units back on the shelf. No-op
    /// if the order was paid or already cancelled in the meantime.
    #[instrument(skip(self))]
    pub async fn cancel_and_restock(
        &self,
        order_id: Uuid,
        reason: &str,
    ) -> Result<bool, ServiceError> {
        let txn = self.db.begin().await?;

        let result = Order::update_many()
            .col_expr(
                order::Column::Status,
                sea_orm::sea_query::Expr::value(OrderStatus::Cancelled),
            )
            .col_expr(
                order::Column::UpdatedAt,
                sea_orm::sea_query::Expr::value(Utc::now()),
            )
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::Status.eq(OrderStatus::Pending))
            .filter(order::Column::PaymentStatus.eq(PaymentStatus::Pending))
            .exec(&txn)
            .await?;

        if result.rows_affected == 0 {
            txn.rollback().await?;
            return Ok(false);
        }

        let items = OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&txn)
            .await?;
        for item in &items {
            stock::restock(&txn, item.product_id, item.quantity).await?;
        }

        txn.commit().await?;

        info!(%order_id, reason, "order cancelled and restocked");
        self.event_sender
            .send_or_log(Event::OrderCancelled {
                order_id,
                reason: reason.to_string(),
            })
            .await;
        Ok(true)
    }
}

/// Human-readable order number: ORD-<date>-<6 random alphanumerics>.
/// Collisions are possible and handled by retrying against the unique index.
pub fn generate_order_number() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(|b| (b as char).to_ascii_uppercase())
        .collect();
    format!("ORD-{}-{}", Utc::now().format("%Y%m%d"), suffix)
}

fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_numbers_have_the_expected_shape() {
        let number = generate_order_number();
        let parts: Vec<&str> = number.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "ORD");
        assert_eq!(parts[1].len(), 8);
        assert!(parts[1].chars().all(|c| c.is_ascii_digit()));
        assert_eq!(parts[2].len(), 6);
        assert!(parts[2]
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }
}
