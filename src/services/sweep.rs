use crate::config::CheckoutConfig;
use crate::db::DbPool;
use crate::entities::{order, Order, OrderStatus, PaymentMethod, PaymentStatus};
use crate::errors::ServiceError;
use crate::services::orders::OrderService;
use chrono::{Duration as ChronoDuration, Utc};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument};

/// Background reaper for abandoned PayPal checkouts.
///
/// A PayPal order holds stock from the moment it is placed locally, but the
/// buyer may never come back from the approval page. Orders still unpaid
/// past the TTL are cancelled and their units restocked.
pub struct PendingOrderSweep {
    db: Arc<DbPool>,
    orders: Arc<OrderService>,
    ttl_minutes: i64,
    interval: Duration,
}

impl PendingOrderSweep {
    pub fn new(db: Arc<DbPool>, orders: Arc<OrderService>, config: &CheckoutConfig) -> Self {
        Self {
            db,
            orders,
            ttl_minutes: config.pending_paypal_ttl_minutes,
            interval: Duration::from_secs(config.sweep_interval_secs),
        }
    }

    /// Runs forever; spawn it on its own task.
    pub async fn run(self) {
        info!(
            ttl_minutes = self.ttl_minutes,
            interval_secs = self.interval.as_secs(),
            "starting pending-order sweep"
        );
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(err) = self.sweep_once().await {
                error!(error = %err, "pending-order sweep failed");
            }
        }
    }

    /// One pass: cancel every expired pending PayPal order.
    #[instrument(skip(self))]
    pub async fn sweep_once(&self) -> Result<usize, ServiceError> {
        let cutoff = Utc::now() - ChronoDuration::minutes(self.ttl_minutes);

        let expired = Order::find()
            .filter(order::Column::PaymentMethod.eq(PaymentMethod::Paypal))
            .filter(order::Column::PaymentStatus.eq(PaymentStatus::Pending))
            .filter(order::Column::Status.eq(OrderStatus::Pending))
            .filter(order::Column::CreatedAt.lt(cutoff))
            .all(&*self.db)
            .await?;

        let mut cancelled = 0;
        for stale in expired {
            // The cancel re-checks status under its own transaction; a
            // capture that already settled the order makes this a no-op,
            // and one still in flight loses its mark-paid guard and
            // surfaces the refund conflict to the buyer.
            if self
                .orders
                .cancel_and_restock(stale.id, "paypal approval window expired")
                .await?
            {
                cancelled += 1;
            }
        }

        if cancelled > 0 {
            info!(cancelled, "expired pending orders reclaimed");
        }
        Ok(cancelled)
    }
}
