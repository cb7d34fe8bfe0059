use crate::db::DbPool;
use crate::entities::{cart_item, product, CartItem, Product, ProductModel, ProductStatus};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::pricing::PricedLine;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, ModelTrait, QueryFilter, QueryOrder, Set,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Why a cart line was dropped during validation. Checked in this order;
/// the first failing check names the reason the buyer sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalReason {
    /// Product deleted or deactivated since it was added.
    Unavailable,
    /// Product still exists but left the purchasable status.
    StatusChanged,
    /// Nothing left on the shelf.
    OutOfStock,
    /// Line quantity exceeds the configured per-order ceiling.
    QuantityLimit,
}

impl RemovalReason {
    pub fn message(&self) -> &'static str {
        match self {
            Self::Unavailable => "Product is no longer available",
            Self::StatusChanged => "Product status changed",
            Self::OutOfStock => "Product is out of stock",
            Self::QuantityLimit => "Quantity exceeds the per-order limit",
        }
    }
}

/// Outcome of validating a single cart line against the live product row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineDecision {
    Keep,
    /// Quantity reduced to the remaining stock; the cart row is rewritten.
    Clamp(i32),
    Remove(RemovalReason),
}

/// Pure eligibility check for one cart line.
pub fn decide_line(
    product: Option<&ProductModel>,
    quantity: i32,
    max_quantity: i32,
) -> LineDecision {
    let product = match product {
        Some(p) if p.is_active => p,
        _ => return LineDecision::Remove(RemovalReason::Unavailable),
    };
    if product.status != ProductStatus::Active {
        return LineDecision::Remove(RemovalReason::StatusChanged);
    }
    if product.stock_quantity <= 0 {
        return LineDecision::Remove(RemovalReason::OutOfStock);
    }
    // The ceiling applies to what the buyer can actually get, so clamp to
    // stock first and judge the clamped quantity.
    let clamped = quantity.min(product.stock_quantity);
    if max_quantity > 0 && clamped > max_quantity {
        return LineDecision::Remove(RemovalReason::QuantityLimit);
    }
    if clamped < quantity {
        return LineDecision::Clamp(clamped);
    }
    LineDecision::Keep
}

/// A line the validator dropped, reported back to the buyer.
#[derive(Debug, Clone, Serialize)]
pub struct RemovedItem {
    pub product_id: Uuid,
    pub name: String,
    pub reason: String,
}

/// Result of a full-cart validation pass.
#[derive(Debug, Clone)]
pub struct ValidatedCart {
    /// Surviving lines with quantities already clamped, priced from the
    /// product snapshot taken in this pass.
    pub lines: Vec<PricedLine>,
    pub removed: Vec<RemovedItem>,
}

impl ValidatedCart {
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn was_revised(&self) -> bool {
        !self.removed.is_empty()
    }
}

/// Validates carts against the live catalog and repairs them in place:
/// ineligible lines are deleted, over-stock quantities clamped and written
/// back, so the persisted cart always matches what the buyer is shown.
pub struct CartValidator {
    db: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    max_quantity_per_order: i32,
}

impl CartValidator {
    pub fn new(db: Arc<DbPool>, event_sender: Arc<EventSender>, max_quantity_per_order: i32) -> Self {
        Self {
            db,
            event_sender,
            max_quantity_per_order,
        }
    }

    /// Runs the validation pass over a user's cart.
    #[instrument(skip(self))]
    pub async fn validate(&self, user_id: Uuid) -> Result<ValidatedCart, ServiceError> {
        let cart_lines = CartItem::find()
            .filter(cart_item::Column::UserId.eq(user_id))
            .order_by_asc(cart_item::Column::CreatedAt)
            .all(&*self.db)
            .await?;

        let product_ids: Vec<Uuid> = cart_lines.iter().map(|l| l.product_id).collect();
        let products: HashMap<Uuid, ProductModel> = if product_ids.is_empty() {
            HashMap::new()
        } else {
            Product::find()
                .filter(product::Column::Id.is_in(product_ids))
                .all(&*self.db)
                .await?
                .into_iter()
                .map(|p| (p.id, p))
                .collect()
        };

        let mut lines = Vec::new();
        let mut removed = Vec::new();

        for line in cart_lines {
            let product = products.get(&line.product_id);
            match decide_line(product, line.quantity, self.max_quantity_per_order) {
                LineDecision::Keep => {
                    let product = product.cloned().ok_or_else(|| {
                        ServiceError::InternalError("kept line without product".into())
                    })?;
                    lines.push(PricedLine::new(product, line.quantity));
                }
                LineDecision::Clamp(quantity) => {
                    let product = product.cloned().ok_or_else(|| {
                        ServiceError::InternalError("clamped line without product".into())
                    })?;
                    let mut active: cart_item::ActiveModel = line.into();
                    active.quantity = Set(quantity);
                    active.updated_at = Set(Utc::now());
                    active.update(&*self.db).await?;

                    info!(%user_id, product_id = %product.id, quantity, "clamped cart line to stock");
                    self.event_sender
                        .send_or_log(Event::CartLineClamped {
                            user_id,
                            product_id: product.id,
                            quantity,
                        })
                        .await;
                    lines.push(PricedLine::new(product, quantity));
                }
                LineDecision::Remove(reason) => {
                    let product_id = line.product_id;
                    let name = product
                        .map(|p| p.name.clone())
                        .unwrap_or_else(|| "Unknown item".to_string());
                    line.delete(&*self.db).await?;

                    info!(%user_id, %product_id, reason = reason.message(), "removed cart line");
                    self.event_sender
                        .send_or_log(Event::CartLineRemoved {
                            user_id,
                            product_id,
                            reason: reason.message().to_string(),
                        })
                        .await;
                    removed.push(RemovedItem {
                        product_id,
                        name,
                        reason: reason.message().to_string(),
                    });
                }
            }
        }

        Ok(ValidatedCart { lines, removed })
    }
}
