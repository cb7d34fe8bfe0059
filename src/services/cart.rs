use crate::db::DbPool;
use crate::entities::{cart_item, CartItem, Product, ProductModel};
use crate::errors::ServiceError;
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, ModelTrait, QueryFilter, QueryOrder, Set,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

/// One cart line as the storefront renders it.
#[derive(Debug, Clone, Serialize)]
pub struct CartLineView {
    pub product_id: Uuid,
    pub name: String,
    pub sku: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
    pub stock_quantity: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct CartView {
    pub items: Vec<CartLineView>,
    pub subtotal: Decimal,
}

/// Cart reads and mutations. Quantities are clamped to available stock on
/// every write, so a cart never holds more of a product than the shelf does
/// at the time of the write.
pub struct CartService {
    db: Arc<DbPool>,
}

impl CartService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    #[instrument(skip(self))]
    pub async fn get_cart(&self, user_id: Uuid) -> Result<CartView, ServiceError> {
        let lines = CartItem::find()
            .filter(cart_item::Column::UserId.eq(user_id))
            .order_by_asc(cart_item::Column::CreatedAt)
            .find_also_related(Product)
            .all(&*self.db)
            .await?;

        let mut items = Vec::new();
        let mut subtotal = Decimal::ZERO;
        for (line, product) in lines {
            // Lines whose product vanished are dropped from the view; the
            // checkout validator deletes them for real.
            let Some(product) = product else { continue };
            let unit_price = product.price_to_charge();
            let line_total = unit_price * Decimal::from(line.quantity);
            subtotal += line_total;
            items.push(CartLineView {
                product_id: product.id,
                name: product.name,
                sku: product.sku,
                quantity: line.quantity,
                unit_price,
                line_total,
                stock_quantity: product.stock_quantity,
            });
        }

        Ok(CartView { items, subtotal })
    }

    /// Adds to the cart, merging with an existing line for the same product.
    #[instrument(skip(self))]
    pub async fn add_item(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<CartView, ServiceError> {
        if quantity < 1 {
            return Err(ServiceError::ValidationError(
                "Quantity must be at least 1".to_string(),
            ));
        }
        let product = self.sellable_product(product_id).await?;

        let existing = CartItem::find_by_id((user_id, product_id))
            .one(&*self.db)
            .await?;
        let now = Utc::now();

        match existing {
            Some(line) => {
                let merged = clamp_to_stock(line.quantity.saturating_add(quantity), &product);
                let mut active: cart_item::ActiveModel = line.into();
                active.quantity = Set(merged);
                active.updated_at = Set(now);
                active.update(&*self.db).await?;
            }
            None => {
                cart_item::ActiveModel {
                    user_id: Set(user_id),
                    product_id: Set(product_id),
                    quantity: Set(clamp_to_stock(quantity, &product)),
                    created_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(&*self.db)
                .await?;
            }
        }

        self.get_cart(user_id).await
    }

    /// Sets a line's quantity; zero removes the line.
    #[instrument(skip(self))]
    pub async fn update_item(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<CartView, ServiceError> {
        if quantity < 0 {
            return Err(ServiceError::ValidationError(
                "Quantity must not be negative".to_string(),
            ));
        }

        let line = CartItem::find_by_id((user_id, product_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Cart item not found".to_string()))?;

        if quantity == 0 {
            line.delete(&*self.db).await?;
            return self.get_cart(user_id).await;
        }

        let product = self.sellable_product(product_id).await?;
        let mut active: cart_item::ActiveModel = line.into();
        active.quantity = Set(clamp_to_stock(quantity, &product));
        active.updated_at = Set(Utc::now());
        active.update(&*self.db).await?;

        self.get_cart(user_id).await
    }

    #[instrument(skip(self))]
    pub async fn remove_item(&self, user_id: Uuid, product_id: Uuid) -> Result<(), ServiceError> {
        let result = CartItem::delete_by_id((user_id, product_id))
            .exec(&*self.db)
            .await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound("Cart item not found".to_string()));
        }
        Ok(())
    }

    async fn sellable_product(&self, product_id: Uuid) -> Result<ProductModel, ServiceError> {
        let product = Product::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;
        if !product.is_sellable() {
            return Err(ServiceError::InvalidOperation(
                "Product is not available for purchase".to_string(),
            ));
        }
        Ok(product)
    }
}

fn clamp_to_stock(quantity: i32, product: &ProductModel) -> i32 {
    quantity.min(product.stock_quantity).max(1)
}
