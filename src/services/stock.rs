use crate::entities::{product, Product};
use crate::errors::ServiceError;
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use tracing::warn;
use uuid::Uuid;

/// Stock movements for the order writer.
///
/// Every decrement is a conditional check-and-set: the `stock_quantity >= n`
/// guard rides in the UPDATE itself, so two orders racing for the last units
/// serialize at the database and the loser sees zero rows affected. Works
/// the same on Postgres and SQLite, no row lock needed.
pub async fn decrement<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
    quantity: i32,
) -> Result<(), ServiceError> {
    let result = Product::update_many()
        .col_expr(
            product::Column::StockQuantity,
            Expr::col(product::Column::StockQuantity).sub(quantity),
        )
        .filter(product::Column::Id.eq(product_id))
        .filter(product::Column::StockQuantity.gte(quantity))
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        return Err(ServiceError::InsufficientStock(format!(
            "product {} has fewer than {} units left",
            product_id, quantity
        )));
    }
    Ok(())
}

/// Returns units to the shelf (order cancellation, expired PayPal orders).
pub async fn restock<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
    quantity: i32,
) -> Result<(), ServiceError> {
    let result = Product::update_many()
        .col_expr(
            product::Column::StockQuantity,
            Expr::col(product::Column::StockQuantity).add(quantity),
        )
        .filter(product::Column::Id.eq(product_id))
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        // Product deleted since the order was placed; the units are gone.
        warn!(%product_id, quantity, "restock target no longer exists");
    }
    Ok(())
}

/// Bumps the units-sold counter. Best-effort: a miss is logged, never fatal.
pub async fn record_sale<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
    quantity: i32,
) -> Result<(), ServiceError> {
    let result = Product::update_many()
        .col_expr(
            product::Column::SalesCount,
            Expr::col(product::Column::SalesCount).add(quantity),
        )
        .filter(product::Column::Id.eq(product_id))
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        warn!(%product_id, "sales counter target no longer exists");
    }
    Ok(())
}
