use crate::db::DbPool;
use crate::entities::{
    wallet, wallet_transaction, Wallet, WalletModel, WalletTransactionKind,
};
use crate::errors::ServiceError;
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

/// Debits a wallet inside the caller's transaction.
///
/// The balance check is the UPDATE's own `balance >= amount` guard, re-run
/// at commit time regardless of any earlier pre-check, so concurrent
/// checkouts against one wallet cannot double-spend. The matching ledger
/// row (negative amount) is written in the same transaction.
pub async fn debit<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
    amount: Decimal,
    reference_order_id: Uuid,
) -> Result<(), ServiceError> {
    let result = Wallet::update_many()
        .col_expr(
            wallet::Column::Balance,
            Expr::col(wallet::Column::Balance).sub(amount),
        )
        .col_expr(wallet::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(wallet::Column::UserId.eq(user_id))
        .filter(wallet::Column::Balance.gte(amount))
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        return Err(ServiceError::InsufficientBalance);
    }

    wallet_transaction::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(user_id),
        amount: Set(-amount),
        kind: Set(WalletTransactionKind::Payment),
        reference_order_id: Set(Some(reference_order_id)),
        created_at: Set(Utc::now()),
    }
    .insert(conn)
    .await?;

    Ok(())
}

/// Read-side wallet queries.
pub struct WalletService {
    db: Arc<DbPool>,
}

impl WalletService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    #[instrument(skip(self))]
    pub async fn get_wallet(&self, user_id: Uuid) -> Result<Option<WalletModel>, ServiceError> {
        Ok(Wallet::find_by_id(user_id).one(&*self.db).await?)
    }

    /// Balance for the checkout pre-check; a missing wallet reads as zero.
    #[instrument(skip(self))]
    pub async fn balance(&self, user_id: Uuid) -> Result<Decimal, ServiceError> {
        Ok(self
            .get_wallet(user_id)
            .await?
            .map(|w| w.balance)
            .unwrap_or(Decimal::ZERO))
    }
}
