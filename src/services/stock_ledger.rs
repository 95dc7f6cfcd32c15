//! Stock Ledger
//!
//! Owns the authoritative on-hand quantity per (branch, product). Every
//! operation runs on a caller-supplied connection, normally an open
//! transaction, so the stock change, its audit row and whatever the caller
//! writes next commit or roll back together.
//!
//! Each operation takes the exclusive row lock on the stock line and re-reads
//! the quantity under it; nothing read earlier in the request is trusted.

use chrono::Utc;
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::{Expr, OnConflict},
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbBackend, EntityTrait, QueryFilter,
    QuerySelect, Set,
};
use std::time::Duration;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::db::set_lock_timeout;
use crate::entities::inventory_transaction::{self, TransactionType};
use crate::entities::stock_line;
use crate::errors::ServiceError;
use crate::quantity::{ensure_storable, normalize_count, quantize};

/// Who caused a stock movement and on whose behalf
#[derive(Debug, Clone, Copy)]
pub struct Movement<'a> {
    pub added_by: &'a str,
    pub reservation_id: Option<Uuid>,
}

impl<'a> Movement<'a> {
    pub fn manual(added_by: &'a str) -> Self {
        Self {
            added_by,
            reservation_id: None,
        }
    }

    pub fn for_reservation(added_by: &'a str, reservation_id: Uuid) -> Self {
        Self {
            added_by,
            reservation_id: Some(reservation_id),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StockLedger {
    lock_timeout: Duration,
}

impl StockLedger {
    pub fn new(lock_timeout: Duration) -> Self {
        Self { lock_timeout }
    }

    /// How long any row lock taken on behalf of the ledger may be waited for
    pub fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }

    /// Debits `qty` from the stock line and returns the new on-hand quantity.
    ///
    /// Fails with `InsufficientStock` carrying the quantity currently on hand
    /// when `qty` exceeds it; the line is left untouched.
    #[instrument(skip(self, conn, movement), fields(added_by = movement.added_by))]
    pub async fn reserve<C>(
        &self,
        conn: &C,
        branch_id: Uuid,
        product_id: Uuid,
        qty: Decimal,
        movement: Movement<'_>,
    ) -> Result<Decimal, ServiceError>
    where
        C: ConnectionTrait,
    {
        let qty = positive(qty)?;
        let line = self.lock_line(conn, branch_id, product_id).await?;
        let available = line
            .as_ref()
            .map(|l| quantize(l.quantity))
            .unwrap_or(Decimal::ZERO);

        let line = match line {
            Some(line) if qty <= available => line,
            _ => {
                debug!(%available, %qty, "Reservation exceeds stock on hand");
                counter!("branch_reservations.stock.insufficient", 1);
                return Err(ServiceError::InsufficientStock { available });
            }
        };

        let new_quantity = quantize(available - qty);
        write_quantity(conn, line, new_quantity).await?;
        record(
            conn,
            product_id,
            Some(branch_id),
            None,
            qty,
            TransactionType::Reservation,
            movement,
        )
        .await?;

        info!(%branch_id, %product_id, %qty, %new_quantity, "Stock reserved");
        Ok(new_quantity)
    }

    /// Returns `qty` to the stock line; a missing line is created. Fails with a
    /// validation error when the result would not fit the stock column.
    #[instrument(skip(self, conn, movement), fields(added_by = movement.added_by))]
    pub async fn release<C>(
        &self,
        conn: &C,
        branch_id: Uuid,
        product_id: Uuid,
        qty: Decimal,
        movement: Movement<'_>,
    ) -> Result<Decimal, ServiceError>
    where
        C: ConnectionTrait,
    {
        let qty = positive(qty)?;
        let line = self.lock_line(conn, branch_id, product_id).await?;

        let new_quantity = match line {
            Some(line) => {
                let new_quantity = quantize(line.quantity)
                    .checked_add(qty)
                    .map(quantize)
                    .ok_or_else(|| {
                        ServiceError::validation("quantity", "released quantity is out of range")
                    })
                    .and_then(ensure_storable)?
                    .max(Decimal::ZERO);
                write_quantity(conn, line, new_quantity).await?;
                new_quantity
            }
            None => {
                insert_or_add(conn, branch_id, product_id, qty).await?;
                self.on_hand(conn, branch_id, product_id).await?
            }
        };

        record(
            conn,
            product_id,
            None,
            Some(branch_id),
            qty,
            TransactionType::Reservation,
            movement,
        )
        .await?;

        info!(%branch_id, %product_id, %qty, %new_quantity, "Stock released");
        Ok(new_quantity)
    }

    /// Overwrites the on-hand quantity with a manual count, creating the line
    /// if needed. The count is logged as a `transfer_in` to the branch.
    #[instrument(skip(self, conn, movement), fields(added_by = movement.added_by))]
    pub async fn set<C>(
        &self,
        conn: &C,
        branch_id: Uuid,
        product_id: Uuid,
        qty: Decimal,
        movement: Movement<'_>,
    ) -> Result<Decimal, ServiceError>
    where
        C: ConnectionTrait,
    {
        let qty = normalize_count(qty)?;
        match self.lock_line(conn, branch_id, product_id).await? {
            Some(line) => write_quantity(conn, line, qty).await?,
            None => insert_or_replace(conn, branch_id, product_id, qty).await?,
        }

        record(
            conn,
            product_id,
            None,
            Some(branch_id),
            qty,
            TransactionType::TransferIn,
            movement,
        )
        .await?;

        info!(%branch_id, %product_id, %qty, "Stock set by count");
        Ok(qty)
    }

    /// Reads the on-hand quantity without locking. Zero when the line does
    /// not exist yet.
    pub async fn on_hand<C>(
        &self,
        conn: &C,
        branch_id: Uuid,
        product_id: Uuid,
    ) -> Result<Decimal, ServiceError>
    where
        C: ConnectionTrait,
    {
        let line = find_line(branch_id, product_id)
            .one(conn)
            .await
            .map_err(ServiceError::db_error)?;
        Ok(line.map(|l| quantize(l.quantity)).unwrap_or_else(|| quantize(Decimal::ZERO)))
    }

    async fn lock_line<C>(
        &self,
        conn: &C,
        branch_id: Uuid,
        product_id: Uuid,
    ) -> Result<Option<stock_line::Model>, ServiceError>
    where
        C: ConnectionTrait,
    {
        set_lock_timeout(conn, self.lock_timeout)
            .await
            .map_err(contention)?;

        if conn.get_database_backend() == DbBackend::Sqlite {
            // SQLite ignores FOR UPDATE. A no-op write takes the database write
            // lock, waiting up to busy_timeout, before the quantity is read.
            stock_line::Entity::update_many()
                .col_expr(
                    stock_line::Column::Quantity,
                    Expr::col(stock_line::Column::Quantity).into(),
                )
                .filter(stock_line::Column::BranchId.eq(branch_id))
                .filter(stock_line::Column::ProductId.eq(product_id))
                .exec(conn)
                .await
                .map_err(contention)?;
        }

        let line = find_line(branch_id, product_id)
            .lock_exclusive()
            .one(conn)
            .await
            .map_err(contention)?;
        Ok(line)
    }
}

fn contention(err: sea_orm::DbErr) -> ServiceError {
    let err = ServiceError::db_error(err);
    if err.is_retryable() {
        counter!("branch_reservations.stock.contention_timeouts", 1);
    }
    err
}

fn find_line(branch_id: Uuid, product_id: Uuid) -> sea_orm::Select<stock_line::Entity> {
    stock_line::Entity::find()
        .filter(stock_line::Column::BranchId.eq(branch_id))
        .filter(stock_line::Column::ProductId.eq(product_id))
}

fn positive(qty: Decimal) -> Result<Decimal, ServiceError> {
    let qty = quantize(qty);
    if qty <= Decimal::ZERO {
        return Err(ServiceError::validation(
            "quantity",
            "quantity must be greater than 0",
        ));
    }
    ensure_storable(qty)
}

async fn write_quantity<C>(
    conn: &C,
    line: stock_line::Model,
    quantity: Decimal,
) -> Result<(), ServiceError>
where
    C: ConnectionTrait,
{
    let mut active: stock_line::ActiveModel = line.into();
    active.quantity = Set(quantity);
    active.update(conn).await.map_err(ServiceError::db_error)?;
    Ok(())
}

fn new_line(branch_id: Uuid, product_id: Uuid, quantity: Decimal) -> stock_line::ActiveModel {
    stock_line::ActiveModel {
        id: Set(Uuid::new_v4()),
        branch_id: Set(branch_id),
        product_id: Set(product_id),
        quantity: Set(quantity),
        updated_at: Set(Utc::now()),
    }
}

/// Creates the line holding `quantity`, or overwrites the quantity of a line
/// inserted concurrently.
async fn insert_or_replace<C>(
    conn: &C,
    branch_id: Uuid,
    product_id: Uuid,
    quantity: Decimal,
) -> Result<(), ServiceError>
where
    C: ConnectionTrait,
{
    stock_line::Entity::insert(new_line(branch_id, product_id, quantity))
        .on_conflict(
            OnConflict::columns([stock_line::Column::BranchId, stock_line::Column::ProductId])
                .update_columns([stock_line::Column::Quantity, stock_line::Column::UpdatedAt])
                .to_owned(),
        )
        .exec_without_returning(conn)
        .await
        .map_err(ServiceError::db_error)?;
    Ok(())
}

/// Creates the line holding `quantity`, or adds `quantity` to a line inserted
/// concurrently.
async fn insert_or_add<C>(
    conn: &C,
    branch_id: Uuid,
    product_id: Uuid,
    quantity: Decimal,
) -> Result<(), ServiceError>
where
    C: ConnectionTrait,
{
    stock_line::Entity::insert(new_line(branch_id, product_id, quantity))
        .on_conflict(
            OnConflict::columns([stock_line::Column::BranchId, stock_line::Column::ProductId])
                .value(
                    stock_line::Column::Quantity,
                    Expr::col((stock_line::Entity, stock_line::Column::Quantity))
                        .add(Expr::cust("excluded.quantity")),
                )
                .update_column(stock_line::Column::UpdatedAt)
                .to_owned(),
        )
        .exec_without_returning(conn)
        .await
        .map_err(ServiceError::db_error)?;
    Ok(())
}

async fn record<C>(
    conn: &C,
    product_id: Uuid,
    from_branch_id: Option<Uuid>,
    to_branch_id: Option<Uuid>,
    quantity: Decimal,
    transaction_type: TransactionType,
    movement: Movement<'_>,
) -> Result<(), ServiceError>
where
    C: ConnectionTrait,
{
    inventory_transaction::ActiveModel {
        product_id: Set(product_id),
        from_branch_id: Set(from_branch_id),
        to_branch_id: Set(to_branch_id),
        quantity: Set(quantity),
        transaction_type: Set(transaction_type),
        reservation_id: Set(movement.reservation_id),
        added_by: Set(movement.added_by.to_string()),
        ..Default::default()
    }
    .insert(conn)
    .await
    .map_err(ServiceError::db_error)?;
    Ok(())
}
