/*!
 * Transaction helper
 *
 * Runs a closure inside a database transaction: commit on `Ok`, rollback on
 * `Err`. The closure's own error type comes back unchanged so typed business
 * errors (insufficient stock, invalid transition) survive the rollback.
 */

use metrics::{counter, histogram};
use sea_orm::{DatabaseConnection, DatabaseTransaction, TransactionError, TransactionTrait};
use std::future::Future;
use std::pin::Pin;
use tracing::{debug, warn};

use crate::errors::ServiceError;

/// Type alias for boxed future used in transactions
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Execute a function within a database transaction
///
/// ```rust,ignore
/// let line = with_transaction(&db, |txn| {
///     Box::pin(async move {
///         let line = ledger.reserve(txn, branch_id, product_id, qty, &ctx).await?;
///         reservation.insert(txn).await?;
///         Ok(line)
///     })
/// })
/// .await?;
/// ```
pub async fn with_transaction<F, T>(db: &DatabaseConnection, f: F) -> Result<T, ServiceError>
where
    F: for<'a> FnOnce(&'a DatabaseTransaction) -> BoxFuture<'a, Result<T, ServiceError>> + Send,
    T: Send,
{
    let start = std::time::Instant::now();
    counter!("branch_reservations.db.transaction.started", 1);

    let result = db.transaction::<_, T, ServiceError>(f).await;

    histogram!("branch_reservations.db.transaction.duration", start.elapsed());

    match result {
        Ok(value) => {
            counter!("branch_reservations.db.transaction.committed", 1);
            debug!("Transaction committed in {:?}", start.elapsed());
            Ok(value)
        }
        Err(TransactionError::Connection(e)) => {
            counter!("branch_reservations.db.transaction.rolled_back", 1);
            warn!(error = %e, "Transaction failed at the connection level");
            Err(ServiceError::db_error(e))
        }
        Err(TransactionError::Transaction(e)) => {
            counter!("branch_reservations.db.transaction.rolled_back", 1);
            debug!(error = %e, "Transaction rolled back");
            Err(e)
        }
    }
}
