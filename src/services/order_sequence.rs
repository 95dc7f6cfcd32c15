//! Daily-request order numbers.
//!
//! A single counter row shared by every application instance. Advancing it
//! is one `UPDATE ... SET last_number = last_number + 1`, so the database
//! serializes concurrent callers and no number is handed out twice.

use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
    Set,
};
use std::sync::Arc;
use tracing::{info, instrument};

use crate::db::with_transaction;
use crate::entities::order_counter;
use crate::errors::ServiceError;
use crate::events::{ControlAction, Event, EventSender};

const COUNTER_ID: i32 = 1;

#[derive(Clone)]
pub struct OrderSequence {
    db: Arc<DatabaseConnection>,
    events: EventSender,
}

impl OrderSequence {
    pub fn new(db: Arc<DatabaseConnection>, events: EventSender) -> Self {
        Self { db, events }
    }

    /// Hands out the next order number, starting at 1.
    #[instrument(skip(self))]
    pub async fn next_order_number(&self) -> Result<i64, ServiceError> {
        let number = with_transaction(&self.db, |txn| {
            Box::pin(async move {
                let updated = order_counter::Entity::update_many()
                    .col_expr(
                        order_counter::Column::LastNumber,
                        Expr::col(order_counter::Column::LastNumber).add(1),
                    )
                    .col_expr(order_counter::Column::UpdatedAt, Expr::value(Utc::now()))
                    .filter(order_counter::Column::Id.eq(COUNTER_ID))
                    .exec(txn)
                    .await
                    .map_err(ServiceError::db_error)?;

                if updated.rows_affected == 0 {
                    // Counter row missing; the first caller creates it
                    order_counter::ActiveModel {
                        id: Set(COUNTER_ID),
                        last_number: Set(1),
                        updated_at: Set(Utc::now()),
                    }
                    .insert(txn)
                    .await
                    .map_err(ServiceError::db_error)?;
                    return Ok(1);
                }

                let counter = order_counter::Entity::find_by_id(COUNTER_ID)
                    .one(txn)
                    .await
                    .map_err(ServiceError::db_error)?
                    .ok_or_else(|| {
                        ServiceError::InternalError("order counter row missing".to_string())
                    })?;
                Ok(counter.last_number)
            })
        })
        .await?;

        info!(order_number = number, "Order number issued");
        Ok(number)
    }

    /// Last number handed out, 0 before the first one.
    pub async fn current(&self) -> Result<i64, ServiceError> {
        Ok(order_counter::Entity::find_by_id(COUNTER_ID)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .map(|c| c.last_number)
            .unwrap_or(0))
    }

    /// Tells the control room about an issued order number.
    #[instrument(skip(self))]
    pub async fn announce(
        &self,
        order_number: i64,
        action: ControlAction,
        branch_name: Option<String>,
    ) -> Result<(), ServiceError> {
        let issued = self.current().await?;
        if order_number < 1 || order_number > issued {
            return Err(ServiceError::NotFound(format!(
                "Order number {} has not been issued",
                order_number
            )));
        }

        self.events.publish(Event::OrderAnnounced {
            action,
            order_number,
            branch_name,
        });
        info!(order_number, %action, "Order announced");
        Ok(())
    }
}
