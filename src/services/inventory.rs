use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, QuerySelect,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::db::with_transaction;
use crate::entities::inventory_transaction::{self, TransactionType};
use crate::entities::product::ProductUnit;
use crate::entities::{category, product, stock_line};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender, StockSnapshot};
use crate::middleware_helpers::Actor;
use crate::quantity::quantize;
use crate::services::catalog::load_stock_context;
use crate::services::stock_ledger::{Movement, StockLedger};

/// One row of a branch's stock grid
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct StockLineView {
    pub product_id: Uuid,
    pub product_name: String,
    pub category_name: Option<String>,
    pub unit: ProductUnit,
    pub is_available: bool,
    #[schema(value_type = String, example = "18.00")]
    pub quantity: Decimal,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct InventoryTransactionView {
    pub id: Uuid,
    pub product_id: Uuid,
    pub from_branch_id: Option<Uuid>,
    pub to_branch_id: Option<Uuid>,
    #[schema(value_type = String)]
    pub quantity: Decimal,
    pub transaction_type: TransactionType,
    pub reservation_id: Option<Uuid>,
    pub added_by: String,
    pub created_at: DateTime<Utc>,
}

impl From<inventory_transaction::Model> for InventoryTransactionView {
    fn from(m: inventory_transaction::Model) -> Self {
        Self {
            id: m.id,
            product_id: m.product_id,
            from_branch_id: m.from_branch_id,
            to_branch_id: m.to_branch_id,
            quantity: quantize(m.quantity),
            transaction_type: m.transaction_type,
            reservation_id: m.reservation_id,
            added_by: m.added_by,
            created_at: m.created_at,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TransactionFilter {
    /// Movements into or out of this branch
    pub branch_id: Option<Uuid>,
    pub product_id: Option<Uuid>,
    pub transaction_type: Option<TransactionType>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<u64>,
}

/// Manual stock counts and the read side of the ledger
#[derive(Clone)]
pub struct InventoryService {
    db: Arc<DatabaseConnection>,
    ledger: StockLedger,
    events: EventSender,
}

impl InventoryService {
    pub fn new(db: Arc<DatabaseConnection>, ledger: StockLedger, events: EventSender) -> Self {
        Self { db, ledger, events }
    }

    /// Overwrites a branch's on-hand quantity with a counted value and pushes
    /// the new figure to the call-center grid.
    #[instrument(skip(self, actor), fields(actor = %actor.username))]
    pub async fn set_stock(
        &self,
        branch_id: Uuid,
        product_id: Uuid,
        quantity: Decimal,
        actor: &Actor,
    ) -> Result<StockSnapshot, ServiceError> {
        let ledger = self.ledger.clone();
        let username = actor.username.clone();

        let snapshot = with_transaction(&self.db, move |txn| {
            Box::pin(async move {
                let ctx = load_stock_context(txn, branch_id, product_id).await?;
                let counted = ledger
                    .set(txn, branch_id, product_id, quantity, Movement::manual(&username))
                    .await?;
                Ok(StockSnapshot {
                    product_id,
                    product_name: ctx.product.name,
                    category_name: ctx.category_name,
                    branch_id,
                    branch_name: ctx.branch.name,
                    unit: ctx.product.unit,
                    quantity: counted,
                })
            })
        })
        .await?;

        info!(%branch_id, %product_id, quantity = %snapshot.quantity, "Stock count recorded");
        self.events.publish(Event::StockSet(snapshot.clone()));
        Ok(snapshot)
    }

    /// Every stock line of a branch, ordered by product name.
    pub async fn list_stock(&self, branch_id: Uuid) -> Result<Vec<StockLineView>, ServiceError> {
        let rows = stock_line::Entity::find()
            .find_also_related(product::Entity)
            .filter(stock_line::Column::BranchId.eq(branch_id))
            .order_by_asc(product::Column::Name)
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;

        let categories: std::collections::HashMap<Uuid, String> = category::Entity::find()
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .into_iter()
            .map(|c| (c.id, c.name))
            .collect();

        Ok(rows
            .into_iter()
            .filter_map(|(line, product)| {
                let product = product?;
                Some(StockLineView {
                    product_id: product.id,
                    category_name: categories.get(&product.category_id).cloned(),
                    product_name: product.name,
                    unit: product.unit,
                    is_available: product.is_available,
                    quantity: quantize(line.quantity),
                    updated_at: line.updated_at,
                })
            })
            .collect())
    }

    /// Audit log, newest first.
    #[instrument(skip(self))]
    pub async fn list_transactions(
        &self,
        filter: TransactionFilter,
    ) -> Result<Vec<InventoryTransactionView>, ServiceError> {
        let mut query = inventory_transaction::Entity::find();

        if let Some(branch_id) = filter.branch_id {
            query = query.filter(
                Condition::any()
                    .add(inventory_transaction::Column::FromBranchId.eq(branch_id))
                    .add(inventory_transaction::Column::ToBranchId.eq(branch_id)),
            );
        }
        if let Some(product_id) = filter.product_id {
            query = query.filter(inventory_transaction::Column::ProductId.eq(product_id));
        }
        if let Some(kind) = filter.transaction_type {
            query = query.filter(inventory_transaction::Column::TransactionType.eq(kind));
        }
        if let Some(since) = filter.since {
            query = query.filter(inventory_transaction::Column::CreatedAt.gte(since));
        }
        if let Some(until) = filter.until {
            query = query.filter(inventory_transaction::Column::CreatedAt.lt(until));
        }

        let rows = query
            .order_by_desc(inventory_transaction::Column::CreatedAt)
            .limit(filter.limit.unwrap_or(200).clamp(1, 1000))
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;

        Ok(rows.into_iter().map(InventoryTransactionView::from).collect())
    }
}
