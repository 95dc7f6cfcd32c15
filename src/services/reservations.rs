//! Reservation Lifecycle
//!
//! A reservation holds a debit against one stock line from the moment it is
//! created until it is cancelled. Creation and every status change run in a
//! single transaction together with the matching ledger call; the fan-out
//! event is emitted only after that transaction commits.

use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection,
    DatabaseTransaction, EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::db::{set_lock_timeout, with_transaction};
use crate::entities::product::ProductUnit;
use crate::entities::reservation::{self, DeliveryType, ReservationStatus, StockEffect};
use crate::entities::{branch, customer, product};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender, ReservationSnapshot, StockSnapshot};
use crate::middleware_helpers::Actor;
use crate::quantity::{normalize_for_unit, quantize};
use crate::services::catalog::{load_stock_context, StockContext};
use crate::services::customers::{
    apply_choice, resolve_in, CustomerChoice, CustomerInput, CustomerResolution,
};
use crate::services::stock_ledger::{Movement, StockLedger};

/// What to reserve, before unit normalization
#[derive(Debug, Clone)]
pub struct NewReservation {
    pub product_id: Uuid,
    pub branch_id: Uuid,
    pub quantity: Decimal,
    pub delivery_type: DeliveryType,
}

/// How the customer of a new reservation is determined
#[derive(Debug, Clone)]
enum CustomerSource {
    Lookup(CustomerInput),
    Choice(CustomerChoice),
}

/// Reservation with the labels dashboards display
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct ReservationView {
    pub id: Uuid,
    pub customer_id: Option<Uuid>,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub product_id: Uuid,
    pub product_name: String,
    pub unit: ProductUnit,
    pub branch_id: Uuid,
    pub branch_name: String,
    #[schema(value_type = String, example = "2.00")]
    pub quantity: Decimal,
    pub delivery_type: DeliveryType,
    pub status: ReservationStatus,
    pub created_at: DateTime<Utc>,
    pub reserved_by: String,
    pub decision_at: Option<DateTime<Utc>>,
    pub branch_last_modified_at: Option<DateTime<Utc>>,
    pub branch_last_modified_by: Option<String>,
    pub admin_last_modified_at: Option<DateTime<Utc>>,
    pub admin_last_modified_by: Option<String>,
}

impl ReservationView {
    fn assemble(
        r: reservation::Model,
        customer: Option<&customer::Model>,
        product: Option<&product::Model>,
        branch: Option<&branch::Model>,
    ) -> Self {
        Self {
            id: r.id,
            customer_id: r.customer_id,
            customer_name: customer.map(|c| c.name.clone()),
            customer_phone: customer.and_then(|c| c.phone.clone()),
            product_id: r.product_id,
            product_name: product.map(|p| p.name.clone()).unwrap_or_default(),
            unit: product.map(|p| p.unit).unwrap_or(ProductUnit::Piece),
            branch_id: r.branch_id,
            branch_name: branch.map(|b| b.name.clone()).unwrap_or_default(),
            quantity: quantize(r.quantity),
            delivery_type: r.delivery_type,
            status: r.status,
            created_at: r.created_at,
            reserved_by: r.reserved_by,
            decision_at: r.decision_at,
            branch_last_modified_at: r.branch_last_modified_at,
            branch_last_modified_by: r.branch_last_modified_by,
            admin_last_modified_at: r.admin_last_modified_at,
            admin_last_modified_by: r.admin_last_modified_by,
        }
    }

    pub fn snapshot(&self) -> ReservationSnapshot {
        ReservationSnapshot {
            reservation_id: self.id,
            customer_name: self.customer_name.clone(),
            customer_phone: self.customer_phone.clone(),
            product_name: self.product_name.clone(),
            quantity: self.quantity,
            branch_name: self.branch_name.clone(),
            delivery_type: self.delivery_type,
            status: self.status,
            created_at: self.created_at,
            decision_at: self.decision_at,
            branch_last_modified_at: self.branch_last_modified_at,
            reserved_by: self.reserved_by.clone(),
        }
    }
}

fn stock_snapshot(ctx: &StockContext, quantity: Decimal) -> StockSnapshot {
    StockSnapshot {
        product_id: ctx.product.id,
        product_name: ctx.product.name.clone(),
        category_name: ctx.category_name.clone(),
        branch_id: ctx.branch.id,
        branch_name: ctx.branch.name.clone(),
        unit: ctx.product.unit,
        quantity: quantize(quantity),
    }
}

/// Filters for the reservation list. Dates are inclusive calendar days in
/// UTC; both default to today.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ReservationFilter {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub branch_id: Option<Uuid>,
    pub status: Option<ReservationStatus>,
    /// Matches customer name or phone
    pub search: Option<String>,
    pub limit: Option<u64>,
}

const DEFAULT_LIST_LIMIT: u64 = 200;

fn day_bounds(from: NaiveDate, to: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = from.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc();
    let end = (to + ChronoDuration::days(1))
        .and_hms_opt(0, 0, 0)
        .unwrap_or_default()
        .and_utc();
    (start, end)
}

#[derive(Clone)]
pub struct ReservationService {
    db: Arc<DatabaseConnection>,
    ledger: StockLedger,
    events: EventSender,
}

impl ReservationService {
    pub fn new(db: Arc<DatabaseConnection>, ledger: StockLedger, events: EventSender) -> Self {
        Self { db, ledger, events }
    }

    /// Creates a pending reservation, resolving the customer from the
    /// supplied name and phone.
    ///
    /// A phone that matches a differently named customer, or several
    /// customers, fails with `CustomerConflict` and nothing is written.
    #[instrument(skip(self, input, customer, actor), fields(product_id = %input.product_id, branch_id = %input.branch_id, actor = %actor.username))]
    pub async fn create_reservation(
        &self,
        input: NewReservation,
        customer: CustomerInput,
        actor: &Actor,
    ) -> Result<ReservationView, ServiceError> {
        self.create_with(input, CustomerSource::Lookup(customer), actor)
            .await
    }

    /// Creates a pending reservation for the customer the operator picked
    /// after a conflict.
    #[instrument(skip(self, input, choice, actor), fields(product_id = %input.product_id, branch_id = %input.branch_id, actor = %actor.username))]
    pub async fn resolve_conflict(
        &self,
        input: NewReservation,
        choice: CustomerChoice,
        actor: &Actor,
    ) -> Result<ReservationView, ServiceError> {
        self.create_with(input, CustomerSource::Choice(choice), actor)
            .await
    }

    async fn create_with(
        &self,
        input: NewReservation,
        source: CustomerSource,
        actor: &Actor,
    ) -> Result<ReservationView, ServiceError> {
        let ledger = self.ledger.clone();
        let actor = actor.clone();

        let (view, stock) = with_transaction(&self.db, move |txn| {
            Box::pin(async move { create_in(txn, &ledger, input, source, &actor).await })
        })
        .await
        .map_err(|e| {
            if let ServiceError::CustomerConflict(conflict) = &e {
                info!(
                    phone = %conflict.supplied_phone,
                    candidates = conflict.candidates.len(),
                    "Reservation needs a customer decision"
                );
            }
            e
        })?;

        counter!("branch_reservations.reservations.created", 1);
        info!(
            reservation_id = %view.id,
            quantity = %view.quantity,
            remaining = %stock.quantity,
            "Reservation created"
        );

        self.events.publish(Event::ReservationCreated {
            reservation: view.snapshot(),
            stock,
        });
        Ok(view)
    }

    /// Moves a reservation to `target`, applying the stock effect of the
    /// transition.
    ///
    /// Re-confirming a cancelled reservation debits stock again and may fail
    /// with `InsufficientStock`; the reservation then stays cancelled.
    #[instrument(skip(self, actor), fields(actor = %actor.username, admin = actor.is_admin))]
    pub async fn transition_status(
        &self,
        reservation_id: Uuid,
        target: ReservationStatus,
        actor: &Actor,
    ) -> Result<ReservationView, ServiceError> {
        let ledger = self.ledger.clone();
        let actor = actor.clone();

        let (view, from, stock) = with_transaction(&self.db, move |txn| {
            Box::pin(async move { transition_in(txn, &ledger, reservation_id, target, &actor).await })
        })
        .await?;

        counter!(
            "branch_reservations.reservations.transitions",
            1,
            "status" => target.to_string()
        );
        info!(%reservation_id, %from, to = %target, "Reservation status changed");

        self.events.publish(Event::ReservationStatusChanged {
            reservation: view.snapshot(),
            stock,
        });
        Ok(view)
    }

    pub async fn get(&self, reservation_id: Uuid) -> Result<ReservationView, ServiceError> {
        let row = reservation::Entity::find_by_id(reservation_id)
            .find_also_related(customer::Entity)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Reservation {} not found", reservation_id))
            })?;

        let mut views = with_labels(&*self.db, vec![row]).await?;
        views
            .pop()
            .ok_or_else(|| ServiceError::InternalError("reservation vanished".to_string()))
    }

    /// Newest first.
    #[instrument(skip(self))]
    pub async fn list(&self, filter: ReservationFilter) -> Result<Vec<ReservationView>, ServiceError> {
        let today = Utc::now().date_naive();
        let from = filter.from.unwrap_or(today);
        let to = filter.to.unwrap_or(today);
        if to < from {
            return Err(ServiceError::validation("to", "end date is before start date"));
        }
        let (start, end) = day_bounds(from, to);

        let mut query = reservation::Entity::find()
            .find_also_related(customer::Entity)
            .filter(reservation::Column::CreatedAt.gte(start))
            .filter(reservation::Column::CreatedAt.lt(end));

        if let Some(branch_id) = filter.branch_id {
            query = query.filter(reservation::Column::BranchId.eq(branch_id));
        }
        if let Some(status) = filter.status {
            query = query.filter(reservation::Column::Status.eq(status));
        }
        if let Some(term) = filter.search.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            query = query.filter(
                Condition::any()
                    .add(customer::Column::Name.contains(term))
                    .add(customer::Column::Phone.contains(term)),
            );
        }

        let rows = query
            .order_by_desc(reservation::Column::CreatedAt)
            .limit(filter.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, 1000))
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;

        with_labels(&*self.db, rows).await
    }
}

async fn create_in(
    txn: &DatabaseTransaction,
    ledger: &StockLedger,
    input: NewReservation,
    source: CustomerSource,
    actor: &Actor,
) -> Result<(ReservationView, StockSnapshot), ServiceError> {
    let ctx = load_stock_context(txn, input.branch_id, input.product_id).await?;
    if !ctx.product.is_available {
        return Err(ServiceError::validation(
            "product_id",
            format!("{} is not available for reservation", ctx.product.name),
        ));
    }
    let quantity = normalize_for_unit(input.quantity, ctx.product.unit)?;

    let customer = match source {
        CustomerSource::Lookup(details) => match resolve_in(txn, &details).await? {
            CustomerResolution::Resolved { customer, .. } => customer,
            CustomerResolution::Conflict(conflict) => {
                return Err(ServiceError::CustomerConflict(Box::new(conflict)))
            }
        },
        CustomerSource::Choice(choice) => Some(apply_choice(txn, &choice).await?),
    };

    let reservation_id = Uuid::new_v4();
    let remaining = ledger
        .reserve(
            txn,
            input.branch_id,
            input.product_id,
            quantity,
            Movement::for_reservation(&actor.username, reservation_id),
        )
        .await?;

    let created = reservation::ActiveModel {
        id: Set(reservation_id),
        customer_id: Set(customer.as_ref().map(|c| c.id)),
        product_id: Set(input.product_id),
        branch_id: Set(input.branch_id),
        quantity: Set(quantity),
        delivery_type: Set(input.delivery_type),
        status: Set(ReservationStatus::Pending),
        reserved_by: Set(actor.username.clone()),
        ..Default::default()
    }
    .insert(txn)
    .await
    .map_err(ServiceError::db_error)?;

    let view = ReservationView::assemble(
        created,
        customer.as_ref(),
        Some(&ctx.product),
        Some(&ctx.branch),
    );
    Ok((view, stock_snapshot(&ctx, remaining)))
}

async fn transition_in(
    txn: &DatabaseTransaction,
    ledger: &StockLedger,
    reservation_id: Uuid,
    target: ReservationStatus,
    actor: &Actor,
) -> Result<(ReservationView, ReservationStatus, Option<StockSnapshot>), ServiceError> {
    set_lock_timeout(txn, ledger.lock_timeout())
        .await
        .map_err(ServiceError::db_error)?;

    // Locking the reservation keeps two concurrent cancels from releasing twice
    let current = reservation::Entity::find_by_id(reservation_id)
        .lock_exclusive()
        .one(txn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::NotFound(format!("Reservation {} not found", reservation_id)))?;

    let from = current.status;
    let effect = from
        .transition_to(target)
        .ok_or(ServiceError::InvalidTransition { from, to: target })?;

    let ctx = load_stock_context(txn, current.branch_id, current.product_id).await?;
    let quantity = quantize(current.quantity);
    let movement = Movement::for_reservation(&actor.username, reservation_id);

    let stock = match effect {
        StockEffect::None => None,
        StockEffect::Reserve => Some(
            ledger
                .reserve(txn, current.branch_id, current.product_id, quantity, movement)
                .await
                .map_err(|e| {
                    if let ServiceError::InsufficientStock { available } = &e {
                        warn!(%reservation_id, %available, "Re-confirmation rejected, stock no longer available");
                    }
                    e
                })?,
        ),
        StockEffect::Release => Some(
            ledger
                .release(txn, current.branch_id, current.product_id, quantity, movement)
                .await?,
        ),
    };

    let now = Utc::now();
    let customer_id = current.customer_id;
    let decided = current.decision_at.is_some();
    let mut active: reservation::ActiveModel = current.into();
    active.status = Set(target);
    if !decided {
        active.decision_at = Set(Some(now));
    }
    if actor.is_admin {
        active.admin_last_modified_at = Set(Some(now));
        active.admin_last_modified_by = Set(Some(actor.username.clone()));
    } else {
        active.branch_last_modified_at = Set(Some(now));
        active.branch_last_modified_by = Set(Some(actor.username.clone()));
    }
    let updated = active.update(txn).await.map_err(ServiceError::db_error)?;

    let customer = match customer_id {
        Some(id) => customer::Entity::find_by_id(id)
            .one(txn)
            .await
            .map_err(ServiceError::db_error)?,
        None => None,
    };

    let view = ReservationView::assemble(
        updated,
        customer.as_ref(),
        Some(&ctx.product),
        Some(&ctx.branch),
    );
    Ok((view, from, stock.map(|q| stock_snapshot(&ctx, q))))
}

/// Attaches product and branch labels with one query per table.
async fn with_labels<C>(
    conn: &C,
    rows: Vec<(reservation::Model, Option<customer::Model>)>,
) -> Result<Vec<ReservationView>, ServiceError>
where
    C: ConnectionTrait,
{
    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let product_ids: Vec<Uuid> = rows.iter().map(|(r, _)| r.product_id).collect();
    let branch_ids: Vec<Uuid> = rows.iter().map(|(r, _)| r.branch_id).collect();

    let products: HashMap<Uuid, product::Model> = product::Entity::find()
        .filter(product::Column::Id.is_in(product_ids))
        .all(conn)
        .await
        .map_err(ServiceError::db_error)?
        .into_iter()
        .map(|p| (p.id, p))
        .collect();
    let branches: HashMap<Uuid, branch::Model> = branch::Entity::find()
        .filter(branch::Column::Id.is_in(branch_ids))
        .all(conn)
        .await
        .map_err(ServiceError::db_error)?
        .into_iter()
        .map(|b| (b.id, b))
        .collect();

    Ok(rows
        .into_iter()
        .map(|(r, c)| {
            let product = products.get(&r.product_id);
            let branch = branches.get(&r.branch_id);
            ReservationView::assemble(r, c.as_ref(), product, branch)
        })
        .collect())
}
