use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveModelBehavior, ActiveValue, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status of a customer reservation.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
    strum::Display,
    strum::EnumString,
    utoipa::ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ReservationStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "confirmed")]
    Confirmed,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

/// Stock movement implied by moving a reservation between two statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockEffect {
    None,
    Reserve,
    Release,
}

impl ReservationStatus {
    /// Returns the stock effect of `self -> target`, or `None` when the
    /// transition is not allowed.
    ///
    /// Confirmed and cancelled may flip back and forth; nothing returns to
    /// pending and a status never transitions to itself.
    pub fn transition_to(self, target: ReservationStatus) -> Option<StockEffect> {
        use ReservationStatus::*;
        match (self, target) {
            (Pending, Confirmed) => Some(StockEffect::None),
            (Pending, Cancelled) => Some(StockEffect::Release),
            (Cancelled, Confirmed) => Some(StockEffect::Reserve),
            (Confirmed, Cancelled) => Some(StockEffect::Release),
            _ => None,
        }
    }

    /// Whether the reservation currently holds a debit against stock.
    pub fn holds_stock(self) -> bool {
        !matches!(self, ReservationStatus::Cancelled)
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
    strum::Display,
    utoipa::ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DeliveryType {
    #[sea_orm(string_value = "pickup")]
    Pickup,
    #[sea_orm(string_value = "delivery")]
    Delivery,
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "reservations")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(nullable)]
    pub customer_id: Option<Uuid>,
    pub product_id: Uuid,
    pub branch_id: Uuid,
    #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
    pub quantity: Decimal,
    pub delivery_type: DeliveryType,
    pub status: ReservationStatus,
    pub created_at: DateTime<Utc>,
    pub reserved_by: String,
    /// First decision away from pending. Never overwritten.
    #[sea_orm(nullable)]
    pub decision_at: Option<DateTime<Utc>>,
    #[sea_orm(nullable)]
    pub branch_last_modified_at: Option<DateTime<Utc>>,
    #[sea_orm(nullable)]
    pub branch_last_modified_by: Option<String>,
    #[sea_orm(nullable)]
    pub admin_last_modified_at: Option<DateTime<Utc>>,
    #[sea_orm(nullable)]
    pub admin_last_modified_by: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::customer::Entity",
        from = "Column::CustomerId",
        to = "super::customer::Column::Id"
    )]
    Customer,
}

impl Related<super::customer::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Customer.def()
    }
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;
        if insert {
            if let ActiveValue::NotSet = active_model.id {
                active_model.id = Set(Uuid::new_v4());
            }
            if let ActiveValue::NotSet = active_model.status {
                active_model.status = Set(ReservationStatus::Pending);
            }
            active_model.created_at = Set(Utc::now());
        }
        Ok(active_model)
    }
}
