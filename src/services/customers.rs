//! Customer resolution by phone number.
//!
//! Phones are not unique, so a phone alone never picks a customer when the
//! supplied name disagrees with what is on file. Ambiguity is handed back to
//! the operator as a [`CustomerConflict`] and settled with an explicit
//! [`CustomerChoice`].

use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, EntityTrait,
    QueryFilter, QueryOrder, QuerySelect, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::entities::customer;
use crate::errors::ServiceError;

/// Name stored when a customer is created from a phone number alone.
pub const PLACEHOLDER_NAME: &str = "Walk-in customer";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct CustomerView {
    pub id: Uuid,
    pub name: String,
    pub phone: Option<String>,
    pub address: Option<String>,
}

impl From<customer::Model> for CustomerView {
    fn from(model: customer::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            phone: model.phone,
            address: model.address,
        }
    }
}

/// The phone matched customers that cannot be reused automatically.
#[derive(Debug, Clone, Serialize, PartialEq, Eq, ToSchema)]
pub struct CustomerConflict {
    pub supplied_name: Option<String>,
    pub supplied_phone: String,
    pub candidates: Vec<CustomerView>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CustomerResolution {
    /// `customer` is `None` for a walk-in reservation with no contact details.
    Resolved {
        customer: Option<customer::Model>,
        created: bool,
    },
    Conflict(CustomerConflict),
}

/// Operator decision that settles a [`CustomerConflict`].
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(tag = "choice", rename_all = "snake_case")]
pub enum CustomerChoice {
    UseExisting {
        customer_id: Uuid,
    },
    CreateNew {
        name: String,
        phone: Option<String>,
        address: Option<String>,
    },
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct NewCustomer {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(length(max = 32))]
    pub phone: Option<String>,
    #[validate(length(max = 255))]
    pub address: Option<String>,
}

/// Free-text contact details as typed by the operator
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct CustomerInput {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

fn clean(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Case-insensitive comparison that ignores surrounding and repeated
/// whitespace.
pub fn same_name(a: &str, b: &str) -> bool {
    fn fold(s: &str) -> String {
        s.split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase()
    }
    fold(a) == fold(b)
}

async fn insert_customer<C>(
    conn: &C,
    name: String,
    phone: Option<String>,
    address: Option<String>,
) -> Result<customer::Model, ServiceError>
where
    C: ConnectionTrait,
{
    let created = customer::ActiveModel {
        name: Set(name),
        phone: Set(phone),
        address: Set(address),
        ..Default::default()
    }
    .insert(conn)
    .await
    .map_err(ServiceError::db_error)?;

    info!(customer_id = %created.id, "Customer created");
    Ok(created)
}

async fn find_by_phone<C>(conn: &C, phone: &str) -> Result<Vec<customer::Model>, ServiceError>
where
    C: ConnectionTrait,
{
    customer::Entity::find()
        .filter(customer::Column::Phone.eq(phone))
        .order_by_asc(customer::Column::CreatedAt)
        .all(conn)
        .await
        .map_err(ServiceError::db_error)
}

/// Decides which customer a reservation belongs to.
///
/// Runs on the caller's connection so a customer created here rolls back
/// with the reservation that needed it.
#[instrument(skip(conn, input))]
pub async fn resolve_in<C>(
    conn: &C,
    input: &CustomerInput,
) -> Result<CustomerResolution, ServiceError>
where
    C: ConnectionTrait,
{
    let name = clean(input.name.as_deref());
    let phone = clean(input.phone.as_deref());
    let address = clean(input.address.as_deref());

    let (name, phone) = match (name, phone) {
        (None, None) => {
            return Ok(CustomerResolution::Resolved {
                customer: None,
                created: false,
            })
        }
        (Some(name), None) => {
            let customer = insert_customer(conn, name, None, address).await?;
            return Ok(CustomerResolution::Resolved {
                customer: Some(customer),
                created: true,
            });
        }
        (name, Some(phone)) => (name, phone),
    };

    let mut matches = find_by_phone(conn, &phone).await?;
    debug!(matches = matches.len(), "Phone lookup");

    match matches.len() {
        0 => {
            let name = name.unwrap_or_else(|| PLACEHOLDER_NAME.to_string());
            let customer = insert_customer(conn, name, Some(phone), address).await?;
            Ok(CustomerResolution::Resolved {
                customer: Some(customer),
                created: true,
            })
        }
        1 if name.as_deref().map_or(true, |n| same_name(n, &matches[0].name)) => {
            Ok(CustomerResolution::Resolved {
                customer: matches.pop(),
                created: false,
            })
        }
        _ => Ok(CustomerResolution::Conflict(CustomerConflict {
            supplied_name: name,
            supplied_phone: phone,
            candidates: matches.into_iter().map(CustomerView::from).collect(),
        })),
    }
}

/// Applies an operator's explicit choice. `CreateNew` always inserts, even
/// when the phone is already on file.
pub async fn apply_choice<C>(conn: &C, choice: &CustomerChoice) -> Result<customer::Model, ServiceError>
where
    C: ConnectionTrait,
{
    match choice {
        CustomerChoice::UseExisting { customer_id } => customer::Entity::find_by_id(*customer_id)
            .one(conn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Customer {} not found", customer_id))),
        CustomerChoice::CreateNew {
            name,
            phone,
            address,
        } => {
            let name = clean(Some(name.as_str()))
                .ok_or_else(|| ServiceError::validation("name", "customer name is required"))?;
            insert_customer(
                conn,
                name,
                clean(phone.as_deref()),
                clean(address.as_deref()),
            )
            .await
        }
    }
}

/// Customer management outside the reservation flow
#[derive(Clone)]
pub struct CustomerService {
    db: Arc<DatabaseConnection>,
}

impl CustomerService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Creates a customer explicitly. Sharing a phone with others is allowed.
    #[instrument(skip(self, input))]
    pub async fn create(&self, input: NewCustomer) -> Result<CustomerView, ServiceError> {
        input.validate()?;
        let name = clean(Some(input.name.as_str()))
            .ok_or_else(|| ServiceError::validation("name", "customer name is required"))?;
        let created = insert_customer(
            &*self.db,
            name,
            clean(input.phone.as_deref()),
            clean(input.address.as_deref()),
        )
        .await?;
        Ok(created.into())
    }

    pub async fn get(&self, id: Uuid) -> Result<CustomerView, ServiceError> {
        customer::Entity::find_by_id(id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .map(CustomerView::from)
            .ok_or_else(|| ServiceError::NotFound(format!("Customer {} not found", id)))
    }

    /// All customers registered under exactly this phone number
    pub async fn lookup_by_phone(&self, phone: &str) -> Result<Vec<CustomerView>, ServiceError> {
        let phone = clean(Some(phone))
            .ok_or_else(|| ServiceError::validation("phone", "phone is required"))?;
        Ok(find_by_phone(&*self.db, &phone)
            .await?
            .into_iter()
            .map(CustomerView::from)
            .collect())
    }

    /// Name or phone contains `term`; newest first.
    #[instrument(skip(self))]
    pub async fn search(&self, term: Option<&str>, limit: u64) -> Result<Vec<CustomerView>, ServiceError> {
        let mut query = customer::Entity::find();
        if let Some(term) = clean(term) {
            query = query.filter(
                Condition::any()
                    .add(customer::Column::Name.contains(&term))
                    .add(customer::Column::Phone.contains(&term)),
            );
        }
        let rows = query
            .order_by_desc(customer::Column::CreatedAt)
            .limit(limit.clamp(1, 500))
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;
        Ok(rows.into_iter().map(CustomerView::from).collect())
    }
}
