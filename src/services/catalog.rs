use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::entities::product::ProductUnit;
use crate::entities::{branch, category, product};
use crate::errors::ServiceError;

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct NewBranch {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    pub address: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct NewProduct {
    pub category_id: Uuid,
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    pub price: Decimal,
    pub unit: ProductUnit,
    #[serde(default = "default_available")]
    pub is_available: bool,
}

fn default_available() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProductView {
    pub id: Uuid,
    pub name: String,
    pub category_id: Uuid,
    pub category_name: Option<String>,
    pub price: Decimal,
    pub unit: ProductUnit,
    pub is_available: bool,
}

/// Product, its category label and the branch a stock operation touches.
#[derive(Debug, Clone)]
pub struct StockContext {
    pub product: product::Model,
    pub category_name: String,
    pub branch: branch::Model,
}

/// Loads the labels a stock or reservation operation needs, failing with
/// `NotFound` when either side does not exist.
pub async fn load_stock_context<C>(
    conn: &C,
    branch_id: Uuid,
    product_id: Uuid,
) -> Result<StockContext, ServiceError>
where
    C: ConnectionTrait,
{
    let (product, category) = product::Entity::find_by_id(product_id)
        .find_also_related(category::Entity)
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;

    let branch = branch::Entity::find_by_id(branch_id)
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::NotFound(format!("Branch {} not found", branch_id)))?;

    Ok(StockContext {
        product,
        category_name: category.map(|c| c.name).unwrap_or_default(),
        branch,
    })
}

/// Reference data used by the reservation core. Full catalog management
/// lives elsewhere; this covers seeding and read access.
#[derive(Clone)]
pub struct CatalogService {
    db: Arc<DatabaseConnection>,
}

impl CatalogService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_branch(&self, input: NewBranch) -> Result<branch::Model, ServiceError> {
        input.validate()?;
        let branch = branch::ActiveModel {
            name: Set(input.name.trim().to_string()),
            address: Set(input.address),
            phone: Set(input.phone),
            ..Default::default()
        }
        .insert(&*self.db)
        .await
        .map_err(ServiceError::db_error)?;

        info!(branch_id = %branch.id, "Branch created");
        Ok(branch)
    }

    #[instrument(skip(self))]
    pub async fn create_category(&self, name: &str) -> Result<category::Model, ServiceError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ServiceError::validation("name", "category name is required"));
        }
        let category = category::ActiveModel {
            name: Set(name.to_string()),
            ..Default::default()
        }
        .insert(&*self.db)
        .await
        .map_err(ServiceError::db_error)?;
        Ok(category)
    }

    #[instrument(skip(self, input), fields(name = %input.name, unit = %input.unit))]
    pub async fn create_product(&self, input: NewProduct) -> Result<product::Model, ServiceError> {
        input.validate()?;
        if input.price < Decimal::ZERO {
            return Err(ServiceError::validation("price", "price cannot be negative"));
        }
        category::Entity::find_by_id(input.category_id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Category {} not found", input.category_id))
            })?;

        let product = product::ActiveModel {
            category_id: Set(input.category_id),
            name: Set(input.name.trim().to_string()),
            price: Set(input.price),
            unit: Set(input.unit),
            is_available: Set(input.is_available),
            ..Default::default()
        }
        .insert(&*self.db)
        .await
        .map_err(ServiceError::db_error)?;

        info!(product_id = %product.id, "Product created");
        Ok(product)
    }

    pub async fn list_branches(&self) -> Result<Vec<branch::Model>, ServiceError> {
        branch::Entity::find()
            .order_by_asc(branch::Column::Name)
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)
    }

    /// Lists products, optionally only those that can currently be reserved.
    pub async fn list_products(&self, available_only: bool) -> Result<Vec<ProductView>, ServiceError> {
        let mut query = product::Entity::find().find_also_related(category::Entity);
        if available_only {
            query = query.filter(product::Column::IsAvailable.eq(true));
        }
        let rows = query
            .order_by_asc(product::Column::Name)
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;

        Ok(rows
            .into_iter()
            .map(|(p, c)| ProductView {
                id: p.id,
                name: p.name,
                category_id: p.category_id,
                category_name: c.map(|c| c.name),
                price: p.price,
                unit: p.unit,
                is_available: p.is_available,
            })
            .collect())
    }
}
