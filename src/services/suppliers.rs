use crate::{
    common::empty_string_as_none,
    db::DbPool,
    entities::{
        supplier,
        supplier_product::{self, AvailabilityStatus},
    },
    errors::ServiceError,
    listing::{FieldValue, Listable},
    money::Currency,
    services::sequences::{self, next_value, retry_on_conflict, MAX_ALLOCATION_ATTEMPTS},
};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, instrument};
use validator::Validate;

/// Body of supplier create and update requests. Updates replace every field.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct SupplierInput {
    #[validate(length(min = 1, message = "Supplier name is required"))]
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub contact_person: Option<String>,
    #[validate(email(message = "Supplier email is not a valid address"))]
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub phone: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub address: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub city: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub country: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub tax_id: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub payment_terms: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct ProductInput {
    #[validate(length(min = 1, message = "Product name is required"))]
    #[serde(default)]
    pub product_name: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub description: Option<String>,
    pub unit_price: Option<Decimal>,
    pub currency: Option<Currency>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub unit_of_measure: Option<String>,
    pub availability_status: Option<AvailabilityStatus>,
}

/// Partial product update; absent fields keep their stored value.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct ProductUpdate {
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub product_name: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub product_code: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub description: Option<String>,
    pub unit_price: Option<Decimal>,
    pub currency: Option<Currency>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub unit_of_measure: Option<String>,
    pub availability_status: Option<AvailabilityStatus>,
}

/// Supplier list row with its catalog size.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupplierRow {
    #[serde(flatten)]
    pub supplier: supplier::Model,
    pub product_count: u64,
}

impl Listable for SupplierRow {
    const RESOURCE: &'static str = "suppliers";
    const FILTERS: &'static [&'static str] = &[];
    const SORT_FIELDS: &'static [&'static str] =
        &["name", "contact_person", "city", "country", "product_count", "created_at"];

    fn search_fields(&self) -> Vec<Option<&str>> {
        let s = &self.supplier;
        vec![
            Some(s.name.as_str()),
            s.contact_person.as_deref(),
            s.email.as_deref(),
            s.city.as_deref(),
            s.tax_id.as_deref(),
        ]
    }

    fn filter_value(&self, _key: &str) -> Option<String> {
        None
    }

    fn sort_value(&self, field: &str) -> Option<FieldValue> {
        let s = &self.supplier;
        match field {
            "name" => Some(s.name.as_str().into()),
            "contact_person" => s.contact_person.as_deref().map(FieldValue::from),
            "city" => s.city.as_deref().map(FieldValue::from),
            "country" => s.country.as_deref().map(FieldValue::from),
            "product_count" => Some(FieldValue::Number(Decimal::from(self.product_count))),
            "created_at" => Some(FieldValue::Date(s.created_at.date_naive())),
            _ => None,
        }
    }
}

/// Catalog product joined with its supplier name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailableProduct {
    #[serde(flatten)]
    pub product: supplier_product::Model,
    pub supplier_name: String,
}

pub fn product_code(supplier_id: i32, seq: i32) -> String {
    format!("PROV{}-PROD{:03}", supplier_id, seq)
}

/// Service for managing suppliers and their catalogs
#[derive(Clone)]
pub struct SupplierService {
    db_pool: Arc<DbPool>,
    default_currency: Currency,
}

impl SupplierService {
    pub fn new(db_pool: Arc<DbPool>, default_currency: Currency) -> Self {
        Self {
            db_pool,
            default_currency,
        }
    }

    /// All suppliers by name, each with its product count
    #[instrument(skip(self))]
    pub async fn list_suppliers(&self) -> Result<Vec<SupplierRow>, ServiceError> {
        let db = &*self.db_pool;
        let suppliers = supplier::Entity::find()
            .order_by_asc(supplier::Column::Name)
            .all(db)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to list suppliers");
                ServiceError::DatabaseError(e)
            })?;

        let counts: HashMap<i32, i64> = supplier_product::Entity::find()
            .select_only()
            .column(supplier_product::Column::SupplierId)
            .column_as(Expr::col(supplier_product::Column::Id).count(), "product_count")
            .group_by(supplier_product::Column::SupplierId)
            .into_tuple::<(i32, i64)>()
            .all(db)
            .await?
            .into_iter()
            .collect();

        Ok(suppliers
            .into_iter()
            .map(|supplier| SupplierRow {
                product_count: counts.get(&supplier.id).copied().unwrap_or(0).max(0) as u64,
                supplier,
            })
            .collect())
    }

    #[instrument(skip(self))]
    pub async fn get_supplier(&self, id: i32) -> Result<supplier::Model, ServiceError> {
        find_supplier(&*self.db_pool, id).await
    }

    #[instrument(skip(self, input))]
    pub async fn create_supplier(
        &self,
        input: SupplierInput,
    ) -> Result<supplier::Model, ServiceError> {
        let name = required_name(&input.name, "Supplier name is required")?;
        let model = supplier::ActiveModel {
            name: Set(name),
            contact_person: Set(input.contact_person),
            email: Set(input.email),
            phone: Set(input.phone),
            address: Set(input.address),
            city: Set(input.city),
            country: Set(input.country),
            tax_id: Set(input.tax_id),
            payment_terms: Set(input.payment_terms),
            ..Default::default()
        }
        .insert(&*self.db_pool)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to create supplier");
            ServiceError::DatabaseError(e)
        })?;

        info!(supplier_id = model.id, "Supplier created");
        Ok(model)
    }

    #[instrument(skip(self, input))]
    pub async fn update_supplier(
        &self,
        id: i32,
        input: SupplierInput,
    ) -> Result<supplier::Model, ServiceError> {
        let db = &*self.db_pool;
        let name = required_name(&input.name, "Supplier name is required")?;
        let mut active: supplier::ActiveModel = find_supplier(db, id).await?.into();
        active.name = Set(name);
        active.contact_person = Set(input.contact_person);
        active.email = Set(input.email);
        active.phone = Set(input.phone);
        active.address = Set(input.address);
        active.city = Set(input.city);
        active.country = Set(input.country);
        active.tax_id = Set(input.tax_id);
        active.payment_terms = Set(input.payment_terms);

        let model = active.update(db).await?;
        info!(supplier_id = id, "Supplier updated");
        Ok(model)
    }

    /// Deletes a supplier with its catalog. Its orders keep their snapshots.
    #[instrument(skip(self))]
    pub async fn delete_supplier(&self, id: i32) -> Result<(), ServiceError> {
        let result = supplier::Entity::delete_by_id(id)
            .exec(&*self.db_pool)
            .await
            .map_err(|e| {
                error!(error = %e, supplier_id = id, "Failed to delete supplier");
                ServiceError::DatabaseError(e)
            })?;
        if result.rows_affected == 0 {
            return Err(ServiceError::not_found("Supplier", id));
        }
        info!(supplier_id = id, "Supplier deleted");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn list_products(
        &self,
        supplier_id: i32,
    ) -> Result<Vec<supplier_product::Model>, ServiceError> {
        let db = &*self.db_pool;
        find_supplier(db, supplier_id).await?;
        Ok(supplier_product::Entity::find()
            .filter(supplier_product::Column::SupplierId.eq(supplier_id))
            .order_by_asc(supplier_product::Column::ProductName)
            .all(db)
            .await?)
    }

    /// Adds a product with a generated `PROV{id}-PROD{seq}` code.
    #[instrument(skip(self, input))]
    pub async fn create_product(
        &self,
        supplier_id: i32,
        input: ProductInput,
    ) -> Result<supplier_product::Model, ServiceError> {
        let db = &*self.db_pool;
        let name = required_name(&input.product_name, "Product name is required")?;
        find_supplier(db, supplier_id).await?;

        let (service, name_ref, input_ref) = (self, &name, &input);
        let product = retry_on_conflict("product code", move || async move {
            service
                .insert_product(supplier_id, name_ref, input_ref)
                .await
        })
        .await?;

        info!(
            supplier_id,
            product_id = product.id,
            product_code = %product.product_code,
            "Product created"
        );
        Ok(product)
    }

    async fn insert_product(
        &self,
        supplier_id: i32,
        name: &str,
        input: &ProductInput,
    ) -> Result<supplier_product::Model, ServiceError> {
        let txn = self.db_pool.begin().await?;
        ensure_unique_product_name(&txn, supplier_id, name, None).await?;

        let scope = sequences::product_scope(supplier_id);
        let mut code = None;
        for _ in 0..MAX_ALLOCATION_ATTEMPTS {
            let seq = next_value(&txn, &scope, count_products(&txn, supplier_id)).await?;
            let candidate = product_code(supplier_id, seq);
            if !product_code_exists(&txn, &candidate).await? {
                code = Some(candidate);
                break;
            }
        }
        let code = code.ok_or_else(|| {
            ServiceError::Conflict(format!(
                "Could not allocate a free product code for supplier {}",
                supplier_id
            ))
        })?;

        let product = supplier_product::ActiveModel {
            supplier_id: Set(supplier_id),
            product_name: Set(name.to_string()),
            product_code: Set(code),
            description: Set(input.description.clone()),
            unit_price: Set(input.unit_price.unwrap_or_default()),
            currency: Set(input.currency.unwrap_or(self.default_currency)),
            unit_of_measure: Set(input.unit_of_measure.clone()),
            availability_status: Set(input.availability_status.unwrap_or_default()),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        txn.commit().await?;
        Ok(product)
    }

    #[instrument(skip(self, input))]
    pub async fn update_product(
        &self,
        supplier_id: i32,
        product_id: i32,
        input: ProductUpdate,
    ) -> Result<supplier_product::Model, ServiceError> {
        let txn = self.db_pool.begin().await?;
        let current = find_product(&txn, supplier_id, product_id).await?;
        let mut active: supplier_product::ActiveModel = current.into();

        if let Some(name) = input.product_name {
            let name = required_name(&name, "Product name is required")?;
            ensure_unique_product_name(&txn, supplier_id, &name, Some(product_id)).await?;
            active.product_name = Set(name);
        }
        if let Some(code) = input.product_code {
            active.product_code = Set(code);
        }
        if let Some(description) = input.description {
            active.description = Set(Some(description));
        }
        if let Some(price) = input.unit_price {
            if price.is_sign_negative() {
                return Err(ServiceError::ValidationError(
                    "unit_price cannot be negative".to_string(),
                ));
            }
            active.unit_price = Set(price);
        }
        if let Some(currency) = input.currency {
            active.currency = Set(currency);
        }
        if let Some(unit) = input.unit_of_measure {
            active.unit_of_measure = Set(Some(unit));
        }
        if let Some(status) = input.availability_status {
            active.availability_status = Set(status);
        }

        let product = active.update(&txn).await?;
        txn.commit().await?;
        info!(supplier_id, product_id, "Product updated");
        Ok(product)
    }

    #[instrument(skip(self))]
    pub async fn delete_product(&self, supplier_id: i32, product_id: i32) -> Result<(), ServiceError> {
        let result = supplier_product::Entity::delete_many()
            .filter(supplier_product::Column::Id.eq(product_id))
            .filter(supplier_product::Column::SupplierId.eq(supplier_id))
            .exec(&*self.db_pool)
            .await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::not_found("Product", product_id));
        }
        info!(supplier_id, product_id, "Product deleted");
        Ok(())
    }

    /// Products currently offered, ordered by supplier then product name.
    #[instrument(skip(self))]
    pub async fn available_products(
        &self,
        supplier_id: Option<i32>,
    ) -> Result<Vec<AvailableProduct>, ServiceError> {
        let mut query = supplier_product::Entity::find()
            .filter(supplier_product::Column::AvailabilityStatus.eq(AvailabilityStatus::Available));
        if let Some(id) = supplier_id {
            query = query.filter(supplier_product::Column::SupplierId.eq(id));
        }

        let mut rows: Vec<AvailableProduct> = query
            .find_also_related(supplier::Entity)
            .all(&*self.db_pool)
            .await?
            .into_iter()
            .filter_map(|(product, supplier)| {
                supplier.map(|s| AvailableProduct {
                    product,
                    supplier_name: s.name,
                })
            })
            .collect();

        rows.sort_by(|a, b| {
            a.supplier_name
                .to_lowercase()
                .cmp(&b.supplier_name.to_lowercase())
                .then_with(|| {
                    a.product
                        .product_name
                        .to_lowercase()
                        .cmp(&b.product.product_name.to_lowercase())
                })
        });
        Ok(rows)
    }
}

fn required_name(raw: &str, message: &str) -> Result<String, ServiceError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ServiceError::ValidationError(message.to_string()));
    }
    Ok(trimmed.to_string())
}

pub(crate) async fn find_supplier<C: ConnectionTrait>(
    conn: &C,
    id: i32,
) -> Result<supplier::Model, ServiceError> {
    supplier::Entity::find_by_id(id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Supplier", id))
}

async fn find_product<C: ConnectionTrait>(
    conn: &C,
    supplier_id: i32,
    product_id: i32,
) -> Result<supplier_product::Model, ServiceError> {
    supplier_product::Entity::find_by_id(product_id)
        .filter(supplier_product::Column::SupplierId.eq(supplier_id))
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Product", product_id))
}

/// Names are unique per supplier, compared case-insensitively.
async fn ensure_unique_product_name<C: ConnectionTrait>(
    conn: &C,
    supplier_id: i32,
    name: &str,
    exclude_id: Option<i32>,
) -> Result<(), ServiceError> {
    let wanted = name.trim().to_lowercase();
    let clash = supplier_product::Entity::find()
        .filter(supplier_product::Column::SupplierId.eq(supplier_id))
        .all(conn)
        .await?
        .into_iter()
        .any(|p| Some(p.id) != exclude_id && p.product_name.trim().to_lowercase() == wanted);
    if clash {
        return Err(ServiceError::ValidationError(format!(
            "A product named '{}' already exists for this supplier",
            name.trim()
        )));
    }
    Ok(())
}

async fn count_products<C: ConnectionTrait>(conn: &C, supplier_id: i32) -> Result<i32, DbErr> {
    let count = supplier_product::Entity::find()
        .filter(supplier_product::Column::SupplierId.eq(supplier_id))
        .count(conn)
        .await?;
    Ok(i32::try_from(count).unwrap_or(i32::MAX))
}

async fn product_code_exists<C: ConnectionTrait>(conn: &C, code: &str) -> Result<bool, DbErr> {
    let count = supplier_product::Entity::find()
        .filter(supplier_product::Column::ProductCode.eq(code))
        .count(conn)
        .await?;
    Ok(count > 0)
}
