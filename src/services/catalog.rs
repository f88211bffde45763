use crate::{
    entities::{
        product, product_variant, Product, ProductModel, ProductVariant, ProductVariantModel,
    },
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Catalog store: products, variants, and the stock primitives the
/// checkout and order workflows depend on.
#[derive(Clone)]
pub struct CatalogService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

impl CatalogService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    #[instrument(skip(self, input))]
    pub async fn create_product(
        &self,
        input: CreateProductInput,
    ) -> Result<ProductWithVariants, ServiceError> {
        if input.variants.is_empty() {
            return Err(ServiceError::ValidationError(
                "Product needs at least one variant".to_string(),
            ));
        }

        let txn = self.db.begin().await?;
        let now = Utc::now();
        let product_id = Uuid::new_v4();
        let total_stock: i32 = input.variants.iter().map(|v| v.stock).sum();

        let product = product::ActiveModel {
            id: Set(product_id),
            name: Set(input.name.clone()),
            slug: Set(input.slug),
            description: Set(input.description),
            base_price: Set(input.base_price),
            total_stock: Set(total_stock),
            sold_count: Set(0),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let product = product.insert(&txn).await?;

        let mut variants = Vec::with_capacity(input.variants.len());
        for (position, v) in input.variants.into_iter().enumerate() {
            let variant = product_variant::ActiveModel {
                id: Set(Uuid::new_v4()),
                product_id: Set(product_id),
                sku: Set(v.sku),
                label: Set(v.label),
                price: Set(v.price),
                stock: Set(v.stock),
                is_available: Set(v.is_available),
                position: Set(position as i32),
                created_at: Set(now),
                updated_at: Set(now),
            };
            variants.push(variant.insert(&txn).await?);
        }

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::ProductCreated(product_id))
            .await;

        info!(product_id = %product_id, name = %input.name, "Product created");
        Ok(ProductWithVariants { product, variants })
    }

    #[instrument(skip(self, input))]
    pub async fn update_product(
        &self,
        product_id: Uuid,
        input: UpdateProductInput,
    ) -> Result<ProductModel, ServiceError> {
        let product = Product::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;

        let mut active: product::ActiveModel = product.into();
        if let Some(name) = input.name {
            active.name = Set(name);
        }
        if let Some(description) = input.description {
            active.description = Set(Some(description));
        }
        if let Some(base_price) = input.base_price {
            active.base_price = Set(base_price);
        }
        if let Some(is_active) = input.is_active {
            active.is_active = Set(is_active);
        }
        active.updated_at = Set(Utc::now());
        let updated = active.update(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::ProductUpdated(product_id))
            .await;

        Ok(updated)
    }

    pub async fn get_product(&self, product_id: Uuid) -> Result<ProductWithVariants, ServiceError> {
        let product = Product::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;

        let variants = ProductVariant::find()
            .filter(product_variant::Column::ProductId.eq(product_id))
            .order_by_asc(product_variant::Column::Position)
            .all(&*self.db)
            .await?;

        Ok(ProductWithVariants { product, variants })
    }

    pub async fn list_products(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<ProductModel>, u64), ServiceError> {
        let paginator = Product::find()
            .filter(product::Column::IsActive.eq(true))
            .order_by_desc(product::Column::CreatedAt)
            .paginate(&*self.db, per_page);

        let total = paginator.num_items().await?;
        let products = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((products, total))
    }

    /// Loads a product together with one of its variants, for line-item
    /// validation. The variant must belong to the product.
    pub async fn find_variant<C: ConnectionTrait>(
        &self,
        conn: &C,
        product_id: Uuid,
        variant_id: Uuid,
    ) -> Result<(ProductModel, ProductVariantModel), ServiceError> {
        let product = Product::find_by_id(product_id)
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;

        let variant = ProductVariant::find_by_id(variant_id)
            .filter(product_variant::Column::ProductId.eq(product_id))
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Variant {} not found", variant_id)))?;

        Ok((product, variant))
    }

    /// Atomically decrements variant stock, failing when the remaining
    /// stock no longer covers the requested quantity. Also maintains the
    /// product's `total_stock` and `sold_count` counters.
    ///
    /// Runs as a conditional update so two concurrent checkouts can
    /// never drive stock below zero.
    pub async fn decrement_variant_stock<C: ConnectionTrait>(
        &self,
        conn: &C,
        product_id: Uuid,
        variant_id: Uuid,
        quantity: i32,
    ) -> Result<i32, ServiceError> {
        let result = ProductVariant::update_many()
            .col_expr(
                product_variant::Column::Stock,
                Expr::col(product_variant::Column::Stock).sub(quantity),
            )
            .col_expr(
                product_variant::Column::UpdatedAt,
                Expr::value(Utc::now()),
            )
            .filter(product_variant::Column::Id.eq(variant_id))
            .filter(product_variant::Column::Stock.gte(quantity))
            .exec(conn)
            .await?;

        if result.rows_affected == 0 {
            let available = ProductVariant::find_by_id(variant_id)
                .one(conn)
                .await?
                .map(|v| v.stock)
                .unwrap_or(0);
            return Err(ServiceError::InsufficientStock { available });
        }

        Product::update_many()
            .col_expr(
                product::Column::TotalStock,
                Expr::col(product::Column::TotalStock).sub(quantity),
            )
            .col_expr(
                product::Column::SoldCount,
                Expr::col(product::Column::SoldCount).add(quantity),
            )
            .col_expr(product::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(product::Column::Id.eq(product_id))
            .exec(conn)
            .await?;

        let remaining = ProductVariant::find_by_id(variant_id)
            .one(conn)
            .await?
            .map(|v| v.stock)
            .unwrap_or(0);
        Ok(remaining)
    }

    /// Restores stock after a cancellation or an approved return,
    /// reversing `decrement_variant_stock` exactly.
    pub async fn increment_variant_stock<C: ConnectionTrait>(
        &self,
        conn: &C,
        product_id: Uuid,
        variant_id: Uuid,
        quantity: i32,
    ) -> Result<(), ServiceError> {
        ProductVariant::update_many()
            .col_expr(
                product_variant::Column::Stock,
                Expr::col(product_variant::Column::Stock).add(quantity),
            )
            .col_expr(
                product_variant::Column::UpdatedAt,
                Expr::value(Utc::now()),
            )
            .filter(product_variant::Column::Id.eq(variant_id))
            .exec(conn)
            .await?;

        Product::update_many()
            .col_expr(
                product::Column::TotalStock,
                Expr::col(product::Column::TotalStock).add(quantity),
            )
            .col_expr(
                product::Column::SoldCount,
                Expr::col(product::Column::SoldCount).sub(quantity),
            )
            .col_expr(product::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(product::Column::Id.eq(product_id))
            .exec(conn)
            .await?;

        Ok(())
    }
}

/// Input for creating a product with its variants
#[derive(Debug, Deserialize)]
pub struct CreateProductInput {
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub base_price: Decimal,
    pub variants: Vec<CreateVariantInput>,
}

#[derive(Debug, Deserialize)]
pub struct CreateVariantInput {
    pub sku: String,
    pub label: String,
    pub price: Decimal,
    pub stock: i32,
    #[serde(default = "default_true")]
    pub is_available: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct UpdateProductInput {
    pub name: Option<String>,
    pub description: Option<String>,
    pub base_price: Option<Decimal>,
    pub is_active: Option<bool>,
}

/// Product with its variants
#[derive(Debug, Serialize)]
pub struct ProductWithVariants {
    pub product: ProductModel,
    pub variants: Vec<ProductVariantModel>,
}
