use crate::entities;
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr, EntityTrait, Schema,
};
use std::time::Duration;
use tracing::info;

/// Establishes a database connection with sane pool defaults.
pub async fn connect(database_url: &str) -> Result<DatabaseConnection, DbErr> {
    let mut options = ConnectOptions::new(database_url.to_string());
    options
        .max_connections(20)
        .min_connections(2)
        .connect_timeout(Duration::from_secs(10))
        .acquire_timeout(Duration::from_secs(10))
        .sqlx_logging(false);

    let db = Database::connect(options).await?;
    info!("Database connection established");
    Ok(db)
}

async fn create_table<E: EntityTrait>(db: &DatabaseConnection, entity: E) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);
    let mut statement = schema.create_table_from_entity(entity);
    statement.if_not_exists();
    db.execute(backend.build(&statement)).await?;
    Ok(())
}

/// Creates all storefront tables that do not exist yet. Used by the
/// `auto_migrate` startup path and the SQLite test harness.
pub async fn create_schema(db: &DatabaseConnection) -> Result<(), DbErr> {
    create_table(db, entities::Product).await?;
    create_table(db, entities::ProductVariant).await?;
    create_table(db, entities::Cart).await?;
    create_table(db, entities::CartItem).await?;
    create_table(db, entities::Coupon).await?;
    create_table(db, entities::CouponRedemption).await?;
    create_table(db, entities::Order).await?;
    create_table(db, entities::OrderItem).await?;
    create_table(db, entities::OrderStatusHistory).await?;
    info!("Database schema ensured");
    Ok(())
}
