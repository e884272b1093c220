//! Database configuration module for the stokvel ledger.
//!
//! This module handles `SQLite` database connection and table creation using `SeaORM`.
//! Tables are generated from the entity definitions with `Schema::create_table_from_entity`,
//! so the schema always matches the Rust structs. Composite unique indexes that cannot be
//! expressed on a single column are created explicitly afterwards.

use crate::entities::{
    Contribution, Group, Loan, Membership, Notification, PreferredGroup, User, membership,
    preferred_group,
};
use crate::errors::Result;
use sea_orm::{
    ConnectionTrait, Database, DatabaseConnection, EntityTrait, Schema, sea_query::Index,
};

const DEFAULT_DATABASE_URL: &str = "sqlite://data/stokvel.sqlite?mode=rwc";

/// Gets the database URL from environment variable or returns default `SQLite` path.
#[must_use]
pub fn get_database_url() -> String {
    std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string())
}

/// Establishes a connection to the `SQLite` database using the `DATABASE_URL` environment variable.
///
/// Falls back to a default local `SQLite` file if no environment variable is set.
pub async fn create_connection() -> Result<DatabaseConnection> {
    let database_url = get_database_url();
    tracing::debug!("Connecting to {database_url}");
    Database::connect(&database_url).await.map_err(Into::into)
}

async fn create_table<C, E>(db: &C, entity: E) -> Result<()>
where
    C: ConnectionTrait,
    E: EntityTrait,
{
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);
    let mut statement = schema.create_table_from_entity(entity);
    statement.if_not_exists();
    db.execute(builder.build(&statement)).await?;
    Ok(())
}

/// Creates all tables and unique indexes. Safe to call on an existing database.
///
/// Parent tables are created before the tables that reference them.
pub async fn create_tables<C: ConnectionTrait>(db: &C) -> Result<()> {
    create_table(db, User).await?;
    create_table(db, Group).await?;
    create_table(db, PreferredGroup).await?;
    create_table(db, Membership).await?;
    create_table(db, Contribution).await?;
    create_table(db, Loan).await?;
    create_table(db, Notification).await?;

    let builder = db.get_database_backend();

    let membership_pair = Index::create()
        .name("idx_memberships_user_group")
        .table(Membership)
        .col(membership::Column::UserId)
        .col(membership::Column::GroupId)
        .unique()
        .if_not_exists()
        .to_owned();
    db.execute(builder.build(&membership_pair)).await?;

    let preferred_pair = Index::create()
        .name("idx_preferred_groups_user_group")
        .table(PreferredGroup)
        .col(preferred_group::Column::UserId)
        .col(preferred_group::Column::GroupId)
        .unique()
        .if_not_exists()
        .to_owned();
    db.execute(builder.build(&preferred_pair)).await?;

    Ok(())
}
