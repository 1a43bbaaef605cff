//! Database migrations.
//!
//! Schema migrations for the database.

#![allow(missing_docs)]

use sea_orm_migration::prelude::*;

mod m20260201_000001_create_user_table;
mod m20260201_000002_create_category_table;
mod m20260201_000003_create_category_member_table;
mod m20260201_000004_create_vote_table;
mod m20260201_000005_create_badge_tables;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260201_000001_create_user_table::Migration),
            Box::new(m20260201_000002_create_category_table::Migration),
            Box::new(m20260201_000003_create_category_member_table::Migration),
            Box::new(m20260201_000004_create_vote_table::Migration),
            Box::new(m20260201_000005_create_badge_tables::Migration),
        ]
    }
}
