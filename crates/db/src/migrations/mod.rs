//! Database migrations.
//!
//! Schema migrations for the database.

#![allow(missing_docs)]

use sea_orm_migration::prelude::*;

mod m20260101_000001_create_vote_table;
mod m20260101_000002_create_vote_configuration_table;
mod m20260101_000003_create_vote_eligibility_table;
mod m20260101_000004_create_vote_cast_table;
mod m20260101_000005_create_vote_action_table;
mod m20260101_000006_create_vote_result_tables;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260101_000001_create_vote_table::Migration),
            Box::new(m20260101_000002_create_vote_configuration_table::Migration),
            Box::new(m20260101_000003_create_vote_eligibility_table::Migration),
            Box::new(m20260101_000004_create_vote_cast_table::Migration),
            Box::new(m20260101_000005_create_vote_action_table::Migration),
            Box::new(m20260101_000006_create_vote_result_tables::Migration),
        ]
    }
}
