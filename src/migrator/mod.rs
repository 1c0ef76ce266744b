use sea_orm_migration::prelude::*;

mod m20260301_000001_create_users_and_cats;
mod m20260301_000002_create_video_interactions;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260301_000001_create_users_and_cats::Migration),
            Box::new(m20260301_000002_create_video_interactions::Migration),
        ]
    }
}
