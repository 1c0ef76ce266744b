use super::m20260301_000001_create_users_and_cats::{Cats, Users};
use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(VideoInteractions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(VideoInteractions::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(VideoInteractions::CatId).uuid().not_null())
                    .col(ColumnDef::new(VideoInteractions::OwnerId).integer().not_null())
                    .col(ColumnDef::new(VideoInteractions::PromptText).text().not_null())
                    .col(ColumnDef::new(VideoInteractions::VideoUrl).string().not_null())
                    .col(
                        ColumnDef::new(VideoInteractions::Status)
                            .string()
                            .not_null()
                            .default("completed"),
                    )
                    .col(
                        ColumnDef::new(VideoInteractions::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-video_interaction-cat_id")
                            .from(VideoInteractions::Table, VideoInteractions::CatId)
                            .to(Cats::Table, Cats::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::NoAction),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-video_interaction-owner_id")
                            .from(VideoInteractions::Table, VideoInteractions::OwnerId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-video_interactions-cat_id-created_at")
                    .table(VideoInteractions::Table)
                    .col(VideoInteractions::CatId)
                    .col(VideoInteractions::CreatedAt)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(VideoInteractions::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum VideoInteractions {
    Table,
    Id,
    CatId,
    OwnerId,
    PromptText,
    VideoUrl,
    Status,
    CreatedAt,
}
