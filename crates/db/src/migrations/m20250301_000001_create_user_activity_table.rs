//! Create user activity table.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(RoverUserActivity::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(RoverUserActivity::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(RoverUserActivity::UserId).string().not_null())
                    .col(ColumnDef::new(RoverUserActivity::BotId).string().not_null())
                    .col(
                        ColumnDef::new(RoverUserActivity::BotSelfId)
                            .string()
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(RoverUserActivity::LastActiveAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // The upsert conflicts on this key
        manager
            .create_index(
                Index::create()
                    .name("idx_rover_user_activity_key")
                    .table(RoverUserActivity::Table)
                    .col(RoverUserActivity::UserId)
                    .col(RoverUserActivity::BotId)
                    .col(RoverUserActivity::BotSelfId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_rover_user_activity_last_active_at")
                    .table(RoverUserActivity::Table)
                    .col(RoverUserActivity::LastActiveAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(RoverUserActivity::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum RoverUserActivity {
    Table,
    Id,
    UserId,
    BotId,
    BotSelfId,
    LastActiveAt,
}
