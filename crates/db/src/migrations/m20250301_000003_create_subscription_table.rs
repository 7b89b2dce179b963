//! Create subscription table.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(RoverSubscription::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(RoverSubscription::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(RoverSubscription::TaskName).string().not_null())
                    .col(
                        ColumnDef::new(RoverSubscription::ChannelKind)
                            .string()
                            .not_null()
                            .default("direct"),
                    )
                    .col(ColumnDef::new(RoverSubscription::UserId).string().not_null())
                    .col(ColumnDef::new(RoverSubscription::GroupId).string().null())
                    .col(ColumnDef::new(RoverSubscription::BotId).string().not_null())
                    .col(
                        ColumnDef::new(RoverSubscription::BotSelfId)
                            .string()
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(RoverSubscription::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_rover_subscription_task")
                    .table(RoverSubscription::Table)
                    .col(RoverSubscription::TaskName)
                    .col(RoverSubscription::UserId)
                    .col(RoverSubscription::BotId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(RoverSubscription::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum RoverSubscription {
    Table,
    Id,
    TaskName,
    ChannelKind,
    UserId,
    GroupId,
    BotId,
    BotSelfId,
    CreatedAt,
}
