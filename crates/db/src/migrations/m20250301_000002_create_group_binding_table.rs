//! Create group binding table.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(RoverGroupBinding::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(RoverGroupBinding::GroupId)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(RoverGroupBinding::BotSelfId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RoverGroupBinding::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(RoverGroupBinding::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum RoverGroupBinding {
    Table,
    GroupId,
    BotSelfId,
    UpdatedAt,
}
