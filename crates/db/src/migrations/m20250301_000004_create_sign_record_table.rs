//! Create sign record table.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(RoverSignRecord::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(RoverSignRecord::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(RoverSignRecord::Uid).string().not_null())
                    .col(ColumnDef::new(RoverSignRecord::PgrUid).string().null())
                    .col(ColumnDef::new(RoverSignRecord::Date).string().not_null())
                    .col(
                        ColumnDef::new(RoverSignRecord::GameSign)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(RoverSignRecord::PgrGameSign)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(RoverSignRecord::BbsSign)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(RoverSignRecord::BbsDetail)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(RoverSignRecord::BbsLike)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(RoverSignRecord::BbsShare)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_rover_sign_record_uid_date")
                    .table(RoverSignRecord::Table)
                    .col(RoverSignRecord::Uid)
                    .col(RoverSignRecord::Date)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(RoverSignRecord::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum RoverSignRecord {
    Table,
    Id,
    Uid,
    PgrUid,
    Date,
    GameSign,
    PgrGameSign,
    BbsSign,
    BbsDetail,
    BbsLike,
    BbsShare,
}
