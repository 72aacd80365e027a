use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Candles::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Candles::Id)
                            .big_unsigned()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Candles::Exchange).string_len(50).not_null())
                    .col(ColumnDef::new(Candles::Asset).string_len(20).not_null())
                    .col(ColumnDef::new(Candles::Currency).string_len(20).not_null())
                    .col(ColumnDef::new(Candles::Timeframe).unsigned().not_null())
                    .col(ColumnDef::new(Candles::Time).big_integer().not_null())
                    .col(ColumnDef::new(Candles::Ts).timestamp().not_null())
                    .col(ColumnDef::new(Candles::Open).double().not_null())
                    .col(ColumnDef::new(Candles::High).double().not_null())
                    .col(ColumnDef::new(Candles::Low).double().not_null())
                    .col(ColumnDef::new(Candles::Close).double().not_null())
                    .col(ColumnDef::new(Candles::Volume).double().not_null())
                    .col(ColumnDef::new(Candles::Type).string_len(20).not_null())
                    .to_owned(),
            )
            .await?;

        // idempotent upserts key on this
        manager
            .create_index(
                Index::create()
                    .name("uk_candles_time_market_timeframe")
                    .table(Candles::Table)
                    .col(Candles::Time)
                    .col(Candles::Exchange)
                    .col(Candles::Asset)
                    .col(Candles::Currency)
                    .col(Candles::Timeframe)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Candles::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Candles {
    Table,
    Id,
    Exchange,
    Asset,
    Currency,
    Timeframe,
    Time,
    Ts,
    Open,
    High,
    Low,
    Close,
    Volume,
    Type,
}
