use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Importers::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Importers::Id)
                            .char_len(36)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Importers::Exchange).string_len(50).not_null())
                    .col(ColumnDef::new(Importers::Asset).string_len(20).not_null())
                    .col(ColumnDef::new(Importers::Currency).string_len(20).not_null())
                    .col(ColumnDef::new(Importers::Type).string_len(20).not_null())
                    .col(ColumnDef::new(Importers::Params).json().not_null())
                    .col(ColumnDef::new(Importers::Status).string_len(20).not_null())
                    .col(ColumnDef::new(Importers::CurrentState).json().null())
                    .col(
                        ColumnDef::new(Importers::Progress)
                            .tiny_unsigned()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Importers::StartedAt).timestamp().null())
                    .col(ColumnDef::new(Importers::EndedAt).timestamp().null())
                    .col(ColumnDef::new(Importers::Error).text().null())
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Importers::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Importers {
    Table,
    Id,
    Exchange,
    Asset,
    Currency,
    Type,
    Params,
    Status,
    CurrentState,
    Progress,
    StartedAt,
    EndedAt,
    Error,
}
