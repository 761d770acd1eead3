use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Games::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Games::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Games::RoomCode).string_len(8).null())
                    .col(ColumnDef::new(Games::HostId).uuid().not_null())
                    .col(ColumnDef::new(Games::Settings).json().not_null())
                    .col(
                        ColumnDef::new(Games::Status)
                            .string()
                            .not_null()
                            .default("lobby"),
                    )
                    .col(
                        ColumnDef::new(Games::CurrentRound)
                            .integer()
                            .not_null()
                            .default(1),
                    )
                    .col(ColumnDef::new(Games::CurrentQuestion).json().null())
                    .col(
                        ColumnDef::new(Games::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Joins look games up by room code
        manager
            .create_index(
                Index::create()
                    .name("idx_games_room_code")
                    .table(Games::Table)
                    .col(Games::RoomCode)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Players::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Players::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Players::GameId).uuid().not_null())
                    .col(ColumnDef::new(Players::Name).string().not_null())
                    .col(ColumnDef::new(Players::Age).string().not_null())
                    .col(ColumnDef::new(Players::KidAge).small_integer().null())
                    .col(ColumnDef::new(Players::AvatarEmoji).string().not_null())
                    .col(
                        ColumnDef::new(Players::Difficulty)
                            .small_integer()
                            .not_null()
                            .default(5),
                    )
                    .col(
                        ColumnDef::new(Players::IsHost)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Players::IsReady)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Players::Score)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Players::JoinedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_players_game_id")
                            .from(Players::Table, Players::GameId)
                            .to(Games::Table, Games::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_players_game_id")
                    .table(Players::Table)
                    .col(Players::GameId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Players::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Games::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Games {
    Table,
    Id,
    RoomCode,
    HostId,
    Settings,
    Status,
    CurrentRound,
    CurrentQuestion,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Players {
    Table,
    Id,
    GameId,
    Name,
    Age,
    KidAge,
    AvatarEmoji,
    Difficulty,
    IsHost,
    IsReady,
    Score,
    JoinedAt,
}
