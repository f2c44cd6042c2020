use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Hotels
        manager
            .create_table(
                Table::create()
                    .table(Hotels::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Hotels::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Hotels::Domain).string().not_null().unique_key())
                    .col(ColumnDef::new(Hotels::Name).string())
                    .col(
                        ColumnDef::new(Hotels::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Hotels::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Crawl jobs
        manager
            .create_table(
                Table::create()
                    .table(CrawlJobs::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(CrawlJobs::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(CrawlJobs::Status).string().not_null())
                    .col(ColumnDef::new(CrawlJobs::Attempts).integer().not_null().default(0))
                    .col(ColumnDef::new(CrawlJobs::LastError).text())
                    .col(ColumnDef::new(CrawlJobs::Metadata).json().not_null())
                    .col(
                        ColumnDef::new(CrawlJobs::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(CrawlJobs::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(ColumnDef::new(CrawlJobs::CompletedAt).timestamp_with_time_zone())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_crawl_jobs_status")
                    .table(CrawlJobs::Table)
                    .col(CrawlJobs::Status)
                    .to_owned(),
            )
            .await?;

        // Work items
        manager
            .create_table(
                Table::create()
                    .table(WorkItems::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(WorkItems::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(WorkItems::JobId).uuid().not_null())
                    .col(ColumnDef::new(WorkItems::HotelId).uuid().not_null())
                    .col(ColumnDef::new(WorkItems::Url).text().not_null())
                    .col(ColumnDef::new(WorkItems::Domain).string().not_null())
                    .col(ColumnDef::new(WorkItems::Status).string().not_null())
                    .col(ColumnDef::new(WorkItems::Attempts).integer().not_null().default(0))
                    .col(ColumnDef::new(WorkItems::LastError).text())
                    .col(ColumnDef::new(WorkItems::FailureKind).string())
                    .col(ColumnDef::new(WorkItems::NextEligibleAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(WorkItems::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(WorkItems::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("uq_work_items_job_url")
                    .table(WorkItems::Table)
                    .col(WorkItems::JobId)
                    .col(WorkItems::Url)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_work_items_status")
                    .table(WorkItems::Table)
                    .col(WorkItems::Status)
                    .to_owned(),
            )
            .await?;

        // Fetch attempts (append-only)
        manager
            .create_table(
                Table::create()
                    .table(FetchAttempts::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(FetchAttempts::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(FetchAttempts::JobId).uuid().not_null())
                    .col(ColumnDef::new(FetchAttempts::WorkItemId).uuid().not_null())
                    .col(ColumnDef::new(FetchAttempts::Url).text().not_null())
                    .col(ColumnDef::new(FetchAttempts::Proxy).string())
                    .col(ColumnDef::new(FetchAttempts::StatusCode).integer())
                    .col(ColumnDef::new(FetchAttempts::Success).boolean().not_null())
                    .col(ColumnDef::new(FetchAttempts::Outcome).string().not_null())
                    .col(ColumnDef::new(FetchAttempts::Error).text())
                    .col(
                        ColumnDef::new(FetchAttempts::ResponseTimeMs)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(FetchAttempts::Rendered)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(FetchAttempts::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_fetch_attempts_job")
                    .table(FetchAttempts::Table)
                    .col(FetchAttempts::JobId)
                    .to_owned(),
            )
            .await?;

        // Discovered links
        manager
            .create_table(
                Table::create()
                    .table(DiscoveredLinks::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(DiscoveredLinks::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(DiscoveredLinks::JobId).uuid().not_null())
                    .col(ColumnDef::new(DiscoveredLinks::Url).text().not_null())
                    .col(ColumnDef::new(DiscoveredLinks::Network).string().not_null())
                    .col(ColumnDef::new(DiscoveredLinks::SourceUrl).text().not_null())
                    .col(
                        ColumnDef::new(DiscoveredLinks::LastSeen)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DiscoveredLinks::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("uq_discovered_links_job_url")
                    .table(DiscoveredLinks::Table)
                    .col(DiscoveredLinks::JobId)
                    .col(DiscoveredLinks::Url)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Checkpoints
        manager
            .create_table(
                Table::create()
                    .table(Checkpoints::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Checkpoints::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Checkpoints::JobId).uuid().not_null())
                    .col(ColumnDef::new(Checkpoints::Url).text().not_null())
                    .col(ColumnDef::new(Checkpoints::Outcome).string().not_null())
                    .col(ColumnDef::new(Checkpoints::Summary).text())
                    .col(
                        ColumnDef::new(Checkpoints::RecordedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("uq_checkpoints_job_url")
                    .table(Checkpoints::Table)
                    .col(Checkpoints::JobId)
                    .col(Checkpoints::Url)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Proxy pool
        manager
            .create_table(
                Table::create()
                    .table(Proxies::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Proxies::Endpoint).string().not_null().primary_key())
                    .col(
                        ColumnDef::new(Proxies::Health)
                            .string()
                            .not_null()
                            .default("healthy"),
                    )
                    .col(
                        ColumnDef::new(Proxies::ConsecutiveFailures)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Proxies::LastUsedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(Proxies::QuarantinedUntil).timestamp_with_time_zone())
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Proxies::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Checkpoints::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(DiscoveredLinks::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(FetchAttempts::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(WorkItems::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(CrawlJobs::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Hotels::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Hotels {
    Table,
    Id,
    Domain,
    Name,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum CrawlJobs {
    Table,
    Id,
    Status,
    Attempts,
    LastError,
    Metadata,
    CreatedAt,
    UpdatedAt,
    CompletedAt,
}

#[derive(DeriveIden)]
enum WorkItems {
    Table,
    Id,
    JobId,
    HotelId,
    Url,
    Domain,
    Status,
    Attempts,
    LastError,
    FailureKind,
    NextEligibleAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum FetchAttempts {
    Table,
    Id,
    JobId,
    WorkItemId,
    Url,
    Proxy,
    StatusCode,
    Success,
    Outcome,
    Error,
    ResponseTimeMs,
    Rendered,
    CreatedAt,
}

#[derive(DeriveIden)]
enum DiscoveredLinks {
    Table,
    Id,
    JobId,
    Url,
    Network,
    SourceUrl,
    LastSeen,
    IsActive,
}

#[derive(DeriveIden)]
enum Checkpoints {
    Table,
    Id,
    JobId,
    Url,
    Outcome,
    Summary,
    RecordedAt,
}

#[derive(DeriveIden)]
enum Proxies {
    Table,
    Endpoint,
    Health,
    ConsecutiveFailures,
    LastUsedAt,
    QuarantinedUntil,
}
