// Copyright 2025 Kirky.X
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use anyhow::Context;
use clap::{Parser, Subcommand};
use migration::{Migrator, MigratorTrait};
use sea_orm::DatabaseConnection;
use serde_json::Value;
use social_discovery::application::dto::hotel_seed::parse_seeds;
use social_discovery::config::settings::{CheckpointBackend, Settings};
use social_discovery::domain::repositories::checkpoint_store::CheckpointStore;
use social_discovery::domain::repositories::proxy_repository::ProxyRepository;
use social_discovery::engines::fetch_pipeline::FetchPipeline;
use social_discovery::engines::proxy_manager::ProxyManager;
use social_discovery::engines::render_engine::ChromiumRenderer;
use social_discovery::engines::reqwest_engine::ReqwestEngine;
use social_discovery::infrastructure::checkpoint::{DbCheckpointStore, FileCheckpointStore};
use social_discovery::infrastructure::database::connection;
use social_discovery::infrastructure::metrics::init_metrics;
use social_discovery::infrastructure::repositories::{
    FetchAttemptRepositoryImpl, HotelRepositoryImpl, JobRepositoryImpl, LinkRepositoryImpl,
    ProxyRepositoryImpl,
};
use social_discovery::queue::domain_rate_limiter::DomainRateLimiter;
use social_discovery::utils::robots::RobotsChecker;
use social_discovery::utils::telemetry;
use social_discovery::workers::{CrawlStores, JobOrchestrator, OrchestratorConfig, WorkerManager};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "social-discovery")]
#[command(about = "Discover official social media links for hotel websites")]
#[command(version)]
struct Cli {
    /// 额外的配置文件
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a batch of hotel seeds
    Enqueue {
        /// Batch name stored in every job's metadata
        batch_name: String,
        /// Seed file: one URL per line, `url,name` or `hotel_id,name,url`
        input_file: PathBuf,
        /// Extra JSON object merged into job metadata
        #[arg(short, long)]
        metadata: Option<String>,
    },

    /// Run the crawl worker
    Worker {
        /// Dispatch pending work once and exit
        #[arg(long)]
        once: bool,
        /// Ignore checkpoints and refetch every item of active jobs
        #[arg(long)]
        force: bool,
        /// Do not skip items already checkpointed
        #[arg(long)]
        no_resume: bool,
        /// Override the global concurrency cap
        #[arg(long)]
        concurrency: Option<usize>,
    },

    /// Import proxy endpoints from a file, one per line
    LoadProxies { file: PathBuf },

    /// Manage the database schema
    Migrate {
        #[command(subcommand)]
        command: MigrateCommands,
    },

    /// Show a job with its items and fetch attempts
    Status { job_id: Uuid },

    /// List social links discovered by a job
    Links { job_id: Uuid },

    /// Abort a job; queued items fail, in-flight items finish
    Abort {
        job_id: Uuid,
        #[arg(short, long, default_value = "operator request")]
        reason: String,
    },

    /// Requeue a terminal job and all of its items
    Retry { job_id: Uuid },
}

#[derive(Subcommand)]
enum MigrateCommands {
    /// Apply all pending migrations
    Upgrade,
    /// Roll back the last migration
    Down,
    /// Print migration status
    Status,
}

/// 主函数
///
/// 应用程序入口点，负责加载配置、初始化日志并分发子命令
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let config_path = cli.config.as_deref().and_then(Path::to_str);
    let settings = Settings::load(config_path).context("failed to load configuration")?;
    telemetry::init_telemetry(settings.logging.json);

    let db = Arc::new(connection::create_pool(&settings.database).await?);
    info!("Database connection established");

    match &cli.command {
        Commands::Migrate { command } => {
            match command {
                MigrateCommands::Upgrade => Migrator::up(db.as_ref(), None).await?,
                MigrateCommands::Down => Migrator::down(db.as_ref(), Some(1)).await?,
                MigrateCommands::Status => Migrator::status(db.as_ref()).await?,
            }
            return Ok(());
        }
        Commands::LoadProxies { file } => {
            let endpoints = read_proxy_list(file)?;
            let inserted = ProxyRepositoryImpl::new(db.clone())
                .insert_endpoints(&endpoints)
                .await?;
            println!("{} proxies read, {} new", endpoints.len(), inserted);
            return Ok(());
        }
        _ => {}
    }

    Migrator::up(db.as_ref(), None).await?;
    let defaults = OrchestratorConfig::from_settings(&settings);

    match cli.command {
        Commands::Enqueue {
            batch_name,
            input_file,
            metadata,
        } => {
            let content = std::fs::read_to_string(&input_file)
                .with_context(|| format!("failed to read {}", input_file.display()))?;
            let seeds = parse_seeds(&content)?;
            let metadata = match metadata {
                Some(raw) => serde_json::from_str(&raw).context("metadata is not valid JSON")?,
                None => Value::Null,
            };

            let orchestrator = build_orchestrator(&settings, db, defaults).await?;
            let job_ids = orchestrator.submit(&batch_name, &seeds, metadata).await?;
            info!(batch = %batch_name, seeds = seeds.len(), jobs = job_ids.len(), "Batch enqueued");
            for job_id in job_ids {
                println!("{}", job_id);
            }
        }
        Commands::Worker {
            once,
            force,
            no_resume,
            concurrency,
        } => {
            if settings.metrics.enabled {
                init_metrics(&settings.metrics.listen);
            }

            let mut config = defaults;
            config.force = force;
            if no_resume {
                config.resume = false;
            }
            if let Some(concurrency) = concurrency {
                config.concurrency = concurrency.max(1);
            }

            let orchestrator = Arc::new(build_orchestrator(&settings, db, config).await?);
            let manager = WorkerManager::new(
                orchestrator,
                Duration::from_secs(settings.crawler.poll_interval_secs.max(1)),
            );
            if once {
                let summary = manager.run_once().await?;
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                manager.run().await?;
            }
        }
        Commands::Status { job_id } => {
            let orchestrator = build_orchestrator(&settings, db, defaults).await?;
            let items = orchestrator.items(job_id).await?;
            let mut counts = BTreeMap::new();
            for item in &items {
                *counts.entry(item.status.as_str()).or_insert(0usize) += 1;
            }
            let report = serde_json::json!({
                "job": orchestrator.status(job_id).await?,
                "counts": counts,
                "items": items,
                "needs_review": orchestrator.review_items(job_id).await?,
                "attempts": orchestrator.attempts(job_id).await?,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Links { job_id } => {
            let orchestrator = build_orchestrator(&settings, db, defaults).await?;
            for link in orchestrator.links(job_id).await? {
                let state = if link.is_active { "active" } else { "inactive" };
                println!("{}\t{}\t{}", link.network, link.url, state);
            }
        }
        Commands::Abort { job_id, reason } => {
            let orchestrator = build_orchestrator(&settings, db, defaults).await?;
            let job = orchestrator.abort(job_id, &reason).await?;
            println!("{} {}", job.id, job.status);
        }
        Commands::Retry { job_id } => {
            let orchestrator = build_orchestrator(&settings, db, defaults).await?;
            let job = orchestrator.force_retry(job_id).await?;
            println!("{} {}", job.id, job.status);
        }
        Commands::Migrate { .. } | Commands::LoadProxies { .. } => {}
    }

    Ok(())
}

/// 根据配置组装编排器
async fn build_orchestrator(
    settings: &Settings,
    db: Arc<DatabaseConnection>,
    config: OrchestratorConfig,
) -> anyhow::Result<JobOrchestrator> {
    let proxy_repo = Arc::new(ProxyRepositoryImpl::new(db.clone()));
    if let Some(path) = &settings.proxy.list_path {
        let endpoints = read_proxy_list(Path::new(path))?;
        let inserted = proxy_repo.insert_endpoints(&endpoints).await?;
        info!(path = %path, inserted, "Proxy list imported");
    }
    let proxies = ProxyManager::from_snapshot(proxy_repo.list_all().await?, settings.proxy_policy());
    info!(proxies = proxies.len(), "Proxy pool ready");

    let checkpoints: Arc<dyn CheckpointStore> = match settings.checkpoint.backend {
        CheckpointBackend::Database => Arc::new(DbCheckpointStore::new(db.clone())),
        CheckpointBackend::File => Arc::new(FileCheckpointStore::new(&settings.checkpoint.path)),
    };

    let user_agent = settings.crawler.user_agent.clone();
    let mut pipeline = FetchPipeline::new(
        Arc::new(ReqwestEngine),
        Arc::new(RobotsChecker::new(user_agent.clone())),
        user_agent,
    );
    if settings.crawler.render_enabled {
        pipeline = pipeline.with_renderer(
            Arc::new(ChromiumRenderer),
            Duration::from_secs(settings.crawler.render_timeout_secs),
        );
    }

    let stores = CrawlStores {
        hotels: Arc::new(HotelRepositoryImpl::new(db.clone())),
        jobs: Arc::new(JobRepositoryImpl::new(db.clone())),
        attempts: Arc::new(FetchAttemptRepositoryImpl::new(db.clone())),
        links: Arc::new(LinkRepositoryImpl::new(db.clone())),
        proxies: Some(proxy_repo as Arc<dyn ProxyRepository>),
    };

    Ok(JobOrchestrator::new(
        stores,
        checkpoints,
        Arc::new(pipeline),
        proxies,
        DomainRateLimiter::new(settings.rate_limit_policy()),
        settings.retry_policy(),
        config,
    ))
}

fn read_proxy_list(path: &Path) -> anyhow::Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read proxy list {}", path.display()))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}
