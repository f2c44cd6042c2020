// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::crawl_job::{CrawlJob, JobStatus};
use crate::domain::models::work_item::WorkItem;
use crate::domain::repositories::job_repository::JobRepository;
use crate::infrastructure::database::entities::{crawl_job, work_item};
use crate::utils::errors::RepositoryError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::*;
use std::sync::Arc;
use uuid::Uuid;

/// 任务与工作项仓库实现
pub struct JobRepositoryImpl {
    db: Arc<DatabaseConnection>,
}

impl JobRepositoryImpl {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

impl TryFrom<crawl_job::Model> for CrawlJob {
    type Error = RepositoryError;

    fn try_from(m: crawl_job::Model) -> Result<Self, Self::Error> {
        let status = m
            .status
            .parse()
            .map_err(|e| RepositoryError::Corrupt(format!("job {}: {}", m.id, e)))?;
        Ok(Self {
            id: m.id,
            status,
            attempts: m.attempts,
            last_error: m.last_error,
            metadata: m.metadata,
            created_at: m.created_at.into(),
            updated_at: m.updated_at.into(),
            completed_at: m.completed_at.map(Into::into),
        })
    }
}

impl TryFrom<work_item::Model> for WorkItem {
    type Error = RepositoryError;

    fn try_from(m: work_item::Model) -> Result<Self, Self::Error> {
        let status = m
            .status
            .parse()
            .map_err(|e| RepositoryError::Corrupt(format!("work item {}: {}", m.id, e)))?;
        let failure_kind = m
            .failure_kind
            .as_deref()
            .map(str::parse)
            .transpose()
            .map_err(|e| RepositoryError::Corrupt(format!("work item {}: {}", m.id, e)))?;
        Ok(Self {
            id: m.id,
            job_id: m.job_id,
            hotel_id: m.hotel_id,
            url: m.url,
            domain: m.domain,
            status,
            attempts: m.attempts,
            last_error: m.last_error,
            failure_kind,
            next_eligible_at: m.next_eligible_at.map(Into::into),
            created_at: m.created_at.into(),
            updated_at: m.updated_at.into(),
        })
    }
}

fn item_active_model(item: &WorkItem) -> work_item::ActiveModel {
    work_item::ActiveModel {
        id: Set(item.id),
        job_id: Set(item.job_id),
        hotel_id: Set(item.hotel_id),
        url: Set(item.url.clone()),
        domain: Set(item.domain.clone()),
        status: Set(item.status.to_string()),
        attempts: Set(item.attempts),
        last_error: Set(item.last_error.clone()),
        failure_kind: Set(item.failure_kind.map(|k| k.to_string())),
        next_eligible_at: Set(item.next_eligible_at.map(Into::into)),
        created_at: Set(item.created_at.into()),
        updated_at: Set(item.updated_at.into()),
    }
}

#[async_trait]
impl JobRepository for JobRepositoryImpl {
    async fn create_job_if_absent(&self, job: &CrawlJob) -> Result<CrawlJob, RepositoryError> {
        let model = crawl_job::ActiveModel {
            id: Set(job.id),
            status: Set(job.status.to_string()),
            attempts: Set(job.attempts),
            last_error: Set(job.last_error.clone()),
            metadata: Set(job.metadata.clone()),
            created_at: Set(job.created_at.into()),
            updated_at: Set(job.updated_at.into()),
            completed_at: Set(job.completed_at.map(Into::into)),
        };

        crawl_job::Entity::insert(model)
            .on_conflict(
                OnConflict::column(crawl_job::Column::Id)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(self.db.as_ref())
            .await?;

        self.find_job(job.id).await?.ok_or(RepositoryError::NotFound)
    }

    async fn find_job(&self, id: Uuid) -> Result<Option<CrawlJob>, RepositoryError> {
        crawl_job::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await?
            .map(CrawlJob::try_from)
            .transpose()
    }

    async fn update_job(&self, job: &CrawlJob) -> Result<(), RepositoryError> {
        // attempts 只通过 increment_job_attempts 修改
        let model = crawl_job::ActiveModel {
            id: Unchanged(job.id),
            status: Set(job.status.to_string()),
            last_error: Set(job.last_error.clone()),
            metadata: Set(job.metadata.clone()),
            updated_at: Set(job.updated_at.into()),
            completed_at: Set(job.completed_at.map(Into::into)),
            ..Default::default()
        };

        let result = crawl_job::Entity::update_many()
            .set(model)
            .filter(crawl_job::Column::Id.eq(job.id))
            .exec(self.db.as_ref())
            .await?;
        if result.rows_affected == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn increment_job_attempts(&self, id: Uuid) -> Result<(), RepositoryError> {
        crawl_job::Entity::update_many()
            .col_expr(
                crawl_job::Column::Attempts,
                Expr::col(crawl_job::Column::Attempts).add(1),
            )
            .filter(crawl_job::Column::Id.eq(id))
            .exec(self.db.as_ref())
            .await?;
        Ok(())
    }

    async fn list_active_jobs(&self) -> Result<Vec<CrawlJob>, RepositoryError> {
        crawl_job::Entity::find()
            .filter(crawl_job::Column::Status.is_in([
                JobStatus::Queued.as_str(),
                JobStatus::Running.as_str(),
            ]))
            .order_by_asc(crawl_job::Column::CreatedAt)
            .all(self.db.as_ref())
            .await?
            .into_iter()
            .map(CrawlJob::try_from)
            .collect()
    }

    async fn insert_items(&self, items: &[WorkItem]) -> Result<u64, RepositoryError> {
        if items.is_empty() {
            return Ok(0);
        }

        let inserted = work_item::Entity::insert_many(items.iter().map(item_active_model))
            .on_conflict(
                OnConflict::columns([work_item::Column::JobId, work_item::Column::Url])
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(self.db.as_ref())
            .await?;
        Ok(inserted)
    }

    async fn find_items_by_job(&self, job_id: Uuid) -> Result<Vec<WorkItem>, RepositoryError> {
        work_item::Entity::find()
            .filter(work_item::Column::JobId.eq(job_id))
            .order_by_asc(work_item::Column::CreatedAt)
            .order_by_asc(work_item::Column::Url)
            .all(self.db.as_ref())
            .await?
            .into_iter()
            .map(WorkItem::try_from)
            .collect()
    }

    async fn update_item(&self, item: &WorkItem) -> Result<(), RepositoryError> {
        let result = work_item::Entity::update_many()
            .set(item_update_model(item))
            .filter(work_item::Column::Id.eq(item.id))
            .exec(self.db.as_ref())
            .await?;
        if result.rows_affected == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn update_item_if(
        &self,
        item: &WorkItem,
        expected: &WorkItem,
        stale_before: Option<DateTime<Utc>>,
    ) -> Result<bool, RepositoryError> {
        let mut condition = Condition::all()
            .add(work_item::Column::Id.eq(item.id))
            .add(work_item::Column::Status.eq(expected.status.as_str()))
            .add(work_item::Column::Attempts.eq(expected.attempts));
        if let Some(before) = stale_before {
            let before: DateTimeWithTimeZone = before.into();
            condition = condition.add(work_item::Column::UpdatedAt.lt(before));
        }

        let result = work_item::Entity::update_many()
            .set(item_update_model(item))
            .filter(condition)
            .exec(self.db.as_ref())
            .await?;
        Ok(result.rows_affected == 1)
    }
}

/// 更新用的活动模型，主键、所属任务与创建时间不变
fn item_update_model(item: &WorkItem) -> work_item::ActiveModel {
    let mut model = item_active_model(item);
    model.id = Unchanged(item.id);
    model.job_id = Unchanged(item.job_id);
    model.created_at = Unchanged(item.created_at.into());
    model
}
