// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::fetch_attempt::FetchAttempt;
use crate::domain::repositories::fetch_attempt_repository::FetchAttemptRepository;
use crate::infrastructure::database::entities::fetch_attempt;
use crate::utils::errors::RepositoryError;
use async_trait::async_trait;
use sea_orm::*;
use std::sync::Arc;
use uuid::Uuid;

/// 抓取尝试仓库实现
///
/// 只追加，不更新
pub struct FetchAttemptRepositoryImpl {
    db: Arc<DatabaseConnection>,
}

impl FetchAttemptRepositoryImpl {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

impl TryFrom<fetch_attempt::Model> for FetchAttempt {
    type Error = RepositoryError;

    fn try_from(m: fetch_attempt::Model) -> Result<Self, Self::Error> {
        let outcome = m
            .outcome
            .parse()
            .map_err(|e| RepositoryError::Corrupt(format!("attempt {}: {}", m.id, e)))?;
        Ok(Self {
            id: m.id,
            job_id: m.job_id,
            work_item_id: m.work_item_id,
            url: m.url,
            proxy: m.proxy,
            status_code: m.status_code,
            success: m.success,
            outcome,
            error: m.error,
            response_time_ms: m.response_time_ms,
            rendered: m.rendered,
            created_at: m.created_at.into(),
        })
    }
}

#[async_trait]
impl FetchAttemptRepository for FetchAttemptRepositoryImpl {
    async fn append(&self, attempt: &FetchAttempt) -> Result<(), RepositoryError> {
        let model = fetch_attempt::ActiveModel {
            id: Set(attempt.id),
            job_id: Set(attempt.job_id),
            work_item_id: Set(attempt.work_item_id),
            url: Set(attempt.url.clone()),
            proxy: Set(attempt.proxy.clone()),
            status_code: Set(attempt.status_code),
            success: Set(attempt.success),
            outcome: Set(attempt.outcome.to_string()),
            error: Set(attempt.error.clone()),
            response_time_ms: Set(attempt.response_time_ms),
            rendered: Set(attempt.rendered),
            created_at: Set(attempt.created_at.into()),
        };

        fetch_attempt::Entity::insert(model)
            .exec_without_returning(self.db.as_ref())
            .await?;
        Ok(())
    }

    async fn list_by_job(&self, job_id: Uuid) -> Result<Vec<FetchAttempt>, RepositoryError> {
        fetch_attempt::Entity::find()
            .filter(fetch_attempt::Column::JobId.eq(job_id))
            .order_by_asc(fetch_attempt::Column::CreatedAt)
            .all(self.db.as_ref())
            .await?
            .into_iter()
            .map(FetchAttempt::try_from)
            .collect()
    }

    async fn count_by_item(&self, work_item_id: Uuid) -> Result<u64, RepositoryError> {
        let count = fetch_attempt::Entity::find()
            .filter(fetch_attempt::Column::WorkItemId.eq(work_item_id))
            .count(self.db.as_ref())
            .await?;
        Ok(count)
    }
}
