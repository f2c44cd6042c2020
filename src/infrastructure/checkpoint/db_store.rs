// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::checkpoint::CheckpointEntry;
use crate::domain::repositories::checkpoint_store::CheckpointStore;
use crate::infrastructure::database::entities::checkpoint;
use crate::utils::errors::{CheckpointError, RepositoryError};
use async_trait::async_trait;
use sea_orm::sea_query::OnConflict;
use sea_orm::*;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// 数据库检查点存储
///
/// 每次写入即提交，`flush` 无需额外动作
pub struct DbCheckpointStore {
    db: Arc<DatabaseConnection>,
}

impl DbCheckpointStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    fn key_filter(job_id: Uuid, url: &str) -> Condition {
        Condition::all()
            .add(checkpoint::Column::JobId.eq(job_id))
            .add(checkpoint::Column::Url.eq(url))
    }
}

fn db_err(e: DbErr) -> CheckpointError {
    CheckpointError::Repository(RepositoryError::Database(e))
}

#[async_trait]
impl CheckpointStore for DbCheckpointStore {
    async fn load(&self) -> Result<(), CheckpointError> {
        let count = checkpoint::Entity::find()
            .count(self.db.as_ref())
            .await
            .map_err(db_err)?;
        debug!(entries = count, "Checkpoint table ready");
        Ok(())
    }

    async fn is_done(&self, job_id: Uuid, url: &str) -> Result<bool, CheckpointError> {
        Ok(self.get(job_id, url).await?.is_some())
    }

    async fn get(&self, job_id: Uuid, url: &str) -> Result<Option<CheckpointEntry>, CheckpointError> {
        let Some(m) = checkpoint::Entity::find()
            .filter(Self::key_filter(job_id, url))
            .one(self.db.as_ref())
            .await
            .map_err(db_err)?
        else {
            return Ok(None);
        };

        let outcome = m.outcome.parse().map_err(|e| {
            RepositoryError::Corrupt(format!("checkpoint {}: {}", m.id, e))
        })?;
        Ok(Some(CheckpointEntry {
            job_id: m.job_id,
            url: m.url,
            outcome,
            summary: m.summary,
            recorded_at: m.recorded_at.into(),
        }))
    }

    async fn record(&self, entry: CheckpointEntry) -> Result<(), CheckpointError> {
        // 同一结果重复写入时保留首次记录
        if let Some(existing) = self.get(entry.job_id, &entry.url).await? {
            if existing.same_result(&entry) {
                return Ok(());
            }
        }

        let model = checkpoint::ActiveModel {
            id: Set(Uuid::new_v4()),
            job_id: Set(entry.job_id),
            url: Set(entry.url.clone()),
            outcome: Set(entry.outcome.to_string()),
            summary: Set(entry.summary.clone()),
            recorded_at: Set(entry.recorded_at.into()),
        };

        checkpoint::Entity::insert(model)
            .on_conflict(
                OnConflict::columns([checkpoint::Column::JobId, checkpoint::Column::Url])
                    .update_columns([
                        checkpoint::Column::Outcome,
                        checkpoint::Column::Summary,
                        checkpoint::Column::RecordedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(self.db.as_ref())
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn clear(&self, job_id: Uuid, url: &str) -> Result<(), CheckpointError> {
        checkpoint::Entity::delete_many()
            .filter(Self::key_filter(job_id, url))
            .exec(self.db.as_ref())
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn clear_job(&self, job_id: Uuid) -> Result<u64, CheckpointError> {
        let result = checkpoint::Entity::delete_many()
            .filter(checkpoint::Column::JobId.eq(job_id))
            .exec(self.db.as_ref())
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected)
    }

    async fn flush(&self) -> Result<(), CheckpointError> {
        Ok(())
    }
}
