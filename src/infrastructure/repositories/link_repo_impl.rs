// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::discovered_link::DiscoveredLink;
use crate::domain::repositories::link_repository::LinkRepository;
use crate::infrastructure::database::entities::discovered_link;
use crate::utils::errors::RepositoryError;
use async_trait::async_trait;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::*;
use std::sync::Arc;
use uuid::Uuid;

/// 社交链接仓库实现
pub struct LinkRepositoryImpl {
    db: Arc<DatabaseConnection>,
}

impl LinkRepositoryImpl {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

impl TryFrom<discovered_link::Model> for DiscoveredLink {
    type Error = RepositoryError;

    fn try_from(m: discovered_link::Model) -> Result<Self, Self::Error> {
        let network = m
            .network
            .parse()
            .map_err(|e| RepositoryError::Corrupt(format!("link {}: {}", m.id, e)))?;
        Ok(Self {
            id: m.id,
            job_id: m.job_id,
            url: m.url,
            network,
            source_url: m.source_url,
            last_seen: m.last_seen.into(),
            is_active: m.is_active,
        })
    }
}

#[async_trait]
impl LinkRepository for LinkRepositoryImpl {
    async fn upsert_links(&self, links: &[DiscoveredLink]) -> Result<(), RepositoryError> {
        if links.is_empty() {
            return Ok(());
        }

        let models = links.iter().map(|link| discovered_link::ActiveModel {
            id: Set(link.id),
            job_id: Set(link.job_id),
            url: Set(link.url.clone()),
            network: Set(link.network.to_string()),
            source_url: Set(link.source_url.clone()),
            last_seen: Set(link.last_seen.into()),
            is_active: Set(link.is_active),
        });

        discovered_link::Entity::insert_many(models)
            .on_conflict(
                OnConflict::columns([
                    discovered_link::Column::JobId,
                    discovered_link::Column::Url,
                ])
                .update_columns([
                    discovered_link::Column::Network,
                    discovered_link::Column::SourceUrl,
                    discovered_link::Column::LastSeen,
                    discovered_link::Column::IsActive,
                ])
                .to_owned(),
            )
            .exec_without_returning(self.db.as_ref())
            .await?;
        Ok(())
    }

    async fn deactivate_missing(
        &self,
        job_id: Uuid,
        source_url: &str,
        present: &[String],
    ) -> Result<u64, RepositoryError> {
        let mut query = discovered_link::Entity::update_many()
            .col_expr(discovered_link::Column::IsActive, Expr::value(false))
            .filter(discovered_link::Column::JobId.eq(job_id))
            .filter(discovered_link::Column::SourceUrl.eq(source_url))
            .filter(discovered_link::Column::IsActive.eq(true));
        if !present.is_empty() {
            query = query.filter(discovered_link::Column::Url.is_not_in(present.iter().cloned()));
        }

        let result = query.exec(self.db.as_ref()).await?;
        Ok(result.rows_affected)
    }

    async fn list_by_job(&self, job_id: Uuid) -> Result<Vec<DiscoveredLink>, RepositoryError> {
        discovered_link::Entity::find()
            .filter(discovered_link::Column::JobId.eq(job_id))
            .order_by_asc(discovered_link::Column::Network)
            .order_by_asc(discovered_link::Column::Url)
            .all(self.db.as_ref())
            .await?
            .into_iter()
            .map(DiscoveredLink::try_from)
            .collect()
    }
}
