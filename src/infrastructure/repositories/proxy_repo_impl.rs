// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::proxy::Proxy;
use crate::domain::repositories::proxy_repository::ProxyRepository;
use crate::infrastructure::database::entities::proxy as proxy_entity;
use crate::utils::errors::RepositoryError;
use async_trait::async_trait;
use sea_orm::sea_query::OnConflict;
use sea_orm::*;
use std::sync::Arc;

/// 代理池仓库实现
pub struct ProxyRepositoryImpl {
    db: Arc<DatabaseConnection>,
}

impl ProxyRepositoryImpl {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

fn active_model(proxy: &Proxy) -> proxy_entity::ActiveModel {
    proxy_entity::ActiveModel {
        endpoint: Set(proxy.endpoint.clone()),
        health: Set(proxy.health.to_string()),
        consecutive_failures: Set(i32::try_from(proxy.consecutive_failures).unwrap_or(i32::MAX)),
        last_used_at: Set(proxy.last_used_at.map(Into::into)),
        quarantined_until: Set(proxy.quarantined_until.map(Into::into)),
    }
}

#[async_trait]
impl ProxyRepository for ProxyRepositoryImpl {
    async fn insert_endpoints(&self, endpoints: &[String]) -> Result<u64, RepositoryError> {
        if endpoints.is_empty() {
            return Ok(0);
        }

        let models = endpoints.iter().map(|e| active_model(&Proxy::new(e.clone())));
        let inserted = proxy_entity::Entity::insert_many(models)
            .on_conflict(
                OnConflict::column(proxy_entity::Column::Endpoint)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(self.db.as_ref())
            .await?;
        Ok(inserted)
    }

    async fn list_all(&self) -> Result<Vec<Proxy>, RepositoryError> {
        proxy_entity::Entity::find()
            .order_by_asc(proxy_entity::Column::Endpoint)
            .all(self.db.as_ref())
            .await?
            .into_iter()
            .map(|m| {
                let health = m.health.parse().map_err(|e| {
                    RepositoryError::Corrupt(format!("proxy {}: {}", m.endpoint, e))
                })?;
                Ok(Proxy {
                    endpoint: m.endpoint,
                    health,
                    consecutive_failures: u32::try_from(m.consecutive_failures).unwrap_or(0),
                    last_used_at: m.last_used_at.map(Into::into),
                    quarantined_until: m.quarantined_until.map(Into::into),
                })
            })
            .collect()
    }

    async fn save_states(&self, proxies: &[Proxy]) -> Result<(), RepositoryError> {
        if proxies.is_empty() {
            return Ok(());
        }

        proxy_entity::Entity::insert_many(proxies.iter().map(active_model))
            .on_conflict(
                OnConflict::column(proxy_entity::Column::Endpoint)
                    .update_columns([
                        proxy_entity::Column::Health,
                        proxy_entity::Column::ConsecutiveFailures,
                        proxy_entity::Column::LastUsedAt,
                        proxy_entity::Column::QuarantinedUntil,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(self.db.as_ref())
            .await?;
        Ok(())
    }
}
