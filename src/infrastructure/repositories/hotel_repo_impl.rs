// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::hotel::Hotel;
use crate::domain::repositories::hotel_repository::HotelRepository;
use crate::infrastructure::database::entities::hotel as hotel_entity;
use crate::utils::errors::RepositoryError;
use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::*;
use std::sync::Arc;
use uuid::Uuid;

/// 酒店仓库实现
pub struct HotelRepositoryImpl {
    db: Arc<DatabaseConnection>,
}

impl HotelRepositoryImpl {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    async fn find_by_domain(&self, domain: &str) -> Result<Option<Hotel>, RepositoryError> {
        let model = hotel_entity::Entity::find()
            .filter(hotel_entity::Column::Domain.eq(domain))
            .one(self.db.as_ref())
            .await?;
        Ok(model.map(Hotel::from))
    }
}

impl From<hotel_entity::Model> for Hotel {
    fn from(m: hotel_entity::Model) -> Self {
        Self {
            id: m.id,
            domain: m.domain,
            name: m.name,
            created_at: m.created_at.into(),
            updated_at: m.updated_at.into(),
        }
    }
}

#[async_trait]
impl HotelRepository for HotelRepositoryImpl {
    async fn upsert_by_domain(
        &self,
        domain: &str,
        name: Option<&str>,
    ) -> Result<Hotel, RepositoryError> {
        if let Some(existing) = self.find_by_domain(domain).await? {
            return match name {
                Some(name) if existing.name.as_deref() != Some(name) => {
                    let model = hotel_entity::ActiveModel {
                        id: Unchanged(existing.id),
                        name: Set(Some(name.to_string())),
                        updated_at: Set(Utc::now().into()),
                        ..Default::default()
                    };
                    let updated = model.update(self.db.as_ref()).await?;
                    Ok(updated.into())
                }
                _ => Ok(existing),
            };
        }

        let hotel = Hotel::new(domain, name.map(str::to_string));
        let model = hotel_entity::ActiveModel {
            id: Set(hotel.id),
            domain: Set(hotel.domain.clone()),
            name: Set(hotel.name.clone()),
            created_at: Set(hotel.created_at.into()),
            updated_at: Set(hotel.updated_at.into()),
        };
        // 并发提交同一域名时以先写入者为准
        hotel_entity::Entity::insert(model)
            .on_conflict(
                OnConflict::column(hotel_entity::Column::Domain)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(self.db.as_ref())
            .await?;

        self.find_by_domain(domain)
            .await?
            .ok_or(RepositoryError::NotFound)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Hotel>, RepositoryError> {
        let model = hotel_entity::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await?;
        Ok(model.map(Hotel::from))
    }
}
