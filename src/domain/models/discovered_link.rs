// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::crawl_job::DomainError;

/// 发现的社交媒体链接
///
/// 对同一任务 `(job_id, url)` 唯一；再次发现时更新 `last_seen` 并重新激活
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveredLink {
    pub id: Uuid,
    pub job_id: Uuid,
    /// 规范化后的链接
    pub url: String,
    pub network: SocialNetwork,
    /// 发现该链接的页面
    pub source_url: String,
    pub last_seen: DateTime<Utc>,
    pub is_active: bool,
}

/// 社交平台
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SocialNetwork {
    Facebook,
    Instagram,
    X,
    Youtube,
    Tiktok,
    Linkedin,
}

impl SocialNetwork {
    pub fn as_str(&self) -> &'static str {
        match self {
            SocialNetwork::Facebook => "facebook",
            SocialNetwork::Instagram => "instagram",
            SocialNetwork::X => "x",
            SocialNetwork::Youtube => "youtube",
            SocialNetwork::Tiktok => "tiktok",
            SocialNetwork::Linkedin => "linkedin",
        }
    }
}

impl fmt::Display for SocialNetwork {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SocialNetwork {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "facebook" => Ok(SocialNetwork::Facebook),
            "instagram" => Ok(SocialNetwork::Instagram),
            "x" | "twitter" => Ok(SocialNetwork::X),
            "youtube" => Ok(SocialNetwork::Youtube),
            "tiktok" => Ok(SocialNetwork::Tiktok),
            "linkedin" => Ok(SocialNetwork::Linkedin),
            other => Err(DomainError::UnknownValue(other.to_string())),
        }
    }
}

impl DiscoveredLink {
    pub fn new(job_id: Uuid, url: String, network: SocialNetwork, source_url: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_id,
            url,
            network,
            source_url,
            last_seen: Utc::now(),
            is_active: true,
        }
    }
}
