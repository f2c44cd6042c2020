// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::utils::errors::OrchestratorError;
use crate::utils::url_utils::parse_seed_url;

/// 一条酒店种子
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Validate)]
pub struct HotelSeed {
    /// 外部系统中的酒店编号
    #[validate(length(min = 1, max = 128))]
    pub hotel_ref: Option<String>,
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    /// 规范化后的种子URL
    #[validate(url)]
    pub url: String,
}

impl HotelSeed {
    pub fn new(url: &str) -> Result<Self, OrchestratorError> {
        Self::build(None, None, url)
    }

    fn build(
        hotel_ref: Option<&str>,
        name: Option<&str>,
        url: &str,
    ) -> Result<Self, OrchestratorError> {
        let url = parse_seed_url(url).map_err(|e| {
            OrchestratorError::InvalidInput(format!("invalid URL '{}': {}", url, e))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(OrchestratorError::InvalidInput(format!(
                "unsupported scheme '{}' in {}",
                url.scheme(),
                url
            )));
        }
        let seed = Self {
            hotel_ref: non_empty(hotel_ref),
            name: non_empty(name),
            url: url.to_string(),
        };
        seed.validate()
            .map_err(|e| OrchestratorError::InvalidInput(e.to_string()))?;
        Ok(seed)
    }

    /// 解析种子文件中的一行
    ///
    /// 支持三种格式：裸域名或URL、`url,name`、`hotel_id,name,url`。
    /// 空行、`#` 注释和 `hotel_id` 开头的表头返回 `Ok(None)`。
    pub fn parse_line(line: &str) -> Result<Option<Self>, OrchestratorError> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(None);
        }
        if line.to_ascii_lowercase().starts_with("hotel_id") {
            return Ok(None);
        }

        let fields: Vec<&str> = line.splitn(3, ',').map(str::trim).collect();
        let seed = match fields.as_slice() {
            [url] => Self::build(None, None, url)?,
            [url, name] => Self::build(None, Some(name), url)?,
            [hotel_ref, name, url] => Self::build(Some(hotel_ref), Some(name), url)?,
            _ => return Ok(None),
        };
        Ok(Some(seed))
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(|v| v.trim().trim_matches('"').trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// 解析整份种子文件，错误信息带行号
pub fn parse_seeds(content: &str) -> Result<Vec<HotelSeed>, OrchestratorError> {
    let mut seeds = Vec::new();
    for (index, line) in content.lines().enumerate() {
        match HotelSeed::parse_line(line) {
            Ok(Some(seed)) => seeds.push(seed),
            Ok(None) => {}
            Err(e) => {
                return Err(OrchestratorError::InvalidInput(format!(
                    "line {}: {}",
                    index + 1,
                    e
                )))
            }
        }
    }
    Ok(seeds)
}
