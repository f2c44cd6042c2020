// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use std::collections::HashSet;
use url::Url;

use crate::domain::models::discovered_link::SocialNetwork;
use crate::utils::url_utils;

/// 从页面中提取的候选链接
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedLink {
    /// 规范化后的URL
    pub url: String,
    pub network: SocialNetwork,
}

/// 链接提取能力
///
/// 输入页面内容与页面地址，返回带平台标签的候选链接
pub trait LinkExtractor: Send + Sync {
    fn extract(&self, html: &str, page_url: &Url) -> Vec<ExtractedLink>;
}

static SOCIAL_PATTERNS: Lazy<Vec<(SocialNetwork, Regex)>> = Lazy::new(|| {
    [
        (SocialNetwork::Facebook, r"(?i)^(?:[a-z0-9-]+\.)*(?:facebook\.com|fb\.com)$"),
        (SocialNetwork::Instagram, r"(?i)^(?:[a-z0-9-]+\.)*instagram\.com$"),
        (SocialNetwork::X, r"(?i)^(?:[a-z0-9-]+\.)*(?:twitter\.com|x\.com)$"),
        (SocialNetwork::Youtube, r"(?i)^(?:[a-z0-9-]+\.)*(?:youtube\.com|youtu\.be)$"),
        (SocialNetwork::Tiktok, r"(?i)^(?:[a-z0-9-]+\.)*tiktok\.com$"),
        (SocialNetwork::Linkedin, r"(?i)^(?:[a-z0-9-]+\.)*linkedin\.com$"),
    ]
    .into_iter()
    .map(|(network, pattern)| (network, Regex::new(pattern).expect("Failed to compile social pattern")))
    .collect()
});

static ANCHOR_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href]").expect("Failed to compile anchor selector"));

/// 根据主机名判断社交平台
pub fn classify(url: &Url) -> Option<SocialNetwork> {
    let host = url.host_str()?;
    SOCIAL_PATTERNS
        .iter()
        .find(|(_, re)| re.is_match(host))
        .map(|(network, _)| *network)
}

/// 默认的社交链接提取器
///
/// 遍历 `a[href]`，规范化后按主机名归类，去重并保持出现顺序
#[derive(Debug, Default, Clone)]
pub struct SocialLinkExtractor;

impl LinkExtractor for SocialLinkExtractor {
    fn extract(&self, html: &str, page_url: &Url) -> Vec<ExtractedLink> {
        let document = Html::parse_document(html);
        let mut seen = HashSet::new();
        let mut links = Vec::new();

        for anchor in document.select(&ANCHOR_SELECTOR) {
            let Some(href) = anchor.value().attr("href") else {
                continue;
            };
            let Some(url) = url_utils::normalize_url(href, page_url) else {
                continue;
            };
            let Some(network) = classify(&url) else {
                continue;
            };
            let url = url.to_string();
            if seen.insert(url.clone()) {
                links.push(ExtractedLink { url, network });
            }
        }

        links
    }
}
