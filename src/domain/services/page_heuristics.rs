// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use once_cell::sync::Lazy;
use regex::Regex;

/// 页面启发式判断
///
/// 决定是否需要渲染升级，以及页面是否为验证码拦截页
pub trait PageInspector: Send + Sync {
    /// 页面是否依赖 JavaScript 渲染内容
    fn is_js_heavy(&self, body: &str) -> bool;
    /// 页面是否为验证码拦截页
    fn looks_like_captcha(&self, body: &str) -> bool;
}

static SCRIPT_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<script\b").expect("valid regex"));
static ANCHOR_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<a\s").expect("valid regex"));
static CAPTCHA_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)captcha|cf-challenge|challenge-platform|are you a robot|verify you are human")
        .expect("valid regex")
});

/// 默认阈值实现
#[derive(Debug, Clone)]
pub struct DefaultPageInspector {
    /// 小于该长度的页面视为空壳
    pub min_body_len: usize,
    /// 脚本数超过该值且链接很少时视为 JS 页面
    pub max_scripts: usize,
    /// 链接数下限
    pub min_anchors: usize,
}

impl Default for DefaultPageInspector {
    fn default() -> Self {
        Self {
            min_body_len: 2000,
            max_scripts: 20,
            min_anchors: 5,
        }
    }
}

impl PageInspector for DefaultPageInspector {
    fn is_js_heavy(&self, body: &str) -> bool {
        if body.trim().is_empty() || body.len() < self.min_body_len {
            return true;
        }
        let scripts = SCRIPT_TAG.find_iter(body).count();
        let anchors = ANCHOR_TAG.find_iter(body).count();
        scripts > self.max_scripts && anchors < self.min_anchors
    }

    /// 只有出现验证码标记且页面几乎没有链接时才判定为拦截页，
    /// 表单里嵌了验证码组件的正常页面不算
    fn looks_like_captcha(&self, body: &str) -> bool {
        CAPTCHA_MARKER.is_match(body) && ANCHOR_TAG.find_iter(body).count() < self.min_anchors
    }
}
