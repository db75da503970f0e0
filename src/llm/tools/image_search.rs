//! 人物图片检索 - Google图片搜索 + HEAD请求校验

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::config::SearchApiConfig;
use crate::types::HistoricalFigure;
use crate::utils::threads::do_parallel_with_limit;

const VALID_IMAGE_TYPES: [&str; 6] = [
    "image/jpeg",
    "image/jpg",
    "image/png",
    "image/gif",
    "image/webp",
    "image/bmp",
];

/// 消歧提示的最大长度
const HINT_MAX_CHARS: usize = 50;

/// 图片检索请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageQuery {
    pub name: String,
    /// 用于消歧的描述，例如成就的第一句
    pub hint: Option<String>,
}

impl ImageQuery {
    /// 根据档案构造检索请求：优先使用成就的首句片段，其次使用第一个兴趣
    pub fn for_figure(figure: &HistoricalFigure) -> Self {
        let achievement_hint = figure
            .achievement
            .split('.')
            .next()
            .map(|sentence| sentence.chars().take(HINT_MAX_CHARS).collect::<String>())
            .map(|sentence| sentence.trim().to_string())
            .filter(|sentence| !sentence.is_empty());

        let hint =
            achievement_hint.or_else(|| figure.demographics.interests.first().cloned());

        Self {
            name: figure.name.clone(),
            hint,
        }
    }

    pub fn query_text(&self) -> String {
        match &self.hint {
            Some(hint) => format!("{} {}", self.name, hint),
            None => self.name.clone(),
        }
    }
}

/// 图片检索能力
#[async_trait]
pub trait ImageSearch: Send + Sync {
    /// 返回第一张可访问的图片URL，找不到时返回None
    async fn find_image(&self, query: &ImageQuery) -> Result<Option<String>>;
}

#[derive(Debug, Deserialize)]
struct ImageSearchResponse {
    #[serde(default)]
    items: Vec<ImageItem>,
}

#[derive(Debug, Deserialize)]
struct ImageItem {
    link: Option<String>,
}

/// 基于Google Custom Search的图片检索
#[derive(Debug, Clone)]
pub struct GoogleImageSearch {
    config: SearchApiConfig,
    http: reqwest::Client,
}

impl GoogleImageSearch {
    pub fn new(config: SearchApiConfig, http: reqwest::Client) -> Self {
        Self { config, http }
    }

    async fn candidate_urls(&self, query: &str) -> Result<Vec<String>> {
        let num = self.config.image_candidates.clamp(1, 10).to_string();
        let response: ImageSearchResponse = self
            .http
            .get(&self.config.endpoint)
            .query(&[
                ("key", self.config.api_key.as_str()),
                ("cx", self.config.engine_id.as_str()),
                ("q", query),
                ("searchType", "image"),
                ("num", num.as_str()),
            ])
            .timeout(Duration::from_secs(self.config.request_timeout_seconds))
            .send()
            .await
            .context("图片搜索请求失败")?
            .error_for_status()
            .context("图片搜索返回错误状态")?
            .json()
            .await
            .context("图片搜索结果解析失败")?;

        Ok(response.items.into_iter().filter_map(|item| item.link).collect())
    }

    async fn validate_image_url(&self, url: &str) -> bool {
        let response = self
            .http
            .head(url)
            .timeout(Duration::from_secs(
                self.config.image_validation_timeout_seconds,
            ))
            .send()
            .await;

        match response {
            Ok(response) => {
                response.status() == reqwest::StatusCode::OK
                    && response
                        .headers()
                        .get(reqwest::header::CONTENT_TYPE)
                        .and_then(|value| value.to_str().ok())
                        .is_some_and(is_image_content_type)
            }
            Err(_) => false,
        }
    }
}

pub(crate) fn is_image_content_type(content_type: &str) -> bool {
    let content_type = content_type.to_lowercase();
    VALID_IMAGE_TYPES
        .iter()
        .any(|image_type| content_type.contains(image_type))
}

#[async_trait]
impl ImageSearch for GoogleImageSearch {
    async fn find_image(&self, query: &ImageQuery) -> Result<Option<String>> {
        if self.config.api_key.is_empty() || self.config.engine_id.is_empty() {
            tracing::debug!("⚠️ 未配置图片搜索API，跳过图片检索");
            return Ok(None);
        }

        let query_text = query.query_text();
        let candidates = self.candidate_urls(&query_text).await?;
        tracing::debug!("🖼️ [{}] 找到 {} 个候选图片", query_text, candidates.len());

        let checks: Vec<_> = candidates
            .iter()
            .map(|url| self.validate_image_url(url))
            .collect();
        let verdicts =
            do_parallel_with_limit(checks, self.config.image_validation_parallels).await;

        Ok(candidates
            .into_iter()
            .zip(verdicts)
            .find_map(|(url, valid)| valid.then_some(url)))
    }
}

/// 不做任何检索的实现，用于未配置搜索API的场景
#[derive(Debug, Clone, Default)]
pub struct NoImageSearch;

#[async_trait]
impl ImageSearch for NoImageSearch {
    async fn find_image(&self, _query: &ImageQuery) -> Result<Option<String>> {
        Ok(None)
    }
}
