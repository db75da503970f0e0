//! 网页检索工具 - 为检索增强生成提供Google Custom Search查询能力

use rig::tool::Tool;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::SearchApiConfig;

/// 记录一次调用中模型发出的所有检索查询
#[derive(Debug, Clone, Default)]
pub struct QueryRecorder {
    queries: Arc<Mutex<Vec<String>>>,
}

impl QueryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, query: &str) {
        if let Ok(mut queries) = self.queries.lock() {
            queries.push(query.to_string());
        }
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.queries
            .lock()
            .map(|queries| queries.clone())
            .unwrap_or_default()
    }
}

/// 网页检索工具
#[derive(Debug, Clone)]
pub struct AgentToolWebSearch {
    config: SearchApiConfig,
    http: reqwest::Client,
    recorder: QueryRecorder,
}

/// 检索参数
#[derive(Debug, Deserialize)]
pub struct WebSearchArgs {
    pub query: String,
}

/// 单条检索结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSearchHit {
    pub title: String,
    pub link: String,
    #[serde(default)]
    pub snippet: String,
}

/// 检索结果
#[derive(Debug, Serialize)]
pub struct WebSearchResult {
    pub query: String,
    pub hits: Vec<WebSearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<WebSearchHit>,
}

/// 网页检索工具错误
#[derive(Debug, thiserror::Error)]
pub enum WebSearchError {
    #[error("未配置搜索API密钥或搜索引擎ID")]
    NotConfigured,
    #[error("搜索请求失败: {0}")]
    Request(#[from] reqwest::Error),
}

impl AgentToolWebSearch {
    pub fn new(config: SearchApiConfig, http: reqwest::Client, recorder: QueryRecorder) -> Self {
        Self {
            config,
            http,
            recorder,
        }
    }

    async fn search(&self, query: &str) -> Result<Vec<WebSearchHit>, WebSearchError> {
        if self.config.api_key.is_empty() || self.config.engine_id.is_empty() {
            return Err(WebSearchError::NotConfigured);
        }

        let num = self.config.text_results.clamp(1, 10).to_string();
        let response: SearchResponse = self
            .http
            .get(&self.config.endpoint)
            .query(&[
                ("key", self.config.api_key.as_str()),
                ("cx", self.config.engine_id.as_str()),
                ("q", query),
                ("num", num.as_str()),
            ])
            .timeout(Duration::from_secs(self.config.request_timeout_seconds))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(response.items)
    }
}

impl Tool for AgentToolWebSearch {
    const NAME: &'static str = "web_search";

    type Error = WebSearchError;
    type Args = WebSearchArgs;
    type Output = WebSearchResult;

    async fn definition(&self, _prompt: String) -> rig::completion::ToolDefinition {
        rig::completion::ToolDefinition {
            name: Self::NAME.to_string(),
            description: "使用网页搜索查找可核实的资料，返回标题、链接与摘要。回答中的人名与事实必须以检索结果为依据。"
                .to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "搜索关键词"
                    }
                },
                "required": ["query"]
            }),
        }
    }

    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error> {
        tracing::debug!("   🔧 tool called...web_search@{}", args.query);
        self.recorder.record(&args.query);

        let hits = self.search(&args.query).await?;
        Ok(WebSearchResult {
            query: args.query,
            hits,
        })
    }
}
