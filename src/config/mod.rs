use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;

/// LLM Provider类型
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub enum LLMProvider {
    #[serde(rename = "openai")]
    OpenAI,
    #[serde(rename = "deepseek")]
    DeepSeek,
    #[serde(rename = "anthropic")]
    Anthropic,
    #[serde(rename = "gemini")]
    #[default]
    Gemini,
    #[serde(rename = "ollama")]
    Ollama,
}

impl std::fmt::Display for LLMProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LLMProvider::OpenAI => write!(f, "openai"),
            LLMProvider::DeepSeek => write!(f, "deepseek"),
            LLMProvider::Anthropic => write!(f, "anthropic"),
            LLMProvider::Gemini => write!(f, "gemini"),
            LLMProvider::Ollama => write!(f, "ollama"),
        }
    }
}

impl std::str::FromStr for LLMProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(LLMProvider::OpenAI),
            "deepseek" => Ok(LLMProvider::DeepSeek),
            "anthropic" => Ok(LLMProvider::Anthropic),
            "gemini" => Ok(LLMProvider::Gemini),
            "ollama" => Ok(LLMProvider::Ollama),
            _ => Err(format!("Unknown provider: {}", s)),
        }
    }
}

/// 应用程序配置
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    /// LLM模型配置
    pub llm: LLMConfig,

    /// 搜索API配置（网页检索与图片检索）
    pub search: SearchApiConfig,

    /// 人物发现流程配置
    pub discovery: DiscoveryConfig,

    /// 缓存配置
    pub cache: CacheConfig,

    /// 是否启用详细日志
    pub verbose: bool,
}

/// LLM模型配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct LLMConfig {
    /// LLM Provider类型
    pub provider: LLMProvider,

    /// LLM API KEY
    pub api_key: String,

    /// LLM API基地址
    pub api_base_url: String,

    /// 高能效模型，用于属性提取、人物检索与调研等常规任务
    pub model_efficient: String,

    /// 高质量模型，用于长输入任务，以及作为efficient失效情况下的兜底
    pub model_powerful: String,

    /// 最大tokens
    pub max_tokens: u32,

    /// 温度
    pub temperature: f64,

    /// 重试次数
    pub retry_attempts: u32,

    /// 首次重试间隔（毫秒），之后按指数增长
    pub retry_delay_ms: u64,

    /// 重试间隔上限（毫秒）
    pub max_retry_delay_ms: u64,

    /// 抖动系数，实际抖动为 random(0, delay * jitter_factor)
    pub jitter_factor: f64,

    /// 遇到限流错误(429)时的额外延迟倍数
    pub rate_limit_delay_multiplier: f64,

    /// 单次请求超时时间（秒）
    pub timeout_seconds: u64,

    /// 检索增强调用中允许的最大工具轮数
    pub max_tool_turns: usize,

    /// 外部API的全局并发上限，两个扇出阶段共同受其约束
    pub max_parallels: usize,

    /// 每分钟请求数上限（滑动窗口）
    pub rate_limit_rpm: usize,
}

/// 搜索API配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct SearchApiConfig {
    /// Google Custom Search API KEY
    pub api_key: String,

    /// Google Custom Search Engine ID
    pub engine_id: String,

    /// 搜索API地址
    pub endpoint: String,

    /// 每次网页检索返回的结果数
    pub text_results: usize,

    /// 每次图片检索请求的候选数
    pub image_candidates: usize,

    /// 图片URL校验超时（秒）
    pub image_validation_timeout_seconds: u64,

    /// 图片URL校验并发数
    pub image_validation_parallels: usize,

    /// 搜索请求超时（秒）
    pub request_timeout_seconds: u64,
}

/// 人物发现流程配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// 每个人物的最大调研轮数
    pub max_research_attempts: u32,

    /// 采样的检索角度数量上限
    pub combination_count: usize,

    /// 每个检索角度的最少属性数
    pub min_attributes_per_combo: usize,

    /// 属性数量的指数衰减系数，P(n) ~ exp(-decay_rate * (n - min))
    pub decay_rate: f64,

    /// 在角度中附加兴趣的概率
    pub interest_probability: f64,

    /// 在角度中附加志向的概率
    pub aspiration_probability: f64,

    /// 在角度中附加随机职业的概率
    pub profession_probability: f64,

    /// 最大采样尝试次数 = combination_count * 该倍数
    pub sampling_retry_multiplier: usize,

    /// 每个检索角度请求的人物数
    pub figures_per_search: usize,

    /// 检索角度阶段的并发上限
    pub angle_parallels: usize,

    /// 人物调研阶段的并发上限
    pub person_parallels: usize,

    /// 单次外部调用超时（秒）
    pub call_timeout_seconds: u64,

    /// 单个人物整体调研超时（秒）
    pub item_timeout_seconds: u64,

    /// 语义查询的最低相似度
    pub min_similarity: f64,

    /// 立即返回的已有人物数量上限
    pub immediate_results_limit: usize,

    /// 是否重新调研已存储但未完整的人物
    pub retry_exhausted: bool,

    /// 命中搜索缓存后是否继续后台发现
    pub refresh_on_cache_hit: bool,

    /// 是否尝试从被拒绝的文本中挽回人名
    pub salvage_rejected_names: bool,
}

/// 缓存配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct CacheConfig {
    /// 是否启用缓存
    pub enabled: bool,

    /// 缓存目录
    pub cache_dir: PathBuf,

    /// 搜索缓存过期时间（小时）
    pub expire_hours: u64,

    /// 属性提取缓存过期时间（秒）
    pub facet_ttl_seconds: u64,

    /// 属性提取缓存最大条目数
    pub facet_max_entries: usize,
}

impl Config {
    /// 从文件加载配置
    pub fn from_file(path: &PathBuf) -> Result<Self> {
        let mut file =
            File::open(path).context(format!("Failed to open config file: {:?}", path))?;
        let mut content = String::new();
        file.read_to_string(&mut content)
            .context("Failed to read config file")?;

        let config: Config = toml::from_str(&content).context("Failed to parse config file")?;
        Ok(config)
    }
}

/// 两个扇出阶段的并发上限
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageCaps {
    pub angle: usize,
    pub person: usize,
}

impl DiscoveryConfig {
    /// 按全局并发上限共同核定两个阶段的并发数，各阶段至少为1且不超过上限
    pub fn stage_caps(&self, ceiling: usize) -> StageCaps {
        let ceiling = ceiling.max(1);
        StageCaps {
            angle: self.angle_parallels.clamp(1, ceiling),
            person: self.person_parallels.clamp(1, ceiling),
        }
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_seconds.max(1))
    }

    pub fn item_timeout(&self) -> Duration {
        Duration::from_secs(self.item_timeout_seconds.max(1))
    }
}

impl CacheConfig {
    pub fn facet_ttl(&self) -> Duration {
        Duration::from_secs(self.facet_ttl_seconds)
    }
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            provider: LLMProvider::default(),
            api_key: std::env::var("KINDRED_LLM_API_KEY").unwrap_or_default(),
            api_base_url: String::from("https://generativelanguage.googleapis.com"),
            model_efficient: String::from("gemini-2.5-flash"),
            model_powerful: String::from("gemini-2.5-pro"),
            max_tokens: 8192,
            temperature: 0.2,
            retry_attempts: 3,
            retry_delay_ms: 1000,
            max_retry_delay_ms: 30_000,
            jitter_factor: 0.1,
            rate_limit_delay_multiplier: 2.0,
            timeout_seconds: 120,
            max_tool_turns: 6,
            max_parallels: 8,
            rate_limit_rpm: 1000,
        }
    }
}

impl Default for SearchApiConfig {
    fn default() -> Self {
        Self {
            api_key: std::env::var("GOOGLE_CSE_API_KEY").unwrap_or_default(),
            engine_id: std::env::var("GOOGLE_CSE_ID").unwrap_or_default(),
            endpoint: String::from("https://www.googleapis.com/customsearch/v1"),
            text_results: 5,
            image_candidates: 10,
            image_validation_timeout_seconds: 5,
            image_validation_parallels: 5,
            request_timeout_seconds: 10,
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            max_research_attempts: 3,
            combination_count: 15,
            min_attributes_per_combo: 2,
            decay_rate: 0.7,
            interest_probability: 0.5,
            aspiration_probability: 0.5,
            profession_probability: 0.5,
            sampling_retry_multiplier: 3,
            figures_per_search: 3,
            angle_parallels: 3,
            person_parallels: 5,
            call_timeout_seconds: 180,
            item_timeout_seconds: 900,
            min_similarity: 0.2,
            immediate_results_limit: 100,
            retry_exhausted: false,
            refresh_on_cache_hit: false,
            salvage_rejected_names: true,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cache_dir: PathBuf::from(".kindred/cache"),
            expire_hours: 30 * 24,
            facet_ttl_seconds: 3600,
            facet_max_entries: 1000,
        }
    }
}

// Include tests
#[cfg(test)]
mod tests;
