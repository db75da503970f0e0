//! 集成测试共用的脚本化协作方

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use kindred_rs::config::Config;
use kindred_rs::discovery::DiscoveryContext;
use kindred_rs::error::GenerationError;
use kindred_rs::llm::client::{GenerationBackend, GroundedOutput, OutputSchema, PromptSpec};
use kindred_rs::llm::tools::image_search::{ImageQuery, ImageSearch};
use kindred_rs::store::{MemoryResultStore, ResultStore, ScoredFigure};
use kindred_rs::types::{Category, FigureStatus, HistoricalFigure, SocialModel};

pub const EXTRACTION: &str = "SocialModelExtraction";
pub const SEARCH: &str = "FigureSearchOutput";
pub const RESEARCH: &str = "ResearchFindings";
pub const SALVAGE: &str = "PersonNameExtraction";

type Handler = dyn Fn(&str, &PromptSpec) -> Result<Value, GenerationError> + Send + Sync;

/// 按输出结构名称应答的生成能力，记录每类调用次数
pub struct ScriptedBackend {
    handler: Box<Handler>,
    calls: Mutex<HashMap<String, usize>>,
    delays: HashMap<&'static str, Duration>,
    prompt_delays: Vec<(&'static str, Duration)>,
}

impl ScriptedBackend {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&str, &PromptSpec) -> Result<Value, GenerationError> + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
            calls: Mutex::new(HashMap::new()),
            delays: HashMap::new(),
            prompt_delays: Vec::new(),
        }
    }

    /// 某类调用在应答前先等待
    pub fn with_delay(mut self, schema: &'static str, delay: Duration) -> Self {
        self.delays.insert(schema, delay);
        self
    }

    /// 提示词中包含 `needle` 的调用在应答前先等待
    pub fn with_prompt_delay(mut self, needle: &'static str, delay: Duration) -> Self {
        self.prompt_delays.push((needle, delay));
        self
    }

    pub fn calls(&self, schema: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .get(schema)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    async fn respond(
        &self,
        prompt: &PromptSpec,
        schema: &OutputSchema,
    ) -> Result<Value, GenerationError> {
        {
            let mut calls = self.calls.lock().unwrap();
            *calls.entry(schema.name.to_string()).or_insert(0) += 1;
        }
        if let Some(delay) = self.delays.get(schema.name) {
            tokio::time::sleep(*delay).await;
        }
        for (needle, delay) in &self.prompt_delays {
            if prompt.user.contains(needle) {
                tokio::time::sleep(*delay).await;
            }
        }
        (self.handler)(schema.name, prompt)
    }
}

#[async_trait]
impl GenerationBackend for ScriptedBackend {
    async fn generate(
        &self,
        prompt: &PromptSpec,
        schema: &OutputSchema,
    ) -> Result<Value, GenerationError> {
        self.respond(prompt, schema).await
    }

    async fn generate_grounded(
        &self,
        prompt: &PromptSpec,
        schema: &OutputSchema,
    ) -> Result<GroundedOutput<Value>, GenerationError> {
        let value = self.respond(prompt, schema).await?;
        Ok(GroundedOutput {
            value,
            queries: vec![format!("{} grounding query", schema.name)],
        })
    }
}

/// 固定返回一张图片的图片检索
#[derive(Default)]
pub struct StaticImageSearch {
    pub lookups: AtomicUsize,
}

#[async_trait]
impl ImageSearch for StaticImageSearch {
    async fn find_image(&self, query: &ImageQuery) -> Result<Option<String>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(Some(format!(
            "https://images.example.org/{}.jpg",
            query.name.replace(' ', "_")
        )))
    }
}

/// 写入指定人物时失败的存储，其余操作交给内存存储
pub struct FailingStore {
    pub inner: MemoryResultStore,
    fail_on: &'static str,
}

impl FailingStore {
    pub fn new(fail_on: &'static str) -> Self {
        Self {
            inner: MemoryResultStore::new(),
            fail_on,
        }
    }
}

#[async_trait]
impl ResultStore for FailingStore {
    async fn exists(&self, name: &str) -> Result<bool> {
        self.inner.exists(name).await
    }

    async fn get(&self, name: &str) -> Result<Option<HistoricalFigure>> {
        self.inner.get(name).await
    }

    async fn put(&self, figure: &HistoricalFigure) -> Result<()> {
        if figure.name == self.fail_on {
            anyhow::bail!("写入 {} 失败: 存储不可用", figure.name);
        }
        self.inner.put(figure).await
    }

    async fn semantic_query(
        &self,
        facets: &[String],
        min_similarity: f64,
        limit: usize,
    ) -> Result<Vec<ScoredFigure>> {
        self.inner.semantic_query(facets, min_similarity, limit).await
    }
}

/// 测试配置：缓存写入临时目录，超时足够长
pub fn test_config(cache_dir: &Path) -> Config {
    let mut config = Config::default();
    config.cache.enabled = true;
    config.cache.cache_dir = cache_dir.to_path_buf();
    config.discovery.combination_count = 4;
    config.discovery.profession_probability = 0.0;
    config.discovery.call_timeout_seconds = 60;
    config.discovery.item_timeout_seconds = 120;
    config.discovery.salvage_rejected_names = false;
    config
}

pub fn context_with(
    config: Config,
    backend: Arc<ScriptedBackend>,
    images: Arc<dyn ImageSearch>,
    store: Arc<dyn ResultStore>,
) -> DiscoveryContext {
    DiscoveryContext::with_collaborators(config, backend, images, store)
}

/// 墨西哥裔神经科学家的社会画像
pub fn neuroscientist_extraction() -> Value {
    json!({
        "race": "",
        "ethnicity": "Mexican",
        "cultural_background": "Mexican American",
        "location": "Chicago, Illinois",
        "gender": "woman",
        "sexuality": "",
        "interests": "neuroscience",
        "aspirations": ""
    })
}

pub fn complete_findings() -> Value {
    json!({
        "race": [],
        "ethnicity": ["Mexican American"],
        "cultural_background": ["Mexican American"],
        "location": ["Los Angeles, California"],
        "gender": ["woman"],
        "sexuality": [],
        "interests": ["science"],
        "aspirations": [],
        "marginalization_context": "A Latina scientist in a field with few Latinas",
        "challenges_faced": "She faced skepticism from teachers.",
        "how_they_overcame": "She kept studying and found mentors.",
        "achievement": "Pioneering researcher and educator. Inspired generations."
    })
}

/// 只有成就、缺少人口学属性的调研结果
pub fn partial_findings() -> Value {
    json!({
        "achievement": "Wrote widely read essays.",
        "marginalization_context": null
    })
}

/// 标准应答：提取画像、每个角度返回两位人物、调研一次即完整
pub fn standard_backend(names: &'static str) -> ScriptedBackend {
    ScriptedBackend::new(move |schema, _prompt| match schema {
        EXTRACTION => Ok(neuroscientist_extraction()),
        SEARCH => Ok(json!({ "figure_names": names })),
        RESEARCH => Ok(complete_findings()),
        SALVAGE => Ok(json!({ "person_name": "" })),
        other => Err(GenerationError::Provider(format!("unexpected schema {}", other))),
    })
}

/// 一位已完整调研过的人物
pub fn complete_figure(name: &str, ethnicity: &str) -> HistoricalFigure {
    let mut figure = HistoricalFigure::stub(name);
    figure.demographics.push(Category::Ethnicity, ethnicity);
    figure.marginalization_context = "An immigrant scientist".to_string();
    figure.achievement = "Led a landmark study.".to_string();
    figure.status = FigureStatus::Complete;

    let mut tags = SocialModel::new();
    tags.push(Category::Ethnicity, ethnicity);
    figure.tags = tags;
    figure
}
