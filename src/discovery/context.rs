use std::sync::Arc;

use anyhow::Result;

use crate::{
    cache::{CacheManager, FacetCache},
    config::{Config, StageCaps},
    error::DiscoveryError,
    llm::client::{GenerationBackend, LLMClient},
    llm::tools::image_search::{GoogleImageSearch, ImageSearch},
    store::ResultStore,
    types::SocialModel,
    utils::coalesce::RequestCoalescer,
};

/// 发现流程上下文：配置与所有外部协作方
#[derive(Clone)]
pub struct DiscoveryContext {
    /// 配置
    pub config: Config,
    /// 结构化生成能力
    pub backend: Arc<dyn GenerationBackend>,
    /// 图片检索能力
    pub images: Arc<dyn ImageSearch>,
    /// 人物档案存储
    pub store: Arc<dyn ResultStore>,
    /// 搜索缓存管理器
    pub cache_manager: Arc<CacheManager>,
    /// 属性提取结果缓存
    pub facet_cache: Arc<FacetCache>,
    /// 相同描述的并发提取合并
    pub extractions: Arc<RequestCoalescer<SocialModel, DiscoveryError>>,
    /// 两个扇出阶段的并发上限
    pub stage_caps: StageCaps,
}

impl DiscoveryContext {
    /// 使用配置中的模型服务与图片检索创建上下文
    pub fn new(config: Config, store: Arc<dyn ResultStore>) -> Result<Self> {
        let llm_client = LLMClient::new(config.clone())?;
        let images = GoogleImageSearch::new(config.search.clone(), reqwest::Client::new());
        Ok(Self::with_collaborators(
            config,
            Arc::new(llm_client),
            Arc::new(images),
            store,
        ))
    }

    /// 使用外部提供的协作方创建上下文
    pub fn with_collaborators(
        config: Config,
        backend: Arc<dyn GenerationBackend>,
        images: Arc<dyn ImageSearch>,
        store: Arc<dyn ResultStore>,
    ) -> Self {
        let cache_manager = Arc::new(CacheManager::new(config.cache.clone()));
        let facet_cache = Arc::new(FacetCache::from_config(&config.cache));
        let stage_caps = config.discovery.stage_caps(config.llm.max_parallels);

        Self {
            config,
            backend,
            images,
            store,
            cache_manager,
            facet_cache,
            extractions: Arc::new(RequestCoalescer::new()),
            stage_caps,
        }
    }
}
