//! 人物档案存储边界

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::HistoricalFigure;

pub mod memory;
pub use memory::MemoryResultStore;

/// 带相似度分数的检索结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredFigure {
    pub figure: HistoricalFigure,
    /// 总体相似度（0-1）
    pub score: f64,
    /// 每个查询属性的相似度
    pub facet_scores: BTreeMap<String, f64>,
}

/// 人物档案存储
///
/// 存储自身负责并发一致性与索引；排序与阈值语义由具体实现定义。
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// 是否已存在该人物
    async fn exists(&self, name: &str) -> Result<bool>;

    /// 按姓名读取
    async fn get(&self, name: &str) -> Result<Option<HistoricalFigure>>;

    /// 写入或覆盖
    async fn put(&self, figure: &HistoricalFigure) -> Result<()>;

    /// 按属性值进行语义检索
    async fn semantic_query(
        &self,
        facets: &[String],
        min_similarity: f64,
        limit: usize,
    ) -> Result<Vec<ScoredFigure>>;
}
