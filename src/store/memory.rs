use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

use crate::store::{ResultStore, ScoredFigure};
use crate::types::HistoricalFigure;
use crate::types::figure::doc_id_for;

/// 存储元数据
#[derive(Debug, Clone)]
pub struct StoreMetadata {
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    /// 每个文档的写入次数
    pub write_counts: HashMap<String, u64>,
    pub total_writes: u64,
}

impl Default for StoreMetadata {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreMetadata {
    pub fn new() -> Self {
        Self {
            created_at: Utc::now(),
            last_updated: Utc::now(),
            write_counts: HashMap::new(),
            total_writes: 0,
        }
    }
}

#[derive(Debug, Default)]
struct StoreState {
    figures: HashMap<String, HistoricalFigure>,
    metadata: StoreMetadata,
}

/// 进程内的人物档案存储
///
/// 语义检索使用简单的属性匹配打分：标签完全匹配（忽略大小写）计1.0，
/// 仅在叙述文本中出现计0.5，总分为各查询属性得分的平均值。
#[derive(Debug, Default)]
pub struct MemoryResultStore {
    state: RwLock<StoreState>,
}

impl MemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预置一批人物（标记为initial）
    pub async fn seed<I: IntoIterator<Item = HistoricalFigure>>(&self, figures: I) {
        let mut state = self.state.write().await;
        for mut figure in figures {
            figure.initial = true;
            state.figures.insert(figure.doc_id(), figure);
        }
    }

    /// 某个人物被写入的次数
    pub async fn write_count(&self, name: &str) -> u64 {
        let state = self.state.read().await;
        state
            .metadata
            .write_counts
            .get(&doc_id_for(name))
            .copied()
            .unwrap_or(0)
    }

    pub async fn total_writes(&self) -> u64 {
        self.state.read().await.metadata.total_writes
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.figures.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn metadata(&self) -> StoreMetadata {
        self.state.read().await.metadata.clone()
    }
}

fn score_figure(figure: &HistoricalFigure, facets: &[String]) -> (f64, BTreeMap<String, f64>) {
    let figure_facets: Vec<String> = figure.facets().iter().map(|f| f.to_lowercase()).collect();
    let text = figure.searchable_text().to_lowercase();

    let facet_scores: BTreeMap<String, f64> = facets
        .iter()
        .map(|facet| {
            let needle = facet.trim().to_lowercase();
            let score = if figure_facets.contains(&needle) {
                1.0
            } else if !needle.is_empty() && text.contains(&needle) {
                0.5
            } else {
                0.0
            };
            (facet.clone(), score)
        })
        .collect();

    let total = if facet_scores.is_empty() {
        0.0
    } else {
        facet_scores.values().sum::<f64>() / facet_scores.len() as f64
    };
    (total, facet_scores)
}

#[async_trait]
impl ResultStore for MemoryResultStore {
    async fn exists(&self, name: &str) -> Result<bool> {
        Ok(self
            .state
            .read()
            .await
            .figures
            .contains_key(&doc_id_for(name)))
    }

    async fn get(&self, name: &str) -> Result<Option<HistoricalFigure>> {
        Ok(self
            .state
            .read()
            .await
            .figures
            .get(&doc_id_for(name))
            .cloned())
    }

    async fn put(&self, figure: &HistoricalFigure) -> Result<()> {
        let mut state = self.state.write().await;
        let doc_id = figure.doc_id();

        *state.metadata.write_counts.entry(doc_id.clone()).or_insert(0) += 1;
        state.metadata.total_writes += 1;
        state.metadata.last_updated = Utc::now();
        state.figures.insert(doc_id, figure.clone());

        tracing::debug!("💾 已保存人物: {} ({} 个标签)", figure.name, figure.facets().len());
        Ok(())
    }

    async fn semantic_query(
        &self,
        facets: &[String],
        min_similarity: f64,
        limit: usize,
    ) -> Result<Vec<ScoredFigure>> {
        if facets.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let state = self.state.read().await;
        let mut results: Vec<ScoredFigure> = state
            .figures
            .values()
            .filter_map(|figure| {
                let (score, facet_scores) = score_figure(figure, facets);
                (score > 0.0 && score >= min_similarity).then(|| ScoredFigure {
                    figure: figure.clone(),
                    score,
                    facet_scores,
                })
            })
            .collect();

        results.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| b.figure.is_complete().cmp(&a.figure.is_complete()))
                .then_with(|| a.figure.name.cmp(&b.figure.name))
        });
        results.truncate(limit);
        Ok(results)
    }
}
