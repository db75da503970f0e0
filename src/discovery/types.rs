use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::types::{HistoricalFigure, SearchAngle, SocialModel};

/// 调用方发起的发现请求
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscoveryRequest {
    pub description: String,
    /// 调用方已提取好的属性值
    #[serde(default)]
    pub precomputed_facets: Option<Vec<String>>,
    /// 调用方已提取好的社会画像，存在时跳过属性提取
    #[serde(default)]
    pub precomputed_social_model: Option<SocialModel>,
}

impl DiscoveryRequest {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Default::default()
        }
    }

    pub fn with_social_model(mut self, social_model: SocialModel, facets: Vec<String>) -> Self {
        self.precomputed_social_model = Some(social_model);
        self.precomputed_facets = Some(facets);
        self
    }
}

/// 本次响应的来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryStatus {
    #[default]
    Fresh,
    CacheHit,
}

/// 空结果的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyReason {
    /// 描述中没有可提取的身份信息
    NoIdentitySignal,
    /// 所有检索角度都失败了
    AllAnglesFailed,
    /// 检索角度成功但没有找到候选人物
    NoCandidates,
    /// 搜索缓存命中，但缓存的人物都已不在存储中
    CachedFiguresMissing,
}

impl EmptyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmptyReason::NoIdentitySignal => "no_identity_signal",
            EmptyReason::AllAnglesFailed => "all_angles_failed",
            EmptyReason::NoCandidates => "no_candidates",
            EmptyReason::CachedFiguresMissing => "cached_figures_missing",
        }
    }
}

/// 人物档案的来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FigureSource {
    /// 搜索缓存命中时从存储读取
    CacheHit,
    /// 发现开始前的语义检索结果
    Immediate,
    /// 本次运行发现、但存储中已有的档案
    Existing,
    /// 本次运行调研得到的档案
    Researched,
}

/// 一个可展示的人物档案
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FigureUpdate {
    pub figure: HistoricalFigure,
    pub source: FigureSource,
    /// 语义检索的相似度（仅 Immediate）
    pub score: Option<f64>,
}

/// 发现流程向调用方推送的事件
#[derive(Debug, Clone)]
pub enum DiscoveryEvent {
    /// 社会画像已就绪
    Extracted {
        social_model: SocialModel,
        facets: Vec<String>,
    },
    /// 检索角度采样完成
    AnglesSampled(Vec<SearchAngle>),
    /// 新的候选人物（仅含姓名的初始档案）
    Candidate {
        figure: HistoricalFigure,
        angle: String,
    },
    /// 一个人物档案可用
    Figure(FigureUpdate),
    /// 单个人物失败
    ItemFailed { name: String, reason: String },
    /// 运行结束
    Finished(DiscoverySummary),
    /// 运行终止
    Failed { reason: String },
}

/// 一次运行的汇总
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscoverySummary {
    pub run_id: Uuid,
    pub status: DiscoveryStatus,
    /// 请求指纹
    pub fingerprint: String,
    pub angles_total: usize,
    pub angles_failed: usize,
    pub candidates: usize,
    /// 完整的人物（含存储中已有的完整档案）
    pub succeeded: usize,
    /// 调研轮数耗尽、仅有部分数据的人物
    pub partial: usize,
    pub failed: usize,
    /// 因已被认领而跳过的人物
    pub skipped: usize,
    /// 存储中已有、未重新调研的人物
    pub existing: usize,
    /// 发现开始前立即返回的人物
    pub immediate: usize,
    /// 从被拒绝文本中挽回的人名
    pub salvaged: usize,
    pub empty_reason: Option<EmptyReason>,
    /// 按原因统计的人名拒绝数
    pub rejections: BTreeMap<String, usize>,
    pub timing_report: String,
}

impl DiscoverySummary {
    pub fn new(run_id: Uuid, fingerprint: String) -> Self {
        Self {
            run_id,
            fingerprint,
            ..Default::default()
        }
    }

    /// 本次运行产出的人物总数
    pub fn figures_total(&self) -> usize {
        self.succeeded + self.partial
    }
}

/// 收集完所有事件后的运行报告
#[derive(Debug, Clone, Default)]
pub struct DiscoveryReport {
    pub social_model: Option<SocialModel>,
    pub angles: Vec<SearchAngle>,
    pub candidates: Vec<String>,
    pub figures: Vec<FigureUpdate>,
    pub failures: Vec<(String, String)>,
    pub summary: Option<DiscoverySummary>,
    pub failure: Option<String>,
}

impl DiscoveryReport {
    /// 记录一个事件
    pub fn absorb(&mut self, event: DiscoveryEvent) {
        match event {
            DiscoveryEvent::Extracted { social_model, .. } => self.social_model = Some(social_model),
            DiscoveryEvent::AnglesSampled(angles) => self.angles = angles,
            DiscoveryEvent::Candidate { figure, .. } => self.candidates.push(figure.name),
            DiscoveryEvent::Figure(update) => self.figures.push(update),
            DiscoveryEvent::ItemFailed { name, reason } => self.failures.push((name, reason)),
            DiscoveryEvent::Finished(summary) => self.summary = Some(summary),
            DiscoveryEvent::Failed { reason } => self.failure = Some(reason),
        }
    }

    pub fn figure(&self, name: &str) -> Option<&HistoricalFigure> {
        self.figures
            .iter()
            .map(|update| &update.figure)
            .find(|figure| figure.name.eq_ignore_ascii_case(name))
    }

    pub fn status(&self) -> Option<DiscoveryStatus> {
        self.summary.as_ref().map(|summary| summary.status)
    }
}
