use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::types::social_model::{Category, RawFacets, SocialModel, is_placeholder};

/// 人物档案的调研状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FigureStatus {
    /// 刚被检索发现，仅有姓名
    #[default]
    Stub,
    /// 必需字段齐全
    Complete,
    /// 调研轮数耗尽，仍缺少必需字段
    Exhausted,
}

/// 档案字段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FigureField {
    Demographics,
    MarginalizationContext,
    Achievement,
    ChallengesFaced,
    HowTheyOvercame,
}

impl FigureField {
    pub const REQUIRED: [FigureField; 3] = [
        FigureField::Demographics,
        FigureField::MarginalizationContext,
        FigureField::Achievement,
    ];

    pub const NARRATIVE: [FigureField; 2] =
        [FigureField::ChallengesFaced, FigureField::HowTheyOvercame];

    pub fn is_required(&self) -> bool {
        Self::REQUIRED.contains(self)
    }

    /// 提示词中使用的字段名
    pub fn label(&self) -> &'static str {
        match self {
            FigureField::Demographics => "demographics (race/ethnicity/cultural_background)",
            FigureField::MarginalizationContext => "marginalization_context",
            FigureField::Achievement => "achievement",
            FigureField::ChallengesFaced => "challenges_faced",
            FigureField::HowTheyOvercame => "how_they_overcame",
        }
    }
}

impl std::fmt::Display for FigureField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// 历史人物档案
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalFigure {
    /// 姓名，唯一键
    pub name: String,
    /// 调研得到的人物属性
    #[serde(default)]
    pub demographics: SocialModel,
    #[serde(default)]
    pub marginalization_context: String,
    #[serde(default)]
    pub achievement: String,
    #[serde(default)]
    pub challenges_faced: String,
    #[serde(default)]
    pub how_they_overcame: String,
    pub image_url: Option<String>,
    /// 用于语义匹配的属性标签
    #[serde(default)]
    pub tags: SocialModel,
    /// 检索时实际使用的查询（仅用于溯源）
    #[serde(default)]
    pub search_queries_used: Vec<String>,
    #[serde(default)]
    pub status: FigureStatus,
    /// 是否为预置人物
    #[serde(default)]
    pub initial: bool,
    pub created_at: DateTime<Utc>,
}

impl HistoricalFigure {
    /// 以姓名创建仅含姓名的初始档案
    pub fn stub(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            demographics: SocialModel::default(),
            marginalization_context: String::new(),
            achievement: String::new(),
            challenges_faced: String::new(),
            how_they_overcame: String::new(),
            image_url: None,
            tags: SocialModel::default(),
            search_queries_used: Vec::new(),
            status: FigureStatus::Stub,
            initial: false,
            created_at: Utc::now(),
        }
    }

    /// 完整性判定：人口学属性、边缘化背景与成就三者均非空
    pub fn is_complete(&self) -> bool {
        self.missing_required().is_empty()
    }

    /// 缺失的必需字段
    pub fn missing_required(&self) -> Vec<FigureField> {
        FigureField::REQUIRED
            .into_iter()
            .filter(|field| !self.has_field(*field))
            .collect()
    }

    /// 所有缺失字段（含可选的叙述字段），用于调研提示
    pub fn missing_fields(&self) -> Vec<FigureField> {
        FigureField::REQUIRED
            .into_iter()
            .chain(FigureField::NARRATIVE)
            .filter(|field| !self.has_field(*field))
            .collect()
    }

    fn has_field(&self, field: FigureField) -> bool {
        match field {
            FigureField::Demographics => self.demographics.has_demographics(),
            FigureField::MarginalizationContext => !self.marginalization_context.trim().is_empty(),
            FigureField::Achievement => !self.achievement.trim().is_empty(),
            FigureField::ChallengesFaced => !self.challenges_faced.trim().is_empty(),
            FigureField::HowTheyOvercame => !self.how_they_overcame.trim().is_empty(),
        }
    }

    /// 合并一次调研结果：只有非空的新值会覆盖已有值
    pub fn merge(&mut self, patch: FigurePatch) {
        for category in Category::ALL {
            self.demographics
                .replace_if_non_empty(category, patch.profile.values(category));
        }

        overwrite_if_filled(&mut self.marginalization_context, patch.marginalization_context);
        overwrite_if_filled(&mut self.achievement, patch.achievement);
        overwrite_if_filled(&mut self.challenges_faced, patch.challenges_faced);
        overwrite_if_filled(&mut self.how_they_overcame, patch.how_they_overcame);
    }

    /// 记录一条检索查询（去重）
    pub fn record_queries<I: IntoIterator<Item = String>>(&mut self, queries: I) {
        for query in queries {
            if !query.trim().is_empty() && !self.search_queries_used.contains(&query) {
                self.search_queries_used.push(query);
            }
        }
    }

    /// 扁平化的标签属性，供语义检索使用
    pub fn facets(&self) -> Vec<String> {
        self.tags.facets(true)
    }

    /// 叙述字段与标签拼接成的可检索文本
    pub fn searchable_text(&self) -> String {
        [
            self.marginalization_context.as_str(),
            self.challenges_faced.as_str(),
            self.how_they_overcame.as_str(),
            self.achievement.as_str(),
        ]
        .into_iter()
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .chain(self.facets())
        .collect::<Vec<_>>()
        .join(" ")
    }

    /// 存储层文档ID
    pub fn doc_id(&self) -> String {
        doc_id_for(&self.name)
    }
}

/// 由姓名推导文档ID
pub fn doc_id_for(name: &str) -> String {
    name.trim().replace(['/', '.'], "_")
}

fn overwrite_if_filled(target: &mut String, incoming: Option<String>) {
    if let Some(value) = incoming {
        let value = value.trim();
        if !is_placeholder(value) {
            *target = value.to_string();
        }
    }
}

/// 单次调研返回的增量字段
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FigurePatch {
    pub profile: SocialModel,
    pub marginalization_context: Option<String>,
    pub achievement: Option<String>,
    pub challenges_faced: Option<String>,
    pub how_they_overcame: Option<String>,
}

/// 调研调用的结构化输出
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ResearchFindings {
    /// 种族，例如 ["Black", "Mixed"]
    pub race: RawFacets,
    /// 民族，例如 ["Hispanic", "Irish"]
    pub ethnicity: RawFacets,
    /// 文化背景，例如 ["Bolivian", "New Yorker"]
    pub cultural_background: RawFacets,
    /// 相关地点，例如 ["Atlanta, Georgia"]
    pub location: RawFacets,
    /// 性别认同
    pub gender: RawFacets,
    /// 性取向
    pub sexuality: RawFacets,
    /// 兴趣
    pub interests: RawFacets,
    /// 推断出的目标、价值观与志向
    pub aspirations: RawFacets,
    /// 其边缘化身份的简要背景
    pub marginalization_context: Option<String>,
    /// 因身份或外部环境所面临的具体挑战（1-2段）
    pub challenges_faced: Option<String>,
    /// 如何应对、抵抗或克服这些挑战（1-2段）
    pub how_they_overcame: Option<String>,
    /// 主要成就与贡献（1-2段）
    pub achievement: Option<String>,
}

impl From<ResearchFindings> for FigurePatch {
    fn from(findings: ResearchFindings) -> Self {
        let mut profile = SocialModel::default();
        profile.extend(Category::Location, findings.location.into_locations());
        profile.extend(Category::Race, findings.race.into_values());
        profile.extend(Category::Ethnicity, findings.ethnicity.into_values());
        profile.extend(
            Category::CulturalBackground,
            findings.cultural_background.into_values(),
        );
        profile.extend(Category::Gender, findings.gender.into_values());
        profile.extend(Category::Sexuality, findings.sexuality.into_values());
        profile.extend(Category::Interests, findings.interests.into_values());
        profile.extend(Category::Aspirations, findings.aspirations.into_values());

        Self {
            profile,
            marginalization_context: findings.marginalization_context,
            achievement: findings.achievement,
            challenges_faced: findings.challenges_faced,
            how_they_overcame: findings.how_they_overcame,
        }
    }
}

/// 单个人物调研循环的状态
#[derive(Debug, Clone)]
pub struct ResearchAttempt {
    pub attempt: u32,
    pub budget: u32,
    pub missing: Vec<FigureField>,
    pub figure: HistoricalFigure,
}

impl ResearchAttempt {
    pub fn new(figure: HistoricalFigure, budget: u32) -> Self {
        let missing = figure.missing_fields();
        Self {
            attempt: 0,
            budget,
            missing,
            figure,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempt >= self.budget
    }

    /// 合并本轮结果（若有）并推进计数
    pub fn advance(&mut self, patch: Option<FigurePatch>) {
        if let Some(patch) = patch {
            self.figure.merge(patch);
        }
        self.attempt += 1;
        self.missing = self.figure.missing_fields();
    }
}
