use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::LazyLock;

/// 社会画像的固定类别
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Race,
    Ethnicity,
    CulturalBackground,
    Location,
    Gender,
    Sexuality,
    Interests,
    Aspirations,
}

impl Category {
    pub const ALL: [Category; 8] = [
        Category::Race,
        Category::Ethnicity,
        Category::CulturalBackground,
        Category::Location,
        Category::Gender,
        Category::Sexuality,
        Category::Interests,
        Category::Aspirations,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Race => "race",
            Category::Ethnicity => "ethnicity",
            Category::CulturalBackground => "cultural_background",
            Category::Location => "location",
            Category::Gender => "gender",
            Category::Sexuality => "sexuality",
            Category::Interests => "interests",
            Category::Aspirations => "aspirations",
        }
    }

    /// 身份类别（不含兴趣与志向）
    pub fn is_identity(&self) -> bool {
        !self.is_goal()
    }

    /// 兴趣与志向
    pub fn is_goal(&self) -> bool {
        matches!(self, Category::Interests | Category::Aspirations)
    }

    /// 参与完整性判定的人口学类别
    pub fn is_demographic(&self) -> bool {
        matches!(
            self,
            Category::Race | Category::Ethnicity | Category::CulturalBackground
        )
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|category| category.as_str() == s.trim().to_lowercase())
            .ok_or_else(|| format!("Unknown category: {}", s))
    }
}

/// 社会画像：固定类别到有序属性值的映射
///
/// 每个类别始终存在（可能为空），同一类别内按大小写不敏感去重，保留首次出现的写法与顺序。
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct SocialModel {
    pub race: Vec<String>,
    pub ethnicity: Vec<String>,
    pub cultural_background: Vec<String>,
    pub location: Vec<String>,
    pub gender: Vec<String>,
    pub sexuality: Vec<String>,
    pub interests: Vec<String>,
    pub aspirations: Vec<String>,
}

impl SocialModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取某一类别的属性值
    pub fn values(&self, category: Category) -> &[String] {
        match category {
            Category::Race => &self.race,
            Category::Ethnicity => &self.ethnicity,
            Category::CulturalBackground => &self.cultural_background,
            Category::Location => &self.location,
            Category::Gender => &self.gender,
            Category::Sexuality => &self.sexuality,
            Category::Interests => &self.interests,
            Category::Aspirations => &self.aspirations,
        }
    }

    fn values_mut(&mut self, category: Category) -> &mut Vec<String> {
        match category {
            Category::Race => &mut self.race,
            Category::Ethnicity => &mut self.ethnicity,
            Category::CulturalBackground => &mut self.cultural_background,
            Category::Location => &mut self.location,
            Category::Gender => &mut self.gender,
            Category::Sexuality => &mut self.sexuality,
            Category::Interests => &mut self.interests,
            Category::Aspirations => &mut self.aspirations,
        }
    }

    /// 追加一个属性值，已存在（忽略大小写）时返回false
    pub fn push(&mut self, category: Category, value: &str) -> bool {
        let Some(value) = normalize_facet(value) else {
            return false;
        };
        let values = self.values_mut(category);
        if values.iter().any(|v| v.eq_ignore_ascii_case(&value)) {
            return false;
        }
        values.push(value);
        true
    }

    pub fn extend<I, S>(&mut self, category: Category, values: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for value in values {
            self.push(category, value.as_ref());
        }
    }

    /// 用非空的新值整体替换某一类别，新值为空时保持原值
    pub fn replace_if_non_empty(&mut self, category: Category, values: &[String]) {
        let mut incoming = SocialModel::new();
        incoming.extend(category, values);
        if !incoming.values(category).is_empty() {
            *self.values_mut(category) = incoming.values(category).to_vec();
        }
    }

    /// 合并另一个画像的所有类别
    pub fn union(&mut self, other: &SocialModel) {
        for category in Category::ALL {
            self.extend(category, other.values(category));
        }
    }

    pub fn is_empty(&self) -> bool {
        Category::ALL
            .iter()
            .all(|category| self.values(*category).is_empty())
    }

    /// 至少含有一个值的类别
    pub fn non_empty_categories(&self) -> Vec<Category> {
        Category::ALL
            .into_iter()
            .filter(|category| !self.values(*category).is_empty())
            .collect()
    }

    /// 是否具备至少一个人口学属性（race / ethnicity / cultural_background）
    pub fn has_demographics(&self) -> bool {
        Category::ALL
            .iter()
            .filter(|category| category.is_demographic())
            .any(|category| !self.values(*category).is_empty())
    }

    /// 扁平化的属性列表，忽略大小写去重
    pub fn facets(&self, include_goals: bool) -> Vec<String> {
        let mut seen = HashSet::new();
        Category::ALL
            .into_iter()
            .filter(|category| include_goals || category.is_identity())
            .flat_map(|category| self.values(category).iter())
            .filter(|value| seen.insert(value.to_lowercase()))
            .cloned()
            .collect()
    }

    /// 兴趣与志向
    pub fn goals(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.interests
            .iter()
            .chain(self.aspirations.iter())
            .filter(|value| seen.insert(value.to_lowercase()))
            .cloned()
            .collect()
    }
}

impl std::fmt::Display for SocialModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let lines: Vec<String> = self
            .non_empty_categories()
            .into_iter()
            .map(|category| {
                let values = self.values(category);
                format!("{} ({}): {}", category, values.len(), values.join(", "))
            })
            .collect();
        write!(f, "{}", lines.join("\n"))
    }
}

/// 模型输出中被视为“未提及”的占位值
pub const PLACEHOLDER_VALUES: [&str; 6] = [
    "none",
    "n/a",
    "not specified",
    "not mentioned",
    "unknown",
    "unspecified",
];

static PARENTHETICAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\([^)]*\)").expect("valid parenthetical regex"));

/// 判断是否为占位值
pub fn is_placeholder(value: &str) -> bool {
    let lower = value.trim().to_lowercase();
    lower.is_empty() || PLACEHOLDER_VALUES.contains(&lower.as_str())
}

/// 清理单个属性值：去除首尾空白与结尾标点，过滤占位值
pub fn normalize_facet(value: &str) -> Option<String> {
    let value = value
        .trim()
        .trim_end_matches(['.', ',', ':', ';', '!', '?'])
        .trim();
    if is_placeholder(value) {
        return None;
    }
    Some(value.to_string())
}

/// 将模型返回的属性文本拆分为独立的属性值
///
/// 依次按 `|` `;` `,` `/` 拆分，去掉括号说明，过滤占位值，并按大小写不敏感去重。
pub fn split_facets<I, S>(raw_items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    let mut result = Vec::new();

    for item in raw_items {
        let item = item.as_ref().trim();
        let item = strip_list_literal(item);
        let item = PARENTHETICAL.replace_all(item, "");

        for value in item.split(['|', ';', ',', '/']) {
            let value = value.replace(['(', ')', '[', ']', '"', '\''], "");
            if let Some(normalized) = normalize_facet(&value)
                && seen.insert(normalized.to_lowercase())
            {
                result.push(normalized);
            }
        }
    }

    result
}

/// 去掉形如 "['a', 'b']" 的列表字面量外壳
fn strip_list_literal(item: &str) -> &str {
    item.strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .unwrap_or(item)
}

/// 模型输出的属性字段，兼容单个字符串与字符串列表两种形态
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum RawFacets {
    Text(String),
    List(Vec<String>),
}

impl Default for RawFacets {
    fn default() -> Self {
        RawFacets::List(Vec::new())
    }
}

impl RawFacets {
    pub fn into_values(self) -> Vec<String> {
        match self {
            RawFacets::Text(text) => split_facets([text]),
            RawFacets::List(items) => split_facets(items),
        }
    }

    /// 地点只按 `|` `;` 拆分，保留 "Atlanta, Georgia" 这类写法
    pub fn into_locations(self) -> Vec<String> {
        let items = match self {
            RawFacets::List(items) => items,
            RawFacets::Text(text) => text.split(['|', ';']).map(str::to_string).collect(),
        };
        let mut seen = HashSet::new();
        items
            .iter()
            .filter_map(|item| normalize_facet(&PARENTHETICAL.replace_all(item, "")))
            .filter(|value| seen.insert(value.to_lowercase()))
            .collect()
    }

    /// 原样拼接为 `|` 分隔的文本
    pub fn into_text(self) -> String {
        match self {
            RawFacets::Text(text) => text,
            RawFacets::List(items) => items.join("|"),
        }
    }
}
