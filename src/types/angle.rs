use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::social_model::Category;

/// 检索角度中的属性键
///
/// 变体顺序即标签渲染的优先级顺序。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AngleKey {
    Race,
    Ethnicity,
    CulturalBackground,
    Location,
    Gender,
    Sexuality,
    Profession,
    Interest,
    Aspiration,
}

impl AngleKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            AngleKey::Race => "race",
            AngleKey::Ethnicity => "ethnicity",
            AngleKey::CulturalBackground => "cultural_background",
            AngleKey::Location => "location",
            AngleKey::Gender => "gender",
            AngleKey::Sexuality => "sexuality",
            AngleKey::Profession => "profession",
            AngleKey::Interest => "interest",
            AngleKey::Aspiration => "aspiration",
        }
    }

    /// 对应的社会画像类别，职业不来自画像
    pub fn category(&self) -> Option<Category> {
        match self {
            AngleKey::Race => Some(Category::Race),
            AngleKey::Ethnicity => Some(Category::Ethnicity),
            AngleKey::CulturalBackground => Some(Category::CulturalBackground),
            AngleKey::Location => Some(Category::Location),
            AngleKey::Gender => Some(Category::Gender),
            AngleKey::Sexuality => Some(Category::Sexuality),
            AngleKey::Profession => None,
            AngleKey::Interest => Some(Category::Interests),
            AngleKey::Aspiration => Some(Category::Aspirations),
        }
    }

    pub fn from_category(category: Category) -> Self {
        match category {
            Category::Race => AngleKey::Race,
            Category::Ethnicity => AngleKey::Ethnicity,
            Category::CulturalBackground => AngleKey::CulturalBackground,
            Category::Location => AngleKey::Location,
            Category::Gender => AngleKey::Gender,
            Category::Sexuality => AngleKey::Sexuality,
            Category::Interests => AngleKey::Interest,
            Category::Aspirations => AngleKey::Aspiration,
        }
    }
}

/// 检索角度：用于一次人物检索的属性子集
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchAngle {
    /// 按优先级顺序渲染的可读标签，同时作为去重键
    pub label: String,
    pub attributes: BTreeMap<AngleKey, String>,
}

impl SearchAngle {
    pub fn new(attributes: BTreeMap<AngleKey, String>) -> Self {
        let label = Self::render_label(&attributes);
        Self { label, attributes }
    }

    pub fn render_label(attributes: &BTreeMap<AngleKey, String>) -> String {
        attributes
            .values()
            .map(|value| value.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// 是否覆盖了某一画像类别
    pub fn covers(&self, category: Category) -> bool {
        self.attributes
            .keys()
            .any(|key| key.category() == Some(category))
    }

    /// 角度中来自社会画像的属性值（不含职业）
    pub fn facets(&self) -> Vec<(Category, String)> {
        self.attributes
            .iter()
            .filter_map(|(key, value)| key.category().map(|category| (category, value.clone())))
            .collect()
    }

    /// 提示词中使用的结构化描述
    pub fn describe(&self) -> String {
        self.attributes
            .iter()
            .map(|(key, value)| format!("{}: {}", key.as_str(), value))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

impl std::fmt::Display for SearchAngle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_follows_priority_order() {
        let mut attributes = BTreeMap::new();
        attributes.insert(AngleKey::Interest, "neuroscience".to_string());
        attributes.insert(AngleKey::Profession, "scientist".to_string());
        attributes.insert(AngleKey::Ethnicity, "Mexican".to_string());
        attributes.insert(AngleKey::Gender, "woman".to_string());

        let angle = SearchAngle::new(attributes);
        assert_eq!(angle.label, "Mexican, woman, scientist, neuroscience");
        assert_eq!(
            angle.describe(),
            "ethnicity: Mexican; gender: woman; profession: scientist; interest: neuroscience"
        );
    }

    #[test]
    fn test_covers_and_facets_skip_profession() {
        let mut attributes = BTreeMap::new();
        attributes.insert(AngleKey::Race, "Black".to_string());
        attributes.insert(AngleKey::Profession, "lawyer".to_string());
        attributes.insert(AngleKey::Aspiration, "justice".to_string());

        let angle = SearchAngle::new(attributes);
        assert!(angle.covers(Category::Race));
        assert!(angle.covers(Category::Aspirations));
        assert!(!angle.covers(Category::Interests));
        assert_eq!(
            angle.facets(),
            vec![
                (Category::Race, "Black".to_string()),
                (Category::Aspirations, "justice".to_string())
            ]
        );
    }

    #[test]
    fn test_category_key_mapping_is_consistent() {
        for category in Category::ALL {
            assert_eq!(AngleKey::from_category(category).category(), Some(category));
        }
    }
}
