//! 检索角度采样 - 从社会画像中抽取属性子集以拓宽发现范围

use rand::Rng;
use rand::distr::Distribution;
use rand::distr::weighted::WeightedIndex;
use rand::seq::IndexedRandom;
use std::collections::{BTreeMap, HashSet};

use crate::config::DiscoveryConfig;
use crate::types::{AngleKey, Category, SearchAngle, SocialModel};

/// 可随机附加到检索角度中的职业
pub const PROFESSIONS: [&str; 25] = [
    "scientist",
    "artist",
    "writer",
    "musician",
    "activist",
    "politician",
    "inventor",
    "educator",
    "engineer",
    "physician",
    "lawyer",
    "journalist",
    "philosopher",
    "mathematician",
    "architect",
    "entrepreneur",
    "athlete",
    "military leader",
    "religious leader",
    "social worker",
    "economist",
    "historian",
    "psychologist",
    "chef",
    "filmmaker",
];

/// 检索角度采样器
///
/// 属性数量 n 按 `exp(-decay * (n - min))` 加权抽取，偏向较小的组合；
/// 采样结束后补充覆盖尚未出现的非空类别，总数不超过上限。
#[derive(Debug, Clone)]
pub struct CombinationSampler {
    combination_count: usize,
    min_attributes: usize,
    decay_rate: f64,
    interest_probability: f64,
    aspiration_probability: f64,
    profession_probability: f64,
    retry_multiplier: usize,
}

impl CombinationSampler {
    pub fn from_config(config: &DiscoveryConfig) -> Self {
        Self {
            combination_count: config.combination_count,
            min_attributes: config.min_attributes_per_combo.max(1),
            decay_rate: config.decay_rate,
            interest_probability: config.interest_probability.clamp(0.0, 1.0),
            aspiration_probability: config.aspiration_probability.clamp(0.0, 1.0),
            profession_probability: config.profession_probability.clamp(0.0, 1.0),
            retry_multiplier: config.sampling_retry_multiplier.max(1),
        }
    }

    /// 生成有序的检索角度列表，空画像返回空列表
    pub fn sample<R: Rng>(&self, model: &SocialModel, rng: &mut R) -> Vec<SearchAngle> {
        if model.is_empty() || self.combination_count == 0 {
            return Vec::new();
        }

        let options = identity_options(model);
        let mut angles = Vec::new();
        let mut seen = HashSet::new();

        if !options.is_empty() {
            let max_attempts = self.combination_count * self.retry_multiplier;
            let mut attempts = 0;
            while angles.len() < self.combination_count && attempts < max_attempts {
                attempts += 1;
                let angle = self.draw_angle(model, &options, rng);
                if seen.insert(angle.label.to_lowercase()) {
                    angles.push(angle);
                }
            }
            tracing::debug!(
                "🎲 采样 {} 次，得到 {} 个检索角度",
                attempts,
                angles.len()
            );
        }

        self.ensure_coverage(model, &options, &mut angles, &mut seen);
        angles
    }

    fn draw_angle<R: Rng>(
        &self,
        model: &SocialModel,
        options: &[(AngleKey, String)],
        rng: &mut R,
    ) -> SearchAngle {
        let n = self.draw_size(options.len(), rng);

        let mut attributes = BTreeMap::new();
        let mut used_values = HashSet::new();
        for (key, value) in options.choose_multiple(rng, n) {
            if attributes.contains_key(key) || !used_values.insert(value.to_lowercase()) {
                continue;
            }
            attributes.insert(*key, value.clone());
        }

        if rng.random_bool(self.interest_probability)
            && let Some(interest) = model.interests.choose(rng)
            && used_values.insert(interest.to_lowercase())
        {
            attributes.insert(AngleKey::Interest, interest.clone());
        }
        if rng.random_bool(self.aspiration_probability)
            && let Some(aspiration) = model.aspirations.choose(rng)
            && used_values.insert(aspiration.to_lowercase())
        {
            attributes.insert(AngleKey::Aspiration, aspiration.clone());
        }
        if rng.random_bool(self.profession_probability)
            && let Some(profession) = PROFESSIONS.choose(rng)
        {
            attributes.insert(AngleKey::Profession, profession.to_string());
        }

        SearchAngle::new(attributes)
    }

    /// 抽取本次组合的身份属性数量
    fn draw_size<R: Rng>(&self, option_count: usize, rng: &mut R) -> usize {
        if option_count <= 1 {
            return option_count;
        }

        let min = self.min_attributes.min(option_count);
        let sizes: Vec<usize> = (min..=option_count).collect();
        let weights = sizes
            .iter()
            .map(|n| (-self.decay_rate * (n - min) as f64).exp());

        match WeightedIndex::new(weights) {
            Ok(distribution) => sizes[distribution.sample(rng)],
            Err(_) => min,
        }
    }

    /// 为尚未覆盖的非空类别补充角度
    fn ensure_coverage(
        &self,
        model: &SocialModel,
        options: &[(AngleKey, String)],
        angles: &mut Vec<SearchAngle>,
        seen: &mut HashSet<String>,
    ) {
        for category in model.non_empty_categories() {
            if is_covered(model, angles, category, None) {
                continue;
            }

            let angle = coverage_angle(model, category, options);
            if seen.contains(&angle.label.to_lowercase()) {
                continue;
            }

            if angles.len() >= self.combination_count {
                let replaceable = (0..angles.len())
                    .rev()
                    .find(|index| is_redundant(model, angles, *index));
                match replaceable {
                    Some(index) => {
                        let removed = angles.remove(index);
                        seen.remove(&removed.label.to_lowercase());
                    }
                    None => {
                        tracing::warn!("⚠️ 检索角度已达上限，类别 {} 未被覆盖", category);
                        continue;
                    }
                }
            }

            seen.insert(angle.label.to_lowercase());
            angles.push(angle);
        }
    }
}

/// 身份类别中的所有 (键, 值) 选项，跨类别去重
fn identity_options(model: &SocialModel) -> Vec<(AngleKey, String)> {
    let mut seen = HashSet::new();
    Category::ALL
        .into_iter()
        .filter(|category| category.is_identity())
        .flat_map(|category| {
            model
                .values(category)
                .iter()
                .map(move |value| (AngleKey::from_category(category), value.clone()))
        })
        .filter(|(_, value)| seen.insert(value.to_lowercase()))
        .collect()
}

/// 覆盖某一类别的角度：该类别的首个值，搭配一个其他类别的身份属性
fn coverage_angle(
    model: &SocialModel,
    category: Category,
    options: &[(AngleKey, String)],
) -> SearchAngle {
    let key = AngleKey::from_category(category);
    let mut attributes = BTreeMap::new();
    if let Some(value) = model.values(category).first() {
        attributes.insert(key, value.clone());
    }
    let partner = options.iter().find(|(other_key, other_value)| {
        *other_key != key
            && !attributes
                .values()
                .any(|value: &String| value.eq_ignore_ascii_case(other_value))
    });
    if let Some((other_key, other_value)) = partner {
        attributes.insert(*other_key, other_value.clone());
    }
    SearchAngle::new(attributes)
}

/// 角度是否代表了某一类别：带有该类别的键，或带有该类别的某个值
///
/// 跨类别重复的值只以首个类别的键进入候选，其他类别由值本身代表。
pub fn represents(model: &SocialModel, angle: &SearchAngle, category: Category) -> bool {
    angle.covers(category)
        || model.values(category).iter().any(|value| {
            angle
                .attributes
                .values()
                .any(|attribute| attribute.eq_ignore_ascii_case(value))
        })
}

/// 除 `skip` 之外的角度是否已代表该类别
fn is_covered(
    model: &SocialModel,
    angles: &[SearchAngle],
    category: Category,
    skip: Option<usize>,
) -> bool {
    angles
        .iter()
        .enumerate()
        .any(|(index, angle)| Some(index) != skip && represents(model, angle, category))
}

/// 移除该角度后，它代表的类别是否仍被其他角度代表
fn is_redundant(model: &SocialModel, angles: &[SearchAngle], index: usize) -> bool {
    model
        .non_empty_categories()
        .into_iter()
        .filter(|category| represents(model, &angles[index], *category))
        .all(|category| is_covered(model, angles, category, Some(index)))
}
