use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::cache::normalize_search_text;
use crate::discovery::context::DiscoveryContext;
use crate::discovery::step_forward_agent::{LLMCallMode, PromptTemplate, StepForwardAgent};
use crate::error::DiscoveryError;
use crate::llm::client::{ModelTier, StructuredOutput};
use crate::types::{Category, RawFacets, SocialModel};

/// 属性提取的结构化输出，每个字段为 `|` 分隔的文本或列表
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct SocialModelExtraction {
    /// 种族，例如 "Black|White"，未提及时为空字符串
    pub race: RawFacets,
    /// 民族，例如 "Hispanic|Irish"
    pub ethnicity: RawFacets,
    /// 文化背景，例如 "Southern|Georgian|American"
    pub cultural_background: RawFacets,
    /// 所在或相关地点，例如 "Atlanta, Georgia"
    pub location: RawFacets,
    /// 性别认同，例如 "non-binary|bigender"
    pub gender: RawFacets,
    /// 性取向
    pub sexuality: RawFacets,
    /// 兴趣爱好，例如 "privacy|security|coding"
    pub interests: RawFacets,
    /// 目标与志向
    pub aspirations: RawFacets,
}

impl StructuredOutput for SocialModelExtraction {
    const NAME: &'static str = "SocialModelExtraction";
}

impl From<SocialModelExtraction> for SocialModel {
    fn from(extraction: SocialModelExtraction) -> Self {
        let mut model = SocialModel::default();
        model.extend(Category::Race, extraction.race.into_values());
        model.extend(Category::Ethnicity, extraction.ethnicity.into_values());
        model.extend(
            Category::CulturalBackground,
            extraction.cultural_background.into_values(),
        );
        model.extend(Category::Location, extraction.location.into_locations());
        model.extend(Category::Gender, extraction.gender.into_values());
        model.extend(Category::Sexuality, extraction.sexuality.into_values());
        model.extend(Category::Interests, extraction.interests.into_values());
        model.extend(Category::Aspirations, extraction.aspirations.into_values());
        model
    }
}

/// 属性提取器 - 将自由文本的自我描述转换为社会画像
#[derive(Default, Clone)]
pub struct AttributeExtractor;

#[async_trait]
impl StepForwardAgent for AttributeExtractor {
    type Input = String;
    type Output = SocialModelExtraction;

    fn agent_type(&self) -> &'static str {
        "AttributeExtractor"
    }

    fn prompt_template(&self) -> PromptTemplate {
        PromptTemplate {
            system_prompt: r#"你是一个身份属性提取专家，负责从用户的自我描述中提取结构化的身份信息。

提取以下类别：race、ethnicity、cultural_background、location、gender、sexuality、interests、aspirations。

关键规则：
- 多个值之间使用 | （竖线）分隔，每个值只表达一个概念
- 不要使用逗号或斜杠分隔多个值（location 中的 "Atlanta, Georgia" 这类地名除外）
- 不要附加括号说明
- 用户没有提及的类别返回空字符串，不要猜测

正确示例：interests = "privacy|security|coding|technology criticism"，gender = "non-binary|bigender"
错误示例：interests = "privacy, security, coding"，gender = "bigender (both girl and boy)""#
                .to_string(),
            opening_instruction: "请从以下用户自我描述中提取身份属性：".to_string(),
            closing_instruction: "请严格按照规则输出各类别的属性值，保持用户原本的措辞。".to_string(),
            llm_call_mode: LLMCallMode::Extract,
            tier: ModelTier::Efficient,
        }
    }

    fn provide_custom_prompt_content(&self, input: &Self::Input) -> String {
        format!("### 用户自我描述\n{}", input.trim())
    }
}

impl AttributeExtractor {
    /// 提取社会画像
    ///
    /// 先查属性缓存，相同描述的并发请求只会触发一次模型调用。任何失败都会让整次运行终止。
    pub async fn extract(
        &self,
        context: &DiscoveryContext,
        description: &str,
    ) -> Result<SocialModel, DiscoveryError> {
        if let Some(social_model) = context.facet_cache.get(description) {
            tracing::debug!("✅ 属性缓存命中");
            return Ok(social_model);
        }

        let key = normalize_search_text(description);
        let task_context = context.clone();
        let input = description.to_string();
        let agent = self.clone();

        let result = context
            .extractions
            .run(&key, move || async move {
                let call_timeout = task_context.config.discovery.call_timeout();
                let output = tokio::time::timeout(call_timeout, agent.execute(&task_context, &input))
                    .await
                    .map_err(|_| {
                        DiscoveryError::Extraction(
                            DiscoveryError::timeout("属性提取", call_timeout).to_string(),
                        )
                    })?
                    .map_err(|e| DiscoveryError::Extraction(e.to_string()))?;

                let social_model = SocialModel::from(output.value);
                task_context.facet_cache.put(&input, social_model.clone());
                Ok(social_model)
            })
            .await;

        match result {
            Ok(social_model) => {
                tracing::info!(
                    "🧬 属性提取完成，共 {} 个非空类别",
                    social_model.non_empty_categories().len()
                );
                Ok(social_model)
            }
            Err(e) => {
                tracing::error!("❌ 属性提取失败: {}", e);
                Err(DiscoveryError::Extraction(match e.as_ref() {
                    DiscoveryError::Extraction(reason) => reason.clone(),
                    other => other.to_string(),
                }))
            }
        }
    }
}
