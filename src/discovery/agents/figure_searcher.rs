use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::discovery::context::DiscoveryContext;
use crate::discovery::step_forward_agent::{LLMCallMode, PromptTemplate, StepForwardAgent};
use crate::error::DiscoveryError;
use crate::llm::client::{ModelTier, StructuredOutput};
use crate::types::{RawFacets, SearchAngle};
use crate::utils::names::{NameScreening, screen_names};

/// 人物检索的结构化输出
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct FigureSearchOutput {
    /// 仅包含真实人物的全名，以 | 分隔，例如 "Marie Curie|Ada Lovelace|Alan Turing"
    pub figure_names: RawFacets,
}

impl StructuredOutput for FigureSearchOutput {
    const NAME: &'static str = "FigureSearchOutput";
}

/// 一个检索角度的检索请求
#[derive(Debug, Clone)]
pub struct AngleSearchRequest {
    pub angle: SearchAngle,
    /// 用户的兴趣与志向，辅助匹配
    pub goals: Vec<String>,
    pub limit: usize,
}

/// 一个检索角度的检索结果
#[derive(Debug, Clone)]
pub struct AngleSearchOutcome {
    pub angle: SearchAngle,
    pub screening: NameScreening,
    /// 模型实际发出的检索查询
    pub queries: Vec<String>,
}

/// 人物检索器 - 针对一个检索角度，借助网页检索找出匹配的历史人物
#[derive(Default, Clone)]
pub struct FigureSearcher;

#[async_trait]
impl StepForwardAgent for FigureSearcher {
    type Input = AngleSearchRequest;
    type Output = FigureSearchOutput;

    fn agent_type(&self) -> &'static str {
        "FigureSearcher"
    }

    fn prompt_template(&self) -> PromptTemplate {
        PromptTemplate {
            system_prompt: r#"你是一位专注于被忽视叙事的文化历史学家，擅长发掘那些故事被边缘化或遗忘的历史人物。

你的任务是使用网页检索工具，找到与给定身份属性组合相匹配、来自边缘化背景的真实历史人物。

关键要求：
- 只返回真实存在过的历史人物的完整姓名
- 姓名必须能在检索结果中找到依据，不要凭空编造
- 不要包含头衔、描述、括号说明或任何短语，只保留形如 "Firstname Lastname" 的姓名
- 多个姓名之间使用 | 分隔"#
                .to_string(),
            opening_instruction: "请针对以下身份属性组合检索匹配的历史人物：".to_string(),
            closing_instruction: r#"
## 输出要求：
- figure_names 只包含人物全名，以 | 分隔，例如 "Marie Curie|Ada Lovelace|Alan Turing"
- 不要超过要求的人数上限
- 找不到可靠人物时返回空字符串"#
                .to_string(),
            llm_call_mode: LLMCallMode::ExtractWithSearch,
            tier: ModelTier::Efficient,
        }
    }

    fn provide_custom_prompt_content(&self, input: &Self::Input) -> String {
        let goals = if input.goals.is_empty() {
            "无".to_string()
        } else {
            input.goals.join(", ")
        };
        format!(
            "### 身份属性组合\n{}\n\n### 兴趣与志向\n{}\n\n### 人数上限\n{}",
            input.angle.describe(),
            goals,
            input.limit
        )
    }
}

impl FigureSearcher {
    /// 检索一个角度，失败或超时只影响当前角度
    pub async fn search(
        &self,
        context: &DiscoveryContext,
        request: &AngleSearchRequest,
    ) -> Result<AngleSearchOutcome, DiscoveryError> {
        let label = request.angle.label.clone();
        let call_timeout = context.config.discovery.call_timeout();

        let output = tokio::time::timeout(call_timeout, self.execute(context, request))
            .await
            .map_err(|_| DiscoveryError::SearchAngle {
                angle: label.clone(),
                reason: DiscoveryError::timeout("人物检索", call_timeout).to_string(),
            })?
            .map_err(|e| DiscoveryError::SearchAngle {
                angle: label.clone(),
                reason: e.to_string(),
            })?;

        let mut screening = screen_names(&output.value.figure_names.into_text());
        screening.accepted.truncate(request.limit.max(1));

        tracing::info!(
            "🔎 [{}] 找到 {} 个候选人物，拒绝 {} 条",
            label,
            screening.accepted.len(),
            screening.rejected.len()
        );

        Ok(AngleSearchOutcome {
            angle: request.angle.clone(),
            screening,
            queries: output.queries,
        })
    }
}
