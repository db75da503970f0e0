use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::discovery::context::DiscoveryContext;
use crate::discovery::step_forward_agent::{LLMCallMode, PromptTemplate, StepForwardAgent};
use crate::llm::client::{ModelTier, StructuredOutput};
use crate::utils::names::{clean_name, validate_name};

/// 人名挽回的结构化输出
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct PersonNameExtraction {
    /// 人物全名，没有时为空字符串
    pub person_name: String,
}

impl StructuredOutput for PersonNameExtraction {
    const NAME: &'static str = "PersonNameExtraction";
}

/// 人名挽回器 - 从被拒绝的检索输出中尝试提取人名
#[derive(Default, Clone)]
pub struct NameSalvager;

#[async_trait]
impl StepForwardAgent for NameSalvager {
    type Input = String;
    type Output = PersonNameExtraction;

    fn agent_type(&self) -> &'static str {
        "NameSalvager"
    }

    fn prompt_template(&self) -> PromptTemplate {
        PromptTemplate {
            system_prompt: r#"从文本中提取一个人物的全名（如果存在）。
只返回人物姓名（例如 "Marie Curie"），文本中没有有效人名时返回空字符串。
不要返回组织名称、事件名称或描述性文字。"#
                .to_string(),
            opening_instruction: "请从以下文本中提取人物全名：".to_string(),
            closing_instruction: "只输出 person_name 字段。".to_string(),
            llm_call_mode: LLMCallMode::Extract,
            tier: ModelTier::Efficient,
        }
    }

    fn provide_custom_prompt_content(&self, input: &Self::Input) -> String {
        format!("### 文本\n{}", input)
    }
}

impl NameSalvager {
    /// 尝试挽回一个人名，调用失败或结果不是合法人名时返回None
    pub async fn salvage(&self, context: &DiscoveryContext, text: &str) -> Option<String> {
        let call_timeout = context.config.discovery.call_timeout();
        let input = text.to_string();

        let output = match tokio::time::timeout(call_timeout, self.execute(context, &input)).await {
            Ok(Ok(output)) => output.value,
            Ok(Err(e)) => {
                tracing::debug!("   ⏭️ 人名挽回失败: {}", e);
                return None;
            }
            Err(_) => {
                tracing::debug!("   ⏭️ 人名挽回超时");
                return None;
            }
        };

        let cleaned = clean_name(&output.person_name);
        match validate_name(&cleaned) {
            Ok(()) => {
                tracing::debug!("   🩹 挽回人名: {}", cleaned);
                Some(cleaned)
            }
            Err(_) => None,
        }
    }
}
