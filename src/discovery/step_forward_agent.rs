use async_trait::async_trait;

use crate::discovery::context::DiscoveryContext;
use crate::error::GenerationError;
use crate::llm::client::{
    GroundedOutput, ModelTier, PromptSpec, StructuredOutput, generate_grounded_typed,
    generate_typed,
};

/// LLM调用方式配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LLMCallMode {
    /// 直接生成结构化数据
    Extract,
    /// 提供网页检索工具，结果需以检索内容为依据
    ExtractWithSearch,
}

/// Prompt模板配置
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    /// 系统提示词
    pub system_prompt: String,
    /// 开头的说明性指令
    pub opening_instruction: String,
    /// 结尾的强调性指令
    pub closing_instruction: String,
    /// LLM调用方式
    pub llm_call_mode: LLMCallMode,
    /// 模型档位
    pub tier: ModelTier,
}

impl PromptTemplate {
    /// 构建标准的prompt：开头指令 + 调研材料 + 结尾指令
    pub fn build_prompt(&self, custom_content: &str) -> PromptSpec {
        let mut prompt = String::new();

        prompt.push_str(&self.opening_instruction);
        prompt.push_str("\n\n");

        prompt.push_str("## 调研材料参考\n");
        prompt.push_str(custom_content);
        prompt.push_str("\n\n");

        prompt.push_str(&self.closing_instruction);

        PromptSpec::new(self.system_prompt.clone(), prompt).with_tier(self.tier)
    }
}

/// 单步Agent：一次结构化生成调用
#[async_trait]
pub trait StepForwardAgent: Send + Sync {
    /// 调用输入
    type Input: Send + Sync;

    /// Agent的输出类型
    type Output: StructuredOutput;

    /// Agent类型标识
    fn agent_type(&self) -> &'static str;

    /// Prompt模板配置
    fn prompt_template(&self) -> PromptTemplate;

    /// 根据输入生成插入到“调研材料参考”部分的内容
    fn provide_custom_prompt_content(&self, input: &Self::Input) -> String;

    /// 默认实现的execute方法
    async fn execute(
        &self,
        context: &DiscoveryContext,
        input: &Self::Input,
    ) -> Result<GroundedOutput<Self::Output>, GenerationError> {
        let template = self.prompt_template();
        let prompt = template.build_prompt(&self.provide_custom_prompt_content(input));
        let backend = context.backend.as_ref();

        tracing::debug!("🤖 执行 {} ...", self.agent_type());
        match template.llm_call_mode {
            LLMCallMode::Extract => {
                let value = generate_typed::<Self::Output>(backend, &prompt).await?;
                Ok(GroundedOutput {
                    value,
                    queries: Vec::new(),
                })
            }
            LLMCallMode::ExtractWithSearch => {
                generate_grounded_typed::<Self::Output>(backend, &prompt).await
            }
        }
    }
}
