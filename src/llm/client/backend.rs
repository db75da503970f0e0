//! 结构化生成能力 - 发现流程与模型服务之间的边界

use async_trait::async_trait;
use futures::future::BoxFuture;
use schemars::JsonSchema;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::GenerationError;
use crate::llm::client::LLMClient;

/// 模型档位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModelTier {
    /// 高能效模型，失败时回退到powerful
    #[default]
    Efficient,
    /// 高质量模型
    Powerful,
}

/// 一次生成调用的提示词
#[derive(Debug, Clone)]
pub struct PromptSpec {
    pub system: String,
    pub user: String,
    pub tier: ModelTier,
}

impl PromptSpec {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            tier: ModelTier::Efficient,
        }
    }

    pub fn with_tier(mut self, tier: ModelTier) -> Self {
        self.tier = tier;
        self
    }
}

/// 以具体类型调用 [`LLMClient::extract`]，结果转为JSON跨过后端边界
pub(crate) type ExtractFn =
    for<'a> fn(&'a LLMClient, &'a PromptSpec) -> BoxFuture<'a, Result<Value, GenerationError>>;

/// 期望的输出结构
#[derive(Clone)]
pub struct OutputSchema {
    pub name: &'static str,
    pub schema: Value,
    pub(crate) extract: ExtractFn,
}

impl OutputSchema {
    pub fn of<T: StructuredOutput>() -> Self {
        let schema = serde_json::to_value(schemars::schema_for!(T)).unwrap_or(Value::Null);
        Self {
            name: T::NAME,
            schema,
            extract: extract_as::<T>,
        }
    }
}

impl std::fmt::Debug for OutputSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputSchema")
            .field("name", &self.name)
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

fn extract_as<'a, T: StructuredOutput>(
    client: &'a LLMClient,
    prompt: &'a PromptSpec,
) -> BoxFuture<'a, Result<Value, GenerationError>> {
    Box::pin(async move {
        let output = client.extract::<T>(prompt).await?;
        serde_json::to_value(output).map_err(|e| GenerationError::Malformed(e.to_string()))
    })
}

/// 可作为结构化输出的类型
pub trait StructuredOutput: JsonSchema + DeserializeOwned + Serialize + Send + Sync + 'static {
    /// 结构名称，用于日志与错误信息
    const NAME: &'static str;
}

/// 检索增强生成的结果，附带实际发出的检索查询
#[derive(Debug, Clone)]
pub struct GroundedOutput<T> {
    pub value: T,
    pub queries: Vec<String>,
}

/// 结构化生成能力
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// 按给定结构生成结果
    async fn generate(
        &self,
        prompt: &PromptSpec,
        schema: &OutputSchema,
    ) -> Result<Value, GenerationError>;

    /// 带网页检索工具的生成，同时返回检索查询
    async fn generate_grounded(
        &self,
        prompt: &PromptSpec,
        schema: &OutputSchema,
    ) -> Result<GroundedOutput<Value>, GenerationError>;
}

/// 生成并解码为具体类型
pub async fn generate_typed<T: StructuredOutput>(
    backend: &dyn GenerationBackend,
    prompt: &PromptSpec,
) -> Result<T, GenerationError> {
    let schema = OutputSchema::of::<T>();
    let value = backend.generate(prompt, &schema).await?;
    decode::<T>(value)
}

/// 检索增强生成并解码为具体类型
pub async fn generate_grounded_typed<T: StructuredOutput>(
    backend: &dyn GenerationBackend,
    prompt: &PromptSpec,
) -> Result<GroundedOutput<T>, GenerationError> {
    let schema = OutputSchema::of::<T>();
    let output = backend.generate_grounded(prompt, &schema).await?;
    Ok(GroundedOutput {
        value: decode::<T>(output.value)?,
        queries: output.queries,
    })
}

fn decode<T: StructuredOutput>(value: Value) -> Result<T, GenerationError> {
    let is_empty = match &value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::String(text) => text.trim().is_empty(),
        _ => false,
    };
    if is_empty {
        return Err(GenerationError::EmptyOutput);
    }

    serde_json::from_value(value).map_err(|e| GenerationError::SchemaMismatch {
        schema: T::NAME,
        reason: e.to_string(),
    })
}
