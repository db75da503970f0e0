//! LLM客户端 - 提供统一的LLM服务接口

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::{
    config::Config,
    error::GenerationError,
    llm::client::utils::{
        backoff_delay, evaluate_befitting_model, parse_json_payload, schema_instruction,
    },
    llm::tools::web_search::{AgentToolWebSearch, QueryRecorder},
    utils::rate_limiter::ApiGate,
};

pub mod backend;
mod providers;
pub mod utils;

pub use backend::{
    GenerationBackend, GroundedOutput, ModelTier, OutputSchema, PromptSpec, StructuredOutput,
    generate_grounded_typed, generate_typed,
};

use providers::{ProviderAgent, ProviderClient};
use rig::extractor::ExtractionError;

/// LLM客户端 - 提供统一的LLM服务接口
///
/// 所有调用都经过同一个 [`ApiGate`]，并发上限与每分钟请求数在整个进程内共享。
#[derive(Clone)]
pub struct LLMClient {
    config: Config,
    client: ProviderClient,
    gate: Arc<ApiGate>,
    http: reqwest::Client,
}

impl LLMClient {
    /// 创建新的LLM客户端
    pub fn new(config: Config) -> Result<Self> {
        let gate = Arc::new(ApiGate::from_config(&config.llm));
        Self::with_gate(config, gate)
    }

    /// 使用外部共享的调用闸门创建客户端
    pub fn with_gate(config: Config, gate: Arc<ApiGate>) -> Result<Self> {
        let client = ProviderClient::new(&config.llm)?;
        tracing::debug!(
            "🚦 模型调用并发上限 {}，每分钟 {} 次",
            gate.ceiling(),
            config.llm.rate_limit_rpm
        );
        Ok(Self {
            config,
            client,
            gate,
            http: reqwest::Client::new(),
        })
    }

    pub fn gate(&self) -> Arc<ApiGate> {
        self.gate.clone()
    }

    /// 检查模型连接和功能是否正常
    pub async fn check_connection(&self) -> Result<()> {
        tracing::info!("🔄 正在检查模型连接...");
        let agent = self.client.create_agent(
            &self.config.llm.model_efficient,
            "You are a helpful assistant.",
            &self.config.llm,
        )?;
        let agent = &agent;

        match self
            .retry_with_backoff(move || async move {
                agent
                    .prompt("Hello")
                    .await
                    .map_err(|e| GenerationError::Provider(e.to_string()))
            })
            .await
        {
            Ok(_) => {
                tracing::info!("✅ 模型连接正常");
                Ok(())
            }
            Err(e) => {
                tracing::error!("❌ 模型连接失败: {}", e);
                Err(e.into())
            }
        }
    }

    /// 通用重试逻辑：每次尝试都先获取调用许可并受单次超时约束，失败后按指数退避等待
    async fn retry_with_backoff<T, F, Fut>(&self, operation: F) -> Result<T, GenerationError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, GenerationError>>,
    {
        let llm_config = &self.config.llm;
        let max_retries = llm_config.retry_attempts.max(1);
        let timeout = Duration::from_secs(llm_config.timeout_seconds.max(1));
        let mut retries = 0;

        loop {
            let outcome = {
                let _permit = self.gate.acquire().await?;
                match tokio::time::timeout(timeout, operation()).await {
                    Ok(result) => result,
                    Err(_) => Err(GenerationError::Timeout(timeout.as_secs())),
                }
            };

            match outcome {
                Ok(result) => return Ok(result),
                Err(err) => {
                    retries += 1;
                    tracing::warn!(
                        "❌ 调用模型服务出错，重试中 (第 {} / {}次尝试): {}",
                        retries,
                        max_retries,
                        err
                    );
                    if retries >= max_retries {
                        return Err(err);
                    }
                    let delay = backoff_delay(
                        llm_config,
                        retries - 1,
                        err.is_rate_limited(),
                        &mut rand::rng(),
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// 数据提取方法：不带工具的结构化调用，由rig的Extractor约束输出
    pub async fn extract<T: StructuredOutput>(
        &self,
        prompt: &PromptSpec,
    ) -> Result<T, GenerationError> {
        let (befitting_model, fallover_model) =
            evaluate_befitting_model(&self.config.llm, prompt.tier, &prompt.system, &prompt.user);

        self.extract_inner::<T>(&prompt.system, &prompt.user, befitting_model, fallover_model)
            .await
    }

    async fn extract_inner<T: StructuredOutput>(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        befitting_model: String,
        fallover_model: Option<String>,
    ) -> Result<T, GenerationError> {
        let llm_config = &self.config.llm;
        let extractor = self
            .client
            .create_extractor::<T>(&befitting_model, system_prompt, llm_config)
            .map_err(|e| GenerationError::Provider(e.to_string()))?;
        let extractor = &extractor;

        let result = self
            .retry_with_backoff(move || async move {
                extractor
                    .extract(user_prompt)
                    .await
                    .map_err(extraction_error::<T>)
            })
            .await;

        match result {
            Ok(value) => Ok(value),
            Err(e) => match fallover_model {
                Some(model) => {
                    tracing::warn!(
                        "❌ 调用模型服务出错，尝试 {} 次均失败，尝试使用备选模型{}...{}",
                        llm_config.retry_attempts,
                        model,
                        e
                    );
                    let user_prompt_with_fixer = fixer_prompt(user_prompt, &e);
                    Box::pin(self.extract_inner::<T>(
                        system_prompt,
                        &user_prompt_with_fixer,
                        model,
                        None,
                    ))
                    .await
                }
                None => {
                    tracing::error!(
                        "❌ 调用模型服务出错，尝试 {} 次均失败...{}",
                        llm_config.retry_attempts,
                        e
                    );
                    Err(e)
                }
            },
        }
    }

    /// 检索增强调用：模型可多轮调用 `web_search` 工具，最终文本按JSON解析
    ///
    /// rig的Extractor不支持附加工具，这条路径只能从文本输出中解析结构。
    async fn complete_grounded(
        &self,
        prompt: &PromptSpec,
        schema: &OutputSchema,
        web_search: &AgentToolWebSearch,
    ) -> Result<Value, GenerationError> {
        let (befitting_model, fallover_model) =
            evaluate_befitting_model(&self.config.llm, prompt.tier, &prompt.system, &prompt.user);

        self.complete_grounded_inner(
            &prompt.system,
            &prompt.user,
            schema,
            befitting_model,
            fallover_model,
            web_search,
        )
        .await
    }

    async fn complete_grounded_inner(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        schema: &OutputSchema,
        befitting_model: String,
        fallover_model: Option<String>,
        web_search: &AgentToolWebSearch,
    ) -> Result<Value, GenerationError> {
        let llm_config = &self.config.llm;
        let system_with_schema = format!("{}\n\n{}", system_prompt, schema_instruction(schema));

        let agent = self
            .client
            .create_agent_with_tools(&befitting_model, &system_with_schema, llm_config, web_search)
            .map_err(|e| GenerationError::Provider(e.to_string()))?;

        let agent: &ProviderAgent = &agent;
        let max_tool_turns = llm_config.max_tool_turns;

        let result = self
            .retry_with_backoff(move || async move {
                let text = agent
                    .multi_turn(user_prompt, max_tool_turns)
                    .await
                    .map_err(|e| GenerationError::Provider(e.to_string()))?;
                parse_json_payload(&text)
            })
            .await;

        match result {
            Ok(value) => Ok(value),
            Err(e) => match fallover_model {
                Some(model) => {
                    tracing::warn!(
                        "❌ 调用模型服务出错，尝试 {} 次均失败，尝试使用备选模型{}...{}",
                        llm_config.retry_attempts,
                        model,
                        e
                    );
                    let user_prompt_with_fixer = fixer_prompt(user_prompt, &e);
                    Box::pin(self.complete_grounded_inner(
                        system_prompt,
                        &user_prompt_with_fixer,
                        schema,
                        model,
                        None,
                        web_search,
                    ))
                    .await
                }
                None => {
                    tracing::error!(
                        "❌ 调用模型服务出错，尝试 {} 次均失败...{}",
                        llm_config.retry_attempts,
                        e
                    );
                    Err(e)
                }
            },
        }
    }
}

/// 备选模型重试时附加上一次的错误信息
fn fixer_prompt(user_prompt: &str, error: &GenerationError) -> String {
    format!(
        "{}\n\n**注意事项**此前我调用大模型过程时存在错误，错误信息为“{}”，你注意你这一次要规避这个错误",
        user_prompt, error
    )
}

fn extraction_error<T: StructuredOutput>(error: ExtractionError) -> GenerationError {
    match error {
        ExtractionError::NoData => GenerationError::EmptyOutput,
        ExtractionError::DeserializationError(e) => GenerationError::SchemaMismatch {
            schema: T::NAME,
            reason: e.to_string(),
        },
        other => GenerationError::Provider(other.to_string()),
    }
}

#[async_trait]
impl GenerationBackend for LLMClient {
    async fn generate(
        &self,
        prompt: &PromptSpec,
        schema: &OutputSchema,
    ) -> Result<Value, GenerationError> {
        (schema.extract)(self, prompt).await
    }

    async fn generate_grounded(
        &self,
        prompt: &PromptSpec,
        schema: &OutputSchema,
    ) -> Result<GroundedOutput<Value>, GenerationError> {
        let recorder = QueryRecorder::new();
        let web_search =
            AgentToolWebSearch::new(self.config.search.clone(), self.http.clone(), recorder.clone());

        let value = self.complete_grounded(prompt, schema, &web_search).await?;
        Ok(GroundedOutput {
            value,
            queries: recorder.snapshot(),
        })
    }
}
