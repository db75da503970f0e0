use async_trait::async_trait;

use crate::discovery::claims::ClaimTable;
use crate::discovery::context::DiscoveryContext;
use crate::discovery::step_forward_agent::{LLMCallMode, PromptTemplate, StepForwardAgent};
use crate::error::DiscoveryError;
use crate::llm::client::{GroundedOutput, ModelTier, StructuredOutput};
use crate::llm::tools::image_search::ImageQuery;
use crate::types::{
    FigureField, FigurePatch, FigureStatus, HistoricalFigure, ResearchAttempt, ResearchFindings,
    SocialModel,
};

impl StructuredOutput for ResearchFindings {
    const NAME: &'static str = "ResearchFindings";
}

/// 单次调研调用的输入
#[derive(Debug, Clone)]
pub struct ResearchRequest {
    pub name: String,
    pub missing: Vec<FigureField>,
}

/// 人物调研的结果
#[derive(Debug, Clone, PartialEq)]
pub enum ResearchOutcome {
    /// 已有完整记录，未发起任何调用
    Existing(HistoricalFigure),
    /// 本次调研并持久化的档案（Complete 或 Exhausted）
    Researched(HistoricalFigure),
    /// 人名已被本次运行中的其他任务认领
    Skipped,
}

impl ResearchOutcome {
    pub fn figure(&self) -> Option<&HistoricalFigure> {
        match self {
            ResearchOutcome::Existing(figure) | ResearchOutcome::Researched(figure) => {
                Some(figure)
            }
            ResearchOutcome::Skipped => None,
        }
    }
}

/// 人物调研员 - 循环调研并补全档案，直到完整或调研轮数耗尽
#[derive(Default, Clone)]
pub struct PersonResearcher;

#[async_trait]
impl StepForwardAgent for PersonResearcher {
    type Input = ResearchRequest;
    type Output = ResearchFindings;

    fn agent_type(&self) -> &'static str {
        "PersonResearcher"
    }

    fn prompt_template(&self) -> PromptTemplate {
        PromptTemplate {
            system_prompt: r#"你是一位资深的传记作者与历史学家，负责调研一位具体的历史人物，收集准确、详细的生平与身份信息。

要求：
- 使用网页检索工具核实信息，所有内容都必须以检索结果为依据
- 重点补全“待补充字段”中列出的字段
- 列表类字段返回字符串列表，例如 race = ["Black", "Mixed"]，location = ["Atlanta, Georgia"]
- 某个字段不适用或查不到时，返回空列表或空字符串，不要编造"#
                .to_string(),
            opening_instruction: "请调研以下历史人物：".to_string(),
            closing_instruction: r#"
## 字段说明：
- marginalization_context：其边缘化身份的简要背景（例如 "She was a Black woman in 19th century America"）
- challenges_faced：因身份或外部环境所面临的具体挑战（1-2段）
- how_they_overcame：如何应对、抵抗或克服这些挑战（1-2段）
- achievement：主要成就与贡献（1-2段）"#
                .to_string(),
            llm_call_mode: LLMCallMode::ExtractWithSearch,
            tier: ModelTier::Efficient,
        }
    }

    fn provide_custom_prompt_content(&self, input: &Self::Input) -> String {
        let missing = input
            .missing
            .iter()
            .map(|field| format!("- {}", field.label()))
            .collect::<Vec<_>>()
            .join("\n");
        format!(
            "### 人物姓名\n{}\n\n### 待补充字段\n{}",
            input.name, missing
        )
    }
}

impl PersonResearcher {
    /// 认领后调研，同一运行内已被认领的人名直接跳过
    pub async fn research_claimed(
        &self,
        context: &DiscoveryContext,
        claims: &ClaimTable,
        name: &str,
        origin: &SocialModel,
    ) -> Result<ResearchOutcome, DiscoveryError> {
        if !claims.try_claim(name) {
            tracing::debug!("⏭️ {} 已被其他任务认领，跳过", name);
            return Ok(ResearchOutcome::Skipped);
        }
        self.research(context, name, origin).await
    }

    /// 调研一个人物
    ///
    /// 存储中已有完整记录时直接返回，不发起任何调用。`origin` 为发现该人物的检索角度属性，会并入标签。
    pub async fn research(
        &self,
        context: &DiscoveryContext,
        name: &str,
        origin: &SocialModel,
    ) -> Result<ResearchOutcome, DiscoveryError> {
        let existing = context
            .store
            .get(name)
            .await
            .map_err(|e| DiscoveryError::Persistence {
                name: name.to_string(),
                reason: e.to_string(),
            })?;

        let figure = match existing {
            Some(figure) if figure.is_complete() => {
                tracing::debug!("✅ {} 已有完整档案，跳过调研", name);
                return Ok(ResearchOutcome::Existing(figure));
            }
            Some(figure)
                if figure.status == FigureStatus::Exhausted
                    && !context.config.discovery.retry_exhausted =>
            {
                tracing::debug!("⏭️ {} 此前调研未完成，按配置不再重试", name);
                return Ok(ResearchOutcome::Existing(figure));
            }
            Some(figure) => figure,
            None => HistoricalFigure::stub(name),
        };

        let budget = context.config.discovery.max_research_attempts;
        let mut attempt = ResearchAttempt::new(figure, budget);

        while !attempt.figure.is_complete() && !attempt.is_exhausted() {
            let request = ResearchRequest {
                name: attempt.figure.name.clone(),
                missing: attempt.missing.clone(),
            };

            match self.research_once(context, &request).await {
                Ok(output) => {
                    attempt.figure.record_queries(output.queries);
                    attempt.advance(Some(FigurePatch::from(output.value)));
                }
                Err(e) => {
                    tracing::warn!("⚠️ {}", e);
                    attempt.advance(None);
                }
            }

            tracing::debug!(
                "🔁 {} 第 {}/{} 轮调研后仍缺少: {:?}",
                name,
                attempt.attempt,
                attempt.budget,
                attempt.figure.missing_required()
            );
        }

        let figure = self.finalize(context, attempt.figure, origin).await?;
        Ok(ResearchOutcome::Researched(figure))
    }

    async fn research_once(
        &self,
        context: &DiscoveryContext,
        request: &ResearchRequest,
    ) -> Result<GroundedOutput<ResearchFindings>, DiscoveryError> {
        let call_timeout = context.config.discovery.call_timeout();
        tokio::time::timeout(call_timeout, self.execute(context, request))
            .await
            .map_err(|_| DiscoveryError::ResearchCall {
                name: request.name.clone(),
                reason: DiscoveryError::timeout("人物调研", call_timeout).to_string(),
            })?
            .map_err(|e| DiscoveryError::ResearchCall {
                name: request.name.clone(),
                reason: e.to_string(),
            })
    }

    /// 补充图片与标签，标记状态并持久化
    async fn finalize(
        &self,
        context: &DiscoveryContext,
        mut figure: HistoricalFigure,
        origin: &SocialModel,
    ) -> Result<HistoricalFigure, DiscoveryError> {
        figure.status = if figure.is_complete() {
            FigureStatus::Complete
        } else {
            FigureStatus::Exhausted
        };

        if figure.image_url.is_none() {
            figure.image_url = self.find_image(context, &figure).await;
        }

        let mut tags = figure.demographics.clone();
        tags.union(origin);
        figure.tags = tags;

        context
            .store
            .put(&figure)
            .await
            .map_err(|e| DiscoveryError::Persistence {
                name: figure.name.clone(),
                reason: e.to_string(),
            })?;

        match figure.status {
            FigureStatus::Complete => tracing::info!("✅ 人物调研完成: {}", figure.name),
            _ => tracing::warn!(
                "⚠️ 人物调研轮数耗尽，保存部分档案: {} (缺少 {:?})",
                figure.name,
                figure.missing_required()
            ),
        }
        Ok(figure)
    }

    /// 尽力查找图片，失败时不影响调研结果
    async fn find_image(
        &self,
        context: &DiscoveryContext,
        figure: &HistoricalFigure,
    ) -> Option<String> {
        let query = ImageQuery::for_figure(figure);
        let call_timeout = context.config.discovery.call_timeout();

        match tokio::time::timeout(call_timeout, context.images.find_image(&query)).await {
            Ok(Ok(url)) => url,
            Ok(Err(e)) => {
                tracing::warn!("⚠️ {} 图片检索失败: {}", figure.name, e);
                None
            }
            Err(_) => {
                tracing::warn!(
                    "⚠️ {}",
                    DiscoveryError::timeout(format!("{} 图片检索", figure.name), call_timeout)
                );
                None
            }
        }
    }
}
