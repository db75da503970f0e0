use futures::{StreamExt, stream};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::cache::{SearchCacheRecord, normalize_search_text};
use crate::discovery::agents::attribute_extractor::AttributeExtractor;
use crate::discovery::agents::figure_searcher::{AngleSearchOutcome, AngleSearchRequest, FigureSearcher};
use crate::discovery::agents::name_salvager::NameSalvager;
use crate::discovery::agents::person_researcher::{PersonResearcher, ResearchOutcome};
use crate::discovery::claims::ClaimTable;
use crate::discovery::context::DiscoveryContext;
use crate::discovery::sampler::CombinationSampler;
use crate::discovery::stream::{DiscoveryRun, EventSink, FigureStream};
use crate::discovery::types::{
    DiscoveryEvent, DiscoveryRequest, DiscoveryStatus, DiscoverySummary, EmptyReason,
    FigureSource, FigureUpdate,
};
use crate::discovery::workflow::{TimingKeys, TimingScope};
use crate::error::DiscoveryError;
use crate::types::{HistoricalFigure, SearchAngle, SocialModel};
use crate::utils::names::{CandidateSet, count_rejections, normalize_name};

type PersonResult = (String, Result<ResearchOutcome, DiscoveryError>);

/// 挽回阶段使用的检索角度标签
const SALVAGE_ANGLE: &str = "salvage";

/// 发现编排器：把一段描述变成持续推送的人物档案
#[derive(Clone)]
pub struct DiscoveryOrchestrator {
    context: DiscoveryContext,
}

impl DiscoveryOrchestrator {
    pub fn new(context: DiscoveryContext) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &DiscoveryContext {
        &self.context
    }

    /// 启动一次发现运行，结果通过事件流增量推送
    pub fn discover(&self, request: DiscoveryRequest) -> DiscoveryRun {
        self.discover_with_rng(request, StdRng::from_os_rng())
    }

    /// 使用指定随机源启动发现运行
    pub fn discover_with_rng(&self, request: DiscoveryRequest, rng: StdRng) -> DiscoveryRun {
        let (sink, events) = FigureStream::channel();
        let cancel = CancellationToken::new();
        let session = DiscoverySession::new(self.context.clone(), sink, cancel.clone(), rng);
        let handle = tokio::spawn(session.run(request));
        DiscoveryRun::new(events, handle, cancel)
    }
}

/// 在取消信号到来前等待一个future
async fn until_cancelled<F: Future>(
    cancel: &CancellationToken,
    future: F,
) -> Result<F::Output, DiscoveryError> {
    tokio::select! {
        _ = cancel.cancelled() => Err(DiscoveryError::Cancelled),
        output = future => Ok(output),
    }
}

/// 单次发现运行的状态
struct DiscoverySession {
    context: DiscoveryContext,
    sink: EventSink,
    cancel: CancellationToken,
    rng: StdRng,
    timing: TimingScope,
    summary: DiscoverySummary,
    claims: Arc<ClaimTable>,
    research_slots: Arc<Semaphore>,
    people: JoinSet<PersonResult>,
    candidates: CandidateSet,
    /// 已推送给调用方的人物（归一化姓名）
    emitted: HashSet<String>,
    /// 本次运行可用的人物，写入搜索缓存
    available: CandidateSet,
}

impl DiscoverySession {
    fn new(
        context: DiscoveryContext,
        sink: EventSink,
        cancel: CancellationToken,
        rng: StdRng,
    ) -> Self {
        let research_slots = Arc::new(Semaphore::new(context.stage_caps.person));
        Self {
            context,
            sink,
            cancel,
            rng,
            timing: TimingScope::new(),
            summary: DiscoverySummary::default(),
            claims: Arc::new(ClaimTable::new()),
            research_slots,
            people: JoinSet::new(),
            candidates: CandidateSet::new(),
            emitted: HashSet::new(),
            available: CandidateSet::new(),
        }
    }

    async fn run(mut self, request: DiscoveryRequest) -> Result<DiscoverySummary, DiscoveryError> {
        let run_id = Uuid::new_v4();
        let fingerprint = self.context.cache_manager.fingerprint(&request.description);
        self.summary = DiscoverySummary::new(run_id, fingerprint);

        tracing::info!(
            "🚀 开始人物发现 run_id={} 指纹={}",
            run_id,
            self.summary.fingerprint
        );

        match self.execute(request).await {
            Ok(()) => {
                let summary = self.finish();
                self.sink.emit(DiscoveryEvent::Finished(summary.clone()));
                Ok(summary)
            }
            Err(e) => {
                self.people.abort_all();
                match &e {
                    DiscoveryError::Cancelled => tracing::warn!("🛑 发现运行已取消 run_id={}", run_id),
                    _ => tracing::error!("❌ 发现运行失败 run_id={}: {}", run_id, e),
                }
                self.sink.emit(DiscoveryEvent::Failed {
                    reason: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn execute(&mut self, request: DiscoveryRequest) -> Result<(), DiscoveryError> {
        self.timing.start_phase(TimingKeys::CACHE_LOOKUP);
        let cached = self.lookup_cache(&request.description).await?;
        self.timing.end_phase(TimingKeys::CACHE_LOOKUP);

        let mut previous_names = Vec::new();
        let (social_model, facets) = match cached {
            Some(record) => {
                self.summary.status = DiscoveryStatus::CacheHit;
                self.sink.emit(DiscoveryEvent::Extracted {
                    social_model: record.social_model.clone(),
                    facets: record.facets.clone(),
                });
                let replayed = self.replay_cached(&record.figure_names).await?;

                if !self.context.config.discovery.refresh_on_cache_hit {
                    if replayed == 0 {
                        self.summary.empty_reason = Some(EmptyReason::CachedFiguresMissing);
                    }
                    return Ok(());
                }
                tracing::info!("🔄 缓存命中，按配置继续发现新人物");
                previous_names = record.figure_names;
                (record.social_model, record.facets)
            }
            None => {
                let (social_model, facets) = self.resolve_social_model(&request).await?;
                self.sink.emit(DiscoveryEvent::Extracted {
                    social_model: social_model.clone(),
                    facets: facets.clone(),
                });
                self.emit_immediate(&facets).await?;
                (social_model, facets)
            }
        };

        self.timing.start_phase(TimingKeys::SAMPLE);
        let sampler = CombinationSampler::from_config(&self.context.config.discovery);
        let angles = sampler.sample(&social_model, &mut self.rng);
        self.timing.end_phase(TimingKeys::SAMPLE);

        self.summary.angles_total = angles.len();
        self.sink.emit(DiscoveryEvent::AnglesSampled(angles.clone()));

        if angles.is_empty() {
            tracing::warn!("⚠️ 描述中没有可用的身份信息，跳过人物检索");
            self.summary.empty_reason = Some(EmptyReason::NoIdentitySignal);
            return Ok(());
        }

        let salvage_queue = self.search_angles(angles, social_model.goals()).await?;

        if !salvage_queue.is_empty() {
            self.salvage_names(salvage_queue).await?;
        }

        self.timing.start_phase(TimingKeys::RESEARCH);
        while !self.people.is_empty() {
            tokio::select! {
                _ = self.cancel.cancelled() => return Err(DiscoveryError::Cancelled),
                Some(joined) = self.people.join_next() => self.absorb_person(joined),
            }
        }
        self.timing.end_phase(TimingKeys::RESEARCH);

        if self.candidates.is_empty() {
            self.summary.empty_reason = Some(if self.summary.angles_failed == self.summary.angles_total {
                EmptyReason::AllAnglesFailed
            } else {
                EmptyReason::NoCandidates
            });
        }

        self.persist_search(&request.description, social_model, facets, previous_names)
            .await;
        Ok(())
    }

    async fn lookup_cache(
        &self,
        description: &str,
    ) -> Result<Option<SearchCacheRecord>, DiscoveryError> {
        let lookup = self.context.cache_manager.get_search(description);
        match until_cancelled(&self.cancel, lookup).await? {
            Ok(record) => Ok(record),
            Err(e) => {
                tracing::warn!("⚠️ 读取搜索缓存失败，按未命中处理: {}", e);
                Ok(None)
            }
        }
    }

    /// 按缓存中的姓名从存储读取并推送，返回推送的人物数
    ///
    /// 推送过的人物记为本次运行的候选，刷新发现时不会再次调研和计数。
    async fn replay_cached(&mut self, names: &[String]) -> Result<usize, DiscoveryError> {
        tracing::info!("📦 搜索缓存命中，读取 {} 个人物", names.len());

        let mut replayed = 0;
        for name in names {
            let lookup = self.context.store.get(name);
            match until_cancelled(&self.cancel, lookup).await? {
                Ok(Some(figure)) => {
                    self.candidates.insert(name);
                    self.candidates.insert(&figure.name);
                    if self.publish(figure.clone(), FigureSource::CacheHit, None) {
                        self.summary.existing += 1;
                        self.count_figure(&figure);
                        replayed += 1;
                    }
                }
                Ok(None) => tracing::warn!("⚠️ 缓存中的人物 {} 已不在存储中", name),
                Err(e) => tracing::warn!("⚠️ 读取人物 {} 失败: {}", name, e),
            }
        }
        Ok(replayed)
    }

    async fn resolve_social_model(
        &mut self,
        request: &DiscoveryRequest,
    ) -> Result<(SocialModel, Vec<String>), DiscoveryError> {
        if let Some(social_model) = request.precomputed_social_model.clone() {
            tracing::info!("📋 使用调用方提供的社会画像，跳过属性提取");
            let facets = request
                .precomputed_facets
                .clone()
                .unwrap_or_else(|| social_model.facets(true));
            return Ok((social_model, facets));
        }

        self.timing.start_phase(TimingKeys::EXTRACT);
        let extractor = AttributeExtractor;
        let extraction = extractor.extract(&self.context, &request.description);
        let social_model = until_cancelled(&self.cancel, extraction).await??;
        self.timing.end_phase(TimingKeys::EXTRACT);

        let facets = social_model.facets(true);
        tracing::info!("🧬 社会画像: {}", social_model);
        Ok((social_model, facets))
    }

    /// 发现开始前先推送存储中语义相近的人物
    async fn emit_immediate(&mut self, facets: &[String]) -> Result<(), DiscoveryError> {
        let limit = self.context.config.discovery.immediate_results_limit;
        if facets.is_empty() || limit == 0 {
            return Ok(());
        }

        self.timing.start_phase(TimingKeys::IMMEDIATE);
        let min_similarity = self.context.config.discovery.min_similarity;
        let query = self
            .context
            .store
            .semantic_query(facets, min_similarity, limit);

        match until_cancelled(&self.cancel, query).await? {
            Ok(hits) => {
                for hit in hits {
                    if self.publish(hit.figure, FigureSource::Immediate, Some(hit.score)) {
                        self.summary.immediate += 1;
                    }
                }
                tracing::info!("⚡ 立即返回 {} 个相似人物", self.summary.immediate);
            }
            Err(e) => tracing::warn!("⚠️ 语义检索失败，跳过立即结果: {}", e),
        }
        self.timing.end_phase(TimingKeys::IMMEDIATE);
        Ok(())
    }

    /// 并发检索所有角度，候选人物一出现就开始调研；返回可挽回的被拒文本
    async fn search_angles(
        &mut self,
        angles: Vec<SearchAngle>,
        goals: Vec<String>,
    ) -> Result<Vec<(String, SocialModel)>, DiscoveryError> {
        self.timing.start_phase(TimingKeys::SEARCH);

        let limit = self.context.config.discovery.figures_per_search;
        let context = self.context.clone();
        let mut searches = stream::iter(angles.into_iter().map(move |angle| {
            let context = context.clone();
            let request = AngleSearchRequest {
                angle,
                goals: goals.clone(),
                limit,
            };
            async move { FigureSearcher.search(&context, &request).await }
        }))
        .buffer_unordered(self.context.stage_caps.angle);

        let mut salvage_queue = Vec::new();
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return Err(DiscoveryError::Cancelled),
                next = searches.next() => match next {
                    Some(Ok(outcome)) => self.absorb_angle(outcome, &mut salvage_queue),
                    Some(Err(e)) => {
                        self.summary.angles_failed += 1;
                        tracing::warn!("⚠️ {}", e);
                    }
                    None => break,
                },
                Some(joined) = self.people.join_next(), if !self.people.is_empty() => {
                    self.absorb_person(joined)
                }
            }
        }

        self.timing.end_phase(TimingKeys::SEARCH);
        tracing::info!(
            "🔎 检索阶段完成: {}/{} 个角度成功，共 {} 个候选人物",
            self.summary.angles_total - self.summary.angles_failed,
            self.summary.angles_total,
            self.candidates.len()
        );
        Ok(salvage_queue)
    }

    fn absorb_angle(
        &mut self,
        outcome: AngleSearchOutcome,
        salvage_queue: &mut Vec<(String, SocialModel)>,
    ) {
        let mut origin = SocialModel::new();
        for (category, value) in outcome.angle.facets() {
            origin.push(category, &value);
        }

        for (reason, count) in count_rejections(&outcome.screening.rejected) {
            *self
                .summary
                .rejections
                .entry(reason.as_str().to_string())
                .or_insert(0) += count;
        }

        if self.context.config.discovery.salvage_rejected_names {
            salvage_queue.extend(
                outcome
                    .screening
                    .salvageable()
                    .map(|rejection| (rejection.text.clone(), origin.clone())),
            );
        }

        for name in &outcome.screening.accepted {
            self.enqueue_research(name, &outcome.angle.label, &origin);
        }
    }

    /// 从被拒绝的文本中挽回人名并加入调研
    async fn salvage_names(
        &mut self,
        mut queue: Vec<(String, SocialModel)>,
    ) -> Result<(), DiscoveryError> {
        self.timing.start_phase(TimingKeys::SALVAGE);

        let mut seen = HashSet::new();
        queue.retain(|(text, _)| seen.insert(text.to_lowercase()));
        tracing::info!("🩹 尝试从 {} 条被拒绝文本中挽回人名", queue.len());

        let context = self.context.clone();
        let mut salvages = stream::iter(queue.into_iter().map(move |(text, origin)| {
            let context = context.clone();
            async move { (NameSalvager.salvage(&context, &text).await, origin) }
        }))
        .buffer_unordered(self.context.stage_caps.angle);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return Err(DiscoveryError::Cancelled),
                next = salvages.next() => match next {
                    Some((Some(name), origin)) => {
                        if !self.candidates.contains(&name) {
                            self.summary.salvaged += 1;
                            self.enqueue_research(&name, SALVAGE_ANGLE, &origin);
                        }
                    }
                    Some((None, _)) => {}
                    None => break,
                },
                Some(joined) = self.people.join_next(), if !self.people.is_empty() => {
                    self.absorb_person(joined)
                }
            }
        }

        self.timing.end_phase(TimingKeys::SALVAGE);
        Ok(())
    }

    /// 新候选人物加入调研队列，同一运行内重复的人名直接忽略
    fn enqueue_research(&mut self, name: &str, angle: &str, origin: &SocialModel) {
        if !self.candidates.insert(name) {
            return;
        }
        self.summary.candidates += 1;

        self.sink.emit(DiscoveryEvent::Candidate {
            figure: HistoricalFigure::stub(name),
            angle: angle.to_string(),
        });

        let context = self.context.clone();
        let claims = self.claims.clone();
        let slots = self.research_slots.clone();
        let origin = origin.clone();
        let name = name.to_string();
        let item_timeout = self.context.config.discovery.item_timeout();

        self.people.spawn(async move {
            let _permit = match slots.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return (name, Err(DiscoveryError::Cancelled)),
            };

            let researcher = PersonResearcher;
            let research = researcher.research_claimed(&context, &claims, &name, &origin);
            let result = match tokio::time::timeout(item_timeout, research).await {
                Ok(result) => result,
                Err(_) => Err(DiscoveryError::timeout(format!("人物 {}", name), item_timeout)),
            };
            (name, result)
        });
    }

    fn absorb_person(&mut self, joined: Result<PersonResult, JoinError>) {
        match joined {
            Ok((_, Ok(ResearchOutcome::Existing(figure)))) => {
                self.summary.existing += 1;
                self.count_figure(&figure);
                self.publish(figure, FigureSource::Existing, None);
            }
            Ok((_, Ok(ResearchOutcome::Researched(figure)))) => {
                self.count_figure(&figure);
                // 重新调研的人物总是推送，覆盖之前推送过的旧档案
                self.emitted.remove(&normalize_name(&figure.name));
                self.publish(figure, FigureSource::Researched, None);
            }
            Ok((name, Ok(ResearchOutcome::Skipped))) => {
                tracing::debug!("⏭️ {} 已在本次运行中处理", name);
                self.summary.skipped += 1;
            }
            Ok((name, Err(e))) => {
                self.summary.failed += 1;
                tracing::warn!("⚠️ 人物 {} 调研失败: {}", name, e);
                self.sink.emit(DiscoveryEvent::ItemFailed {
                    name,
                    reason: e.to_string(),
                });
            }
            Err(e) => {
                self.summary.failed += 1;
                tracing::error!("❌ 人物调研任务异常退出: {}", e);
            }
        }
    }

    fn count_figure(&mut self, figure: &HistoricalFigure) {
        if figure.is_complete() {
            self.summary.succeeded += 1;
        } else {
            self.summary.partial += 1;
        }
    }

    /// 推送人物档案，同一人物只推送一次；返回是否实际推送
    fn publish(&mut self, figure: HistoricalFigure, source: FigureSource, score: Option<f64>) -> bool {
        if source != FigureSource::Immediate {
            self.available.insert(&figure.name);
        }
        if !self.emitted.insert(normalize_name(&figure.name)) {
            return false;
        }
        self.sink
            .emit(DiscoveryEvent::Figure(FigureUpdate { figure, source, score }));
        true
    }

    /// 记录本次描述对应的人物，供后续相同描述直接命中
    async fn persist_search(
        &mut self,
        description: &str,
        social_model: SocialModel,
        facets: Vec<String>,
        previous_names: Vec<String>,
    ) {
        self.timing.start_phase(TimingKeys::PERSIST);

        let mut names = CandidateSet::new();
        for name in previous_names.iter().chain(self.available.names()) {
            names.insert(name);
        }

        if names.is_empty() {
            tracing::debug!("📭 本次运行没有可缓存的人物");
        } else {
            let record = SearchCacheRecord {
                description: normalize_search_text(description),
                social_model,
                facets,
                figure_names: names.names().to_vec(),
            };
            if let Err(e) = self.context.cache_manager.set_search(record).await {
                tracing::warn!("⚠️ 写入搜索缓存失败: {}", e);
            }
        }

        self.timing.end_phase(TimingKeys::PERSIST);
    }

    fn finish(&mut self) -> DiscoverySummary {
        self.summary.timing_report = self.timing.generate_timing_report();

        tracing::info!(
            "🏁 发现完成 run_id={} 状态={:?} 完整 {} / 部分 {} / 失败 {} / 跳过 {}",
            self.summary.run_id,
            self.summary.status,
            self.summary.succeeded,
            self.summary.partial,
            self.summary.failed,
            self.summary.skipped
        );
        if let Some(reason) = self.summary.empty_reason {
            tracing::info!("📭 没有找到人物: {}", reason.as_str());
        }
        tracing::debug!("🏷️ 本次运行认领 {} 个人名", self.claims.len());
        tracing::debug!("⏱️ {}", self.summary.timing_report);

        let cache_report = self.context.cache_manager.generate_performance_report();
        tracing::debug!("📊 缓存统计: {:?}", cache_report);

        self.summary.clone()
    }
}
