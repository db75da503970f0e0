use crate::config::Config;
use crate::discovery::context::DiscoveryContext;
use crate::discovery::orchestrator::DiscoveryOrchestrator;
use crate::discovery::types::{DiscoveryReport, DiscoveryRequest};
use crate::llm::client::LLMClient;
use crate::llm::tools::image_search::GoogleImageSearch;
use crate::store::ResultStore;

use anyhow::Result;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// 时间跟踪作用域
pub struct TimingScope {
    start_time: Instant,
    phase_start_times: Vec<(String, Instant)>,
    phase_durations: Vec<(String, Duration)>,
}

impl Default for TimingScope {
    fn default() -> Self {
        Self::new()
    }
}

impl TimingScope {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            phase_start_times: Vec::new(),
            phase_durations: Vec::new(),
        }
    }

    /// 开始一个新的阶段计时
    pub fn start_phase(&mut self, phase_name: &str) {
        self.phase_start_times
            .retain(|(name, _)| name.as_str() != phase_name);
        self.phase_start_times
            .push((phase_name.to_string(), Instant::now()));
    }

    /// 结束一个阶段的计时，同名阶段多次出现时累加
    pub fn end_phase(&mut self, phase_name: &str) -> Option<Duration> {
        let index = self
            .phase_start_times
            .iter()
            .position(|(name, _)| name.as_str() == phase_name)?;
        let (_, start_time) = self.phase_start_times.remove(index);
        let duration = start_time.elapsed();

        match self
            .phase_durations
            .iter_mut()
            .find(|(name, _)| name.as_str() == phase_name)
        {
            Some((_, total)) => *total += duration,
            None => self
                .phase_durations
                .push((phase_name.to_string(), duration)),
        }
        Some(duration)
    }

    /// 获取总执行时间
    pub fn get_total_duration(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// 获取所有阶段的执行时间（按首次结束顺序）
    pub fn get_phase_durations(&self) -> &[(String, Duration)] {
        &self.phase_durations
    }

    pub fn phase_duration(&self, phase_name: &str) -> Option<Duration> {
        self.phase_durations
            .iter()
            .find(|(name, _)| name.as_str() == phase_name)
            .map(|(_, duration)| *duration)
    }

    /// 获取格式化的执行时间报告
    pub fn generate_timing_report(&self) -> String {
        let mut report = format!(
            "总执行时间: {:.2}秒\n",
            self.get_total_duration().as_secs_f64()
        );

        if !self.phase_durations.is_empty() {
            report.push_str("\n各阶段执行时间:\n");
            for (phase, duration) in &self.phase_durations {
                report.push_str(&format!("- {}: {:.3}秒\n", phase, duration.as_secs_f64()));
            }
        }

        report
    }
}

/// 时间跟踪常量
pub struct TimingKeys;

impl TimingKeys {
    pub const CACHE_LOOKUP: &'static str = "cache_lookup";
    pub const EXTRACT: &'static str = "extract";
    pub const IMMEDIATE: &'static str = "immediate";
    pub const SAMPLE: &'static str = "sample";
    pub const SEARCH: &'static str = "search";
    pub const SALVAGE: &'static str = "salvage";
    pub const RESEARCH: &'static str = "research";
    pub const PERSIST: &'static str = "persist";

    /// 获取所有阶段的键列表
    pub fn get_all_phase_keys() -> Vec<&'static str> {
        vec![
            Self::CACHE_LOOKUP,
            Self::EXTRACT,
            Self::IMMEDIATE,
            Self::SAMPLE,
            Self::SEARCH,
            Self::SALVAGE,
            Self::RESEARCH,
            Self::PERSIST,
        ]
    }
}

/// 启动一次完整的人物发现，等待运行结束并返回报告
pub async fn launch(
    config: &Config,
    store: Arc<dyn ResultStore>,
    request: DiscoveryRequest,
) -> Result<DiscoveryReport> {
    let llm_client = LLMClient::new(config.clone())?;

    // 启动时检查模型连接
    llm_client.check_connection().await?;

    let images = GoogleImageSearch::new(config.search.clone(), reqwest::Client::new());
    let context = DiscoveryContext::with_collaborators(
        config.clone(),
        Arc::new(llm_client),
        Arc::new(images),
        store,
    );

    let orchestrator = DiscoveryOrchestrator::new(context);
    let (report, result) = orchestrator.discover(request).collect().await;
    result?;

    Ok(report)
}

// Include tests
#[cfg(test)]
mod tests;
