mod support;

use futures::StreamExt;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;

use kindred_rs::discovery::agents::person_researcher::{PersonResearcher, ResearchOutcome};
use kindred_rs::discovery::claims::ClaimTable;
use kindred_rs::error::{DiscoveryError, GenerationError};
use kindred_rs::llm::tools::image_search::NoImageSearch;
use kindred_rs::store::{MemoryResultStore, ResultStore};
use kindred_rs::types::{Category, FigureStatus, SocialModel};
use kindred_rs::{
    DiscoveryEvent, DiscoveryOrchestrator, DiscoveryRequest, DiscoveryStatus,
    discovery::{EmptyReason, FigureSource},
};

use support::*;

const DESCRIPTION: &str = "I am a Mexican American neuroscientist, a woman living in Chicago.";

fn orchestrator(
    temp_dir: &TempDir,
    backend: Arc<ScriptedBackend>,
    store: Arc<MemoryResultStore>,
) -> DiscoveryOrchestrator {
    let context = context_with(
        test_config(temp_dir.path()),
        backend,
        Arc::new(StaticImageSearch::default()),
        store,
    );
    DiscoveryOrchestrator::new(context)
}

#[tokio::test]
async fn test_end_to_end_discovery_persists_complete_figures() {
    let temp_dir = TempDir::new().unwrap();
    let backend = Arc::new(standard_backend("Ellen Ochoa|Jaime Escalante"));
    let store = Arc::new(MemoryResultStore::new());
    let orchestrator = orchestrator(&temp_dir, backend.clone(), store.clone());

    let run = orchestrator.discover_with_rng(DiscoveryRequest::new(DESCRIPTION), StdRng::seed_from_u64(7));
    let (report, result) = run.collect().await;
    let summary = result.unwrap();

    assert_eq!(summary.status, DiscoveryStatus::Fresh);
    assert_eq!(report.status(), Some(DiscoveryStatus::Fresh));
    assert!(summary.angles_total >= 1);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 0);
    assert!(summary.empty_reason.is_none());
    assert_eq!(report.candidates.len(), 2);

    // 每位人物只调研并写入一次，即使多个角度都找到了同一人
    assert_eq!(backend.calls(EXTRACTION), 1);
    assert_eq!(backend.calls(RESEARCH), 2);
    assert_eq!(store.write_count("Ellen Ochoa").await, 1);
    assert_eq!(store.write_count("Jaime Escalante").await, 1);

    let ellen = store.get("Ellen Ochoa").await.unwrap().unwrap();
    assert_eq!(ellen.status, FigureStatus::Complete);
    assert!(ellen.image_url.is_some());
    assert_eq!(ellen.search_queries_used, vec!["ResearchFindings grounding query"]);
    assert!(
        ellen
            .tags
            .values(Category::Ethnicity)
            .contains(&"Mexican American".to_string())
    );

    let researched = report
        .figures
        .iter()
        .filter(|update| update.source == FigureSource::Researched)
        .count();
    assert_eq!(researched, 2);
    assert!(summary.timing_report.contains("- search:"));
}

#[tokio::test]
async fn test_second_run_is_a_cache_hit_without_extraction_or_search() {
    let temp_dir = TempDir::new().unwrap();
    let backend = Arc::new(standard_backend("Ellen Ochoa|Jaime Escalante"));
    let store = Arc::new(MemoryResultStore::new());
    let orchestrator = orchestrator(&temp_dir, backend.clone(), store.clone());

    let (_, first) = orchestrator
        .discover_with_rng(DiscoveryRequest::new(DESCRIPTION), StdRng::seed_from_u64(1))
        .collect()
        .await;
    first.unwrap();

    let extraction_calls = backend.calls(EXTRACTION);
    let search_calls = backend.calls(SEARCH);
    let research_calls = backend.calls(RESEARCH);

    // 空白与大小写不同的同一段描述
    let repeated = format!("  {}  ", DESCRIPTION.to_uppercase());
    let (report, second) = orchestrator
        .discover_with_rng(DiscoveryRequest::new(repeated), StdRng::seed_from_u64(2))
        .collect()
        .await;
    let summary = second.unwrap();

    assert_eq!(summary.status, DiscoveryStatus::CacheHit);
    assert_eq!(backend.calls(EXTRACTION), extraction_calls);
    assert_eq!(backend.calls(SEARCH), search_calls);
    assert_eq!(backend.calls(RESEARCH), research_calls);
    assert_eq!(report.figures.len(), 2);
    assert!(
        report
            .figures
            .iter()
            .all(|update| update.source == FigureSource::CacheHit)
    );
    assert!(report.social_model.is_some());
}

#[tokio::test]
async fn test_research_of_complete_figure_makes_no_calls() {
    let temp_dir = TempDir::new().unwrap();
    let backend = Arc::new(standard_backend(""));
    let store = Arc::new(MemoryResultStore::new());
    store.put(&complete_figure("Ellen Ochoa", "Mexican American")).await.unwrap();

    let context = context_with(
        test_config(temp_dir.path()),
        backend.clone(),
        Arc::new(NoImageSearch),
        store.clone(),
    );

    let outcome = PersonResearcher
        .research(&context, "Ellen Ochoa", &SocialModel::new())
        .await
        .unwrap();

    assert!(matches!(outcome, ResearchOutcome::Existing(_)));
    assert_eq!(backend.total_calls(), 0);
    assert_eq!(store.write_count("Ellen Ochoa").await, 1);
}

#[tokio::test]
async fn test_concurrent_claims_research_a_name_once() {
    let temp_dir = TempDir::new().unwrap();
    let backend = Arc::new(standard_backend("").with_delay(RESEARCH, Duration::from_millis(50)));
    let store = Arc::new(MemoryResultStore::new());
    let context = context_with(
        test_config(temp_dir.path()),
        backend.clone(),
        Arc::new(NoImageSearch),
        store.clone(),
    );
    let claims = Arc::new(ClaimTable::new());

    let mut handles = Vec::new();
    for variant in ["Ellen Ochoa", "ellen ochoa", "ELLEN  OCHOA", "Ellen Ochoa "] {
        let context = context.clone();
        let claims = claims.clone();
        handles.push(tokio::spawn(async move {
            PersonResearcher
                .research_claimed(&context, &claims, variant, &SocialModel::new())
                .await
        }));
    }

    let mut researched = 0;
    let mut skipped = 0;
    for handle in handles {
        match handle.await.unwrap().unwrap() {
            ResearchOutcome::Researched(_) => researched += 1,
            ResearchOutcome::Skipped => skipped += 1,
            ResearchOutcome::Existing(_) => panic!("store was empty"),
        }
    }

    assert_eq!(researched, 1);
    assert_eq!(skipped, 3);
    assert_eq!(backend.calls(RESEARCH), 1);
    assert_eq!(store.total_writes().await, 1);
}

#[tokio::test]
async fn test_attempt_budget_persists_exhausted_figure() {
    let temp_dir = TempDir::new().unwrap();
    let backend = Arc::new(ScriptedBackend::new(|schema, _| match schema {
        RESEARCH => Ok(partial_findings()),
        _ => Err(GenerationError::EmptyOutput),
    }));
    let store = Arc::new(MemoryResultStore::new());
    let context = context_with(
        test_config(temp_dir.path()),
        backend.clone(),
        Arc::new(NoImageSearch),
        store.clone(),
    );

    let outcome = PersonResearcher
        .research(&context, "Gloria Anzaldua", &SocialModel::new())
        .await
        .unwrap();

    let ResearchOutcome::Researched(figure) = outcome else {
        panic!("expected a researched figure");
    };
    assert_eq!(backend.calls(RESEARCH), 3);
    assert_eq!(figure.status, FigureStatus::Exhausted);
    assert_eq!(figure.achievement, "Wrote widely read essays.");

    let stored = store.get("Gloria Anzaldua").await.unwrap().unwrap();
    assert_eq!(stored.status, FigureStatus::Exhausted);
    assert_eq!(store.write_count("Gloria Anzaldua").await, 1);

    // 默认不会重新调研已耗尽的人物
    let again = PersonResearcher
        .research(&context, "Gloria Anzaldua", &SocialModel::new())
        .await
        .unwrap();
    assert!(matches!(again, ResearchOutcome::Existing(_)));
    assert_eq!(backend.calls(RESEARCH), 3);
}

#[tokio::test]
async fn test_failed_research_calls_count_against_budget() {
    let temp_dir = TempDir::new().unwrap();
    let backend = Arc::new(ScriptedBackend::new(|_, _| {
        Err(GenerationError::Provider("503 unavailable".to_string()))
    }));
    let store = Arc::new(MemoryResultStore::new());
    let context = context_with(
        test_config(temp_dir.path()),
        backend.clone(),
        Arc::new(NoImageSearch),
        store.clone(),
    );

    let outcome = PersonResearcher
        .research(&context, "Luisa Moreno", &SocialModel::new())
        .await
        .unwrap();

    assert_eq!(backend.calls(RESEARCH), 3);
    assert_eq!(
        outcome.figure().map(|figure| figure.status),
        Some(FigureStatus::Exhausted)
    );
}

#[tokio::test]
async fn test_description_without_identity_reports_reason() {
    let temp_dir = TempDir::new().unwrap();
    let backend = Arc::new(ScriptedBackend::new(|schema, _| match schema {
        EXTRACTION => Ok(json!({
            "race": "", "ethnicity": "none", "cultural_background": "N/A",
            "location": "", "gender": "", "sexuality": "", "interests": "", "aspirations": ""
        })),
        _ => Err(GenerationError::Provider("should not be called".to_string())),
    }));
    let store = Arc::new(MemoryResultStore::new());
    let orchestrator = orchestrator(&temp_dir, backend.clone(), store.clone());

    let (report, result) = orchestrator
        .discover_with_rng(DiscoveryRequest::new("Hello there."), StdRng::seed_from_u64(3))
        .collect()
        .await;
    let summary = result.unwrap();

    assert_eq!(summary.empty_reason, Some(EmptyReason::NoIdentitySignal));
    assert_eq!(summary.angles_total, 0);
    assert!(report.figures.is_empty());
    assert_eq!(backend.calls(SEARCH), 0);
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn test_failed_angle_is_isolated() {
    let temp_dir = TempDir::new().unwrap();
    let search_calls = Arc::new(AtomicUsize::new(0));
    let counter = search_calls.clone();
    let backend = Arc::new(ScriptedBackend::new(move |schema, _| match schema {
        EXTRACTION => Ok(neuroscientist_extraction()),
        SEARCH => {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(GenerationError::Provider("search backend down".to_string()))
            } else {
                Ok(json!({ "figure_names": "Ellen Ochoa" }))
            }
        }
        RESEARCH => Ok(complete_findings()),
        _ => Err(GenerationError::EmptyOutput),
    }));
    let store = Arc::new(MemoryResultStore::new());
    let orchestrator = orchestrator(&temp_dir, backend.clone(), store.clone());

    let (report, result) = orchestrator
        .discover_with_rng(DiscoveryRequest::new(DESCRIPTION), StdRng::seed_from_u64(11))
        .collect()
        .await;
    let summary = result.unwrap();

    assert!(summary.angles_total >= 2);
    assert_eq!(summary.angles_failed, 1);
    assert_eq!(summary.succeeded, 1);
    assert!(report.figure("Ellen Ochoa").is_some());
    assert!(report.failure.is_none());
}

#[tokio::test]
async fn test_all_angles_failed_reason() {
    let temp_dir = TempDir::new().unwrap();
    let backend = Arc::new(ScriptedBackend::new(|schema, _| match schema {
        EXTRACTION => Ok(neuroscientist_extraction()),
        _ => Err(GenerationError::Provider("429 rate limited".to_string())),
    }));
    let store = Arc::new(MemoryResultStore::new());
    let orchestrator = orchestrator(&temp_dir, backend.clone(), store.clone());

    let (report, result) = orchestrator
        .discover_with_rng(DiscoveryRequest::new(DESCRIPTION), StdRng::seed_from_u64(5))
        .collect()
        .await;
    let summary = result.unwrap();

    assert_eq!(summary.angles_failed, summary.angles_total);
    assert_eq!(summary.empty_reason, Some(EmptyReason::AllAnglesFailed));
    assert!(report.figures.is_empty());
    assert_eq!(backend.calls(RESEARCH), 0);
}

#[tokio::test]
async fn test_extraction_failure_is_terminal() {
    let temp_dir = TempDir::new().unwrap();
    let backend = Arc::new(ScriptedBackend::new(|_, _| {
        Err(GenerationError::Malformed("not json".to_string()))
    }));
    let store = Arc::new(MemoryResultStore::new());
    let orchestrator = orchestrator(&temp_dir, backend.clone(), store);

    let (report, result) = orchestrator
        .discover_with_rng(DiscoveryRequest::new(DESCRIPTION), StdRng::seed_from_u64(5))
        .collect()
        .await;

    let error = result.unwrap_err();
    assert!(matches!(error, DiscoveryError::Extraction(_)));
    assert!(error.is_terminal());
    assert!(report.failure.is_some());
    assert!(report.summary.is_none());
    assert_eq!(backend.calls(SEARCH), 0);
}

#[tokio::test]
async fn test_precomputed_social_model_skips_extraction() {
    let temp_dir = TempDir::new().unwrap();
    let backend = Arc::new(standard_backend("Ellen Ochoa"));
    let store = Arc::new(MemoryResultStore::new());
    let orchestrator = orchestrator(&temp_dir, backend.clone(), store);

    let mut social_model = SocialModel::new();
    social_model.push(Category::Ethnicity, "Mexican");
    social_model.push(Category::Gender, "woman");
    let request = DiscoveryRequest::new(DESCRIPTION)
        .with_social_model(social_model, vec!["Mexican".to_string(), "woman".to_string()]);

    let (report, result) = orchestrator
        .discover_with_rng(request, StdRng::seed_from_u64(9))
        .collect()
        .await;
    result.unwrap();

    assert_eq!(backend.calls(EXTRACTION), 0);
    assert!(backend.calls(SEARCH) >= 1);
    assert!(report.figure("Ellen Ochoa").is_some());
}

#[tokio::test]
async fn test_immediate_results_come_first_and_existing_figures_are_reused() {
    let temp_dir = TempDir::new().unwrap();
    let backend = Arc::new(standard_backend("Ellen Ochoa|Jaime Escalante"));
    let store = Arc::new(MemoryResultStore::new());
    store
        .seed([complete_figure("Ellen Ochoa", "Mexican")])
        .await;
    let mut config = test_config(temp_dir.path());
    config.discovery.min_similarity = 0.1;
    let context = context_with(config, backend.clone(), Arc::new(NoImageSearch), store.clone());
    let orchestrator = DiscoveryOrchestrator::new(context);

    let (report, result) = orchestrator
        .discover_with_rng(DiscoveryRequest::new(DESCRIPTION), StdRng::seed_from_u64(13))
        .collect()
        .await;
    let summary = result.unwrap();

    let first = report.figures.first().unwrap();
    assert_eq!(first.source, FigureSource::Immediate);
    assert_eq!(first.figure.name, "Ellen Ochoa");
    assert!(first.score.unwrap() > 0.0);

    // 已有完整档案的人物不再调研，也不会重复推送
    assert_eq!(backend.calls(RESEARCH), 1);
    assert_eq!(store.write_count("Ellen Ochoa").await, 0);
    assert_eq!(summary.immediate, 1);
    assert_eq!(summary.existing, 1);
    assert_eq!(
        report
            .figures
            .iter()
            .filter(|update| update.figure.name == "Ellen Ochoa")
            .count(),
        1
    );
}

#[tokio::test]
async fn test_rejected_text_is_salvaged() {
    let temp_dir = TempDir::new().unwrap();
    let backend = Arc::new(ScriptedBackend::new(|schema, _| match schema {
        EXTRACTION => Ok(neuroscientist_extraction()),
        SEARCH => Ok(json!({
            "figure_names": "Ellen Ochoa|Astronaut and physicist Sally Ride who flew aboard the shuttle Challenger"
        })),
        RESEARCH => Ok(complete_findings()),
        SALVAGE => Ok(json!({ "person_name": "Sally Ride" })),
        _ => Err(GenerationError::EmptyOutput),
    }));
    let store = Arc::new(MemoryResultStore::new());
    let mut config = test_config(temp_dir.path());
    config.discovery.salvage_rejected_names = true;
    let context = context_with(config, backend.clone(), Arc::new(NoImageSearch), store.clone());
    let orchestrator = DiscoveryOrchestrator::new(context);

    let (report, result) = orchestrator
        .discover_with_rng(DiscoveryRequest::new(DESCRIPTION), StdRng::seed_from_u64(21))
        .collect()
        .await;
    let summary = result.unwrap();

    assert_eq!(summary.salvaged, 1);
    assert!(summary.rejections.get("too_long").copied().unwrap_or(0) >= 1);
    assert!(report.figure("Sally Ride").is_some());
    assert_eq!(backend.calls(SALVAGE), 1);
    assert_eq!(store.write_count("Sally Ride").await, 1);
}

#[tokio::test]
async fn test_cancellation_stops_run_without_writes() {
    let temp_dir = TempDir::new().unwrap();
    let backend = Arc::new(
        standard_backend("Ellen Ochoa|Jaime Escalante")
            .with_delay(RESEARCH, Duration::from_secs(30)),
    );
    let store = Arc::new(MemoryResultStore::new());
    let orchestrator = orchestrator(&temp_dir, backend.clone(), store.clone());

    let mut run =
        orchestrator.discover_with_rng(DiscoveryRequest::new(DESCRIPTION), StdRng::seed_from_u64(4));

    while let Some(event) = run.events.next().await {
        if matches!(event, DiscoveryEvent::Candidate { .. }) {
            run.cancel();
            break;
        }
    }

    let result = tokio::time::timeout(Duration::from_secs(5), run.wait())
        .await
        .expect("cancelled run should finish promptly");
    assert!(matches!(result, Err(DiscoveryError::Cancelled)));
    assert_eq!(store.total_writes().await, 0);
}

#[tokio::test]
async fn test_timed_out_person_is_isolated() {
    let temp_dir = TempDir::new().unwrap();
    let backend = Arc::new(
        standard_backend("Ellen Ochoa|Jaime Escalante")
            .with_prompt_delay("Jaime Escalante", Duration::from_secs(5)),
    );
    let store = Arc::new(MemoryResultStore::new());
    let mut config = test_config(temp_dir.path());
    config.discovery.item_timeout_seconds = 1;
    let context = context_with(config, backend.clone(), Arc::new(NoImageSearch), store.clone());
    let orchestrator = DiscoveryOrchestrator::new(context);

    let (report, result) = orchestrator
        .discover_with_rng(DiscoveryRequest::new(DESCRIPTION), StdRng::seed_from_u64(17))
        .collect()
        .await;
    let summary = result.unwrap();

    assert_eq!(summary.failed, 1);
    assert_eq!(summary.succeeded, 1);
    assert!(report.figure("Ellen Ochoa").is_some());
    assert!(report.figure("Jaime Escalante").is_none());
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].0, "Jaime Escalante");
    assert_eq!(store.write_count("Ellen Ochoa").await, 1);
    assert_eq!(store.write_count("Jaime Escalante").await, 0);
}

#[tokio::test]
async fn test_persistence_failure_is_isolated() {
    let temp_dir = TempDir::new().unwrap();
    let backend = Arc::new(standard_backend("Ellen Ochoa|Jaime Escalante"));
    let store = Arc::new(FailingStore::new("Jaime Escalante"));
    let context = context_with(
        test_config(temp_dir.path()),
        backend.clone(),
        Arc::new(NoImageSearch),
        store.clone(),
    );
    let orchestrator = DiscoveryOrchestrator::new(context);

    let (report, result) = orchestrator
        .discover_with_rng(DiscoveryRequest::new(DESCRIPTION), StdRng::seed_from_u64(19))
        .collect()
        .await;
    let summary = result.unwrap();

    assert_eq!(summary.failed, 1);
    assert_eq!(summary.succeeded, 1);
    assert!(report.figure("Ellen Ochoa").is_some());
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].0, "Jaime Escalante");
    assert_eq!(store.inner.write_count("Ellen Ochoa").await, 1);
    assert!(store.inner.get("Jaime Escalante").await.unwrap().is_none());
}

#[tokio::test]
async fn test_refresh_on_cache_hit_counts_each_figure_once() {
    let temp_dir = TempDir::new().unwrap();
    let backend = Arc::new(standard_backend("Ellen Ochoa|Jaime Escalante"));
    let store = Arc::new(MemoryResultStore::new());

    let (_, first) = orchestrator(&temp_dir, backend.clone(), store.clone())
        .discover_with_rng(DiscoveryRequest::new(DESCRIPTION), StdRng::seed_from_u64(23))
        .collect()
        .await;
    first.unwrap();
    let search_calls = backend.calls(SEARCH);

    let mut config = test_config(temp_dir.path());
    config.discovery.refresh_on_cache_hit = true;
    let context = context_with(config, backend.clone(), Arc::new(NoImageSearch), store.clone());
    let (report, second) = DiscoveryOrchestrator::new(context)
        .discover_with_rng(DiscoveryRequest::new(DESCRIPTION), StdRng::seed_from_u64(29))
        .collect()
        .await;
    let summary = second.unwrap();

    assert_eq!(summary.status, DiscoveryStatus::CacheHit);
    assert!(backend.calls(SEARCH) > search_calls);
    assert_eq!(summary.existing, 2);
    assert_eq!(summary.succeeded, 2);
    assert!(summary.empty_reason.is_none());
    assert_eq!(report.figures.len(), 2);
    assert_eq!(backend.calls(RESEARCH), 2);
}

#[tokio::test]
async fn test_cache_hit_with_missing_figures_reports_reason() {
    let temp_dir = TempDir::new().unwrap();
    let backend = Arc::new(standard_backend("Ellen Ochoa|Jaime Escalante"));

    let (_, first) = orchestrator(&temp_dir, backend.clone(), Arc::new(MemoryResultStore::new()))
        .discover_with_rng(DiscoveryRequest::new(DESCRIPTION), StdRng::seed_from_u64(31))
        .collect()
        .await;
    first.unwrap();

    // 缓存仍在，但换成了一个空存储
    let (report, second) = orchestrator(&temp_dir, backend.clone(), Arc::new(MemoryResultStore::new()))
        .discover_with_rng(DiscoveryRequest::new(DESCRIPTION), StdRng::seed_from_u64(37))
        .collect()
        .await;
    let summary = second.unwrap();

    assert_eq!(summary.status, DiscoveryStatus::CacheHit);
    assert_eq!(summary.empty_reason, Some(EmptyReason::CachedFiguresMissing));
    assert!(report.figures.is_empty());
}
