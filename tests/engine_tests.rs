//! End-to-end report generation through the public API

use anyhow::bail;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use quality_agent::checks::{
    Check, CheckDefinition, CheckOutcome, SimpleCheck, StratifiedCheck, builtin_checks,
};
use quality_agent::config::AgentConfig;
use quality_agent::datastore::{BundleStore, DataStore};
use quality_agent::privacy::{NoiseMechanism, UniformSource};
use quality_agent::report::{
    EventBus, InMemoryReportRepository, JsonReportRepository, ReportEvent, ReportOrchestrator,
    ReportRepository, ReportStatus,
};
use quality_agent::runner::CheckRunner;
use serde_json::json;
use tempfile::TempDir;

const WAIT: Duration = Duration::from_secs(10);

/// Always samples the distribution's median, i.e. zero noise
struct ZeroNoise;

impl UniformSource for ZeroNoise {
    fn next_unit(&self) -> f64 {
        0.5
    }
}

struct FixedCount {
    definition: CheckDefinition,
    count: u64,
}

#[async_trait]
impl SimpleCheck for FixedCount {
    fn definition(&self) -> &CheckDefinition {
        &self.definition
    }

    async fn execute(&self, _store: &dyn DataStore) -> anyhow::Result<CheckOutcome> {
        Ok(CheckOutcome::new(self.count, Default::default()))
    }
}

struct Unreachable(CheckDefinition);

#[async_trait]
impl SimpleCheck for Unreachable {
    fn definition(&self) -> &CheckDefinition {
        &self.0
    }

    async fn execute(&self, _store: &dyn DataStore) -> anyhow::Result<CheckOutcome> {
        bail!("connection refused")
    }
}

struct ByGender(CheckDefinition);

#[async_trait]
impl SimpleCheck for ByGender {
    fn definition(&self) -> &CheckDefinition {
        &self.0
    }

    async fn execute(&self, _store: &dyn DataStore) -> anyhow::Result<CheckOutcome> {
        Ok(CheckOutcome::new(43, Default::default()))
    }
}

#[async_trait]
impl StratifiedCheck for ByGender {
    async fn execute_with_stratification(
        &self,
        _store: &dyn DataStore,
    ) -> anyhow::Result<HashMap<String, CheckOutcome>> {
        Ok(HashMap::from([
            ("female".to_string(), CheckOutcome::new(3, Default::default())),
            ("male".to_string(), CheckOutcome::new(40, Default::default())),
        ]))
    }
}

fn population(size: usize) -> BundleStore {
    BundleStore::from_resources(
        (0..size).map(|n| json!({"resourceType": "Patient", "id": format!("p{n}")})),
    )
    .unwrap()
}

fn scenario_checks() -> Vec<Check> {
    vec![
        Check::simple(FixedCount {
            definition: CheckDefinition::new(1, "Fifty")
                .with_epsilon(1.0)
                .with_sensitivity(1.0),
            count: 50,
        }),
        Check::simple(Unreachable(CheckDefinition::new(2, "Unreachable"))),
        Check::stratified(ByGender(
            CheckDefinition::new(3, "By gender").with_epsilon(0.3),
        )),
    ]
}

fn orchestrator(
    repository: Arc<dyn ReportRepository>,
    store: BundleStore,
    checks: Vec<Check>,
) -> Arc<ReportOrchestrator> {
    Arc::new(ReportOrchestrator::new(
        repository,
        Arc::new(store),
        checks,
        CheckRunner::new(NoiseMechanism::new(Arc::new(ZeroNoise))),
        EventBus::new(),
    ))
}

#[tokio::test]
async fn test_report_with_simple_failing_and_stratified_checks() {
    let orchestrator = orchestrator(
        Arc::new(InMemoryReportRepository::new()),
        population(120),
        scenario_checks(),
    );
    let dispatcher = orchestrator.start();

    let report = orchestrator.generate_and_wait(WAIT).await.unwrap();
    dispatcher.abort();

    assert_eq!(report.status, ReportStatus::Generated);
    assert_eq!(report.number_of_entities, Some(120));
    assert_eq!(report.results.len(), 4);
    assert_eq!(report.failed_results().count(), 1);

    let fifty = report.results.iter().find(|r| r.check_id == 1).unwrap();
    assert_eq!(fifty.raw_value, 50);
    assert_eq!(fifty.obfuscated_value, Some(50.0));

    let failed = report.results.iter().find(|r| r.check_id == 2).unwrap();
    assert_eq!(failed.error.as_deref(), Some("connection refused"));
    assert_eq!(failed.obfuscated_value, None);

    let stratum = |name: &str| {
        report
            .results
            .iter()
            .find(|r| r.check_id == 3 && r.stratum.as_deref() == Some(name))
            .unwrap()
    };
    assert_eq!(stratum("female").raw_value, 3);
    assert_eq!(stratum("female").obfuscated_value, Some(0.0));
    assert_eq!(stratum("male").obfuscated_value, Some(40.0));
    assert_eq!(stratum("male").epsilon, 0.3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_reports_finalize_independently() {
    let orchestrator = orchestrator(
        Arc::new(InMemoryReportRepository::new()),
        population(30),
        scenario_checks(),
    );
    let mut events = orchestrator.bus().subscribe();
    let dispatcher = orchestrator.start();

    let (first, second) = tokio::join!(
        orchestrator.generate_report(),
        orchestrator.generate_report()
    );
    let (first, second) = (first.unwrap(), second.unwrap());
    assert_ne!(first, second);

    let mut finalized = Vec::new();
    tokio::time::timeout(WAIT, async {
        while finalized.len() < 2 {
            if let Some(ReportEvent::ReportFinalized { report_id }) = events.recv().await {
                finalized.push(report_id);
            }
        }
    })
    .await
    .unwrap();
    dispatcher.abort();

    finalized.sort();
    let mut expected = vec![first, second];
    expected.sort();
    assert_eq!(finalized, expected);

    for id in [first, second] {
        let report = orchestrator.get_by_id(id).await.unwrap();
        assert!(report.is_generated());
        assert_eq!(report.results.len(), 4);
        assert_eq!(report.number_of_entities, Some(30));
    }
}

#[tokio::test]
async fn test_builtin_checks_on_fixture_bundle() {
    let temp_dir = TempDir::new().unwrap();
    let repository = Arc::new(JsonReportRepository::open(temp_dir.path()).await.unwrap());
    let store = BundleStore::load(Path::new("tests/fixtures/bundle.json")).unwrap();
    let orchestrator = orchestrator(
        repository.clone(),
        store,
        builtin_checks(&AgentConfig::default()),
    );
    let dispatcher = orchestrator.start();

    let report = orchestrator.generate_and_wait(WAIT).await.unwrap();
    dispatcher.abort();

    assert_eq!(report.number_of_entities, Some(5));
    assert!(report.failed_results().next().is_none());

    let raw = |id: u64, stratum: Option<&str>| {
        report
            .results
            .iter()
            .find(|r| r.check_id == id && r.stratum.as_deref() == stratum)
            .map(|r| r.raw_value)
            .unwrap()
    };
    assert_eq!(raw(1000, None), 2);
    assert_eq!(raw(1001, None), 1);
    assert_eq!(raw(1002, Some("female")), 2);
    assert_eq!(raw(1002, Some("male")), 1);
    assert_eq!(raw(1002, Some("unknown")), 1);

    // every released value is a low count and therefore suppressed
    assert!(report
        .results
        .iter()
        .all(|r| r.obfuscated_value == Some(0.0)));

    // persisted state matches what the orchestrator returned
    let stored = repository.find_by_id(report.id).await.unwrap().unwrap();
    assert_eq!(stored, report);
}

#[tokio::test]
async fn test_listing_reports() {
    let orchestrator = orchestrator(
        Arc::new(InMemoryReportRepository::new()),
        population(0),
        vec![],
    );
    let dispatcher = orchestrator.start();

    let first = orchestrator.generate_and_wait(WAIT).await.unwrap();
    let second = orchestrator.generate_and_wait(WAIT).await.unwrap();
    dispatcher.abort();

    let listed: Vec<_> = orchestrator
        .list()
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(listed, vec![first.id, second.id]);
}
