//! Concurrent check execution
//!
//! The runner fans a report's checks out over tokio tasks, bounded by a
//! semaphore sized like a worker pool. Each check produces one or more raw
//! outcomes which are noised here, turned into [`ReportResult`]s and handed to
//! a [`CompletionSink`] as they become available.
//!
//! A check that fails, panics or overruns its deadline yields exactly one
//! error result and never disturbs its siblings.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::checks::{Check, CheckDefinition, CheckOutcome};
use crate::config::RunnerConfig;
use crate::datastore::DataStore;
use crate::error::EngineResult;
use crate::privacy::NoiseMechanism;
use crate::report::{ReportId, ReportResult};

/// Receives the output of a run, check by check.
///
/// For every check the runner first announces how many results it will
/// deliver, then delivers them. A stratified check announces one result per
/// discovered stratum, every other outcome announces one.
#[async_trait]
pub trait CompletionSink: Send + Sync {
    async fn check_completed(
        &self,
        report_id: ReportId,
        check: &CheckDefinition,
        result_count: usize,
    ) -> EngineResult<()>;

    async fn result_ready(&self, report_id: ReportId, result: ReportResult) -> EngineResult<()>;
}

/// Counters for one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub checks: usize,
    pub results: usize,
    pub failures: usize,
}

#[derive(Debug, Clone)]
pub struct CheckRunner {
    noise: NoiseMechanism,
    concurrency: usize,
    check_timeout: Option<Duration>,
}

impl Default for CheckRunner {
    fn default() -> Self {
        Self::new(NoiseMechanism::default())
    }
}

impl CheckRunner {
    pub fn new(noise: NoiseMechanism) -> Self {
        Self {
            noise,
            concurrency: RunnerConfig::default().effective_concurrency(),
            check_timeout: None,
        }
    }

    pub fn from_config(config: &RunnerConfig, noise: NoiseMechanism) -> Self {
        Self::new(noise)
            .with_concurrency(config.effective_concurrency())
            .with_check_timeout(config.check_timeout())
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_check_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.check_timeout = timeout;
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Run every check for `report_id`, reporting into `sink`.
    ///
    /// Returns once every check has been executed and every result delivered.
    pub async fn run(
        &self,
        report_id: ReportId,
        checks: &[Check],
        store: Arc<dyn DataStore>,
        sink: Arc<dyn CompletionSink>,
    ) -> RunSummary {
        let started = Instant::now();
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();

        info!(
            %report_id,
            checks = checks.len(),
            concurrency = self.concurrency,
            "Running checks"
        );

        for check in checks.iter().cloned() {
            let semaphore = Arc::clone(&semaphore);
            let store = Arc::clone(&store);
            let sink = Arc::clone(&sink);
            let noise = self.noise.clone();
            let timeout = self.check_timeout;

            tasks.spawn(async move {
                let definition = check.definition().clone();
                let results = {
                    // the semaphore is never closed, so acquiring cannot fail
                    let _permit = semaphore.acquire_owned().await.ok();
                    execute_check(check, store, timeout)
                        .await
                        .into_results(&definition, &noise)
                };
                deliver(report_id, &definition, results, sink.as_ref()).await
            });
        }

        let mut summary = RunSummary::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((results, failures)) => {
                    summary.checks += 1;
                    summary.results += results;
                    summary.failures += failures;
                }
                // delivery itself never panics; reaching this means the runtime is shutting down
                Err(e) => error!(%report_id, "Check task aborted: {e}"),
            }
        }

        info!(
            %report_id,
            results = summary.results,
            failures = summary.failures,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Checks finished"
        );
        summary
    }
}

/// Raw output of one check execution
enum Execution {
    Outcomes(Vec<(Option<String>, CheckOutcome)>),
    Failed(String),
}

impl Execution {
    fn into_results(self, definition: &CheckDefinition, noise: &NoiseMechanism) -> Vec<ReportResult> {
        match self {
            Execution::Failed(message) => {
                warn!(check = %definition.name, "Check failed: {message}");
                vec![ReportResult::failed(definition, None, &message)]
            }
            Execution::Outcomes(outcomes) => outcomes
                .into_iter()
                .map(|(stratum, outcome)| protect(definition, stratum, outcome, noise))
                .collect(),
        }
    }
}

/// Run the check on its own task so a panic or an overrun stays contained
async fn execute_check(
    check: Check,
    store: Arc<dyn DataStore>,
    timeout: Option<Duration>,
) -> Execution {
    let handle = tokio::spawn(async move { evaluate(&check, store.as_ref()).await });
    let abort = handle.abort_handle();

    let joined = match timeout {
        Some(limit) => match tokio::time::timeout(limit, handle).await {
            Ok(joined) => joined,
            Err(_) => {
                abort.abort();
                return Execution::Failed(format!(
                    "check timed out after {}s",
                    limit.as_secs_f64()
                ));
            }
        },
        None => handle.await,
    };

    match joined {
        Ok(Ok(outcomes)) => Execution::Outcomes(outcomes),
        Ok(Err(e)) => Execution::Failed(format!("{e:#}")),
        Err(e) if e.is_panic() => Execution::Failed("check panicked".to_string()),
        Err(e) => Execution::Failed(e.to_string()),
    }
}

async fn evaluate(
    check: &Check,
    store: &dyn DataStore,
) -> anyhow::Result<Vec<(Option<String>, CheckOutcome)>> {
    match check {
        Check::Simple(check) => Ok(vec![(None, check.execute(store).await?)]),
        Check::Stratified(check) => {
            let mut strata: Vec<_> = check
                .execute_with_stratification(store)
                .await?
                .into_iter()
                .map(|(stratum, outcome)| (Some(stratum), outcome))
                .collect();
            strata.sort_by(|(a, _), (b, _)| a.cmp(b));
            Ok(strata)
        }
    }
}

/// Apply noise to a raw outcome.
///
/// Every stratum is noised with the check's full epsilon. Strata partition
/// the population, so each patient contributes to one stratum only and the
/// released strata together spend no more than epsilon (parallel composition).
fn protect(
    definition: &CheckDefinition,
    stratum: Option<String>,
    outcome: CheckOutcome,
    noise: &NoiseMechanism,
) -> ReportResult {
    match noise.add_noise(outcome.count, definition.epsilon, definition.sensitivity) {
        Ok(value) => {
            let mut result = ReportResult::from_outcome(definition, stratum, outcome);
            result.obfuscated_value = Some(value);
            result
        }
        Err(e) => {
            // a misconfigured check must never publish an unprotected count
            error!(check = %definition.name, "Cannot add noise: {e}");
            ReportResult::failed(definition, stratum, &e.to_string())
        }
    }
}

/// Announce and hand over the results of one check. Returns (delivered, failed).
async fn deliver(
    report_id: ReportId,
    definition: &CheckDefinition,
    results: Vec<ReportResult>,
    sink: &dyn CompletionSink,
) -> (usize, usize) {
    let count = results.len();
    let failures = results.iter().filter(|r| r.is_failure()).count();

    if let Err(e) = sink.check_completed(report_id, definition, count).await {
        error!(%report_id, check = %definition.name, "Failed to record check completion: {e}");
    }

    for result in results {
        debug!(
            %report_id,
            result = %result.display_name(),
            value = ?result.obfuscated_value,
            "Result ready"
        );
        if let Err(e) = sink.result_ready(report_id, result).await {
            error!(%report_id, check = %definition.name, "Failed to record result: {e}");
        }
    }

    (count, failures)
}
