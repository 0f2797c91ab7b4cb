//! Suite runner driving scenarios through the lifecycle hooks

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::browser::Automation;

use crate::catalog::{filter_by_tag, FeatureSpec};
use crate::config::HarnessConfig;
use crate::context::ScenarioContext;
use crate::error::HarnessResult;
use crate::hooks::LifecycleOrchestrator;
use crate::logging::{init_logging, ScenarioLogRouter};
use crate::report::ReportSummary;
use crate::scenario::{ScenarioExecutor, ScenarioMeta, ScenarioOutcome, ScenarioStatus};

/// Result of running one scenario across all of its attempts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioRun {
    pub name: String,
    pub status: ScenarioStatus,
    pub attempts: u32,
    pub failed_step: Option<String>,
    pub duration_ms: u64,
    pub errors: Vec<String>,
}

/// Result of running a list of scenarios
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteResult {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Scenarios that needed more than one attempt
    pub retried: usize,
    pub duration_ms: u64,
    /// Whether the build signal exists after the run
    pub build_failed: bool,
    pub results: Vec<ScenarioRun>,
}

pub struct SuiteRunner {
    orchestrator: LifecycleOrchestrator,
    executor: Arc<dyn ScenarioExecutor>,
}

impl SuiteRunner {
    pub fn new(orchestrator: LifecycleOrchestrator, executor: Arc<dyn ScenarioExecutor>) -> Self {
        Self { orchestrator, executor }
    }

    /// Load configuration from the environment, install logging and build a
    /// runner plus the context it drives
    pub fn from_env(
        automation: Arc<dyn Automation>,
        executor: Arc<dyn ScenarioExecutor>,
    ) -> HarnessResult<(Self, ScenarioContext)> {
        Ok(Self::from_config(HarnessConfig::from_env()?, automation, executor))
    }

    pub fn from_config(
        config: HarnessConfig,
        automation: Arc<dyn Automation>,
        executor: Arc<dyn ScenarioExecutor>,
    ) -> (Self, ScenarioContext) {
        let router = ScenarioLogRouter::new();
        if let Err(e) = init_logging(&config.log, router.clone()) {
            warn!("Scenario log files disabled: {}", e);
        }

        let orchestrator = LifecycleOrchestrator::from_config(automation, &config).with_log_router(router);
        (Self::new(orchestrator, executor), ScenarioContext::new(config))
    }

    pub fn orchestrator(&self) -> &LifecycleOrchestrator {
        &self.orchestrator
    }

    /// Load every feature catalog under `dir` and run its scenarios,
    /// optionally only those carrying `tag`
    pub async fn run_catalog(
        &self,
        ctx: &mut ScenarioContext,
        dir: &Path,
        tag: Option<&str>,
    ) -> HarnessResult<SuiteResult> {
        let specs = FeatureSpec::load_all(dir)?;
        let scenarios = match tag {
            Some(tag) => filter_by_tag(&specs, tag),
            None => specs.iter().flat_map(|spec| spec.scenarios()).collect(),
        };
        self.run_all(ctx, &scenarios).await
    }

    /// Run scenarios carrying `tag`
    pub async fn run_tagged(
        &self,
        ctx: &mut ScenarioContext,
        scenarios: &[ScenarioMeta],
        tag: &str,
    ) -> HarnessResult<SuiteResult> {
        let filtered: Vec<ScenarioMeta> = scenarios
            .iter()
            .filter(|s| s.has_tag(tag))
            .cloned()
            .collect();
        self.run_all(ctx, &filtered).await
    }

    /// Run every scenario, retrying failures, then write the passed results and summary
    pub async fn run_all(
        &self,
        ctx: &mut ScenarioContext,
        scenarios: &[ScenarioMeta],
    ) -> HarnessResult<SuiteResult> {
        let start = Instant::now();
        let mut results = Vec::with_capacity(scenarios.len());
        let mut passed = 0;
        let mut failed = 0;
        let mut skipped = 0;
        let mut retried = 0;

        self.orchestrator.on_run_start(ctx).await?;

        info!("Running {} scenario(s)...", scenarios.len());

        for meta in scenarios {
            let run = self.run_scenario(ctx, meta).await;
            match run.status {
                ScenarioStatus::Passed => passed += 1,
                ScenarioStatus::Failed => failed += 1,
                _ => skipped += 1,
            }
            if run.attempts > 1 {
                retried += 1;
            }
            results.push(run);
        }

        self.orchestrator.on_run_end(ctx).await?;

        let layout = ctx.run.config.results.clone();
        ReportSummary::load(&layout)?.write(&layout)?;

        let duration_ms = start.elapsed().as_millis() as u64;
        let build_failed = ctx.run.config.build_signal_path.exists();

        info!("");
        info!(
            "Scenario Results: {} passed, {} failed, {} skipped, {} retried ({} ms)",
            passed, failed, skipped, retried, duration_ms
        );

        Ok(SuiteResult {
            total: scenarios.len(),
            passed,
            failed,
            skipped,
            retried,
            duration_ms,
            build_failed,
            results,
        })
    }

    /// Run one scenario until it passes, ends in a non-failure status or
    /// exhausts its retries
    pub async fn run_scenario(&self, ctx: &mut ScenarioContext, meta: &ScenarioMeta) -> ScenarioRun {
        let start = Instant::now();
        let max_retry_count = ctx.run.config.max_retry_count;
        let mut errors = Vec::new();

        loop {
            let outcome = match self.orchestrator.on_scenario_start(ctx, meta).await {
                Ok(label) => {
                    debug!("Executing '{}' as {}", meta.name, label);
                    self.executor.run(meta, ctx).await
                }
                Err(e) => {
                    error!("Scenario '{}' setup failed: {}", meta.name, e);
                    ScenarioOutcome::failed(format!("scenario setup: {}", e))
                }
            };

            if let Some(step) = &outcome.failed_step {
                // Setup may have failed before a data bag existed
                if let Err(e) = self.orchestrator.on_step_failure(ctx, step) {
                    debug!("Failed step not recorded: {}", e);
                }
            }

            let report = self.orchestrator.on_scenario_end(ctx, meta, outcome.status).await;
            errors.extend(report.errors);

            let budget_spent = report.attempt > max_retry_count;
            if report.final_attempt || budget_spent || report.status != ScenarioStatus::Failed {
                return ScenarioRun {
                    name: meta.name.clone(),
                    status: report.status,
                    attempts: report.attempt,
                    failed_step: outcome.failed_step,
                    duration_ms: start.elapsed().as_millis() as u64,
                    errors,
                };
            }
        }
    }
}
