//! Scenario lifecycle hooks
//!
//! Sequences every scenario through start, step failure capture and end,
//! and keeps results and artifacts consistent even when a previous process
//! was killed mid-scenario.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::browser::{Automation, ContextOptions};
use crate::config::{HarnessConfig, BUILD_SIGNAL_CONTENT};
use crate::context::{ScenarioContext, ScenarioScope};
use crate::data_bag::{DataBag, DataBagKey};
use crate::data_provider::{self, DataProvider};
use crate::error::HarnessResult;
use crate::identity::ScenarioLabel;
use crate::janitor::{ArtifactJanitor, Reconciliation};
use crate::logging::ScenarioLogRouter;
use crate::page::PageObjectFactory;
use crate::results::{FeatureResult, ScenarioResult};
use crate::retry::is_final_attempt;
use crate::scenario::{ScenarioMeta, ScenarioStatus};

/// What `on_scenario_end` did for one attempt
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioEndReport {
    pub name: String,
    pub status: ScenarioStatus,
    pub attempt: u32,
    pub final_attempt: bool,
    pub passed_recorded: bool,
    pub failed_result_path: Option<PathBuf>,
    pub build_signal_created: bool,
    /// Teardown errors that were logged and swallowed
    pub errors: Vec<String>,
}

/// Lifecycle orchestrator composing the ledger, janitor, aggregator and page cache
pub struct LifecycleOrchestrator {
    automation: Arc<dyn Automation>,
    data_provider: Arc<dyn DataProvider>,
    log_router: ScenarioLogRouter,
}

impl LifecycleOrchestrator {
    pub fn new(automation: Arc<dyn Automation>, data_provider: Arc<dyn DataProvider>) -> Self {
        Self {
            automation,
            data_provider,
            log_router: ScenarioLogRouter::new(),
        }
    }

    /// Orchestrator whose reference data comes from `config.reference_data`
    pub fn from_config(automation: Arc<dyn Automation>, config: &HarnessConfig) -> Self {
        Self::new(automation, data_provider::provider_for(config))
    }

    /// Route scenario logs through `router` (the one given to `init_logging`)
    pub fn with_log_router(mut self, router: ScenarioLogRouter) -> Self {
        self.log_router = router;
        self
    }

    /// Prepare the result tree and run-level state.
    ///
    /// Failures here are infrastructure failures and abort the run.
    pub async fn on_run_start(&self, ctx: &mut ScenarioContext) -> HarnessResult<()> {
        let config = ctx.run.config.clone();
        info!(
            "Run starting (environment: {}, browser: {}, max retries: {})",
            config.environment, config.browser, config.max_retry_count
        );

        ctx.run.ledger.reset();
        ctx.run.results.prepare_output_tree()?;

        let layout = &config.results;
        for dir in [layout.videos_dir(), layout.logs_dir(), layout.screenshots_dir()] {
            std::fs::create_dir_all(&dir)?;
        }

        if config.build_signal_path.exists() {
            std::fs::remove_file(&config.build_signal_path)?;
            debug!("Removed stale build signal {}", config.build_signal_path.display());
        }

        let mut global = DataBag::run();
        for (name, value) in self.data_provider.load_reference_data().await? {
            global.save_data(DataBagKey::ReferenceData(name), value)?;
        }
        info!("Loaded {} reference value(s) into the run data bag", global.len());
        ctx.run.global_data = global;

        Ok(())
    }

    /// Start one attempt of `meta`: reconcile any interrupted predecessor,
    /// count the attempt and open a fresh isolated browser context.
    pub async fn on_scenario_start(
        &self,
        ctx: &mut ScenarioContext,
        meta: &ScenarioMeta,
    ) -> HarnessResult<ScenarioLabel> {
        if ctx.has_scenario() {
            warn!("Scenario started while another is still in flight; tearing it down");
            self.abandon_in_flight(ctx).await;
        }

        self.reconcile(ctx);

        let identity = meta.identity();
        let label = ScenarioLabel::now(&identity);
        let attempt = ctx.run.ledger.begin_attempt(&identity);

        let mut data = DataBag::scenario();
        data.save_data(DataBagKey::ScenarioLabel, label.as_str())?;
        data.save_data(DataBagKey::ScenarioIdentity, identity.key())?;
        data.save_data(DataBagKey::IsRetry, attempt > 1)?;

        ctx.begin_scenario(ScenarioScope {
            meta: meta.clone(),
            identity: identity.clone(),
            label: label.clone(),
            attempt,
            data,
            browser_context: None,
            page: None,
            pages: PageObjectFactory::new(ctx.run.config.poll.clone()),
            started: Instant::now(),
        });

        // Recorded before the browser opens so a crash while opening is still reconciled
        ctx.run.run_state.mark_started(&label, &identity)?;

        let layout = ctx.run.config.results.clone();
        if let Err(e) = self.log_router.open(&layout.log_dir_for(label.as_str())) {
            warn!("Scenario log for {} unavailable: {}", label, e);
        }

        info!("Scenario '{}' attempt {} ({})", meta.name, attempt, label);

        let browser_context = self
            .automation
            .open_context(ContextOptions {
                record_video_dir: Some(layout.video_dir_for(label.as_str())),
                ..Default::default()
            })
            .await?;
        let page = browser_context.new_page().await;

        let scope = ctx.scenario_mut()?;
        scope.browser_context = Some(browser_context);
        scope.page = Some(page?);

        Ok(label)
    }

    /// Remember the failing step; only the last one before the scenario ends is kept
    pub fn on_step_failure(&self, ctx: &mut ScenarioContext, step_text: &str) -> HarnessResult<()> {
        debug!("Step failed: {}", step_text);
        ctx.data_bag_mut()?.save_data(DataBagKey::FailedStep, step_text)
    }

    /// Finish one attempt. Never fails: errors are logged, the teardown still
    /// runs and the run state is always marked complete.
    pub async fn on_scenario_end(
        &self,
        ctx: &mut ScenarioContext,
        meta: &ScenarioMeta,
        status: ScenarioStatus,
    ) -> ScenarioEndReport {
        let identity = meta.identity();
        let attempts = ctx.run.ledger.attempts(&identity);
        let final_attempt = is_final_attempt(status, attempts, ctx.run.config.max_retry_count);

        let mut report = ScenarioEndReport {
            name: meta.name.clone(),
            status,
            attempt: attempts,
            final_attempt,
            passed_recorded: false,
            failed_result_path: None,
            build_signal_created: false,
            errors: Vec::new(),
        };

        if let Err(e) = self.record_result(ctx, meta, &mut report).await {
            error!("Failed to record result of '{}': {}", meta.name, e);
            report.errors.push(e.to_string());
        }

        if status == ScenarioStatus::Failed && final_attempt {
            match raise_build_signal(&ctx.run.config) {
                Ok(created) => report.build_signal_created = created,
                Err(e) => {
                    error!("Failed to write build signal: {}", e);
                    report.errors.push(e.to_string());
                }
            }
        }

        self.teardown(ctx, &mut report.errors).await;

        if let Err(e) = ctx.run.run_state.mark_complete() {
            error!("Failed to mark scenario '{}' complete: {}", meta.name, e);
            report.errors.push(e.to_string());
        }

        report
    }

    /// Write the passed results and release run-level resources
    pub async fn on_run_end(&self, ctx: &mut ScenarioContext) -> HarnessResult<PathBuf> {
        if ctx.has_scenario() {
            warn!("Run ending with a scenario still in flight; tearing it down");
            self.abandon_in_flight(ctx).await;
        }

        let path = ctx.run.results.flush_passed()?;
        ctx.run.global_data.clear();

        if let Err(e) = self.data_provider.close().await {
            warn!("Failed to close data provider: {}", e);
        }
        if let Err(e) = self.automation.close().await {
            warn!("Failed to close browser: {}", e);
        }

        info!("Run finished");
        Ok(path)
    }

    fn reconcile(&self, ctx: &mut ScenarioContext) {
        let janitor = ArtifactJanitor::new(ctx.run.config.results.clone());
        let run = &mut ctx.run;
        let outcome = janitor.reconcile_incomplete_scenario(run.run_state.state_mut(), &mut run.ledger);
        if let Reconciliation::Recovered { directory, failed, .. } = outcome {
            if !failed.is_empty() {
                warn!("{} orphaned dir(s) of {} were left behind", failed.len(), directory);
            }
            if let Err(e) = run.run_state.save() {
                warn!("Failed to persist reconciled run state for {}: {}", directory, e);
            }
        }
    }

    async fn record_result(
        &self,
        ctx: &mut ScenarioContext,
        meta: &ScenarioMeta,
        report: &mut ScenarioEndReport,
    ) -> HarnessResult<()> {
        let retries = report.attempt.saturating_sub(1);

        if report.status == ScenarioStatus::Passed {
            let layout = ctx.run.config.results.clone();
            let scope = ctx.scenario()?;
            let duration_ms = scope.started.elapsed().as_millis() as u64;

            let (screenshot, video) = match &scope.page {
                Some(page) => {
                    let shot = page.screenshot(&layout.screenshot_for(&scope.label)).await?;
                    (Some(shot), page.video_path().await?)
                }
                None => (None, None),
            };

            ctx.run.results.record_passed(
                &meta.feature_name,
                &meta.feature_path,
                ScenarioResult {
                    name: meta.name.clone(),
                    duration_ms,
                    retries,
                    failed_step: None,
                    screenshot,
                    video,
                },
            );
            report.passed_recorded = true;
            info!("✓ {} ({} ms, {} retries)", meta.name, duration_ms, retries);
        } else if report.status == ScenarioStatus::Failed && report.final_attempt {
            let scope = ctx.scenario()?;
            let failed_step: Option<String> = scope.data.get_data(&DataBagKey::FailedStep)?;
            let feature = FeatureResult::new(&meta.feature_name, &meta.feature_path).with_scenario(
                ScenarioResult {
                    name: meta.name.clone(),
                    duration_ms: scope.started.elapsed().as_millis() as u64,
                    retries,
                    failed_step: failed_step.clone(),
                    screenshot: None,
                    video: None,
                },
            );
            report.failed_result_path = Some(ctx.run.results.write_failed_result(&feature)?);
            error!(
                "✗ {} - {} (after {} retries)",
                meta.name,
                failed_step.as_deref().unwrap_or("unknown step"),
                retries
            );
        } else if report.status == ScenarioStatus::Failed {
            warn!(
                "Scenario '{}' failed on attempt {}; it will be retried",
                meta.name, report.attempt
            );
        } else {
            info!("Scenario '{}' ended as {:?}", meta.name, report.status);
        }

        Ok(())
    }

    /// Tear down a scenario that never reached `on_scenario_end`. Its teardown
    /// did run, so it is marked complete and its artifacts are kept.
    async fn abandon_in_flight(&self, ctx: &mut ScenarioContext) {
        let mut errors = Vec::new();
        self.teardown(ctx, &mut errors).await;
        if let Err(e) = ctx.run.run_state.mark_complete() {
            warn!("Failed to mark abandoned scenario complete: {}", e);
        }
    }

    /// Close the page and context, drop the scenario data bag and dispose cached page objects
    async fn teardown(&self, ctx: &mut ScenarioContext, errors: &mut Vec<String>) {
        let Some(mut scope) = ctx.end_scenario() else {
            return;
        };

        if let Some(page) = scope.page.take() {
            if let Err(e) = page.close().await {
                error!("Failed to close page for {}: {}", scope.label, e);
                errors.push(e.to_string());
            }
        }

        if let Some(browser_context) = scope.browser_context.take() {
            if let Err(e) = browser_context.close().await {
                error!("Failed to close browser context for {}: {}", scope.label, e);
                errors.push(e.to_string());
            }
        }

        scope.pages.clear();
        scope.data.clear();
        self.log_router.close();
    }
}

/// Create the build signal file unless it already exists. Returns whether it was created.
fn raise_build_signal(config: &HarnessConfig) -> HarnessResult<bool> {
    let path = &config.build_signal_path;
    if path.exists() {
        return Ok(false);
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, BUILD_SIGNAL_CONTENT)?;
    warn!("Build signal raised at {}", path.display());
    Ok(true)
}
