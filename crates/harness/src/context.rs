//! Explicit scenario context threaded through every lifecycle hook
//!
//! Run-level state lives in [`RunScope`] for the whole run; per-scenario
//! resources live in [`ScenarioScope`] and only exist between
//! `on_scenario_start` and `on_scenario_end`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::browser::{BrowserContext, BrowserPage};
use crate::config::HarnessConfig;
use crate::data_bag::DataBag;
use crate::error::{HarnessError, HarnessResult};
use crate::identity::{ScenarioIdentity, ScenarioLabel};
use crate::page::{PageObject, PageObjectFactory};
use crate::results::ResultAggregator;
use crate::retry::RetryLedger;
use crate::run_state::RunStateStore;
use crate::scenario::ScenarioMeta;

/// State that lives for the whole run
pub struct RunScope {
    pub config: HarnessConfig,
    pub ledger: RetryLedger,
    pub run_state: RunStateStore,
    /// Data shared by every scenario of the run
    pub global_data: DataBag,
    pub results: ResultAggregator,
}

/// Resources of the scenario in flight
pub struct ScenarioScope {
    pub meta: ScenarioMeta,
    pub identity: ScenarioIdentity,
    pub label: ScenarioLabel,
    pub attempt: u32,
    pub data: DataBag,
    pub browser_context: Option<Box<dyn BrowserContext>>,
    pub page: Option<Arc<dyn BrowserPage>>,
    pub pages: PageObjectFactory,
    pub started: Instant,
}

pub struct ScenarioContext {
    pub run: RunScope,
    scenario: Option<ScenarioScope>,
}

impl ScenarioContext {
    /// Build a context for one worker. Loads any run state left by a previous process.
    pub fn new(config: HarnessConfig) -> Self {
        let layout = config.results.clone();
        Self {
            run: RunScope {
                ledger: RetryLedger::new(),
                run_state: RunStateStore::load(layout.run_state_file()),
                global_data: DataBag::run(),
                results: ResultAggregator::new(layout),
                config,
            },
            scenario: None,
        }
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.run.config
    }

    pub fn has_scenario(&self) -> bool {
        self.scenario.is_some()
    }

    pub fn scenario(&self) -> HarnessResult<&ScenarioScope> {
        self.scenario.as_ref().ok_or(HarnessError::NoScenarioInFlight)
    }

    pub fn scenario_mut(&mut self) -> HarnessResult<&mut ScenarioScope> {
        self.scenario.as_mut().ok_or(HarnessError::NoScenarioInFlight)
    }

    /// Scenario data bag
    pub fn data_bag(&self) -> HarnessResult<&DataBag> {
        Ok(&self.scenario()?.data)
    }

    pub fn data_bag_mut(&mut self) -> HarnessResult<&mut DataBag> {
        Ok(&mut self.scenario_mut()?.data)
    }

    pub fn global_data(&self) -> &DataBag {
        &self.run.global_data
    }

    /// Page of the scenario in flight
    pub fn page(&self) -> HarnessResult<Arc<dyn BrowserPage>> {
        self.scenario()?
            .page
            .clone()
            .ok_or_else(|| HarnessError::Automation("scenario has no open page".into()))
    }

    /// Navigate the current page to `path` under the configured base URL,
    /// bounded by the navigation timeout. Absolute URLs are used as given.
    pub async fn navigate(&self, path: &str) -> HarnessResult<()> {
        let url = resolve_url(&self.run.config.base_url, path);
        self.page()?
            .goto(&url, self.run.config.timeouts.navigation)
            .await
    }

    /// Timeout for clicks and other single element actions
    pub fn action_timeout(&self) -> Duration {
        self.run.config.timeouts.action
    }

    /// Page object of type `P` bound to the current page
    pub async fn page_object<P: PageObject>(&mut self) -> HarnessResult<Arc<P>> {
        let page = self.page()?;
        self.scenario_mut()?.pages.get::<P>(&page, true).await
    }

    pub(crate) fn begin_scenario(&mut self, scope: ScenarioScope) -> Option<ScenarioScope> {
        self.scenario.replace(scope)
    }

    pub(crate) fn end_scenario(&mut self) -> Option<ScenarioScope> {
        self.scenario.take()
    }
}

fn resolve_url(base_url: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    match (base_url.ends_with('/'), path.starts_with('/')) {
        (true, true) => format!("{}{}", base_url, &path[1..]),
        (false, false) if !path.is_empty() => format!("{}/{}", base_url, path),
        _ => format!("{}{}", base_url, path),
    }
}
