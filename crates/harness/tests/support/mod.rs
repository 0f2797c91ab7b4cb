//! In-process browser and scenario fakes shared by the integration tests

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use scenario_harness::browser::{Automation, BrowserContext, BrowserPage, ContextOptions};
use scenario_harness::config::{HarnessConfig, ResultsLayout};
use scenario_harness::data_bag::DataBagKey;
use scenario_harness::poll::PollConfig;
use scenario_harness::{HarnessError, HarnessResult, ScenarioContext, ScenarioExecutor, ScenarioMeta, ScenarioOutcome};

/// Everything the fake browser was asked to do
#[derive(Debug, Default)]
pub struct BrowserLog {
    pub contexts_opened: usize,
    pub contexts_closed: usize,
    pub pages_opened: usize,
    pub pages_closed: usize,
    pub video_dirs: Vec<Option<PathBuf>>,
    pub screenshots: Vec<PathBuf>,
    pub visited: Vec<String>,
    pub browser_closed: bool,
}

/// Switches for failures the fake browser should produce
#[derive(Debug, Default)]
pub struct Faults {
    pub open_context: bool,
    pub close_page: bool,
    pub close_context: bool,
}

#[derive(Default)]
pub struct FakeAutomation {
    pub log: Arc<Mutex<BrowserLog>>,
    pub faults: Arc<Mutex<Faults>>,
    /// Matching element count per selector, for every page
    pub elements: Arc<Mutex<HashMap<String, usize>>>,
}

impl FakeAutomation {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl Automation for FakeAutomation {
    async fn open_context(&self, options: ContextOptions) -> HarnessResult<Box<dyn BrowserContext>> {
        if self.faults.lock().open_context {
            return Err(HarnessError::Automation("browser crashed".into()));
        }
        let mut log = self.log.lock();
        log.contexts_opened += 1;
        log.video_dirs.push(options.record_video_dir.clone());
        Ok(Box::new(FakeContext {
            log: self.log.clone(),
            faults: self.faults.clone(),
            elements: self.elements.clone(),
            video_dir: options.record_video_dir,
        }))
    }

    async fn close(&self) -> HarnessResult<()> {
        self.log.lock().browser_closed = true;
        Ok(())
    }
}

pub struct FakeContext {
    log: Arc<Mutex<BrowserLog>>,
    faults: Arc<Mutex<Faults>>,
    elements: Arc<Mutex<HashMap<String, usize>>>,
    video_dir: Option<PathBuf>,
}

#[async_trait]
impl BrowserContext for FakeContext {
    async fn new_page(&self) -> HarnessResult<Arc<dyn BrowserPage>> {
        self.log.lock().pages_opened += 1;
        Ok(Arc::new(FakePage {
            log: self.log.clone(),
            faults: self.faults.clone(),
            elements: self.elements.clone(),
            video_dir: self.video_dir.clone(),
            url: Mutex::new("about:blank".into()),
        }))
    }

    async fn close(&self) -> HarnessResult<()> {
        self.log.lock().contexts_closed += 1;
        if self.faults.lock().close_context {
            return Err(HarnessError::Automation("context already gone".into()));
        }
        Ok(())
    }
}

pub struct FakePage {
    log: Arc<Mutex<BrowserLog>>,
    faults: Arc<Mutex<Faults>>,
    elements: Arc<Mutex<HashMap<String, usize>>>,
    video_dir: Option<PathBuf>,
    url: Mutex<String>,
}

impl FakePage {
    /// Page that is not attached to any recorded browser
    pub fn detached() -> Arc<Self> {
        Arc::new(Self {
            log: Arc::default(),
            faults: Arc::default(),
            elements: Arc::default(),
            video_dir: None,
            url: Mutex::new("about:blank".into()),
        })
    }

    pub fn with_elements(elements: Arc<Mutex<HashMap<String, usize>>>) -> Arc<Self> {
        Arc::new(Self {
            log: Arc::default(),
            faults: Arc::default(),
            elements,
            video_dir: None,
            url: Mutex::new("about:blank".into()),
        })
    }
}

#[async_trait]
impl BrowserPage for FakePage {
    async fn url(&self) -> HarnessResult<String> {
        Ok(self.url.lock().clone())
    }

    async fn goto(&self, url: &str, _timeout: Duration) -> HarnessResult<()> {
        if url.contains("unreachable") {
            return Err(HarnessError::Timeout(format!("page.goto: {}", url)));
        }
        *self.url.lock() = url.to_string();
        self.log.lock().visited.push(url.to_string());
        Ok(())
    }

    async fn screenshot(&self, path: &Path) -> HarnessResult<PathBuf> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, b"png")?;
        self.log.lock().screenshots.push(path.to_path_buf());
        Ok(path.to_path_buf())
    }

    async fn video_path(&self) -> HarnessResult<Option<PathBuf>> {
        Ok(self.video_dir.as_ref().map(|dir| dir.join("page.webm")))
    }

    async fn click(&self, _selector: &str, _timeout: Duration) -> HarnessResult<()> {
        Ok(())
    }

    async fn fill(&self, _selector: &str, _value: &str) -> HarnessResult<()> {
        Ok(())
    }

    async fn text_content(&self, selector: &str) -> HarnessResult<Option<String>> {
        Ok(self
            .elements
            .lock()
            .get(selector)
            .filter(|count| **count > 0)
            .map(|_| selector.to_string()))
    }

    async fn locator_count(&self, selector: &str) -> HarnessResult<usize> {
        Ok(self.elements.lock().get(selector).copied().unwrap_or(0))
    }

    async fn close(&self) -> HarnessResult<()> {
        self.log.lock().pages_closed += 1;
        if self.faults.lock().close_page {
            return Err(HarnessError::Automation("Target page has been closed".into()));
        }
        Ok(())
    }
}

/// What the executor observed for one attempt
#[derive(Debug, Clone)]
pub struct ObservedAttempt {
    pub scenario: String,
    pub label: String,
    pub is_retry: bool,
}

/// Executor replaying scripted outcomes per scenario name; passes once a script runs out
#[derive(Default)]
pub struct ScriptedExecutor {
    scripts: Mutex<HashMap<String, VecDeque<ScenarioOutcome>>>,
    pub observed: Mutex<Vec<ObservedAttempt>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(self, scenario: &str, outcomes: impl IntoIterator<Item = ScenarioOutcome>) -> Self {
        self.scripts
            .lock()
            .insert(scenario.to_string(), outcomes.into_iter().collect());
        self
    }
}

#[async_trait]
impl ScenarioExecutor for ScriptedExecutor {
    async fn run(&self, scenario: &ScenarioMeta, ctx: &mut ScenarioContext) -> ScenarioOutcome {
        let bag = ctx.data_bag().expect("scenario data bag");
        self.observed.lock().push(ObservedAttempt {
            scenario: scenario.name.clone(),
            label: bag
                .get_data::<String>(&DataBagKey::ScenarioLabel)
                .unwrap()
                .unwrap_or_default(),
            is_retry: bag.get_data::<bool>(&DataBagKey::IsRetry).unwrap().unwrap_or(false),
        });

        self.scripts
            .lock()
            .get_mut(&scenario.name)
            .and_then(|outcomes| outcomes.pop_front())
            .unwrap_or_else(ScenarioOutcome::passed)
    }
}

pub fn fast_poll() -> PollConfig {
    PollConfig {
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        multiplier: 2.0,
        timeout: Duration::from_millis(200),
    }
}

/// Config rooted in a temporary directory
pub fn test_config(root: &Path, max_retry_count: u32) -> HarnessConfig {
    HarnessConfig {
        max_retry_count,
        results: ResultsLayout::new(root.join("test-results")),
        build_signal_path: root.join("buildSignal.txt"),
        poll: fast_poll(),
        ..HarnessConfig::default()
    }
}

pub fn meta(feature: &str, name: &str) -> ScenarioMeta {
    ScenarioMeta::new(feature, format!("features/{}.feature", feature.to_lowercase()), name)
}

/// Every `*-failed-scenarios.json` under the failed directory
pub fn failed_files(layout: &ResultsLayout) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = match std::fs::read_dir(layout.failed_dir()) {
        Ok(entries) => entries.filter_map(|e| e.ok()).map(|e| e.path()).collect(),
        Err(_) => Vec::new(),
    };
    files.sort();
    files
}
