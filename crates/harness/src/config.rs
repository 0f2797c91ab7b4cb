//! Harness configuration, read once at run start

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::browser::Browser;
use crate::error::{HarnessError, HarnessResult};
use crate::identity::ScenarioLabel;
use crate::logging::LogConfig;
use crate::poll::PollConfig;

/// Environment selected when `ENV` is not set
pub const DEFAULT_ENVIRONMENT: &str = "QA1";

/// Content of the build signal file
pub const BUILD_SIGNAL_CONTENT: &str = "failed";

/// Harness configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Target environment name (selects `.env.<environment>`)
    pub environment: String,

    /// Retries allowed after the first attempt
    pub max_retry_count: u32,

    /// Browser engine
    pub browser: Browser,

    /// Run the browser without a window
    pub headless: bool,

    /// Base URL of the application under test
    pub base_url: String,

    /// Result and artifact layout
    pub results: ResultsLayout,

    /// Presence of this file signals a definitive failure to CI
    pub build_signal_path: PathBuf,

    /// Polling used by page stability and spinner checks
    pub poll: PollConfig,

    /// Timeouts for automation calls
    pub timeouts: TimeoutConfig,

    /// Directory holding `.env.<environment>` files
    pub env_dir: PathBuf,

    /// Optional run-level reference data file
    pub reference_data: Option<PathBuf>,

    /// Console and scenario log settings
    pub log: LogConfig,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            environment: DEFAULT_ENVIRONMENT.to_string(),
            max_retry_count: 0,
            browser: Browser::Chromium,
            headless: true,
            base_url: "http://127.0.0.1:8080".to_string(),
            results: ResultsLayout::default(),
            build_signal_path: PathBuf::from("buildSignal.txt"),
            poll: PollConfig::default(),
            timeouts: TimeoutConfig::default(),
            env_dir: PathBuf::from("env"),
            reference_data: None,
            log: LogConfig::default(),
        }
    }
}

impl HarnessConfig {
    /// Load configuration from the process environment.
    ///
    /// `ENV` selects the environment (default `QA1`); `<env_dir>/.env.<ENV>`
    /// is applied on top of the process environment when present.
    pub fn from_env() -> HarnessResult<Self> {
        let env_dir = std::env::var("ENV_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("env"));

        let environment = match std::env::var("ENV") {
            Ok(env) if !env.trim().is_empty() => env,
            _ => {
                warn!("running tests in default environment - {}", DEFAULT_ENVIRONMENT);
                DEFAULT_ENVIRONMENT.to_string()
            }
        };

        let env_file = env_dir.join(format!(".env.{}", environment));
        if env_file.exists() {
            dotenvy::from_path_override(&env_file)?;
            info!("Loaded environment file {}", env_file.display());
        } else {
            warn!("Environment file {} not found", env_file.display());
        }

        let mut config = Self::from_lookup(|key| std::env::var(key).ok())?;
        config.environment = environment;
        config.env_dir = env_dir;
        Ok(config)
    }

    /// Build configuration from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> HarnessResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(env) = lookup("ENV").filter(|v| !v.trim().is_empty()) {
            config.environment = env;
        }

        config.max_retry_count = lookup("RETRY_COUNT")
            .or_else(|| lookup("CUCUMBER_RETRY_COUNT"))
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0);

        if let Some(browser) = lookup("BROWSER") {
            config.browser = browser.parse()?;
        }

        config.headless = resolve_headless(
            lookup("HEAD").as_deref(),
            lookup("CI").as_deref(),
            lookup("IS_LOCAL").as_deref(),
        );

        if let Some(base_url) = lookup("BASEURL") {
            config.base_url = base_url;
        }

        if let Some(root) = lookup("TEST_RESULTS_DIR") {
            config.results = ResultsLayout::new(root);
        }

        if let Some(path) = lookup("BUILD_SIGNAL_PATH") {
            config.build_signal_path = PathBuf::from(path);
        }

        if let Some(path) = lookup("REFERENCE_DATA") {
            config.reference_data = Some(PathBuf::from(path));
        }

        if let Some(format) = lookup("LOG_FORMAT") {
            config.log.json = format.eq_ignore_ascii_case("json");
        }

        if let Some(ms) = lookup("NAVIGATION_TIMEOUT_MS") {
            config.timeouts.navigation = parse_millis("NAVIGATION_TIMEOUT_MS", &ms)?;
        }

        if let Some(ms) = lookup("ACTION_TIMEOUT_MS") {
            config.timeouts.action = parse_millis("ACTION_TIMEOUT_MS", &ms)?;
        }

        Ok(config)
    }
}

fn parse_millis(name: &str, raw: &str) -> HarnessResult<Duration> {
    raw.trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|_| HarnessError::Config(format!("{} must be a number of milliseconds, got '{}'", name, raw)))
}

/// An explicit `HEAD` wins; otherwise headless on CI or when not running locally.
fn resolve_headless(head: Option<&str>, ci: Option<&str>, is_local: Option<&str>) -> bool {
    match head {
        Some("true") => false,
        Some("false") => true,
        _ => ci == Some("true") || is_local != Some("true"),
    }
}

/// Timeouts for blocking automation calls
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    pub navigation: Duration,
    pub action: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            navigation: Duration::from_secs(60),
            action: Duration::from_secs(30),
        }
    }
}

/// Paths of every result and artifact file, derived from one root
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultsLayout {
    pub root: PathBuf,
}

impl Default for ResultsLayout {
    fn default() -> Self {
        Self::new("test-results")
    }
}

impl ResultsLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `passed-scenarios.json`, written once at run end
    pub fn passed_file(&self) -> PathBuf {
        self.root.join("passed-scenarios.json")
    }

    /// Directory of per-feature failed results
    pub fn failed_dir(&self) -> PathBuf {
        self.root.join("failed")
    }

    pub fn failed_file(&self, sanitized_feature: &str) -> PathBuf {
        self.failed_dir()
            .join(format!("{}-failed-scenarios.json", sanitized_feature))
    }

    pub fn videos_dir(&self) -> PathBuf {
        self.root.join("videos")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    pub fn screenshots_dir(&self) -> PathBuf {
        self.root.join("screenshots")
    }

    pub fn video_dir_for(&self, label: &str) -> PathBuf {
        self.videos_dir().join(label)
    }

    pub fn log_dir_for(&self, label: &str) -> PathBuf {
        self.logs_dir().join(label)
    }

    pub fn screenshot_for(&self, label: &ScenarioLabel) -> PathBuf {
        self.screenshots_dir().join(format!("{}.png", label))
    }

    /// Single-slot record of the scenario currently in flight
    pub fn run_state_file(&self) -> PathBuf {
        self.root.join("run-state.json")
    }

    pub fn summary_file(&self) -> PathBuf {
        self.root.join("summary.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use test_case::test_case;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = HarnessConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.environment, "QA1");
        assert_eq!(config.max_retry_count, 0);
        assert_eq!(config.browser, Browser::Chromium);
        assert!(config.headless);
        assert_eq!(
            config.results.passed_file(),
            PathBuf::from("test-results/passed-scenarios.json")
        );
    }

    #[test]
    fn test_retry_count_sources() {
        let config = HarnessConfig::from_lookup(lookup(&[("CUCUMBER_RETRY_COUNT", "2")])).unwrap();
        assert_eq!(config.max_retry_count, 2);

        let config = HarnessConfig::from_lookup(lookup(&[
            ("RETRY_COUNT", "3"),
            ("CUCUMBER_RETRY_COUNT", "2"),
        ]))
        .unwrap();
        assert_eq!(config.max_retry_count, 3);

        let config = HarnessConfig::from_lookup(lookup(&[("RETRY_COUNT", "many")])).unwrap();
        assert_eq!(config.max_retry_count, 0);
    }

    #[test]
    fn test_unknown_browser_is_rejected() {
        let err = HarnessConfig::from_lookup(lookup(&[("BROWSER", "netscape")])).unwrap_err();
        assert!(matches!(err, HarnessError::Config(_)));
    }

    #[test]
    fn test_bad_timeout_is_rejected() {
        let err = HarnessConfig::from_lookup(lookup(&[("ACTION_TIMEOUT_MS", "soon")])).unwrap_err();
        assert!(matches!(err, HarnessError::Config(_)));
    }

    #[test_case(Some("true"), Some("true"), None => false; "head forces headed")]
    #[test_case(Some("false"), None, Some("true") => true; "head forces headless")]
    #[test_case(None, Some("true"), Some("true") => true; "ci is headless")]
    #[test_case(None, None, Some("true") => false; "local is headed")]
    #[test_case(None, None, None => true; "default headless")]
    fn test_resolve_headless(head: Option<&str>, ci: Option<&str>, local: Option<&str>) -> bool {
        resolve_headless(head, ci, local)
    }

    #[test]
    fn test_layout_paths() {
        let layout = ResultsLayout::new("out");
        assert_eq!(
            layout.failed_file("login"),
            PathBuf::from("out/failed/login-failed-scenarios.json")
        );
        assert_eq!(layout.video_dir_for("abc"), PathBuf::from("out/videos/abc"));
        assert_eq!(layout.log_dir_for("abc"), PathBuf::from("out/logs/abc"));
    }
}
