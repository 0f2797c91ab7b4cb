//! Passed/failed scenario results and their on-disk stores

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::ResultsLayout;
use crate::error::{HarnessError, HarnessResult};
use crate::identity::{sanitize_file_stem, short_digest, FEATURE_STEM_MAX_LEN};

/// Result of one scenario once it is final
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioResult {
    pub name: String,

    /// Duration of the final attempt in milliseconds
    #[serde(rename = "duration")]
    pub duration_ms: u64,

    /// Retries used before this result
    pub retries: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_step: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video: Option<PathBuf>,
}

/// Results of one feature file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureResult {
    pub name: String,
    pub path: String,
    pub scenarios: Vec<ScenarioResult>,
}

impl FeatureResult {
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            scenarios: Vec::new(),
        }
    }

    pub fn with_scenario(mut self, scenario: ScenarioResult) -> Self {
        self.scenarios.push(scenario);
        self
    }
}

/// Collects passed results in memory and persists failed results immediately
#[derive(Debug)]
pub struct ResultAggregator {
    layout: ResultsLayout,
    passed: Vec<FeatureResult>,
}

impl ResultAggregator {
    pub fn new(layout: ResultsLayout) -> Self {
        Self {
            layout,
            passed: Vec::new(),
        }
    }

    pub fn layout(&self) -> &ResultsLayout {
        &self.layout
    }

    /// Remove the previous run's passed file and start an empty failed directory
    pub fn prepare_output_tree(&mut self) -> HarnessResult<()> {
        std::fs::create_dir_all(self.layout.root())?;

        let passed = self.layout.passed_file();
        if passed.exists() {
            std::fs::remove_file(&passed)?;
        }

        let failed = self.layout.failed_dir();
        if failed.exists() {
            std::fs::remove_dir_all(&failed)?;
        }
        std::fs::create_dir_all(&failed)?;

        self.passed.clear();
        Ok(())
    }

    /// Append a passed result to its feature, in memory only
    pub fn record_passed(&mut self, feature_name: &str, feature_path: &str, result: ScenarioResult) {
        match self.passed.iter_mut().find(|f| f.path == feature_path) {
            Some(feature) => feature.scenarios.push(result),
            None => self
                .passed
                .push(FeatureResult::new(feature_name, feature_path).with_scenario(result)),
        }
    }

    /// Passed results collected so far, grouped by feature
    pub fn passed(&self) -> &[FeatureResult] {
        &self.passed
    }

    /// Merge `feature` into the feature's failed-results file.
    ///
    /// Read-modify-write without a cross-process lock: two workers must never
    /// run scenarios of the same feature at the same time.
    pub fn write_failed_result(&self, feature: &FeatureResult) -> HarnessResult<PathBuf> {
        let path = self.failed_file_for(feature);

        let merged = match read_feature(&path)? {
            Some(mut existing) => {
                existing.scenarios.extend(feature.scenarios.iter().cloned());
                existing
            }
            None => feature.clone(),
        };

        write_json_atomic(&path, &merged)?;
        debug!(
            "Failed result for '{}' written ({} scenario(s))",
            feature.name,
            merged.scenarios.len()
        );
        Ok(path)
    }

    /// Write every passed result in one go
    pub fn flush_passed(&self) -> HarnessResult<PathBuf> {
        let path = self.layout.passed_file();
        write_json_atomic(&path, &self.passed)?;
        info!(
            "Passed results written to: {} ({} feature(s))",
            path.display(),
            self.passed.len()
        );
        Ok(path)
    }

    /// Failed-results file of a feature. Names without any file-safe
    /// character fall back to a digest of the feature path.
    fn failed_file_for(&self, feature: &FeatureResult) -> PathBuf {
        let stem = sanitize_file_stem(&feature.name, FEATURE_STEM_MAX_LEN);
        if !stem.is_empty() {
            return self.layout.failed_file(&stem);
        }
        let source = if feature.path.is_empty() {
            &feature.name
        } else {
            &feature.path
        };
        self.layout
            .failed_file(&format!("feature-{}", short_digest(source, 6)))
    }
}

/// Read a feature result file, `None` when it does not exist
pub fn read_feature(path: &Path) -> HarnessResult<Option<FeatureResult>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path)?;
    Ok(Some(serde_json::from_str(&content)?))
}

/// Replace `path` with the JSON rendering of `value` through a temp file and rename
pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> HarnessResult<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;

    let json = serde_json::to_string_pretty(value)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(json.as_bytes())?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| HarnessError::Io(e.error))?;
    Ok(())
}
