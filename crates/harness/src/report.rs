//! Merged run summary built from the passed and failed result stores

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::ResultsLayout;
use crate::error::HarnessResult;
use crate::results::{read_feature, write_json_atomic, FeatureResult, ScenarioResult};

/// Suffix of per-feature failed result files
const FAILED_SUFFIX: &str = "-failed-scenarios.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportedStatus {
    Passed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportedScenario {
    #[serde(flatten)]
    pub result: ScenarioResult,
    pub status: ReportedStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportedFeature {
    pub name: String,
    pub path: String,
    pub scenarios: Vec<ReportedScenario>,
}

/// Passed and failed results merged by feature path, with run totals
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    pub generated_at: chrono::DateTime<chrono::Utc>,
    pub total_scenarios: usize,
    pub failed_scenarios: usize,
    pub retried_scenarios: usize,
    pub total_retries: u64,
    pub total_duration_ms: u64,
    pub features: Vec<ReportedFeature>,
}

impl ReportSummary {
    /// Read `passed-scenarios.json` (missing means none) and every failed result file
    pub fn load(layout: &ResultsLayout) -> HarnessResult<Self> {
        let passed_path = layout.passed_file();
        let passed: Vec<FeatureResult> = if passed_path.exists() {
            serde_json::from_str(&std::fs::read_to_string(&passed_path)?)?
        } else {
            Vec::new()
        };

        let mut failed = Vec::new();
        let failed_dir = layout.failed_dir();
        if failed_dir.exists() {
            let mut files: Vec<_> = std::fs::read_dir(&failed_dir)?
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| {
                    p.file_name()
                        .map(|n| n.to_string_lossy().ends_with(FAILED_SUFFIX))
                        .unwrap_or(false)
                })
                .collect();
            files.sort();
            for file in files {
                if let Some(feature) = read_feature(&file)? {
                    failed.push(feature);
                }
            }
        }

        Ok(Self::merge(passed, failed))
    }

    pub fn merge(passed: Vec<FeatureResult>, failed: Vec<FeatureResult>) -> Self {
        let mut features: Vec<ReportedFeature> = Vec::new();

        let tagged = passed
            .into_iter()
            .map(|f| (f, ReportedStatus::Passed))
            .chain(failed.into_iter().map(|f| (f, ReportedStatus::Failed)));

        for (feature, status) in tagged {
            let index = match features.iter().position(|f| f.path == feature.path) {
                Some(index) => index,
                None => {
                    features.push(ReportedFeature {
                        name: feature.name.clone(),
                        path: feature.path.clone(),
                        scenarios: Vec::new(),
                    });
                    features.len() - 1
                }
            };
            features[index].scenarios.extend(
                feature
                    .scenarios
                    .into_iter()
                    .map(|result| ReportedScenario { result, status }),
            );
        }

        let all: Vec<&ReportedScenario> = features.iter().flat_map(|f| f.scenarios.iter()).collect();

        Self {
            generated_at: chrono::Utc::now(),
            total_scenarios: all.len(),
            failed_scenarios: all.iter().filter(|s| s.status == ReportedStatus::Failed).count(),
            retried_scenarios: all.iter().filter(|s| s.result.retries > 0).count(),
            total_retries: all.iter().map(|s| u64::from(s.result.retries)).sum(),
            total_duration_ms: all.iter().map(|s| s.result.duration_ms).sum(),
            features,
        }
    }

    pub fn write(&self, layout: &ResultsLayout) -> HarnessResult<()> {
        let path = layout.summary_file();
        write_json_atomic(&path, self)?;
        info!(
            "Summary written to: {} ({} scenario(s), {} failed, {} retried)",
            path.display(),
            self.total_scenarios,
            self.failed_scenarios,
            self.retried_scenarios
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::ResultAggregator;
    use tempfile::TempDir;

    fn scenario(name: &str, retries: u32, duration_ms: u64) -> ScenarioResult {
        ScenarioResult {
            name: name.into(),
            duration_ms,
            retries,
            failed_step: None,
            screenshot: None,
            video: None,
        }
    }

    #[test]
    fn test_merge_by_feature_path() {
        let passed = vec![FeatureResult::new("Login", "features/login.feature")
            .with_scenario(scenario("ok", 2, 100))];
        let failed = vec![
            FeatureResult::new("Login", "features/login.feature").with_scenario(scenario("bad", 1, 50)),
            FeatureResult::new("Reports", "features/reports.feature")
                .with_scenario(scenario("export", 1, 70)),
        ];

        let summary = ReportSummary::merge(passed, failed);
        assert_eq!(summary.features.len(), 2);
        assert_eq!(summary.features[0].scenarios.len(), 2);
        assert_eq!(summary.features[0].scenarios[1].status, ReportedStatus::Failed);
        assert_eq!(summary.total_scenarios, 3);
        assert_eq!(summary.failed_scenarios, 2);
        assert_eq!(summary.retried_scenarios, 3);
        assert_eq!(summary.total_retries, 4);
        assert_eq!(summary.total_duration_ms, 220);
    }

    #[test]
    fn test_load_from_disk() {
        let dir = TempDir::new().unwrap();
        let layout = ResultsLayout::new(dir.path());
        let mut aggregator = ResultAggregator::new(layout.clone());
        aggregator.prepare_output_tree().unwrap();

        aggregator.record_passed("Login", "features/login.feature", scenario("ok", 0, 10));
        aggregator.flush_passed().unwrap();
        aggregator
            .write_failed_result(
                &FeatureResult::new("Reports", "features/reports.feature")
                    .with_scenario(scenario("export", 1, 20)),
            )
            .unwrap();

        let summary = ReportSummary::load(&layout).unwrap();
        assert_eq!(summary.total_scenarios, 2);
        assert_eq!(summary.failed_scenarios, 1);
        summary.write(&layout).unwrap();
        assert!(layout.summary_file().exists());
    }

    #[test]
    fn test_load_without_results() {
        let dir = TempDir::new().unwrap();
        let summary = ReportSummary::load(&ResultsLayout::new(dir.path())).unwrap();
        assert_eq!(summary.total_scenarios, 0);
    }
}
