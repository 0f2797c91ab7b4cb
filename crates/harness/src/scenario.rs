//! Scenario metadata and the contract with the BDD runner

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::context::ScenarioContext;
use crate::identity::ScenarioIdentity;

/// Metadata the BDD runner supplies for one executable scenario
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioMeta {
    /// Scenario display name
    pub name: String,

    /// Runner-assigned id of this pickle
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub tags: Vec<String>,

    /// Example-row values for outline scenarios
    #[serde(default)]
    pub example_values: Vec<(String, String)>,

    pub feature_name: String,
    pub feature_path: String,
}

impl ScenarioMeta {
    pub fn new(
        feature_name: impl Into<String>,
        feature_path: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            id: String::new(),
            tags: Vec::new(),
            example_values: Vec::new(),
            feature_name: feature_name.into(),
            feature_path: feature_path.into(),
        }
    }

    pub fn identity(&self) -> ScenarioIdentity {
        ScenarioIdentity::new(&self.feature_path, &self.name)
            .with_scenario_id(&self.id)
            .with_examples(self.example_values.iter().cloned())
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        let wanted = tag.trim_start_matches('@');
        self.tags.iter().any(|t| t.trim_start_matches('@') == wanted)
    }
}

/// Final status the runner reports for a scenario attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioStatus {
    Passed,
    Failed,
    Skipped,
    Pending,
    Undefined,
    Ambiguous,
    Unknown,
}

impl ScenarioStatus {
    pub fn is_passed(self) -> bool {
        self == ScenarioStatus::Passed
    }
}

/// What one attempt of a scenario produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioOutcome {
    pub status: ScenarioStatus,
    /// Text of the step that failed, if any
    pub failed_step: Option<String>,
}

impl ScenarioOutcome {
    pub fn passed() -> Self {
        Self {
            status: ScenarioStatus::Passed,
            failed_step: None,
        }
    }

    pub fn failed(step: impl Into<String>) -> Self {
        Self {
            status: ScenarioStatus::Failed,
            failed_step: Some(step.into()),
        }
    }
}

/// Runs the steps of one scenario against the live scenario context
#[async_trait]
pub trait ScenarioExecutor: Send + Sync {
    async fn run(&self, scenario: &ScenarioMeta, ctx: &mut ScenarioContext) -> ScenarioOutcome;
}
