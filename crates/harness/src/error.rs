//! Error types for the scenario harness

use thiserror::Error;

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Automation error: {0}")]
    Automation(String),

    #[error("Timeout waiting for: {0}")]
    Timeout(String),

    #[error("Page object error: {0}")]
    PageObject(String),

    #[error("Data bag error: {0}")]
    DataBag(String),

    #[error("Scenario catalog error: {0}")]
    Catalog(String),

    #[error("Result store error: {0}")]
    Results(String),

    #[error("Step failed: {step} - {reason}")]
    StepFailed { step: String, reason: String },

    #[error("No scenario is in flight")]
    NoScenarioInFlight,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Environment file error: {0}")]
    EnvFile(#[from] dotenvy::Error),
}

impl HarnessError {
    /// Whether this error came from an automation call exceeding its timeout.
    ///
    /// Timeouts are handled as ordinary step failures; this only lets callers
    /// label them.
    pub fn is_timeout(&self) -> bool {
        match self {
            HarnessError::Timeout(_) => true,
            HarnessError::StepFailed { reason, .. } => reason.contains("TimeoutError"),
            _ => false,
        }
    }
}

pub type HarnessResult<T> = Result<T, HarnessError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_classification() {
        assert!(HarnessError::Timeout("spinner".into()).is_timeout());
        assert!(HarnessError::StepFailed {
            step: "click:Sign In".into(),
            reason: "TimeoutError: locator.click: Timeout 5000ms exceeded".into(),
        }
        .is_timeout());
        assert!(!HarnessError::Automation("page closed".into()).is_timeout());
    }
}
