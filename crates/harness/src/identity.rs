//! Scenario identity and per-attempt labels

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Maximum length of a sanitized feature file stem
pub const FEATURE_STEM_MAX_LEN: usize = 100;

/// Maximum length of the readable part of a scenario label
const LABEL_NAME_MAX_LEN: usize = 60;

/// Stable key of a logical scenario.
///
/// Outline rows differ by their example values; equally named scenarios in
/// different features differ by feature path, and equally named scenarios in
/// one feature differ by the runner-assigned scenario id. Retries of the same
/// scenario always resolve to the same identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ScenarioIdentity {
    pub feature_path: String,
    pub name: String,
    /// Runner-assigned id, stable across retries of the same scenario
    #[serde(default)]
    pub scenario_id: String,
    #[serde(default)]
    pub example_values: Vec<(String, String)>,
}

impl ScenarioIdentity {
    pub fn new(feature_path: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            feature_path: feature_path.into(),
            name: name.into(),
            scenario_id: String::new(),
            example_values: Vec::new(),
        }
    }

    pub fn with_scenario_id(mut self, id: impl Into<String>) -> Self {
        self.scenario_id = id.into();
        self
    }

    /// Attach the concrete example-row values of an outline scenario
    pub fn with_examples<I, K, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.example_values = values
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self
    }

    /// Render the identity as a single string
    pub fn key(&self) -> String {
        let mut key = format!("{}::{}", self.feature_path, self.name);
        if !self.scenario_id.is_empty() {
            key.push_str(&format!("#{}", self.scenario_id));
        }
        if !self.example_values.is_empty() {
            let row: Vec<String> = self
                .example_values
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            key.push_str(&format!("[{}]", row.join(",")));
        }
        key
    }

    /// Short hex digest of the key, safe for file names
    pub fn digest(&self) -> String {
        short_digest(&self.key(), 6)
    }
}

impl fmt::Display for ScenarioIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// Unique label of one scenario attempt; names the per-attempt artifact directories.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScenarioLabel(String);

impl ScenarioLabel {
    /// Build a label from the identity and a microsecond start timestamp
    pub fn new(identity: &ScenarioIdentity, started_at_micros: i64) -> Self {
        let name = sanitize_file_stem(&identity.name, LABEL_NAME_MAX_LEN);
        Self(format!("{}-{}-{}", name, identity.digest(), started_at_micros))
    }

    /// Build a label stamped with the current time
    pub fn now(identity: &ScenarioIdentity) -> Self {
        Self::new(identity, chrono::Utc::now().timestamp_micros())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScenarioLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ScenarioLabel {
    fn from(value: String) -> Self {
        Self(value)
    }
}

fn unsafe_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^A-Za-z0-9_-]").expect("static regex"))
}

/// Keep only alphanumerics, hyphen and underscore, truncate, lower-case.
pub fn sanitize_file_stem(raw: &str, max_len: usize) -> String {
    let kept = unsafe_chars().replace_all(raw, "");
    kept.chars().take(max_len).collect::<String>().to_lowercase()
}

/// Hex of the first `bytes` bytes of the sha256 of `value`
pub fn short_digest(value: &str, bytes: usize) -> String {
    let hash = Sha256::digest(value.as_bytes());
    hex::encode(&hash[..bytes.min(hash.len())])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outline_rows_have_distinct_identities() {
        let row1 = ScenarioIdentity::new("features/login.feature", "Login as <user>")
            .with_examples([("user", "admin")]);
        let row2 = ScenarioIdentity::new("features/login.feature", "Login as <user>")
            .with_examples([("user", "lead")]);
        assert_ne!(row1, row2);
        assert_ne!(row1.digest(), row2.digest());
        assert_eq!(row1.key(), "features/login.feature::Login as <user>[user=admin]");
    }

    #[test]
    fn test_same_name_in_one_feature_differs_by_scenario_id() {
        let first = ScenarioIdentity::new("features/a.feature", "Same").with_scenario_id("a:0:0");
        let second = ScenarioIdentity::new("features/a.feature", "Same").with_scenario_id("a:1:0");
        assert_ne!(first, second);
        assert_ne!(first.digest(), second.digest());
        assert_eq!(first.key(), "features/a.feature::Same#a:0:0");
    }

    #[test]
    fn test_same_name_in_different_features() {
        let a = ScenarioIdentity::new("features/a.feature", "Smoke");
        let b = ScenarioIdentity::new("features/b.feature", "Smoke");
        assert_ne!(a, b);
    }

    #[test]
    fn test_identity_is_stable_across_retries() {
        let a = ScenarioIdentity::new("f.feature", "Retry me").with_examples([("k", "v")]);
        let b = ScenarioIdentity::new("f.feature", "Retry me").with_examples([("k", "v")]);
        assert_eq!(a, b);
        assert_eq!(a.digest(), b.digest());
    }

    #[test]
    fn test_label_is_filesystem_safe_and_unique_per_start() {
        let id = ScenarioIdentity::new("f.feature", "Login With Bad/Password!");
        let first = ScenarioLabel::new(&id, 1_700_000_000_000_001);
        let second = ScenarioLabel::new(&id, 1_700_000_000_000_002);
        assert_ne!(first, second);
        assert!(first
            .as_str()
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        assert!(first.as_str().starts_with("loginwithbadpassword-"));
    }

    #[test]
    fn test_sanitize_file_stem() {
        assert_eq!(sanitize_file_stem("User Login: Happy Path", 100), "userloginhappypath");
        assert_eq!(sanitize_file_stem("Reports_v2-Export", 100), "reports_v2-export");
        assert_eq!(sanitize_file_stem(&"A".repeat(150), FEATURE_STEM_MAX_LEN).len(), 100);
    }
}
