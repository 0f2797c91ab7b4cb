//! Declarative YAML scenario catalogs
//!
//! A catalog lists the scenarios of one feature; outline scenarios carry an
//! example table and expand to one [`ScenarioMeta`] per row.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{HarnessError, HarnessResult};
use crate::scenario::ScenarioMeta;

/// One feature and its scenarios
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureSpec {
    /// Feature display name
    pub name: String,

    /// Feature file path; defaults to the catalog file path
    #[serde(default)]
    pub path: Option<String>,

    /// Tags applied to every scenario
    #[serde(default)]
    pub tags: Vec<String>,

    pub scenarios: Vec<ScenarioSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioSpec {
    pub name: String,

    #[serde(default)]
    pub tags: Vec<String>,

    /// Example rows of an outline scenario
    #[serde(default)]
    pub examples: Vec<BTreeMap<String, String>>,
}

impl FeatureSpec {
    /// Parse a feature catalog from YAML string
    pub fn from_yaml(yaml: &str) -> HarnessResult<Self> {
        let spec: Self = serde_yaml::from_str(yaml)?;
        if spec.scenarios.iter().any(|s| s.name.trim().is_empty()) {
            return Err(HarnessError::Catalog(format!(
                "feature '{}' has a scenario without a name",
                spec.name
            )));
        }
        Ok(spec)
    }

    /// Parse a feature catalog from a YAML file
    pub fn from_file(path: &Path) -> HarnessResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut spec = Self::from_yaml(&content)?;
        if spec.path.is_none() {
            spec.path = Some(path.to_string_lossy().to_string());
        }
        Ok(spec)
    }

    /// Load all catalogs from a directory
    pub fn load_all(dir: &Path) -> HarnessResult<Vec<Self>> {
        let mut specs = Vec::new();

        for entry in walkdir::WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
        {
            specs.push(Self::from_file(entry.path())?);
        }

        Ok(specs)
    }

    /// Expand into executable scenarios, one per outline row
    pub fn scenarios(&self) -> Vec<ScenarioMeta> {
        let feature_path = self.path.clone().unwrap_or_else(|| self.name.clone());
        let mut metas = Vec::new();

        for (index, scenario) in self.scenarios.iter().enumerate() {
            let mut tags = self.tags.clone();
            tags.extend(scenario.tags.iter().cloned());

            let rows: Vec<Option<&BTreeMap<String, String>>> = if scenario.examples.is_empty() {
                vec![None]
            } else {
                scenario.examples.iter().map(Some).collect()
            };

            for (row_index, row) in rows.into_iter().enumerate() {
                let mut meta = ScenarioMeta::new(&self.name, &feature_path, &scenario.name);
                meta.id = format!("{}:{}:{}", feature_path, index, row_index);
                meta.tags = tags.clone();
                if let Some(row) = row {
                    meta.example_values = row.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
                }
                metas.push(meta);
            }
        }

        metas
    }
}

/// Expand every catalog and keep the scenarios carrying `tag`
pub fn filter_by_tag(specs: &[FeatureSpec], tag: &str) -> Vec<ScenarioMeta> {
    specs
        .iter()
        .flat_map(|s| s.scenarios())
        .filter(|m| m.has_tag(tag))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const LOGIN: &str = r#"
name: User Login
path: features/login.feature
tags:
  - auth
scenarios:
  - name: Login-With-Bad-Password
    tags:
      - smoke
  - name: Login as <role>
    examples:
      - role: admin
      - role: lead
"#;

    #[test]
    fn test_outline_rows_expand() {
        let spec = FeatureSpec::from_yaml(LOGIN).unwrap();
        let metas = spec.scenarios();
        assert_eq!(metas.len(), 3);
        assert_eq!(metas[1].example_values, vec![("role".to_string(), "admin".to_string())]);
        assert_ne!(metas[1].identity(), metas[2].identity());
        assert!(metas.iter().all(|m| m.has_tag("auth")));
        assert_eq!(metas[0].feature_path, "features/login.feature");
    }

    #[test]
    fn test_filter_by_tag() {
        let spec = FeatureSpec::from_yaml(LOGIN).unwrap();
        let smoke = filter_by_tag(&[spec], "@smoke");
        assert_eq!(smoke.len(), 1);
        assert_eq!(smoke[0].name, "Login-With-Bad-Password");
    }

    #[test]
    fn test_load_all_defaults_path_to_file() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("reports.yaml"),
            "name: Reports\nscenarios:\n  - name: Export\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let specs = FeatureSpec::load_all(dir.path()).unwrap();
        assert_eq!(specs.len(), 1);
        assert!(specs[0].path.as_deref().unwrap().ends_with("reports.yaml"));
    }

    #[test]
    fn test_unnamed_scenario_is_rejected() {
        let err = FeatureSpec::from_yaml("name: F\nscenarios:\n  - name: ''\n").unwrap_err();
        assert!(matches!(err, HarnessError::Catalog(_)));
    }
}
