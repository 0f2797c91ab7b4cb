//! Run-level reference data loaded into the global data bag

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::config::HarnessConfig;
use crate::error::HarnessResult;

#[async_trait]
pub trait DataProvider: Send + Sync {
    /// Named reference values, stored under `DataBagKey::ReferenceData(name)`
    async fn load_reference_data(&self) -> HarnessResult<Vec<(String, Value)>>;

    async fn close(&self) -> HarnessResult<()> {
        Ok(())
    }
}

/// Provider with nothing to load
pub struct NoReferenceData;

#[async_trait]
impl DataProvider for NoReferenceData {
    async fn load_reference_data(&self) -> HarnessResult<Vec<(String, Value)>> {
        Ok(Vec::new())
    }
}

/// Reads a top-level mapping from a YAML (or JSON) file
pub struct YamlDataProvider {
    path: PathBuf,
}

impl YamlDataProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl DataProvider for YamlDataProvider {
    async fn load_reference_data(&self) -> HarnessResult<Vec<(String, Value)>> {
        let content = tokio::fs::read_to_string(&self.path).await?;
        let data: BTreeMap<String, Value> = serde_yaml::from_str(&content)?;
        debug!("Loaded {} reference value(s) from {}", data.len(), self.path.display());
        Ok(data.into_iter().collect())
    }
}

/// Provider for `config.reference_data`, or the empty provider when unset
pub fn provider_for(config: &HarnessConfig) -> Arc<dyn DataProvider> {
    match &config.reference_data {
        Some(path) => Arc::new(YamlDataProvider::new(path.clone())),
        None => Arc::new(NoReferenceData),
    }
}
