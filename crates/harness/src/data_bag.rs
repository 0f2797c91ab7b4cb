//! Scoped key/value store shared between steps and scenarios

use std::collections::HashMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{HarnessError, HarnessResult};

/// Predefined data bag keys
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DataBagKey {
    ScenarioLabel,
    ScenarioIdentity,
    FailedStep,
    AuthHeaders,
    RequestBody,
    QueryParams,
    AdditionalHeaders,
    ScreenDimensions,
    IsRetry,
    /// Run-level reference data loaded by a data provider
    ReferenceData(String),
}

impl fmt::Display for DataBagKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataBagKey::ScenarioLabel => f.write_str("scenario_label"),
            DataBagKey::ScenarioIdentity => f.write_str("scenario_identity"),
            DataBagKey::FailedStep => f.write_str("failed_step"),
            DataBagKey::AuthHeaders => f.write_str("auth_headers"),
            DataBagKey::RequestBody => f.write_str("request_body"),
            DataBagKey::QueryParams => f.write_str("query_params"),
            DataBagKey::AdditionalHeaders => f.write_str("additional_headers"),
            DataBagKey::ScreenDimensions => f.write_str("screen_dimensions"),
            DataBagKey::IsRetry => f.write_str("is_retry"),
            DataBagKey::ReferenceData(name) => write!(f, "reference_data:{}", name),
        }
    }
}

/// Lifetime of a data bag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataBagScope {
    Scenario,
    Run,
}

/// Key/value store. Last write wins, nothing is evicted.
#[derive(Debug, Clone)]
pub struct DataBag {
    scope: DataBagScope,
    entries: HashMap<DataBagKey, Value>,
}

impl DataBag {
    pub fn new(scope: DataBagScope) -> Self {
        Self {
            scope,
            entries: HashMap::new(),
        }
    }

    pub fn scenario() -> Self {
        Self::new(DataBagScope::Scenario)
    }

    pub fn run() -> Self {
        Self::new(DataBagScope::Run)
    }

    pub fn scope(&self) -> DataBagScope {
        self.scope
    }

    /// Store a value, replacing any previous value under the same key
    pub fn save_data<T: Serialize>(&mut self, key: DataBagKey, value: T) -> HarnessResult<()> {
        let value = serde_json::to_value(value)
            .map_err(|e| HarnessError::DataBag(format!("cannot store {}: {}", key, e)))?;
        self.entries.insert(key, value);
        Ok(())
    }

    /// Read a value back as `T`; `None` when the key was never saved
    pub fn get_data<T: DeserializeOwned>(&self, key: &DataBagKey) -> HarnessResult<Option<T>> {
        match self.entries.get(key) {
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|e| HarnessError::DataBag(format!("cannot read {}: {}", key, e))),
            None => Ok(None),
        }
    }

    pub fn get_raw(&self, key: &DataBagKey) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &DataBagKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn remove(&mut self, key: &DataBagKey) -> Option<Value> {
        self.entries.remove(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
