//! Single-slot record of the scenario currently in flight
//!
//! The record is written to disk on every change so that a process killed
//! mid-scenario leaves `execution_complete = false` behind for the next
//! process to reconcile.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::HarnessResult;
use crate::identity::{ScenarioIdentity, ScenarioLabel};
use crate::results::write_json_atomic;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalRunState {
    /// `None` until the first scenario of any run starts
    pub execution_complete: Option<bool>,

    /// Label (and artifact directory name) of the last started scenario
    pub artifact_directory_name: Option<String>,

    /// Identity whose retry count the last started scenario consumed
    pub retry_indicator_key: Option<ScenarioIdentity>,
}

impl GlobalRunState {
    /// The last started scenario never reached the end of its teardown
    pub fn is_incomplete(&self) -> bool {
        self.execution_complete == Some(false)
    }

    /// Take the artifact directory name and retry key, leaving both unset
    pub fn clear_orphan_fields(&mut self) -> (Option<String>, Option<ScenarioIdentity>) {
        (
            self.artifact_directory_name.take(),
            self.retry_indicator_key.take(),
        )
    }
}

/// File-backed [`GlobalRunState`]
#[derive(Debug)]
pub struct RunStateStore {
    path: PathBuf,
    state: GlobalRunState,
}

impl RunStateStore {
    /// Load the record left by a previous process. A missing or unreadable
    /// file counts as "nothing in flight".
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let state = match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                warn!("Ignoring unreadable run state {}: {}", path.display(), e);
                GlobalRunState::default()
            }),
            Err(_) => GlobalRunState::default(),
        };
        Self { path, state }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> &GlobalRunState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut GlobalRunState {
        &mut self.state
    }

    /// Overwrite the record for a newly started scenario
    pub fn mark_started(&mut self, label: &ScenarioLabel, identity: &ScenarioIdentity) -> HarnessResult<()> {
        self.state = GlobalRunState {
            execution_complete: Some(false),
            artifact_directory_name: Some(label.to_string()),
            retry_indicator_key: Some(identity.clone()),
        };
        self.save()
    }

    /// The in-flight scenario finished its teardown
    pub fn mark_complete(&mut self) -> HarnessResult<()> {
        self.state.execution_complete = Some(true);
        self.save()
    }

    pub fn save(&self) -> HarnessResult<()> {
        write_json_atomic(&self.path, &self.state)
    }
}
