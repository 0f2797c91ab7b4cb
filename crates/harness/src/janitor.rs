//! Cleanup of artifacts orphaned by a scenario that never finished teardown

use std::path::PathBuf;

use tracing::{info, warn};

use crate::config::ResultsLayout;
use crate::retry::RetryLedger;
use crate::run_state::GlobalRunState;

/// What a reconciliation pass did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    /// The previous scenario completed normally
    Clean,
    /// An interrupted scenario was cleaned up
    Recovered {
        directory: String,
        removed: Vec<PathBuf>,
        /// Directories that could not be removed
        failed: Vec<PathBuf>,
        forgiven: bool,
    },
}

pub struct ArtifactJanitor {
    layout: ResultsLayout,
}

impl ArtifactJanitor {
    pub fn new(layout: ResultsLayout) -> Self {
        Self { layout }
    }

    /// Give the attempt of an interrupted scenario back to the retry budget
    /// and remove its log and video directories.
    ///
    /// The attempt is forgiven and the record cleared even when a directory
    /// cannot be removed; such directories are logged and reported in
    /// `failed`. Screenshots are untouched: they are only captured after a pass.
    pub fn reconcile_incomplete_scenario(
        &self,
        state: &mut GlobalRunState,
        ledger: &mut RetryLedger,
    ) -> Reconciliation {
        if !state.is_incomplete() {
            return Reconciliation::Clean;
        }

        let (directory, retry_key) = state.clear_orphan_fields();
        let Some(directory) = directory else {
            // Fields were already cleared by an earlier pass
            return Reconciliation::Clean;
        };

        warn!("Previous scenario '{}' did not complete; cleaning up", directory);

        let forgiven = match retry_key {
            Some(identity) => ledger.forgive_attempt(&identity),
            None => false,
        };

        let mut removed = Vec::new();
        let mut failed = Vec::new();
        for dir in [
            self.layout.log_dir_for(&directory),
            self.layout.video_dir_for(&directory),
        ] {
            if !dir.exists() {
                continue;
            }
            match std::fs::remove_dir_all(&dir) {
                Ok(()) => removed.push(dir),
                Err(e) => {
                    warn!("Failed to remove orphaned {}: {}", dir.display(), e);
                    failed.push(dir);
                }
            }
        }

        info!(
            "Removed {} orphaned artifact dir(s) for '{}' (attempt forgiven: {})",
            removed.len(),
            directory,
            forgiven
        );

        Reconciliation::Recovered {
            directory,
            removed,
            failed,
            forgiven,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::ScenarioIdentity;
    use tempfile::TempDir;

    #[test]
    fn test_complete_or_unset_state_is_noop() {
        let dir = TempDir::new().unwrap();
        let janitor = ArtifactJanitor::new(ResultsLayout::new(dir.path()));
        let mut ledger = RetryLedger::new();

        let mut unset = GlobalRunState::default();
        assert_eq!(
            janitor.reconcile_incomplete_scenario(&mut unset, &mut ledger),
            Reconciliation::Clean
        );

        let mut complete = GlobalRunState {
            execution_complete: Some(true),
            artifact_directory_name: Some("label".into()),
            retry_indicator_key: None,
        };
        janitor.reconcile_incomplete_scenario(&mut complete, &mut ledger);
        assert_eq!(complete.artifact_directory_name.as_deref(), Some("label"));
    }

    #[test]
    fn test_orphan_is_removed_and_attempt_forgiven() {
        let dir = TempDir::new().unwrap();
        let layout = ResultsLayout::new(dir.path());
        let janitor = ArtifactJanitor::new(layout.clone());
        let identity = ScenarioIdentity::new("f.feature", "Interrupted");

        let mut ledger = RetryLedger::new();
        ledger.begin_attempt(&identity);
        ledger.begin_attempt(&identity);

        std::fs::create_dir_all(layout.log_dir_for("stale")).unwrap();
        std::fs::create_dir_all(layout.video_dir_for("stale")).unwrap();
        std::fs::create_dir_all(layout.screenshots_dir()).unwrap();

        let mut state = GlobalRunState {
            execution_complete: Some(false),
            artifact_directory_name: Some("stale".into()),
            retry_indicator_key: Some(identity.clone()),
        };

        let outcome = janitor.reconcile_incomplete_scenario(&mut state, &mut ledger);
        match outcome {
            Reconciliation::Recovered { removed, failed, forgiven, .. } => {
                assert_eq!(removed.len(), 2);
                assert!(failed.is_empty());
                assert!(forgiven);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(ledger.attempts(&identity), 1);
        assert!(!layout.log_dir_for("stale").exists());
        assert!(!layout.video_dir_for("stale").exists());
        assert!(layout.screenshots_dir().exists());
        assert!(state.artifact_directory_name.is_none());
        assert!(state.retry_indicator_key.is_none());

        // A second pass has nothing left to do
        assert_eq!(
            janitor.reconcile_incomplete_scenario(&mut state, &mut ledger),
            Reconciliation::Clean
        );
        assert_eq!(ledger.attempts(&identity), 1);
    }

    #[test]
    fn test_removal_failure_still_forgives_and_clears() {
        let dir = TempDir::new().unwrap();
        let layout = ResultsLayout::new(dir.path());
        let janitor = ArtifactJanitor::new(layout.clone());
        let identity = ScenarioIdentity::new("f.feature", "Interrupted");

        let mut ledger = RetryLedger::new();
        ledger.begin_attempt(&identity);

        // A plain file where the log directory should be cannot be removed as a directory
        std::fs::create_dir_all(layout.logs_dir()).unwrap();
        std::fs::write(layout.log_dir_for("stale"), "not a directory").unwrap();
        std::fs::create_dir_all(layout.video_dir_for("stale")).unwrap();

        let mut state = GlobalRunState {
            execution_complete: Some(false),
            artifact_directory_name: Some("stale".into()),
            retry_indicator_key: Some(identity.clone()),
        };

        match janitor.reconcile_incomplete_scenario(&mut state, &mut ledger) {
            Reconciliation::Recovered { removed, failed, forgiven, .. } => {
                assert_eq!(removed, vec![layout.video_dir_for("stale")]);
                assert_eq!(failed, vec![layout.log_dir_for("stale")]);
                assert!(forgiven);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(ledger.attempts(&identity), 0);
        assert!(state.artifact_directory_name.is_none());
        assert!(state.retry_indicator_key.is_none());
    }
}
