//! Tracing setup with a per-scenario log file

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::warn;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::error::{HarnessError, HarnessResult};

/// Name of the log file inside `logs/<scenario-label>/`
pub const SCENARIO_LOG_FILE: &str = "scenario.log";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,

    /// Emit console output as JSON lines
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Routes log output to the log file of the scenario in flight.
///
/// Output between scenarios is dropped.
#[derive(Clone, Default)]
pub struct ScenarioLogRouter {
    sink: Arc<Mutex<Option<File>>>,
}

impl ScenarioLogRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start writing into `dir/scenario.log`
    pub fn open(&self, dir: &Path) -> HarnessResult<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(SCENARIO_LOG_FILE);
        let file = File::create(&path)?;
        *self.sink.lock() = Some(file);
        Ok(path)
    }

    /// Flush and detach the current scenario log
    pub fn close(&self) {
        // Release the lock first: the warning below is routed through this sink
        let file = self.sink.lock().take();
        if let Some(mut file) = file {
            if let Err(e) = file.flush() {
                warn!("Failed to flush scenario log: {}", e);
            }
        }
    }

    pub fn is_open(&self) -> bool {
        self.sink.lock().is_some()
    }
}

pub struct ScenarioLogWriter {
    sink: Arc<Mutex<Option<File>>>,
}

impl Write for ScenarioLogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.sink.lock().as_mut() {
            Some(file) => file.write(buf),
            None => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.sink.lock().as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

impl<'a> MakeWriter<'a> for ScenarioLogRouter {
    type Writer = ScenarioLogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        ScenarioLogWriter {
            sink: self.sink.clone(),
        }
    }
}

/// Install the global subscriber: console output plus the scenario log router
pub fn init_logging(config: &LogConfig, router: ScenarioLogRouter) -> HarnessResult<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let console_json = config.json.then(|| fmt::layer().json().with_target(false));
    let console_text = (!config.json).then(|| fmt::layer().with_target(false));
    let scenario_file = fmt::layer().with_ansi(false).with_writer(router);

    tracing_subscriber::registry()
        .with(filter)
        .with(console_json)
        .with(console_text)
        .with(scenario_file)
        .try_init()
        .map_err(|e| HarnessError::Config(format!("logging already initialized: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_router_writes_only_while_open() {
        let dir = TempDir::new().unwrap();
        let router = ScenarioLogRouter::new();

        router.make_writer().write_all(b"before\n").unwrap();
        let path = router.open(&dir.path().join("label-1")).unwrap();
        assert!(router.is_open());
        router.make_writer().write_all(b"during\n").unwrap();
        router.close();
        router.make_writer().write_all(b"after\n").unwrap();

        assert!(!router.is_open());
        assert_eq!(std::fs::read_to_string(path).unwrap(), "during\n");
    }

    #[test]
    fn test_close_while_routing_own_output() {
        let dir = TempDir::new().unwrap();
        let router = ScenarioLogRouter::new();
        let path = router.open(dir.path()).unwrap();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(router.clone())
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("inside scenario");
            router.close();
            tracing::warn!("between scenarios");
        });

        let content = std::fs::read_to_string(path).unwrap();
        assert!(content.contains("inside scenario"));
        assert!(!content.contains("between scenarios"));
    }
}
