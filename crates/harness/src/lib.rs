//! Scenario Harness
//!
//! Lifecycle engine for browser-driven BDD suites. It sits between a BDD
//! runner and a browser automation driver and:
//! - Tracks per-scenario retry attempts and decides when a failure is final
//! - Reconciles artifacts orphaned by a scenario whose teardown never ran
//! - Aggregates passed results in memory and writes failed results as they happen
//! - Caches at most one live "real" page object per scenario
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 LifecycleOrchestrator (hooks)               │
//! ├─────────────────────────────────────────────────────────────┤
//! │  on_run_start()          -> result tree, ledger, data bag   │
//! │  on_scenario_start(meta) -> janitor, label, attempt, page   │
//! │  on_step_failure(step)   -> FailedStep into data bag        │
//! │  on_scenario_end(meta)   -> results, build signal, teardown │
//! │  on_run_end()            -> passed-scenarios.json, close    │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ScenarioContext                                            │
//! │    ├── RunScope: config, RetryLedger, RunStateStore,        │
//! │    │             global DataBag, ResultAggregator           │
//! │    └── ScenarioScope: label, DataBag, context, page,        │
//! │                       PageObjectFactory                     │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod browser;
pub mod catalog;
pub mod config;
pub mod context;
pub mod data_bag;
pub mod data_provider;
pub mod error;
pub mod hooks;
pub mod identity;
pub mod janitor;
pub mod logging;
pub mod page;
pub mod playwright;
pub mod poll;
pub mod report;
pub mod results;
pub mod retry;
pub mod run_state;
pub mod runner;
pub mod scenario;

pub use config::HarnessConfig;
pub use context::ScenarioContext;
pub use data_bag::{DataBag, DataBagKey};
pub use error::{HarnessError, HarnessResult};
pub use hooks::LifecycleOrchestrator;
pub use identity::ScenarioIdentity;
pub use retry::RetryLedger;
pub use runner::{SuiteResult, SuiteRunner};
pub use scenario::{ScenarioExecutor, ScenarioMeta, ScenarioOutcome, ScenarioStatus};
