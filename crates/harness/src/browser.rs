//! Browser automation collaborator
//!
//! The lifecycle engine only needs to open and close isolated contexts,
//! open a page, capture completion artifacts and detect timeouts. Everything
//! else a page object does goes through [`BrowserPage`].

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{HarnessError, HarnessResult};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Browser {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl Browser {
    pub fn as_str(&self) -> &'static str {
        match self {
            Browser::Chromium => "chromium",
            Browser::Firefox => "firefox",
            Browser::Webkit => "webkit",
        }
    }
}

impl fmt::Display for Browser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Browser {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chrome" | "chromium" => Ok(Browser::Chromium),
            "firefox" => Ok(Browser::Firefox),
            "webkit" => Ok(Browser::Webkit),
            other => Err(HarnessError::Config(format!(
                "Please set the proper browser! Unknown browser '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Viewport { width: 1920, height: 1080 }
    }
}

/// Options for a new isolated browser context
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextOptions {
    /// Record a video of every page into this directory
    pub record_video_dir: Option<PathBuf>,
    pub viewport: Viewport,
    #[serde(default)]
    pub ignore_https_errors: bool,
}

/// Launched browser
#[async_trait]
pub trait Automation: Send + Sync {
    async fn open_context(&self, options: ContextOptions) -> HarnessResult<Box<dyn BrowserContext>>;

    async fn close(&self) -> HarnessResult<()>;
}

/// Isolated browser context (own cookies, storage and recordings)
#[async_trait]
pub trait BrowserContext: Send + Sync {
    async fn new_page(&self) -> HarnessResult<Arc<dyn BrowserPage>>;

    async fn close(&self) -> HarnessResult<()>;
}

/// Single page inside a context
#[async_trait]
pub trait BrowserPage: Send + Sync {
    async fn url(&self) -> HarnessResult<String>;

    /// Navigate; a timeout surfaces as [`HarnessError::Timeout`]
    async fn goto(&self, url: &str, timeout: Duration) -> HarnessResult<()>;

    async fn screenshot(&self, path: &Path) -> HarnessResult<PathBuf>;

    /// Path of the page's recording, when the context records video
    async fn video_path(&self) -> HarnessResult<Option<PathBuf>>;

    async fn click(&self, selector: &str, timeout: Duration) -> HarnessResult<()>;

    async fn fill(&self, selector: &str, value: &str) -> HarnessResult<()>;

    async fn text_content(&self, selector: &str) -> HarnessResult<Option<String>>;

    /// Number of elements currently matching a selector
    async fn locator_count(&self, selector: &str) -> HarnessResult<usize>;

    async fn close(&self) -> HarnessResult<()>;
}
