//! Page objects and the single-entry page object cache

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;

use crate::browser::BrowserPage;
use crate::error::HarnessResult;
use crate::poll::PollConfig;

pub mod factory;
pub mod locator;
pub mod login;
pub mod shared;

pub use factory::{PageCache, PageObjectFactory};
pub use locator::{Locator, LocatorKind};
pub use login::LoginPage;
pub use shared::SharedPageBehavior;

/// Locators and actions for one screen or region of the application
#[async_trait]
pub trait PageObject: Any + Send + Sync {
    fn construct(page: Arc<dyn BrowserPage>, poll: PollConfig) -> Self
    where
        Self: Sized;

    async fn initialize(&self) -> HarnessResult<()> {
        Ok(())
    }

    /// Whether the page has finished loading and can be interacted with
    async fn is_page_stable(&self) -> HarnessResult<bool>;

    /// `true` for real, address-bound pages; `false` for shared helpers.
    /// Only real pages are cached.
    fn can_navigate_with_url(&self) -> bool {
        true
    }

    /// Drop element locators so nothing leaks into the next browser context
    fn dispose(&self);

    fn is_disposed(&self) -> bool;
}
