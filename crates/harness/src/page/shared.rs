//! Behavior shared by every screen: spinners, toasts, inline errors

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{error, info};

use crate::browser::BrowserPage;
use crate::error::{HarnessError, HarnessResult};
use crate::page::{Locator, PageObject};
use crate::poll::{poll_until, PollConfig};

#[derive(Debug, Clone)]
struct SharedLocators {
    progress: Locator,
    toast_container: Locator,
    toast_alert: Locator,
    no_items_found: Locator,
    no_record_found: Locator,
}

impl Default for SharedLocators {
    fn default() -> Self {
        Self {
            progress: Locator::css("[class^=\"loader\"]"),
            toast_container: Locator::id("toast-container"),
            toast_alert: Locator::xpath("//div[@role='alert']"),
            no_items_found: Locator::xpath("//div[text()='No items found']"),
            no_record_found: Locator::xpath("//*[contains(text(),'No record Found')]"),
        }
    }
}

/// Helper object, not a real page; never cached by the factory
pub struct SharedPageBehavior {
    page: Arc<dyn BrowserPage>,
    poll: PollConfig,
    locators: Mutex<Option<SharedLocators>>,
}

impl SharedPageBehavior {
    fn locators(&self) -> HarnessResult<SharedLocators> {
        self.locators
            .lock()
            .clone()
            .ok_or_else(|| HarnessError::PageObject("SharedPageBehavior used after dispose".into()))
    }

    /// Whether a loading spinner is currently shown
    pub async fn is_operation_in_progress(&self) -> HarnessResult<bool> {
        let locators = self.locators()?;
        match self.page.locator_count(&locators.progress.selector()).await {
            Ok(count) => Ok(count > 0),
            Err(e) => {
                error!("failed to track spinner. Error - {}", e);
                Err(e)
            }
        }
    }

    /// Block until no spinner is shown
    pub async fn wait_for_operation(&self) -> HarnessResult<()> {
        poll_until(&self.poll, "operation in progress", move || async move {
            Ok::<bool, HarnessError>(!self.is_operation_in_progress().await?)
        })
        .await?;
        Ok(())
    }

    pub async fn is_toast_visible(&self) -> HarnessResult<bool> {
        let locators = self.locators()?;
        Ok(self.page.locator_count(&locators.toast_container.selector()).await? > 0)
    }

    /// Block until the toast message disappears
    pub async fn wait_until_toast_closed(&self) -> HarnessResult<()> {
        poll_until(&self.poll, "toast message closed", move || async move {
            Ok::<bool, HarnessError>(!self.is_toast_visible().await?)
        })
        .await?;
        Ok(())
    }

    /// Click a button and return the toast text it produced
    pub async fn click_and_read_toast(
        &self,
        operation: &str,
        button: &Locator,
        timeout: Duration,
    ) -> HarnessResult<String> {
        info!("{} has started", operation);
        let locators = self.locators()?;
        self.page.click(&button.selector(), timeout).await?;
        self.wait_for_operation().await?;

        let message = self
            .page
            .text_content(&locators.toast_alert.selector())
            .await?
            .map(|t| t.trim().to_string())
            .unwrap_or_default();
        info!("{} has completed with the message - {}", operation, message);
        Ok(message)
    }

    /// Whether an inline error line containing `text` is shown
    pub async fn check_if_error_exists(&self, text: &str) -> HarnessResult<bool> {
        self.wait_for_operation().await?;
        let xpath = Locator::xpath(format!("//li[contains(text(),'{}')]", text));
        Ok(self.page.locator_count(&xpath.selector()).await? > 0)
    }

    pub async fn is_no_data_available(&self) -> HarnessResult<bool> {
        let locators = self.locators()?;
        let no_record = self.page.locator_count(&locators.no_record_found.selector()).await?;
        let no_items = self.page.locator_count(&locators.no_items_found.selector()).await?;
        Ok(no_record + no_items > 0)
    }
}

#[async_trait]
impl PageObject for SharedPageBehavior {
    fn construct(page: Arc<dyn BrowserPage>, poll: PollConfig) -> Self {
        Self {
            page,
            poll,
            locators: Mutex::new(Some(SharedLocators::default())),
        }
    }

    async fn is_page_stable(&self) -> HarnessResult<bool> {
        Ok(true)
    }

    fn can_navigate_with_url(&self) -> bool {
        false
    }

    fn dispose(&self) {
        self.locators.lock().take();
    }

    fn is_disposed(&self) -> bool {
        self.locators.lock().is_none()
    }
}
