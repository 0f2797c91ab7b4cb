//! Sign-in page

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::browser::BrowserPage;
use crate::config::HarnessConfig;
use crate::error::{HarnessError, HarnessResult};
use crate::page::{Locator, PageObject, SharedPageBehavior};
use crate::poll::PollConfig;

/// Navigation attempts before giving up on the landing page
const NAVIGATION_ATTEMPTS: usize = 3;

#[derive(Debug, Clone)]
struct LoginLocators {
    user_name_input: Locator,
    password_input: Locator,
    login_button: Locator,
    logged_in_user: Locator,
    failed_login_error: Locator,
}

impl Default for LoginLocators {
    fn default() -> Self {
        Self {
            user_name_input: Locator::placeholder("Username"),
            password_input: Locator::placeholder("Password"),
            login_button: Locator::role("button", "Sign In"),
            logged_in_user: Locator::xpath("//span[contains(@class,'userName')]"),
            failed_login_error: Locator::css("div.invalidLoginMsg"),
        }
    }
}

pub struct LoginPage {
    page: Arc<dyn BrowserPage>,
    shared: SharedPageBehavior,
    locators: Mutex<Option<LoginLocators>>,
}

impl LoginPage {
    fn locators(&self) -> HarnessResult<LoginLocators> {
        self.locators
            .lock()
            .clone()
            .ok_or_else(|| HarnessError::PageObject("LoginPage used after dispose".into()))
    }

    /// Open the application, retrying navigation a few times
    pub async fn navigate(&self, base_url: &str, timeout: Duration) -> HarnessResult<()> {
        let mut last_error = None;
        for attempt in 1..=NAVIGATION_ATTEMPTS {
            match self.page.goto(base_url, timeout).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!("Navigation attempt {} failed: {}", attempt, e);
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| HarnessError::Automation("navigation never attempted".into())))
    }

    /// Open the configured base URL within the navigation timeout
    pub async fn open(&self, config: &HarnessConfig) -> HarnessResult<()> {
        self.navigate(&config.base_url, config.timeouts.navigation).await
    }

    /// Sign in using the configured action timeout
    pub async fn sign_in(&self, config: &HarnessConfig, user: &str, password: &str) -> HarnessResult<()> {
        self.login_user(user, password, config.timeouts.action).await
    }

    pub async fn login_user(&self, user: &str, password: &str, timeout: Duration) -> HarnessResult<()> {
        let locators = self.locators()?;
        self.page.fill(&locators.user_name_input.selector(), user).await?;
        self.page.fill(&locators.password_input.selector(), password).await?;
        self.page.click(&locators.login_button.selector(), timeout).await?;
        self.shared.wait_for_operation().await?;
        info!("Submitted credentials for {}", user);
        Ok(())
    }

    pub async fn logged_in_user_name(&self) -> HarnessResult<Option<String>> {
        let locators = self.locators()?;
        self.page.text_content(&locators.logged_in_user.selector()).await
    }

    pub async fn is_login_error_shown(&self) -> HarnessResult<bool> {
        let locators = self.locators()?;
        Ok(self.page.locator_count(&locators.failed_login_error.selector()).await? > 0)
    }
}

#[async_trait]
impl PageObject for LoginPage {
    fn construct(page: Arc<dyn BrowserPage>, poll: PollConfig) -> Self {
        Self {
            shared: SharedPageBehavior::construct(page.clone(), poll),
            page,
            locators: Mutex::new(Some(LoginLocators::default())),
        }
    }

    async fn is_page_stable(&self) -> HarnessResult<bool> {
        Ok(!self.shared.is_operation_in_progress().await?)
    }

    fn dispose(&self) {
        self.locators.lock().take();
        self.shared.dispose();
    }

    fn is_disposed(&self) -> bool {
        self.locators.lock().is_none()
    }
}
