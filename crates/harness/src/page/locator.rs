//! Typed element locators

use std::fmt;

/// How an element is located
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocatorKind {
    XPath,
    Css,
    Role { role: &'static str },
    Placeholder,
    TestId,
    Id,
    Text,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locator {
    pub kind: LocatorKind,
    pub value: String,
}

impl Locator {
    pub fn xpath(value: impl Into<String>) -> Self {
        Self { kind: LocatorKind::XPath, value: value.into() }
    }

    pub fn css(value: impl Into<String>) -> Self {
        Self { kind: LocatorKind::Css, value: value.into() }
    }

    pub fn role(role: &'static str, name: impl Into<String>) -> Self {
        Self { kind: LocatorKind::Role { role }, value: name.into() }
    }

    pub fn placeholder(value: impl Into<String>) -> Self {
        Self { kind: LocatorKind::Placeholder, value: value.into() }
    }

    pub fn test_id(value: impl Into<String>) -> Self {
        Self { kind: LocatorKind::TestId, value: value.into() }
    }

    pub fn id(value: impl Into<String>) -> Self {
        Self { kind: LocatorKind::Id, value: value.into() }
    }

    pub fn text(value: impl Into<String>) -> Self {
        Self { kind: LocatorKind::Text, value: value.into() }
    }

    /// Render as a Playwright selector string
    pub fn selector(&self) -> String {
        match &self.kind {
            LocatorKind::XPath => format!("xpath={}", self.value),
            LocatorKind::Css => self.value.clone(),
            LocatorKind::Role { role } => format!("role={}[name=\"{}\"]", role, self.value),
            LocatorKind::Placeholder => format!("[placeholder=\"{}\"]", self.value),
            LocatorKind::TestId => format!("[data-testid=\"{}\"]", self.value),
            LocatorKind::Id => format!("[id='{}']", self.value),
            LocatorKind::Text => format!("text={}", self.value),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.selector())
    }
}
