use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::Result;

/// How an element is located on the page.
///
/// Written in configuration as `kind:value`, e.g. `xpath:/html/body/div[1]`,
/// `css:div.preloader`, `id:mapMaint` or `name:lEmail`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Locator {
    XPath(String),
    Css(String),
    Id(String),
    Name(String),
}

impl Locator {
    pub fn xpath(value: impl Into<String>) -> Self {
        Locator::XPath(value.into())
    }

    pub fn css(value: impl Into<String>) -> Self {
        Locator::Css(value.into())
    }

    pub fn id(value: impl Into<String>) -> Self {
        Locator::Id(value.into())
    }

    pub fn name(value: impl Into<String>) -> Self {
        Locator::Name(value.into())
    }

    /// Equivalent CSS selector for attribute based locators. XPath has none.
    pub fn as_css(&self) -> Option<String> {
        match self {
            Locator::XPath(_) => None,
            Locator::Css(selector) => Some(selector.clone()),
            Locator::Id(id) => Some(format!("[id=\"{}\"]", id)),
            Locator::Name(name) => Some(format!("[name=\"{}\"]", name)),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::XPath(v) => write!(f, "xpath:{}", v),
            Locator::Css(v) => write!(f, "css:{}", v),
            Locator::Id(v) => write!(f, "id:{}", v),
            Locator::Name(v) => write!(f, "name:{}", v),
        }
    }
}

impl FromStr for Locator {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (kind, value) = s
            .split_once(':')
            .ok_or_else(|| format!("locator '{}' must look like kind:value", s))?;
        let value = value.trim();
        if value.is_empty() {
            return Err(format!("locator '{}' has an empty value", s));
        }

        match kind.trim().to_ascii_lowercase().as_str() {
            "xpath" => Ok(Locator::XPath(value.to_string())),
            "css" => Ok(Locator::Css(value.to_string())),
            "id" => Ok(Locator::Id(value.to_string())),
            "name" => Ok(Locator::Name(value.to_string())),
            other => Err(format!("unknown locator kind '{}'", other)),
        }
    }
}

impl TryFrom<String> for Locator {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Locator> for String {
    fn from(locator: Locator) -> Self {
        locator.to_string()
    }
}

/// An element that a wait has found. Operations re-resolve it through its locator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementHandle {
    locator: Locator,
}

impl ElementHandle {
    pub fn new(locator: Locator) -> Self {
        Self { locator }
    }

    pub fn locator(&self) -> &Locator {
        &self.locator
    }
}

/// One live browser session.
///
/// Every wait is bounded by the timeout it is given; a wait that runs out
/// returns `AppError::Timeout`.
#[async_trait]
pub trait PageAutomation: Send + Sync {
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<()>;
    async fn wait_until_clickable(&self, locator: &Locator, timeout: Duration) -> Result<ElementHandle>;
    async fn wait_until_visible(&self, locator: &Locator, timeout: Duration) -> Result<ElementHandle>;
    async fn wait_until_absent(&self, locator: &Locator, timeout: Duration) -> Result<()>;
    async fn click(&self, element: &ElementHandle) -> Result<()>;
    async fn type_text(&self, element: &ElementHandle, text: &str) -> Result<()>;
    async fn read_text(&self, element: &ElementHandle) -> Result<String>;

    /// Releases the browser. Called once per session.
    async fn close(&self) -> Result<()>;
}

/// Opens fresh, independent browser sessions.
#[async_trait]
pub trait AutomationFactory: Send + Sync {
    async fn open(&self) -> Result<Box<dyn PageAutomation>>;
}
