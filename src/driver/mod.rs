//! UI automation driver abstraction.
//!
//! The submission engine drives marketplaces exclusively through the
//! `UiDriver` trait: navigate/search/click/read-field primitives plus
//! bounded waits. Marketplace selectors live in configuration; no DOM
//! library leaks past this boundary. The concrete implementation speaks
//! the WebDriver wire protocol to a remote browser endpoint.

pub mod webdriver;

pub use webdriver::{WebDriverConnector, WebDriverSession};

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Poll cadence for visibility waits.
const TEXT_POLL_INTERVAL: Duration = Duration::from_millis(250);

pub type DriverResult<T> = Result<T, DriverError>;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures raised by a UI driver.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The remote driver rejected a command (bad selector, dead element,
    /// invalid state).
    #[error("driver protocol error ({status}): {message}")]
    Protocol { status: u16, message: String },

    #[error("timed out after {waited_ms}ms waiting for {what}")]
    Timeout { waited_ms: u64, what: String },

    #[error("driver session is closed")]
    SessionClosed,

    #[error("evidence write failed: {0}")]
    Evidence(#[from] std::io::Error),
}

impl DriverError {
    /// Transport hiccups and expired waits are worth retrying; protocol
    /// errors mean a broken selector or a dead session and are not.
    pub fn is_transient(&self) -> bool {
        matches!(self, DriverError::Transport(_) | DriverError::Timeout { .. })
    }
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Reference to a visible, clickable element found by its action label.
#[derive(Debug, Clone)]
pub struct ActionHandle {
    pub element_id: String,
    /// The label that matched, for logging and result records.
    pub label: String,
}

/// One live browser session against one marketplace.
///
/// Absence is data, not failure: lookups return `Ok(None)`/`Ok(false)`
/// when nothing matches, and reserve `Err` for transport, protocol and
/// session faults.
#[async_trait]
pub trait UiDriver: Send + Sync {
    async fn goto(&self, url: &str) -> DriverResult<()>;

    /// Clear the first element matching `selector` and type `value` into it.
    async fn fill(&self, selector: &str, value: &str) -> DriverResult<()>;

    /// Send the Enter key to the first element matching `selector`.
    async fn press_enter(&self, selector: &str) -> DriverResult<()>;

    /// Visible text of the first element matching `selector`, if any.
    async fn read_text(&self, selector: &str) -> DriverResult<Option<String>>;

    /// Attribute value of the first element matching `selector`, if any.
    async fn read_attr(&self, selector: &str, attr: &str) -> DriverResult<Option<String>>;

    /// Click the first visible element matching `selector`. `Ok(false)`
    /// when nothing matched.
    async fn click(&self, selector: &str) -> DriverResult<bool>;

    /// Find the first visible, enabled actionable element whose label
    /// matches any of `labels`, tried in priority order.
    async fn find_visible_action(&self, labels: &[String]) -> DriverResult<Option<ActionHandle>>;

    async fn click_action(&self, handle: &ActionHandle) -> DriverResult<()>;

    /// Whether `needle` is currently visible anywhere on the page.
    async fn text_visible(&self, needle: &str) -> DriverResult<bool>;

    /// Install a cookie on the current origin (session-artifact logins).
    async fn set_cookie(&self, name: &str, value: &str) -> DriverResult<()>;

    /// Capture a full-page snapshot to `path`.
    async fn screenshot(&self, path: &Path) -> DriverResult<()>;

    /// Release the underlying browser session. Idempotent.
    async fn close(&self) -> DriverResult<()>;

    /// Fixed settle delay for page redraws.
    async fn settle(&self, wait: Duration) {
        tokio::time::sleep(wait).await;
    }

    /// Poll for `needle` until it is visible or `timeout` elapses.
    /// `Ok(false)` on expiry; callers decide whether that is fatal.
    async fn wait_for_text(&self, needle: &str, timeout: Duration) -> DriverResult<bool> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.text_visible(needle).await? {
                return Ok(true);
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(TEXT_POLL_INTERVAL).await;
        }
    }
}

/// Opens fresh driver sessions. Each task attempt gets its own session.
#[async_trait]
pub trait DriverFactory: Send + Sync {
    async fn open_session(&self) -> DriverResult<Box<dyn UiDriver>>;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
