//! Scripted in-memory UI driver for integration tests.
//!
//! Models one marketplace page as selector-to-text maps plus a set of
//! visible action labels, with reveal rules that fire when an action is
//! clicked. Every interaction is recorded so tests can assert on
//! exactly what the engine did, with no browser involved.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use postor::driver::{ActionHandle, DriverError, DriverFactory, DriverResult, UiDriver};

/// What clicking one action label does to the page.
#[derive(Debug, Default, Clone)]
pub struct Reveal {
    /// Action labels that become visible after the click.
    pub actions: Vec<String>,
    /// Page texts that become visible after the click.
    pub texts: Vec<String>,
    /// Keep the clicked label visible afterwards.
    pub sticky: bool,
}

impl Reveal {
    pub fn actions(labels: &[&str]) -> Self {
        Reveal {
            actions: labels.iter().map(|s| s.to_string()).collect(),
            ..Reveal::default()
        }
    }

    pub fn texts(texts: &[&str]) -> Self {
        Reveal {
            texts: texts.iter().map(|s| s.to_string()).collect(),
            ..Reveal::default()
        }
    }

    pub fn sticky() -> Self {
        Reveal { sticky: true, ..Reveal::default() }
    }
}

#[derive(Default)]
struct PageState {
    /// selector -> element text.
    texts: HashMap<String, String>,
    /// "selector@attr" -> attribute value.
    attrs: HashMap<String, String>,
    /// Selectors that respond to a plain click.
    clickable: Vec<String>,
    /// Free page texts, matched by substring in `text_visible`.
    visible: Vec<String>,
    /// Currently visible action labels.
    actions: Vec<String>,
    /// Label -> page mutation applied when that action is clicked.
    reveals: HashMap<String, Reveal>,
}

#[derive(Default)]
struct Recorded {
    gotos: Vec<String>,
    fills: Vec<(String, String)>,
    enters: Vec<String>,
    clicks: Vec<String>,
    action_clicks: Vec<String>,
    cookies: Vec<(String, String)>,
    screenshots: Vec<String>,
    closes: u32,
}

struct Inner {
    page: Mutex<PageState>,
    recorded: Mutex<Recorded>,
    /// If set, all operations return a protocol error with this message.
    force_error: Mutex<Option<String>>,
}

/// A deterministic in-memory `UiDriver`. Clones share all state, so a
/// test can keep a handle while the engine owns the boxed copy.
#[derive(Clone)]
pub struct MockDriver {
    inner: Arc<Inner>,
}

impl MockDriver {
    pub fn new() -> Self {
        MockDriver {
            inner: Arc::new(Inner {
                page: Mutex::new(PageState::default()),
                recorded: Mutex::new(Recorded::default()),
                force_error: Mutex::new(None),
            }),
        }
    }

    // -- page scripting ---------------------------------------------------

    pub fn with_text(self, selector: &str, text: &str) -> Self {
        self.page().texts.insert(selector.to_string(), text.to_string());
        self
    }

    pub fn with_attr(self, selector: &str, attr: &str, value: &str) -> Self {
        self.page()
            .attrs
            .insert(format!("{selector}@{attr}"), value.to_string());
        self
    }

    pub fn with_clickable(self, selector: &str) -> Self {
        self.page().clickable.push(selector.to_string());
        self
    }

    pub fn with_visible(self, text: &str) -> Self {
        self.page().visible.push(text.to_string());
        self
    }

    pub fn with_action(self, label: &str) -> Self {
        self.page().actions.push(label.to_string());
        self
    }

    pub fn with_reveal(self, label: &str, reveal: Reveal) -> Self {
        self.page().reveals.insert(label.to_string(), reveal);
        self
    }

    /// Force all subsequent operations to fail with a protocol error.
    pub fn set_error(&self, msg: &str) {
        *self.inner.force_error.lock().unwrap() = Some(msg.to_string());
    }

    // -- recorded interactions --------------------------------------------

    pub fn gotos(&self) -> Vec<String> {
        self.rec().gotos.clone()
    }

    pub fn fills(&self) -> Vec<(String, String)> {
        self.rec().fills.clone()
    }

    pub fn enters(&self) -> Vec<String> {
        self.rec().enters.clone()
    }

    pub fn clicks(&self) -> Vec<String> {
        self.rec().clicks.clone()
    }

    pub fn action_clicks(&self) -> Vec<String> {
        self.rec().action_clicks.clone()
    }

    pub fn cookies(&self) -> Vec<(String, String)> {
        self.rec().cookies.clone()
    }

    pub fn screenshots(&self) -> Vec<String> {
        self.rec().screenshots.clone()
    }

    pub fn closes(&self) -> u32 {
        self.rec().closes
    }

    // -- internals --------------------------------------------------------

    fn page(&self) -> std::sync::MutexGuard<'_, PageState> {
        self.inner.page.lock().unwrap()
    }

    fn rec(&self) -> std::sync::MutexGuard<'_, Recorded> {
        self.inner.recorded.lock().unwrap()
    }

    fn fail_if_forced(&self) -> DriverResult<()> {
        match self.inner.force_error.lock().unwrap().as_ref() {
            Some(msg) => Err(DriverError::Protocol { status: 500, message: msg.clone() }),
            None => Ok(()),
        }
    }
}

impl Default for MockDriver {
    fn default() -> Self {
        MockDriver::new()
    }
}

#[async_trait]
impl UiDriver for MockDriver {
    async fn goto(&self, url: &str) -> DriverResult<()> {
        self.fail_if_forced()?;
        self.rec().gotos.push(url.to_string());
        Ok(())
    }

    async fn fill(&self, selector: &str, value: &str) -> DriverResult<()> {
        self.fail_if_forced()?;
        self.rec().fills.push((selector.to_string(), value.to_string()));
        Ok(())
    }

    async fn press_enter(&self, selector: &str) -> DriverResult<()> {
        self.fail_if_forced()?;
        self.rec().enters.push(selector.to_string());
        Ok(())
    }

    async fn read_text(&self, selector: &str) -> DriverResult<Option<String>> {
        self.fail_if_forced()?;
        Ok(self.page().texts.get(selector).cloned())
    }

    async fn read_attr(&self, selector: &str, attr: &str) -> DriverResult<Option<String>> {
        self.fail_if_forced()?;
        Ok(self.page().attrs.get(&format!("{selector}@{attr}")).cloned())
    }

    async fn click(&self, selector: &str) -> DriverResult<bool> {
        self.fail_if_forced()?;
        let hit = self.page().clickable.iter().any(|s| s == selector);
        if hit {
            self.rec().clicks.push(selector.to_string());
        }
        Ok(hit)
    }

    async fn find_visible_action(&self, labels: &[String]) -> DriverResult<Option<ActionHandle>> {
        self.fail_if_forced()?;
        let page = self.page();
        for label in labels {
            if page.actions.iter().any(|a| a == label) {
                return Ok(Some(ActionHandle {
                    element_id: format!("mock-{label}"),
                    label: label.clone(),
                }));
            }
        }
        Ok(None)
    }

    async fn click_action(&self, handle: &ActionHandle) -> DriverResult<()> {
        self.fail_if_forced()?;
        let mut page = self.page();
        let Some(pos) = page.actions.iter().position(|a| a == &handle.label) else {
            return Err(DriverError::Protocol {
                status: 404,
                message: format!("stale action '{}'", handle.label),
            });
        };

        let reveal = page.reveals.get(&handle.label).cloned().unwrap_or_default();
        if !reveal.sticky {
            page.actions.remove(pos);
        }
        page.actions.extend(reveal.actions);
        page.visible.extend(reveal.texts);
        drop(page);

        self.rec().action_clicks.push(handle.label.clone());
        Ok(())
    }

    async fn text_visible(&self, needle: &str) -> DriverResult<bool> {
        self.fail_if_forced()?;
        Ok(self.page().visible.iter().any(|t| t.contains(needle)))
    }

    async fn set_cookie(&self, name: &str, value: &str) -> DriverResult<()> {
        self.fail_if_forced()?;
        self.rec().cookies.push((name.to_string(), value.to_string()));
        Ok(())
    }

    async fn screenshot(&self, path: &Path) -> DriverResult<()> {
        self.fail_if_forced()?;
        self.rec().screenshots.push(path.display().to_string());
        Ok(())
    }

    async fn close(&self) -> DriverResult<()> {
        self.rec().closes += 1;
        Ok(())
    }

    /// Instant settle keeps tests fast; redraw delays mean nothing here.
    async fn settle(&self, _wait: std::time::Duration) {}
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

/// Hands out clones of one scripted driver, optionally failing the first
/// N session opens to exercise retry paths.
pub struct MockFactory {
    driver: MockDriver,
    opened: AtomicU32,
    failures_left: AtomicU32,
}

impl MockFactory {
    pub fn new(driver: MockDriver) -> Self {
        MockFactory {
            driver,
            opened: AtomicU32::new(0),
            failures_left: AtomicU32::new(0),
        }
    }

    /// Fail the next `n` calls to `open_session` with a transient timeout.
    pub fn fail_times(self, n: u32) -> Self {
        self.failures_left.store(n, Ordering::SeqCst);
        self
    }

    /// Total `open_session` calls, including failed ones.
    pub fn opened(&self) -> u32 {
        self.opened.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DriverFactory for MockFactory {
    async fn open_session(&self) -> DriverResult<Box<dyn UiDriver>> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        let left = self.failures_left.load(Ordering::SeqCst);
        if left > 0 {
            self.failures_left.store(left - 1, Ordering::SeqCst);
            return Err(DriverError::Timeout {
                waited_ms: 10,
                what: "session open".to_string(),
            });
        }
        Ok(Box::new(self.driver.clone()))
    }
}
