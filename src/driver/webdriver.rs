//! WebDriver-protocol browser driver.
//!
//! Talks to a chromedriver-compatible remote endpoint over the W3C
//! WebDriver wire protocol (JSON over HTTP). One `WebDriverSession` maps
//! to one remote browser session; the connector opens a fresh session per
//! task so marketplace state never bleeds between tasks.
//!
//! Endpoint reference: https://www.w3.org/TR/webdriver2/

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use super::{ActionHandle, DriverError, DriverFactory, DriverResult, UiDriver};

// ---------------------------------------------------------------------------
// Protocol constants
// ---------------------------------------------------------------------------

/// W3C element identifier key inside element JSON objects.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// WebDriver key code for Enter.
const ENTER_KEY: &str = "\u{E007}";

const USING_CSS: &str = "css selector";
const USING_XPATH: &str = "xpath";

/// Visibility probes are capped so a needle matching many nodes does not
/// turn one wait poll into dozens of round trips.
const MAX_VISIBILITY_PROBES: usize = 6;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// Every successful WebDriver response wraps its payload in `value`.
#[derive(Debug, Deserialize)]
struct WdValue<T> {
    value: T,
}

/// Error payload carried inside `value` on non-2xx responses.
#[derive(Debug, Deserialize)]
struct WdErrorValue {
    #[serde(default)]
    error: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct NewSessionValue {
    #[serde(rename = "sessionId")]
    session_id: String,
}

/// Element objects arrive as `{"element-6066-...": "<opaque id>"}`.
type ElementObject = std::collections::HashMap<String, String>;

fn element_id(obj: &ElementObject) -> Option<String> {
    obj.get(ELEMENT_KEY).cloned()
}

// ---------------------------------------------------------------------------
// XPath helpers
// ---------------------------------------------------------------------------

/// Quote `text` as an XPath string literal, switching quote style (or
/// falling back to `concat()`) so embedded quotes cannot break the query.
fn xpath_literal(text: &str) -> String {
    if !text.contains('\'') {
        format!("'{text}'")
    } else if !text.contains('"') {
        format!("\"{text}\"")
    } else {
        let parts: Vec<String> = text.split('\'').map(|p| format!("'{p}'")).collect();
        format!("concat({})", parts.join(", \"'\", "))
    }
}

/// XPath matching buttons, links and submit inputs labelled `label`.
fn action_xpath(label: &str) -> String {
    let lit = xpath_literal(label);
    format!(
        "//button[normalize-space(.)={lit}] \
         | //a[normalize-space(.)={lit}] \
         | //input[(@type='submit' or @type='button') and @value={lit}]"
    )
}

/// XPath matching elements whose own text contains `needle`. Matching on
/// direct text nodes keeps container elements (body, wrappers) out of the
/// result set so the visibility probe lands on the element that renders
/// the text.
fn text_xpath(needle: &str) -> String {
    let lit = xpath_literal(needle);
    format!("//*[text()[contains(normalize-space(.), {lit})]]")
}

// ---------------------------------------------------------------------------
// Connector (factory)
// ---------------------------------------------------------------------------

/// Opens WebDriver sessions against a fixed remote endpoint.
pub struct WebDriverConnector {
    endpoint: String,
    http: Client,
    headless: bool,
}

impl WebDriverConnector {
    /// `endpoint` is the driver base URL, e.g. `http://127.0.0.1:9515`.
    /// `action_timeout` bounds every wire command; a hung page surfaces as
    /// a transport error instead of stalling the whole cycle.
    pub fn new(
        endpoint: &str,
        action_timeout: Duration,
        headless: bool,
    ) -> Result<Self, DriverError> {
        let http = Client::builder()
            .timeout(action_timeout)
            .build()
            .map_err(DriverError::Transport)?;

        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            http,
            headless,
        })
    }

    fn capabilities(&self) -> serde_json::Value {
        let mut args = vec![
            "--window-size=1400,1000".to_string(),
            "--disable-gpu".to_string(),
        ];
        if self.headless {
            args.push("--headless=new".to_string());
        }

        json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": { "args": args }
                }
            }
        })
    }
}

#[async_trait]
impl DriverFactory for WebDriverConnector {
    async fn open_session(&self) -> DriverResult<Box<dyn UiDriver>> {
        let url = format!("{}/session", self.endpoint);
        let resp = self.http.post(&url).json(&self.capabilities()).send().await?;
        let session: NewSessionValue = decode(resp).await?;

        debug!(session_id = %session.session_id, "WebDriver session opened");

        Ok(Box::new(WebDriverSession {
            http: self.http.clone(),
            base: format!("{}/session/{}", self.endpoint, session.session_id),
            closed: AtomicBool::new(false),
        }))
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

pub struct WebDriverSession {
    http: Client,
    /// `{endpoint}/session/{id}`; all command URLs hang off this.
    base: String,
    closed: AtomicBool,
}

impl WebDriverSession {
    fn ensure_open(&self) -> DriverResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DriverError::SessionClosed);
        }
        Ok(())
    }

    async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> DriverResult<T> {
        self.ensure_open()?;
        let resp = self
            .http
            .post(format!("{}{}", self.base, path))
            .json(&body)
            .send()
            .await?;
        decode(resp).await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> DriverResult<T> {
        self.ensure_open()?;
        let resp = self.http.get(format!("{}{}", self.base, path)).send().await?;
        decode(resp).await
    }

    /// All element ids matching `value` under the given location strategy.
    /// The plural endpoint returns an empty list for no match, which keeps
    /// absence out of the error channel.
    async fn find_elements(&self, using: &str, value: &str) -> DriverResult<Vec<String>> {
        let objects: Vec<ElementObject> = self
            .post("/elements", json!({ "using": using, "value": value }))
            .await?;
        Ok(objects.iter().filter_map(element_id).collect())
    }

    async fn first_element(&self, using: &str, value: &str) -> DriverResult<Option<String>> {
        Ok(self.find_elements(using, value).await?.into_iter().next())
    }

    /// First css match, or a protocol error naming the selector. Used where
    /// the page contract requires the element to exist.
    async fn required_element(&self, selector: &str) -> DriverResult<String> {
        self.first_element(USING_CSS, selector)
            .await?
            .ok_or_else(|| DriverError::Protocol {
                status: 404,
                message: format!("no element matches selector '{selector}'"),
            })
    }

    async fn element_displayed(&self, id: &str) -> DriverResult<bool> {
        self.get(&format!("/element/{id}/displayed")).await
    }

    async fn element_enabled(&self, id: &str) -> DriverResult<bool> {
        self.get(&format!("/element/{id}/enabled")).await
    }

    async fn send_keys(&self, id: &str, text: &str) -> DriverResult<()> {
        let _: serde_json::Value = self
            .post(&format!("/element/{id}/value"), json!({ "text": text }))
            .await?;
        Ok(())
    }

    async fn click_element(&self, id: &str) -> DriverResult<()> {
        let _: serde_json::Value = self.post(&format!("/element/{id}/click"), json!({})).await?;
        Ok(())
    }
}

#[async_trait]
impl UiDriver for WebDriverSession {
    async fn goto(&self, url: &str) -> DriverResult<()> {
        let _: serde_json::Value = self.post("/url", json!({ "url": url })).await?;
        Ok(())
    }

    async fn fill(&self, selector: &str, value: &str) -> DriverResult<()> {
        let id = self.required_element(selector).await?;
        let _: serde_json::Value = self.post(&format!("/element/{id}/clear"), json!({})).await?;
        self.send_keys(&id, value).await
    }

    async fn press_enter(&self, selector: &str) -> DriverResult<()> {
        let id = self.required_element(selector).await?;
        self.send_keys(&id, ENTER_KEY).await
    }

    async fn read_text(&self, selector: &str) -> DriverResult<Option<String>> {
        match self.first_element(USING_CSS, selector).await? {
            Some(id) => {
                let text: String = self.get(&format!("/element/{id}/text")).await?;
                Ok(Some(text.trim().to_string()))
            }
            None => Ok(None),
        }
    }

    async fn read_attr(&self, selector: &str, attr: &str) -> DriverResult<Option<String>> {
        match self.first_element(USING_CSS, selector).await? {
            Some(id) => self.get(&format!("/element/{id}/attribute/{attr}")).await,
            None => Ok(None),
        }
    }

    async fn click(&self, selector: &str) -> DriverResult<bool> {
        for id in self.find_elements(USING_CSS, selector).await? {
            if self.element_displayed(&id).await? {
                self.click_element(&id).await?;
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn find_visible_action(&self, labels: &[String]) -> DriverResult<Option<ActionHandle>> {
        for label in labels {
            for id in self.find_elements(USING_XPATH, &action_xpath(label)).await? {
                if self.element_displayed(&id).await? && self.element_enabled(&id).await? {
                    debug!(label = %label, "actionable element found");
                    return Ok(Some(ActionHandle {
                        element_id: id,
                        label: label.clone(),
                    }));
                }
            }
        }
        Ok(None)
    }

    async fn click_action(&self, handle: &ActionHandle) -> DriverResult<()> {
        self.click_element(&handle.element_id).await
    }

    async fn text_visible(&self, needle: &str) -> DriverResult<bool> {
        let ids = self.find_elements(USING_XPATH, &text_xpath(needle)).await?;
        for id in ids.iter().take(MAX_VISIBILITY_PROBES) {
            if self.element_displayed(id).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn set_cookie(&self, name: &str, value: &str) -> DriverResult<()> {
        let _: serde_json::Value = self
            .post(
                "/cookie",
                json!({ "cookie": { "name": name, "value": value } }),
            )
            .await?;
        Ok(())
    }

    async fn screenshot(&self, path: &Path) -> DriverResult<()> {
        let payload: String = self.get("/screenshot").await?;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(payload.as_bytes())
            .map_err(|e| DriverError::Protocol {
                status: 200,
                message: format!("undecodable screenshot payload: {e}"),
            })?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, bytes)?;
        Ok(())
    }

    /// Marks the session closed first so a teardown failure cannot leave a
    /// usable handle behind. Delete failures are logged, not raised; a
    /// browser that would not die never outranks the task's results.
    async fn close(&self) -> DriverResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let resp = self.http.delete(&self.base).send().await;
        match resp {
            Ok(r) if r.status().is_success() => {}
            Ok(r) => warn!(status = %r.status(), "WebDriver session delete rejected"),
            Err(e) => warn!(error = %e, "WebDriver session delete failed"),
        }
        Ok(())
    }
}

/// Unwrap a WebDriver response envelope, mapping non-2xx statuses to
/// protocol errors with the remote message attached.
async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> DriverResult<T> {
    let status = resp.status();
    if !status.is_success() {
        let message = match resp.json::<WdValue<WdErrorValue>>().await {
            Ok(body) => format!("{}: {}", body.value.error, body.value.message),
            Err(_) => "unreadable error body".to_string(),
        };
        return Err(DriverError::Protocol {
            status: status.as_u16(),
            message,
        });
    }
    Ok(resp.json::<WdValue<T>>().await?.value)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
