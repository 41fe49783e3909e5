//! Per-marketplace submission session.
//!
//! One `SubmissionEngine` owns one live driver session and walks every
//! keyword through the same pipeline: search, screen, score, decide,
//! adjust, submit, verify. The engine is a small state machine; every
//! phase transition is logged so a task log reads as a trace of where
//! each attempt got to before it settled on a status.
//!
//! Failures inside one keyword never leak: they become an `error` result
//! and the next keyword starts fresh from the search page. Only login
//! failures abort the whole task; retrying a rejected login is how
//! accounts get locked.

use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info, warn};

use crate::config::{AgentConfig, AuthConfig, TargetConfig};
use crate::driver::{DriverError, UiDriver};
use crate::money::parse_amount;
use crate::policy::BidPolicy;
use crate::screening::Screening;
use crate::types::{AttemptResult, AttemptStatus, Candidate, KeywordEntry};

use super::TaskError;

/// Poll cadence while waiting for submission confirmation.
const VERIFY_POLL: Duration = Duration::from_millis(250);

/// Confirmation dialogs occasionally nest (confirm, then an "are you
/// sure"); more than this many rounds means we are clicking furniture.
const MAX_CONFIRM_ROUNDS: usize = 3;

// ---------------------------------------------------------------------------
// Phases
// ---------------------------------------------------------------------------

/// Where a session currently is in the submission pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionPhase {
    LoggedOut,
    LoggingIn,
    Browsing,
    SearchResults,
    CandidateOpen,
    Adjusting,
    Submitting,
    Verifying,
    Done,
    ErrorTerminal,
}

impl std::fmt::Display for SubmissionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SubmissionPhase::LoggedOut => "logged_out",
            SubmissionPhase::LoggingIn => "logging_in",
            SubmissionPhase::Browsing => "browsing",
            SubmissionPhase::SearchResults => "search_results",
            SubmissionPhase::CandidateOpen => "candidate_open",
            SubmissionPhase::Adjusting => "adjusting",
            SubmissionPhase::Submitting => "submitting",
            SubmissionPhase::Verifying => "verifying",
            SubmissionPhase::Done => "done",
            SubmissionPhase::ErrorTerminal => "error",
        };
        write!(f, "{name}")
    }
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// Secrets resolved from the environment just before login. Values stay
/// wrapped until the moment they are typed into the page.
pub enum Credentials {
    Form {
        username: SecretString,
        password: SecretString,
    },
    SessionCookie {
        value: SecretString,
    },
}

impl Credentials {
    /// Resolve credentials per the target's auth method. The credential
    /// gate has already vetted presence; a miss here means the environment
    /// changed underneath us, which is still a login failure.
    pub fn resolve(auth: &AuthConfig) -> Result<Self, TaskError> {
        match auth {
            AuthConfig::Form { user_env, pass_env, .. } => Ok(Credentials::Form {
                username: read_secret(user_env)?,
                password: read_secret(pass_env)?,
            }),
            AuthConfig::SessionCookie { cookie_env_any, .. } => {
                for var in cookie_env_any {
                    if let Ok(value) = std::env::var(var) {
                        if !value.is_empty() {
                            return Ok(Credentials::SessionCookie {
                                value: SecretString::new(value),
                            });
                        }
                    }
                }
                Err(TaskError::Login(format!(
                    "none of {} is set",
                    cookie_env_any.join(", ")
                )))
            }
        }
    }
}

fn read_secret(var: &str) -> Result<SecretString, TaskError> {
    match std::env::var(var) {
        Ok(value) if !value.is_empty() => Ok(SecretString::new(value)),
        _ => Err(TaskError::Login(format!("{var} is not set"))),
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct SubmissionEngine<'a> {
    driver: Box<dyn UiDriver>,
    target: &'a TargetConfig,
    screening: &'a Screening,
    policy: &'a BidPolicy,
    settle: Duration,
    action_timeout: Duration,
    artifacts_dir: PathBuf,
    phase: SubmissionPhase,
}

impl<'a> SubmissionEngine<'a> {
    pub fn new(
        driver: Box<dyn UiDriver>,
        target: &'a TargetConfig,
        screening: &'a Screening,
        policy: &'a BidPolicy,
        agent: &AgentConfig,
    ) -> Self {
        SubmissionEngine {
            driver,
            target,
            screening,
            policy,
            settle: Duration::from_millis(agent.settle_ms),
            action_timeout: Duration::from_secs(agent.action_timeout_secs),
            artifacts_dir: agent.artifacts_dir.clone(),
            phase: SubmissionPhase::LoggedOut,
        }
    }

    pub fn phase(&self) -> SubmissionPhase {
        self.phase
    }

    fn set_phase(&mut self, next: SubmissionPhase) {
        if next != self.phase {
            debug!(target_name = %self.target.name, from = %self.phase, to = %next, "phase");
            self.phase = next;
        }
    }

    /// Release the browser session. Safe to call on any exit path.
    pub async fn close(&self) {
        if let Err(e) = self.driver.close().await {
            warn!(target_name = %self.target.name, error = %e, "session close failed");
        }
    }

    // -- Login ------------------------------------------------------------

    /// Authenticate against the marketplace. Every failure in this phase
    /// is terminal for the task: wrong credentials, a missing landing
    /// marker and a flaky page are indistinguishable from out here, and
    /// hammering a login form is the one retry that makes things worse.
    pub async fn login(&mut self, credentials: &Credentials) -> Result<(), TaskError> {
        self.set_phase(SubmissionPhase::LoggingIn);

        let result = match (&self.target.auth, credentials) {
            (
                AuthConfig::Form {
                    user_field,
                    pass_field,
                    login_labels,
                    authenticated_marker,
                    ..
                },
                Credentials::Form { username, password },
            ) => {
                self.form_login(
                    user_field,
                    pass_field,
                    login_labels,
                    authenticated_marker,
                    username,
                    password,
                )
                .await
            }
            (
                AuthConfig::SessionCookie {
                    cookie_name,
                    authenticated_marker,
                    ..
                },
                Credentials::SessionCookie { value },
            ) => {
                self.cookie_login(cookie_name, authenticated_marker.as_deref(), value)
                    .await
            }
            _ => Err(TaskError::Login(
                "credential shape does not match auth method".to_string(),
            )),
        };

        match result {
            Ok(()) => {
                info!(target_name = %self.target.name, "login ok");
                self.set_phase(SubmissionPhase::Browsing);
                Ok(())
            }
            Err(e) => {
                self.set_phase(SubmissionPhase::ErrorTerminal);
                Err(e)
            }
        }
    }

    async fn form_login(
        &self,
        user_field: &str,
        pass_field: &str,
        login_labels: &[String],
        authenticated_marker: &str,
        username: &SecretString,
        password: &SecretString,
    ) -> Result<(), TaskError> {
        let d = &self.driver;
        d.goto(&self.target.login_url).await.map_err(login_fault)?;
        d.fill(user_field, username.expose_secret())
            .await
            .map_err(login_fault)?;
        d.fill(pass_field, password.expose_secret())
            .await
            .map_err(login_fault)?;

        match d.find_visible_action(login_labels).await.map_err(login_fault)? {
            Some(handle) => d.click_action(&handle).await.map_err(login_fault)?,
            None => d.press_enter(pass_field).await.map_err(login_fault)?,
        }

        let authed = d
            .wait_for_text(authenticated_marker, self.action_timeout)
            .await
            .map_err(login_fault)?;
        if !authed {
            return Err(TaskError::Login(format!(
                "marker '{authenticated_marker}' never appeared"
            )));
        }
        Ok(())
    }

    async fn cookie_login(
        &self,
        cookie_name: &str,
        authenticated_marker: Option<&str>,
        value: &SecretString,
    ) -> Result<(), TaskError> {
        let d = &self.driver;
        // A cookie needs an origin before it can be installed.
        d.goto(&self.target.login_url).await.map_err(login_fault)?;
        d.set_cookie(cookie_name, value.expose_secret())
            .await
            .map_err(login_fault)?;
        d.goto(&self.target.search_url).await.map_err(login_fault)?;

        if let Some(marker) = authenticated_marker {
            let authed = d
                .wait_for_text(marker, self.action_timeout)
                .await
                .map_err(login_fault)?;
            if !authed {
                return Err(TaskError::Login(format!(
                    "session artifact rejected: '{marker}' never appeared"
                )));
            }
        }
        Ok(())
    }

    // -- Keyword pipeline -------------------------------------------------

    /// Run one keyword end to end. Never fails: pipeline errors become an
    /// `error` result and the session stays usable for the next keyword.
    pub async fn run_keyword(&mut self, entry: &KeywordEntry) -> AttemptResult {
        let result = match self.process_keyword(entry).await {
            Ok(result) => {
                self.set_phase(SubmissionPhase::Done);
                result
            }
            Err(e) => {
                self.set_phase(SubmissionPhase::ErrorTerminal);
                warn!(keyword = %entry.phrase, error = %e, "keyword attempt failed");
                AttemptResult::new(&entry.phrase, AttemptStatus::Error)
                    .with_reason(error_reason(&e))
            }
        };
        info!(
            keyword = %entry.phrase,
            status = %result.status,
            reason = result.reason.as_deref().unwrap_or("-"),
            "keyword settled"
        );
        result
    }

    async fn process_keyword(&mut self, entry: &KeywordEntry) -> Result<AttemptResult, DriverError> {
        let phrase = &entry.phrase;

        // Early exclusion checkpoint: a poisoned keyword never reaches
        // the marketplace at all.
        if let Some(reason) = self.screening.vet_keyword(phrase) {
            return Ok(AttemptResult::new(phrase, AttemptStatus::Omitted).with_reason(reason));
        }

        let sel = &self.target.selectors;

        self.set_phase(SubmissionPhase::Browsing);
        self.driver.goto(&self.target.search_url).await?;
        self.driver.fill(&sel.search_box, phrase).await?;
        self.driver.press_enter(&sel.search_box).await?;
        self.driver.settle(self.settle).await;
        self.set_phase(SubmissionPhase::SearchResults);

        // Only the top result is considered.
        let title = match self.driver.read_text(&sel.result_card).await? {
            Some(t) if !t.is_empty() => t,
            _ => return Ok(AttemptResult::new(phrase, AttemptStatus::NoResults)),
        };

        let href = self
            .driver
            .read_attr(&sel.result_card, "href")
            .await?
            .unwrap_or_default();
        let id = if href.is_empty() { title.clone() } else { href.clone() };
        let candidate = Candidate::from_listing(id, &title, href);

        // Late exclusion checkpoint, on the real listing title.
        let screened = self.screening.screen_listing(candidate, entry);
        if screened.excluded {
            let reason = screened.exclusion_reason.as_deref().unwrap_or("excluded");
            return Ok(AttemptResult::new(phrase, AttemptStatus::Omitted).with_reason(reason));
        }
        if !screened.meets(entry.match_threshold) {
            let reason = format!(
                "score {} below threshold {}",
                screened.match_score.round_dp(1),
                entry.match_threshold
            );
            return Ok(AttemptResult::new(phrase, AttemptStatus::NoMatch)
                .with_reason(reason)
                .with_score(screened.match_score));
        }

        if !self.driver.click(&sel.result_card).await? {
            return Ok(AttemptResult::new(phrase, AttemptStatus::Error)
                .with_reason("result card not clickable"));
        }
        self.driver.settle(self.settle).await;
        self.set_phase(SubmissionPhase::CandidateOpen);

        let mut evidence = Vec::new();
        if let Some(path) = self.capture_evidence("before").await {
            evidence.push(path);
        }

        let budget = self.read_amount(sel.budget.as_deref()).await?;
        let offer = self.read_amount(sel.current_offer.as_deref()).await?;
        debug!(
            keyword = %phrase,
            title = %screened.candidate.title,
            budget = %fmt_opt(budget),
            offer = %fmt_opt(offer),
            score = %screened.match_score.round_dp(1),
            "candidate open"
        );

        let decision = self.policy.decide(budget, offer, screened.match_score);

        if !decision.should_submit {
            let reason = decision.rationale.as_str();
            return Ok(AttemptResult::new(phrase, AttemptStatus::Candidate)
                .with_reason(reason)
                .with_score(screened.match_score)
                .with_evidence(evidence));
        }

        let adjusted = if let (true, Some(target_amount)) =
            (decision.should_adjust, decision.target_amount)
        {
            self.set_phase(SubmissionPhase::Adjusting);
            self.fill_offer(target_amount).await?
        } else {
            // Submitting at the standing terms is only safe if this tender
            // was never submitted before.
            if self.already_applied().await? {
                return Ok(AttemptResult::new(phrase, AttemptStatus::Candidate)
                    .with_reason("already_applied")
                    .with_score(screened.match_score)
                    .with_evidence(evidence));
            }
            false
        };

        self.set_phase(SubmissionPhase::Submitting);
        let Some(apply) = self.driver.find_visible_action(&self.target.labels.apply).await? else {
            return Ok(AttemptResult::new(phrase, AttemptStatus::Candidate)
                .with_reason("apply_action_not_found")
                .with_score(screened.match_score)
                .with_evidence(evidence));
        };
        debug!(keyword = %phrase, label = %apply.label, adjusted, "submitting");
        self.driver.click_action(&apply).await?;
        self.confirm_dialogs().await?;
        self.driver.settle(self.settle).await;

        self.set_phase(SubmissionPhase::Verifying);
        let confirmed = self.verify_submission().await?;
        if let Some(path) = self.capture_evidence("after").await {
            evidence.push(path);
        }

        let result = if confirmed {
            let status = if adjusted {
                AttemptStatus::AdjustedAndApplied
            } else {
                AttemptStatus::Applied
            };
            AttemptResult::new(phrase, status)
                .with_score(screened.match_score)
                .with_evidence(evidence)
        } else {
            // The click landed but the page never acknowledged it. Claiming
            // success here is how double submissions happen.
            AttemptResult::new(phrase, AttemptStatus::Attempted)
                .with_reason("submission not confirmed")
                .with_score(screened.match_score)
                .with_evidence(evidence)
        };
        Ok(result)
    }

    // -- Pipeline steps ---------------------------------------------------

    async fn read_amount(&self, selector: Option<&str>) -> Result<Option<Decimal>, DriverError> {
        let Some(selector) = selector else {
            return Ok(None);
        };
        Ok(self
            .driver
            .read_text(selector)
            .await?
            .and_then(|text| parse_amount(&text, self.target.amount_locale)))
    }

    /// Type the adjusted amount into the offer field. Returns whether an
    /// adjustment actually happened: targets without an editable offer
    /// field proceed at the standing terms rather than aborting.
    async fn fill_offer(&self, target_amount: Decimal) -> Result<bool, DriverError> {
        match &self.target.selectors.offer_input {
            Some(selector) => {
                self.driver
                    .fill(selector, &format_amount(target_amount))
                    .await?;
                debug!(amount = %target_amount, "offer adjusted");
                Ok(true)
            }
            None => {
                warn!(
                    target_name = %self.target.name,
                    "no offer input configured; submitting without adjustment"
                );
                Ok(false)
            }
        }
    }

    /// Whether this tender already carries our submission: confirmation
    /// vocabulary on the page, or no apply action left to click.
    async fn already_applied(&self) -> Result<bool, DriverError> {
        for marker in &self.target.labels.verify {
            if self.driver.text_visible(marker).await? {
                return Ok(true);
            }
        }
        Ok(self
            .driver
            .find_visible_action(&self.target.labels.apply)
            .await?
            .is_none())
    }

    /// Click through confirmation dialogs until none appears.
    async fn confirm_dialogs(&self) -> Result<(), DriverError> {
        for _ in 0..MAX_CONFIRM_ROUNDS {
            self.driver.settle(self.settle).await;
            match self
                .driver
                .find_visible_action(&self.target.labels.confirm)
                .await?
            {
                Some(handle) => {
                    debug!(label = %handle.label, "confirm dialog");
                    self.driver.click_action(&handle).await?;
                }
                None => break,
            }
        }
        Ok(())
    }

    /// Positive confirmation: verification vocabulary appears within the
    /// action timeout, or the apply action is gone.
    async fn verify_submission(&self) -> Result<bool, DriverError> {
        let deadline = tokio::time::Instant::now() + self.action_timeout;
        loop {
            for marker in &self.target.labels.verify {
                if self.driver.text_visible(marker).await? {
                    return Ok(true);
                }
            }
            if tokio::time::Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(VERIFY_POLL).await;
        }
        Ok(self
            .driver
            .find_visible_action(&self.target.labels.apply)
            .await?
            .is_none())
    }

    /// Best-effort page snapshot. Evidence failures are logged and
    /// swallowed: a missing screenshot never outranks the submission.
    async fn capture_evidence(&self, stage: &str) -> Option<String> {
        let stamp = Utc::now().format("%Y%m%d_%H%M%S");
        let file = format!("{}_{}_{}.png", self.target.slug, stamp, stage);
        let path = self.artifacts_dir.join(&self.target.slug).join(file);
        match self.driver.screenshot(&path).await {
            Ok(()) => Some(path.display().to_string()),
            Err(e) => {
                warn!(stage, error = %e, "evidence capture failed");
                None
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn login_fault(e: DriverError) -> TaskError {
    TaskError::Login(e.to_string())
}

/// Result-file reason for a failed keyword. Hangs get the stable
/// `timeout` token; everything else keeps its message.
fn error_reason(e: &DriverError) -> String {
    match e {
        DriverError::Timeout { .. } => "timeout".to_string(),
        DriverError::Transport(inner) if inner.is_timeout() => "timeout".to_string(),
        other => other.to_string(),
    }
}

fn format_amount(value: Decimal) -> String {
    value.normalize().to_string()
}

fn fmt_opt(value: Option<Decimal>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
