//! Configuration loading from TOML plus keyword input files.
//!
//! Reads `postor.toml` and deserializes into strongly-typed structs.
//! Credentials are referenced by env-var name in the config and resolved
//! at runtime; no secret value ever lives in the file. The keyword list
//! is a separate two-column CSV so non-developers can edit it.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::engine::gate::CredentialRequirement;
use crate::engine::retry::RetryPolicy;
use crate::money::AmountLocale;
use crate::policy::BidPolicyConfig;
use crate::types::KeywordEntry;

// ---------------------------------------------------------------------------
// Top-level configuration
// ---------------------------------------------------------------------------

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub policy: BidPolicyConfig,
    #[serde(default)]
    pub retry: RetryPolicy,
    pub targets: Vec<TargetConfig>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AgentConfig {
    /// Minutes between cycles in watch mode.
    pub interval_minutes: u64,
    /// WebDriver remote endpoint.
    pub webdriver_url: String,
    pub headless: bool,
    /// Upper bound on any single driver command. The only forced-abort
    /// mechanism: a hung page becomes a task error instead of a stuck cycle.
    pub action_timeout_secs: u64,
    /// Fixed delay after searches and submissions for page redraws.
    pub settle_ms: u64,
    pub status_path: PathBuf,
    pub logs_dir: PathBuf,
    pub artifacts_dir: PathBuf,
    pub keywords_path: PathBuf,
    /// Optional JSON array of exclusion terms. Missing or unreadable files
    /// fall back to the built-in list.
    pub exclusions_path: Option<PathBuf>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        AgentConfig {
            interval_minutes: 30,
            webdriver_url: "http://127.0.0.1:9515".to_string(),
            headless: true,
            action_timeout_secs: 20,
            settle_ms: 1500,
            status_path: PathBuf::from("STATUS.md"),
            logs_dir: PathBuf::from("logs"),
            artifacts_dir: PathBuf::from("artifacts"),
            keywords_path: PathBuf::from("keywords.csv"),
            exclusions_path: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Per-marketplace configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Clone)]
pub struct TargetConfig {
    /// Human-readable marketplace name, used in reports.
    pub name: String,
    /// Filesystem-safe identifier for logs and artifacts.
    pub slug: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub login_url: String,
    /// Search page. The query is typed into the search box, never
    /// interpolated into this URL.
    pub search_url: String,
    pub selectors: SelectorsConfig,
    #[serde(default)]
    pub amount_locale: AmountLocale,
    pub auth: AuthConfig,
    #[serde(default)]
    pub labels: LabelsConfig,
}

impl TargetConfig {
    /// Derive the credential requirement this marketplace imposes.
    /// Form logins need every variable; session-artifact logins accept
    /// any one of the listed variables.
    pub fn credential_requirement(&self) -> CredentialRequirement {
        match &self.auth {
            AuthConfig::Form { user_env, pass_env, .. } => CredentialRequirement::all(
                self.name.clone(),
                vec![user_env.clone(), pass_env.clone()],
            ),
            AuthConfig::SessionCookie { cookie_env_any, .. } => {
                CredentialRequirement::any(self.name.clone(), cookie_env_any.clone())
                    .with_hint("export a fresh session artifact")
            }
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SelectorsConfig {
    pub search_box: String,
    /// First result card in the listing. Only the top result is opened.
    pub result_card: String,
    #[serde(default)]
    pub budget: Option<String>,
    #[serde(default)]
    pub current_offer: Option<String>,
    /// Field receiving the adjusted amount. Absent on marketplaces whose
    /// submission dialog carries no editable offer.
    #[serde(default)]
    pub offer_input: Option<String>,
}

/// How a marketplace authenticates.
#[derive(Debug, Deserialize, Clone)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum AuthConfig {
    /// Username/password form login.
    Form {
        user_env: String,
        pass_env: String,
        user_field: String,
        pass_field: String,
        #[serde(default = "default_login_labels")]
        login_labels: Vec<String>,
        /// Text that proves the authenticated landing page rendered.
        authenticated_marker: String,
    },
    /// Pre-captured session artifact installed as a cookie.
    SessionCookie {
        cookie_name: String,
        /// Any one of these variables supplies the artifact.
        cookie_env_any: Vec<String>,
        #[serde(default)]
        authenticated_marker: Option<String>,
    },
}

/// Action labels tried in priority order on candidate pages.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LabelsConfig {
    pub apply: Vec<String>,
    pub confirm: Vec<String>,
    /// Vocabulary that proves a submission registered.
    pub verify: Vec<String>,
}

impl Default for LabelsConfig {
    fn default() -> Self {
        LabelsConfig {
            apply: to_strings(&["Postular", "Participar", "Enviar", "Enviar oferta", "Postulación"]),
            confirm: to_strings(&["Confirmar", "Sí", "Enviar", "Aceptar"]),
            verify: to_strings(&[
                "Participando",
                "Postulado",
                "Ya estás participando",
                "Oferta enviada",
                "Inscrito",
            ]),
        }
    }
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn default_true() -> bool {
    true
}

fn default_login_labels() -> Vec<String> {
    to_strings(&["Ingresar", "Iniciar sesión", "Entrar"])
}

// ---------------------------------------------------------------------------
// Loading and validation
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Load and validate configuration from a TOML file. Any problem here
    /// is fatal; the agent refuses to start on a half-understood config.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.targets.is_empty() {
            bail!("config lists no targets");
        }

        let mut seen = std::collections::HashSet::new();
        for target in &self.targets {
            if !seen.insert(target.slug.as_str()) {
                bail!("duplicate target slug '{}'", target.slug);
            }
            if target.slug.contains(['/', '\\', ' ']) {
                bail!("target slug '{}' is not filesystem-safe", target.slug);
            }
            target
                .credential_requirement()
                .validate()
                .map_err(|e| anyhow::anyhow!(e))?;
        }

        if self.agent.interval_minutes == 0 {
            bail!("agent.interval_minutes must be at least 1");
        }
        Ok(())
    }
}

/// Load the keyword list from a two-column CSV: `phrase,threshold`.
///
/// The threshold column is optional per row and defaults to 100 (exact
/// match required). A missing or malformed file is fatal: an empty or
/// wrong keyword list silently bidding on everything is worse than not
/// starting.
pub fn load_keywords(path: &Path) -> Result<Vec<KeywordEntry>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read keywords file: {}", path.display()))?;

    let mut entries = Vec::new();
    for (idx, raw) in contents.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        if idx == 0 && is_header(line) {
            continue;
        }

        let (phrase, threshold) = match line.rsplit_once(',') {
            Some((head, tail)) => {
                let threshold: Decimal = tail.trim().parse().map_err(|_| {
                    anyhow::anyhow!(
                        "invalid threshold '{}' on line {} of {}",
                        tail.trim(),
                        idx + 1,
                        path.display()
                    )
                })?;
                (head.trim(), threshold)
            }
            None => (line, Decimal::ONE_HUNDRED),
        };

        if phrase.is_empty() {
            bail!("empty phrase on line {} of {}", idx + 1, path.display());
        }
        entries.push(KeywordEntry::with_threshold(phrase, threshold));
    }

    Ok(entries)
}

fn is_header(line: &str) -> bool {
    let first = line.split(',').next().unwrap_or("").trim().to_lowercase();
    matches!(first.as_str(), "phrase" | "keyword" | "rubro" | "frase")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
