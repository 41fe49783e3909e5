//! Credential gating.
//!
//! Before a task runs, its environment-sourced secrets are checked for
//! presence. The gate reads a live snapshot on every evaluation so
//! credential rotation between cycles is picked up without restart. Values
//! are never stored or logged, only variable names.

use std::collections::HashMap;
use std::fmt;

use serde::Deserialize;
use tracing::debug;

// ---------------------------------------------------------------------------
// Requirements
// ---------------------------------------------------------------------------

/// How a requirement's variable list is satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequirementMode {
    /// Every listed variable must be set and non-empty.
    All,
    /// At least one listed variable must be set and non-empty.
    Any,
}

/// One credential requirement attached to a task.
#[derive(Debug, Clone, Deserialize)]
pub struct CredentialRequirement {
    pub name: String,
    pub env_vars: Vec<String>,
    #[serde(default = "RequirementMode::default_all")]
    pub mode: RequirementMode,
    /// Optional requirements never block the gate.
    #[serde(default)]
    pub optional: bool,
    /// Operator hint appended to the missing summary.
    #[serde(default)]
    pub hint: Option<String>,
}

impl RequirementMode {
    fn default_all() -> Self {
        RequirementMode::All
    }
}

impl CredentialRequirement {
    pub fn all<S: Into<String>>(name: impl Into<String>, env_vars: Vec<S>) -> Self {
        CredentialRequirement {
            name: name.into(),
            env_vars: env_vars.into_iter().map(Into::into).collect(),
            mode: RequirementMode::All,
            optional: false,
            hint: None,
        }
    }

    pub fn any<S: Into<String>>(name: impl Into<String>, env_vars: Vec<S>) -> Self {
        CredentialRequirement {
            mode: RequirementMode::Any,
            ..CredentialRequirement::all(name, env_vars)
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// A requirement with no variables can never be meaningfully checked.
    pub fn validate(&self) -> Result<(), String> {
        if self.env_vars.is_empty() {
            return Err(format!("credential requirement '{}' lists no variables", self.name));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

/// Presence check result for one requirement.
#[derive(Debug, Clone)]
pub struct RequirementStatus {
    pub requirement: CredentialRequirement,
    pub present: Vec<String>,
    pub missing: Vec<String>,
    pub satisfied: bool,
}

impl RequirementStatus {
    /// Human description of what is missing, in the shape the status file
    /// and preflight output use.
    pub fn describe_missing(&self) -> String {
        let req = &self.requirement;
        let mut text = match req.mode {
            RequirementMode::Any => format!("{}: set one of {}", req.name, req.env_vars.join(", ")),
            RequirementMode::All => format!("{}: missing {}", req.name, self.missing.join(", ")),
        };
        if let Some(hint) = &req.hint {
            text.push_str(&format!(" ({hint})"));
        }
        text
    }
}

/// Evaluation of all requirements for one task.
#[derive(Debug, Clone)]
pub struct GateReport {
    pub statuses: Vec<RequirementStatus>,
}

impl GateReport {
    /// Whether every mandatory requirement is satisfied.
    pub fn ok(&self) -> bool {
        self.statuses.iter().all(|s| s.satisfied)
    }

    /// Names of all variables found missing, across requirements.
    pub fn missing_variables(&self) -> Vec<&str> {
        self.statuses
            .iter()
            .flat_map(|s| s.missing.iter().map(String::as_str))
            .collect()
    }

    /// Joined description of every unsatisfied requirement; empty when the
    /// gate passes.
    pub fn summary(&self) -> String {
        self.statuses
            .iter()
            .filter(|s| !s.satisfied)
            .map(RequirementStatus::describe_missing)
            .collect::<Vec<_>>()
            .join("; ")
    }
}

impl fmt::Display for GateReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, status) in self.statuses.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            if status.satisfied && status.missing.is_empty() {
                write!(f, "  ok      {}", status.requirement.name)?;
            } else if status.satisfied {
                write!(f, "  ok      {} (optional, incomplete)", status.requirement.name)?;
            } else {
                write!(f, "  MISSING {}", status.describe_missing())?;
            }
        }
        Ok(())
    }
}

/// Presence checker over the process environment, with an injectable
/// snapshot for tests.
pub struct CredentialGate {
    overrides: Option<HashMap<String, String>>,
}

impl Default for CredentialGate {
    fn default() -> Self {
        CredentialGate::new()
    }
}

impl CredentialGate {
    /// Gate over the live process environment.
    pub fn new() -> Self {
        CredentialGate { overrides: None }
    }

    /// Gate over a fixed snapshot instead of the live environment.
    pub fn with_env(env: HashMap<String, String>) -> Self {
        CredentialGate { overrides: Some(env) }
    }

    fn lookup(&self, var: &str) -> Option<String> {
        let value = match &self.overrides {
            Some(map) => map.get(var).cloned(),
            None => std::env::var(var).ok(),
        };
        value.filter(|v| !v.is_empty())
    }

    /// Evaluate all requirements against the current snapshot.
    pub fn evaluate(&self, requirements: &[CredentialRequirement]) -> GateReport {
        let statuses = requirements
            .iter()
            .map(|req| {
                let mut present = Vec::new();
                let mut missing = Vec::new();
                for var in &req.env_vars {
                    if self.lookup(var).is_some() {
                        present.push(var.clone());
                    } else {
                        missing.push(var.clone());
                    }
                }
                let satisfied = req.optional
                    || match req.mode {
                        RequirementMode::All => missing.is_empty(),
                        RequirementMode::Any => !present.is_empty(),
                    };
                debug!(
                    requirement = %req.name,
                    mode = ?req.mode,
                    present = present.len(),
                    missing = missing.len(),
                    satisfied,
                    "Credential requirement evaluated"
                );
                RequirementStatus {
                    requirement: req.clone(),
                    present,
                    missing,
                    satisfied,
                }
            })
            .collect();
        GateReport { statuses }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
