//! Cycle orchestrator.
//!
//! Runs every configured marketplace task sequentially inside one cycle:
//! credential gate first, then the retried task attempt, then the result
//! sink. Tasks are isolated from each other; a failed or skipped task
//! costs its own outcome and nothing else. The cycle completes regardless
//! of individual task outcomes, and the summary says exactly what
//! happened.

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::{AppConfig, TargetConfig};
use crate::driver::DriverFactory;
use crate::policy::BidPolicy;
use crate::report::{count_statuses, log_ref, ResultSink};
use crate::screening::Screening;
use crate::types::{AttemptResult, CycleSummary, KeywordEntry, TaskOutcome, TaskState};

use super::gate::CredentialGate;
use super::retry::with_retry;
use super::session::{Credentials, SubmissionEngine};
use super::TaskError;

pub struct Orchestrator {
    config: AppConfig,
    keywords: Vec<KeywordEntry>,
    screening: Screening,
    policy: BidPolicy,
    factory: Arc<dyn DriverFactory>,
    gate: CredentialGate,
    sink: ResultSink,
    cycle_count: u64,
}

impl Orchestrator {
    pub fn new(
        config: AppConfig,
        keywords: Vec<KeywordEntry>,
        screening: Screening,
        factory: Arc<dyn DriverFactory>,
    ) -> Self {
        let policy = BidPolicy::new(config.policy.clone());
        let sink = ResultSink::new(&config.agent);
        Orchestrator {
            config,
            keywords,
            screening,
            policy,
            factory,
            gate: CredentialGate::new(),
            sink,
            cycle_count: 0,
        }
    }

    /// Replace the live-environment gate, for tests running against a
    /// fixed credential snapshot.
    pub fn with_gate(mut self, gate: CredentialGate) -> Self {
        self.gate = gate;
        self
    }

    /// Credential requirements across all enabled targets, in config
    /// order. This is what preflight reports on.
    pub fn requirements(config: &AppConfig) -> Vec<crate::engine::gate::CredentialRequirement> {
        config
            .targets
            .iter()
            .filter(|t| t.enabled)
            .map(TargetConfig::credential_requirement)
            .collect()
    }

    /// Run one full cycle over every configured target.
    ///
    /// Returns `Ok` whenever the cycle itself completed; individual task
    /// failures live inside the summary, not in the error channel.
    pub async fn run_cycle(&mut self) -> Result<CycleSummary> {
        self.cycle_count += 1;
        let run_id = Uuid::new_v4();
        let started = Utc::now();
        info!(
            cycle = self.cycle_count,
            run = %run_id,
            targets = self.config.targets.len(),
            keywords = self.keywords.len(),
            "cycle start"
        );

        let mut outcomes = Vec::with_capacity(self.config.targets.len());
        for target in &self.config.targets {
            outcomes.push(self.run_target(target, run_id).await?);
        }

        let summary = CycleSummary {
            run_id,
            cycle_number: self.cycle_count,
            started,
            finished: Utc::now(),
            outcomes,
        };
        let (ok, skip, errors) = summary.counts();
        self.sink.append_status_section(
            "Cycle summary",
            &[
                ("run", run_id.to_string()),
                ("cycle", summary.cycle_number.to_string()),
                ("tasks", summary.outcomes.len().to_string()),
                ("ok", ok.to_string()),
                ("skipped", skip.to_string()),
                ("errors", errors.to_string()),
                ("duration_secs", summary.duration().num_seconds().to_string()),
            ],
        )?;
        info!(%summary, "cycle complete");
        Ok(summary)
    }

    async fn run_target(&self, target: &TargetConfig, run_id: Uuid) -> Result<TaskOutcome> {
        if !target.enabled {
            debug!(target_name = %target.name, "target disabled, skipping");
            return Ok(TaskOutcome::new(&target.name, TaskState::Skip).with_reason("disabled"));
        }

        let report = self.gate.evaluate(&[target.credential_requirement()]);
        if !report.ok() {
            let reason = report.summary();
            warn!(target_name = %target.name, reason = %reason, "credentials missing, task skipped");
            self.sink.append_status_section(
                &target.name,
                &[("state", "skipped".to_string()), ("reason", reason.clone())],
            )?;
            return Ok(TaskOutcome::new(&target.name, TaskState::Skip).with_reason(reason));
        }

        let attempt = with_retry(&self.config.retry, &target.name, || {
            self.attempt_task(target)
        })
        .await;

        match attempt {
            Ok(results) => {
                let log_path = self
                    .sink
                    .write_task_log(&target.name, &target.slug, run_id, "ok", None, &results)?;
                self.sink
                    .write_run_log(&target.name, &target.slug, run_id, &results)?;

                let mut items = vec![
                    ("state", "ok".to_string()),
                    ("keywords", results.len().to_string()),
                ];
                for (status, n) in count_statuses(&results) {
                    items.push((status, n.to_string()));
                }
                items.push(("log", log_ref(&log_path)));
                self.sink.append_status_section(&target.name, &items)?;

                Ok(TaskOutcome::new(&target.name, TaskState::Ok)
                    .with_log_ref(log_ref(&log_path)))
            }
            Err(e) => {
                let reason = e.to_string();
                error!(target_name = %target.name, error = %reason, "task failed");
                let log_path = self.sink.write_task_log(
                    &target.name,
                    &target.slug,
                    run_id,
                    "error",
                    Some(&reason),
                    &[],
                )?;
                self.sink.append_status_section(
                    &target.name,
                    &[
                        ("state", "error".to_string()),
                        ("reason", reason.clone()),
                        ("log", log_ref(&log_path)),
                    ],
                )?;
                Ok(TaskOutcome::new(&target.name, TaskState::Error)
                    .with_reason(reason)
                    .with_log_ref(log_ref(&log_path)))
            }
        }
    }

    /// One attempt at a whole marketplace task: open a session, log in,
    /// walk every keyword, release the session. The session is released
    /// on every exit path; an abandoned browser leaks a whole process.
    async fn attempt_task(&self, target: &TargetConfig) -> Result<Vec<AttemptResult>, TaskError> {
        let credentials = Credentials::resolve(&target.auth)?;
        let driver = self.factory.open_session().await?;
        let mut engine = SubmissionEngine::new(
            driver,
            target,
            &self.screening,
            &self.policy,
            &self.config.agent,
        );

        if let Err(e) = engine.login(&credentials).await {
            engine.close().await;
            return Err(e);
        }

        let mut results = Vec::with_capacity(self.keywords.len());
        for entry in &self.keywords {
            results.push(engine.run_keyword(entry).await);
        }

        engine.close().await;
        Ok(results)
    }
}
