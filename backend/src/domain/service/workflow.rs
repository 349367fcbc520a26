//! Workflow descriptions, per-step results and the status registry.
//!
//! A workflow is an ordered list of auditable steps run before a service's
//! core operation. Steps never gate that operation: a failed step is
//! recorded and the run carries on.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};

use crate::domain::Error;

/// One configured step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStep {
    /// Identifier unique within the workflow.
    pub id: String,
    /// Human readable label.
    pub name: String,
    /// Extra attempts after a failure.
    #[serde(default)]
    pub max_retries: u32,
}

impl WorkflowStep {
    /// Step without retries.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            max_retries: 0,
        }
    }

    /// Allow `retries` extra attempts.
    #[must_use]
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }
}

/// Workflow registered by `execute_with_workflow`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowConfig {
    /// Registry key; re-running an id replaces its status.
    pub id: String,
    /// Steps in execution order.
    pub steps: Vec<WorkflowStep>,
}

impl WorkflowConfig {
    /// Build a configuration.
    pub fn new(id: impl Into<String>, steps: Vec<WorkflowStep>) -> Self {
        Self {
            id: id.into(),
            steps,
        }
    }

    /// Reject blank ids and duplicate step ids.
    pub fn validate(&self) -> Result<(), Error> {
        if self.id.trim().is_empty() {
            return Err(Error::validation("workflow id must not be blank"));
        }
        let mut seen = HashSet::new();
        for step in &self.steps {
            if step.id.trim().is_empty() {
                return Err(Error::validation(format!(
                    "workflow {} has a step with a blank id",
                    self.id
                )));
            }
            if !seen.insert(step.id.as_str()) {
                return Err(Error::validation(format!(
                    "workflow {} repeats step id {}",
                    self.id, step.id
                )));
            }
        }
        Ok(())
    }
}

/// Outcome of one step, recorded exactly once per configured step.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStepResult {
    /// Step identifier.
    pub step_id: String,
    /// Whether the last attempt succeeded.
    pub success: bool,
    /// Time spent across all attempts.
    #[serde(rename = "durationMs", serialize_with = "serialize_millis")]
    pub duration: Duration,
    /// Error of the last failed attempt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<Error>,
    /// Attempts made after the first.
    pub retry_count: u32,
}

/// Lifecycle of a registered workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowState {
    /// Steps or the core operation are still running.
    Running,
    /// The core operation succeeded.
    Completed,
    /// The core operation failed.
    Failed,
}

/// Snapshot returned by `get_workflow_status`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStatus {
    /// Workflow identifier.
    pub workflow_id: String,
    /// Current state.
    pub state: WorkflowState,
    /// Registration instant.
    pub started_at: DateTime<Utc>,
    /// Completion instant, once finished.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Step results recorded so far, in step order.
    pub steps: Vec<WorkflowStepResult>,
}

/// Result of `execute_with_workflow`.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowOutcome<O> {
    /// Workflow identifier.
    pub workflow_id: String,
    /// Result of the core operation.
    pub result: Result<O, Error>,
    /// One result per configured step, in step order.
    pub steps: Vec<WorkflowStepResult>,
    /// Wall time of the whole run.
    pub duration: Duration,
}

impl<O> WorkflowOutcome<O> {
    /// Whether the core operation succeeded. Step results do not count.
    pub fn success(&self) -> bool {
        self.result.is_ok()
    }

    /// Steps that failed after exhausting their retries.
    pub fn failed_steps(&self) -> impl Iterator<Item = &WorkflowStepResult> {
        self.steps.iter().filter(|step| !step.success)
    }
}

/// Statuses kept before finished workflows start being evicted.
pub const MAX_TRACKED_WORKFLOWS: usize = 1_000;

/// In-memory registry of workflow statuses keyed by workflow id.
///
/// Once `capacity` ids are tracked, registering a new id evicts the
/// finished workflows that completed first. Running workflows are never
/// evicted, so the registry only outgrows its capacity while that many runs
/// are in flight.
#[derive(Debug)]
pub(crate) struct WorkflowRegistry {
    statuses: Mutex<HashMap<String, WorkflowStatus>>,
    capacity: usize,
}

impl Default for WorkflowRegistry {
    fn default() -> Self {
        Self::with_capacity(MAX_TRACKED_WORKFLOWS)
    }
}

impl WorkflowRegistry {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            statuses: Mutex::new(HashMap::new()),
            capacity,
        }
    }

    pub(crate) fn register(&self, workflow_id: &str, started_at: DateTime<Utc>) {
        self.with(|statuses| {
            if !statuses.contains_key(workflow_id) {
                evict_finished(statuses, self.capacity);
            }
            statuses.insert(
                workflow_id.to_owned(),
                WorkflowStatus {
                    workflow_id: workflow_id.to_owned(),
                    state: WorkflowState::Running,
                    started_at,
                    finished_at: None,
                    steps: Vec::new(),
                },
            );
        });
    }

    pub(crate) fn record_step(&self, workflow_id: &str, result: WorkflowStepResult) {
        self.with(|statuses| {
            if let Some(status) = statuses.get_mut(workflow_id) {
                status.steps.push(result);
            }
        });
    }

    pub(crate) fn finish(&self, workflow_id: &str, state: WorkflowState, at: DateTime<Utc>) {
        self.with(|statuses| {
            if let Some(status) = statuses.get_mut(workflow_id) {
                status.state = state;
                status.finished_at = Some(at);
            }
        });
    }

    pub(crate) fn get(&self, workflow_id: &str) -> Option<WorkflowStatus> {
        self.with(|statuses| statuses.get(workflow_id).cloned())
    }

    fn with<T>(&self, f: impl FnOnce(&mut HashMap<String, WorkflowStatus>) -> T) -> T {
        let mut statuses = self.statuses.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut statuses)
    }
}

fn evict_finished(statuses: &mut HashMap<String, WorkflowStatus>, capacity: usize) {
    while statuses.len() >= capacity {
        let oldest = statuses
            .values()
            .filter_map(|status| status.finished_at.map(|at| (at, status.workflow_id.clone())))
            .min();
        let Some((_, workflow_id)) = oldest else {
            return;
        };
        statuses.remove(&workflow_id);
    }
}

fn serialize_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(crate::logging::millis(*duration))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ErrorCode;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case(WorkflowConfig::new(" ", vec![]))]
    #[case(WorkflowConfig::new("wf", vec![WorkflowStep::new("", "blank")]))]
    #[case(WorkflowConfig::new("wf", vec![
        WorkflowStep::new("a", "first"),
        WorkflowStep::new("a", "again"),
    ]))]
    fn invalid_configs_are_rejected(#[case] config: WorkflowConfig) {
        let err = config.validate().expect_err("invalid config");
        assert_eq!(err.code(), ErrorCode::InvalidRequest);
    }

    #[rstest]
    fn steps_default_to_no_retries() {
        let step: WorkflowStep =
            serde_json::from_value(json!({ "id": "a", "name": "audit" })).expect("decode");
        assert_eq!(step.max_retries, 0);
    }

    #[rstest]
    fn step_results_serialise_duration_in_millis() {
        let result = WorkflowStepResult {
            step_id: "a".into(),
            success: true,
            duration: Duration::from_millis(1500),
            error: None,
            retry_count: 0,
        };
        let value = serde_json::to_value(&result).expect("serialise");
        assert_eq!(value["durationMs"], 1500);
        assert_eq!(value["stepId"], "a");
        assert!(value.get("error").is_none());
    }

    #[rstest]
    fn registry_tracks_steps_and_state() {
        let registry = WorkflowRegistry::default();
        let now = Utc::now();
        registry.register("wf", now);
        registry.record_step(
            "wf",
            WorkflowStepResult {
                step_id: "a".into(),
                success: false,
                duration: Duration::ZERO,
                error: Some(Error::internal("boom")),
                retry_count: 1,
            },
        );
        registry.finish("wf", WorkflowState::Completed, now);

        let status = registry.get("wf").expect("registered");
        assert_eq!(status.state, WorkflowState::Completed);
        assert_eq!(status.steps.len(), 1);
        assert!(registry.get("other").is_none());
    }

    #[rstest]
    fn full_registry_evicts_the_earliest_finished_workflow() {
        let registry = WorkflowRegistry::with_capacity(2);
        let start = Utc::now();
        registry.register("old", start);
        registry.register("running", start);
        registry.finish("old", WorkflowState::Completed, start);

        registry.register("new", start);
        assert!(registry.get("old").is_none());
        assert!(registry.get("running").is_some());
        assert!(registry.get("new").is_some());

        registry.register("newer", start);
        assert!(registry.get("running").is_some());
        assert!(registry.get("new").is_some());
        assert!(registry.get("newer").is_some());
    }

    #[rstest]
    fn re_registering_a_tracked_id_keeps_other_statuses() {
        let registry = WorkflowRegistry::with_capacity(2);
        let now = Utc::now();
        registry.register("a", now);
        registry.register("b", now);
        registry.finish("a", WorkflowState::Failed, now);
        registry.finish("b", WorkflowState::Completed, now);

        registry.register("b", now);
        assert!(registry.get("a").is_some());
        assert_eq!(
            registry.get("b").map(|status| status.state),
            Some(WorkflowState::Running)
        );
    }
}
