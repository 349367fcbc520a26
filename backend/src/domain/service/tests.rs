//! Stage ordering and workflow contract coverage.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use rstest::{fixture, rstest};

use super::*;
use crate::domain::ErrorCode;
use crate::logging::{LoggerConfig, LoggerRegistry};
use crate::test_support::MutableClock;

/// Doubles its input and records which stages ran.
#[derive(Default)]
struct Doubler {
    stages: Mutex<Vec<String>>,
    failing_stage: Option<&'static str>,
    failing_steps: Vec<&'static str>,
    step_attempts: Mutex<Vec<String>>,
}

impl Doubler {
    fn failing_at(stage: &'static str) -> Self {
        Self {
            failing_stage: Some(stage),
            ..Self::default()
        }
    }

    fn with_failing_steps(steps: Vec<&'static str>) -> Self {
        Self {
            failing_steps: steps,
            ..Self::default()
        }
    }

    fn enter(&self, stage: &'static str) -> Result<(), Error> {
        self.stages
            .lock()
            .expect("stages lock")
            .push(stage.to_owned());
        if self.failing_stage == Some(stage) {
            return Err(Error::validation(format!("{stage} rejected the input")));
        }
        Ok(())
    }

    fn stages(&self) -> Vec<String> {
        self.stages.lock().expect("stages lock").clone()
    }

    fn attempts(&self) -> Vec<String> {
        self.step_attempts.lock().expect("attempts lock").clone()
    }
}

#[async_trait]
impl Service for Doubler {
    type Input = i64;
    type Output = i64;

    fn name(&self) -> &str {
        "doubler"
    }

    async fn validate(&self, _input: &i64) -> Result<(), Error> {
        self.enter("validate")
    }

    async fn pre_process(&self, input: i64) -> Result<i64, Error> {
        self.enter("pre_process")?;
        Ok(input + 1)
    }

    async fn process(&self, input: i64) -> Result<i64, Error> {
        self.enter("process")?;
        Ok(input * 2)
    }

    async fn post_process(&self, output: i64) -> Result<i64, Error> {
        self.enter("post_process")?;
        Ok(output)
    }

    async fn run_step(&self, step: &WorkflowStep, _input: &i64) -> Result<(), Error> {
        self.step_attempts
            .lock()
            .expect("attempts lock")
            .push(step.id.clone());
        if self.failing_steps.contains(&step.id.as_str()) {
            return Err(Error::internal(format!("step {} exploded", step.id)));
        }
        Ok(())
    }
}

#[fixture]
fn clock() -> Arc<MutableClock> {
    Arc::new(MutableClock::new(Utc::now()))
}

fn runner(service: Doubler, clock: Arc<MutableClock>) -> ServiceRunner<Doubler> {
    let registry = LoggerRegistry::with_clock(LoggerConfig::default(), clock.clone());
    ServiceRunner::new(Arc::new(service), registry.get("doubler"), clock)
}

fn steps(ids: &[&str]) -> Vec<WorkflowStep> {
    ids.iter()
        .map(|id| WorkflowStep::new(*id, format!("step {id}")))
        .collect()
}

#[rstest]
#[tokio::test]
async fn stages_run_in_order(clock: Arc<MutableClock>) {
    let runner = runner(Doubler::default(), clock);
    assert_eq!(runner.execute(4).await.expect("execute"), 10);
    assert_eq!(
        runner.service().stages(),
        vec!["validate", "pre_process", "process", "post_process"]
    );
}

#[rstest]
#[case("validate", 1)]
#[case("pre_process", 2)]
#[case("process", 3)]
#[case("post_process", 4)]
#[tokio::test]
async fn a_failing_stage_aborts_the_call(
    clock: Arc<MutableClock>,
    #[case] stage: &'static str,
    #[case] ran: usize,
) {
    let runner = runner(Doubler::failing_at(stage), clock);
    let err = runner.execute(1).await.expect_err("stage fails");
    assert_eq!(err.code(), ErrorCode::InvalidRequest);
    assert_eq!(runner.service().stages().len(), ran);
}

/// Workflow steps are an audit channel, not a gate: a failing step is
/// recorded, later steps still run, and the core operation still executes
/// and alone decides overall success.
#[rstest]
#[tokio::test]
async fn failing_steps_do_not_gate_execution(clock: Arc<MutableClock>) {
    let runner = runner(Doubler::with_failing_steps(vec!["b"]), clock);
    let outcome = runner
        .execute_with_workflow(5, WorkflowConfig::new("wf-1", steps(&["a", "b", "c"])))
        .await
        .expect("valid config");

    let recorded: Vec<(&str, bool)> = outcome
        .steps
        .iter()
        .map(|step| (step.step_id.as_str(), step.success))
        .collect();
    assert_eq!(recorded, vec![("a", true), ("b", false), ("c", true)]);
    assert_eq!(
        outcome.steps[1].error.as_ref().map(Error::code),
        Some(ErrorCode::InternalError)
    );
    assert!(outcome.success());
    assert_eq!(outcome.result, Ok(12));
    assert_eq!(outcome.failed_steps().count(), 1);
    assert_eq!(runner.service().stages().len(), 4);
}

#[rstest]
#[tokio::test]
async fn core_failure_fails_the_workflow_even_when_steps_pass(clock: Arc<MutableClock>) {
    let runner = runner(Doubler::failing_at("process"), clock);
    let outcome = runner
        .execute_with_workflow(5, WorkflowConfig::new("wf-2", steps(&["a"])))
        .await
        .expect("valid config");
    assert!(outcome.steps.iter().all(|step| step.success));
    assert!(!outcome.success());

    let status = runner.get_workflow_status("wf-2").expect("registered");
    assert_eq!(status.state, WorkflowState::Failed);
    assert!(status.finished_at.is_some());
}

#[rstest]
#[tokio::test]
async fn steps_retry_up_to_their_limit(clock: Arc<MutableClock>) {
    let runner = runner(Doubler::with_failing_steps(vec!["flaky"]), clock);
    let config = WorkflowConfig::new("wf-3", vec![WorkflowStep::new("flaky", "flaky").with_retries(2)]);
    let outcome = runner
        .execute_with_workflow(1, config)
        .await
        .expect("valid config");
    assert_eq!(outcome.steps[0].retry_count, 2);
    assert!(!outcome.steps[0].success);
    assert_eq!(runner.service().attempts(), vec!["flaky", "flaky", "flaky"]);
}

#[rstest]
#[tokio::test]
async fn workflow_status_is_tracked_per_id(clock: Arc<MutableClock>) {
    let runner = runner(Doubler::default(), clock);
    let err = runner.get_workflow_status("never").expect_err("unknown id");
    assert_eq!(err.code(), ErrorCode::NotFound);

    runner
        .execute_with_workflow(1, WorkflowConfig::new("wf-4", steps(&["a", "b"])))
        .await
        .expect("valid config");
    let status = runner.get_workflow_status("wf-4").expect("registered");
    assert_eq!(status.state, WorkflowState::Completed);
    assert_eq!(status.steps.len(), 2);
}

#[rstest]
#[tokio::test]
async fn invalid_workflow_configs_run_nothing(clock: Arc<MutableClock>) {
    let runner = runner(Doubler::default(), clock);
    let err = runner
        .execute_with_workflow(1, WorkflowConfig::new("wf-5", steps(&["a", "a"])))
        .await
        .expect_err("duplicate step ids");
    assert_eq!(err.code(), ErrorCode::InvalidRequest);
    assert!(runner.service().stages().is_empty());
    assert!(runner.get_workflow_status("wf-5").is_err());
}
