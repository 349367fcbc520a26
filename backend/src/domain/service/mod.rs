//! Service layer: staged business-rule execution and workflow orchestration.
//!
//! A [`Service`] supplies the stages; a [`ServiceRunner`] drives them in the
//! fixed order `validate → pre_process → process → post_process`, logs each
//! one and stops at the first failure. The runner also owns the workflow
//! registry behind [`ServiceRunner::execute_with_workflow`].

mod cache;
mod workflow;

#[cfg(test)]
mod tests;

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use mockable::Clock;
use serde_json::json;

pub use self::cache::ServiceCache;
use self::workflow::WorkflowRegistry;
pub use self::workflow::{
    MAX_TRACKED_WORKFLOWS, WorkflowConfig, WorkflowOutcome, WorkflowState, WorkflowStatus, WorkflowStep,
    WorkflowStepResult,
};
use crate::domain::Error;
use crate::logging::Logger;

/// Business logic plugged into a [`ServiceRunner`].
///
/// Only [`Service::process`] is required; the other stages default to
/// pass-through.
#[async_trait]
pub trait Service: Send + Sync {
    /// Input accepted by [`ServiceRunner::execute`].
    type Input: Send + Sync;
    /// Output produced on success.
    type Output: Send;

    /// Name used for logging.
    fn name(&self) -> &str;

    /// Reject inputs that break business rules.
    async fn validate(&self, _input: &Self::Input) -> Result<(), Error> {
        Ok(())
    }

    /// Normalise or enrich the input.
    async fn pre_process(&self, input: Self::Input) -> Result<Self::Input, Error> {
        Ok(input)
    }

    /// Core business logic.
    async fn process(&self, input: Self::Input) -> Result<Self::Output, Error>;

    /// Shape or audit the output.
    async fn post_process(&self, output: Self::Output) -> Result<Self::Output, Error> {
        Ok(output)
    }

    /// Run one workflow step against the input.
    async fn run_step(&self, _step: &WorkflowStep, _input: &Self::Input) -> Result<(), Error> {
        Ok(())
    }
}

/// Drives a [`Service`] through its stages and records workflows.
pub struct ServiceRunner<S> {
    service: Arc<S>,
    logger: Arc<Logger>,
    clock: Arc<dyn Clock>,
    workflows: WorkflowRegistry,
}

impl<S: Service> ServiceRunner<S> {
    /// Wrap `service`.
    pub fn new(service: Arc<S>, logger: Arc<Logger>, clock: Arc<dyn Clock>) -> Self {
        Self {
            service,
            logger,
            clock,
            workflows: WorkflowRegistry::default(),
        }
    }

    /// Wrapped service.
    pub fn service(&self) -> &S {
        &self.service
    }

    /// Run every stage in order; the first failing stage aborts the call.
    pub async fn execute(&self, input: S::Input) -> Result<S::Output, Error> {
        let started = Instant::now();
        let context = json!({ "service": self.service.name() });
        self.logger.debug("service execution started", context.clone());

        let result = self.run_stages(input).await;
        match &result {
            Ok(_) => self.logger.performance(
                &format!("{}.execute", self.service.name()),
                started.elapsed(),
                context,
            ),
            Err((stage, err)) => self.logger.error_with(
                "service execution failed",
                err,
                json!({ "service": self.service.name(), "stage": stage, "code": err.code() }),
            ),
        }
        result.map_err(|(_, err)| err)
    }

    async fn run_stages(&self, input: S::Input) -> Result<S::Output, (&'static str, Error)> {
        self.service
            .validate(&input)
            .await
            .map_err(|err| ("validate", err))?;
        let input = self
            .service
            .pre_process(input)
            .await
            .map_err(|err| ("pre_process", err))?;
        let output = self
            .service
            .process(input)
            .await
            .map_err(|err| ("process", err))?;
        self.service
            .post_process(output)
            .await
            .map_err(|err| ("post_process", err))
    }

    /// Run the configured steps, then [`ServiceRunner::execute`].
    ///
    /// Each step runs in isolation and is recorded whether it succeeds or
    /// fails. A failed step stops neither the remaining steps nor the core
    /// operation, and the outcome's success reflects the core operation
    /// alone.
    ///
    /// # Errors
    /// Only an invalid [`WorkflowConfig`] is an error; everything else is
    /// reported inside the [`WorkflowOutcome`].
    pub async fn execute_with_workflow(
        &self,
        input: S::Input,
        config: WorkflowConfig,
    ) -> Result<WorkflowOutcome<S::Output>, Error> {
        config.validate()?;
        let started = Instant::now();
        let workflow_id = config.id.as_str();
        self.workflows.register(workflow_id, self.clock.utc());
        self.logger
            .workflow(workflow_id, self.service.name(), "started");

        let mut steps = Vec::with_capacity(config.steps.len());
        for step in &config.steps {
            let result = self.run_step(step, &input).await;
            self.logger.workflow(
                workflow_id,
                &step.name,
                if result.success { "completed" } else { "failed" },
            );
            self.workflows.record_step(workflow_id, result.clone());
            steps.push(result);
        }

        let result = self.execute(input).await;
        let state = if result.is_ok() {
            WorkflowState::Completed
        } else {
            WorkflowState::Failed
        };
        self.workflows.finish(workflow_id, state, self.clock.utc());
        self.logger.workflow(
            workflow_id,
            self.service.name(),
            if result.is_ok() { "completed" } else { "failed" },
        );

        Ok(WorkflowOutcome {
            workflow_id: config.id,
            result,
            steps,
            duration: started.elapsed(),
        })
    }

    async fn run_step(&self, step: &WorkflowStep, input: &S::Input) -> WorkflowStepResult {
        let started = Instant::now();
        let mut retry_count = 0;
        loop {
            match self.service.run_step(step, input).await {
                Ok(()) => {
                    return WorkflowStepResult {
                        step_id: step.id.clone(),
                        success: true,
                        duration: started.elapsed(),
                        error: None,
                        retry_count,
                    };
                }
                Err(err) if retry_count < step.max_retries => {
                    retry_count += 1;
                    self.logger.warn(
                        "workflow step failed, retrying",
                        json!({ "step": step.id, "attempt": retry_count, "error": err.message() }),
                    );
                }
                Err(err) => {
                    self.logger.error_with(
                        "workflow step failed",
                        &err,
                        json!({ "step": step.id, "retryCount": retry_count }),
                    );
                    return WorkflowStepResult {
                        step_id: step.id.clone(),
                        success: false,
                        duration: started.elapsed(),
                        error: Some(err),
                        retry_count,
                    };
                }
            }
        }
    }

    /// Status of a workflow registered through
    /// [`ServiceRunner::execute_with_workflow`].
    ///
    /// # Errors
    /// [`crate::domain::ErrorCode::NotFound`] when the id was never
    /// registered.
    pub fn get_workflow_status(&self, workflow_id: &str) -> Result<WorkflowStatus, Error> {
        self.workflows.get(workflow_id).ok_or_else(|| {
            Error::not_found(format!("workflow {workflow_id} not found"))
                .with_details(json!({ "workflowId": workflow_id }))
        })
    }
}

impl<S> std::fmt::Debug for ServiceRunner<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRunner")
            .field("logger", &self.logger)
            .finish_non_exhaustive()
    }
}
