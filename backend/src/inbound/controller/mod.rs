//! Controller layer: the five-stage request pipeline.
//!
//! A [`Controller`] supplies the hooks; a [`RequestPipeline`] walks every
//! request through `received → validated → authenticated → authorized →
//! executed → responded`, logs each transition with the elapsed time and
//! turns any failure into a response envelope. Nothing escapes
//! [`RequestPipeline::handle`], panics included.

mod envelope;
mod status;


use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures_util::FutureExt;
use mockable::Clock;
use serde_json::{Value, json};

pub use self::envelope::{CORRELATION_ID_HEADER, Method, Request, RequestUser, Response};
pub use self::status::status_for;
use self::status::redact_if_internal;
use crate::domain::{CorrelationId, Error};
use crate::logging::Logger;

/// Pipeline position reached by a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RequestStage {
    /// Accepted by the pipeline.
    Received,
    /// Passed validation.
    Validated,
    /// Caller identified.
    Authenticated,
    /// Caller permitted.
    Authorized,
    /// Business logic finished.
    Executed,
    /// Envelope produced.
    Responded,
}

impl RequestStage {
    /// Lowercase label used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Validated => "validated",
            Self::Authenticated => "authenticated",
            Self::Authorized => "authorized",
            Self::Executed => "executed",
            Self::Responded => "responded",
        }
    }

    /// Label of the step that reaches this stage, used when that step fails.
    pub fn step(self) -> &'static str {
        match self {
            Self::Received => "receive",
            Self::Validated => "validate",
            Self::Authenticated => "authenticate",
            Self::Authorized => "authorize",
            Self::Executed => "execute",
            Self::Responded => "respond",
        }
    }
}

/// Request hooks plugged into a [`RequestPipeline`].
#[async_trait]
pub trait Controller: Send + Sync {
    /// Name used as the correlation id prefix and in logs.
    fn name(&self) -> &str;

    /// Reject malformed requests. Failures answer 400.
    async fn validate(&self, _request: &Request) -> Result<(), Error> {
        Ok(())
    }

    /// Identify the caller. Failures answer 401.
    ///
    /// The default requires a user with a non-blank id.
    async fn authenticate(&self, request: &Request) -> Result<(), Error> {
        match &request.user {
            Some(user) if !user.id.trim().is_empty() => Ok(()),
            _ => Err(Error::unauthorized("authentication required")),
        }
    }

    /// Check the caller may perform the request. Failures answer 403.
    async fn authorize(&self, _request: &Request) -> Result<(), Error> {
        Ok(())
    }

    /// Run the business logic.
    async fn execute(&self, request: &Request) -> Result<Value, Error>;

    /// Status of a successful response.
    fn success_status(&self, _request: &Request) -> u16 {
        200
    }

    /// Optional message of a successful response.
    fn success_message(&self, _request: &Request) -> Option<String> {
        None
    }

    /// Status of an execution failure.
    fn execution_status(&self, _error: &Error) -> u16 {
        500
    }
}

/// Runs requests through a [`Controller`].
pub struct RequestPipeline<C> {
    controller: Arc<C>,
    logger: Arc<Logger>,
    clock: Arc<dyn Clock>,
}

struct Failure {
    /// Stage the request did not reach.
    stage: RequestStage,
    status: u16,
    error: Error,
}

impl Failure {
    fn at(stage: RequestStage, status: u16) -> impl FnOnce(Error) -> Self {
        move |error| Self {
            stage,
            status,
            error,
        }
    }
}

impl<C: Controller> RequestPipeline<C> {
    /// Wrap `controller`.
    pub fn new(controller: Arc<C>, logger: Arc<Logger>, clock: Arc<dyn Clock>) -> Self {
        Self {
            controller,
            logger,
            clock,
        }
    }

    /// Wrapped controller.
    pub fn controller(&self) -> &C {
        &self.controller
    }

    /// Handle one request. Always produces an envelope.
    ///
    /// The correlation id is taken from the [`CORRELATION_ID_HEADER`] header
    /// when present and generated otherwise. It is in scope for every layer
    /// below and returned in the envelope.
    pub async fn handle(&self, request: Request) -> Response {
        let correlation_id = match request.header(CORRELATION_ID_HEADER) {
            Some(id) if !id.trim().is_empty() => CorrelationId::from_string(id.trim()),
            _ => CorrelationId::generate(self.controller.name(), self.clock.utc()),
        };
        CorrelationId::scope(correlation_id.clone(), self.respond(request, correlation_id)).await
    }

    async fn respond(&self, request: Request, correlation_id: CorrelationId) -> Response {
        let started = Instant::now();
        let context = json!({
            "controller": self.controller.name(),
            "method": request.method.as_str(),
            "url": request.url,
        });
        self.transition(RequestStage::Received, started, &context);

        let outcome = AssertUnwindSafe(self.run(&request, started, &context))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| {
                Err(Failure {
                    stage: RequestStage::Executed,
                    status: 500,
                    error: Error::internal("controller panicked"),
                })
            });

        let response = match outcome {
            Ok(data) => Response::ok(
                data,
                self.controller.success_message(&request),
                self.controller.success_status(&request),
                self.clock.utc(),
                correlation_id.to_string(),
            ),
            Err(failure) => self.fail(&request, failure, &context, correlation_id),
        };

        self.transition(RequestStage::Responded, started, &context);
        self.logger.performance(
            &format!("{} {}", request.method.as_str(), request.url),
            started.elapsed(),
            json!({ "statusCode": response.status_code, "success": response.success }),
        );
        response
    }

    async fn run(
        &self,
        request: &Request,
        started: Instant,
        context: &Value,
    ) -> Result<Value, Failure> {
        self.controller
            .validate(request)
            .await
            .map_err(Failure::at(RequestStage::Validated, 400))?;
        self.transition(RequestStage::Validated, started, context);

        self.controller
            .authenticate(request)
            .await
            .map_err(Failure::at(RequestStage::Authenticated, 401))?;
        self.transition(RequestStage::Authenticated, started, context);

        self.controller
            .authorize(request)
            .await
            .map_err(Failure::at(RequestStage::Authorized, 403))?;
        self.transition(RequestStage::Authorized, started, context);

        let data = self.controller.execute(request).await.map_err(|error| {
            let status = self.controller.execution_status(&error);
            Failure {
                stage: RequestStage::Executed,
                status,
                error,
            }
        })?;
        self.transition(RequestStage::Executed, started, context);
        Ok(data)
    }

    fn fail(
        &self,
        request: &Request,
        failure: Failure,
        context: &Value,
        correlation_id: CorrelationId,
    ) -> Response {
        let Failure {
            stage,
            status,
            error,
        } = failure;
        let mut details = context.clone();
        if let Value::Object(map) = &mut details {
            map.insert("stage".to_owned(), json!(stage.step()));
            map.insert("statusCode".to_owned(), json!(status));
            map.insert("code".to_owned(), json!(error.code()));
            if let Some(user) = &request.user {
                map.insert("userId".to_owned(), json!(user.id));
            }
        }
        match stage {
            RequestStage::Authenticated => {
                self.logger.security("unauthorized request", details);
            }
            RequestStage::Authorized => {
                self.logger.security("forbidden request", details);
            }
            _ => self.logger.error_with("request failed", &error, details),
        }

        let error = match error.correlation_id() {
            Some(_) => error,
            None => error.with_correlation_id(correlation_id.to_string()),
        };
        Response::failed(
            redact_if_internal(error),
            status,
            self.clock.utc(),
            correlation_id.to_string(),
        )
    }

    fn transition(&self, stage: RequestStage, started: Instant, context: &Value) {
        let mut entry = context.clone();
        if let Value::Object(map) = &mut entry {
            map.insert("stage".to_owned(), json!(stage.as_str()));
            map.insert(
                "elapsedMs".to_owned(),
                json!(crate::logging::millis(started.elapsed())),
            );
        }
        self.logger.debug(&format!("request {}", stage.as_str()), entry);
    }
}

impl<C> std::fmt::Debug for RequestPipeline<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestPipeline")
            .field("logger", &self.logger)
            .finish_non_exhaustive()
    }
}
