//! Controller mapping request envelopes onto artifact commands.
//!
//! Routes:
//! - `GET` with an `id` param fetches one artifact;
//! - `GET` with a `q` query searches names, otherwise lists a page
//!   (`page`, `limit`, plus `status`/`kind`/`owner` filters);
//! - `POST` creates a draft and answers 201;
//! - `PATCH`/`PUT` with a body holding only `status` changes status,
//!   any other body patches descriptive fields;
//! - `DELETE` removes an artifact.
//!
//! Reads need any authenticated caller, writes need the `editor` or `admin`
//! role and deletes need `admin`.

use std::sync::Arc;

use async_trait::async_trait;
use pagination::PageRequest;
use serde_json::Value;

use super::controller::{Controller, Method, Request, status_for};
use crate::domain::artifacts::{ArtifactCommand, ArtifactService, ArtifactStatus, NewArtifact};
use crate::domain::ports::Persistence;
use crate::domain::service::ServiceRunner;
use crate::domain::{Error, Filters};

const WRITE_ROLES: &[&str] = &["editor", "admin"];
const DELETE_ROLES: &[&str] = &["admin"];
const FILTER_FIELDS: &[&str] = &["status", "kind", "owner"];
const PAGING_FIELDS: &[&str] = &["page", "limit", "q"];

/// Artifact endpoint.
pub struct ArtifactController<P> {
    runner: Arc<ServiceRunner<ArtifactService<P>>>,
}

impl<P> ArtifactController<P> {
    /// Wrap the artifact service runner.
    pub fn new(runner: Arc<ServiceRunner<ArtifactService<P>>>) -> Self {
        Self { runner }
    }
}

/// Translate a request into the command it addresses.
pub fn command_for(request: &Request) -> Result<ArtifactCommand, Error> {
    let id = request.param("id").map(str::to_owned);
    match (request.method, id) {
        (Method::Get, Some(id)) => Ok(ArtifactCommand::Get { id }),
        (Method::Get, None) => read_command(request),
        (Method::Post, None) => {
            let draft: NewArtifact = serde_json::from_value(request.body.clone())
                .map_err(|err| Error::validation(format!("invalid artifact: {err}")))?;
            Ok(ArtifactCommand::Create(draft))
        }
        (Method::Post, Some(_)) => Err(Error::validation("artifacts are created without an id")),
        (Method::Patch | Method::Put, Some(id)) => write_command(id, &request.body),
        (Method::Delete, Some(id)) => Ok(ArtifactCommand::Delete { id }),
        (Method::Patch | Method::Put | Method::Delete, None) => Err(Error::validation(format!(
            "{} requires an artifact id",
            request.method.as_str()
        ))),
    }
}

fn read_command(request: &Request) -> Result<ArtifactCommand, Error> {
    let mut filters = Filters::new();
    for (field, value) in &request.query {
        if FILTER_FIELDS.contains(&field.as_str()) {
            filters.insert(field.clone(), value.clone());
        } else if !PAGING_FIELDS.contains(&field.as_str()) {
            return Err(Error::invalid_parameters(format!(
                "unsupported query parameter {field}"
            )));
        }
    }
    if let Some(query) = request.query_value("q") {
        return Ok(ArtifactCommand::Search {
            query: query.to_owned(),
            filters,
        });
    }
    Ok(ArtifactCommand::List {
        filters,
        page: number(request, "page", 1)?,
        limit: number(request, "limit", PageRequest::DEFAULT_LIMIT)?,
    })
}

fn number(request: &Request, name: &str, default: u64) -> Result<u64, Error> {
    request.query_value(name).map_or(Ok(default), |raw| {
        raw.parse()
            .map_err(|_| Error::invalid_parameters(format!("{name} must be a positive integer")))
    })
}

fn write_command(id: String, body: &Value) -> Result<ArtifactCommand, Error> {
    let Value::Object(fields) = body else {
        return Err(Error::validation("body must be a JSON object"));
    };
    match fields.get("status") {
        Some(status) if fields.len() == 1 => {
            let status: ArtifactStatus = serde_json::from_value(status.clone())
                .map_err(|err| Error::validation(format!("invalid status: {err}")))?;
            Ok(ArtifactCommand::ChangeStatus { id, status })
        }
        _ => Ok(ArtifactCommand::Update {
            id,
            patch: fields.clone(),
        }),
    }
}

#[async_trait]
impl<P: Persistence + 'static> Controller for ArtifactController<P> {
    fn name(&self) -> &str {
        "artifacts"
    }

    async fn validate(&self, request: &Request) -> Result<(), Error> {
        command_for(request).map(|_| ())
    }

    async fn authorize(&self, request: &Request) -> Result<(), Error> {
        let required = match request.method {
            Method::Get => return Ok(()),
            Method::Delete => DELETE_ROLES,
            Method::Post | Method::Put | Method::Patch => WRITE_ROLES,
        };
        match &request.user {
            Some(user) if user.has_any_role(required) => Ok(()),
            _ => Err(Error::forbidden(format!(
                "{} on artifacts requires one of the roles: {}",
                request.method.as_str(),
                required.join(", ")
            ))),
        }
    }

    async fn execute(&self, request: &Request) -> Result<Value, Error> {
        let output = self.runner.execute(command_for(request)?).await?;
        serde_json::to_value(output)
            .map_err(|err| Error::internal(format!("failed to encode artifact output: {err}")))
    }

    fn success_status(&self, request: &Request) -> u16 {
        match request.method {
            Method::Post => 201,
            _ => 200,
        }
    }

    fn success_message(&self, request: &Request) -> Option<String> {
        let verb = match request.method {
            Method::Get => return None,
            Method::Post => "created",
            Method::Put | Method::Patch => "updated",
            Method::Delete => "deleted",
        };
        Some(format!("artifact {verb}"))
    }

    fn execution_status(&self, error: &Error) -> u16 {
        status_for(error.code())
    }
}

#[cfg(test)]
#[path = "artifacts_tests.rs"]
mod tests;
