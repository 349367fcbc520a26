//! Artifact business operations.

use std::sync::Arc;

use async_trait::async_trait;
use pagination::Paginated;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{Artifact, ArtifactStatus};
use crate::domain::ports::Persistence;
use crate::domain::repository::Repository;
use crate::domain::service::{Service, ServiceCache, WorkflowStep};
use crate::domain::{Error, Filters, Patch, Stored};
use crate::logging::Logger;

/// Fields accepted when creating an artifact. New artifacts start as drafts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewArtifact {
    /// Display name.
    pub name: String,
    /// Category.
    pub kind: String,
    /// Owning user id.
    pub owner: String,
    /// Optional description.
    #[serde(default)]
    pub description: Option<String>,
    /// Labels.
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Operations offered by [`ArtifactService`].
#[derive(Debug, Clone, PartialEq)]
pub enum ArtifactCommand {
    /// Create a draft.
    Create(NewArtifact),
    /// Fetch one artifact.
    Get {
        /// Artifact id.
        id: String,
    },
    /// One page of artifacts.
    List {
        /// Equality filters.
        filters: Filters,
        /// 1-based page.
        page: u64,
        /// Page size.
        limit: u64,
    },
    /// Case-insensitive name search.
    Search {
        /// Text to match.
        query: String,
        /// Equality filters.
        filters: Filters,
    },
    /// Patch descriptive fields.
    Update {
        /// Artifact id.
        id: String,
        /// Fields to change.
        patch: Patch,
    },
    /// Move to another lifecycle status.
    ChangeStatus {
        /// Artifact id.
        id: String,
        /// Target status.
        status: ArtifactStatus,
    },
    /// Remove an artifact.
    Delete {
        /// Artifact id.
        id: String,
    },
}

impl ArtifactCommand {
    /// Short label used in logs and cache keys.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Create(_) => "create",
            Self::Get { .. } => "get",
            Self::List { .. } => "list",
            Self::Search { .. } => "search",
            Self::Update { .. } => "update",
            Self::ChangeStatus { .. } => "change-status",
            Self::Delete { .. } => "delete",
        }
    }

    /// Target id for commands addressing one artifact.
    pub fn target_id(&self) -> Option<&str> {
        match self {
            Self::Get { id }
            | Self::Update { id, .. }
            | Self::ChangeStatus { id, .. }
            | Self::Delete { id } => Some(id.as_str()),
            Self::Create(_) | Self::List { .. } | Self::Search { .. } => None,
        }
    }

    /// Whether the command changes stored state.
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            Self::Create(_) | Self::Update { .. } | Self::ChangeStatus { .. } | Self::Delete { .. }
        )
    }
}

/// Result of an [`ArtifactCommand`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ArtifactOutput {
    /// One artifact.
    Artifact(Stored<Artifact>),
    /// One page.
    Page(Paginated<Stored<Artifact>>),
    /// Search hits.
    Matches(Vec<Stored<Artifact>>),
    /// Deletion receipt.
    Deleted {
        /// Removed id.
        id: String,
    },
}

/// Artifact business logic over a repository and a dedicated cache.
pub struct ArtifactService<P> {
    repository: Arc<Repository<Artifact, P>>,
    cache: ServiceCache,
    logger: Arc<Logger>,
}

impl<P> ArtifactService<P> {
    /// Build the service.
    pub fn new(
        repository: Arc<Repository<Artifact, P>>,
        cache: ServiceCache,
        logger: Arc<Logger>,
    ) -> Self {
        Self {
            repository,
            cache,
            logger,
        }
    }

    /// Underlying repository.
    pub fn repository(&self) -> &Repository<Artifact, P> {
        &self.repository
    }
}

impl<P: Persistence> ArtifactService<P> {
    async fn get(&self, id: &str) -> Result<Stored<Artifact>, Error> {
        let key = format!("artifact:{id}");
        if let Some(hit) = self.cache.get::<Stored<Artifact>>(&key).await? {
            return Ok(hit);
        }
        let artifact = self
            .repository
            .read(id)
            .await?
            .ok_or_else(|| Error::not_found(format!("artifact {id} not found")))?;
        self.cache.set(&key, &artifact).await?;
        Ok(artifact)
    }

    async fn list(
        &self,
        filters: &Filters,
        page: u64,
        limit: u64,
    ) -> Result<Paginated<Stored<Artifact>>, Error> {
        let key = format!("list:{}:{page}:{limit}", filters.canonical());
        if let Some(hit) = self.cache.get(&key).await? {
            return Ok(hit);
        }
        let result = self
            .repository
            .find_with_pagination(filters, page, limit)
            .await?;
        self.cache.set(&key, &result).await?;
        Ok(result)
    }

    async fn change_status(
        &self,
        id: &str,
        status: ArtifactStatus,
    ) -> Result<Stored<Artifact>, Error> {
        let mut patch = Patch::new();
        patch.insert("status".to_owned(), json!(status));
        let updated = self.repository.update(id, patch).await?;
        self.logger.info(
            "artifact status changed",
            json!({ "id": id, "status": status }),
        );
        Ok(updated)
    }
}

#[async_trait]
impl<P: Persistence + 'static> Service for ArtifactService<P> {
    type Input = ArtifactCommand;
    type Output = ArtifactOutput;

    fn name(&self) -> &str {
        "artifacts"
    }

    async fn validate(&self, command: &ArtifactCommand) -> Result<(), Error> {
        match command {
            ArtifactCommand::Update { patch, .. } if patch.is_empty() => {
                Err(Error::validation("update must change at least one field"))
            }
            ArtifactCommand::Update { patch, .. } if patch.contains_key("status") => Err(
                Error::validation("status changes go through the status operation"),
            ),
            ArtifactCommand::Update { patch, .. } if patch.contains_key("owner") => {
                Err(Error::validation("artifact owner cannot be changed"))
            }
            _ => Ok(()),
        }
    }

    async fn pre_process(&self, command: ArtifactCommand) -> Result<ArtifactCommand, Error> {
        Ok(match command {
            ArtifactCommand::Create(mut draft) => {
                draft.name = draft.name.trim().to_owned();
                draft.tags = normalise_tags(draft.tags);
                ArtifactCommand::Create(draft)
            }
            other => other,
        })
    }

    async fn process(&self, command: ArtifactCommand) -> Result<ArtifactOutput, Error> {
        let write = command.is_write();
        let output = match command {
            ArtifactCommand::Create(draft) => {
                let artifact = Artifact {
                    name: draft.name,
                    kind: draft.kind,
                    status: ArtifactStatus::Draft,
                    owner: draft.owner,
                    description: draft.description,
                    tags: draft.tags,
                };
                ArtifactOutput::Artifact(self.repository.create(artifact).await?)
            }
            ArtifactCommand::Get { id } => ArtifactOutput::Artifact(self.get(&id).await?),
            ArtifactCommand::List {
                filters,
                page,
                limit,
            } => ArtifactOutput::Page(self.list(&filters, page, limit).await?),
            ArtifactCommand::Search { query, filters } => {
                ArtifactOutput::Matches(self.repository.search(&query, &filters).await?)
            }
            ArtifactCommand::Update { id, patch } => {
                ArtifactOutput::Artifact(self.repository.update(&id, patch).await?)
            }
            ArtifactCommand::ChangeStatus { id, status } => {
                ArtifactOutput::Artifact(self.change_status(&id, status).await?)
            }
            ArtifactCommand::Delete { id } => {
                self.repository.delete(&id).await?;
                ArtifactOutput::Deleted { id }
            }
        };
        if write {
            self.cache.clear().await;
        }
        Ok(output)
    }

    async fn run_step(&self, step: &WorkflowStep, command: &ArtifactCommand) -> Result<(), Error> {
        match step.id.as_str() {
            "audit" => {
                self.logger.info(
                    "artifact command audited",
                    json!({ "command": command.label(), "target": command.target_id() }),
                );
                Ok(())
            }
            "ensure-exists" => match command.target_id() {
                Some(id) => self.repository.read(id).await?.map(|_| ()).ok_or_else(|| {
                    Error::not_found(format!("artifact {id} not found"))
                }),
                None => Ok(()),
            },
            "validate" => self.validate(command).await,
            other => Err(Error::validation(format!("unknown workflow step {other}"))),
        }
    }
}

fn normalise_tags(tags: Vec<String>) -> Vec<String> {
    let mut tags: Vec<String> = tags
        .into_iter()
        .map(|tag| tag.trim().to_lowercase())
        .collect();
    tags.sort();
    tags.dedup();
    tags
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;
