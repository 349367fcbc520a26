//! Artifacts: the example domain built on the layered framework.
//!
//! An artifact moves through a fixed status lifecycle. Transitions are
//! checked by [`Entity::validate_update`], so every write path through the
//! repository enforces them.

mod service;

pub use self::service::{ArtifactCommand, ArtifactOutput, ArtifactService, NewArtifact};

use serde::{Deserialize, Serialize};

use crate::domain::{Entity, Error};

/// Collection name used by the artifact repository.
pub const ARTIFACT_COLLECTION: &str = "artifacts";

const MAX_NAME_LEN: usize = 200;

/// Lifecycle status of an [`Artifact`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactStatus {
    /// Being written.
    #[default]
    Draft,
    /// Published.
    Active,
    /// Awaiting review.
    InReview,
    /// Review passed.
    Approved,
    /// Review failed.
    Rejected,
    /// Retired from use.
    Archived,
    /// Superseded.
    Deprecated,
}

impl ArtifactStatus {
    /// Wire label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Active => "active",
            Self::InReview => "in-review",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Archived => "archived",
            Self::Deprecated => "deprecated",
        }
    }

    /// Statuses reachable in one step. Unlisted statuses are terminal.
    pub fn allowed_transitions(self) -> &'static [ArtifactStatus] {
        match self {
            Self::Draft => &[Self::Active, Self::InReview],
            Self::Active => &[Self::Archived, Self::Deprecated, Self::InReview],
            Self::InReview => &[Self::Approved, Self::Rejected, Self::Active],
            Self::Approved | Self::Rejected | Self::Archived | Self::Deprecated => &[],
        }
    }

    /// Whether `next` may follow `self`. Keeping the same status is allowed.
    ///
    /// # Examples
    /// ```
    /// use dashboard_backend::domain::artifacts::ArtifactStatus;
    ///
    /// assert!(ArtifactStatus::Draft.can_transition_to(ArtifactStatus::Active));
    /// assert!(!ArtifactStatus::Draft.can_transition_to(ArtifactStatus::Approved));
    /// ```
    pub fn can_transition_to(self, next: ArtifactStatus) -> bool {
        self == next || self.allowed_transitions().contains(&next)
    }
}

impl std::fmt::Display for ArtifactStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Versioned piece of content tracked by the dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    /// Display name.
    pub name: String,
    /// Free-form category such as `report` or `dataset`.
    pub kind: String,
    /// Lifecycle status.
    #[serde(default)]
    pub status: ArtifactStatus,
    /// Owning user id.
    pub owner: String,
    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Labels.
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Entity for Artifact {
    fn validate(&self) -> Result<(), Error> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(Error::validation("artifact name must not be blank"));
        }
        if name.chars().count() > MAX_NAME_LEN {
            return Err(Error::validation(format!(
                "artifact name must be at most {MAX_NAME_LEN} characters"
            )));
        }
        if self.kind.trim().is_empty() {
            return Err(Error::validation("artifact kind must not be blank"));
        }
        if self.owner.trim().is_empty() {
            return Err(Error::validation("artifact owner must not be blank"));
        }
        if self.tags.iter().any(|tag| tag.trim().is_empty()) {
            return Err(Error::validation("artifact tags must not be blank"));
        }
        Ok(())
    }

    fn validate_update(&self, previous: &Self) -> Result<(), Error> {
        if !previous.status.can_transition_to(self.status) {
            return Err(Error::validation(format!(
                "cannot move artifact from {} to {}",
                previous.status, self.status
            ))
            .with_details(serde_json::json!({
                "from": previous.status,
                "to": self.status,
                "allowed": previous.status.allowed_transitions(),
            })));
        }
        Ok(())
    }
}
