//! Entity identity, audit fields and the persisted record shape.
//!
//! Domain payloads implement [`Entity`]; repositories wrap them in
//! [`Stored`] once the server has assigned an id, audit timestamps and a
//! version. The persistence port exchanges the untyped [`Record`] form.

use chrono::{DateTime, Utc};
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::Error;

/// Field names owned by the repository; payloads may not carry them.
pub const RESERVED_FIELDS: [&str; 4] = ["id", "createdAt", "updatedAt", "version"];

const ID_SUFFIX_LEN: usize = 9;

/// Partial update applied by `Repository::update`.
pub type Patch = Map<String, Value>;

/// Immutable entity identifier.
///
/// Generated ids combine the creation instant with a random suffix. They are
/// unique within one process in practice but carry no cross-process
/// guarantee.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Validate a caller-supplied identifier.
    ///
    /// # Examples
    /// ```
    /// use dashboard_backend::domain::{EntityId, ErrorCode};
    ///
    /// assert!(EntityId::parse("abc").is_ok());
    /// let err = EntityId::parse("  ").unwrap_err();
    /// assert_eq!(err.code(), ErrorCode::InvalidId);
    /// ```
    pub fn parse(raw: &str) -> Result<Self, Error> {
        if raw.trim().is_empty() {
            return Err(Error::invalid_id("id must be a non-empty string"));
        }
        if raw.trim() != raw {
            return Err(Error::invalid_id(
                "id must not contain surrounding whitespace",
            ));
        }
        Ok(Self(raw.to_owned()))
    }

    /// Generate a new identifier from the creation instant.
    pub fn generate(at: DateTime<Utc>) -> Self {
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(ID_SUFFIX_LEN)
            .map(|byte| char::from(byte).to_ascii_lowercase())
            .collect();
        Self(format!("{}-{suffix}", at.timestamp_millis()))
    }

    /// Borrow the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AsRef<str> for EntityId {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

/// Domain payload managed by a repository.
///
/// The payload must serialise to a JSON object whose keys do not collide
/// with [`RESERVED_FIELDS`].
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Check domain rules that the type system cannot express.
    fn validate(&self) -> Result<(), Error> {
        Ok(())
    }

    /// Check rules that depend on the previously stored value, such as
    /// allowed status transitions. Runs after [`Entity::validate`].
    fn validate_update(&self, _previous: &Self) -> Result<(), Error> {
        Ok(())
    }
}

/// Untyped record exchanged with the persistence port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    /// Immutable identifier.
    pub id: EntityId,
    /// Creation instant.
    pub created_at: DateTime<Utc>,
    /// Last modification instant; never earlier than `created_at`.
    pub updated_at: DateTime<Utc>,
    /// Starts at 1 and increments with every successful update.
    pub version: u64,
    /// Domain fields.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Record {
    /// Value of a field, treating `id` as a regular field.
    pub fn field(&self, name: &str) -> Option<Value> {
        match name {
            "id" => Some(Value::String(self.id.to_string())),
            "version" => Some(Value::from(self.version)),
            "createdAt" => Some(Value::String(self.created_at.to_rfc3339())),
            "updatedAt" => Some(Value::String(self.updated_at.to_rfc3339())),
            _ => self.fields.get(name).cloned(),
        }
    }

    /// Decode the domain fields into a typed entity.
    pub fn into_stored<E: Entity>(self) -> Result<Stored<E>, Error> {
        let data = serde_json::from_value(Value::Object(self.fields)).map_err(|err| {
            Error::internal(format!(
                "stored record {} does not match the entity shape: {err}",
                self.id
            ))
        })?;
        Ok(Stored {
            id: self.id,
            created_at: self.created_at,
            updated_at: self.updated_at,
            version: self.version,
            data,
        })
    }
}

/// Typed entity with its server-assigned fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stored<E> {
    /// Immutable identifier.
    pub id: EntityId,
    /// Creation instant.
    pub created_at: DateTime<Utc>,
    /// Last modification instant.
    pub updated_at: DateTime<Utc>,
    /// Optimistic concurrency version.
    pub version: u64,
    /// Domain payload.
    #[serde(flatten)]
    pub data: E,
}

/// Serialise an entity into its field map, rejecting non-object payloads and
/// reserved keys.
pub(crate) fn entity_fields<E: Entity>(entity: &E) -> Result<Map<String, Value>, Error> {
    match serde_json::to_value(entity) {
        Ok(Value::Object(fields)) => {
            reject_reserved(&fields)?;
            Ok(fields)
        }
        Ok(other) => Err(Error::validation(format!(
            "entity must serialise to an object, got {}",
            json_kind(&other)
        ))),
        Err(err) => Err(Error::validation(format!("entity could not be serialised: {err}"))),
    }
}

/// Reject maps that try to set repository-owned fields.
pub(crate) fn reject_reserved(fields: &Map<String, Value>) -> Result<(), Error> {
    let reserved: Vec<&str> = RESERVED_FIELDS
        .iter()
        .copied()
        .filter(|name| fields.contains_key(*name))
        .collect();
    if reserved.is_empty() {
        Ok(())
    } else {
        Err(Error::validation(format!(
            "fields {} are assigned by the server",
            reserved.join(", ")
        ))
        .with_details(serde_json::json!({ "reservedFields": reserved })))
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
