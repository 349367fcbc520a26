//! Query shapes shared by repositories and the persistence port.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Record;

/// Equality filters; every pair must match.
///
/// Filters are kept in key order so their serialised form is canonical and
/// can be used as a cache key.
///
/// # Examples
/// ```
/// use dashboard_backend::domain::Filters;
///
/// let a = Filters::new().with("status", "draft").with("kind", "doc");
/// let b = Filters::new().with("kind", "doc").with("status", "draft");
/// assert_eq!(a.canonical(), b.canonical());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Filters(BTreeMap<String, Value>);

impl Filters {
    /// Empty filter set matching every record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an equality constraint.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(field.into(), value.into());
        self
    }

    /// Add an equality constraint in place.
    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(field.into(), value.into());
    }

    /// Whether no constraints are set.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over the constraints in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Whether `record` satisfies every constraint.
    pub fn matches(&self, record: &Record) -> bool {
        self.0
            .iter()
            .all(|(field, expected)| record.field(field).as_ref() == Some(expected))
    }

    /// Canonical serialised form.
    pub fn canonical(&self) -> String {
        serde_json::to_string(&self.0).unwrap_or_else(|_| String::from("{}"))
    }
}

impl<K, V> FromIterator<(K, V)> for Filters
where
    K: Into<String>,
    V: Into<Value>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    /// Smallest first.
    #[default]
    Asc,
    /// Largest first.
    Desc,
}

/// Ordering applied by `select_many`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortOrder {
    /// Field to sort on.
    pub field: String,
    /// Sort direction.
    pub direction: SortDirection,
}

impl SortOrder {
    /// Ascending order on `field`.
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    /// Descending order on `field`.
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }

    /// Compare two records under this ordering, breaking ties by id.
    pub fn compare(&self, left: &Record, right: &Record) -> Ordering {
        let ordering = compare_values(
            left.field(&self.field).as_ref(),
            right.field(&self.field).as_ref(),
        );
        let ordering = match self.direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        };
        ordering.then_with(|| left.id.cmp(&right.id))
    }
}

/// Offset/limit window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    /// Rows to skip.
    pub offset: u64,
    /// Maximum rows to return.
    pub limit: u64,
}

/// Query accepted by `Persistence::select_many`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectQuery {
    /// Equality constraints.
    pub filters: Filters,
    /// Optional ordering; stores fall back to creation order.
    pub order: Option<SortOrder>,
    /// Optional window; stores report the unwindowed total alongside it.
    pub range: Option<Range>,
}

/// Rows returned by `Persistence::select_many`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    /// Matching rows inside the requested window.
    pub records: Vec<Record>,
    /// Total matching rows before windowing, when the store reports it.
    pub total: Option<u64>,
}

/// Free-text query against one field.
#[derive(Debug, Clone, PartialEq)]
pub struct TextSearch {
    /// Field matched against `query`.
    pub field: String,
    /// Text to look for.
    pub query: String,
    /// Additional equality constraints.
    pub filters: Filters,
}

/// Total order over JSON scalars used for sorting.
///
/// Missing values sort first; values of different kinds sort by kind.
pub fn compare_values(left: Option<&Value>, right: Option<&Value>) -> Ordering {
    match (left, right) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(left), Some(right)) => match (left, right) {
            (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
                (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
                _ => Ordering::Equal,
            },
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            _ => kind_rank(left).cmp(&kind_rank(right)),
        },
    }
}

fn kind_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

#[cfg(test)]
mod tests {
    //! Filter matching and ordering coverage.
    use super::*;
    use crate::domain::EntityId;
    use chrono::Utc;
    use rstest::rstest;
    use serde_json::json;

    fn record(id: &str, fields: Value) -> Record {
        let Value::Object(fields) = fields else {
            panic!("object literal");
        };
        let now = Utc::now();
        Record {
            id: EntityId::parse(id).expect("valid id"),
            created_at: now,
            updated_at: now,
            version: 1,
            fields,
        }
    }

    #[rstest]
    fn filters_and_every_pair() {
        let row = record("a", json!({ "status": "draft", "kind": "doc" }));
        assert!(Filters::new().matches(&row));
        assert!(Filters::new().with("status", "draft").matches(&row));
        assert!(
            !Filters::new()
                .with("status", "draft")
                .with("kind", "img")
                .matches(&row)
        );
    }

    #[rstest]
    fn filters_can_target_id() {
        let row = record("a", json!({}));
        assert!(Filters::new().with("id", "a").matches(&row));
    }

    #[rstest]
    fn canonical_form_is_order_independent() {
        let a: Filters = [("b", 1), ("a", 2)].into_iter().collect();
        assert_eq!(a.canonical(), r#"{"a":2,"b":1}"#);
    }

    #[rstest]
    fn sort_order_breaks_ties_by_id() {
        let first = record("a", json!({ "rank": 1 }));
        let second = record("b", json!({ "rank": 1 }));
        assert_eq!(SortOrder::asc("rank").compare(&first, &second), Ordering::Less);
        assert_eq!(SortOrder::desc("rank").compare(&first, &second), Ordering::Less);
    }

    #[rstest]
    #[case(json!(1), json!(2), Ordering::Less)]
    #[case(json!("b"), json!("a"), Ordering::Greater)]
    #[case(json!(null), json!(0), Ordering::Less)]
    fn compare_values_orders_scalars(
        #[case] left: Value,
        #[case] right: Value,
        #[case] expected: Ordering,
    ) {
        assert_eq!(compare_values(Some(&left), Some(&right)), expected);
    }
}
