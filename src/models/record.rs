use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::hash::{Hash, Hasher};
use uuid::Uuid;

/// Record is the unit of work swept by the engine
/// Maps to `records` table
///
/// A record is eligible for the update pass while `marker` is `None`. Audit
/// columns are stamped by the store using the actor supplied with each write.
///
/// Two records are the same record when their ids match; other attributes are
/// ignored by `PartialEq` and `Hash`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Record {
    pub id: i64,
    pub label: String,
    pub marker: Option<String>,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub last_modified_at: DateTime<Utc>,
    pub last_modified_by: String,
}

impl Record {
    pub fn is_eligible(&self) -> bool {
        self.marker.is_none()
    }

    /// Set the marker in memory; nothing is persisted until the chunk is written
    pub fn assign_marker(&mut self, token: MarkerToken) {
        self.marker = Some(token.into_string());
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Record {}

impl Hash for Record {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// New Record for creation (without generated fields)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRecord {
    pub label: String,
}

impl NewRecord {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }

    /// Human-readable sequential label, e.g. `USER-41`
    pub fn sequential(prefix: &str, index: usize) -> Self {
        Self {
            label: format!("{prefix}{index}"),
        }
    }
}

/// Opaque unique value written to a record's marker column
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MarkerToken(String);

impl MarkerToken {
    /// Fresh random token (122 bits of entropy)
    pub fn generate() -> Self {
        Self(Uuid::new_v4().hyphenated().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for MarkerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn record(id: i64, label: &str, marker: Option<&str>) -> Record {
        let now = Utc::now();
        Record {
            id,
            label: label.to_string(),
            marker: marker.map(str::to_string),
            created_at: now,
            created_by: "SYSTEM".to_string(),
            last_modified_at: now,
            last_modified_by: "SYSTEM".to_string(),
        }
    }

    #[test]
    fn test_identity_equality() {
        let a = record(7, "USER-7", None);
        let b = record(7, "renamed", Some("token"));
        let c = record(8, "USER-7", None);

        assert_eq!(a, b);
        assert_ne!(a, c);

        let set: HashSet<Record> = [a, b, c].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_assign_marker_makes_record_ineligible() {
        let mut rec = record(1, "USER-1", None);
        assert!(rec.is_eligible());

        let token = MarkerToken::generate();
        rec.assign_marker(token.clone());

        assert!(!rec.is_eligible());
        assert_eq!(rec.marker.as_deref(), Some(token.as_str()));
    }

    #[test]
    fn test_sequential_labels() {
        assert_eq!(NewRecord::sequential("USER-", 0).label, "USER-0");
        assert_eq!(NewRecord::sequential("USER-", 49_999).label, "USER-49999");
    }

    #[test]
    fn test_token_generation_has_no_collisions() {
        let tokens: HashSet<String> = (0..100_000)
            .map(|_| MarkerToken::generate().into_string())
            .collect();
        assert_eq!(tokens.len(), 100_000);
    }

    #[test]
    fn test_token_format() {
        let token = MarkerToken::generate();
        assert_eq!(token.as_str().len(), 36);
        assert!(Uuid::parse_str(token.as_str()).is_ok());
        assert_eq!(token.to_string(), token.as_str());
    }
}
