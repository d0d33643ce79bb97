//! Domain library for the record store.
//!
//! Holds the record types (installations, tags, upgrade records), the
//! repository ports (traits) every storage backend implements, and the error
//! taxonomy. Keep concrete IO concerns out of this crate: the only backends
//! living here are the in-memory adapters used by tests and demos.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use thiserror::Error;

/// Free-form string attributes attached to an installation.
pub type Attributes = BTreeMap<String, String>;

/// The three independent kinds of record handled by the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Installation,
    Tag,
    UpgradeRecord,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Installation => "installation",
            RecordKind::Tag => "tag",
            RecordKind::UpgradeRecord => "upgrade_record",
        }
    }
}

impl Display for RecordKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Input for creating an installation. A missing id is generated.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NewInstallation {
    pub id: Option<String>,
    pub additional_information: Attributes,
}

/// The deployment-wide installation record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Installation {
    pub id: String,
    pub additional_information: Attributes,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
}

/// Input for creating a tag.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NewTag {
    pub id: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub organization_id: String,
}

/// A tag scoped to an organization. The id never changes after creation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tag {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub organization_id: String,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
}

/// Input for recording an applied upgrade. `applied_at` defaults to now.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NewUpgradeRecord {
    pub name: String,
    pub applied_at: Option<SystemTime>,
}

/// Ledger entry for an upgrade step; the name is the identity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpgradeRecord {
    pub name: String,
    pub applied_at: SystemTime,
}

/// Time source abstraction to make code testable.
pub trait Clock: Send + Sync {
    fn now(&self) -> SystemTime;
}

/// Wall clock backed by `SystemTime::now`.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// Supplies unique identifiers for records created without one.
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> String;
}

/// Repository port for installations.
#[async_trait]
pub trait InstallationRepository: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<Installation>, StoreError>;
    /// Any stored installation; deployments are expected to hold at most one.
    async fn first(&self) -> Result<Option<Installation>, StoreError>;
    /// Insert a new row. Fails with `Conflict` if the id is taken.
    async fn insert(&self, installation: Installation) -> Result<(), StoreError>;
    /// Replace an existing row. Fails with `NotFound` if the id is unknown.
    async fn replace(&self, installation: &Installation) -> Result<(), StoreError>;
    /// Remove a row, returning whether it existed.
    async fn remove(&self, id: &str) -> Result<bool, StoreError>;
}

/// Repository port for tags.
#[async_trait]
pub trait TagRepository: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<Tag>, StoreError>;
    async fn get_in_organization(
        &self,
        id: &str,
        organization_id: &str,
    ) -> Result<Option<Tag>, StoreError>;
    /// All tags of an organization, in insertion order.
    async fn list_by_organization(&self, organization_id: &str) -> Result<Vec<Tag>, StoreError>;
    async fn insert(&self, tag: Tag) -> Result<(), StoreError>;
    async fn replace(&self, tag: &Tag) -> Result<(), StoreError>;
    async fn remove(&self, id: &str) -> Result<bool, StoreError>;
}

/// Repository port for the upgrade ledger.
#[async_trait]
pub trait UpgradeRecordRepository: Send + Sync {
    async fn get(&self, name: &str) -> Result<Option<UpgradeRecord>, StoreError>;
    /// Every record, ordered by `applied_at` then name.
    async fn list(&self) -> Result<Vec<UpgradeRecord>, StoreError>;
    async fn insert(&self, record: UpgradeRecord) -> Result<(), StoreError>;
    async fn replace(&self, record: &UpgradeRecord) -> Result<(), StoreError>;
    async fn remove(&self, name: &str) -> Result<bool, StoreError>;
}

/// Errors surfaced by stores and repositories.
///
/// `find_by_id` reports absence as `Ok(None)`; `NotFound` is reserved for
/// operations that require the record to exist.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: RecordKind, id: String },
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("{kind} already exists: {id}")]
    Conflict { kind: RecordKind, id: String },
    #[error("storage error: {0}")]
    Storage(String),
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),
}

impl StoreError {
    pub fn not_found(kind: RecordKind, id: impl Into<String>) -> Self {
        StoreError::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn conflict(kind: RecordKind, id: impl Into<String>) -> Self {
        StoreError::Conflict {
            kind,
            id: id.into(),
        }
    }

    /// True for failures that originate in the backend rather than the caller.
    pub fn is_storage_failure(&self) -> bool {
        matches!(
            self,
            StoreError::Conflict { .. } | StoreError::Storage(_) | StoreError::Timeout(_)
        )
    }
}

pub mod adapters;
pub mod ids;
pub mod service;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod validate;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_kind_display() {
        assert_eq!(RecordKind::Installation.to_string(), "installation");
        assert_eq!(RecordKind::UpgradeRecord.as_str(), "upgrade_record");
    }

    #[test]
    fn not_found_message_names_kind_and_id() {
        let err = StoreError::not_found(RecordKind::Tag, "t-1");
        assert_eq!(err.to_string(), "tag not found: t-1");
        assert!(!err.is_storage_failure());
    }

    #[test]
    fn storage_failures_are_grouped() {
        assert!(StoreError::conflict(RecordKind::Tag, "x").is_storage_failure());
        assert!(StoreError::Storage("io".into()).is_storage_failure());
        assert!(StoreError::Timeout(Duration::from_secs(1)).is_storage_failure());
        assert!(!StoreError::Validation("blank".into()).is_storage_failure());
    }
}
