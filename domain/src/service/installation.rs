use std::time::Duration;

use tracing::{debug, info};

use super::{bounded, DEFAULT_OP_TIMEOUT};
use crate::ids::UuidGenerator;
use crate::validate::{validate_attributes, validate_key, validate_optional_id};
use crate::{
    Attributes, Clock, IdGenerator, Installation, InstallationRepository, NewInstallation,
    RecordKind, StoreError, SystemClock,
};

/// Store for the deployment-wide installation record.
///
/// The store does not enforce that only one installation exists; callers that
/// need a singleton go through [`InstallationStore::get_or_initialize`].
pub struct InstallationStore<R, G = UuidGenerator, C = SystemClock>
where
    R: InstallationRepository,
    G: IdGenerator,
    C: Clock,
{
    repo: R,
    ids: G,
    clock: C,
    timeout: Duration,
}

impl<R: InstallationRepository> InstallationStore<R> {
    /// Store with random ids and the system clock.
    pub fn with_defaults(repo: R) -> Self {
        Self::new(repo, UuidGenerator, SystemClock)
    }
}

impl<R: InstallationRepository, G: IdGenerator, C: Clock> InstallationStore<R, G, C> {
    pub fn new(repo: R, ids: G, clock: C) -> Self {
        Self {
            repo,
            ids,
            clock,
            timeout: DEFAULT_OP_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Persist a new installation, generating an id when none is given.
    pub async fn create(&self, input: NewInstallation) -> Result<Installation, StoreError> {
        validate_optional_id(input.id.as_deref())?;
        validate_attributes(&input.additional_information)?;

        let now = self.clock.now();
        let installation = Installation {
            id: input.id.unwrap_or_else(|| self.ids.next_id()),
            additional_information: input.additional_information,
            created_at: now,
            updated_at: now,
        };
        bounded(
            self.timeout,
            "installation.create",
            self.repo.insert(installation.clone()),
        )
        .await?;
        info!(id = %installation.id, "installation created");
        Ok(installation)
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<Installation>, StoreError> {
        let found = bounded(self.timeout, "installation.find_by_id", self.repo.get(id)).await?;
        debug!(id, found = found.is_some(), "installation lookup");
        Ok(found)
    }

    /// Replace the stored attribute map with `installation.additional_information`.
    ///
    /// Keys missing from the new map are dropped. `created_at` is kept from the
    /// stored row and `updated_at` is stamped from the clock; the timestamps on
    /// the argument are ignored.
    pub async fn update(&self, installation: Installation) -> Result<Installation, StoreError> {
        validate_key("id", &installation.id)?;
        validate_attributes(&installation.additional_information)?;

        let existing = self
            .find_by_id(&installation.id)
            .await?
            .ok_or_else(|| {
                StoreError::not_found(RecordKind::Installation, installation.id.as_str())
            })?;
        let updated = Installation {
            id: existing.id,
            additional_information: installation.additional_information,
            created_at: existing.created_at,
            updated_at: self.clock.now(),
        };
        bounded(self.timeout, "installation.update", self.repo.replace(&updated)).await?;
        info!(
            id = %updated.id,
            keys = updated.additional_information.len(),
            "installation updated"
        );
        Ok(updated)
    }

    /// Remove the installation. Deleting an unknown id succeeds.
    pub async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let removed = bounded(self.timeout, "installation.delete", self.repo.remove(id)).await?;
        if removed {
            info!(id, "installation deleted");
        } else {
            debug!(id, "installation already absent");
        }
        Ok(())
    }

    /// The deployment's installation, if one was created.
    pub async fn find_current(&self) -> Result<Option<Installation>, StoreError> {
        bounded(self.timeout, "installation.find_current", self.repo.first()).await
    }

    /// The deployment's installation; `NotFound` when none exists.
    pub async fn get(&self) -> Result<Installation, StoreError> {
        self.find_current()
            .await?
            .ok_or_else(|| StoreError::not_found(RecordKind::Installation, "*"))
    }

    /// Return the existing installation or create an empty one.
    ///
    /// Two concurrent first calls may both create a row.
    pub async fn get_or_initialize(&self) -> Result<Installation, StoreError> {
        if let Some(existing) = self.find_current().await? {
            return Ok(existing);
        }
        self.create(NewInstallation::default()).await
    }

    /// Merge `attrs` into the current installation: given keys overwrite,
    /// other keys are kept.
    pub async fn add_additional_information(
        &self,
        attrs: Attributes,
    ) -> Result<Installation, StoreError> {
        validate_attributes(&attrs)?;
        let mut current = self.get().await?;
        current.additional_information.extend(attrs);
        current.updated_at = self.clock.now();
        bounded(self.timeout, "installation.merge", self.repo.replace(&current)).await?;
        info!(
            id = %current.id,
            keys = current.additional_information.len(),
            "installation attributes merged"
        );
        Ok(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory_repo::InMemoryInstallationRepo;
    use crate::ids::SequentialIdGenerator;
    use crate::service::test_support::{FailingRepo, StepClock};

    fn store() -> InstallationStore<InMemoryInstallationRepo, SequentialIdGenerator, StepClock> {
        InstallationStore::new(
            InMemoryInstallationRepo::new(),
            SequentialIdGenerator::new("inst-"),
            StepClock::new(),
        )
    }

    fn attrs(pairs: &[(&str, &str)]) -> Attributes {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn create_generates_id_and_finds_it() {
        let s = store();
        let created = s
            .create(NewInstallation {
                id: None,
                additional_information: attrs(&[("key1", "value1")]),
            })
            .await
            .unwrap();
        assert_eq!(created.id, "inst-0");
        assert_eq!(created.created_at, created.updated_at);

        let found = s.find_by_id(&created.id).await.unwrap();
        assert_eq!(found, Some(created));
    }

    #[tokio::test]
    async fn create_keeps_supplied_id_and_rejects_duplicates() {
        let s = store();
        let input = NewInstallation {
            id: Some("fixed".into()),
            additional_information: Attributes::new(),
        };
        assert_eq!(s.create(input.clone()).await.unwrap().id, "fixed");
        let err = s.create(input).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { kind: RecordKind::Installation, .. }));
        assert!(err.is_storage_failure());
    }

    #[tokio::test]
    async fn update_replaces_the_attribute_map() {
        let s = store();
        let created = s
            .create(NewInstallation {
                id: None,
                additional_information: attrs(&[("key1", "value1"), ("key2", "value2")]),
            })
            .await
            .unwrap();

        let mut changed = created.clone();
        changed.additional_information = attrs(&[("key2", "value2"), ("key3", "value3")]);
        let updated = s.update(changed).await.unwrap();

        let expected = attrs(&[("key2", "value2"), ("key3", "value3")]);
        assert_eq!(updated.additional_information, expected);
        assert_eq!(updated.created_at, created.created_at);
        assert!(updated.updated_at > created.updated_at);

        let stored = s.find_by_id(&created.id).await.unwrap().unwrap();
        assert_eq!(stored.additional_information, expected);
    }

    #[tokio::test]
    async fn update_unknown_id_is_not_found() {
        let s = store();
        let ghost = Installation {
            id: "ghost".into(),
            additional_information: Attributes::new(),
            created_at: std::time::SystemTime::UNIX_EPOCH,
            updated_at: std::time::SystemTime::UNIX_EPOCH,
        };
        let err = s.update(ghost).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::NotFound { kind: RecordKind::Installation, ref id } if id == "ghost"
        ));
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let s = store();
        let created = s.create(NewInstallation::default()).await.unwrap();
        s.delete(&created.id).await.unwrap();
        assert!(s.find_by_id(&created.id).await.unwrap().is_none());
        s.delete(&created.id).await.unwrap();
    }

    #[tokio::test]
    async fn get_or_initialize_creates_once() {
        let s = store();
        assert!(matches!(s.get().await, Err(StoreError::NotFound { .. })));

        let first = s.get_or_initialize().await.unwrap();
        let second = s.get_or_initialize().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(s.get().await.unwrap().id, first.id);
    }

    #[tokio::test]
    async fn add_additional_information_merges_keys() {
        let s = store();
        s.create(NewInstallation {
            id: None,
            additional_information: attrs(&[("key1", "value1"), ("key2", "old")]),
        })
        .await
        .unwrap();

        let merged = s
            .add_additional_information(attrs(&[("key2", "new"), ("key3", "value3")]))
            .await
            .unwrap();
        assert_eq!(
            merged.additional_information,
            attrs(&[("key1", "value1"), ("key2", "new"), ("key3", "value3")])
        );
    }

    #[tokio::test]
    async fn invalid_input_is_rejected_before_the_backend() {
        let s = InstallationStore::with_defaults(FailingRepo);

        let blank_id = NewInstallation {
            id: Some("  ".into()),
            additional_information: Attributes::new(),
        };
        let err = s.create(blank_id).await.unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));

        let blank_key = NewInstallation {
            id: None,
            additional_information: attrs(&[(" ", "v")]),
        };
        let err = s.create(blank_key).await.unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));

        let bad_update = Installation {
            id: "inst".into(),
            additional_information: attrs(&[("", "v")]),
            created_at: std::time::SystemTime::UNIX_EPOCH,
            updated_at: std::time::SystemTime::UNIX_EPOCH,
        };
        let err = s.update(bad_update).await.unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));

        let err = s
            .add_additional_information(attrs(&[("", "v")]))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));

        // Valid input does reach the backend.
        let err = s.create(NewInstallation::default()).await.unwrap_err();
        assert!(matches!(err, StoreError::Storage(_)));
    }

    #[tokio::test]
    async fn add_additional_information_without_installation_fails() {
        let s = store();
        let err = s
            .add_additional_information(attrs(&[("k", "v")]))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }
}
