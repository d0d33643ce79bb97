use std::time::Duration;

use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use tracing::{debug, info};

use super::{bounded, DEFAULT_OP_TIMEOUT};
use crate::ids::UuidGenerator;
use crate::validate::{validate_key, validate_new_tag, validate_tag_fields};
use crate::{Clock, IdGenerator, NewTag, RecordKind, StoreError, SystemClock, Tag, TagRepository};

/// Store for organization-scoped tags. Updates fully replace the mutable fields.
pub struct TagStore<R, G = UuidGenerator, C = SystemClock>
where
    R: TagRepository,
    G: IdGenerator,
    C: Clock,
{
    repo: R,
    ids: G,
    clock: C,
    timeout: Duration,
}

impl<R: TagRepository> TagStore<R> {
    /// Store with random ids and the system clock.
    pub fn with_defaults(repo: R) -> Self {
        Self::new(repo, UuidGenerator, SystemClock)
    }
}

impl<R, G, C> TagStore<R, G, C>
where
    R: TagRepository,
    G: IdGenerator,
    C: Clock,
{
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

    pub async fn create(&self, input: NewTag) -> Result<Tag, StoreError> {
        validate_new_tag(&input)?;

        let now = self.clock.now();
        let tag = Tag {
            id: input.id.unwrap_or_else(|| self.ids.next_id()),
            name: input.name,
            description: input.description,
            organization_id: input.organization_id,
            created_at: now,
            updated_at: now,
        };
        bounded(self.timeout, "tag.create", self.repo.insert(tag.clone())).await?;
        info!(
            id = %tag.id,
            organization_id = %tag.organization_id,
            name = %tag.name,
            "tag created"
        );
        Ok(tag)
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<Tag>, StoreError> {
        let found = bounded(self.timeout, "tag.find_by_id", self.repo.get(id)).await?;
        debug!(id, found = found.is_some(), "tag lookup");
        Ok(found)
    }

    /// Point lookup that only matches a tag owned by `organization_id`.
    pub async fn find_by_id_in_organization(
        &self,
        id: &str,
        organization_id: &str,
    ) -> Result<Option<Tag>, StoreError> {
        bounded(
            self.timeout,
            "tag.find_by_id_in_organization",
            self.repo.get_in_organization(id, organization_id),
        )
        .await
    }

    /// Every tag of an organization, in insertion order.
    ///
    /// The backend is queried lazily on first poll; a failed query yields a
    /// single `Err` item and ends the stream.
    pub fn find_all<'a>(
        &'a self,
        organization_id: &'a str,
    ) -> BoxStream<'a, Result<Tag, StoreError>> {
        stream::once(async move {
            debug!(organization_id, "listing tags");
            bounded(
                self.timeout,
                "tag.find_all",
                self.repo.list_by_organization(organization_id),
            )
            .await
        })
        .map_ok(|tags| stream::iter(tags.into_iter().map(Ok::<Tag, StoreError>)))
        .try_flatten()
        .boxed()
    }

    /// Replace name, description and organization of an existing tag.
    ///
    /// `created_at` is kept from the stored row and `updated_at` re-stamped.
    pub async fn update(&self, tag: Tag) -> Result<Tag, StoreError> {
        validate_key("id", &tag.id)?;
        validate_tag_fields(&tag.name, &tag.organization_id)?;

        let existing = self
            .find_by_id(&tag.id)
            .await?
            .ok_or_else(|| StoreError::not_found(RecordKind::Tag, tag.id.as_str()))?;
        let updated = Tag {
            id: existing.id,
            name: tag.name,
            description: tag.description,
            organization_id: tag.organization_id,
            created_at: existing.created_at,
            updated_at: self.clock.now(),
        };
        bounded(self.timeout, "tag.update", self.repo.replace(&updated)).await?;
        info!(id = %updated.id, organization_id = %updated.organization_id, "tag updated");
        Ok(updated)
    }

    /// Remove a tag. Deleting an unknown id succeeds.
    pub async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let removed = bounded(self.timeout, "tag.delete", self.repo.remove(id)).await?;
        if removed {
            info!(id, "tag deleted");
        } else {
            debug!(id, "tag already absent");
        }
        Ok(())
    }
}
