use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::{
    Installation, InstallationRepository, RecordKind, StoreError, Tag, TagRepository,
    UpgradeRecord, UpgradeRecordRepository,
};

fn lock<T>(m: &Mutex<T>) -> Result<MutexGuard<'_, T>, StoreError> {
    m.lock()
        .map_err(|_| StoreError::Storage("mutex poisoned".into()))
}

/// In-memory installation repository. The mutex is never held across an await.
pub struct InMemoryInstallationRepo {
    inner: Mutex<BTreeMap<String, Installation>>,
}

/// In-memory tag repository. Tags are kept in insertion order.
pub struct InMemoryTagRepo {
    tags: Mutex<Vec<Tag>>,
}

/// In-memory upgrade ledger.
pub struct InMemoryUpgradeRecordRepo {
    records: Mutex<BTreeMap<String, UpgradeRecord>>,
}

impl InMemoryInstallationRepo {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(BTreeMap::new()),
        }
    }
}

impl Default for InMemoryInstallationRepo {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InstallationRepository for InMemoryInstallationRepo {
    async fn get(&self, id: &str) -> Result<Option<Installation>, StoreError> {
        Ok(lock(&self.inner)?.get(id).cloned())
    }

    async fn first(&self) -> Result<Option<Installation>, StoreError> {
        Ok(lock(&self.inner)?
            .values()
            .min_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)))
            .cloned())
    }

    async fn insert(&self, installation: Installation) -> Result<(), StoreError> {
        let mut map = lock(&self.inner)?;
        if map.contains_key(&installation.id) {
            return Err(StoreError::conflict(
                RecordKind::Installation,
                installation.id,
            ));
        }
        map.insert(installation.id.clone(), installation);
        Ok(())
    }

    async fn replace(&self, installation: &Installation) -> Result<(), StoreError> {
        let mut map = lock(&self.inner)?;
        match map.get_mut(&installation.id) {
            Some(slot) => {
                *slot = installation.clone();
                Ok(())
            }
            None => Err(StoreError::not_found(
                RecordKind::Installation,
                installation.id.as_str(),
            )),
        }
    }

    async fn remove(&self, id: &str) -> Result<bool, StoreError> {
        Ok(lock(&self.inner)?.remove(id).is_some())
    }
}

impl InMemoryTagRepo {
    pub fn new() -> Self {
        Self {
            tags: Mutex::new(Vec::new()),
        }
    }
}

impl Default for InMemoryTagRepo {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TagRepository for InMemoryTagRepo {
    async fn get(&self, id: &str) -> Result<Option<Tag>, StoreError> {
        Ok(lock(&self.tags)?.iter().find(|t| t.id == id).cloned())
    }

    async fn get_in_organization(
        &self,
        id: &str,
        organization_id: &str,
    ) -> Result<Option<Tag>, StoreError> {
        Ok(lock(&self.tags)?
            .iter()
            .find(|t| t.id == id && t.organization_id == organization_id)
            .cloned())
    }

    async fn list_by_organization(&self, organization_id: &str) -> Result<Vec<Tag>, StoreError> {
        Ok(lock(&self.tags)?
            .iter()
            .filter(|t| t.organization_id == organization_id)
            .cloned()
            .collect())
    }

    async fn insert(&self, tag: Tag) -> Result<(), StoreError> {
        let mut tags = lock(&self.tags)?;
        if tags.iter().any(|t| t.id == tag.id) {
            return Err(StoreError::conflict(RecordKind::Tag, tag.id));
        }
        tags.push(tag);
        Ok(())
    }

    async fn replace(&self, tag: &Tag) -> Result<(), StoreError> {
        let mut tags = lock(&self.tags)?;
        match tags.iter_mut().find(|t| t.id == tag.id) {
            Some(slot) => {
                *slot = tag.clone();
                Ok(())
            }
            None => Err(StoreError::not_found(RecordKind::Tag, tag.id.as_str())),
        }
    }

    async fn remove(&self, id: &str) -> Result<bool, StoreError> {
        let mut tags = lock(&self.tags)?;
        let before = tags.len();
        tags.retain(|t| t.id != id);
        Ok(tags.len() != before)
    }
}

impl InMemoryUpgradeRecordRepo {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(BTreeMap::new()),
        }
    }
}

impl Default for InMemoryUpgradeRecordRepo {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UpgradeRecordRepository for InMemoryUpgradeRecordRepo {
    async fn get(&self, name: &str) -> Result<Option<UpgradeRecord>, StoreError> {
        Ok(lock(&self.records)?.get(name).cloned())
    }

    async fn list(&self) -> Result<Vec<UpgradeRecord>, StoreError> {
        let mut out: Vec<_> = lock(&self.records)?.values().cloned().collect();
        // BTreeMap already yields name order; a stable sort keeps it as tie-breaker
        out.sort_by_key(|r| r.applied_at);
        Ok(out)
    }

    async fn insert(&self, record: UpgradeRecord) -> Result<(), StoreError> {
        let mut map = lock(&self.records)?;
        if map.contains_key(&record.name) {
            return Err(StoreError::conflict(RecordKind::UpgradeRecord, record.name));
        }
        map.insert(record.name.clone(), record);
        Ok(())
    }

    async fn replace(&self, record: &UpgradeRecord) -> Result<(), StoreError> {
        let mut map = lock(&self.records)?;
        match map.get_mut(&record.name) {
            Some(slot) => {
                *slot = record.clone();
                Ok(())
            }
            None => Err(StoreError::not_found(
                RecordKind::UpgradeRecord,
                record.name.as_str(),
            )),
        }
    }

    async fn remove(&self, name: &str) -> Result<bool, StoreError> {
        Ok(lock(&self.records)?.remove(name).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    fn tag(id: &str, org: &str) -> Tag {
        Tag {
            id: id.into(),
            name: format!("name-{id}"),
            description: None,
            organization_id: org.into(),
            created_at: UNIX_EPOCH,
            updated_at: UNIX_EPOCH,
        }
    }

    #[tokio::test]
    async fn tags_keep_insertion_order_per_organization() {
        let repo = InMemoryTagRepo::new();
        repo.insert(tag("b", "org1")).await.unwrap();
        repo.insert(tag("a", "org1")).await.unwrap();
        repo.insert(tag("c", "org2")).await.unwrap();

        let ids: Vec<_> = repo
            .list_by_organization("org1")
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[tokio::test]
    async fn scoped_lookup_ignores_other_organizations() {
        let repo = InMemoryTagRepo::new();
        repo.insert(tag("t1", "org1")).await.unwrap();
        assert!(repo.get_in_organization("t1", "org1").await.unwrap().is_some());
        assert!(repo.get_in_organization("t1", "org2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn upgrade_list_orders_by_applied_at_then_name() {
        let repo = InMemoryUpgradeRecordRepo::new();
        let t = |s| SystemTime::UNIX_EPOCH + Duration::from_secs(s);
        for (name, at) in [("zeta", 1), ("beta", 2), ("alpha", 2)] {
            repo.insert(UpgradeRecord {
                name: name.into(),
                applied_at: t(at),
            })
            .await
            .unwrap();
        }
        let names: Vec<_> = repo.list().await.unwrap().into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["zeta", "alpha", "beta"]);
    }
}
