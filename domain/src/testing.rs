//! Shared conformance suite for repository implementations.
//!
//! Every backend runs the same assertions, so the in-memory adapters and
//! durable adapters are held to one contract. Enabled with the `testing`
//! feature; each function expects an empty repository.

#![allow(clippy::unwrap_used)]

use std::time::{Duration, SystemTime};

use crate::{
    Attributes, Installation, InstallationRepository, RecordKind, StoreError, Tag, TagRepository,
    UpgradeRecord, UpgradeRecordRepository,
};

/// A timestamp with sub-second precision, to catch lossy storage.
fn at(secs: u64, nanos: u32) -> SystemTime {
    SystemTime::UNIX_EPOCH + Duration::new(secs, nanos)
}

pub async fn test_installation_repository<R: InstallationRepository>(repo: &R) {
    assert!(repo.get("inst-1").await.unwrap().is_none());
    assert!(repo.first().await.unwrap().is_none());

    let mut attrs = Attributes::new();
    attrs.insert("key1".into(), "value1".into());
    attrs.insert("key2".into(), "value2".into());
    let inst = Installation {
        id: "inst-1".into(),
        additional_information: attrs,
        created_at: at(1_700_000_000, 123_456_789),
        updated_at: at(1_700_000_000, 123_456_789),
    };
    repo.insert(inst.clone()).await.unwrap();
    assert_eq!(repo.get("inst-1").await.unwrap(), Some(inst.clone()));
    assert_eq!(repo.first().await.unwrap(), Some(inst.clone()));

    let err = repo.insert(inst.clone()).await.unwrap_err();
    assert!(matches!(err, StoreError::Conflict { kind: RecordKind::Installation, .. }));

    let mut replaced = inst.clone();
    replaced.additional_information = Attributes::new();
    replaced
        .additional_information
        .insert("key3".into(), "value3".into());
    replaced.updated_at = at(1_700_000_100, 1);
    repo.replace(&replaced).await.unwrap();
    assert_eq!(repo.get("inst-1").await.unwrap(), Some(replaced));

    let mut ghost = inst;
    ghost.id = "ghost".into();
    let err = repo.replace(&ghost).await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound { .. }));

    assert!(repo.remove("inst-1").await.unwrap());
    assert!(!repo.remove("inst-1").await.unwrap());
    assert!(repo.get("inst-1").await.unwrap().is_none());
}

pub async fn test_tag_repository<R: TagRepository>(repo: &R) {
    let tag = |id: &str, org: &str, secs: u64| Tag {
        id: id.into(),
        name: format!("name-{id}"),
        description: Some(format!("about {id}")),
        organization_id: org.into(),
        created_at: at(secs, 42),
        updated_at: at(secs, 42),
    };

    assert!(repo.get("t1").await.unwrap().is_none());
    assert!(repo.list_by_organization("org-a").await.unwrap().is_empty());

    let t1 = tag("t1", "org-a", 10);
    let t2 = tag("t2", "org-a", 11);
    let mut t3 = tag("t3", "org-b", 12);
    t3.description = None;
    for t in [&t1, &t2, &t3] {
        repo.insert(t.clone()).await.unwrap();
    }

    assert_eq!(repo.get("t3").await.unwrap(), Some(t3.clone()));
    assert_eq!(repo.get_in_organization("t1", "org-a").await.unwrap(), Some(t1.clone()));
    assert!(repo.get_in_organization("t1", "org-b").await.unwrap().is_none());
    assert_eq!(
        repo.list_by_organization("org-a").await.unwrap(),
        vec![t1.clone(), t2.clone()]
    );
    assert_eq!(repo.list_by_organization("org-b").await.unwrap(), vec![t3]);

    let err = repo.insert(t1.clone()).await.unwrap_err();
    assert!(matches!(err, StoreError::Conflict { kind: RecordKind::Tag, .. }));

    let mut renamed = t1.clone();
    renamed.name = "renamed".into();
    renamed.description = None;
    repo.replace(&renamed).await.unwrap();
    assert_eq!(repo.get("t1").await.unwrap(), Some(renamed));

    let missing = tag("missing", "org-a", 1);
    assert!(matches!(
        repo.replace(&missing).await.unwrap_err(),
        StoreError::NotFound { .. }
    ));

    assert!(repo.remove("t2").await.unwrap());
    assert!(!repo.remove("t2").await.unwrap());
    assert_eq!(repo.list_by_organization("org-a").await.unwrap().len(), 1);
}

pub async fn test_upgrade_record_repository<R: UpgradeRecordRepository>(repo: &R) {
    assert!(repo.get("v1").await.unwrap().is_none());
    assert!(repo.list().await.unwrap().is_empty());

    let v2 = UpgradeRecord {
        name: "v2".into(),
        applied_at: at(200, 5),
    };
    let v1 = UpgradeRecord {
        name: "v1".into(),
        applied_at: at(100, 5),
    };
    repo.insert(v2.clone()).await.unwrap();
    repo.insert(v1.clone()).await.unwrap();
    assert_eq!(repo.get("v1").await.unwrap(), Some(v1.clone()));
    assert_eq!(repo.list().await.unwrap(), vec![v1.clone(), v2.clone()]);

    let err = repo.insert(v1.clone()).await.unwrap_err();
    assert!(matches!(err, StoreError::Conflict { kind: RecordKind::UpgradeRecord, .. }));

    let moved = UpgradeRecord {
        name: "v1".into(),
        applied_at: at(300, 0),
    };
    repo.replace(&moved).await.unwrap();
    assert_eq!(repo.list().await.unwrap(), vec![v2, moved]);

    assert!(repo.remove("v1").await.unwrap());
    assert!(!repo.remove("v1").await.unwrap());
    assert!(repo.get("v1").await.unwrap().is_none());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory_repo::{
        InMemoryInstallationRepo, InMemoryTagRepo, InMemoryUpgradeRecordRepo,
    };

    #[tokio::test]
    async fn in_memory_installations_conform() {
        test_installation_repository(&InMemoryInstallationRepo::new()).await;
    }

    #[tokio::test]
    async fn in_memory_tags_conform() {
        test_tag_repository(&InMemoryTagRepo::new()).await;
    }

    #[tokio::test]
    async fn in_memory_upgrade_records_conform() {
        test_upgrade_record_repository(&InMemoryUpgradeRecordRepo::new()).await;
    }
}
