use std::time::Duration;

use tracing::{debug, info};

use super::{bounded, DEFAULT_OP_TIMEOUT};
use crate::validate::validate_key;
use crate::{
    Clock, NewUpgradeRecord, StoreError, SystemClock, UpgradeRecord, UpgradeRecordRepository,
};

/// Ledger of applied upgrade steps, keyed by caller-supplied name.
///
/// Names are never generated. Records are not expected to change once
/// written; `update` exists to correct an `applied_at` stamp.
pub struct UpgradeStore<R: UpgradeRecordRepository, C: Clock = SystemClock> {
    repo: R,
    clock: C,
    timeout: Duration,
}

impl<R: UpgradeRecordRepository> UpgradeStore<R> {
    pub fn with_defaults(repo: R) -> Self {
        Self::new(repo, SystemClock)
    }
}

impl<R: UpgradeRecordRepository, C: Clock> UpgradeStore<R, C> {
    pub fn new(repo: R, clock: C) -> Self {
        Self {
            repo,
            clock,
            timeout: DEFAULT_OP_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn create(&self, input: NewUpgradeRecord) -> Result<UpgradeRecord, StoreError> {
        validate_key("name", &input.name)?;
        let record = UpgradeRecord {
            applied_at: input.applied_at.unwrap_or_else(|| self.clock.now()),
            name: input.name,
        };
        bounded(self.timeout, "upgrade.create", self.repo.insert(record.clone())).await?;
        info!(name = %record.name, "upgrade recorded");
        Ok(record)
    }

    pub async fn find_by_id(&self, name: &str) -> Result<Option<UpgradeRecord>, StoreError> {
        let found = bounded(self.timeout, "upgrade.find_by_id", self.repo.get(name)).await?;
        debug!(name, found = found.is_some(), "upgrade lookup");
        Ok(found)
    }

    /// Overwrite `applied_at` of an existing record.
    pub async fn update(&self, record: UpgradeRecord) -> Result<UpgradeRecord, StoreError> {
        validate_key("name", &record.name)?;
        bounded(self.timeout, "upgrade.update", self.repo.replace(&record)).await?;
        info!(name = %record.name, "upgrade record updated");
        Ok(record)
    }

    /// Remove a record. Deleting an unknown name succeeds.
    pub async fn delete(&self, name: &str) -> Result<(), StoreError> {
        let removed = bounded(self.timeout, "upgrade.delete", self.repo.remove(name)).await?;
        if removed {
            info!(name, "upgrade record deleted");
        } else {
            debug!(name, "upgrade record already absent");
        }
        Ok(())
    }

    /// Every applied upgrade, oldest first.
    pub async fn find_all(&self) -> Result<Vec<UpgradeRecord>, StoreError> {
        bounded(self.timeout, "upgrade.find_all", self.repo.list()).await
    }

    /// Record `name` as applied unless it already is.
    ///
    /// Returns the stored record and whether this call created it.
    pub async fn mark_applied(&self, name: &str) -> Result<(UpgradeRecord, bool), StoreError> {
        if let Some(existing) = self.find_by_id(name).await? {
            return Ok((existing, false));
        }
        let input = NewUpgradeRecord {
            name: name.to_string(),
            applied_at: None,
        };
        match self.create(input).await {
            Ok(record) => Ok((record, true)),
            // Lost a race with another writer; report what it stored.
            Err(StoreError::Conflict { .. }) => match self.find_by_id(name).await? {
                Some(existing) => Ok((existing, false)),
                None => Err(StoreError::Storage(format!(
                    "upgrade {name} conflicted but is absent"
                ))),
            },
            Err(e) => Err(e),
        }
    }
}
