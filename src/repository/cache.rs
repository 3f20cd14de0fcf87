use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use anyhow::Result;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use super::{
    snapshot::{Packages, Snapshot},
    Descriptor,
};
use crate::gitlab::Reference;

#[derive(Debug, Default)]
struct CacheState {
    /// project id -> last activity fully reconciled
    project_last_activity: HashMap<u64, DateTime<Utc>>,
    /// project id -> reference name -> commit id last reconciled
    project_reference_commit: HashMap<u64, HashMap<String, String>>,
    packages: Packages,
    /// Cleared on every mutation, rebuilt lazily
    snapshot: Option<Arc<Snapshot>>,
    modified: Option<DateTime<Utc>>,
}

/// Package index plus the watermarks used to detect remote changes.
///
/// Everything lives behind one reader/writer lock and every mutation is a
/// single critical section that also drops the current snapshot.
#[derive(Debug, Default)]
pub struct PackageCache {
    state: RwLock<CacheState>,
}

impl PackageCache {
    pub fn new() -> Self {
        Self::default()
    }

    // Critical sections never leave the state half-updated, so a poisoned
    // lock still guards consistent data.
    fn read(&self) -> RwLockReadGuard<'_, CacheState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, CacheState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether `last_activity` is newer than the project's watermark.
    /// Unknown projects are always stale.
    pub fn is_stale(&self, project_id: u64, last_activity: DateTime<Utc>) -> bool {
        match self.read().project_last_activity.get(&project_id) {
            Some(watermark) => last_activity > *watermark,
            None => true,
        }
    }

    /// Whether `reference` points at a commit other than the last reconciled one
    pub fn reference_changed(&self, project_id: u64, reference: &Reference) -> bool {
        let state = self.read();
        let known = state
            .project_reference_commit
            .get(&project_id)
            .and_then(|commits| commits.get(&reference.name));
        known != Some(&reference.commit.id)
    }

    /// Store the descriptor for `package`/`version` and record the
    /// reference's commit as reconciled.
    pub fn store_descriptor(
        &self,
        project_id: u64,
        reference: &Reference,
        package: &str,
        version: &str,
        descriptor: Descriptor,
    ) {
        let mut state = self.write();
        state
            .project_reference_commit
            .entry(project_id)
            .or_default()
            .insert(reference.name.clone(), reference.commit.id.clone());
        state
            .packages
            .entry(package.to_string())
            .or_default()
            .insert(version.to_string(), Arc::new(descriptor));
        state.snapshot = None;
    }

    /// Advance the project's activity watermark
    pub fn mark_project_reconciled(&self, project_id: u64, last_activity: DateTime<Utc>) {
        let mut state = self.write();
        state.project_last_activity.insert(project_id, last_activity);
        state.snapshot = None;
    }

    pub fn descriptor(&self, package: &str, version: &str) -> Option<Arc<Descriptor>> {
        self.read()
            .packages
            .get(package)
            .and_then(|versions| versions.get(version))
            .cloned()
    }

    pub fn package_count(&self) -> usize {
        self.read().packages.len()
    }

    pub fn version_count(&self) -> usize {
        self.read().packages.values().map(|versions| versions.len()).sum()
    }

    /// Current serialized view of the cache, regenerated if a mutation
    /// invalidated it.
    pub fn snapshot(&self) -> Result<Arc<Snapshot>> {
        if let Some(snapshot) = self.read().snapshot.as_ref() {
            return Ok(Arc::clone(snapshot));
        }

        let mut state = self.write();
        // Another caller may have rebuilt it while we waited for the lock
        if let Some(snapshot) = state.snapshot.as_ref() {
            return Ok(Arc::clone(snapshot));
        }

        let snapshot = Arc::new(Snapshot::render(&state.packages)?);
        tracing::debug!(
            bytes = snapshot.len(),
            packages = state.packages.len(),
            "Regenerated packages snapshot"
        );
        state.modified = Some(snapshot.modified());
        state.snapshot = Some(Arc::clone(&snapshot));
        Ok(snapshot)
    }

    pub fn content(&self) -> Result<Bytes> {
        Ok(self.snapshot()?.content())
    }

    /// Time the last snapshot was generated, `None` before the first one
    pub fn modified_time(&self) -> Option<DateTime<Utc>> {
        self.read().modified
    }

    pub fn has_snapshot(&self) -> bool {
        self.read().snapshot.is_some()
    }
}
