use std::sync::Arc;

use anyhow::{Context, Result};
use bytes::Bytes;
use chrono::{DateTime, Utc};

use super::{classify, Descriptor, PackageCache, RemoteState, Snapshot, Source};
use crate::gitlab::{Project, Reference};

/// Tuning knobs for the reconciliation loop
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Projects requested per page
    pub per_page: u32,
    /// File holding the package metadata in each repository
    pub descriptor_path: String,
    /// Keep a project's activity watermark in place while any of its
    /// references failed, so those references are retried next cycle.
    ///
    /// A reference whose descriptor stays broken keeps its project stale:
    /// the project's branches and tags are listed and that descriptor is
    /// fetched again on every cycle until it is fixed upstream. Turn this
    /// off to wait for the next project activity instead.
    pub retry_failed_references: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            per_page: 100,
            descriptor_path: "composer.json".to_string(),
            retry_failed_references: true,
        }
    }
}

/// Counters for one `update` cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateSummary {
    pub projects_seen: usize,
    pub projects_refreshed: usize,
    pub projects_failed: usize,
    pub references_refreshed: usize,
    pub references_failed: usize,
}

enum ReferenceOutcome {
    Stored,
    Skipped,
    Failed,
}

/// Composer repository mirrored from a remote hosting service.
///
/// `update` brings the cache in line with the remote, touching only
/// projects whose activity moved and references whose commit moved.
pub struct ComposerRepository<R> {
    remote: R,
    options: EngineOptions,
    cache: Arc<PackageCache>,
}

impl<R: RemoteState> ComposerRepository<R> {
    pub fn new(remote: R, options: EngineOptions) -> Self {
        Self {
            remote,
            options,
            cache: Arc::new(PackageCache::new()),
        }
    }

    /// Shared handle on the cache, for readers such as the HTTP server
    pub fn cache(&self) -> Arc<PackageCache> {
        Arc::clone(&self.cache)
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    pub fn snapshot(&self) -> Result<Arc<Snapshot>> {
        self.cache.snapshot()
    }

    pub fn content(&self) -> Result<Bytes> {
        self.cache.content()
    }

    pub fn modified_time(&self) -> Option<DateTime<Utc>> {
        self.cache.modified_time()
    }

    /// Run one reconciliation cycle.
    ///
    /// Fails only if listing projects fails; per-project and per-reference
    /// failures are logged and retried on a later cycle.
    pub fn update(&self) -> Result<UpdateSummary> {
        let per_page = self.options.per_page;
        let mut summary = UpdateSummary::default();
        let mut page = 1;

        loop {
            let projects = self
                .remote
                .list_projects(page, per_page)
                .with_context(|| format!("Failed to list projects (page {page})"))?;

            for project in &projects {
                summary.projects_seen += 1;
                if self.cache.is_stale(project.id, project.last_activity) {
                    self.refresh_project(project, &mut summary);
                }
            }

            if projects.len() < per_page as usize {
                break;
            }
            page += 1;
        }

        Ok(summary)
    }

    fn refresh_project(&self, project: &Project, summary: &mut UpdateSummary) {
        tracing::info!(
            project_id = project.id,
            "{} ({})",
            project.path_with_namespace,
            project.id
        );

        let branches = match self.remote.list_branches(project.id) {
            Ok(branches) => branches,
            Err(e) => {
                tracing::warn!(
                    project = %project.path_with_namespace,
                    "Failed to list branches: {e}"
                );
                summary.projects_failed += 1;
                return;
            }
        };
        let tags = match self.remote.list_tags(project.id) {
            Ok(tags) => tags,
            Err(e) => {
                tracing::warn!(
                    project = %project.path_with_namespace,
                    "Failed to list tags: {e}"
                );
                summary.projects_failed += 1;
                return;
            }
        };

        let mut failed = 0;
        for reference in branches.iter().chain(tags.iter()) {
            if !self.cache.reference_changed(project.id, reference) {
                continue;
            }
            match self.refresh_reference(project, reference) {
                ReferenceOutcome::Stored => summary.references_refreshed += 1,
                ReferenceOutcome::Skipped => {}
                ReferenceOutcome::Failed => failed += 1,
            }
        }
        summary.references_failed += failed;

        if failed > 0 && self.options.retry_failed_references {
            tracing::warn!(
                project = %project.path_with_namespace,
                failed,
                "Keeping project stale until all references are mirrored"
            );
            summary.projects_failed += 1;
            return;
        }

        self.cache.mark_project_reconciled(project.id, project.last_activity);
        summary.projects_refreshed += 1;
    }

    fn refresh_reference(&self, project: &Project, reference: &Reference) -> ReferenceOutcome {
        let version = classify(&reference.name);
        if version.is_empty() {
            return ReferenceOutcome::Skipped;
        }
        tracing::info!("+ {} ({})", version, reference.name);

        let content = match self.remote.fetch_file(
            project.id,
            &reference.commit.id,
            &self.options.descriptor_path,
        ) {
            Ok(content) => content,
            Err(e) if e.is_not_found() => {
                tracing::debug!(
                    project = %project.path_with_namespace,
                    reference = %reference.name,
                    "No {} at {}",
                    self.options.descriptor_path,
                    reference.commit.id
                );
                return ReferenceOutcome::Skipped;
            }
            Err(e) => {
                tracing::warn!(
                    project = %project.path_with_namespace,
                    reference = %reference.name,
                    "Download error: {e}"
                );
                return ReferenceOutcome::Failed;
            }
        };

        let mut descriptor = match Descriptor::from_slice(&content) {
            Ok(descriptor) => descriptor,
            Err(e) => {
                tracing::warn!(
                    project = %project.path_with_namespace,
                    reference = %reference.name,
                    "Parsing error: {e:#}"
                );
                return ReferenceOutcome::Failed;
            }
        };
        descriptor.set_version(&version);
        descriptor.set_source(&Source::git(&project.ssh_url_to_repo, &reference.commit.id));

        self.cache.store_descriptor(
            project.id,
            reference,
            &project.path_with_namespace,
            &version,
            descriptor,
        );
        ReferenceOutcome::Stored
    }
}
