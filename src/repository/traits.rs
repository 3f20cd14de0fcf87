use crate::{
    error::RemoteResult,
    gitlab::{Project, Reference},
};

/// Read access to the hosting service the repository is mirrored from
pub trait RemoteState {
    /// List one page of projects. Pages start at 1.
    /// A page shorter than `per_page` is the last one.
    fn list_projects(&self, page: u32, per_page: u32) -> RemoteResult<Vec<Project>>;

    /// List the branches of a project.
    fn list_branches(&self, project_id: u64) -> RemoteResult<Vec<Reference>>;

    /// List the tags of a project.
    fn list_tags(&self, project_id: u64) -> RemoteResult<Vec<Reference>>;

    /// Fetch the raw content of `path` at `commit_id`.
    /// Returns `RemoteError::NotFound` if the file does not exist at that commit.
    fn fetch_file(&self, project_id: u64, commit_id: &str, path: &str) -> RemoteResult<Vec<u8>>;
}
