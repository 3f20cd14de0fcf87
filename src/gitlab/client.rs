use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{blocking::Client, StatusCode, Url};
use serde::de::DeserializeOwned;

use super::{Project, Reference, RepositoryFile};
use crate::{
    error::{RemoteError, RemoteResult},
    repository::RemoteState,
};

/// Blocking client for the GitLab REST API
pub struct GitLabClient {
    /// API root including the version segment, always ending in `/`
    base_url: Url,
    token: String,
    http: Client,
}

impl GitLabClient {
    /// Create a new GitLab client
    ///
    /// `url` is the API root including the version, e.g.
    /// `https://gitlab.com/api/v4/`. The trailing slash is optional.
    pub fn new(url: &str, token: &str, verify_ssl: bool, timeout: Duration) -> Result<Self> {
        let mut url = url.trim().to_string();
        if !url.ends_with('/') {
            url.push('/');
        }
        let base_url = Url::parse(&url).with_context(|| format!("Invalid GitLab API url: {url}"))?;

        let http = Client::builder()
            .user_agent(concat!("gitlab-composer/", env!("CARGO_PKG_VERSION")))
            .danger_accept_invalid_certs(!verify_ssl)
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        if !verify_ssl {
            tracing::warn!("TLS certificate verification disabled for {}", base_url);
        }

        Ok(Self {
            base_url,
            token: token.to_string(),
            http,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn call_project<T: DeserializeOwned>(
        &self,
        project_id: u64,
        resource: &str,
        args: &[(&str, String)],
    ) -> RemoteResult<T> {
        self.call(&format!("projects/{project_id}/{resource}"), args)
    }

    fn call<T: DeserializeOwned>(
        &self,
        resource: &str,
        args: &[(&str, String)],
    ) -> RemoteResult<T> {
        let mut url = self
            .base_url
            .join(resource)
            .map_err(|e| RemoteError::Other(format!("invalid resource {resource}: {e}")))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("private_token", &self.token);
            for (key, value) in args {
                query.append_pair(key, value);
            }
        }

        tracing::debug!(resource, "GitLab API request");
        let response = self.http.get(url).send()?;

        match response.status() {
            StatusCode::OK => {}
            StatusCode::NOT_FOUND => return Err(RemoteError::NotFound),
            status => return Err(RemoteError::Status(status.as_u16())),
        }

        let body = response.bytes()?;
        Ok(serde_json::from_slice(&body)?)
    }
}

impl RemoteState for GitLabClient {
    fn list_projects(&self, page: u32, per_page: u32) -> RemoteResult<Vec<Project>> {
        self.call(
            "projects",
            &[("page", page.to_string()), ("per_page", per_page.to_string())],
        )
    }

    fn list_branches(&self, project_id: u64) -> RemoteResult<Vec<Reference>> {
        self.call_project(project_id, "repository/branches", &[])
    }

    fn list_tags(&self, project_id: u64) -> RemoteResult<Vec<Reference>> {
        self.call_project(project_id, "repository/tags", &[])
    }

    fn fetch_file(&self, project_id: u64, commit_id: &str, path: &str) -> RemoteResult<Vec<u8>> {
        let file: RepositoryFile = self.call_project(
            project_id,
            "repository/files",
            &[("file_path", path.to_string()), ("ref", commit_id.to_string())],
        )?;
        file.decode_content()
    }
}
