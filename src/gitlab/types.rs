use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::RemoteResult;

/// A GitLab project as returned by `GET /projects`
#[derive(Debug, Clone, Deserialize)]
pub struct Project {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    /// Clone URL injected into every descriptor's `source`
    pub ssh_url_to_repo: String,
    #[serde(rename = "last_activity_at")]
    pub last_activity: DateTime<Utc>,
    /// Stable key used as the package name
    pub path_with_namespace: String,
}

/// A branch or a tag
#[derive(Debug, Clone, Deserialize)]
pub struct Reference {
    pub name: String,
    pub commit: Commit,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Commit {
    pub id: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub authored_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub committed_date: Option<DateTime<Utc>>,
}

/// Response of `GET /projects/:id/repository/files`
#[derive(Debug, Clone, Deserialize)]
pub struct RepositoryFile {
    pub file_name: String,
    pub file_path: String,
    pub encoding: String,
    pub content: String,
    #[serde(default)]
    pub blob_id: Option<String>,
    #[serde(default)]
    pub commit_id: Option<String>,
}

impl RepositoryFile {
    /// Decode the base64 `content` field into the raw file bytes
    pub fn decode_content(&self) -> RemoteResult<Vec<u8>> {
        // GitLab may wrap long payloads
        let compact: String = self
            .content
            .chars()
            .filter(|c| !c.is_ascii_whitespace())
            .collect();
        Ok(STANDARD.decode(compact)?)
    }
}

impl Reference {
    pub fn new(name: impl Into<String>, commit_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            commit: Commit {
                id: commit_id.into(),
                message: None,
                authored_date: None,
                committed_date: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_from_api_json() {
        let json = r#"{
            "id": 42,
            "name": "a",
            "description": "ignored",
            "ssh_url_to_repo": "git@gitlab.example.com:org/a.git",
            "last_activity_at": "2016-03-01T10:00:00.000Z",
            "path_with_namespace": "org/a"
        }"#;
        let project: Project = serde_json::from_str(json).unwrap();
        assert_eq!(project.id, 42);
        assert_eq!(project.path_with_namespace, "org/a");
        assert_eq!(
            project.last_activity.to_rfc3339(),
            "2016-03-01T10:00:00+00:00"
        );
    }

    #[test]
    fn test_reference_from_api_json() {
        let json = r#"{"name": "v1.0.0", "commit": {"id": "c1", "message": "release"}, "protected": false}"#;
        let reference: Reference = serde_json::from_str(json).unwrap();
        assert_eq!(reference.name, "v1.0.0");
        assert_eq!(reference.commit.id, "c1");
    }

    #[test]
    fn test_decode_content() {
        let file = RepositoryFile {
            file_name: "composer.json".to_string(),
            file_path: "composer.json".to_string(),
            encoding: "base64".to_string(),
            content: "eyJuYW1lIjoi\nb3JnL2EifQ==".to_string(),
            blob_id: None,
            commit_id: None,
        };
        assert_eq!(file.decode_content().unwrap(), br#"{"name":"org/a"}"#.to_vec());
    }

    #[test]
    fn test_decode_content_invalid() {
        let file = RepositoryFile {
            file_name: "composer.json".to_string(),
            file_path: "composer.json".to_string(),
            encoding: "base64".to_string(),
            content: "not base64!".to_string(),
            blob_id: None,
            commit_id: None,
        };
        assert!(file.decode_content().is_err());
    }
}
