use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::Descriptor;

/// package path -> version -> descriptor
pub(crate) type Packages = BTreeMap<String, BTreeMap<String, Arc<Descriptor>>>;

/// Serialized, immutable view of the package cache
#[derive(Debug, Clone)]
pub struct Snapshot {
    content: Bytes,
    modified: DateTime<Utc>,
}

#[derive(Serialize)]
struct RepositoryDocument<'a> {
    packages: &'a Packages,
}

impl Snapshot {
    /// Serialize `packages` as a Composer repository document
    pub(crate) fn render(packages: &Packages) -> Result<Self> {
        let content = serde_json::to_vec(&RepositoryDocument { packages })
            .context("Failed to serialize packages")?;
        Ok(Self {
            content: Bytes::from(content),
            modified: Utc::now(),
        })
    }

    /// The serialized document. Cloning is cheap.
    pub fn content(&self) -> Bytes {
        self.content.clone()
    }

    pub fn modified(&self) -> DateTime<Utc> {
        self.modified
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}
