//! Artifact store — versioned binary/content payloads keyed by
//! (app, user, session, filename).
//!
//! A filename prefixed `user:` is session-independent within the user's
//! namespace; any other filename is scoped to one session. Every save
//! appends a new version; loads default to the latest.

use std::collections::HashMap;

use async_trait::async_trait;
use canopy_core::content::Part;
use canopy_core::state::USER_PREFIX;
use canopy_core::SessionError;
use tokio::sync::RwLock;
use tracing::debug;

/// The artifact store contract.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Save a part as a new version; returns the version number.
    async fn save_artifact(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
        filename: &str,
        part: Part,
    ) -> Result<u64, SessionError>;

    /// Load a version (latest when None).
    async fn load_artifact(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
        filename: &str,
        version: Option<u64>,
    ) -> Result<Option<Part>, SessionError>;

    /// Filenames visible to this session (session-scoped + user-scoped).
    async fn list_artifact_keys(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
    ) -> Result<Vec<String>, SessionError>;

    /// Delete all versions of a filename.
    async fn delete_artifact(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
        filename: &str,
    ) -> Result<(), SessionError>;

    /// All stored versions of a filename.
    async fn list_versions(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
        filename: &str,
    ) -> Result<Vec<u64>, SessionError>;
}

/// In-memory artifact store.
pub struct InMemoryArtifactStore {
    artifacts: RwLock<HashMap<String, Vec<Part>>>,
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self {
            artifacts: RwLock::new(HashMap::new()),
        }
    }

    fn path(app_name: &str, user_id: &str, session_id: &str, filename: &str) -> String {
        if filename.starts_with(USER_PREFIX) {
            format!("{app_name}/{user_id}/user/{filename}")
        } else {
            format!("{app_name}/{user_id}/{session_id}/{filename}")
        }
    }
}

impl Default for InMemoryArtifactStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    async fn save_artifact(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
        filename: &str,
        part: Part,
    ) -> Result<u64, SessionError> {
        let path = Self::path(app_name, user_id, session_id, filename);
        let mut artifacts = self.artifacts.write().await;
        let versions = artifacts.entry(path).or_default();
        versions.push(part);
        let version = (versions.len() - 1) as u64;
        debug!(filename, version, "Saved artifact");
        Ok(version)
    }

    async fn load_artifact(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
        filename: &str,
        version: Option<u64>,
    ) -> Result<Option<Part>, SessionError> {
        let path = Self::path(app_name, user_id, session_id, filename);
        let artifacts = self.artifacts.read().await;
        let Some(versions) = artifacts.get(&path) else {
            return Ok(None);
        };
        let part = match version {
            Some(v) => versions.get(v as usize),
            None => versions.last(),
        };
        Ok(part.cloned())
    }

    async fn list_artifact_keys(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
    ) -> Result<Vec<String>, SessionError> {
        let session_prefix = format!("{app_name}/{user_id}/{session_id}/");
        let user_prefix = format!("{app_name}/{user_id}/user/");

        let artifacts = self.artifacts.read().await;
        let mut keys: Vec<String> = artifacts
            .keys()
            .filter_map(|path| {
                path.strip_prefix(&session_prefix)
                    .or_else(|| path.strip_prefix(&user_prefix))
                    .map(str::to_string)
            })
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn delete_artifact(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
        filename: &str,
    ) -> Result<(), SessionError> {
        let path = Self::path(app_name, user_id, session_id, filename);
        self.artifacts.write().await.remove(&path);
        Ok(())
    }

    async fn list_versions(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
        filename: &str,
    ) -> Result<Vec<u64>, SessionError> {
        let path = Self::path(app_name, user_id, session_id, filename);
        let artifacts = self.artifacts.read().await;
        let count = artifacts.get(&path).map(Vec::len).unwrap_or(0);
        Ok((0..count as u64).collect())
    }
}
