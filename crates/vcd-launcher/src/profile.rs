//! Per-application launch profiles
//!
//! A profile carries the shared-memory size and the extra security options
//! for one application. Browsers and gimp need a large `/dev/shm` by default
//! (configurable per key); chrome additionally runs under its own seccomp
//! filter, loaded through a [`SecurityDocumentLoader`].

use crate::config::LauncherConfig;
use crate::error::{LaunchError, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Docker's default `/dev/shm` size (64 MiB)
pub const DEFAULT_SHM_SIZE: i64 = 64 * 1024 * 1024;

/// Shared memory for browsers and image editors (2 GiB)
pub const LARGE_SHM_SIZE: i64 = 2 * 1024 * 1024 * 1024;

/// Application that runs under the seccomp document
pub const SECCOMP_APPLICATION: &str = "chrome";

/// Applications that get [`LARGE_SHM_SIZE`] unless configured otherwise
pub const LARGE_SHM_APPLICATIONS: &[&str] = &["chrome", "firefox", "gimp"];

/// Default per-application shared-memory overrides
pub fn default_shm_sizes() -> BTreeMap<String, i64> {
    LARGE_SHM_APPLICATIONS
        .iter()
        .map(|app| (app.to_string(), LARGE_SHM_SIZE))
        .collect()
}

/// Resolved per-application overrides
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LaunchProfile {
    pub shm_size: i64,
    pub security_opts: Vec<String>,
}

impl Default for LaunchProfile {
    fn default() -> Self {
        Self {
            shm_size: DEFAULT_SHM_SIZE,
            security_opts: Vec::new(),
        }
    }
}

/// Shared-memory overrides keyed by application; anything absent gets
/// [`DEFAULT_SHM_SIZE`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProfileTable {
    shm_sizes: BTreeMap<String, i64>,
}

impl ProfileTable {
    pub fn new(shm_sizes: BTreeMap<String, i64>) -> Self {
        Self { shm_sizes }
    }

    pub fn from_config(config: &LauncherConfig) -> Self {
        Self::new(config.shm_sizes.clone())
    }

    pub fn shm_size(&self, application: &str) -> i64 {
        self.shm_sizes
            .get(application)
            .copied()
            .unwrap_or(DEFAULT_SHM_SIZE)
    }

    /// Resolve the profile for a known application key.
    ///
    /// The loader is only consulted for chrome.
    pub async fn profile_for(
        &self,
        application: &str,
        loader: &dyn SecurityDocumentLoader,
    ) -> Result<LaunchProfile> {
        let security_opts = if application == SECCOMP_APPLICATION {
            let document = loader.load().await?;
            vec![seccomp_option(&document)?]
        } else {
            Vec::new()
        };
        Ok(LaunchProfile {
            shm_size: self.shm_size(application),
            security_opts,
        })
    }
}

impl Default for ProfileTable {
    fn default() -> Self {
        Self::new(default_shm_sizes())
    }
}

/// Render a seccomp document as a compact `seccomp=<json>` option
pub fn seccomp_option(document: &Value) -> Result<String> {
    let compact = serde_json::to_string(document)
        .map_err(|e| LaunchError::ProfileLoad(format!("cannot serialize document: {}", e)))?;
    Ok(format!("seccomp={}", compact))
}

/// Source of the security (seccomp) document
#[async_trait]
pub trait SecurityDocumentLoader: Send + Sync {
    async fn load(&self) -> Result<Value>;
}

/// Reads the document from disk on every call
#[derive(Clone, Debug)]
pub struct FileDocumentLoader {
    path: PathBuf,
}

impl FileDocumentLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SecurityDocumentLoader for FileDocumentLoader {
    async fn load(&self) -> Result<Value> {
        let bytes = tokio::fs::read(&self.path).await.map_err(|e| {
            LaunchError::ProfileLoad(format!("{}: {}", self.path.display(), e))
        })?;
        let document = serde_json::from_slice(&bytes).map_err(|e| {
            LaunchError::ProfileLoad(format!("{}: invalid JSON: {}", self.path.display(), e))
        })?;
        debug!(path = %self.path.display(), "Loaded security document");
        Ok(document)
    }
}

/// Caches the first document the inner loader returns.
///
/// Failures are not cached, so a missing file can be fixed without a restart.
pub struct CachedDocumentLoader<L> {
    inner: L,
    cached: RwLock<Option<Value>>,
}

impl<L: SecurityDocumentLoader> CachedDocumentLoader<L> {
    pub fn new(inner: L) -> Self {
        Self {
            inner,
            cached: RwLock::new(None),
        }
    }

    pub fn is_cached(&self) -> bool {
        self.cached.read().is_some()
    }
}

#[async_trait]
impl<L: SecurityDocumentLoader> SecurityDocumentLoader for CachedDocumentLoader<L> {
    async fn load(&self) -> Result<Value> {
        let cached = self.cached.read().clone();
        if let Some(document) = cached {
            return Ok(document);
        }

        let document = self.inner.load().await?;
        *self.cached.write() = Some(document.clone());
        info!("Security document cached");
        Ok(document)
    }
}

/// Fixed in-memory document
#[derive(Clone, Debug)]
pub struct StaticDocumentLoader {
    document: Value,
}

impl StaticDocumentLoader {
    pub fn new(document: Value) -> Self {
        Self { document }
    }
}

#[async_trait]
impl SecurityDocumentLoader for StaticDocumentLoader {
    async fn load(&self) -> Result<Value> {
        Ok(self.document.clone())
    }
}
