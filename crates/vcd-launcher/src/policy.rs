//! Launch policy
//!
//! Turns a `(user, application)` pair into a fully resolved [`LaunchSpec`]:
//! image, container name and hostname, environment, bind mounts, network,
//! shared memory and security options.
//!
//! The policy itself is pure. The only I/O is the security document read
//! for chrome, which goes through the injected [`SecurityDocumentLoader`].

use crate::catalog::ApplicationCatalog;
use crate::config::LauncherConfig;
use crate::error::{LaunchError, Result};
use crate::profile::{ProfileTable, SecurityDocumentLoader};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Longest accepted user name
pub const MAX_USER_LEN: usize = 32;

/// Body of a launch request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchRequest {
    pub user: String,
    pub app: String,
}

impl LaunchRequest {
    pub fn new(user: impl Into<String>, app: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            app: app.into(),
        }
    }
}

/// Host path bound into the container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindMount {
    pub source: String,
    pub target: String,
    pub read_only: bool,
}

impl BindMount {
    fn read_write(source: String, target: String) -> Self {
        Self {
            source,
            target,
            read_only: false,
        }
    }

    fn read_only(source: String, target: String) -> Self {
        Self {
            source,
            target,
            read_only: true,
        }
    }
}

/// Docker `-v` syntax: `source:target[:ro]`
impl fmt::Display for BindMount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source, self.target)?;
        if self.read_only {
            write!(f, ":ro")?;
        }
        Ok(())
    }
}

/// Everything the runtime needs to create one application container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub name: String,
    pub hostname: String,
    pub image: String,
    pub env: Vec<String>,
    pub mounts: Vec<BindMount>,
    pub network: String,
    pub shm_size: i64,
    pub security_opts: Vec<String>,
    pub tty: bool,
    pub auto_remove: bool,
}

impl LaunchSpec {
    /// Mounts rendered in Docker bind syntax
    pub fn binds(&self) -> Vec<String> {
        self.mounts.iter().map(ToString::to_string).collect()
    }
}

/// Decides how each application is launched
pub struct LaunchPolicy {
    catalog: Arc<ApplicationCatalog>,
    profiles: ProfileTable,
    base_dir: String,
    name_prefix: String,
    network: String,
    loader: Arc<dyn SecurityDocumentLoader>,
}

impl LaunchPolicy {
    pub fn new(
        catalog: Arc<ApplicationCatalog>,
        profiles: ProfileTable,
        base_dir: impl Into<String>,
        name_prefix: impl Into<String>,
        network: impl Into<String>,
        loader: Arc<dyn SecurityDocumentLoader>,
    ) -> Self {
        Self {
            catalog,
            profiles,
            base_dir: base_dir.into(),
            name_prefix: name_prefix.into(),
            network: network.into(),
            loader,
        }
    }

    pub fn from_config(config: &LauncherConfig, loader: Arc<dyn SecurityDocumentLoader>) -> Self {
        Self::new(
            Arc::new(ApplicationCatalog::from_config(config)),
            ProfileTable::from_config(config),
            config.base_dir.clone(),
            config.name_prefix.clone(),
            config.network_name.clone(),
            loader,
        )
    }

    pub fn catalog(&self) -> &ApplicationCatalog {
        &self.catalog
    }

    /// Resolve the launch spec for `user` running `application`
    pub async fn resolve(&self, user: &str, application: &str) -> Result<LaunchSpec> {
        let image = self
            .catalog
            .image(application)
            .ok_or_else(|| LaunchError::InvalidApplication(application.to_string()))?
            .to_string();
        validate_user(user)?;

        let profile = self
            .profiles
            .profile_for(application, self.loader.as_ref())
            .await?;
        let name = format!("{}-{}-{}", self.name_prefix, user, application);

        debug!(
            user = %user,
            application = %application,
            image = %image,
            shm_size = profile.shm_size,
            "Resolved launch spec"
        );

        Ok(LaunchSpec {
            hostname: name.clone(),
            name,
            image,
            env: vec![format!("USER={}", user)],
            mounts: self.mounts_for(user),
            network: self.network.clone(),
            shm_size: profile.shm_size,
            security_opts: profile.security_opts,
            tty: false,
            auto_remove: true,
        })
    }

    pub async fn resolve_request(&self, request: &LaunchRequest) -> Result<LaunchSpec> {
        self.resolve(&request.user, &request.app).await
    }

    /// Home directory, shared `Public` directory and the SSH public key as
    /// the container's `authorized_keys`
    fn mounts_for(&self, user: &str) -> Vec<BindMount> {
        let base = self.base_dir.trim_end_matches('/');
        let home = format!("/home/{}", user);
        vec![
            BindMount::read_write(format!("{}/{}", base, user), home.clone()),
            BindMount::read_write(format!("{}/Public", base), format!("{}/Public", home)),
            BindMount::read_only(
                format!("{}/{}/.ssh/id_rsa.pub", base, user),
                format!("{}/.ssh/authorized_keys", home),
            ),
        ]
    }
}

/// A user name ends up in host paths, a hostname and a container name, so
/// only `[A-Za-z0-9_.-]` is accepted and the first character may not be `.`
/// or `-`.
pub fn validate_user(user: &str) -> Result<()> {
    if user.is_empty() {
        return Err(LaunchError::InvalidUser("user must not be empty".into()));
    }
    if user.len() > MAX_USER_LEN {
        return Err(LaunchError::InvalidUser(format!(
            "user longer than {} characters",
            MAX_USER_LEN
        )));
    }
    let mut chars = user.chars();
    let first_ok = chars
        .next()
        .map(|c| c.is_ascii_alphanumeric() || c == '_')
        .unwrap_or(false);
    let rest_ok = chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if !first_ok || !rest_ok {
        return Err(LaunchError::InvalidUser(format!(
            "'{}' contains characters not allowed in a user name",
            user
        )));
    }
    Ok(())
}
