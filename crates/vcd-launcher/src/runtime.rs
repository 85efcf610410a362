//! Container runtime bridge
//!
//! [`ContainerRuntime`] is the seam between the launch policy and the
//! container engine. [`DockerRuntime`] talks to the local Docker daemon
//! through bollard; [`RuntimeLauncher`] drives the create -> start sequence
//! with a deadline on each call and removes what a failed launch left behind.

use crate::error::{LaunchError, Result};
use crate::policy::LaunchSpec;
use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, NetworkingConfig, RemoveContainerOptions, StartContainerOptions,
};
use bollard::models::{EndpointSettings, HostConfig};
use bollard::Docker;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Runtime-assigned container identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainerHandle {
    pub id: String,
}

impl ContainerHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    /// First 12 characters, as printed by `docker ps`
    pub fn short_id(&self) -> &str {
        let end = self
            .id
            .char_indices()
            .nth(12)
            .map(|(i, _)| i)
            .unwrap_or(self.id.len());
        &self.id[..end]
    }
}

impl fmt::Display for ContainerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// Create/start/remove primitives of a container engine
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Create (but do not start) a container for the spec
    async fn create_container(&self, spec: &LaunchSpec) -> Result<ContainerHandle>;

    /// Start a previously created container
    async fn start_container(&self, handle: &ContainerHandle) -> Result<()>;

    /// Remove a container by id or name. A missing container is not an
    /// error. Without `force` a running container is left alone.
    async fn remove_container(&self, handle: &ContainerHandle, force: bool) -> Result<()>;
}

/// Docker daemon reached through bollard
#[derive(Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connect to the local Docker daemon and verify it answers
    pub async fn connect() -> anyhow::Result<Self> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| anyhow::anyhow!("Failed to connect to Docker: {}", e))?;

        docker
            .ping()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to ping Docker: {}", e))?;

        info!("Connected to Docker daemon");
        Ok(Self { docker })
    }

    pub fn with_client(docker: Docker) -> Self {
        Self { docker }
    }

    /// Whether a network with this exact name exists
    pub async fn network_exists(&self, network_name: &str) -> anyhow::Result<bool> {
        let networks = self.docker.list_networks::<String>(None).await?;

        let exists = networks
            .iter()
            .any(|n| n.name.as_deref() == Some(network_name));

        if exists {
            debug!(network = %network_name, "Docker network present");
        }
        Ok(exists)
    }
}

/// Translate a launch spec into bollard's create-container payload
pub fn container_config(spec: &LaunchSpec) -> Config<String> {
    let host_config = HostConfig {
        binds: Some(spec.binds()),
        shm_size: Some(spec.shm_size),
        security_opt: Some(spec.security_opts.clone()),
        auto_remove: Some(spec.auto_remove),
        ..Default::default()
    };

    let mut endpoints = HashMap::new();
    endpoints.insert(spec.network.clone(), EndpointSettings::default());

    Config {
        image: Some(spec.image.clone()),
        hostname: Some(spec.hostname.clone()),
        env: Some(spec.env.clone()),
        tty: Some(spec.tty),
        host_config: Some(host_config),
        networking_config: Some(NetworkingConfig {
            endpoints_config: endpoints,
        }),
        ..Default::default()
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn create_container(&self, spec: &LaunchSpec) -> Result<ContainerHandle> {
        let options = CreateContainerOptions {
            name: spec.name.as_str(),
            platform: None,
        };

        let response = self
            .docker
            .create_container(Some(options), container_config(spec))
            .await?;

        for warning in &response.warnings {
            warn!(container = %spec.name, warning = %warning, "Docker create warning");
        }

        Ok(ContainerHandle::new(response.id))
    }

    async fn start_container(&self, handle: &ContainerHandle) -> Result<()> {
        self.docker
            .start_container(&handle.id, None::<StartContainerOptions<String>>)
            .await?;
        Ok(())
    }

    async fn remove_container(&self, handle: &ContainerHandle, force: bool) -> Result<()> {
        let options = RemoveContainerOptions {
            force,
            ..Default::default()
        };

        match self.docker.remove_container(&handle.id, Some(options)).await {
            Ok(_) => {
                debug!(container = %handle.short_id(), "Container removed");
                Ok(())
            }
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Creates and starts containers, one deadline per runtime call
#[derive(Clone)]
pub struct RuntimeLauncher {
    runtime: Arc<dyn ContainerRuntime>,
    timeout: Duration,
}

impl RuntimeLauncher {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, timeout: Duration) -> Self {
        Self { runtime, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Create the container, then start it.
    ///
    /// Not idempotent: a second launch of the same spec asks the runtime for
    /// a second container with the same name.
    ///
    /// A container that was created but never started is removed before the
    /// error is returned, so the name is free for the next launch. After a
    /// create timeout the daemon may still have created it, so the name is
    /// removed too, but only if that container is not running.
    pub async fn launch(&self, spec: &LaunchSpec) -> Result<ContainerHandle> {
        let handle = match tokio::time::timeout(self.timeout, self.runtime.create_container(spec))
            .await
        {
            Ok(created) => created?,
            Err(_) => {
                self.discard(&ContainerHandle::new(spec.name.as_str()), false)
                    .await;
                return Err(self.timed_out("create"));
            }
        };
        debug!(container = %spec.name, id = %handle.short_id(), "Container created");

        if let Err(e) = self
            .bounded("start", self.runtime.start_container(&handle))
            .await
        {
            self.discard(&handle, true).await;
            return Err(e);
        }

        info!(
            container = %spec.name,
            id = %handle.short_id(),
            image = %spec.image,
            "Container started"
        );
        Ok(handle)
    }

    /// Best-effort removal; the launch error is what the caller sees
    async fn discard(&self, handle: &ContainerHandle, force: bool) {
        match self
            .bounded("remove", self.runtime.remove_container(handle, force))
            .await
        {
            Ok(()) => debug!(container = %handle, "Removed container of failed launch"),
            Err(e) => warn!(
                container = %handle,
                error = %e,
                "Could not remove container of failed launch"
            ),
        }
    }

    async fn bounded<T>(&self, operation: &str, call: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(self.timed_out(operation)),
        }
    }

    fn timed_out(&self, operation: &str) -> LaunchError {
        LaunchError::Runtime(format!(
            "{} timed out after {}s",
            operation,
            self.timeout.as_secs_f64()
        ))
    }
}
