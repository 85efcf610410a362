//! VCD Launcher
//!
//! Launches per-user desktop application containers. Provides:
//! - Application catalog (application key -> image)
//! - Launch profiles (shared memory, seccomp document for chrome)
//! - Launch policy (request -> fully resolved container spec)
//! - Runtime bridge (create + start through Docker, with deadlines)

pub mod catalog;
pub mod config;
pub mod error;
pub mod policy;
pub mod profile;
pub mod runtime;
pub mod test_runtime;

pub use catalog::*;
pub use config::*;
pub use error::*;
pub use policy::*;
pub use profile::*;
pub use runtime::*;
pub use test_runtime::{RecordingRuntime, RuntimeCall};

use std::sync::Arc;
use tracing::info;

/// Policy and launcher wired together: the whole launch path for one request
pub struct AppLauncher {
    policy: LaunchPolicy,
    launcher: RuntimeLauncher,
}

impl AppLauncher {
    pub fn new(policy: LaunchPolicy, launcher: RuntimeLauncher) -> Self {
        Self { policy, launcher }
    }

    /// Build from configuration with the given runtime and document loader
    pub fn from_config(
        config: &LauncherConfig,
        runtime: Arc<dyn ContainerRuntime>,
        loader: Arc<dyn SecurityDocumentLoader>,
    ) -> Self {
        Self {
            policy: LaunchPolicy::from_config(config, loader),
            launcher: RuntimeLauncher::new(runtime, config.runtime_timeout),
        }
    }

    pub fn policy(&self) -> &LaunchPolicy {
        &self.policy
    }

    /// Resolve the request and start its container.
    ///
    /// Policy failures return before the runtime is contacted.
    pub async fn launch(&self, request: &LaunchRequest) -> Result<ContainerHandle> {
        let spec = self.policy.resolve_request(request).await?;
        let handle = self.launcher.launch(&spec).await?;
        info!(
            user = %request.user,
            app = %request.app,
            container = %spec.name,
            "Application launched"
        );
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn launcher(runtime: &RecordingRuntime) -> AppLauncher {
        AppLauncher::from_config(
            &LauncherConfig::default(),
            Arc::new(runtime.clone()),
            Arc::new(StaticDocumentLoader::new(json!({"defaultAction": "SCMP_ACT_ERRNO"}))),
        )
    }

    #[tokio::test]
    async fn test_launch_passes_resolved_spec_to_runtime() {
        let runtime = RecordingRuntime::new();
        launcher(&runtime)
            .launch(&LaunchRequest::new("alice", "thunderbird"))
            .await
            .unwrap();

        let specs = runtime.specs();
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].image, "rayvtoll/vcd-thunderbird:latest");
        assert_eq!(specs[0].shm_size, DEFAULT_SHM_SIZE);
        assert_eq!(runtime.start_count(), 1);
    }

    #[tokio::test]
    async fn test_invalid_requests_never_reach_runtime() {
        let runtime = RecordingRuntime::new();
        let launcher = launcher(&runtime);

        let err = launcher
            .launch(&LaunchRequest::new("alice", "emacs"))
            .await
            .unwrap_err();
        assert!(matches!(err, LaunchError::InvalidApplication(_)));

        let err = launcher
            .launch(&LaunchRequest::new("../etc", "firefox"))
            .await
            .unwrap_err();
        assert!(matches!(err, LaunchError::InvalidUser(_)));

        assert!(runtime.calls().is_empty());
    }
}
