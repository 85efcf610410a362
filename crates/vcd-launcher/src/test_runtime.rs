//! In-memory container runtime for integration testing

use crate::error::{LaunchError, Result};
use crate::policy::LaunchSpec;
use crate::runtime::{ContainerHandle, ContainerRuntime};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// One call received by a [`RecordingRuntime`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeCall {
    /// Container name passed to create
    Create(String),
    /// Container id passed to start
    Start(String),
    /// Container id or name passed to remove
    Remove(String),
}

/// Records every call and enforces unique container names like Docker does
#[derive(Clone, Default)]
pub struct RecordingRuntime {
    inner: Arc<RecordingRuntimeInner>,
}

struct Container {
    id: String,
    running: bool,
}

#[derive(Default)]
struct RecordingRuntimeInner {
    calls: Mutex<Vec<RuntimeCall>>,
    specs: Mutex<Vec<LaunchSpec>>,
    /// Live containers by name
    containers: Mutex<HashMap<String, Container>>,
    next_id: Mutex<u64>,
    create_error: Mutex<Option<String>>,
    start_error: Mutex<Option<String>>,
    delay: Mutex<Option<Duration>>,
}

impl RecordingRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<RuntimeCall> {
        self.inner.calls.lock().clone()
    }

    /// Specs received by successful or failed create calls
    pub fn specs(&self) -> Vec<LaunchSpec> {
        self.inner.specs.lock().clone()
    }

    pub fn create_count(&self) -> usize {
        self.count(|c| matches!(c, RuntimeCall::Create(_)))
    }

    pub fn start_count(&self) -> usize {
        self.count(|c| matches!(c, RuntimeCall::Start(_)))
    }

    pub fn remove_count(&self) -> usize {
        self.count(|c| matches!(c, RuntimeCall::Remove(_)))
    }

    /// Names of containers that exist right now
    pub fn container_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.inner.containers.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Every following create fails with `message`
    pub fn fail_create(&self, message: &str) {
        *self.inner.create_error.lock() = Some(message.to_string());
    }

    /// Every following start fails with `message`
    pub fn fail_start(&self, message: &str) {
        *self.inner.start_error.lock() = Some(message.to_string());
    }

    /// Clear injected failures
    pub fn recover(&self) {
        *self.inner.create_error.lock() = None;
        *self.inner.start_error.lock() = None;
    }

    /// Sleep this long before answering any call
    pub fn set_delay(&self, delay: Duration) {
        *self.inner.delay.lock() = Some(delay);
    }

    fn count(&self, pred: impl Fn(&RuntimeCall) -> bool) -> usize {
        self.inner.calls.lock().iter().filter(|c| pred(*c)).count()
    }

    async fn maybe_delay(&self) {
        let delay = *self.inner.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl ContainerRuntime for RecordingRuntime {
    async fn create_container(&self, spec: &LaunchSpec) -> Result<ContainerHandle> {
        self.maybe_delay().await;

        self.inner
            .calls
            .lock()
            .push(RuntimeCall::Create(spec.name.clone()));
        self.inner.specs.lock().push(spec.clone());

        if let Some(message) = self.inner.create_error.lock().clone() {
            return Err(LaunchError::Runtime(message));
        }

        let mut containers = self.inner.containers.lock();
        if containers.contains_key(&spec.name) {
            return Err(LaunchError::Runtime(format!(
                "Conflict. The container name \"/{}\" is already in use",
                spec.name
            )));
        }

        let id = {
            let mut next_id = self.inner.next_id.lock();
            *next_id += 1;
            format!("{:064x}", *next_id)
        };
        containers.insert(
            spec.name.clone(),
            Container {
                id: id.clone(),
                running: false,
            },
        );
        Ok(ContainerHandle::new(id))
    }

    async fn start_container(&self, handle: &ContainerHandle) -> Result<()> {
        self.maybe_delay().await;

        self.inner
            .calls
            .lock()
            .push(RuntimeCall::Start(handle.id.clone()));

        if let Some(message) = self.inner.start_error.lock().clone() {
            return Err(LaunchError::Runtime(message));
        }

        let mut containers = self.inner.containers.lock();
        match containers.values_mut().find(|c| c.id == handle.id) {
            Some(container) => {
                container.running = true;
                Ok(())
            }
            None => Err(LaunchError::Runtime(format!(
                "No such container: {}",
                handle.id
            ))),
        }
    }

    async fn remove_container(&self, handle: &ContainerHandle, force: bool) -> Result<()> {
        self.maybe_delay().await;

        self.inner
            .calls
            .lock()
            .push(RuntimeCall::Remove(handle.id.clone()));

        let mut containers = self.inner.containers.lock();
        let name = containers
            .iter()
            .find(|(name, c)| c.id == handle.id || **name == handle.id)
            .map(|(name, c)| (name.clone(), c.running));

        match name {
            None => Ok(()),
            Some((name, true)) if !force => Err(LaunchError::Runtime(format!(
                "You cannot remove a running container {}",
                name
            ))),
            Some((name, _)) => {
                containers.remove(&name);
                Ok(())
            }
        }
    }
}
