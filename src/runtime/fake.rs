//! In-memory runtime adapter backing the test suite.
//!
//! Tracks created and removed resources, records every call as an
//! `(operation, target)` pair so tests can assert ordering and
//! short-circuit behavior, and lets tests inject failures per
//! operation/target.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use super::{
    ContainerCreateSpec, ContainerFilter, ContainerHandle, ContainerRuntime, NetworkCreateSpec,
    NetworkHandle, RuntimeResult, StatsSnapshot,
};
use crate::error::RuntimeCallError;
use crate::types::{ContainerSummary, ImageSummary, NetworkSummary, SystemInfo, VersionInfo};

#[derive(Debug, Clone)]
struct FakeContainer {
    id: String,
    name: String,
    spec: ContainerCreateSpec,
    state: &'static str,
}

#[derive(Debug, Clone)]
struct FakeNetwork {
    id: String,
    spec: NetworkCreateSpec,
}

#[derive(Default)]
struct FakeState {
    containers: Vec<FakeContainer>,
    networks: Vec<FakeNetwork>,
    images: Vec<ImageSummary>,
    stats: HashMap<String, StatsSnapshot>,
    logs: HashMap<String, String>,
    calls: Vec<(String, String)>,
    failures: HashMap<(&'static str, String), String>,
    system_info: SystemInfo,
    version: VersionInfo,
}

/// Test double for [`ContainerRuntime`].
#[derive(Default)]
pub struct FakeRuntime {
    state: Mutex<FakeState>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make every subsequent `operation` call against `target` fail.
    pub fn fail_on(&self, operation: &'static str, target: &str, message: &str) {
        self.lock()
            .failures
            .insert((operation, target.to_string()), message.to_string());
    }

    /// Every adapter call so far, in order, as `(operation, target)`.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.lock().calls.clone()
    }

    pub fn container_names(&self) -> Vec<String> {
        self.lock().containers.iter().map(|c| c.name.clone()).collect()
    }

    pub fn network_names(&self) -> Vec<String> {
        self.lock()
            .networks
            .iter()
            .map(|n| n.spec.name.clone())
            .collect()
    }

    pub fn container_state(&self, name: &str) -> Option<String> {
        self.lock()
            .containers
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.state.to_string())
    }

    /// The creation spec a container was created with, for derivation
    /// assertions.
    pub fn container_spec(&self, name: &str) -> Option<ContainerCreateSpec> {
        self.lock()
            .containers
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.spec.clone())
    }

    pub fn seed_container(&self, name: &str, image: &str, state: &'static str) {
        let mut state_guard = self.lock();
        state_guard.containers.push(FakeContainer {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            spec: ContainerCreateSpec {
                name: name.to_string(),
                image: image.to_string(),
                ..Default::default()
            },
            state,
        });
    }

    pub fn seed_image(&self, tag: &str, size_bytes: u64) {
        self.lock().images.push(ImageSummary {
            id: Uuid::new_v4().to_string(),
            tags: vec![tag.to_string()],
            size_bytes,
        });
    }

    pub fn seed_stats(&self, container_name: &str, snapshot: StatsSnapshot) {
        self.lock()
            .stats
            .insert(container_name.to_string(), snapshot);
    }

    pub fn seed_logs(&self, container_name: &str, logs: &str) {
        self.lock()
            .logs
            .insert(container_name.to_string(), logs.to_string());
    }

    pub fn set_system_info(&self, info: SystemInfo) {
        self.lock().system_info = info;
    }

    pub fn set_version(&self, version: VersionInfo) {
        self.lock().version = version;
    }
}

impl FakeState {
    fn record(
        &mut self,
        operation: &'static str,
        target: &str,
    ) -> Result<(), RuntimeCallError> {
        self.calls.push((operation.to_string(), target.to_string()));
        match self.failures.get(&(operation, target.to_string())) {
            Some(message) => Err(RuntimeCallError::new(operation, target, message)),
            None => Ok(()),
        }
    }

    fn container_mut(
        &mut self,
        operation: &'static str,
        handle: &ContainerHandle,
    ) -> Result<&mut FakeContainer, RuntimeCallError> {
        self.containers
            .iter_mut()
            .find(|c| c.id == handle.id)
            .ok_or_else(|| RuntimeCallError::new(operation, &handle.name, "no such container"))
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn list_containers(
        &self,
        filter: ContainerFilter,
    ) -> RuntimeResult<Vec<ContainerSummary>> {
        let mut state = self.lock();
        state.record("list_containers", "all containers")?;
        Ok(state
            .containers
            .iter()
            .filter(|c| filter.all || c.state == "running")
            .map(|c| ContainerSummary {
                id: c.id.clone(),
                name: c.name.clone(),
                image: c.spec.image.clone(),
                state: c.state.to_string(),
                status: c.state.to_string(),
                ports: c
                    .spec
                    .port_bindings
                    .iter()
                    .map(|b| format!("{}:{}", b.host_port, b.container_port))
                    .collect(),
            })
            .collect())
    }

    async fn find_container_by_name(&self, name: &str) -> RuntimeResult<Option<ContainerHandle>> {
        let mut state = self.lock();
        state.record("find_container_by_name", name)?;
        Ok(state
            .containers
            .iter()
            .find(|c| c.name == name)
            .map(|c| ContainerHandle {
                id: c.id.clone(),
                name: c.name.clone(),
            }))
    }

    async fn create_container(&self, spec: &ContainerCreateSpec) -> RuntimeResult<ContainerHandle> {
        let mut state = self.lock();
        state.record("create_container", &spec.name)?;
        if state.containers.iter().any(|c| c.name == spec.name) {
            return Err(RuntimeCallError::new(
                "create_container",
                &spec.name,
                "container name already in use",
            ));
        }
        let id = Uuid::new_v4().to_string();
        state.containers.push(FakeContainer {
            id: id.clone(),
            name: spec.name.clone(),
            spec: spec.clone(),
            state: "created",
        });
        Ok(ContainerHandle {
            id,
            name: spec.name.clone(),
        })
    }

    async fn start_container(&self, handle: &ContainerHandle) -> RuntimeResult<()> {
        let mut state = self.lock();
        state.record("start_container", &handle.name)?;
        state.container_mut("start_container", handle)?.state = "running";
        Ok(())
    }

    async fn stop_container(&self, handle: &ContainerHandle) -> RuntimeResult<()> {
        let mut state = self.lock();
        state.record("stop_container", &handle.name)?;
        state.container_mut("stop_container", handle)?.state = "exited";
        Ok(())
    }

    async fn restart_container(&self, handle: &ContainerHandle) -> RuntimeResult<()> {
        let mut state = self.lock();
        state.record("restart_container", &handle.name)?;
        state.container_mut("restart_container", handle)?.state = "running";
        Ok(())
    }

    async fn remove_container(&self, handle: &ContainerHandle) -> RuntimeResult<()> {
        let mut state = self.lock();
        state.record("remove_container", &handle.name)?;
        let container = state.container_mut("remove_container", handle)?;
        if container.state == "running" {
            return Err(RuntimeCallError::new(
                "remove_container",
                &handle.name,
                "container is running",
            ));
        }
        state.containers.retain(|c| c.id != handle.id);
        Ok(())
    }

    async fn container_logs(&self, handle: &ContainerHandle, _tail: usize) -> RuntimeResult<String> {
        let mut state = self.lock();
        state.record("container_logs", &handle.name)?;
        state.container_mut("container_logs", handle)?;
        Ok(state.logs.get(&handle.name).cloned().unwrap_or_default())
    }

    async fn get_stats(&self, handle: &ContainerHandle) -> RuntimeResult<StatsSnapshot> {
        let mut state = self.lock();
        state.record("get_stats", &handle.name)?;
        state.container_mut("get_stats", handle)?;
        Ok(state.stats.get(&handle.name).cloned().unwrap_or_default())
    }

    async fn list_images(&self) -> RuntimeResult<Vec<ImageSummary>> {
        let mut state = self.lock();
        state.record("list_images", "all images")?;
        Ok(state.images.clone())
    }

    async fn pull_image(&self, reference: &str) -> RuntimeResult<()> {
        let mut state = self.lock();
        state.record("pull_image", reference)?;
        if !state.images.iter().any(|i| i.tags.iter().any(|t| t == reference)) {
            state.images.push(ImageSummary {
                id: Uuid::new_v4().to_string(),
                tags: vec![reference.to_string()],
                size_bytes: 0,
            });
        }
        Ok(())
    }

    async fn remove_image(&self, reference: &str) -> RuntimeResult<()> {
        let mut state = self.lock();
        state.record("remove_image", reference)?;
        let before = state.images.len();
        state
            .images
            .retain(|i| i.id != reference && !i.tags.iter().any(|t| t == reference));
        if state.images.len() == before {
            return Err(RuntimeCallError::new(
                "remove_image",
                reference,
                "no such image",
            ));
        }
        Ok(())
    }

    async fn list_networks(&self) -> RuntimeResult<Vec<NetworkSummary>> {
        let mut state = self.lock();
        state.record("list_networks", "all networks")?;
        Ok(state
            .networks
            .iter()
            .map(|n| NetworkSummary {
                id: n.id.clone(),
                name: n.spec.name.clone(),
                driver: n.spec.driver.clone(),
            })
            .collect())
    }

    async fn find_network_by_name(&self, name: &str) -> RuntimeResult<Option<NetworkHandle>> {
        let mut state = self.lock();
        state.record("find_network_by_name", name)?;
        Ok(state
            .networks
            .iter()
            .find(|n| n.spec.name == name)
            .map(|n| NetworkHandle {
                id: n.id.clone(),
                name: n.spec.name.clone(),
            }))
    }

    async fn create_network(&self, spec: &NetworkCreateSpec) -> RuntimeResult<NetworkHandle> {
        let mut state = self.lock();
        state.record("create_network", &spec.name)?;
        if state.networks.iter().any(|n| n.spec.name == spec.name) {
            return Err(RuntimeCallError::new(
                "create_network",
                &spec.name,
                "network name already in use",
            ));
        }
        let id = Uuid::new_v4().to_string();
        state.networks.push(FakeNetwork {
            id: id.clone(),
            spec: spec.clone(),
        });
        Ok(NetworkHandle {
            id,
            name: spec.name.clone(),
        })
    }

    async fn remove_network(&self, handle: &NetworkHandle) -> RuntimeResult<()> {
        let mut state = self.lock();
        state.record("remove_network", &handle.name)?;
        let before = state.networks.len();
        state.networks.retain(|n| n.id != handle.id);
        if state.networks.len() == before {
            return Err(RuntimeCallError::new(
                "remove_network",
                &handle.name,
                "no such network",
            ));
        }
        Ok(())
    }

    async fn connect_network(
        &self,
        network: &NetworkHandle,
        container: &ContainerHandle,
    ) -> RuntimeResult<()> {
        let mut state = self.lock();
        state.record("connect_network", &network.name)?;
        if !state.networks.iter().any(|n| n.id == network.id) {
            return Err(RuntimeCallError::new(
                "connect_network",
                &network.name,
                "no such network",
            ));
        }
        state.container_mut("connect_network", container)?;
        Ok(())
    }

    async fn disconnect_network(
        &self,
        network: &NetworkHandle,
        container: &ContainerHandle,
    ) -> RuntimeResult<()> {
        let mut state = self.lock();
        state.record("disconnect_network", &network.name)?;
        if !state.networks.iter().any(|n| n.id == network.id) {
            return Err(RuntimeCallError::new(
                "disconnect_network",
                &network.name,
                "no such network",
            ));
        }
        state.container_mut("disconnect_network", container)?;
        Ok(())
    }

    async fn system_info(&self) -> RuntimeResult<SystemInfo> {
        let mut state = self.lock();
        state.record("system_info", "runtime")?;
        Ok(state.system_info.clone())
    }

    async fn version(&self) -> RuntimeResult<VersionInfo> {
        let mut state = self.lock();
        state.record("version", "runtime")?;
        Ok(state.version.clone())
    }
}
