//! Runtime adapter: the capability interface over the container runtime.
//!
//! Everything above this seam is runtime-agnostic. The live implementation
//! ([`docker::DockerRuntime`]) talks to the Docker Engine API over the local
//! socket; [`fake::FakeRuntime`] is an in-memory double for tests. Operations
//! are one-to-one with runtime calls and fail with a [`RuntimeCallError`]
//! naming the operation and the target resource.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::RuntimeCallError;
use crate::types::{ContainerSummary, ImageSummary, NetworkSummary, SystemInfo, VersionInfo};

pub mod docker;
pub mod fake;

pub use docker::DockerRuntime;
pub use fake::FakeRuntime;

/// Opaque container identity owned by the runtime. Never persisted by the
/// core; resolved by deterministic name lookup on every action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHandle {
    pub id: String,
    pub name: String,
}

/// Opaque network identity owned by the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkHandle {
    pub id: String,
    pub name: String,
}

/// Fully enumerated container creation request. Each field maps onto one
/// documented runtime knob; there is no pass-through option bag.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContainerCreateSpec {
    /// Runtime-visible name, already namespace-prefixed by the caller.
    pub name: String,
    pub image: String,
    /// Argv tokens overriding the image command.
    pub command: Option<Vec<String>>,
    /// `KEY=value` pairs.
    pub env: Vec<String>,
    /// Container-side port keys to expose, e.g. `80/tcp`.
    pub exposed_ports: Vec<String>,
    pub port_bindings: Vec<PortBindingSpec>,
    /// Bind-mount strings `absoluteHostPath:containerPath`.
    pub binds: Vec<String>,
    /// Passed to the runtime verbatim when set.
    pub network_mode: Option<String>,
}

/// One host-to-container port binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortBindingSpec {
    /// Container-side key, e.g. `80/tcp`.
    pub container_port: String,
    pub host_port: String,
}

/// Fully enumerated network creation request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NetworkCreateSpec {
    /// Runtime-visible name, already namespace-prefixed by the caller.
    pub name: String,
    pub driver: String,
    pub options: HashMap<String, String>,
}

/// Filter for container listings.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContainerFilter {
    /// Include stopped containers.
    pub all: bool,
}

/// Raw cumulative counter readings for one container: the current reading
/// plus the runtime's previous one, so rates can be derived delta-over-delta.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub cpu: CpuCounters,
    pub precpu: CpuCounters,
    pub memory: MemoryCounters,
    /// Interface name to receive/transmit byte counters.
    pub networks: HashMap<String, NetworkCounters>,
    pub blkio: Vec<BlkioEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CpuCounters {
    /// Cumulative CPU time consumed by the container, in nanoseconds.
    pub total_usage: u64,
    /// Cumulative CPU time of the whole host at the same instant.
    pub system_usage: u64,
    /// CPU count as reported by the runtime, when it reports one.
    pub online_cpus: Option<u32>,
    /// Per-CPU usage array; its length is the CPU-count fallback.
    pub percpu_usage: Vec<u64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryCounters {
    pub usage: u64,
    pub limit: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkCounters {
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

/// One block-I/O accounting entry. `op` uses the runtime's own tag names
/// (`Read`, `Write`, ...) and matching is case-sensitive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlkioEntry {
    pub op: String,
    pub value: u64,
}

/// Result alias for adapter calls.
pub type RuntimeResult<T> = std::result::Result<T, RuntimeCallError>;

/// Capability interface abstracting the external container runtime.
///
/// Implementations are stateless, concurrency-safe shared dependencies:
/// the core issues strictly ordered calls within one reconciliation action
/// and may fan out stats calls concurrently.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    // Containers
    async fn list_containers(&self, filter: ContainerFilter) -> RuntimeResult<Vec<ContainerSummary>>;
    async fn find_container_by_name(&self, name: &str) -> RuntimeResult<Option<ContainerHandle>>;
    async fn create_container(&self, spec: &ContainerCreateSpec) -> RuntimeResult<ContainerHandle>;
    async fn start_container(&self, handle: &ContainerHandle) -> RuntimeResult<()>;
    async fn stop_container(&self, handle: &ContainerHandle) -> RuntimeResult<()>;
    async fn restart_container(&self, handle: &ContainerHandle) -> RuntimeResult<()>;
    async fn remove_container(&self, handle: &ContainerHandle) -> RuntimeResult<()>;
    async fn container_logs(&self, handle: &ContainerHandle, tail: usize) -> RuntimeResult<String>;
    async fn get_stats(&self, handle: &ContainerHandle) -> RuntimeResult<StatsSnapshot>;

    // Images
    async fn list_images(&self) -> RuntimeResult<Vec<ImageSummary>>;
    async fn pull_image(&self, reference: &str) -> RuntimeResult<()>;
    async fn remove_image(&self, reference: &str) -> RuntimeResult<()>;

    // Networks
    async fn list_networks(&self) -> RuntimeResult<Vec<NetworkSummary>>;
    async fn find_network_by_name(&self, name: &str) -> RuntimeResult<Option<NetworkHandle>>;
    async fn create_network(&self, spec: &NetworkCreateSpec) -> RuntimeResult<NetworkHandle>;
    async fn remove_network(&self, handle: &NetworkHandle) -> RuntimeResult<()>;
    async fn connect_network(&self, network: &NetworkHandle, container: &ContainerHandle)
        -> RuntimeResult<()>;
    async fn disconnect_network(&self, network: &NetworkHandle, container: &ContainerHandle)
        -> RuntimeResult<()>;

    // System
    async fn system_info(&self) -> RuntimeResult<SystemInfo>;
    async fn version(&self) -> RuntimeResult<VersionInfo>;
}
