//! Stevedore - management core for a Docker container fleet.
//!
//! This crate provides programmatic access to a container runtime behind a
//! typed capability interface, a compose-style reconciliation engine that
//! turns declarative multi-service projects into ordered runtime calls, and
//! a resource-metrics aggregator that derives human-meaningful percentages
//! from the runtime's raw counters.

pub mod compose;
pub mod error;
pub mod metrics;
pub mod reconciler;
pub mod runtime;
pub mod types;

pub use compose::ComposeProject;
pub use error::{ParseError, Result, RuntimeCallError, StevedoreError};
pub use reconciler::ComposeAction;

// Export main types at root level
pub use metrics::{AdminSnapshot, DerivedMetrics};
pub use runtime::{ContainerRuntime, DockerRuntime, FakeRuntime};
pub use types::{ContainerSummary, ImageSummary, NetworkSummary, SystemInfo, VersionInfo};

// Re-export anyhow for compatibility
pub use anyhow;

use chrono::Utc;
use reconciler::Reconciler;
use runtime::{ContainerFilter, ContainerHandle, NetworkCreateSpec, NetworkHandle};
use tracing::info;

/// Core Stevedore API over an injected runtime adapter.
///
/// The adapter is a stateless, concurrency-safe shared dependency; one
/// `Stevedore` value can serve concurrent callers. Handing in a
/// [`FakeRuntime`] gives a fully deterministic in-memory fleet for tests.
#[derive(Clone)]
pub struct Stevedore<R> {
    runtime: R,
}

impl Stevedore<DockerRuntime> {
    /// Connect to the local Docker daemon.
    pub fn connect() -> Result<Self> {
        Ok(Self::with_runtime(DockerRuntime::connect()?))
    }
}

impl<R: ContainerRuntime> Stevedore<R> {
    pub fn with_runtime(runtime: R) -> Self {
        Self { runtime }
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    /// Reconcile a compose definition: parse `definition` under
    /// `project_name` and drive the requested action. Parse errors
    /// short-circuit before any runtime call; a failed runtime call aborts
    /// the remaining steps and is returned with operation and target
    /// context.
    pub async fn reconcile(
        &self,
        definition: &str,
        project_name: &str,
        action: ComposeAction,
    ) -> Result<()> {
        let project = ComposeProject::parse(project_name, definition)?;
        let reconciler = Reconciler::new(&self.runtime);
        match action {
            ComposeAction::Up => reconciler.up(&project).await,
            ComposeAction::Down => reconciler.down(&project).await,
        }
    }

    /// Derived usage metrics for one container, resolved by name.
    pub async fn container_snapshot(&self, name: &str) -> Result<DerivedMetrics> {
        let handle = self.resolve_container(name).await?;
        let snapshot = self.runtime.get_stats(&handle).await?;
        Ok(DerivedMetrics::from_snapshot(&snapshot, Utc::now()))
    }

    /// Fleet-wide aggregate report for the admin dashboard.
    pub async fn admin_snapshot(&self) -> Result<AdminSnapshot> {
        metrics::admin_snapshot(&self.runtime).await
    }

    // --- container passthroughs ---

    pub async fn list_containers(&self, all: bool) -> Result<Vec<ContainerSummary>> {
        Ok(self.runtime.list_containers(ContainerFilter { all }).await?)
    }

    pub async fn start_container(&self, name: &str) -> Result<()> {
        let handle = self.resolve_container(name).await?;
        Ok(self.runtime.start_container(&handle).await?)
    }

    pub async fn stop_container(&self, name: &str) -> Result<()> {
        let handle = self.resolve_container(name).await?;
        Ok(self.runtime.stop_container(&handle).await?)
    }

    pub async fn restart_container(&self, name: &str) -> Result<()> {
        let handle = self.resolve_container(name).await?;
        Ok(self.runtime.restart_container(&handle).await?)
    }

    pub async fn remove_container(&self, name: &str) -> Result<()> {
        let handle = self.resolve_container(name).await?;
        Ok(self.runtime.remove_container(&handle).await?)
    }

    pub async fn container_logs(&self, name: &str, tail: usize) -> Result<String> {
        let handle = self.resolve_container(name).await?;
        Ok(self.runtime.container_logs(&handle, tail).await?)
    }

    // --- image passthroughs ---

    pub async fn list_images(&self) -> Result<Vec<ImageSummary>> {
        Ok(self.runtime.list_images().await?)
    }

    pub async fn pull_image(&self, reference: &str) -> Result<()> {
        info!(image = %reference, "pulling image");
        Ok(self.runtime.pull_image(reference).await?)
    }

    pub async fn remove_image(&self, reference: &str) -> Result<()> {
        Ok(self.runtime.remove_image(reference).await?)
    }

    // --- network passthroughs ---

    pub async fn list_networks(&self) -> Result<Vec<NetworkSummary>> {
        Ok(self.runtime.list_networks().await?)
    }

    pub async fn create_network(&self, name: &str, driver: &str) -> Result<()> {
        self.runtime
            .create_network(&NetworkCreateSpec {
                name: name.to_string(),
                driver: driver.to_string(),
                options: Default::default(),
            })
            .await?;
        Ok(())
    }

    pub async fn remove_network(&self, name: &str) -> Result<()> {
        let handle = self.resolve_network(name).await?;
        Ok(self.runtime.remove_network(&handle).await?)
    }

    pub async fn connect_network(&self, network: &str, container: &str) -> Result<()> {
        let network = self.resolve_network(network).await?;
        let container = self.resolve_container(container).await?;
        Ok(self.runtime.connect_network(&network, &container).await?)
    }

    pub async fn disconnect_network(&self, network: &str, container: &str) -> Result<()> {
        let network = self.resolve_network(network).await?;
        let container = self.resolve_container(container).await?;
        Ok(self
            .runtime
            .disconnect_network(&network, &container)
            .await?)
    }

    // --- system passthroughs ---

    pub async fn system_info(&self) -> Result<SystemInfo> {
        Ok(self.runtime.system_info().await?)
    }

    pub async fn version(&self) -> Result<VersionInfo> {
        Ok(self.runtime.version().await?)
    }

    async fn resolve_container(&self, name: &str) -> Result<ContainerHandle> {
        self.runtime
            .find_container_by_name(name)
            .await?
            .ok_or_else(|| {
                RuntimeCallError::new("find_container_by_name", name, "no such container").into()
            })
    }

    async fn resolve_network(&self, name: &str) -> Result<NetworkHandle> {
        self.runtime
            .find_network_by_name(name)
            .await?
            .ok_or_else(|| {
                RuntimeCallError::new("find_network_by_name", name, "no such network").into()
            })
    }
}
