//! Live adapter over the Docker Engine API via the local control socket.

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, ListContainersOptions, LogsOptions, RemoveContainerOptions,
    RestartContainerOptions, StartContainerOptions, StatsOptions, StopContainerOptions,
};
use bollard::image::{CreateImageOptions, ListImagesOptions, RemoveImageOptions};
use bollard::models::{HostConfig, PortBinding};
use bollard::network::{
    ConnectNetworkOptions, CreateNetworkOptions, DisconnectNetworkOptions, ListNetworksOptions,
};
use bollard::Docker;
use futures::stream::StreamExt;
use std::collections::HashMap;
use tracing::debug;

use super::{
    BlkioEntry, ContainerCreateSpec, ContainerFilter, ContainerHandle, ContainerRuntime,
    CpuCounters, MemoryCounters, NetworkCounters, NetworkCreateSpec, NetworkHandle,
    RuntimeResult, StatsSnapshot,
};
use crate::error::RuntimeCallError;
use crate::types::{ContainerSummary, ImageSummary, NetworkSummary, SystemInfo, VersionInfo};

/// Default timeout, in seconds, granted to a container on stop/restart.
const STOP_TIMEOUT_SECS: i64 = 10;

/// Runtime adapter backed by a local Docker daemon.
#[derive(Clone)]
pub struct DockerRuntime {
    client: Docker,
}

impl DockerRuntime {
    /// Connect with the platform's local defaults (`/var/run/docker.sock`
    /// on Unix), honoring `DOCKER_HOST` when set.
    pub fn connect() -> crate::Result<Self> {
        let client = Docker::connect_with_local_defaults()
            .map_err(|e| RuntimeCallError::new("connect", "docker daemon", e))?;
        Ok(Self { client })
    }

    pub fn with_client(client: Docker) -> Self {
        Self { client }
    }
}

fn call_err(
    operation: &'static str,
    target: impl Into<String>,
) -> impl FnOnce(bollard::errors::Error) -> RuntimeCallError {
    let target = target.into();
    move |e| RuntimeCallError::new(operation, target, e)
}

/// The daemon answers 304 when a container is already in the requested
/// state; an upsert-style reconciliation treats that as success.
fn ignore_not_modified(result: Result<(), bollard::errors::Error>) -> Result<(), bollard::errors::Error> {
    match result {
        Err(bollard::errors::Error::DockerResponseServerError {
            status_code: 304, ..
        }) => Ok(()),
        other => other,
    }
}

fn strip_slash(name: &str) -> &str {
    name.strip_prefix('/').unwrap_or(name)
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn list_containers(
        &self,
        filter: ContainerFilter,
    ) -> RuntimeResult<Vec<ContainerSummary>> {
        let options = ListContainersOptions::<String> {
            all: filter.all,
            ..Default::default()
        };
        let containers = self
            .client
            .list_containers(Some(options))
            .await
            .map_err(call_err("list_containers", "all containers"))?;

        Ok(containers
            .into_iter()
            .map(|c| ContainerSummary {
                id: c.id.unwrap_or_default(),
                name: c
                    .names
                    .unwrap_or_default()
                    .first()
                    .map(|n| strip_slash(n).to_string())
                    .unwrap_or_default(),
                image: c.image.unwrap_or_default(),
                state: c.state.unwrap_or_default(),
                status: c.status.unwrap_or_default(),
                ports: c
                    .ports
                    .unwrap_or_default()
                    .into_iter()
                    .map(|p| match p.public_port {
                        Some(public) => format!("{}:{}", public, p.private_port),
                        None => p.private_port.to_string(),
                    })
                    .collect(),
            })
            .collect())
    }

    async fn find_container_by_name(&self, name: &str) -> RuntimeResult<Option<ContainerHandle>> {
        let mut filters = HashMap::new();
        filters.insert("name".to_string(), vec![name.to_string()]);
        let options = ListContainersOptions::<String> {
            all: true,
            filters,
            ..Default::default()
        };
        let containers = self
            .client
            .list_containers(Some(options))
            .await
            .map_err(call_err("find_container_by_name", name))?;

        // The daemon's name filter is a substring match; pin it down here.
        Ok(containers.into_iter().find_map(|c| {
            let matches = c
                .names
                .as_deref()
                .unwrap_or_default()
                .iter()
                .any(|n| strip_slash(n) == name);
            match (matches, c.id) {
                (true, Some(id)) => Some(ContainerHandle {
                    id,
                    name: name.to_string(),
                }),
                _ => None,
            }
        }))
    }

    async fn create_container(&self, spec: &ContainerCreateSpec) -> RuntimeResult<ContainerHandle> {
        let exposed_ports: HashMap<String, HashMap<(), ()>> = spec
            .exposed_ports
            .iter()
            .map(|p| (p.clone(), HashMap::new()))
            .collect();

        let port_bindings: HashMap<String, Option<Vec<PortBinding>>> = spec
            .port_bindings
            .iter()
            .map(|b| {
                (
                    b.container_port.clone(),
                    Some(vec![PortBinding {
                        host_ip: None,
                        host_port: Some(b.host_port.clone()),
                    }]),
                )
            })
            .collect();

        let config = Config {
            image: Some(spec.image.clone()),
            cmd: spec.command.clone(),
            env: (!spec.env.is_empty()).then(|| spec.env.clone()),
            exposed_ports: (!exposed_ports.is_empty()).then_some(exposed_ports),
            host_config: Some(HostConfig {
                binds: (!spec.binds.is_empty()).then(|| spec.binds.clone()),
                port_bindings: (!port_bindings.is_empty()).then_some(port_bindings),
                network_mode: spec.network_mode.clone(),
                ..Default::default()
            }),
            ..Default::default()
        };

        debug!(name = %spec.name, image = %spec.image, "creating container");
        let response = self
            .client
            .create_container(
                Some(CreateContainerOptions {
                    name: spec.name.clone(),
                    platform: None,
                }),
                config,
            )
            .await
            .map_err(call_err("create_container", &spec.name))?;

        Ok(ContainerHandle {
            id: response.id,
            name: spec.name.clone(),
        })
    }

    async fn start_container(&self, handle: &ContainerHandle) -> RuntimeResult<()> {
        ignore_not_modified(
            self.client
                .start_container(&handle.id, None::<StartContainerOptions<String>>)
                .await,
        )
        .map_err(call_err("start_container", &handle.name))
    }

    async fn stop_container(&self, handle: &ContainerHandle) -> RuntimeResult<()> {
        ignore_not_modified(
            self.client
                .stop_container(
                    &handle.id,
                    Some(StopContainerOptions {
                        t: STOP_TIMEOUT_SECS,
                    }),
                )
                .await,
        )
        .map_err(call_err("stop_container", &handle.name))
    }

    async fn restart_container(&self, handle: &ContainerHandle) -> RuntimeResult<()> {
        self.client
            .restart_container(
                &handle.id,
                Some(RestartContainerOptions {
                    t: STOP_TIMEOUT_SECS as isize,
                }),
            )
            .await
            .map_err(call_err("restart_container", &handle.name))
    }

    async fn remove_container(&self, handle: &ContainerHandle) -> RuntimeResult<()> {
        self.client
            .remove_container(
                &handle.id,
                Some(RemoveContainerOptions {
                    force: false,
                    ..Default::default()
                }),
            )
            .await
            .map_err(call_err("remove_container", &handle.name))
    }

    async fn container_logs(&self, handle: &ContainerHandle, tail: usize) -> RuntimeResult<String> {
        let options = LogsOptions::<String> {
            stdout: true,
            stderr: true,
            tail: tail.to_string(),
            ..Default::default()
        };
        let mut stream = self.client.logs(&handle.id, Some(options));
        let mut output = String::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(call_err("container_logs", &handle.name))?;
            output.push_str(&chunk.to_string());
        }
        Ok(output)
    }

    async fn get_stats(&self, handle: &ContainerHandle) -> RuntimeResult<StatsSnapshot> {
        let options = StatsOptions {
            stream: false,
            one_shot: false,
        };
        let stats = self
            .client
            .stats(&handle.id, Some(options))
            .next()
            .await
            .ok_or_else(|| {
                RuntimeCallError::new("get_stats", &handle.name, "empty stats stream")
            })?
            .map_err(call_err("get_stats", &handle.name))?;

        Ok(StatsSnapshot {
            cpu: CpuCounters {
                total_usage: stats.cpu_stats.cpu_usage.total_usage,
                system_usage: stats.cpu_stats.system_cpu_usage.unwrap_or(0),
                online_cpus: stats.cpu_stats.online_cpus.map(|n| n as u32),
                percpu_usage: stats.cpu_stats.cpu_usage.percpu_usage.unwrap_or_default(),
            },
            precpu: CpuCounters {
                total_usage: stats.precpu_stats.cpu_usage.total_usage,
                system_usage: stats.precpu_stats.system_cpu_usage.unwrap_or(0),
                online_cpus: stats.precpu_stats.online_cpus.map(|n| n as u32),
                percpu_usage: stats.precpu_stats.cpu_usage.percpu_usage.unwrap_or_default(),
            },
            memory: MemoryCounters {
                usage: stats.memory_stats.usage.unwrap_or(0),
                limit: stats.memory_stats.limit.unwrap_or(0),
            },
            networks: stats
                .networks
                .unwrap_or_default()
                .into_iter()
                .map(|(iface, net)| {
                    (
                        iface,
                        NetworkCounters {
                            rx_bytes: net.rx_bytes,
                            tx_bytes: net.tx_bytes,
                        },
                    )
                })
                .collect(),
            blkio: stats
                .blkio_stats
                .io_service_bytes_recursive
                .unwrap_or_default()
                .into_iter()
                .map(|entry| BlkioEntry {
                    op: entry.op,
                    value: entry.value,
                })
                .collect(),
        })
    }

    async fn list_images(&self) -> RuntimeResult<Vec<ImageSummary>> {
        let images = self
            .client
            .list_images(Some(ListImagesOptions::<String>::default()))
            .await
            .map_err(call_err("list_images", "all images"))?;

        Ok(images
            .into_iter()
            .map(|img| ImageSummary {
                id: img.id,
                tags: img.repo_tags,
                size_bytes: img.size.max(0) as u64,
            })
            .collect())
    }

    async fn pull_image(&self, reference: &str) -> RuntimeResult<()> {
        let options = CreateImageOptions {
            from_image: reference.to_string(),
            ..Default::default()
        };
        let mut stream = self.client.create_image(Some(options), None, None);
        while let Some(progress) = stream.next().await {
            progress.map_err(call_err("pull_image", reference))?;
        }
        Ok(())
    }

    async fn remove_image(&self, reference: &str) -> RuntimeResult<()> {
        self.client
            .remove_image(reference, None::<RemoveImageOptions>, None)
            .await
            .map_err(call_err("remove_image", reference))?;
        Ok(())
    }

    async fn list_networks(&self) -> RuntimeResult<Vec<NetworkSummary>> {
        let networks = self
            .client
            .list_networks(None::<ListNetworksOptions<String>>)
            .await
            .map_err(call_err("list_networks", "all networks"))?;

        Ok(networks
            .into_iter()
            .map(|n| NetworkSummary {
                id: n.id.unwrap_or_default(),
                name: n.name.unwrap_or_default(),
                driver: n.driver.unwrap_or_default(),
            })
            .collect())
    }

    async fn find_network_by_name(&self, name: &str) -> RuntimeResult<Option<NetworkHandle>> {
        let mut filters = HashMap::new();
        filters.insert("name".to_string(), vec![name.to_string()]);
        let networks = self
            .client
            .list_networks(Some(ListNetworksOptions { filters }))
            .await
            .map_err(call_err("find_network_by_name", name))?;

        Ok(networks.into_iter().find_map(|n| {
            match (n.name.as_deref() == Some(name), n.id) {
                (true, Some(id)) => Some(NetworkHandle {
                    id,
                    name: name.to_string(),
                }),
                _ => None,
            }
        }))
    }

    async fn create_network(&self, spec: &NetworkCreateSpec) -> RuntimeResult<NetworkHandle> {
        debug!(name = %spec.name, driver = %spec.driver, "creating network");
        self.client
            .create_network(CreateNetworkOptions {
                name: spec.name.clone(),
                driver: spec.driver.clone(),
                options: spec.options.clone(),
                ..Default::default()
            })
            .await
            .map_err(call_err("create_network", &spec.name))?;

        // Resolve by name rather than trusting the create response, the
        // same way every later action will resolve it.
        self.find_network_by_name(&spec.name).await?.ok_or_else(|| {
            RuntimeCallError::new("create_network", &spec.name, "network missing after create")
        })
    }

    async fn remove_network(&self, handle: &NetworkHandle) -> RuntimeResult<()> {
        self.client
            .remove_network(&handle.id)
            .await
            .map_err(call_err("remove_network", &handle.name))
    }

    async fn connect_network(
        &self,
        network: &NetworkHandle,
        container: &ContainerHandle,
    ) -> RuntimeResult<()> {
        self.client
            .connect_network(
                &network.id,
                ConnectNetworkOptions {
                    container: container.id.clone(),
                    ..Default::default()
                },
            )
            .await
            .map_err(call_err("connect_network", &network.name))
    }

    async fn disconnect_network(
        &self,
        network: &NetworkHandle,
        container: &ContainerHandle,
    ) -> RuntimeResult<()> {
        self.client
            .disconnect_network(
                &network.id,
                DisconnectNetworkOptions {
                    container: container.id.clone(),
                    force: false,
                },
            )
            .await
            .map_err(call_err("disconnect_network", &network.name))
    }

    async fn system_info(&self) -> RuntimeResult<SystemInfo> {
        let info = self
            .client
            .info()
            .await
            .map_err(call_err("system_info", "docker daemon"))?;

        Ok(SystemInfo {
            name: info.name.unwrap_or_default(),
            operating_system: info.operating_system.unwrap_or_default(),
            architecture: info.architecture.unwrap_or_default(),
            cpus: info.ncpu.unwrap_or(0).max(0) as u32,
            memory_total_bytes: info.mem_total.unwrap_or(0).max(0) as u64,
            containers_total: info.containers.unwrap_or(0).max(0) as u32,
            images_total: info.images.unwrap_or(0).max(0) as u32,
        })
    }

    async fn version(&self) -> RuntimeResult<VersionInfo> {
        let version = self
            .client
            .version()
            .await
            .map_err(call_err("version", "docker daemon"))?;

        Ok(VersionInfo {
            version: version.version.unwrap_or_default(),
            api_version: version.api_version.unwrap_or_default(),
            os: version.os.unwrap_or_default(),
            arch: version.arch.unwrap_or_default(),
        })
    }
}
