//! Up/Down reconciliation: translates a parsed compose project into an
//! ordered sequence of runtime calls.
//!
//! Each action is one synchronous, strictly ordered sequence of adapter
//! calls: networks before containers on the way up, stop before remove on
//! the way down. There is no transactional guarantee; a failed step aborts
//! the remaining steps and already-completed work is left in place for the
//! caller to inspect or retry.

use std::path::Path;
use tracing::{debug, info};

use crate::compose::{ComposeProject, NetworkSpec, ServiceSpec};
use crate::error::Result;
use crate::runtime::{
    ContainerCreateSpec, ContainerRuntime, NetworkCreateSpec, PortBindingSpec,
};

/// Which way to drive a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposeAction {
    Up,
    Down,
}

impl std::str::FromStr for ComposeAction {
    type Err = crate::error::ParseError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "up" => Ok(Self::Up),
            "down" => Ok(Self::Down),
            other => Err(crate::error::ParseError::invalid(format!(
                "unknown compose action `{other}` (expected `up` or `down`)"
            ))),
        }
    }
}

/// Decides the order in which a project's resources are processed.
///
/// The default walks declaration order; a dependency-graph scheduler could
/// be substituted here without changing the reconciler's contract.
pub trait StartupOrdering: Send + Sync {
    fn services<'a>(&self, project: &'a ComposeProject) -> Vec<&'a ServiceSpec>;
    fn networks<'a>(&self, project: &'a ComposeProject) -> Vec<&'a NetworkSpec>;
}

/// Processes services and networks strictly in declaration order.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeclarationOrder;

impl StartupOrdering for DeclarationOrder {
    fn services<'a>(&self, project: &'a ComposeProject) -> Vec<&'a ServiceSpec> {
        project.services.iter().collect()
    }

    fn networks<'a>(&self, project: &'a ComposeProject) -> Vec<&'a NetworkSpec> {
        project.networks.iter().collect()
    }
}

/// Drives Up/Down for one project against an injected runtime adapter.
pub struct Reconciler<'r, R> {
    runtime: &'r R,
    ordering: Box<dyn StartupOrdering>,
}

impl<'r, R: ContainerRuntime> Reconciler<'r, R> {
    pub fn new(runtime: &'r R) -> Self {
        Self {
            runtime,
            ordering: Box::new(DeclarationOrder),
        }
    }

    pub fn with_ordering(runtime: &'r R, ordering: Box<dyn StartupOrdering>) -> Self {
        Self { runtime, ordering }
    }

    /// Bring a project up: networks first, then services, each created and
    /// started under its derived `{project}_{name}` runtime name.
    ///
    /// Up is an upsert: resources that already exist under their derived
    /// name are reused (networks left in place, containers started) rather
    /// than failing on the duplicate name, so re-running Up is safe.
    pub async fn up(&self, project: &ComposeProject) -> Result<()> {
        info!(project = %project.name, "reconciling project up");

        for network in self.ordering.networks(project) {
            let name = project.resource_name(&network.name);
            match self.runtime.find_network_by_name(&name).await? {
                Some(_) => debug!(network = %name, "network already exists, reusing"),
                None => {
                    self.runtime
                        .create_network(&NetworkCreateSpec {
                            name: name.clone(),
                            driver: network.driver.clone(),
                            options: network.options.clone().into_iter().collect(),
                        })
                        .await?;
                    info!(network = %name, driver = %network.driver, "network created");
                }
            }
        }

        for service in self.ordering.services(project) {
            let name = project.resource_name(&service.name);
            let handle = match self.runtime.find_container_by_name(&name).await? {
                Some(existing) => {
                    debug!(container = %name, "container already exists, reusing");
                    existing
                }
                None => {
                    let spec = build_container_spec(&name, service);
                    self.runtime.create_container(&spec).await?
                }
            };
            self.runtime.start_container(&handle).await?;
            info!(container = %name, image = %service.image, "service started");
        }

        Ok(())
    }

    /// Take a project down: stop and remove each service's container, then
    /// remove each network. Resources that no longer exist are skipped, so
    /// Down is idempotent.
    pub async fn down(&self, project: &ComposeProject) -> Result<()> {
        info!(project = %project.name, "reconciling project down");

        for service in self.ordering.services(project) {
            let name = project.resource_name(&service.name);
            match self.runtime.find_container_by_name(&name).await? {
                None => debug!(container = %name, "container not found, skipping"),
                Some(handle) => {
                    self.runtime.stop_container(&handle).await?;
                    self.runtime.remove_container(&handle).await?;
                    info!(container = %name, "service removed");
                }
            }
        }

        for network in self.ordering.networks(project) {
            let name = project.resource_name(&network.name);
            match self.runtime.find_network_by_name(&name).await? {
                None => debug!(network = %name, "network not found, skipping"),
                Some(handle) => {
                    self.runtime.remove_network(&handle).await?;
                    info!(network = %name, "network removed");
                }
            }
        }

        Ok(())
    }
}

/// Derive the runtime container spec from a service definition.
///
/// Host paths in bind mounts are resolved to absolute paths here, at the
/// moment of use, so the parser itself stays deterministic.
pub fn build_container_spec(runtime_name: &str, service: &ServiceSpec) -> ContainerCreateSpec {
    let env = service
        .environment
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect();

    let exposed_ports = service
        .ports
        .iter()
        .map(|p| p.container_port_key())
        .collect();

    let port_bindings = service
        .ports
        .iter()
        .map(|p| PortBindingSpec {
            container_port: p.container_port_key(),
            host_port: p.host_port.to_string(),
        })
        .collect();

    let binds = service
        .volumes
        .iter()
        .map(|v| {
            format!(
                "{}:{}",
                absolute_host_path(&v.host_path),
                v.container_path
            )
        })
        .collect();

    ContainerCreateSpec {
        name: runtime_name.to_string(),
        image: service.image.clone(),
        command: service.command.clone(),
        env,
        exposed_ports,
        port_bindings,
        binds,
        network_mode: service.network_mode.clone(),
    }
}

fn absolute_host_path(host_path: &str) -> String {
    let path = Path::new(host_path);
    if path.is_absolute() {
        return host_path.to_string();
    }
    match std::env::current_dir() {
        Ok(cwd) => normalize(&cwd.join(path)).display().to_string(),
        Err(_) => host_path.to_string(),
    }
}

/// Lexically resolve `.` and `..` components without touching the
/// filesystem.
fn normalize(path: &Path) -> std::path::PathBuf {
    use std::path::Component;
    let mut out = std::path::PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::{PortMapping, VolumeBinding};
    use std::collections::BTreeMap;

    fn service() -> ServiceSpec {
        ServiceSpec {
            name: "web".into(),
            image: "x/web".into(),
            command: Some(vec!["serve".into(), "--port".into(), "80".into()]),
            environment: BTreeMap::from([("FOO".to_string(), "bar".to_string())]),
            ports: vec![PortMapping {
                host_port: 8080,
                container_port: 80,
            }],
            volumes: vec![VolumeBinding {
                host_path: "/srv/web".into(),
                container_path: "/var/www".into(),
            }],
            network_mode: Some("bridge".into()),
        }
    }

    #[test]
    fn container_spec_derivation() {
        let spec = build_container_spec("demo_web", &service());
        assert_eq!(spec.name, "demo_web");
        assert_eq!(spec.image, "x/web");
        assert_eq!(spec.command.as_deref().unwrap(), ["serve", "--port", "80"]);
        assert_eq!(spec.env, ["FOO=bar"]);
        assert_eq!(spec.exposed_ports, ["80/tcp"]);
        assert_eq!(
            spec.port_bindings,
            [PortBindingSpec {
                container_port: "80/tcp".into(),
                host_port: "8080".into()
            }]
        );
        assert_eq!(spec.binds, ["/srv/web:/var/www"]);
        assert_eq!(spec.network_mode.as_deref(), Some("bridge"));
    }

    #[test]
    fn relative_host_paths_become_absolute() {
        let mut svc = service();
        svc.volumes = vec![VolumeBinding {
            host_path: "./data".into(),
            container_path: "/var/data".into(),
        }];
        let spec = build_container_spec("demo_web", &svc);
        let bind = &spec.binds[0];
        assert!(bind.ends_with(":/var/data"));
        let host = bind.rsplit_once(':').unwrap().0;
        assert!(Path::new(host).is_absolute());
        assert!(host.ends_with("data"));
        assert!(!host.contains("/./"));
    }

    #[test]
    fn action_parsing() {
        assert_eq!("up".parse::<ComposeAction>().unwrap(), ComposeAction::Up);
        assert_eq!(
            "down".parse::<ComposeAction>().unwrap(),
            ComposeAction::Down
        );
        assert!("restart".parse::<ComposeAction>().is_err());
    }
}
