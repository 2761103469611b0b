//! Compose definition parsing and the canonical project model.
//!
//! `ComposeProject::parse` turns raw YAML text into a validated in-memory
//! project. Parsing is pure: no network or disk access, and identical input
//! always yields a structurally identical project. Services and networks keep
//! their declaration order, which the reconciler relies on.

use serde::Deserialize;
use std::collections::BTreeMap;

use crate::error::ParseError;

/// Canonical in-memory form of a multi-service declarative deployment.
///
/// The project name acts as a namespace prefix: every runtime-visible
/// resource derived from this project is named `{project}_{logical name}`.
#[derive(Debug, Clone, PartialEq)]
pub struct ComposeProject {
    pub name: String,
    /// Services in declaration order, logical names unique.
    pub services: Vec<ServiceSpec>,
    /// Networks in declaration order, logical names unique.
    pub networks: Vec<NetworkSpec>,
}

/// One service's declarative definition within a project.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceSpec {
    pub name: String,
    pub image: String,
    /// Argv tokens, derived by splitting the command string on whitespace.
    pub command: Option<Vec<String>>,
    pub environment: BTreeMap<String, String>,
    pub ports: Vec<PortMapping>,
    pub volumes: Vec<VolumeBinding>,
    /// Passed through to the runtime verbatim when set.
    pub network_mode: Option<String>,
}

/// One network's declarative definition within a project.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkSpec {
    pub name: String,
    pub driver: String,
    pub options: BTreeMap<String, String>,
}

pub const DEFAULT_NETWORK_DRIVER: &str = "bridge";

/// A published port, `host:container`. Only TCP is expressible in the
/// short compose syntax this parser accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortMapping {
    pub host_port: u16,
    pub container_port: u16,
}

impl PortMapping {
    /// Runtime port key for the container side, e.g. `80/tcp`.
    pub fn container_port_key(&self) -> String {
        format!("{}/tcp", self.container_port)
    }
}

/// A bind mount, `hostPath:containerPath`. The host path is kept as
/// written; it is resolved to an absolute path when the container spec
/// is built, so parsing stays deterministic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeBinding {
    pub host_path: String,
    pub container_path: String,
}

#[derive(Debug, Deserialize)]
struct RawDocument {
    #[serde(default)]
    services: Option<serde_yaml::Mapping>,
    #[serde(default)]
    networks: Option<serde_yaml::Mapping>,
}

#[derive(Debug, Deserialize)]
struct RawService {
    image: Option<String>,
    command: Option<String>,
    environment: Option<RawEnvironment>,
    ports: Option<Vec<String>>,
    volumes: Option<Vec<String>>,
    network_mode: Option<String>,
}

/// Compose allows environment as either a mapping or a `KEY=VALUE` list.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawEnvironment {
    Map(BTreeMap<String, serde_yaml::Value>),
    List(Vec<String>),
}

#[derive(Debug, Default, Deserialize)]
struct RawNetwork {
    driver: Option<String>,
    #[serde(default)]
    driver_opts: BTreeMap<String, String>,
}

impl ComposeProject {
    /// Parse a compose document under the given project name.
    ///
    /// The document must define at least one service or network. Each port
    /// entry must match `hostPort:containerPort`, each volume entry
    /// `hostPath:containerPath`, and environment must be a mapping or a
    /// list of `KEY=VALUE` strings.
    pub fn parse(project_name: &str, text: &str) -> Result<Self, ParseError> {
        let doc: RawDocument = serde_yaml::from_str(text)
            .map_err(|e| ParseError::invalid(format!("not a valid compose document: {e}")))?;

        let mut services = Vec::new();
        if let Some(mapping) = doc.services {
            for (key, value) in mapping {
                let name = mapping_key(&key, "service")?;
                services.push(parse_service(&name, value)?);
            }
        }

        let mut networks = Vec::new();
        if let Some(mapping) = doc.networks {
            for (key, value) in mapping {
                let name = mapping_key(&key, "network")?;
                networks.push(parse_network(&name, value)?);
            }
        }

        if services.is_empty() && networks.is_empty() {
            return Err(ParseError::invalid(
                "document defines neither services nor networks",
            ));
        }

        Ok(Self {
            name: project_name.to_string(),
            services,
            networks,
        })
    }

    /// Deterministic runtime-visible name for a logical resource name.
    pub fn resource_name(&self, logical: &str) -> String {
        format!("{}_{}", self.name, logical)
    }

    pub fn service(&self, name: &str) -> Option<&ServiceSpec> {
        self.services.iter().find(|s| s.name == name)
    }

    pub fn network(&self, name: &str) -> Option<&NetworkSpec> {
        self.networks.iter().find(|n| n.name == name)
    }

    /// Serialize back to compose YAML. `parse(name, to_yaml(p))` yields a
    /// project structurally equal to `p`.
    pub fn to_yaml(&self) -> String {
        use serde_yaml::{Mapping, Value};

        let mut root = Mapping::new();

        if !self.services.is_empty() {
            let mut services = Mapping::new();
            for svc in &self.services {
                let mut entry = Mapping::new();
                entry.insert("image".into(), Value::String(svc.image.clone()));
                if let Some(argv) = &svc.command {
                    entry.insert("command".into(), Value::String(argv.join(" ")));
                }
                if !svc.environment.is_empty() {
                    let mut env = Mapping::new();
                    for (k, v) in &svc.environment {
                        env.insert(Value::String(k.clone()), Value::String(v.clone()));
                    }
                    entry.insert("environment".into(), Value::Mapping(env));
                }
                if !svc.ports.is_empty() {
                    let ports = svc
                        .ports
                        .iter()
                        .map(|p| Value::String(format!("{}:{}", p.host_port, p.container_port)))
                        .collect();
                    entry.insert("ports".into(), Value::Sequence(ports));
                }
                if !svc.volumes.is_empty() {
                    let volumes = svc
                        .volumes
                        .iter()
                        .map(|v| Value::String(format!("{}:{}", v.host_path, v.container_path)))
                        .collect();
                    entry.insert("volumes".into(), Value::Sequence(volumes));
                }
                if let Some(mode) = &svc.network_mode {
                    entry.insert("network_mode".into(), Value::String(mode.clone()));
                }
                services.insert(Value::String(svc.name.clone()), Value::Mapping(entry));
            }
            root.insert("services".into(), Value::Mapping(services));
        }

        if !self.networks.is_empty() {
            let mut networks = Mapping::new();
            for net in &self.networks {
                let mut entry = Mapping::new();
                entry.insert("driver".into(), Value::String(net.driver.clone()));
                if !net.options.is_empty() {
                    let mut opts = Mapping::new();
                    for (k, v) in &net.options {
                        opts.insert(Value::String(k.clone()), Value::String(v.clone()));
                    }
                    entry.insert("driver_opts".into(), Value::Mapping(opts));
                }
                networks.insert(Value::String(net.name.clone()), Value::Mapping(entry));
            }
            root.insert("networks".into(), Value::Mapping(networks));
        }

        serde_yaml::to_string(&root).unwrap_or_default()
    }
}

fn mapping_key(key: &serde_yaml::Value, kind: &str) -> Result<String, ParseError> {
    match key {
        serde_yaml::Value::String(s) if !s.is_empty() => Ok(s.clone()),
        other => Err(ParseError::invalid(format!(
            "{kind} name must be a non-empty string, got {other:?}"
        ))),
    }
}

fn parse_service(name: &str, value: serde_yaml::Value) -> Result<ServiceSpec, ParseError> {
    let raw: RawService = serde_yaml::from_value(value)
        .map_err(|e| ParseError::invalid(format!("service `{name}`: {e}")))?;

    let image = raw
        .image
        .filter(|i| !i.is_empty())
        .ok_or_else(|| ParseError::invalid(format!("service `{name}` has no image")))?;

    let command = raw.command.map(|c| {
        c.split_whitespace()
            .map(str::to_string)
            .collect::<Vec<_>>()
    });

    let environment = match raw.environment {
        None => BTreeMap::new(),
        Some(RawEnvironment::Map(map)) => {
            let mut env = BTreeMap::new();
            for (key, value) in map {
                env.insert(key.clone(), env_scalar(name, &key, &value)?);
            }
            env
        }
        Some(RawEnvironment::List(entries)) => {
            let mut env = BTreeMap::new();
            for entry in entries {
                let (key, value) = entry.split_once('=').ok_or_else(|| {
                    ParseError::invalid(format!(
                        "service `{name}`: environment entry `{entry}` is not KEY=VALUE"
                    ))
                })?;
                if key.is_empty() {
                    return Err(ParseError::invalid(format!(
                        "service `{name}`: environment entry `{entry}` has an empty key"
                    )));
                }
                env.insert(key.to_string(), value.to_string());
            }
            env
        }
    };

    let mut ports = Vec::new();
    for entry in raw.ports.unwrap_or_default() {
        ports.push(parse_port(name, &entry)?);
    }

    let mut volumes = Vec::new();
    for entry in raw.volumes.unwrap_or_default() {
        volumes.push(parse_volume(name, &entry)?);
    }

    Ok(ServiceSpec {
        name: name.to_string(),
        image,
        command,
        environment,
        ports,
        volumes,
        network_mode: raw.network_mode,
    })
}

fn env_scalar(
    service: &str,
    key: &str,
    value: &serde_yaml::Value,
) -> Result<String, ParseError> {
    use serde_yaml::Value;
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(ParseError::invalid(format!(
            "service `{service}`: environment value for `{key}` must be a scalar, got {other:?}"
        ))),
    }
}

fn parse_port(service: &str, entry: &str) -> Result<PortMapping, ParseError> {
    let invalid = || {
        ParseError::invalid(format!(
            "service `{service}`: port `{entry}` does not match hostPort:containerPort"
        ))
    };
    let (host, container) = entry.split_once(':').ok_or_else(invalid)?;
    let host_port: u16 = host.parse().map_err(|_| invalid())?;
    let container_port: u16 = container.parse().map_err(|_| invalid())?;
    Ok(PortMapping {
        host_port,
        container_port,
    })
}

fn parse_volume(service: &str, entry: &str) -> Result<VolumeBinding, ParseError> {
    let (host, container) = entry.split_once(':').filter(|(h, c)| !h.is_empty() && !c.is_empty()).ok_or_else(|| {
        ParseError::invalid(format!(
            "service `{service}`: volume `{entry}` does not match hostPath:containerPath"
        ))
    })?;
    Ok(VolumeBinding {
        host_path: host.to_string(),
        container_path: container.to_string(),
    })
}

fn parse_network(name: &str, value: serde_yaml::Value) -> Result<NetworkSpec, ParseError> {
    // A bare `networks: {app:}` entry is valid and takes all defaults.
    let raw: RawNetwork = match value {
        serde_yaml::Value::Null => RawNetwork::default(),
        other => serde_yaml::from_value(other)
            .map_err(|e| ParseError::invalid(format!("network `{name}`: {e}")))?,
    };

    Ok(NetworkSpec {
        name: name.to_string(),
        driver: raw
            .driver
            .unwrap_or_else(|| DEFAULT_NETWORK_DRIVER.to_string()),
        options: raw.driver_opts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASIC: &str = r#"
services:
  web:
    image: x/web
    ports:
      - "8080:80"
    environment:
      FOO: bar
  worker:
    image: x/worker
    command: run --queue default
    volumes:
      - ./data:/var/data
networks:
  backend:
    driver: bridge
"#;

    #[test]
    fn parses_services_in_declaration_order() {
        let project = ComposeProject::parse("demo", BASIC).unwrap();
        let names: Vec<_> = project.services.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["web", "worker"]);
        assert_eq!(project.networks[0].name, "backend");
    }

    #[test]
    fn derives_ports_env_and_command() {
        let project = ComposeProject::parse("demo", BASIC).unwrap();
        let web = project.service("web").unwrap();
        assert_eq!(
            web.ports,
            [PortMapping {
                host_port: 8080,
                container_port: 80
            }]
        );
        assert_eq!(web.ports[0].container_port_key(), "80/tcp");
        assert_eq!(web.environment.get("FOO").unwrap(), "bar");

        let worker = project.service("worker").unwrap();
        assert_eq!(
            worker.command.as_deref().unwrap(),
            ["run", "--queue", "default"]
        );
        assert_eq!(
            worker.volumes,
            [VolumeBinding {
                host_path: "./data".into(),
                container_path: "/var/data".into()
            }]
        );
    }

    #[test]
    fn resource_names_are_project_prefixed() {
        let project = ComposeProject::parse("demo", BASIC).unwrap();
        assert_eq!(project.resource_name("web"), "demo_web");
        assert_eq!(project.resource_name("backend"), "demo_backend");
    }

    #[test]
    fn env_list_form_is_accepted() {
        let text = r#"
services:
  app:
    image: x/app
    environment:
      - FOO=bar
      - EMPTY=
"#;
        let project = ComposeProject::parse("p", text).unwrap();
        let env = &project.service("app").unwrap().environment;
        assert_eq!(env.get("FOO").unwrap(), "bar");
        assert_eq!(env.get("EMPTY").unwrap(), "");
    }

    #[test]
    fn env_entry_without_equals_is_rejected() {
        let text = r#"
services:
  app:
    image: x/app
    environment:
      - JUSTAKEY
"#;
        assert!(ComposeProject::parse("p", text).is_err());
    }

    #[test]
    fn numeric_env_values_are_stringified() {
        let text = r#"
services:
  app:
    image: x/app
    environment:
      PORT: 8080
      DEBUG: true
"#;
        let project = ComposeProject::parse("p", text).unwrap();
        let env = &project.service("app").unwrap().environment;
        assert_eq!(env.get("PORT").unwrap(), "8080");
        assert_eq!(env.get("DEBUG").unwrap(), "true");
    }

    #[test]
    fn malformed_port_is_rejected() {
        for bad in ["80", "x:80", "8080:http", "8080:80:tcp"] {
            let text = format!(
                "services:\n  app:\n    image: x/app\n    ports:\n      - \"{bad}\"\n"
            );
            assert!(
                ComposeProject::parse("p", &text).is_err(),
                "port `{bad}` should be rejected"
            );
        }
    }

    #[test]
    fn missing_image_is_rejected() {
        let text = "services:\n  app:\n    command: run\n";
        assert!(ComposeProject::parse("p", text).is_err());
    }

    #[test]
    fn empty_document_is_rejected() {
        assert!(ComposeProject::parse("p", "{}").is_err());
        assert!(ComposeProject::parse("p", "services: {}\n").is_err());
    }

    #[test]
    fn bare_network_entry_takes_defaults() {
        let text = "networks:\n  app:\n";
        let project = ComposeProject::parse("p", text).unwrap();
        assert_eq!(project.networks[0].driver, DEFAULT_NETWORK_DRIVER);
        assert!(project.networks[0].options.is_empty());
    }

    #[test]
    fn yaml_round_trip_is_structurally_equal() {
        let project = ComposeProject::parse("demo", BASIC).unwrap();
        let reparsed = ComposeProject::parse("demo", &project.to_yaml()).unwrap();
        assert_eq!(project, reparsed);
    }
}
