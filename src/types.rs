use serde::{Deserialize, Serialize};

/// Container information as reported by the runtime
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerSummary {
    pub id: String,
    pub name: String,
    pub image: String,
    /// Coarse state tag ("running", "exited", "created", ...)
    pub state: String,
    /// Human-readable status line ("Up 3 hours", "Exited (0) 2 days ago")
    pub status: String,
    pub ports: Vec<String>,
}

/// Image information as reported by the runtime
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageSummary {
    pub id: String,
    pub tags: Vec<String>,
    pub size_bytes: u64,
}

/// Network information as reported by the runtime
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkSummary {
    pub id: String,
    pub name: String,
    pub driver: String,
}

/// Host-level information from the runtime daemon
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemInfo {
    pub name: String,
    pub operating_system: String,
    pub architecture: String,
    pub cpus: u32,
    pub memory_total_bytes: u64,
    pub containers_total: u32,
    pub images_total: u32,
}

/// Runtime daemon version report
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    pub api_version: String,
    pub os: String,
    pub arch: String,
}
