use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use stevedore::{ComposeAction, Stevedore};
use tracing::info;

#[derive(Parser)]
#[command(name = "stevedore", about = "Manage a Docker container fleet", version)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Bring a compose project up (networks first, then services)
    Up {
        /// Compose definition file
        #[arg(short, long, default_value = "compose.yml")]
        file: PathBuf,
        /// Project name; defaults to the file stem
        #[arg(short, long)]
        project: Option<String>,
    },
    /// Take a compose project down (services first, then networks)
    Down {
        #[arg(short, long, default_value = "compose.yml")]
        file: PathBuf,
        #[arg(short, long)]
        project: Option<String>,
    },
    /// List containers
    Ps {
        /// Include stopped containers
        #[arg(short, long)]
        all: bool,
    },
    /// Derived usage metrics for one container
    Stats { container: String },
    /// Fleet-wide aggregate report
    Admin,
    /// Show container logs
    Logs {
        container: String,
        #[arg(long, default_value_t = 100)]
        tail: usize,
    },
    /// Pull an image
    Pull { image: String },
    /// Show daemon system information
    System,
    /// Show daemon version
    Version,
}

fn project_name(explicit: Option<String>, file: &Path) -> String {
    explicit.unwrap_or_else(|| {
        file.file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "default".to_string())
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.parse()?),
        )
        .init();

    let fleet = Stevedore::connect()?;

    match cli.command {
        Commands::Up { file, project } => {
            let project = project_name(project, &file);
            let definition = std::fs::read_to_string(&file)
                .with_context(|| format!("cannot read compose file {}", file.display()))?;
            info!("Bringing project {} up", project);
            fleet
                .reconcile(&definition, &project, ComposeAction::Up)
                .await?;
            println!("Project {project} is up");
        }

        Commands::Down { file, project } => {
            let project = project_name(project, &file);
            let definition = std::fs::read_to_string(&file)
                .with_context(|| format!("cannot read compose file {}", file.display()))?;
            info!("Taking project {} down", project);
            fleet
                .reconcile(&definition, &project, ComposeAction::Down)
                .await?;
            println!("Project {project} is down");
        }

        Commands::Ps { all } => {
            let containers = fleet.list_containers(all).await?;
            if containers.is_empty() {
                println!("No containers found");
                return Ok(());
            }
            println!(
                "{:<14} {:<28} {:<12} {:<22} {}",
                "CONTAINER ID", "IMAGE", "STATE", "STATUS", "NAME"
            );
            for c in &containers {
                let short_id = c.id.chars().take(12).collect::<String>();
                println!(
                    "{:<14} {:<28} {:<12} {:<22} {}",
                    short_id, c.image, c.state, c.status, c.name
                );
            }
        }

        Commands::Stats { container } => {
            let metrics = fleet.container_snapshot(&container).await?;
            println!("{}", serde_json::to_string_pretty(&metrics)?);
        }

        Commands::Admin => {
            let report = fleet.admin_snapshot().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }

        Commands::Logs { container, tail } => {
            let logs = fleet.container_logs(&container, tail).await?;
            print!("{logs}");
        }

        Commands::Pull { image } => {
            fleet.pull_image(&image).await?;
            println!("Pulled {image}");
        }

        Commands::System => {
            let info = fleet.system_info().await?;
            println!("{}", serde_json::to_string_pretty(&info)?);
        }

        Commands::Version => {
            let version = fleet.version().await?;
            println!(
                "{} (api {}) on {}/{}",
                version.version, version.api_version, version.os, version.arch
            );
        }
    }

    Ok(())
}
