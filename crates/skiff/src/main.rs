mod commands;

use clap::{Parser, Subcommand};
use skiff_cloud::CloudGateway;
use skiff_cloud_ec2::{Ec2Credentials, Ec2Gateway};
use skiff_cloud_openstack::{OpenStackCredentials, OpenStackGateway};
use skiff_config::Backend;
use skiff_core::Environment;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "skiff")]
#[command(about = "One small boat per project: disposable cloud dev environments", long_about = None)]
#[command(version)]
struct Cli {
    /// Cloud entry from ~/.skiff.yml to operate on
    #[arg(short, long, global = true)]
    cloud: Option<String>,

    /// Environment name suffix (composes <project>-<name>)
    #[arg(short, long, global = true)]
    name: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the environment and wait until it is reachable
    Up,
    /// Destroy the environment and wait for it to disappear
    #[command(alias = "down")]
    Destroy,
    /// Snapshot the environment's disk
    Snapshot {
        /// Snapshot name (defaults to <environment>-snapshot)
        snapshot_name: Option<String>,
    },
    /// Print the environment's public IP
    Ip,
    /// List instances visible in the project
    List,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let user_path = skiff_config::find_user_config()?;
    let user = skiff_config::load_user_config(&user_path)?;

    let cwd = std::env::current_dir()?;
    let project_path = skiff_config::find_project_config(&cwd)?;
    let project = skiff_config::load_project_config(&project_path)?;

    let (cloud_name, cloud) = skiff_config::select_cloud(&user, cli.cloud.as_deref())?;
    tracing::debug!(cloud = %cloud_name, "cloud selected");

    let config = skiff_config::resolve(
        &skiff_config::default_layer(),
        &user,
        cloud_name,
        cloud,
        &project,
        cli.name.as_deref(),
    )?;

    let gateway: Arc<dyn CloudGateway> = match config.backend.clone() {
        Backend::OpenStack {
            auth_url,
            username,
            password,
            tenant_name,
            region,
        } => Arc::new(OpenStackGateway::new(OpenStackCredentials {
            auth_url,
            username,
            password,
            tenant_name,
            region,
        })),
        Backend::Ec2 {
            endpoint,
            access_key,
            secret_key,
            region,
        } => Arc::new(
            Ec2Gateway::new(Ec2Credentials {
                endpoint,
                access_key,
                secret_key,
                region,
            })
            .await,
        ),
    };

    let env = Environment::new(gateway, config);

    match cli.command {
        Commands::Up => commands::up::handle(&env).await,
        Commands::Destroy => commands::destroy::handle(&env).await,
        Commands::Snapshot { snapshot_name } => {
            commands::snapshot::handle(&env, snapshot_name.as_deref()).await
        }
        Commands::Ip => commands::ip::handle(&env).await,
        Commands::List => commands::list::handle(&env).await,
    }
}
