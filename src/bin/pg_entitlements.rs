use clap::{Parser, Subcommand};
use log::{error, info};
use pg_entitlements::{
    Config, Connector, EntitlementId, GrantId, Pager, ResourceId, ResourceType,
};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to a TOML configuration file. Without one, configuration comes
    /// from PG_ENTITLEMENTS_* environment variables.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List resources of one type
    Resources {
        /// Resource type, e.g. role, database, schema, table
        #[arg(required = true)]
        resource_type: ResourceType,
        /// Parent resource id, e.g. database:16384
        #[arg(long)]
        parent: Option<ResourceId>,
        /// Cursor returned by the previous page
        #[arg(long, default_value = "")]
        cursor: String,
        /// Items per page (defaults to the configured page size)
        #[arg(long)]
        page_size: Option<u32>,
    },
    /// List the entitlements a resource offers
    Entitlements {
        #[arg(required = true)]
        resource: ResourceId,
    },
    /// List who holds entitlements on a resource
    Grants {
        #[arg(required = true)]
        resource: ResourceId,
        #[arg(long, default_value = "")]
        cursor: String,
        #[arg(long)]
        page_size: Option<u32>,
    },
    /// Grant an entitlement to a role
    Grant {
        #[arg(required = true)]
        entitlement: EntitlementId,
        /// Role id, e.g. role:16385
        #[arg(required = true)]
        principal: ResourceId,
    },
    /// Revoke a grant
    Revoke {
        #[arg(required = true)]
        grant: GrantId,
    },
}

fn load_config(path: Option<&PathBuf>) -> pg_entitlements::AccessResult<Config> {
    match path {
        Some(path) => Config::load_from_file(path),
        None => Config::from_env(),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(
    command: Commands,
    config: &Config,
    connector: &Connector<pg_entitlements::ClientPool>,
) -> Result<(), Box<dyn std::error::Error>> {
    let pager = |cursor: String, page_size: Option<u32>| {
        Pager::new(cursor, page_size.unwrap_or(config.page_size))
    };

    match command {
        Commands::Resources {
            resource_type,
            parent,
            cursor,
            page_size,
        } => {
            let page = connector
                .list(resource_type, parent.as_ref(), &pager(cursor, page_size))
                .await?;
            print_json(&page)?;
        }
        Commands::Entitlements { resource } => {
            let entitlements = connector.entitlements(&resource).await?;
            print_json(&entitlements)?;
        }
        Commands::Grants {
            resource,
            cursor,
            page_size,
        } => {
            let page = connector
                .grants(&resource, &pager(cursor, page_size))
                .await?;
            print_json(&page)?;
        }
        Commands::Grant {
            entitlement,
            principal,
        } => {
            connector.grant(&principal, &entitlement).await?;
            info!("Granted {} to {}", entitlement, principal);
        }
        Commands::Revoke { grant } => {
            connector.revoke(&grant).await?;
            info!("Revoked {}", grant);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_ref())?;
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.log_level))
        .init();

    let connector = Connector::connect(&config).await?;
    let result = run(cli.command, &config, &connector).await;
    connector.close();

    if let Err(e) = &result {
        error!("{}", e);
    }
    result
}
