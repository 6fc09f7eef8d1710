use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;

use hublink::associate;
use hublink::config::AppConfig;
use hublink::dedup;
use hublink::hubspot::client::{CrmApi, HubspotClient};
use hublink::hubspot::types::ObjectKind;
use hublink::logging;

#[derive(Parser)]
#[clap(
    name = "hublink",
    about = "Deduplicate records and link contacts to deals and companies in a HubSpot CRM"
)]
struct Cli {
    #[clap(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Find and merge duplicate contacts
    DedupeContacts,

    /// Find and merge duplicate companies
    DedupeCompanies,

    /// Find and merge duplicate deals, transferring associations first
    DedupeDeals,

    /// Link recently created contacts to deals and companies derived from
    /// their job-posting key
    Associate,
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::configure_logging();

    let cli = Cli::parse();
    let config = AppConfig::from_env()?;
    let client = HubspotClient::new(&config.access_token, &config.base_url)?;

    match cli.command {
        Some(Commands::DedupeContacts) => {
            dedup::dedupe_kind(&client, ObjectKind::Contacts).await?;
        }
        Some(Commands::DedupeCompanies) => {
            dedup::dedupe_kind(&client, ObjectKind::Companies).await?;
        }
        Some(Commands::DedupeDeals) => {
            dedup::dedupe_kind(&client, ObjectKind::Deals).await?;
        }
        Some(Commands::Associate) => {
            associate::process_recent_contacts(&client, &config).await?;
        }
        None => run_all(&client, &config).await?,
    }

    Ok(())
}

/// The full batch: dedupe each record kind, then the association pass, in a
/// fixed order. Intended to be invoked by an external scheduler with no
/// arguments.
async fn run_all(api: &dyn CrmApi, config: &AppConfig) -> Result<()> {
    for kind in [ObjectKind::Contacts, ObjectKind::Companies, ObjectKind::Deals] {
        let summary = dedup::dedupe_kind(api, kind).await?;
        info!(
            "Deduped {}: {} merged across {} groups ({} failures)",
            kind, summary.merged, summary.groups, summary.failed
        );
    }

    let summary = associate::process_recent_contacts(api, config).await?;
    info!(
        "Association pass complete: {} contacts, {} unique keys, {} failures",
        summary.contacts_processed, summary.unique_keys, summary.failures
    );
    Ok(())
}
