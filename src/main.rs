use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, warn};

use jwst_galley::config;
use jwst_galley::db;
use jwst_galley::model::{Catalog, CatalogItem, MarkOutcome, NewItem};
use jwst_galley::settings;

#[derive(Debug, Parser)]
#[command(author, version, about = "Inspect and maintain the JWST Galley item catalog")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Settings artifact; its LOG_LEVEL becomes the default log filter
    #[arg(long, default_value = "settings.conf")]
    settings: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create the catalog tables if they do not exist yet
    Init,
    /// Record an item unless one with the same ID is already stored
    Add {
        #[arg(long, value_enum)]
        catalog: Catalog,
        #[arg(long)]
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        image_url: Option<String>,
        #[arg(long)]
        link: Option<String>,
    },
    /// List items not yet delivered, oldest first
    Pending {
        #[arg(long, value_enum)]
        catalog: Catalog,
        /// Print JSON instead of one line per item
        #[arg(long)]
        json: bool,
    },
    /// Show one item
    Show {
        #[arg(long, value_enum)]
        catalog: Catalog,
        #[arg(long)]
        id: String,
    },
    /// Record delivery of an item
    MarkSent {
        #[arg(long, value_enum)]
        catalog: Catalog,
        #[arg(long)]
        id: String,
        /// Nonzero delivery receipt, e.g. the channel message id
        #[arg(long, default_value = "1")]
        receipt: i64,
    },
    /// Item counts per catalog
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let directive = match settings::load(&args.settings) {
        Ok(s) => s.log_directive(),
        Err(_) => "info",
    };
    jwst_galley::init_tracing(directive);

    let cfg = config::load_or_default(&args.config)?;
    cfg.ensure_dirs()?;

    let database_url = cfg.database_url();
    let pool = db::init_pool(&database_url)
        .await
        .with_context(|| format!("failed to open {}", database_url))?;
    db::run_migrations(&pool).await?;

    match args.command {
        Command::Init => {
            info!(database_url = %database_url, "catalog schema is up to date");
        }
        Command::Add {
            catalog,
            id,
            title,
            description,
            image_url,
            link,
        } => {
            let item = NewItem {
                id,
                title,
                description,
                image_url,
                link,
            };
            if db::insert_if_absent(&pool, catalog, &item).await? {
                println!("added {}/{}", catalog, item.id);
            } else {
                println!("{}/{} already known", catalog, item.id);
            }
        }
        Command::Pending { catalog, json } => {
            let items = db::unsent(&pool, catalog).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&items)?);
            } else {
                for item in &items {
                    println!("{}", summary_line(item));
                }
                info!(%catalog, count = items.len(), "pending items");
            }
        }
        Command::Show { catalog, id } => match db::get_item(&pool, catalog, &id).await? {
            Some(item) => println!("{}", serde_json::to_string_pretty(&item)?),
            None => {
                warn!(%catalog, id = %id, "item not found");
                anyhow::bail!("{}/{} not found", catalog, id);
            }
        },
        Command::MarkSent {
            catalog,
            id,
            receipt,
        } => match db::mark_sent(&pool, catalog, &id, receipt).await? {
            MarkOutcome::Marked => println!("{}/{} marked sent ({})", catalog, id, receipt),
            MarkOutcome::AlreadySent(existing) => {
                println!("{}/{} was already sent ({})", catalog, id, existing)
            }
        },
        Command::Stats => {
            for catalog in Catalog::ALL {
                let s = db::stats(&pool, catalog).await?;
                println!(
                    "{:<10} total={} pending={} delivered={}",
                    s.catalog.table(),
                    s.total,
                    s.pending,
                    s.delivered
                );
            }
        }
    }

    pool.close().await;
    Ok(())
}

fn summary_line(item: &CatalogItem) -> String {
    format!(
        "{}\t{}\t{}",
        item.id,
        item.title.as_deref().unwrap_or("-"),
        item.link.as_deref().unwrap_or("-")
    )
}
