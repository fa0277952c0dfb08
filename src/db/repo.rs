use super::model::CatalogStats;
use crate::model::{Catalog, CatalogItem, MarkOutcome, NewItem};
use futures::TryStreamExt;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqliteRow, SqliteSynchronous};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, info, instrument};

pub type Pool = SqlitePool;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{catalog}: item '{id}' already exists")]
    Duplicate { catalog: Catalog, id: String },
    #[error("{catalog}: item '{id}' not found")]
    NotFound { catalog: Catalog, id: String },
    #[error("item id must be non-empty")]
    InvalidId,
    #[error("delivery receipt must be nonzero")]
    InvalidReceipt,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

pub type StoreResult<T> = Result<T, StoreError>;

const ITEM_COLUMNS: &str = "ID, Title, Description, ImageURL, Link, Sent";

pub async fn init_pool(database_url: &str) -> StoreResult<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let options = SqliteConnectOptions::from_str(&normalized)?
        .create_if_missing(true)
        // Enable WAL and stricter durability.
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Full);
    let pool = SqlitePool::connect_with(options).await?;
    info!(url = %normalized, "opened catalog database");
    Ok(pool)
}

/// If using a file-backed SQLite URL, expand a leading `~/` and ensure the parent
/// directory exists. Leaves in-memory URLs untouched. Returns possibly-updated URL.
fn prepare_sqlite_url(url: &str) -> String {
    if !url.starts_with("sqlite:") || url.starts_with("sqlite::memory") {
        return url.to_string();
    }

    let rest = &url["sqlite:".len()..];
    let path_with_query = rest.strip_prefix("//").unwrap_or(rest);

    let (path_part, query_part) = match path_with_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_with_query, None),
    };

    if path_part.is_empty() {
        return url.to_string();
    }

    let expanded_path = match (path_part.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(rest), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), rest),
        _ => path_part.to_string(),
    };

    if let Some(parent) = std::path::Path::new(&expanded_path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    let mut rebuilt = String::from("sqlite://");
    rebuilt.push_str(&expanded_path);
    if let Some(q) = query_part {
        rebuilt.push('?');
        rebuilt.push_str(q);
    }
    rebuilt
}

pub async fn run_migrations(pool: &Pool) -> StoreResult<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

fn validate_id(id: &str) -> StoreResult<()> {
    if id.trim().is_empty() {
        return Err(StoreError::InvalidId);
    }
    Ok(())
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.is_unique_violation(),
        _ => false,
    }
}

fn item_from_row(row: &SqliteRow) -> Result<CatalogItem, sqlx::Error> {
    Ok(CatalogItem {
        id: row.try_get("ID")?,
        title: row.try_get("Title")?,
        description: row.try_get("Description")?,
        image_url: row.try_get("ImageURL")?,
        link: row.try_get("Link")?,
        sent: row.try_get("Sent")?,
    })
}

/// Insert a new pending item. A second insert with the same ID fails with
/// [`StoreError::Duplicate`].
#[instrument(skip_all, fields(catalog = %catalog, id = %item.id))]
pub async fn insert_item(pool: &Pool, catalog: Catalog, item: &NewItem) -> StoreResult<()> {
    validate_id(&item.id)?;
    let sql = format!(
        "INSERT INTO {} (ID, Title, Description, ImageURL, Link) VALUES (?, ?, ?, ?, ?)",
        catalog.table()
    );
    let res = sqlx::query(&sql)
        .bind(&item.id)
        .bind(&item.title)
        .bind(&item.description)
        .bind(&item.image_url)
        .bind(&item.link)
        .execute(pool)
        .await;
    match res {
        Ok(_) => Ok(()),
        Err(err) if is_unique_violation(&err) => Err(StoreError::Duplicate {
            catalog,
            id: item.id.clone(),
        }),
        Err(err) => Err(err.into()),
    }
}

/// Insert the item unless a row with the same ID already exists. Returns
/// whether a row was created.
#[instrument(skip_all, fields(catalog = %catalog, id = %item.id))]
pub async fn insert_if_absent(pool: &Pool, catalog: Catalog, item: &NewItem) -> StoreResult<bool> {
    let mut tx = pool.begin().await?;
    let created = insert_if_absent_tx(&mut tx, catalog, item).await?;
    tx.commit().await?;
    Ok(created)
}

async fn insert_if_absent_tx(
    tx: &mut Transaction<'_, Sqlite>,
    catalog: Catalog,
    item: &NewItem,
) -> StoreResult<bool> {
    validate_id(&item.id)?;
    let sql = format!(
        "INSERT INTO {} (ID, Title, Description, ImageURL, Link) VALUES (?, ?, ?, ?, ?) \
         ON CONFLICT(ID) DO NOTHING",
        catalog.table()
    );
    let res = sqlx::query(&sql)
        .bind(&item.id)
        .bind(&item.title)
        .bind(&item.description)
        .bind(&item.image_url)
        .bind(&item.link)
        .execute(&mut **tx)
        .await?;
    Ok(res.rows_affected() == 1)
}

/// Store one scrape's worth of items in a single transaction. Known IDs are
/// skipped; any failure rolls back every row of this call. Items should be
/// passed oldest first so insertion order matches publication order.
#[instrument(skip_all, fields(catalog = %catalog, count = items.len()))]
pub async fn record_discovered(
    pool: &Pool,
    catalog: Catalog,
    items: &[NewItem],
) -> StoreResult<usize> {
    let mut tx = pool.begin().await?;
    let mut created = 0;
    for item in items {
        if insert_if_absent_tx(&mut tx, catalog, item).await? {
            debug!(id = %item.id, "new item");
            created += 1;
        }
    }
    tx.commit().await?;
    info!(created, "recorded discovered items");
    Ok(created)
}

#[instrument(skip_all, fields(catalog = %catalog))]
pub async fn exists(pool: &Pool, catalog: Catalog, id: &str) -> StoreResult<bool> {
    let sql = format!("SELECT 1 FROM {} WHERE ID = ?", catalog.table());
    let found = sqlx::query_scalar::<_, i64>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(found.is_some())
}

/// Every stored ID, in insertion order.
#[instrument(skip_all, fields(catalog = %catalog))]
pub async fn known_ids(pool: &Pool, catalog: Catalog) -> StoreResult<Vec<String>> {
    let sql = format!("SELECT ID FROM {} ORDER BY rowid ASC", catalog.table());
    let ids: Vec<String> = sqlx::query_scalar::<_, String>(&sql).fetch(pool).try_collect().await?;
    Ok(ids)
}

#[instrument(skip_all, fields(catalog = %catalog))]
pub async fn get_item(pool: &Pool, catalog: Catalog, id: &str) -> StoreResult<Option<CatalogItem>> {
    let sql = format!("SELECT {} FROM {} WHERE ID = ?", ITEM_COLUMNS, catalog.table());
    let row = sqlx::query(&sql).bind(id).fetch_optional(pool).await?;
    Ok(row.as_ref().map(item_from_row).transpose()?)
}

/// Pending items, oldest first.
#[instrument(skip_all, fields(catalog = %catalog))]
pub async fn unsent(pool: &Pool, catalog: Catalog) -> StoreResult<Vec<CatalogItem>> {
    let sql = format!(
        "SELECT {} FROM {} WHERE Sent = 0 ORDER BY rowid ASC",
        ITEM_COLUMNS,
        catalog.table()
    );
    let rows = sqlx::query(&sql).fetch_all(pool).await?;
    let items = rows
        .iter()
        .map(item_from_row)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(items)
}

/// Record delivery of an item. The transition happens in a single conditional
/// UPDATE, so concurrent callers cannot both observe `Marked`. Repeating the
/// call for a delivered item is a no-op that reports the stored receipt.
#[instrument(skip_all, fields(catalog = %catalog, id = %id, receipt = receipt))]
pub async fn mark_sent(
    pool: &Pool,
    catalog: Catalog,
    id: &str,
    receipt: i64,
) -> StoreResult<MarkOutcome> {
    validate_id(id)?;
    if receipt == 0 {
        return Err(StoreError::InvalidReceipt);
    }

    let sql = format!("UPDATE {} SET Sent = ? WHERE ID = ? AND Sent = 0", catalog.table());
    let res = sqlx::query(&sql).bind(receipt).bind(id).execute(pool).await?;
    if res.rows_affected() == 1 {
        info!("marked item as sent");
        return Ok(MarkOutcome::Marked);
    }

    let sql = format!("SELECT Sent FROM {} WHERE ID = ?", catalog.table());
    let existing = sqlx::query_scalar::<_, i64>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    match existing {
        Some(stored) if stored != 0 => {
            debug!(stored, "item already sent");
            Ok(MarkOutcome::AlreadySent(stored))
        }
        // Absent at the time of the UPDATE.
        _ => Err(StoreError::NotFound {
            catalog,
            id: id.to_string(),
        }),
    }
}

#[instrument(skip_all, fields(catalog = %catalog))]
pub async fn stats(pool: &Pool, catalog: Catalog) -> StoreResult<CatalogStats> {
    let sql = format!(
        "SELECT COUNT(*), COALESCE(SUM(CASE WHEN Sent = 0 THEN 1 ELSE 0 END), 0) FROM {}",
        catalog.table()
    );
    let (total, pending): (i64, i64) = sqlx::query_as(&sql).fetch_one(pool).await?;
    Ok(CatalogStats {
        catalog,
        total,
        pending,
        delivered: total - pending,
    })
}
