// # SQLite Subscription Store
//
// SQLx-backed implementation of SubscriptionStore.
//
// ## Schema
//
// ```text
// mappings(id, name UNIQUE NOCASE, twitter, resolved_at)
//     ^
//     | mapping (ON DELETE CASCADE)
// subscribers(id, chat, mapping, keywords, UNIQUE(chat, mapping))
// ```
//
// The schema is created on connect. Orphaned mappings are pruned after
// every removal and resolution update.

use async_trait::async_trait;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info};

use crate::Error;
use crate::traits::subscription_store::{Subscriber, Subscription, SubscriptionStore, TrackedAccount};

static MEMDB_COUNTER: AtomicU64 = AtomicU64::new(0);

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS mappings (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL COLLATE NOCASE UNIQUE,
        twitter INTEGER NOT NULL DEFAULT 0,
        resolved_at INTEGER
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS subscribers (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        chat INTEGER NOT NULL,
        mapping INTEGER NOT NULL REFERENCES mappings(id) ON DELETE CASCADE,
        keywords TEXT,
        UNIQUE(chat, mapping)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS subscribers_mapping ON subscribers(mapping)",
    "CREATE INDEX IF NOT EXISTS mappings_twitter ON mappings(twitter)",
];

const PRUNE: &str = "DELETE FROM mappings WHERE id NOT IN (SELECT mapping FROM subscribers)";

/// SQLite subscription store
///
/// # Example
///
/// ```rust,no_run
/// use std::time::Duration;
/// use watcher_core::store::SqliteSubscriptionStore;
/// use watcher_core::traits::SubscriptionStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = SqliteSubscriptionStore::connect("/var/lib/watcher/watcher.db", Duration::from_secs(180)).await?;
///     store.add_subscription(555, "alice", None).await?;
///     store.close().await?;
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct SqliteSubscriptionStore {
    pool: SqlitePool,
}

impl SqliteSubscriptionStore {
    /// Open (or create) the database at `path` and ensure the schema exists
    ///
    /// `":memory:"` opens a private in-memory database.
    pub async fn connect(path: &str, acquire_timeout: Duration) -> Result<Self, Error> {
        let pool = if path == ":memory:" {
            // Unique shared-cache name so parallel stores do not collide.
            let id = MEMDB_COUNTER.fetch_add(1, Ordering::Relaxed);
            let uri = format!(
                "file:watcher-memdb-{}-{}?mode=memory&cache=shared",
                std::process::id(),
                id
            );
            let options = SqliteConnectOptions::new()
                .filename(&uri)
                .shared_cache(true)
                .foreign_keys(true)
                .create_if_missing(true);

            SqlitePoolOptions::new()
                .max_connections(1)
                .acquire_timeout(acquire_timeout)
                .connect_with(options)
                .await?
        } else {
            if let Some(parent) = Path::new(path).parent()
                && !parent.as_os_str().is_empty()
                && let Err(e) = std::fs::create_dir_all(parent)
            {
                tracing::warn!(path = %parent.display(), error = %e, "Failed to create database directory");
            }

            let options = SqliteConnectOptions::new()
                .filename(path)
                .foreign_keys(true)
                .journal_mode(SqliteJournalMode::Wal)
                .create_if_missing(true);

            SqlitePoolOptions::new()
                .max_connections(5)
                .acquire_timeout(acquire_timeout)
                .connect_with(options)
                .await?
        };

        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }

        info!(path = %path, "Subscription database connected");
        Ok(Self { pool })
    }
}

fn to_resolved(value: i64) -> u64 {
    u64::try_from(value).unwrap_or_default()
}

fn to_column(resolved_id: u64) -> Result<i64, Error> {
    i64::try_from(resolved_id)
        .map_err(|_| Error::invalid_input(format!("resolved ID {} out of range", resolved_id)))
}

#[async_trait]
impl SubscriptionStore for SqliteSubscriptionStore {
    async fn add_subscription(
        &self,
        chat_id: i64,
        name: &str,
        keywords: Option<&str>,
    ) -> Result<u64, Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT INTO mappings (name) VALUES (?) ON CONFLICT(name) DO NOTHING")
            .bind(name)
            .execute(&mut *tx)
            .await?;

        let (mapping, twitter): (i64, i64) =
            sqlx::query_as("SELECT id, twitter FROM mappings WHERE name = ?")
                .bind(name)
                .fetch_one(&mut *tx)
                .await?;

        sqlx::query(
            r#"
            INSERT INTO subscribers (chat, mapping, keywords) VALUES (?, ?, ?)
            ON CONFLICT(chat, mapping) DO UPDATE SET keywords = excluded.keywords
            "#,
        )
        .bind(chat_id)
        .bind(mapping)
        .bind(keywords)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(to_resolved(twitter))
    }

    async fn remove_subscription(&self, chat_id: i64, name: &str) -> Result<(), Error> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "DELETE FROM subscribers WHERE chat = ? AND mapping IN (SELECT id FROM mappings WHERE name = ?)",
        )
        .bind(chat_id)
        .bind(name)
        .execute(&mut *tx)
        .await?;
        sqlx::query(PRUNE).execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn remove_all(&self, chat_id: i64) -> Result<(), Error> {
        let mut tx = self.pool.begin().await?;
        let removed = sqlx::query("DELETE FROM subscribers WHERE chat = ?")
            .bind(chat_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        sqlx::query(PRUNE).execute(&mut *tx).await?;
        tx.commit().await?;
        debug!("Removed {} subscriptions for chat {}", removed, chat_id);
        Ok(())
    }

    async fn list_for_chat(&self, chat_id: i64) -> Result<Vec<Subscription>, Error> {
        let rows: Vec<(String, i64, Option<String>)> = sqlx::query_as(
            r#"
            SELECT m.name, m.twitter, s.keywords
            FROM subscribers s INNER JOIN mappings m ON m.id = s.mapping
            WHERE s.chat = ?
            ORDER BY m.name
            "#,
        )
        .bind(chat_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(name, twitter, keywords)| Subscription {
                name,
                resolved_id: to_resolved(twitter),
                keywords,
            })
            .collect())
    }

    async fn all_tracked_accounts(&self, force_all: bool) -> Result<Vec<TrackedAccount>, Error> {
        sqlx::query(PRUNE).execute(&self.pool).await?;

        let query = if force_all {
            "SELECT id, name, twitter, resolved_at FROM mappings ORDER BY id"
        } else {
            "SELECT id, name, twitter, resolved_at FROM mappings WHERE twitter = 0 ORDER BY id"
        };
        let rows: Vec<(i64, String, i64, Option<i64>)> =
            sqlx::query_as(query).fetch_all(&self.pool).await?;

        Ok(rows
            .into_iter()
            .map(|(id, name, twitter, resolved_at)| TrackedAccount {
                id,
                name,
                resolved_id: to_resolved(twitter),
                last_resolved: resolved_at.and_then(|ts| chrono::DateTime::from_timestamp(ts, 0)),
            })
            .collect())
    }

    async fn update_resolution(&self, id: i64, resolved_id: u64, name: &str) -> Result<(), Error> {
        let twitter = to_column(resolved_id)?;
        let mut tx = self.pool.begin().await?;

        let exists: Option<(i64,)> = sqlx::query_as("SELECT id FROM mappings WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(Error::store(format!("tracked account {} does not exist", id)));
        }

        // A rename onto a name that is already tracked merges the two rows.
        let collision: Option<(i64,)> =
            sqlx::query_as("SELECT id FROM mappings WHERE name = ? AND id != ?")
                .bind(name)
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;

        let target = match collision {
            Some((existing,)) => {
                sqlx::query("UPDATE OR IGNORE subscribers SET mapping = ? WHERE mapping = ?")
                    .bind(existing)
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
                sqlx::query("DELETE FROM mappings WHERE id = ?")
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
                debug!("Merged tracked account {} into {} ({})", id, existing, name);
                existing
            }
            None => id,
        };

        sqlx::query("UPDATE mappings SET twitter = ?, name = ?, resolved_at = ? WHERE id = ?")
            .bind(twitter)
            .bind(name)
            .bind(chrono::Utc::now().timestamp())
            .bind(target)
            .execute(&mut *tx)
            .await?;
        sqlx::query(PRUNE).execute(&mut *tx).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn distinct_watched_resolved_ids(&self) -> Result<Vec<u64>, Error> {
        let rows: Vec<(i64,)> = sqlx::query_as(
            r#"
            SELECT DISTINCT m.twitter
            FROM mappings m INNER JOIN subscribers s ON s.mapping = m.id
            WHERE m.twitter != 0
            ORDER BY m.twitter
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(twitter,)| to_resolved(twitter)).collect())
    }

    async fn subscribers_for_resolved_id(&self, resolved_id: u64) -> Result<Vec<Subscriber>, Error> {
        let rows: Vec<(i64, Option<String>)> = sqlx::query_as(
            r#"
            SELECT s.chat, s.keywords
            FROM subscribers s INNER JOIN mappings m ON m.id = s.mapping
            WHERE m.twitter = ?
            ORDER BY s.id
            "#,
        )
        .bind(to_column(resolved_id)?)
        .fetch_all(&self.pool)
        .await?;

        let mut seen = std::collections::HashSet::new();
        Ok(rows
            .into_iter()
            .filter(|(chat, _)| seen.insert(*chat))
            .map(|(chat_id, keywords)| Subscriber { chat_id, keywords })
            .collect())
    }

    async fn close(&self) -> Result<(), Error> {
        self.pool.close().await;
        info!("Subscription database closed");
        Ok(())
    }
}
