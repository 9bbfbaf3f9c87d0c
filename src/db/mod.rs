//! Durable source → destination order mapping.
//!
//! The presence of a source order id in this store is the de-duplication
//! signal for the reconciliation loop. Rows are written once and never updated.
//! The full table is loaded into memory at open; every `put` is committed to
//! SQLite (synchronous = FULL) before it returns.

use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{CopierError, CopierResult};
use crate::models::OrderSide;

/// One successful mirror.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct MappingEntry {
    pub source_order_id: String,
    pub destination_order_id: String,
    pub symbol: String,
    pub side: String,
    pub source_quantity: i64,
    pub destination_quantity: i64,
    pub created_at: DateTime<Utc>,
}

/// Audit fields recorded alongside a mapping.
#[derive(Debug, Clone, Copy)]
pub struct MappingDetails<'a> {
    pub symbol: &'a str,
    pub side: OrderSide,
    pub source_quantity: u32,
    pub destination_quantity: u64,
}

/// Single-writer mapping store backed by SQLite.
pub struct MappingStore {
    pool: SqlitePool,
    index: HashMap<String, MappingEntry>,
}

impl MappingStore {
    /// Open (or create) the store and load every existing mapping.
    pub async fn open(database_url: &str) -> CopierResult<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .synchronous(SqliteSynchronous::Full);

        // One connection: one writer, and `sqlite::memory:` stays a single database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let mut store = Self {
            pool,
            index: HashMap::new(),
        };
        store.run_migrations().await?;
        store.load().await?;

        debug!(mappings = store.index.len(), "Mapping store opened");
        Ok(store)
    }

    async fn run_migrations(&self) -> CopierResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS order_mappings (
                source_order_id TEXT PRIMARY KEY,
                destination_order_id TEXT NOT NULL,
                symbol TEXT NOT NULL DEFAULT '',
                side TEXT NOT NULL DEFAULT '',
                source_quantity INTEGER NOT NULL DEFAULT 0,
                destination_quantity INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_order_mappings_created ON order_mappings(created_at)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn load(&mut self) -> CopierResult<()> {
        let rows = self.entries().await?;
        self.index = rows
            .into_iter()
            .map(|e| (e.source_order_id.clone(), e))
            .collect();
        Ok(())
    }

    pub fn has(&self, source_order_id: &str) -> bool {
        self.index.contains_key(source_order_id)
    }

    pub fn get(&self, source_order_id: &str) -> Option<&MappingEntry> {
        self.index.get(source_order_id)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Record a mirror. Fails with `DuplicateKey` if `source_order_id` is present.
    pub async fn put(
        &mut self,
        source_order_id: &str,
        destination_order_id: &str,
        details: MappingDetails<'_>,
    ) -> CopierResult<MappingEntry> {
        if self.has(source_order_id) {
            return Err(CopierError::DuplicateKey(source_order_id.to_string()));
        }

        let entry = MappingEntry {
            source_order_id: source_order_id.to_string(),
            destination_order_id: destination_order_id.to_string(),
            symbol: details.symbol.to_string(),
            side: details.side.as_str().to_string(),
            source_quantity: i64::from(details.source_quantity),
            destination_quantity: i64::try_from(details.destination_quantity).unwrap_or(i64::MAX),
            created_at: Utc::now(),
        };

        let result = sqlx::query(
            r#"
            INSERT INTO order_mappings (
                source_order_id, destination_order_id, symbol, side,
                source_quantity, destination_quantity, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.source_order_id)
        .bind(&entry.destination_order_id)
        .bind(&entry.symbol)
        .bind(&entry.side)
        .bind(entry.source_quantity)
        .bind(entry.destination_quantity)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {}
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                return Err(CopierError::DuplicateKey(source_order_id.to_string()));
            }
            Err(e) => return Err(e.into()),
        }

        self.index
            .insert(entry.source_order_id.clone(), entry.clone());
        Ok(entry)
    }

    /// Every stored mapping, oldest first.
    pub async fn entries(&self) -> CopierResult<Vec<MappingEntry>> {
        let rows = sqlx::query_as::<_, MappingEntry>(
            "SELECT * FROM order_mappings ORDER BY created_at, rowid",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Flush and close the underlying pool.
    pub async fn close(self) {
        self.pool.close().await;
    }
}
