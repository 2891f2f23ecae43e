//! Swipe session snapshot persistence
//!
//! Decisions are taken on the interaction path and must not wait for the database, so
//! `save` only captures the snapshot and hands it off. `SqliteSnapshotStore` queues
//! snapshots to a single writer task that applies them in order; `flush` waits until
//! everything queued before it is written. Write failures are logged and counted, and
//! never reach the session.

use crate::error::{Error, Result};
use async_trait::async_trait;
use namedeck_common::model::SessionSnapshot;
use namedeck_common::DeckType;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// Durable storage of session snapshots, one record per session key
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Capture a snapshot for writing; never suspends
    fn save(&self, key: &str, snapshot: &SessionSnapshot);

    /// Latest snapshot for `key`, including any still queued for writing
    async fn load(&self, key: &str) -> Result<Option<SessionSnapshot>>;

    /// Wait until every snapshot saved so far is durable
    async fn flush(&self) -> Result<()>;
}

// ============================================================================
// SQLite
// ============================================================================

enum WriterCommand {
    Save {
        key: String,
        snapshot: SessionSnapshot,
    },
    Flush(oneshot::Sender<()>),
}

pub struct SqliteSnapshotStore {
    pool: SqlitePool,
    tx: mpsc::UnboundedSender<WriterCommand>,
    write_failures: Arc<AtomicUsize>,
}

impl SqliteSnapshotStore {
    /// Create the store and spawn its writer task (requires a Tokio runtime)
    pub fn new(pool: SqlitePool) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let write_failures = Arc::new(AtomicUsize::new(0));
        tokio::spawn(writer_loop(pool.clone(), rx, Arc::clone(&write_failures)));

        Self {
            pool,
            tx,
            write_failures,
        }
    }

    /// Snapshots that could not be written since startup
    pub fn write_failures(&self) -> usize {
        self.write_failures.load(Ordering::Relaxed)
    }
}

async fn writer_loop(
    pool: SqlitePool,
    mut rx: mpsc::UnboundedReceiver<WriterCommand>,
    write_failures: Arc<AtomicUsize>,
) {
    while let Some(command) = rx.recv().await {
        match command {
            WriterCommand::Save { key, snapshot } => {
                if let Err(e) = upsert_snapshot(&pool, &key, &snapshot).await {
                    write_failures.fetch_add(1, Ordering::Relaxed);
                    warn!(session_key = %key, "Failed to persist swipe session: {}", e);
                }
            }
            WriterCommand::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }
    debug!("Snapshot writer stopped");
}

#[async_trait]
impl SnapshotStore for SqliteSnapshotStore {
    fn save(&self, key: &str, snapshot: &SessionSnapshot) {
        let command = WriterCommand::Save {
            key: key.to_string(),
            snapshot: snapshot.clone(),
        };
        if self.tx.send(command).is_err() {
            self.write_failures.fetch_add(1, Ordering::Relaxed);
            warn!(session_key = %key, "Snapshot writer is gone, snapshot dropped");
        }
    }

    async fn load(&self, key: &str) -> Result<Option<SessionSnapshot>> {
        self.flush().await?;
        read_snapshot(&self.pool, key).await
    }

    async fn flush(&self) -> Result<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send(WriterCommand::Flush(ack_tx))
            .map_err(|_| Error::Internal("Snapshot writer is gone".to_string()))?;
        ack_rx
            .await
            .map_err(|_| Error::Internal("Snapshot writer stopped before flushing".to_string()))
    }
}

/// Insert or replace the snapshot row for `key`
pub async fn upsert_snapshot(pool: &SqlitePool, key: &str, snapshot: &SessionSnapshot) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO swipe_sessions
            (session_key, liked_ids, disliked_ids, super_liked_ids, position, deck_type, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, CURRENT_TIMESTAMP)
        ON CONFLICT(session_key) DO UPDATE SET
            liked_ids = excluded.liked_ids,
            disliked_ids = excluded.disliked_ids,
            super_liked_ids = excluded.super_liked_ids,
            position = excluded.position,
            deck_type = excluded.deck_type,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(key)
    .bind(serde_json::to_string(&snapshot.liked_ids)?)
    .bind(serde_json::to_string(&snapshot.disliked_ids)?)
    .bind(serde_json::to_string(&snapshot.super_liked_ids)?)
    .bind(snapshot.position as i64)
    .bind(snapshot.deck_type.to_string())
    .execute(pool)
    .await?;

    Ok(())
}

/// Read the snapshot row for `key`
pub async fn read_snapshot(pool: &SqlitePool, key: &str) -> Result<Option<SessionSnapshot>> {
    let row: Option<(String, String, String, i64, String)> = sqlx::query_as(
        r#"
        SELECT liked_ids, disliked_ids, super_liked_ids, position, deck_type
        FROM swipe_sessions
        WHERE session_key = ?
        "#,
    )
    .bind(key)
    .fetch_optional(pool)
    .await?;

    let Some((liked, disliked, super_liked, position, deck_type)) = row else {
        return Ok(None);
    };

    let deck_type = deck_type.parse::<DeckType>().unwrap_or_else(|e| {
        warn!(session_key = %key, "Stored deck type unreadable, using default: {}", e);
        DeckType::default()
    });

    Ok(Some(SessionSnapshot {
        liked_ids: serde_json::from_str(&liked)?,
        disliked_ids: serde_json::from_str(&disliked)?,
        super_liked_ids: serde_json::from_str(&super_liked)?,
        position: position.max(0) as usize,
        deck_type,
    }))
}

// ============================================================================
// In-memory
// ============================================================================

/// Snapshot store without durability, for ephemeral sessions and tests
#[derive(Default)]
pub struct MemorySnapshotStore {
    snapshots: Mutex<HashMap<String, SessionSnapshot>>,
    saves: AtomicUsize,
    failing: AtomicBool,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with one snapshot
    pub fn with_snapshot(key: &str, snapshot: SessionSnapshot) -> Self {
        let store = Self::default();
        if let Ok(mut snapshots) = store.snapshots.lock() {
            snapshots.insert(key.to_string(), snapshot);
        }
        store
    }

    /// Make subsequent saves fail (they are logged and dropped)
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }

    /// Saves attempted so far
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::Relaxed)
    }

    pub fn get(&self, key: &str) -> Option<SessionSnapshot> {
        self.snapshots.lock().ok().and_then(|s| s.get(key).cloned())
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    fn save(&self, key: &str, snapshot: &SessionSnapshot) {
        self.saves.fetch_add(1, Ordering::Relaxed);
        if self.failing.load(Ordering::Relaxed) {
            warn!(session_key = %key, "Failed to persist swipe session: store unavailable");
            return;
        }
        if let Ok(mut snapshots) = self.snapshots.lock() {
            snapshots.insert(key.to_string(), snapshot.clone());
        }
    }

    async fn load(&self, key: &str) -> Result<Option<SessionSnapshot>> {
        Ok(self.get(key))
    }

    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_test_db() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        crate::db::create_tables(&pool).await.unwrap();
        pool
    }

    fn snapshot(position: usize) -> SessionSnapshot {
        SessionSnapshot {
            liked_ids: vec![1, 4],
            disliked_ids: vec![2],
            super_liked_ids: vec![4],
            position,
            deck_type: DeckType::Category("nature".into()),
        }
    }

    #[tokio::test]
    async fn test_sqlite_store_last_write_wins() {
        let store = SqliteSnapshotStore::new(setup_test_db().await);

        store.save("default", &snapshot(3));
        store.save("default", &snapshot(4));

        let loaded = store.load("default").await.unwrap().unwrap();
        assert_eq!(loaded, snapshot(4));
        assert_eq!(store.write_failures(), 0);
    }

    #[tokio::test]
    async fn test_sqlite_store_missing_key() {
        let store = SqliteSnapshotStore::new(setup_test_db().await);
        assert!(store.load("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sqlite_write_failure_is_counted_not_raised() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        // No tables: every write fails
        let store = SqliteSnapshotStore::new(pool);

        store.save("default", &snapshot(1));
        store.flush().await.unwrap();

        assert_eq!(store.write_failures(), 1);
    }

    #[tokio::test]
    async fn test_memory_store_failing_mode() {
        let store = MemorySnapshotStore::new();
        store.set_failing(true);
        store.save("default", &snapshot(1));
        assert!(store.load("default").await.unwrap().is_none());

        store.set_failing(false);
        store.save("default", &snapshot(2));
        assert_eq!(store.get("default"), Some(snapshot(2)));
        assert_eq!(store.save_count(), 2);
    }
}
