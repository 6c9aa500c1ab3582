//! Block storage: in-memory and SQLite.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use fs2::FileExt;
use rusqlite::{params, Connection};

use crate::idea::IdeaId;
use crate::integrity::{BlockPayload, ChainError, IntegrityBlock};

/// Ordered block storage behind an [`IntegrityChain`](crate::integrity::IntegrityChain).
///
/// `append` must either persist the whole block or fail without side effects.
pub trait ChainStore: Send + Sync {
    fn append(&self, block: &IntegrityBlock) -> Result<(), ChainError>;

    /// Every block in append order.
    fn load(&self) -> Result<Vec<IntegrityBlock>, ChainError>;

    fn load_for(&self, idea_id: &IdeaId) -> Result<Vec<IntegrityBlock>, ChainError> {
        Ok(self
            .load()?
            .into_iter()
            .filter(|b| &b.payload.idea_id == idea_id)
            .collect())
    }
}

// =============================================================================
// Memory
// =============================================================================

#[derive(Debug, Default)]
pub struct MemoryChainStore {
    blocks: RwLock<Vec<IntegrityBlock>>,
}

impl MemoryChainStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from existing blocks as-is; nothing is checked until `verify`.
    pub fn from_blocks(blocks: Vec<IntegrityBlock>) -> Self {
        Self {
            blocks: RwLock::new(blocks),
        }
    }
}

impl ChainStore for MemoryChainStore {
    fn append(&self, block: &IntegrityBlock) -> Result<(), ChainError> {
        let mut blocks = self.blocks.write().map_err(|_| ChainError::Poisoned)?;
        blocks.push(block.clone());
        Ok(())
    }

    fn load(&self) -> Result<Vec<IntegrityBlock>, ChainError> {
        let blocks = self.blocks.read().map_err(|_| ChainError::Poisoned)?;
        Ok(blocks.clone())
    }
}

// =============================================================================
// SQLite
// =============================================================================

#[derive(Clone)]
pub struct SqliteChainStore {
    path: PathBuf,
    conn: Arc<Mutex<Connection>>,
}

impl SqliteChainStore {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, ChainError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(&path)?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;\
             PRAGMA synchronous=NORMAL;\
             CREATE TABLE IF NOT EXISTS integrity_chain (\
               seq INTEGER PRIMARY KEY AUTOINCREMENT,\
               block_index INTEGER NOT NULL UNIQUE,\
               timestamp_ms INTEGER NOT NULL,\
               idea_id TEXT NOT NULL,\
               content_hash TEXT NOT NULL,\
               previous_hash TEXT NOT NULL,\
               block_hash TEXT NOT NULL\
             );\
             CREATE INDEX IF NOT EXISTS integrity_chain_idea ON integrity_chain(idea_id);\
             CREATE TRIGGER IF NOT EXISTS integrity_chain_no_update \
               BEFORE UPDATE ON integrity_chain \
               BEGIN SELECT RAISE(ABORT, 'integrity_chain is append-only'); END;\
             CREATE TRIGGER IF NOT EXISTS integrity_chain_no_delete \
               BEFORE DELETE ON integrity_chain \
               BEGIN SELECT RAISE(ABORT, 'integrity_chain is append-only'); END;",
        )?;

        Ok(Self {
            path,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn default_path() -> PathBuf {
        if let Ok(path) = std::env::var("IDEA_RANK_CHAIN_PATH") {
            return PathBuf::from(path);
        }
        PathBuf::from(".idea_rank_chain.sqlite")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Cross-process single-writer lock; hold it for the lifetime of the writer.
    pub fn lock_exclusive(&self) -> Result<ChainLock, ChainError> {
        ChainLock::new(&self.path)
    }

    fn with_conn<F, R>(&self, f: F) -> Result<R, ChainError>
    where
        F: FnOnce(&Connection) -> Result<R, ChainError>,
    {
        let guard = self.conn.lock().map_err(|_| ChainError::Poisoned)?;
        f(&guard)
    }

    fn query_blocks(
        conn: &Connection,
        sql: &str,
        args: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<IntegrityBlock>, ChainError> {
        let mut stmt = conn.prepare(sql)?;
        let mut rows = stmt.query(args)?;
        let mut blocks = Vec::new();
        while let Some(row) = rows.next()? {
            // negative values only appear after tampering; keep them visible to verify
            let index = row.get::<_, i64>(0)? as u64;
            blocks.push(IntegrityBlock {
                index,
                timestamp_ms: row.get(1)?,
                payload: BlockPayload {
                    idea_id: IdeaId::new(row.get::<_, String>(2)?),
                    content_hash: row.get(3)?,
                },
                previous_hash: row.get(4)?,
                hash: row.get(5)?,
            });
        }
        Ok(blocks)
    }
}

const SELECT_BLOCKS: &str = "SELECT block_index, timestamp_ms, idea_id, content_hash, previous_hash, block_hash \
                             FROM integrity_chain";

impl ChainStore for SqliteChainStore {
    fn append(&self, block: &IntegrityBlock) -> Result<(), ChainError> {
        let index = i64::try_from(block.index).map_err(|_| ChainError::IndexOverflow)?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO integrity_chain (\
                    block_index, timestamp_ms, idea_id, content_hash, previous_hash, block_hash\
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    index,
                    block.timestamp_ms,
                    block.payload.idea_id.as_str(),
                    block.payload.content_hash,
                    block.previous_hash,
                    block.hash,
                ],
            )?;
            Ok(())
        })
    }

    fn load(&self) -> Result<Vec<IntegrityBlock>, ChainError> {
        self.with_conn(|conn| {
            Self::query_blocks(conn, &format!("{SELECT_BLOCKS} ORDER BY seq"), &[])
        })
    }

    fn load_for(&self, idea_id: &IdeaId) -> Result<Vec<IntegrityBlock>, ChainError> {
        let id = idea_id.as_str().to_string();
        self.with_conn(|conn| {
            Self::query_blocks(
                conn,
                &format!("{SELECT_BLOCKS} WHERE idea_id = ?1 ORDER BY seq"),
                &[&id],
            )
        })
    }
}

#[derive(Debug)]
pub struct ChainLock {
    _file: std::fs::File,
}

impl ChainLock {
    fn new(db_path: &Path) -> Result<Self, ChainError> {
        let mut lock_path = db_path.to_path_buf();
        lock_path.set_extension("lock");
        let file = std::fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(lock_path)?;
        file.lock_exclusive()?;
        Ok(Self { _file: file })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashing::HashAlgorithm;
    use crate::integrity::GENESIS_PREVIOUS_HASH;

    fn block(index: u64, idea: &str) -> IntegrityBlock {
        IntegrityBlock::seal(
            index,
            10 + index as i64,
            BlockPayload {
                idea_id: IdeaId::from(idea),
                content_hash: HashAlgorithm::Blake3.hash_text(idea),
            },
            GENESIS_PREVIOUS_HASH,
            HashAlgorithm::Blake3,
        )
    }

    #[test]
    fn memory_store_keeps_append_order() {
        let store = MemoryChainStore::new();
        store.append(&block(0, "a")).unwrap();
        store.append(&block(1, "b")).unwrap();
        store.append(&block(2, "a")).unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded.iter().map(|b| b.index).collect::<Vec<_>>(), vec![0, 1, 2]);
        let for_a = store.load_for(&IdeaId::from("a")).unwrap();
        assert_eq!(for_a.len(), 2);
    }

    #[test]
    fn sqlite_store_rejects_updates_and_duplicate_indices() {
        let conn_dir = tempfile::tempdir().unwrap();
        let store = SqliteChainStore::new(conn_dir.path().join("chain.sqlite")).unwrap();
        store.append(&block(0, "a")).unwrap();
        assert!(store.append(&block(0, "b")).is_err());

        let err = store
            .with_conn(|conn| {
                conn.execute("UPDATE integrity_chain SET idea_id = 'z'", [])?;
                Ok(())
            })
            .unwrap_err();
        assert!(err.to_string().contains("append-only"), "{err}");

        let loaded = store.load().unwrap();
        assert_eq!(loaded, vec![block(0, "a")]);
    }
}
