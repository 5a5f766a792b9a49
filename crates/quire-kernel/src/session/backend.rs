//! Key-value backends for flash sessions.

use dashmap::DashMap;

use crate::db::{AuthDb, DbError};
use crate::token::TokenHash;

/// Short-lived store keyed by session token hash.
pub trait SessionBackend: Send + Sync {
    fn put(&self, hash: &TokenHash, data: &[u8]) -> Result<(), DbError>;
    fn get(&self, hash: &TokenHash) -> Result<Option<Vec<u8>>, DbError>;
    /// Deleting a missing row is not an error.
    fn delete(&self, hash: &TokenHash) -> Result<(), DbError>;
    /// Drop rows whose token was issued before `cutoff` (Unix seconds).
    fn sweep(&self, cutoff: u64) -> Result<usize, DbError>;
}

impl SessionBackend for AuthDb {
    fn put(&self, hash: &TokenHash, data: &[u8]) -> Result<(), DbError> {
        self.put_session(hash, data)
    }

    fn get(&self, hash: &TokenHash) -> Result<Option<Vec<u8>>, DbError> {
        self.get_session(hash)
    }

    fn delete(&self, hash: &TokenHash) -> Result<(), DbError> {
        self.delete_session(hash)
    }

    fn sweep(&self, cutoff: u64) -> Result<usize, DbError> {
        self.delete_sessions_older_than(cutoff)
    }
}

/// In-process backend for tests and single-node deployments.
#[derive(Debug, Default)]
pub struct MemorySessions {
    rows: DashMap<TokenHash, Vec<u8>>,
}

impl MemorySessions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl SessionBackend for MemorySessions {
    fn put(&self, hash: &TokenHash, data: &[u8]) -> Result<(), DbError> {
        self.rows.insert(*hash, data.to_vec());
        Ok(())
    }

    fn get(&self, hash: &TokenHash) -> Result<Option<Vec<u8>>, DbError> {
        Ok(self.rows.get(hash).map(|row| row.value().clone()))
    }

    fn delete(&self, hash: &TokenHash) -> Result<(), DbError> {
        self.rows.remove(hash);
        Ok(())
    }

    fn sweep(&self, cutoff: u64) -> Result<usize, DbError> {
        let before = self.rows.len();
        self.rows.retain(|hash, _| hash.timestamp() >= cutoff);
        Ok(before.saturating_sub(self.rows.len()))
    }
}
