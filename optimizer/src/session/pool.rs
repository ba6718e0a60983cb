//! Session pool: up to `DB_SESSION_POOL_SIZE` sessions against
//! one DSN, handed out as `PooledSession` guards, idle-evicted past
//! `DB_IDLE_TIMEOUT_SECS`.
//!
//! Shaped like a `MySQLPoolManager` (`get_pool(&dsn) -> Pool`
//! get-or-create) pool manager, adapted to two concrete backends and to the race
//! mode's need for multiple *independent* live connections rather than one
//! shared pool connection per logical session.

use super::duckdb_session::DuckDbSession;
use super::postgres_session::PgSession;
use super::Session;
use crate::plan::Dialect;
use crate::utils::error::OptimizerError;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Semaphore};

/// How to open a fresh connection against this pool's DSN, kept on the pool
/// so idle-evicted slots can be replaced lazily on next acquire.
#[derive(Clone)]
enum Factory {
    DuckDb(String),
    Postgres(String),
}

impl Factory {
    async fn connect(&self) -> Result<Arc<dyn Session>, OptimizerError> {
        match self {
            Factory::DuckDb(dsn) => Ok(Arc::new(DuckDbSession::connect(dsn)?)),
            Factory::Postgres(dsn) => Ok(Arc::new(PgSession::connect(dsn).await?)),
        }
    }
}

struct IdleEntry {
    session: Arc<dyn Session>,
    idle_since: Instant,
}

pub struct SessionPool {
    factory: Factory,
    idle: Mutex<VecDeque<IdleEntry>>,
    permits: Arc<Semaphore>,
    idle_timeout: Duration,
}

impl SessionPool {
    pub fn new_duckdb(dsn: impl Into<String>, size: usize, idle_timeout: Duration) -> Self {
        Self {
            factory: Factory::DuckDb(dsn.into()),
            idle: Mutex::new(VecDeque::new()),
            permits: Arc::new(Semaphore::new(size.max(1))),
            idle_timeout,
        }
    }

    pub fn new_postgres(dsn: impl Into<String>, size: usize, idle_timeout: Duration) -> Self {
        Self {
            factory: Factory::Postgres(dsn.into()),
            idle: Mutex::new(VecDeque::new()),
            permits: Arc::new(Semaphore::new(size.max(1))),
            idle_timeout,
        }
    }

    pub fn dialect(&self) -> Dialect {
        match self.factory {
            Factory::DuckDb(_) => Dialect::DuckDb,
            Factory::Postgres(_) => Dialect::Postgres,
        }
    }

    /// Borrow a session, creating one if the free list is empty and a permit
    /// is available. Blocks (async) when the pool is already at capacity and
    /// every session is checked out — mirrors `MySQLPoolManager::get_pool`'s
    /// bounded-wait contract.
    pub async fn acquire(self: &Arc<Self>) -> Result<PooledSession, OptimizerError> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| OptimizerError::Other(anyhow::anyhow!("session pool closed: {e}")))?;

        self.evict_idle().await;

        let session = {
            let mut idle = self.idle.lock().await;
            idle.pop_front().map(|e| e.session)
        };

        let session = match session {
            Some(s) => s,
            None => self.factory.connect().await?,
        };

        Ok(PooledSession { session: Some(session), pool: Arc::clone(self), _permit: permit })
    }

    async fn evict_idle(&self) {
        let mut idle = self.idle.lock().await;
        let timeout = self.idle_timeout;
        idle.retain(|entry| entry.idle_since.elapsed() < timeout);
    }
}

/// A checked-out session. Returns itself to the pool's idle list on drop,
/// the same RAII return-to-pool shape common connection pools use.
pub struct PooledSession {
    session: Option<Arc<dyn Session>>,
    pool: Arc<SessionPool>,
    _permit: tokio::sync::OwnedSemaphorePermit,
}

impl std::ops::Deref for PooledSession {
    type Target = dyn Session;
    fn deref(&self) -> &Self::Target {
        self.session.as_deref().expect("session taken before drop")
    }
}

impl Drop for PooledSession {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            let pool = Arc::clone(&self.pool);
            tokio::spawn(async move {
                let mut idle = pool.idle.lock().await;
                idle.push_back(IdleEntry { session, idle_since: Instant::now() });
            });
        }
    }
}
