//! Batched, transactionally flushed SQLite writer.
//!
//! Records are buffered in memory under a single lock. A flush writes the
//! whole buffer in one transaction while holding that lock, so a batch is
//! either fully visible or still pending. A background task flushes on a
//! fixed interval; reaching the batch size flushes inline.
//!
//! A batch that fails to commit stays pending for retry. After
//! [`MAX_FLUSH_ATTEMPTS`] consecutive failures it is dropped, so one
//! unwritable record cannot block the repository or grow the buffer forever.

use crate::cancellation::CancellationToken;
use crate::errors::StorageError;
use crate::utils::{cutoff_before_now, to_unix_millis};
use parking_lot::Mutex;
use rusqlite::{Connection, Statement};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::RuntimeFlavor;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Path that opens a private in-memory database.
pub const IN_MEMORY: &str = ":memory:";

/// Consecutive failed flushes after which the pending batch is dropped.
pub const MAX_FLUSH_ATTEMPTS: u32 = 3;

fn default_path() -> PathBuf {
    PathBuf::from("data/orchestration.db")
}

const fn default_batch_size() -> usize {
    100
}

const fn default_flush_interval_ms() -> u64 {
    5_000
}

/// Configuration shared by the batched repositories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Database file, or `:memory:`.
    #[serde(default = "default_path")]
    pub path: PathBuf,

    /// Pending records that trigger an inline flush.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Interval of the background flush, in milliseconds.
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
            batch_size: default_batch_size(),
            flush_interval_ms: default_flush_interval_ms(),
        }
    }
}

impl RepositoryConfig {
    /// Creates a config for the given database path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Creates a config for a private in-memory database.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(IN_MEMORY)
    }

    /// Sets the batch size. Values below one are treated as one.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Sets the background flush interval.
    #[must_use]
    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Returns the background flush interval.
    #[must_use]
    pub const fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    fn is_in_memory(&self) -> bool {
        self.path.as_os_str() == IN_MEMORY
    }
}

/// A record type that knows how to insert itself.
pub trait BatchRecord: Send + 'static {
    /// Table the record is stored in.
    const TABLE: &'static str;

    /// Parameterized insert statement, prepared once per flush.
    const INSERT_SQL: &'static str;

    /// Binds this record to the prepared insert and executes it.
    fn insert(&self, stmt: &mut Statement<'_>) -> Result<(), StorageError>;
}

struct State<R> {
    conn: Option<Connection>,
    pending: Vec<R>,
    failed_flushes: u32,
}

struct Shared<R> {
    state: Mutex<State<R>>,
    batch_size: usize,
}

impl<R: BatchRecord> Shared<R> {
    fn flush(&self) -> Result<usize, StorageError> {
        let mut state = self.state.lock();
        Self::flush_locked(&mut state)
    }

    fn flush_locked(state: &mut State<R>) -> Result<usize, StorageError> {
        if state.pending.is_empty() {
            return Ok(0);
        }
        match Self::commit(state) {
            Ok(flushed) => {
                state.pending.clear();
                state.failed_flushes = 0;
                debug!(table = R::TABLE, flushed, "Flushed batch");
                Ok(flushed)
            }
            Err(e) => {
                state.failed_flushes += 1;
                if state.failed_flushes >= MAX_FLUSH_ATTEMPTS {
                    let dropped = state.pending.len();
                    state.pending.clear();
                    state.failed_flushes = 0;
                    error!(
                        table = R::TABLE,
                        dropped,
                        attempts = MAX_FLUSH_ATTEMPTS,
                        error = %e,
                        "Dropped batch after repeated flush failures"
                    );
                }
                Err(e)
            }
        }
    }

    fn commit(state: &mut State<R>) -> Result<usize, StorageError> {
        let State { conn, pending, .. } = state;
        let conn = conn.as_mut().ok_or(StorageError::Closed)?;

        // dropping an uncommitted transaction rolls it back
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(R::INSERT_SQL)?;
            for record in pending.iter() {
                record.insert(&mut stmt)?;
            }
        }
        tx.commit()?;
        Ok(pending.len())
    }
}

struct FlushWorker {
    shutdown: Arc<CancellationToken>,
    handle: JoinHandle<()>,
}

/// Generic batched repository over one SQLite table.
pub struct BatchedRepository<R: BatchRecord> {
    shared: Arc<Shared<R>>,
    worker: Mutex<Option<FlushWorker>>,
}

impl<R: BatchRecord> BatchedRepository<R> {
    /// Opens the database, applies `schema` and starts the background flush
    /// when called inside a tokio runtime.
    pub fn open(config: &RepositoryConfig, schema: &str) -> Result<Self, StorageError> {
        let conn = open_connection(config)?;
        conn.execute_batch(schema)?;

        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                conn: Some(conn),
                pending: Vec::with_capacity(config.batch_size.max(1)),
                failed_flushes: 0,
            }),
            batch_size: config.batch_size.max(1),
        });

        let worker = match tokio::runtime::Handle::try_current() {
            Ok(handle) => Some(spawn_flush_worker(
                &handle,
                Arc::clone(&shared),
                config.flush_interval(),
            )),
            Err(_) => {
                warn!(
                    table = R::TABLE,
                    "No tokio runtime; background flush disabled"
                );
                None
            }
        };

        info!(
            table = R::TABLE,
            path = %config.path.display(),
            batch_size = shared.batch_size,
            "Opened repository"
        );

        Ok(Self {
            shared,
            worker: Mutex::new(worker),
        })
    }

    /// Appends a record, flushing inline once the batch is full.
    ///
    /// If the inline flush fails the error is returned and the batch stays
    /// buffered until [`MAX_FLUSH_ATTEMPTS`] flushes in a row have failed.
    /// On a multi-threaded runtime the inline flush runs under
    /// `block_in_place`. Writes after [`BatchedRepository::close`] fail
    /// with [`StorageError::Closed`].
    pub fn write(&self, record: R) -> Result<(), StorageError> {
        let mut state = self.shared.state.lock();
        if state.conn.is_none() {
            return Err(StorageError::Closed);
        }
        state.pending.push(record);
        if state.pending.len() >= self.shared.batch_size {
            run_blocking(|| Shared::flush_locked(&mut state))?;
        }
        Ok(())
    }

    /// Persists and clears the pending batch, returning the number of rows written.
    pub fn flush(&self) -> Result<usize, StorageError> {
        self.shared.flush()
    }

    /// Returns the number of buffered records.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.shared.state.lock().pending.len()
    }

    /// Returns true once the repository has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().conn.is_none()
    }

    /// Runs a read or maintenance closure against the open connection.
    pub fn with_connection<T, F>(&self, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&Connection) -> Result<T, StorageError>,
    {
        let state = self.shared.state.lock();
        let conn = state.conn.as_ref().ok_or(StorageError::Closed)?;
        f(conn)
    }

    /// Deletes persisted rows strictly older than `age`, returning how many were removed.
    pub fn prune_older_than(&self, age: Duration) -> Result<usize, StorageError> {
        let cutoff = cutoff_before_now(age).map_err(|e| StorageError::InvalidValue {
            column: "timestamp",
            detail: e.to_string(),
        })?;
        let sql = format!("DELETE FROM {} WHERE timestamp < ?1", R::TABLE);
        let removed = self.with_connection(|conn| {
            Ok(conn.execute(&sql, rusqlite::params![to_unix_millis(&cutoff)])?)
        })?;
        info!(table = R::TABLE, removed, ?age, "Pruned old rows");
        Ok(removed)
    }

    /// Stops the background flush, flushes what is pending and releases the database.
    ///
    /// Closing twice is a no-op. If the final flush fails the database stays
    /// open and the error is returned.
    pub async fn close(&self) -> Result<(), StorageError> {
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            worker.shutdown.cancel("repository closing");
            worker
                .handle
                .await
                .map_err(|e| StorageError::FlushTask(e.to_string()))?;
        }
        self.release()
    }

    fn release(&self) -> Result<(), StorageError> {
        let mut state = self.shared.state.lock();
        if state.conn.is_none() {
            return Ok(());
        }
        run_blocking(|| Shared::flush_locked(&mut state))?;
        if let Some(conn) = state.conn.take() {
            conn.close().map_err(|(_, e)| StorageError::Sqlite(e))?;
        }
        info!(table = R::TABLE, "Closed repository");
        Ok(())
    }
}

impl<R: BatchRecord> Drop for BatchedRepository<R> {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.get_mut().take() {
            worker.shutdown.cancel("repository dropped");
        }
        if !self.is_closed() {
            if let Err(e) = self.shared.flush() {
                warn!(table = R::TABLE, error = %e, "Final flush on drop failed");
            }
        }
    }
}

fn run_blocking<T>(f: impl FnOnce() -> T) -> T {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(f)
        }
        _ => f(),
    }
}

fn open_connection(config: &RepositoryConfig) -> Result<Connection, StorageError> {
    if config.is_in_memory() {
        return Ok(Connection::open_in_memory()?);
    }
    if let Some(parent) = config.path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(Path::new(&config.path))?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    conn.busy_timeout(Duration::from_secs(5))?;
    Ok(conn)
}

fn spawn_flush_worker<R: BatchRecord>(
    handle: &tokio::runtime::Handle,
    shared: Arc<Shared<R>>,
    interval: Duration,
) -> FlushWorker {
    let shutdown = Arc::new(CancellationToken::new());
    let token = Arc::clone(&shutdown);
    let period = interval.max(Duration::from_millis(1));

    let handle = handle.spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                () = token.cancelled() => break,
                _ = ticker.tick() => {
                    let shared = Arc::clone(&shared);
                    match tokio::task::spawn_blocking(move || shared.flush()).await {
                        Ok(Ok(_)) => {}
                        Ok(Err(e)) => warn!(table = R::TABLE, error = %e, "Periodic flush failed"),
                        Err(e) => warn!(table = R::TABLE, error = %e, "Periodic flush task failed"),
                    }
                }
            }
        }
        debug!(table = R::TABLE, "Flush worker stopped");
    });

    FlushWorker { shutdown, handle }
}
