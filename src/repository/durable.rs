use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::{RwLock, mpsc, oneshot};
use tracing::{info, warn};
use ulid::Ulid;

use crate::model::*;
use crate::observability;
use crate::wal::Wal;

use super::{MemoryRepository, RepoError, Repository, Snapshot};

// ── Group-commit WAL channel ─────────────────────────────

enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

type Pending = (Event, oneshot::Sender<io::Result<()>>);

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends.
/// 4. One flush_sync for the whole batch, then answer every sender.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let WalCommand::Append { event, response } = cmd else {
            handle_non_append(&mut wal, cmd);
            continue;
        };
        let mut batch = vec![(event, response)];
        let mut deferred = None;
        loop {
            match rx.try_recv() {
                Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                Ok(other) => {
                    deferred = Some(other);
                    break;
                }
                Err(_) => break,
            }
        }
        commit_batch(&mut wal, &mut batch);
        if let Some(other) = deferred {
            handle_non_append(&mut wal, other);
        }
    }
    info!(path = %wal.path().display(), "WAL writer stopped");
}

fn commit_batch(wal: &mut Wal, batch: &mut Vec<Pending>) {
    metrics::histogram!(observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    if let Err(e) = &result {
        warn!(error = %e, events = batch.len(), "WAL batch failed");
    }
    respond_batch(batch, &result);
}

/// All or nothing: a failed batch is truncated away, so no caller told `Err`
/// can see its event come back on replay.
fn flush_batch(wal: &mut Wal, batch: &[Pending]) -> io::Result<()> {
    let result = batch
        .iter()
        .try_for_each(|(event, _)| wal.append_buffered(event))
        .and_then(|()| wal.flush_sync());
    if result.is_err()
        && let Err(e) = wal.rollback()
    {
        warn!(error = %e, "WAL rollback failed");
    }
    result
}

fn respond_batch(batch: &mut Vec<Pending>, result: &io::Result<()>) {
    for (_, tx) in batch.drain(..) {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result =
                Wal::write_compact_file(wal.path(), &events).and_then(|()| wal.swap_compact_file());
            match &result {
                Ok(()) => info!(events = events.len(), "WAL compacted"),
                Err(e) => warn!(error = %e, "WAL compaction failed"),
            }
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!("appends are batched by the writer loop"),
    }
}

/// Durable repository: every event is fsynced to the write-ahead log before
/// `record` returns, and mirrored into an in-memory table set for reads.
pub struct WalRepository {
    mirror: MemoryRepository,
    wal_tx: mpsc::Sender<WalCommand>,
    /// Shared by `record`, exclusive for compaction, so a compacted log never
    /// misses an event the writer already acknowledged.
    commit_gate: RwLock<()>,
    path: PathBuf,
}

impl WalRepository {
    /// Replay the log at `path` and start its writer task. Must run inside a tokio runtime.
    pub fn open(path: &Path) -> io::Result<Self> {
        let events = Wal::replay(path)?;
        info!(path = %path.display(), events = events.len(), "WAL replayed");
        let mirror = MemoryRepository::from_events(&events);
        let wal = Wal::open(path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));
        Ok(Self {
            mirror,
            wal_tx,
            commit_gate: RwLock::new(()),
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn wal_append(&self, event: Event) -> Result<(), RepoError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append { event, response: tx })
            .await
            .map_err(|_| RepoError::WriterClosed)?;
        rx.await.map_err(|_| RepoError::WriterClosed)??;
        Ok(())
    }

    /// Rewrite the log as the minimal event sequence for the current state.
    pub async fn compact(&self) -> Result<(), RepoError> {
        let _exclusive = self.commit_gate.write().await;
        let events = self.mirror.snapshot().into_events();
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| RepoError::WriterClosed)?;
        rx.await.map_err(|_| RepoError::WriterClosed)??;
        Ok(())
    }

    pub async fn appends_since_compact(&self) -> Result<u64, RepoError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .map_err(|_| RepoError::WriterClosed)?;
        rx.await.map_err(|_| RepoError::WriterClosed)
    }
}

#[async_trait]
impl Repository for WalRepository {
    async fn record(&self, event: Event) -> Result<(), RepoError> {
        let _shared = self.commit_gate.read().await;
        self.wal_append(event.clone()).await?;
        self.mirror.apply(&event);
        Ok(())
    }

    async fn load(&self) -> Result<Snapshot, RepoError> {
        Ok(self.mirror.snapshot())
    }

    async fn query_active_by_resource(
        &self,
        kind: ResourceKind,
        resource_id: Ulid,
    ) -> Result<Vec<Booking>, RepoError> {
        Ok(self.mirror.active_by_resource(kind, resource_id))
    }
}
