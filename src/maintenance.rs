use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::repository::{RepoError, WalRepository};

/// Compact the log if enough appends have piled up. Returns whether it ran.
pub async fn compact_if_needed(repo: &WalRepository, threshold: u64) -> Result<bool, RepoError> {
    let appends = repo.appends_since_compact().await?;
    if appends < threshold {
        return Ok(false);
    }
    debug!(appends, threshold, "compacting WAL");
    repo.compact().await?;
    Ok(true)
}

/// Background task that periodically compacts the WAL.
pub async fn run_compactor(repo: Arc<WalRepository>, threshold: u64, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        match compact_if_needed(&repo, threshold).await {
            Ok(_) => {}
            Err(RepoError::WriterClosed) => {
                warn!("WAL writer gone, compactor stopping");
                return;
            }
            Err(e) => warn!("compaction skipped: {e}"),
        }
    }
}
