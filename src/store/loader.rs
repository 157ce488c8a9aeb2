//! Async subtree loading with bounded concurrency and deadlines

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::core::{Error, Result};
use crate::math::TileCoord;
use crate::store::subtree_store::SubtreeStore;

/// Request to load the subtree rooted at a tile
#[derive(Debug, Clone)]
pub struct LoadRequest {
    pub coord: TileCoord,
    pub priority: f32,
}

/// Result of a subtree load operation
#[derive(Debug)]
pub enum LoadResult {
    /// Encoded subtree, from the cache or freshly built
    Loaded(TileCoord, Vec<u8>),
    /// The deadline passed before the store answered
    TimedOut(TileCoord),
    /// The store failed
    Error(TileCoord, String),
}

impl LoadResult {
    pub fn coord(&self) -> TileCoord {
        match self {
            LoadResult::Loaded(coord, _) => *coord,
            LoadResult::TimedOut(coord) => *coord,
            LoadResult::Error(coord, _) => *coord,
        }
    }
}

/// Loader settings
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Maximum number of subtrees built at the same time
    pub max_concurrent: usize,
    /// Give up on a request after this long. The build itself keeps running
    /// in the background and still fills the cache.
    pub deadline: Option<Duration>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 4,
            deadline: None,
        }
    }
}

/// Concurrent subtree loader on top of a [`SubtreeStore`]
///
/// Store calls block on the oracle and the cache, so each one runs on the
/// blocking thread pool.
pub struct SubtreeLoader {
    /// Channel for sending load requests to the worker task
    request_tx: mpsc::UnboundedSender<LoadRequest>,
    /// Channel for receiving load results
    result_rx: mpsc::UnboundedReceiver<LoadResult>,
    /// Tiles whose subtree is currently being loaded
    pending: HashSet<TileCoord>,
}

impl SubtreeLoader {
    /// Create a loader on the current tokio runtime.
    ///
    /// Panics if called outside a tokio runtime context.
    pub fn new(store: Arc<SubtreeStore>, config: LoaderConfig) -> Self {
        let (request_tx, mut request_rx) = mpsc::unbounded_channel::<LoadRequest>();
        let (result_tx, result_rx) = mpsc::unbounded_channel::<LoadResult>();

        tokio::spawn(async move {
            Self::worker_loop(store, config, &mut request_rx, result_tx).await;
        });

        Self {
            request_tx,
            result_rx,
            pending: HashSet::new(),
        }
    }

    /// Worker loop that processes load requests with concurrency control
    async fn worker_loop(
        store: Arc<SubtreeStore>,
        config: LoaderConfig,
        request_rx: &mut mpsc::UnboundedReceiver<LoadRequest>,
        result_tx: mpsc::UnboundedSender<LoadResult>,
    ) {
        let max_concurrent = config.max_concurrent.max(1);
        let mut active_tasks = JoinSet::new();
        let mut pending_requests: Vec<LoadRequest> = Vec::new();

        loop {
            tokio::select! {
                Some(request) = request_rx.recv() => {
                    pending_requests.push(request);
                }

                Some(result) = active_tasks.join_next(), if !active_tasks.is_empty() => {
                    match result {
                        Ok(load_result) => {
                            let _ = result_tx.send(load_result);
                        }
                        Err(e) => {
                            log::error!("Subtree loader task failed: {}", e);
                        }
                    }
                }

                // Exit when the request channel is closed and no work is left
                else => {
                    if pending_requests.is_empty() && active_tasks.is_empty() {
                        break;
                    }
                }
            }

            while active_tasks.len() < max_concurrent && !pending_requests.is_empty() {
                // Highest priority first
                pending_requests.sort_by(|a, b| {
                    b.priority.partial_cmp(&a.priority).unwrap_or(std::cmp::Ordering::Equal)
                });
                let request = pending_requests.remove(0);

                let store = Arc::clone(&store);
                let deadline = config.deadline;
                active_tasks.spawn(async move { Self::load_task(store, request.coord, deadline).await });
            }
        }
    }

    /// Task that loads a single subtree
    async fn load_task(store: Arc<SubtreeStore>, coord: TileCoord, deadline: Option<Duration>) -> LoadResult {
        let build = tokio::task::spawn_blocking(move || store.get_subtree(coord.level, coord.x, coord.y));

        let joined = match deadline {
            Some(deadline) => match tokio::time::timeout(deadline, build).await {
                Ok(joined) => joined,
                Err(_) => {
                    log::warn!("Subtree {}/{}/{} timed out after {:?}", coord.level, coord.x, coord.y, deadline);
                    return LoadResult::TimedOut(coord);
                }
            },
            None => build.await,
        };

        match joined {
            Ok(Ok(bytes)) => LoadResult::Loaded(coord, bytes),
            Ok(Err(e)) => LoadResult::Error(coord, e.to_string()),
            Err(e) => LoadResult::Error(coord, format!("build task failed: {}", e)),
        }
    }

    /// Request the subtree rooted at `coord`.
    ///
    /// Returns `Ok(false)` if it is already pending, `Ok(true)` if the request was queued.
    pub fn request(&mut self, coord: TileCoord, priority: f32) -> Result<bool> {
        if self.pending.contains(&coord) {
            return Ok(false);
        }

        self.request_tx
            .send(LoadRequest { coord, priority })
            .map_err(|_| Error::storage("subtree loader worker has stopped"))?;
        self.pending.insert(coord);
        Ok(true)
    }

    /// Poll for completed load results (non-blocking)
    pub fn poll_results(&mut self) -> Vec<LoadResult> {
        let mut results = Vec::new();
        while let Ok(result) = self.result_rx.try_recv() {
            self.pending.remove(&result.coord());
            results.push(result);
        }
        results
    }

    /// Wait for the next completed load. Returns `None` once the worker has stopped.
    pub async fn next_result(&mut self) -> Option<LoadResult> {
        let result = self.result_rx.recv().await?;
        self.pending.remove(&result.coord());
        Some(result)
    }

    /// Get the number of pending load requests
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Check if a specific subtree is currently pending
    pub fn is_pending(&self, coord: TileCoord) -> bool {
        self.pending.contains(&coord)
    }

    /// Forget a pending request (best effort)
    ///
    /// A build already in progress is not interrupted; its result may still
    /// arrive and should be ignored by the caller.
    pub fn cancel(&mut self, coord: TileCoord) {
        self.pending.remove(&coord);
    }
}
