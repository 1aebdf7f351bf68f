//! Shared refresh work stream: a bounded pending queue, a rate-limited
//! round-robin dispatcher and a fixed pool of query workers.

use super::handle_refresher::{unix_now, Clock, HandleRefresher};
use super::handles::{RefreshError, RefreshHandle, RetryPolicy};
use crate::datasource::ChainQuery;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{sleep, Duration, Instant};
use tracing::{debug, error, info};

pub const PENDING_QUEUE_SIZE: usize = 25_000;
pub const WORKER_QUEUE_SIZE: usize = 1000;
pub const NUM_WORKERS: usize = 50;
pub const MAX_REQS_PER_SEC: usize = 50;
const POST_PROCESS_LOG_EVERY: u64 = 100;

#[derive(Debug, Clone, Copy)]
pub struct RefreshConfig {
    pub workers: usize,
    pub max_reqs_per_sec: usize,
    pub pending_capacity: usize,
    pub worker_capacity: usize,
    pub retry: RetryPolicy,
    pub clock: Clock,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            workers: NUM_WORKERS,
            max_reqs_per_sec: MAX_REQS_PER_SEC,
            pending_capacity: PENDING_QUEUE_SIZE,
            worker_capacity: WORKER_QUEUE_SIZE,
            retry: RetryPolicy::default(),
            clock: unix_now,
        }
    }
}

#[derive(Debug)]
pub struct LiquidityRefresher {
    pending: mpsc::Sender<Arc<RefreshHandle>>,
    completed: Arc<AtomicU64>,
    clock: Clock,
}

impl LiquidityRefresher {
    /// Start the dispatcher, workers and post-process logger. Exhausted
    /// query retries are reported on the returned channel; the process is
    /// expected to stop when one arrives.
    pub fn spawn(
        query: Arc<dyn ChainQuery>,
        config: RefreshConfig,
    ) -> (Arc<Self>, mpsc::Receiver<RefreshError>) {
        let workers = config.workers.max(1);
        let (pending_tx, pending_rx) = mpsc::channel(config.pending_capacity);
        let (fatal_tx, fatal_rx) = mpsc::channel(workers);
        let (post_tx, post_rx) = mpsc::channel::<&'static str>(config.worker_capacity);
        let completed = Arc::new(AtomicU64::new(0));

        let mut worker_txs = Vec::with_capacity(workers);
        for idx in 0..workers {
            let (tx, rx) = mpsc::channel(config.worker_capacity);
            worker_txs.push(tx);
            tokio::spawn(watch_work(
                idx,
                rx,
                query.clone(),
                config.retry,
                config.clock,
                post_tx.clone(),
                fatal_tx.clone(),
            ));
        }
        tokio::spawn(dispatch(pending_rx, worker_txs, config.max_reqs_per_sec));
        tokio::spawn(watch_post_process(post_rx, completed.clone()));

        let refresher = Arc::new(Self {
            pending: pending_tx,
            completed,
            clock: config.clock,
        });
        (refresher, fatal_rx)
    }

    /// A debounced entry point for one handle.
    pub fn handle_refresher(&self, handle: RefreshHandle) -> Arc<HandleRefresher> {
        HandleRefresher::spawn(handle, self.pending.clone(), self.clock)
    }

    pub fn clock(&self) -> Clock {
        self.clock
    }

    /// Refreshes finished so far.
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::SeqCst)
    }
}

/// Round-robin `pending` into the worker queues, never more than
/// `max_per_sec` handles in any one-second window.
async fn dispatch(
    mut pending: mpsc::Receiver<Arc<RefreshHandle>>,
    workers: Vec<mpsc::Sender<Arc<RefreshHandle>>>,
    max_per_sec: usize,
) {
    let max_per_sec = max_per_sec.max(1);
    let mut window_start = Instant::now();
    let mut sent = 0;
    let mut next = 0;

    while let Some(handle) = pending.recv().await {
        if window_start.elapsed() >= Duration::from_secs(1) {
            window_start = Instant::now();
            sent = 0;
        }
        if sent >= max_per_sec {
            sleep(Duration::from_secs(1)).await;
            window_start = Instant::now();
            sent = 0;
        }

        if workers[next].send(handle).await.is_err() {
            error!(worker = next, "Refresh worker queue closed, stopping dispatcher");
            return;
        }
        next = (next + 1) % workers.len();
        sent += 1;
    }
    debug!("Refresh pending queue closed, dispatcher exiting");
}

async fn watch_work(
    idx: usize,
    mut work: mpsc::Receiver<Arc<RefreshHandle>>,
    query: Arc<dyn ChainQuery>,
    retry: RetryPolicy,
    clock: Clock,
    post: mpsc::Sender<&'static str>,
    fatal: mpsc::Sender<RefreshError>,
) {
    while let Some(handle) = work.recv().await {
        match handle.refresh_query(query.as_ref(), &retry, clock()).await {
            Ok(()) => {
                let _ = post.send(handle.label_tag()).await;
            }
            Err(e) => {
                error!(worker = idx, label = handle.label_tag(), error = %e, "Refresh query exhausted retries");
                let _ = fatal.send(e).await;
            }
        }
    }
}

async fn watch_post_process(mut post: mpsc::Receiver<&'static str>, completed: Arc<AtomicU64>) {
    while let Some(tag) = post.recv().await {
        let total = completed.fetch_add(1, Ordering::SeqCst) + 1;
        if total % POST_PROCESS_LOG_EVERY == 0 {
            info!(total, last = tag, "Processed liquidity refreshes");
        }
    }
}
