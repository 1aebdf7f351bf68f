//! Per-handle debounce: every refresh request is tagged with its 15 second
//! wall-clock window and only the first request of each window is forwarded.

use super::handles::RefreshHandle;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Duration, Instant};
use tracing::debug;

pub const REFRESH_WINDOW_SECS: i64 = 15;
pub const RECENT_EVENT_WINDOW_SECS: i64 = 60;
pub const HANDLE_QUEUE_SIZE: usize = 1000;
pub const FOLLOWUP_SECS: [u64; 4] = [2, 10, 30, 60];

/// Unix seconds source. Swappable so tests can follow tokio's paused clock.
pub type Clock = fn() -> i64;

pub fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}

pub fn window_tag(unix_time: i64) -> i64 {
    unix_time.div_euclid(REFRESH_WINDOW_SECS)
}

/// Events this fresh may not be visible to the RPC node yet.
pub fn is_recent_event(event_time: i64, now: i64) -> bool {
    now - event_time < RECENT_EVENT_WINDOW_SECS
}

#[derive(Debug)]
pub struct HandleRefresher {
    handle: Arc<RefreshHandle>,
    tags: mpsc::Sender<i64>,
    clock: Clock,
}

impl HandleRefresher {
    /// Start the drain task forwarding `handle` into `pending` at most once
    /// per window.
    pub fn spawn(
        handle: RefreshHandle,
        pending: mpsc::Sender<Arc<RefreshHandle>>,
        clock: Clock,
    ) -> Arc<Self> {
        let handle = Arc::new(handle);
        let (tags, mut rx) = mpsc::channel::<i64>(HANDLE_QUEUE_SIZE);

        let forward = handle.clone();
        tokio::spawn(async move {
            let mut last_window = i64::MIN;
            while let Some(tag) = rx.recv().await {
                if tag <= last_window {
                    continue;
                }
                last_window = tag;
                if pending.send(forward.clone()).await.is_err() {
                    debug!("Refresh pending queue closed, stopping handle drain");
                    break;
                }
            }
        });

        Arc::new(Self {
            handle,
            tags,
            clock,
        })
    }

    pub fn handle(&self) -> &RefreshHandle {
        &self.handle
    }

    pub async fn push_refresh(&self) {
        self.push_window(window_tag((self.clock)())).await;
    }

    pub async fn push_window(&self, tag: i64) {
        // A closed queue only happens at shutdown.
        let _ = self.tags.send(tag).await;
    }

    /// Request a refresh for an event at `event_time`, scheduling followups
    /// when the event is recent.
    pub async fn push_refresh_at(self: &Arc<Self>, event_time: i64) {
        self.push_refresh().await;
        if is_recent_event(event_time, (self.clock)()) {
            self.push_followup();
        }
    }

    /// Re-push at each followup offset from now.
    pub fn push_followup(self: &Arc<Self>) {
        let this = self.clone();
        let start = Instant::now();
        tokio::spawn(async move {
            for offset in FOLLOWUP_SECS {
                sleep_until(start + Duration::from_secs(offset)).await;
                this.push_refresh().await;
            }
        });
    }
}
