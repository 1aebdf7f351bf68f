//! Routes refresh messages from ingestion to one debounced handle per key.

use super::handle_refresher::HandleRefresher;
use super::handles::RefreshHandle;
use super::liquidity_refresher::LiquidityRefresher;
use crate::domain::{KOClaimLocation, PositionLocation};
use crate::engine::{SharedPosition, SharedSubplot};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

pub const ROUTER_QUEUE_SIZE: usize = 10_000;

#[derive(Debug, Clone)]
pub enum RefreshMsg {
    /// A liquidity change touched a standard position.
    PosUpdate {
        loc: PositionLocation,
        pos: SharedPosition,
        event_time: i64,
    },
    /// A liquidity change touched a knockout position.
    KoPosUpdate {
        loc: PositionLocation,
        sub: SharedSubplot,
        event_time: i64,
    },
    /// A pivot the user may hold knocked-out liquidity in.
    KoClaimUpdate {
        loc: KOClaimLocation,
        sub: SharedSubplot,
        event_time: i64,
    },
    /// A swap moved the price through a recently active position.
    PosImpact {
        loc: PositionLocation,
        pos: SharedPosition,
        event_time: i64,
    },
    /// Periodic poll, never followed up.
    PosPoll {
        loc: PositionLocation,
        pos: SharedPosition,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum RefreshKey {
    Position(PositionLocation),
    Rewards(PositionLocation),
    KnockoutAlive(PositionLocation),
    KnockoutPost(KOClaimLocation),
}

pub struct RefreshRouter {
    refresher: Arc<LiquidityRefresher>,
    handles: HashMap<RefreshKey, Arc<HandleRefresher>>,
}

impl RefreshRouter {
    pub fn new(refresher: Arc<LiquidityRefresher>) -> Self {
        Self {
            refresher,
            handles: HashMap::new(),
        }
    }

    /// Run the router on its own task, returning the message sender.
    pub fn spawn(
        refresher: Arc<LiquidityRefresher>,
    ) -> (mpsc::Sender<RefreshMsg>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(ROUTER_QUEUE_SIZE);
        let router = Self::new(refresher);
        let task = tokio::spawn(router.run(rx));
        (tx, task)
    }

    pub async fn run(mut self, mut rx: mpsc::Receiver<RefreshMsg>) {
        while let Some(msg) = rx.recv().await {
            self.route(msg).await;
        }
        debug!(handles = self.handles.len(), "Refresh router exiting");
    }

    pub async fn route(&mut self, msg: RefreshMsg) {
        let (key, handle, event_time) = match msg {
            RefreshMsg::PosUpdate {
                loc,
                pos,
                event_time,
            } => (
                RefreshKey::Position(loc.clone()),
                RefreshHandle::Position { loc, pos },
                Some(event_time),
            ),
            RefreshMsg::PosPoll { loc, pos } => (
                RefreshKey::Position(loc.clone()),
                RefreshHandle::Position { loc, pos },
                None,
            ),
            RefreshMsg::PosImpact {
                loc,
                pos,
                event_time,
            } if loc.liq.is_ambient() => (
                RefreshKey::Position(loc.clone()),
                RefreshHandle::Position { loc, pos },
                Some(event_time),
            ),
            RefreshMsg::PosImpact {
                loc,
                pos,
                event_time,
            } => (
                RefreshKey::Rewards(loc.clone()),
                RefreshHandle::Rewards { loc, pos },
                Some(event_time),
            ),
            RefreshMsg::KoPosUpdate {
                loc,
                sub,
                event_time,
            } => (
                RefreshKey::KnockoutAlive(loc.clone()),
                RefreshHandle::KnockoutAlive { loc, sub },
                Some(event_time),
            ),
            RefreshMsg::KoClaimUpdate {
                loc,
                sub,
                event_time,
            } => (
                RefreshKey::KnockoutPost(loc.clone()),
                RefreshHandle::KnockoutPost { loc, sub },
                Some(event_time),
            ),
        };

        let refresher = &self.refresher;
        let hndl = self
            .handles
            .entry(key)
            .or_insert_with(|| refresher.handle_refresher(handle))
            .clone();

        match event_time {
            Some(time) => hndl.push_refresh_at(time).await,
            None => hndl.push_refresh().await,
        }
    }

    pub fn handle_count(&self) -> usize {
        self.handles.len()
    }
}
