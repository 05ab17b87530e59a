//! Notification hub — typed event broadcast with a last-payload cache.
//!
//! Producers call `broadcast`; every open WebSocket holds a receiver and
//! forwards events as JSON. The hub also remembers the most recent payload
//! per event type so a consumer that lagged behind the broadcast buffer can
//! be re-synced from the cache instead of waiting for the next natural
//! event.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, broadcast};
use tracing::debug;

use crate::model::{AggregateStats, EnrichedAnalysis, ModerationRule};

const BROADCAST_CAPACITY: usize = 256;

/// Typed update events pushed to clients as `{"type": ..., "data": ...}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Event {
    StatsUpdate(AggregateStats),
    FlaggedContentUpdate(Vec<EnrichedAnalysis>),
    ContentStatusUpdate(EnrichedAnalysis),
    AiRuleCreated(ModerationRule),
    AiRuleUpdated(ModerationRule),
    /// Full rule set, sent on connect and on lag re-sync.
    AiRulesUpdate(Vec<ModerationRule>),
}

impl Event {
    /// Stable event-type key, used for the per-type cache.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::StatsUpdate(_) => "stats_update",
            Self::FlaggedContentUpdate(_) => "flagged_content_update",
            Self::ContentStatusUpdate(_) => "content_status_update",
            Self::AiRuleCreated(_) => "ai_rule_created",
            Self::AiRuleUpdated(_) => "ai_rule_updated",
            Self::AiRulesUpdate(_) => "ai_rules_update",
        }
    }
}

/// Fan-out hub shared by the pipeline and the WebSocket layer.
pub struct NotificationHub {
    tx: broadcast::Sender<Event>,
    cache: RwLock<HashMap<&'static str, Event>>,
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationHub {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            tx,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Broadcast an event to all subscribers and remember it as the latest
    /// payload of its type. Having no subscribers is not an error.
    pub async fn broadcast(&self, event: Event) {
        self.cache.write().await.insert(event.kind(), event.clone());
        let delivered = self.tx.send(event).unwrap_or(0);
        debug!(delivered, "Event broadcast");
    }

    /// Subscribe to the live event stream. Each WebSocket client calls this.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Latest broadcast payload of one event type, if any.
    pub async fn cached(&self, kind: &str) -> Option<Event> {
        self.cache.read().await.get(kind).cloned()
    }

    /// All cached payloads, for re-syncing a lagged consumer.
    pub async fn cached_all(&self) -> Vec<Event> {
        self.cache.read().await.values().cloned().collect()
    }

    /// Number of live subscribers.
    pub fn client_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

// ── Connection liveness ─────────────────────────────────────────────

/// Per-connection heartbeat state machine.
///
/// The socket task calls `on_probe` on every heartbeat tick and `on_pong`
/// whenever the peer answers. A peer that misses `max_misses` consecutive
/// probes transitions to `Dead` and the connection is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Alive,
    Probing { misses: u8 },
    Dead,
}

/// What the socket task should do after a heartbeat tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeAction {
    Ping,
    Terminate,
}

impl Liveness {
    pub fn new() -> Self {
        Self::Alive
    }

    pub fn on_probe(&mut self, max_misses: u8) -> ProbeAction {
        match *self {
            Self::Alive => {
                *self = Self::Probing { misses: 1 };
                ProbeAction::Ping
            }
            Self::Probing { misses } if misses >= max_misses => {
                *self = Self::Dead;
                ProbeAction::Terminate
            }
            Self::Probing { misses } => {
                *self = Self::Probing { misses: misses + 1 };
                ProbeAction::Ping
            }
            Self::Dead => ProbeAction::Terminate,
        }
    }

    pub fn on_pong(&mut self) {
        // A pong from an already-dead peer does not resurrect it; the
        // socket task has stopped ticking by then anyway.
        if *self != Self::Dead {
            *self = Self::Alive;
        }
    }

    pub fn is_dead(&self) -> bool {
        *self == Self::Dead
    }
}

impl Default for Liveness {
    fn default() -> Self {
        Self::new()
    }
}
