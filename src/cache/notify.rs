//! Per-query change signals.
//!
//! Each query key owns a `watch` channel carrying a version counter. Writers
//! bump the version; subscribers await `changed()` and then re-read state.

use dashmap::DashMap;
use tokio::sync::watch;
use tracing::trace;

use super::keys::QueryKey;

#[derive(Default)]
pub struct ChangeNotifier {
    channels: DashMap<QueryKey, watch::Sender<u64>>,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Receiver that observes every subsequent `notify` for `key`.
    pub fn subscribe(&self, key: &QueryKey) -> watch::Receiver<u64> {
        self.channels
            .entry(key.clone())
            .or_insert_with(|| watch::channel(0).0)
            .subscribe()
    }

    /// Wake all subscribers of `key`. A key nobody subscribed to is a no-op.
    pub fn notify(&self, key: &QueryKey) {
        if let Some(sender) = self.channels.get(key) {
            sender.send_modify(|version| *version = version.wrapping_add(1));
            trace!(query_key = %key, receivers = sender.receiver_count(), "query change notified");
        }
    }

    /// Drop the channel for `key`; outstanding receivers observe closure.
    pub fn remove(&self, key: &QueryKey) {
        self.channels.remove(key);
    }

    pub fn receiver_count(&self, key: &QueryKey) -> usize {
        self.channels
            .get(key)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }
}
