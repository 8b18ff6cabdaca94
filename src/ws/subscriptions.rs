use std::collections::{HashMap, HashSet};

/// Tracks which clients are subscribed to which channels.
///
/// A channel entry exists only while it has at least one subscriber. The
/// registry does not own the connections behind the client ids; whoever
/// tears a connection down must call [`SubscriptionRegistry::unsubscribe_all`].
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    channel_subscribers: HashMap<String, HashSet<String>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `client_id` to `channel_id`. Subscribing twice is a no-op.
    pub fn subscribe(&mut self, channel_id: &str, client_id: &str) {
        self.channel_subscribers
            .entry(channel_id.to_string())
            .or_default()
            .insert(client_id.to_string());
    }

    /// Remove `client_id` from `channel_id`, dropping the channel once empty.
    pub fn unsubscribe(&mut self, channel_id: &str, client_id: &str) {
        if let Some(subs) = self.channel_subscribers.get_mut(channel_id) {
            subs.remove(client_id);
            if subs.is_empty() {
                self.channel_subscribers.remove(channel_id);
            }
        }
    }

    /// Remove `client_id` from every channel. Called when a connection closes.
    pub fn unsubscribe_all(&mut self, client_id: &str) {
        self.channel_subscribers.retain(|_, subs| {
            subs.remove(client_id);
            !subs.is_empty()
        });
    }

    /// Snapshot of the subscribers of `channel_id` (empty if unknown).
    pub fn subscribers(&self, channel_id: &str) -> HashSet<String> {
        self.channel_subscribers
            .get(channel_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn is_subscribed(&self, channel_id: &str, client_id: &str) -> bool {
        self.channel_subscribers
            .get(channel_id)
            .is_some_and(|subs| subs.contains(client_id))
    }

    /// Channels `client_id` is currently subscribed to.
    pub fn channels_of(&self, client_id: &str) -> Vec<String> {
        self.channel_subscribers
            .iter()
            .filter(|(_, subs)| subs.contains(client_id))
            .map(|(channel, _)| channel.clone())
            .collect()
    }

    /// Number of channels with at least one subscriber.
    pub fn channel_count(&self) -> usize {
        self.channel_subscribers.len()
    }

    /// Total (channel, client) pairs.
    pub fn subscription_count(&self) -> usize {
        self.channel_subscribers.values().map(HashSet::len).sum()
    }
}
