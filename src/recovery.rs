//! Durable recovery storage.
//!
//! A small string key-value store that outlives a single page load and
//! carries, per user: at most one "ongoing order" marker, at most one
//! "pending redirect" URL, the saved-address list, and the
//! notification-suppression preference. Injected into the coordinator and
//! reconciler as a trait so tests can observe and seed it directly.
//!
//! Reads are deliberately forgiving: a corrupt or missing value degrades to
//! `None` rather than failing the saga. Staleness of ongoing-order markers
//! is judged by readers, not enforced here; only the coordinator and
//! reconciler delete markers, and only on a terminal outcome.

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::warn;
use uuid::Uuid;

use crate::models::{RecoveryMarker, SavedAddress};

pub const SAVED_ADDRESS_CAP: usize = 5;

#[async_trait]
pub trait RecoveryStore: Send + Sync {
    async fn set_ongoing_order(&self, user_id: Uuid, marker: &RecoveryMarker);
    async fn ongoing_order(&self, user_id: Uuid) -> Option<RecoveryMarker>;
    async fn clear_ongoing_order(&self, user_id: Uuid);

    async fn set_pending_redirect(&self, user_id: Uuid, url: &str);
    async fn pending_redirect(&self, user_id: Uuid) -> Option<String>;
    async fn clear_pending_redirect(&self, user_id: Uuid);

    /// Prepends an address and keeps the most recent [`SAVED_ADDRESS_CAP`].
    async fn push_saved_address(&self, user_id: Uuid, address: SavedAddress);
    async fn saved_addresses(&self, user_id: Uuid) -> Vec<SavedAddress>;

    async fn set_notifications_muted(&self, user_id: Uuid, muted: bool);
    async fn notifications_muted(&self, user_id: Uuid) -> bool;
}

/// In-memory recovery store over a concurrent string map.
///
/// Values are stored as JSON strings, matching the string-valued key-value
/// contract a durable backend would implement.
#[derive(Debug, Default)]
pub struct InMemoryRecoveryStore {
    entries: DashMap<String, String>,
}

impl InMemoryRecoveryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(prefix: &str, user_id: Uuid) -> String {
        format!("{}:{}", prefix, user_id)
    }

    fn get_json<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.entries.get(key)?;
        match serde_json::from_str(raw.value()) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key, error = %e, "discarding unreadable recovery entry");
                None
            }
        }
    }

    fn set_json<T: serde::Serialize>(&self, key: String, value: &T) {
        match serde_json::to_string(value) {
            Ok(raw) => {
                self.entries.insert(key, raw);
            }
            Err(e) => warn!(key, error = %e, "failed to persist recovery entry"),
        }
    }
}

#[async_trait]
impl RecoveryStore for InMemoryRecoveryStore {
    async fn set_ongoing_order(&self, user_id: Uuid, marker: &RecoveryMarker) {
        self.set_json(Self::key("ongoing_order", user_id), marker);
    }

    async fn ongoing_order(&self, user_id: Uuid) -> Option<RecoveryMarker> {
        self.get_json(&Self::key("ongoing_order", user_id))
    }

    async fn clear_ongoing_order(&self, user_id: Uuid) {
        self.entries.remove(&Self::key("ongoing_order", user_id));
    }

    async fn set_pending_redirect(&self, user_id: Uuid, url: &str) {
        self.entries
            .insert(Self::key("pending_redirect", user_id), url.to_string());
    }

    async fn pending_redirect(&self, user_id: Uuid) -> Option<String> {
        self.entries
            .get(&Self::key("pending_redirect", user_id))
            .map(|v| v.value().clone())
    }

    async fn clear_pending_redirect(&self, user_id: Uuid) {
        self.entries.remove(&Self::key("pending_redirect", user_id));
    }

    async fn push_saved_address(&self, user_id: Uuid, address: SavedAddress) {
        let key = Self::key("saved_addresses", user_id);
        let mut list: Vec<SavedAddress> = self.get_json(&key).unwrap_or_default();
        list.insert(0, address);
        list.truncate(SAVED_ADDRESS_CAP);
        self.set_json(key, &list);
    }

    async fn saved_addresses(&self, user_id: Uuid) -> Vec<SavedAddress> {
        self.get_json(&Self::key("saved_addresses", user_id))
            .unwrap_or_default()
    }

    async fn set_notifications_muted(&self, user_id: Uuid, muted: bool) {
        self.entries
            .insert(Self::key("notifications_muted", user_id), muted.to_string());
    }

    async fn notifications_muted(&self, user_id: Uuid) -> bool {
        self.entries
            .get(&Self::key("notifications_muted", user_id))
            .map(|v| v.value() == "true")
            .unwrap_or(false)
    }
}
