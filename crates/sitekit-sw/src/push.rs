//! Push notifications and background sync.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use futures::future::join_all;
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

use crate::cache::SharedCacheStorage;
use crate::config::NotificationDefaults;
use crate::net::{FetchError, Fetcher};
use crate::strategy::store;

/// Action id that opens the app.
pub const ACTION_EXPLORE: &str = "explore";
/// Action id that only dismisses.
pub const ACTION_CLOSE: &str = "close";

// ==================== Push ====================

/// A `push` event.
#[derive(Debug, Clone, Default)]
pub struct PushEvent {
    pub data: Option<Bytes>,
}

impl PushEvent {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: Some(data.into()),
        }
    }
}

/// JSON push payload. Missing fields fall back to the configured defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PushPayload {
    pub title: Option<String>,
    pub body: Option<String>,
}

impl PushPayload {
    /// Parse a push payload. An absent payload is an empty one.
    pub fn parse(data: Option<&[u8]>) -> Result<Self, serde_json::Error> {
        match data {
            None => Ok(Self::default()),
            Some(bytes) => serde_json::from_slice(bytes),
        }
    }
}

/// Unique identifier for a shown notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NotificationId(u64);

impl NotificationId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationData {
    pub date_of_arrival: u64,
    pub primary_key: u32,
}

/// A notification as displayed to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub vibrate: Vec<u32>,
    pub data: NotificationData,
    pub actions: Vec<NotificationAction>,
}

impl Notification {
    /// Build a notification from a payload and the configured defaults.
    pub fn from_payload(payload: PushPayload, defaults: &NotificationDefaults) -> Self {
        Self {
            id: NotificationId::new(),
            title: payload.title.unwrap_or_else(|| defaults.title.clone()),
            body: payload.body.unwrap_or_else(|| defaults.body.clone()),
            icon: defaults.icon.clone(),
            badge: defaults.badge.clone(),
            vibrate: defaults.vibrate.clone(),
            data: NotificationData {
                date_of_arrival: SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_millis() as u64,
                primary_key: 1,
            },
            actions: vec![
                NotificationAction {
                    action: ACTION_EXPLORE.to_string(),
                    title: defaults.explore_title.clone(),
                },
                NotificationAction {
                    action: ACTION_CLOSE.to_string(),
                    title: defaults.close_title.clone(),
                },
            ],
        }
    }
}

/// Notifications currently on screen.
#[derive(Debug, Default)]
pub struct Notifications {
    shown: HashMap<NotificationId, Notification>,
}

impl Notifications {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn show(&mut self, notification: Notification) -> NotificationId {
        let id = notification.id;
        info!(title = %notification.title, "Showing notification");
        self.shown.insert(id, notification);
        id
    }

    pub fn close(&mut self, id: NotificationId) -> Option<Notification> {
        self.shown.remove(&id)
    }

    pub fn get(&self, id: NotificationId) -> Option<&Notification> {
        self.shown.get(&id)
    }

    pub fn len(&self) -> usize {
        self.shown.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shown.is_empty()
    }
}

/// A `notificationclick` event.
#[derive(Debug, Clone)]
pub struct NotificationClickEvent {
    pub notification: NotificationId,
    /// The chosen action, `None` for a click on the body.
    pub action: Option<String>,
}

impl NotificationClickEvent {
    pub fn wants_explore(&self) -> bool {
        self.action.as_deref() == Some(ACTION_EXPLORE)
    }
}

// ==================== Background Sync ====================

/// A `sync` event.
#[derive(Debug, Clone)]
pub struct SyncEvent {
    pub tag: String,
}

impl SyncEvent {
    pub fn new(tag: impl Into<String>) -> Self {
        Self { tag: tag.into() }
    }
}

/// Result of refreshing a cache.
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    pub refreshed: Vec<Url>,
    pub failed: Vec<(Url, FetchError)>,
}

/// Re-fetch every entry of a cache, overwriting entries that succeed.
///
/// Each entry is independent: a failure never affects its siblings.
pub async fn refresh_cache(
    caches: &SharedCacheStorage,
    fetcher: &dyn Fetcher,
    cache_name: &str,
) -> SyncReport {
    let requests = match caches.read().await.get(cache_name) {
        Some(cache) => cache.keys(),
        None => Vec::new(),
    };

    let results = join_all(requests.iter().cloned().map(|r| fetcher.fetch(r))).await;

    let mut report = SyncReport::default();
    for (request, result) in requests.into_iter().zip(results) {
        let result = match result {
            Ok(response) => {
                if store(caches, cache_name, &request, &response).await {
                    Ok(())
                } else {
                    Err(FetchError::Failed(format!(
                        "unexpected status {}",
                        response.status
                    )))
                }
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => report.refreshed.push(request.url),
            Err(e) => {
                debug!(url = %request.url, error = %e, "Sync refresh skipped entry");
                report.failed.push((request.url, e));
            }
        }
    }

    info!(
        cache = cache_name,
        refreshed = report.refreshed.len(),
        failed = report.failed.len(),
        "Background sync complete"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_payload() {
        let payload = PushPayload::parse(Some(r#"{"title":"Capítulo 4"}"#.as_bytes())).unwrap();
        assert_eq!(payload.title.as_deref(), Some("Capítulo 4"));
        assert_eq!(payload.body, None);
    }

    #[test]
    fn test_absent_payload_is_empty() {
        assert_eq!(PushPayload::parse(None).unwrap(), PushPayload::default());
    }

    #[test]
    fn test_malformed_payload_is_an_error() {
        assert!(PushPayload::parse(Some(&b"not json"[..])).is_err());
        assert!(PushPayload::parse(Some(&b"42"[..])).is_err());
    }

    #[test]
    fn test_notification_defaults() {
        let defaults = NotificationDefaults::default();
        let notification = Notification::from_payload(PushPayload::default(), &defaults);

        assert_eq!(notification.title, defaults.title);
        assert_eq!(notification.body, defaults.body);
        assert_eq!(notification.vibrate, vec![100, 50, 100]);
        let actions: Vec<&str> = notification.actions.iter().map(|a| a.action.as_str()).collect();
        assert_eq!(actions, vec![ACTION_EXPLORE, ACTION_CLOSE]);
    }

    #[test]
    fn test_notifications_show_close() {
        let mut notifications = Notifications::new();
        let notification =
            Notification::from_payload(PushPayload::default(), &NotificationDefaults::default());

        let id = notifications.show(notification);
        assert_eq!(notifications.len(), 1);
        assert!(notifications.close(id).is_some());
        assert!(notifications.is_empty());
    }

    #[test]
    fn test_click_action() {
        let id = NotificationId::new();
        let explore = NotificationClickEvent {
            notification: id,
            action: Some("explore".to_string()),
        };
        let body = NotificationClickEvent {
            notification: id,
            action: None,
        };
        assert!(explore.wants_explore());
        assert!(!body.wants_explore());
    }
}
