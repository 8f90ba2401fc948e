//! Cache invalidation bridge.
//!
//! Translates `realtime_update` and `notification` envelopes into cache
//! invalidations. The bridge only marks resources stale; whoever reads them
//! next decides when to refetch.
//!
//! | subkind                 | invalidates                            |
//! |-------------------------|----------------------------------------|
//! | `cart_cleared`          | `cart`                                 |
//! | `order_created`         | `orders`, `orders/<id>`                |
//! | `payment_completed`     | `orders`                               |
//! | `order_status_updated`  | `orders`, `orders/<id>`                |
//! | `rider_assigned`        | `orders`, `orders/<id>`                |
//! | `notifications_updated` | `notifications`, `notifications/count` |

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;

use super::key::CacheKey;
use crate::events::{Envelope, EventKind, UpdateKind};

/// Something that can be told a resource is stale.
pub trait CacheInvalidator: Send + Sync {
    /// Mark `key` stale. Must not block.
    fn invalidate(&self, key: &CacheKey);
}

/// Keys to invalidate for one update subkind.
///
/// Per-order keys are skipped when the update carries no `orderId`.
/// Unknown subkinds invalidate nothing.
#[must_use]
pub fn invalidations_for(update: &UpdateKind, order_id: Option<&str>) -> Vec<CacheKey> {
    let order = || order_id.map(|id| CacheKey::Order(id.to_string()));

    match update {
        UpdateKind::CartCleared => vec![CacheKey::Cart],
        UpdateKind::PaymentCompleted => vec![CacheKey::Orders],
        UpdateKind::OrderCreated | UpdateKind::OrderStatusUpdated | UpdateKind::RiderAssigned => {
            std::iter::once(CacheKey::Orders).chain(order()).collect()
        }
        UpdateKind::NotificationsUpdated => {
            vec![CacheKey::Notifications, CacheKey::NotificationCount]
        }
        UpdateKind::Unknown(_) => Vec::new(),
    }
}

/// A transient user-facing alert raised by a `notification` event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    /// Short headline.
    pub title: String,
    /// Body text.
    pub message: String,
    /// Order the notification is about, if any.
    pub order_id: Option<String>,
}

impl Alert {
    fn from_envelope(envelope: &Envelope) -> Self {
        let field = |name: &str| {
            envelope
                .data()
                .and_then(|data| data.get(name))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        Self {
            title: field("title"),
            message: field("message"),
            order_id: envelope.order_id(),
        }
    }
}

/// Routes resource-change events to a [`CacheInvalidator`].
pub struct CacheInvalidationBridge {
    cache: Arc<dyn CacheInvalidator>,
    alerts: mpsc::UnboundedSender<Alert>,
}

impl std::fmt::Debug for CacheInvalidationBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheInvalidationBridge").finish_non_exhaustive()
    }
}

impl CacheInvalidationBridge {
    /// Bridge into `cache`, plus the receiver for surfaced alerts.
    pub fn new(cache: Arc<dyn CacheInvalidator>) -> (Self, mpsc::UnboundedReceiver<Alert>) {
        let (alerts, alerts_rx) = mpsc::unbounded_channel();
        (Self { cache, alerts }, alerts_rx)
    }

    /// Handle one envelope. Returns the keys that were invalidated.
    pub fn handle(&self, envelope: &Envelope) -> Vec<CacheKey> {
        match envelope.kind() {
            EventKind::RealtimeUpdate(update) => self.on_update(update, envelope),
            EventKind::Notification => self.on_notification(envelope),
            _ => Vec::new(),
        }
    }

    fn on_update(&self, update: &UpdateKind, envelope: &Envelope) -> Vec<CacheKey> {
        let order_id = envelope.order_id();
        let keys = invalidations_for(update, order_id.as_deref());
        if keys.is_empty() {
            log::debug!("[Cache] {} invalidates nothing", update);
        }
        self.invalidate_all(&keys);
        keys
    }

    fn on_notification(&self, envelope: &Envelope) -> Vec<CacheKey> {
        let keys = vec![CacheKey::Notifications, CacheKey::NotificationCount];
        self.invalidate_all(&keys);

        let alert = Alert::from_envelope(envelope);
        log::info!("[Cache] Notification: {}", alert.title);
        if self.alerts.send(alert).is_err() {
            log::debug!("[Cache] No alert listener, notification not surfaced");
        }
        keys
    }

    fn invalidate_all(&self, keys: &[CacheKey]) {
        for key in keys {
            log::debug!("[Cache] Invalidating {}", key);
            self.cache.invalidate(key);
        }
    }
}
