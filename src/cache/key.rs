//! Logical cache keys.

/// A cached backend resource, addressed the way the REST API addresses it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CacheKey {
    /// The user's cart.
    Cart,
    /// The user's order list.
    Orders,
    /// One order.
    Order(String),
    /// The notification list.
    Notifications,
    /// The unread-notification badge count.
    NotificationCount,
}

impl CacheKey {
    /// Path segment under `/api/`.
    #[must_use]
    pub fn path(&self) -> String {
        match self {
            Self::Cart => "cart".to_string(),
            Self::Orders => "orders".to_string(),
            Self::Order(id) => format!("orders/{id}"),
            Self::Notifications => "notifications".to_string(),
            Self::NotificationCount => "notifications/count".to_string(),
        }
    }

    /// Parse a path like `orders/17` back into a key.
    #[must_use]
    pub fn from_path(path: &str) -> Option<Self> {
        match path.trim_matches('/') {
            "cart" => Some(Self::Cart),
            "orders" => Some(Self::Orders),
            "notifications" => Some(Self::Notifications),
            "notifications/count" => Some(Self::NotificationCount),
            other => other
                .strip_prefix("orders/")
                .filter(|id| !id.is_empty() && !id.contains('/'))
                .map(|id| Self::Order(id.to_string())),
        }
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.path())
    }
}
