//! Wire envelopes for the realtime channel.
//!
//! # Server → client
//!
//! ```text
//! {"type":"auth_ack"}
//! {"type":"chat_message","content":"…","isFromUser":false,"timestamp":"…"}
//! {"type":"notification","data":{"title":"…","message":"…","orderId":7}}
//! {"type":"realtime_update","updateType":"order_status_updated","data":{"orderId":7}}
//! ```
//!
//! # Client → server
//!
//! ```text
//! {"type":"auth","userId":42}
//! {"type":"chat_message","content":"…"}
//! ```
//!
//! Parsing is deliberately loose: the payload is kept as opaque JSON and only
//! `type` / `updateType` are interpreted. Unrecognised discriminators parse
//! into `Unknown` variants instead of failing.

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::connection::UserId;

/// Why a raw frame could not become an [`Envelope`].
#[derive(Debug, Error)]
pub enum FrameError {
    /// The frame is not valid JSON.
    #[error("frame is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// Valid JSON, but not an object.
    #[error("frame is not a JSON object")]
    NotAnObject,
    /// No string `type` field.
    #[error("frame has no \"type\" field")]
    MissingType,
    /// A `realtime_update` without a string `updateType`.
    #[error("realtime_update frame has no \"updateType\" field")]
    MissingUpdateType,
    /// The payload does not have the shape its type promises.
    #[error("malformed {kind} payload: {source}")]
    Payload {
        /// Wire name of the event type.
        kind: String,
        /// Underlying deserialization error.
        source: serde_json::Error,
    },
}

/// Which resource a `realtime_update` is about.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum UpdateKind {
    /// The user's cart was emptied.
    CartCleared,
    /// A new order was placed.
    OrderCreated,
    /// Payment for an order went through.
    PaymentCompleted,
    /// An order moved to a new status.
    OrderStatusUpdated,
    /// A delivery rider was assigned to an order.
    RiderAssigned,
    /// The notification list changed.
    NotificationsUpdated,
    /// A subkind this client does not know yet.
    Unknown(String),
}

impl UpdateKind {
    /// Every subkind this client understands.
    pub const KNOWN: [UpdateKind; 6] = [
        UpdateKind::CartCleared,
        UpdateKind::OrderCreated,
        UpdateKind::PaymentCompleted,
        UpdateKind::OrderStatusUpdated,
        UpdateKind::RiderAssigned,
        UpdateKind::NotificationsUpdated,
    ];

    /// Parse a wire `updateType`.
    #[must_use]
    pub fn from_wire(name: &str) -> Self {
        match name {
            "cart_cleared" => Self::CartCleared,
            "order_created" => Self::OrderCreated,
            "payment_completed" => Self::PaymentCompleted,
            "order_status_updated" => Self::OrderStatusUpdated,
            "rider_assigned" => Self::RiderAssigned,
            "notifications_updated" => Self::NotificationsUpdated,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// Wire name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::CartCleared => "cart_cleared",
            Self::OrderCreated => "order_created",
            Self::PaymentCompleted => "payment_completed",
            Self::OrderStatusUpdated => "order_status_updated",
            Self::RiderAssigned => "rider_assigned",
            Self::NotificationsUpdated => "notifications_updated",
            Self::Unknown(name) => name,
        }
    }

    /// Whether this is one of [`Self::KNOWN`].
    #[must_use]
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown(_))
    }
}

impl std::fmt::Display for UpdateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Primary discriminator of an inbound envelope.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// The server accepted our `auth` message.
    AuthAck,
    /// A chat message for this user.
    ChatMessage,
    /// A user-facing notification.
    Notification,
    /// A resource changed on the server.
    RealtimeUpdate(UpdateKind),
    /// A type this client does not know yet.
    Unknown(String),
}

impl EventKind {
    /// Whether the router has any business routing this kind.
    #[must_use]
    pub fn is_known(&self) -> bool {
        match self {
            Self::RealtimeUpdate(update) => update.is_known(),
            Self::Unknown(_) => false,
            _ => true,
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AuthAck => write!(f, "auth_ack"),
            Self::ChatMessage => write!(f, "chat_message"),
            Self::Notification => write!(f, "notification"),
            Self::RealtimeUpdate(update) => write!(f, "realtime_update({update})"),
            Self::Unknown(name) => write!(f, "unknown({name})"),
        }
    }
}

/// One classified inbound frame. Immutable once parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    kind: EventKind,
    payload: Value,
}

impl Envelope {
    /// Classify a raw text frame.
    pub fn parse(raw: &str) -> Result<Self, FrameError> {
        let value: Value = serde_json::from_str(raw)?;
        Self::from_value(value)
    }

    /// Classify an already-decoded JSON value.
    pub fn from_value(value: Value) -> Result<Self, FrameError> {
        let Value::Object(ref map) = value else {
            return Err(FrameError::NotAnObject);
        };
        let ty = map
            .get("type")
            .and_then(Value::as_str)
            .ok_or(FrameError::MissingType)?;

        let kind = match ty {
            "auth_ack" => EventKind::AuthAck,
            "chat_message" => EventKind::ChatMessage,
            "notification" => EventKind::Notification,
            "realtime_update" => {
                let update = map
                    .get("updateType")
                    .and_then(Value::as_str)
                    .ok_or(FrameError::MissingUpdateType)?;
                EventKind::RealtimeUpdate(UpdateKind::from_wire(update))
            }
            other => EventKind::Unknown(other.to_string()),
        };

        Ok(Self {
            kind,
            payload: value,
        })
    }

    /// The envelope's classification.
    #[must_use]
    pub fn kind(&self) -> &EventKind {
        &self.kind
    }

    /// The whole frame as received.
    #[must_use]
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// The nested `data` object, if present.
    #[must_use]
    pub fn data(&self) -> Option<&Value> {
        self.payload.get("data")
    }

    /// `data.orderId` as a string, accepting numeric or string ids.
    #[must_use]
    pub fn order_id(&self) -> Option<String> {
        match self.data()?.get("orderId")? {
            Value::Number(n) => Some(n.to_string()),
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            _ => None,
        }
    }
}

/// Cheap check used by the connection manager before full routing.
#[must_use]
pub fn is_auth_ack(raw: &str) -> bool {
    #[derive(serde::Deserialize)]
    struct TypeProbe<'a> {
        #[serde(rename = "type", borrow)]
        ty: Option<&'a str>,
    }

    serde_json::from_str::<TypeProbe<'_>>(raw)
        .is_ok_and(|probe| probe.ty == Some("auth_ack"))
}

/// Frames the client sends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Authenticate the channel as `user_id`.
    Auth {
        /// The logged-in user.
        #[serde(rename = "userId")]
        user_id: UserId,
    },
    /// A chat message typed by the user.
    ChatMessage {
        /// Message text.
        content: String,
    },
}

impl ClientMessage {
    /// Wire name, for logging.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Auth { .. } => "auth",
            Self::ChatMessage { .. } => "chat_message",
        }
    }

    /// Serialize to a text frame.
    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
