//! Event router.
//!
//! Holds an ordered list of `(Route, handler)` pairs and nothing else.
//! [`EventRouter::dispatch`] parses one raw frame and invokes every matching
//! handler synchronously, in registration order. Bad frames and unknown
//! types are logged and dropped; dispatch never fails.

use super::envelope::{Envelope, EventKind, UpdateKind};

/// Selects which envelopes a handler receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// `auth_ack` frames.
    AuthAck,
    /// `chat_message` frames.
    ChatMessage,
    /// `notification` frames.
    Notification,
    /// `realtime_update` frames of one subkind.
    Update(UpdateKind),
    /// Every `realtime_update` with a known subkind.
    AnyUpdate,
}

impl Route {
    /// Whether an envelope of `kind` goes to this route.
    #[must_use]
    pub fn matches(&self, kind: &EventKind) -> bool {
        match (self, kind) {
            (Self::AuthAck, EventKind::AuthAck)
            | (Self::ChatMessage, EventKind::ChatMessage)
            | (Self::Notification, EventKind::Notification) => true,
            (Self::Update(want), EventKind::RealtimeUpdate(got)) => got.is_known() && want == got,
            (Self::AnyUpdate, EventKind::RealtimeUpdate(got)) => got.is_known(),
            _ => false,
        }
    }
}

/// Handler invoked for every matching envelope.
pub type Handler = Box<dyn FnMut(&Envelope) + Send>;

/// What happened to one dispatched frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// This many handlers ran.
    Handled(usize),
    /// Known kind, but nothing is registered for it.
    Unhandled,
    /// Unknown type or subkind; dropped.
    Unknown,
    /// Not a parseable envelope; dropped.
    Malformed,
}

/// Type → handler mapping.
#[derive(Default)]
pub struct EventRouter {
    routes: Vec<(Route, Handler)>,
}

impl std::fmt::Debug for EventRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRouter")
            .field(
                "routes",
                &self.routes.iter().map(|(route, _)| route).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl EventRouter {
    /// Empty router.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `route`. Handlers run in registration order.
    pub fn on(&mut self, route: Route, handler: impl FnMut(&Envelope) + Send + 'static) {
        self.routes.push((route, Box::new(handler)));
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether no handler is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Parse `raw` and run every matching handler.
    pub fn dispatch(&mut self, raw: &str) -> DispatchOutcome {
        match Envelope::parse(raw) {
            Ok(envelope) => self.dispatch_envelope(&envelope),
            Err(e) => {
                log::error!(
                    "[Router] Dropping frame: {} ({})",
                    e,
                    super::preview(raw, 100)
                );
                DispatchOutcome::Malformed
            }
        }
    }

    /// Run every handler whose route matches an already-parsed envelope.
    pub fn dispatch_envelope(&mut self, envelope: &Envelope) -> DispatchOutcome {
        let kind = envelope.kind();
        if !kind.is_known() {
            log::warn!("[Router] Ignoring unrecognised event {}", kind);
            return DispatchOutcome::Unknown;
        }

        let mut handled = 0;
        for (route, handler) in &mut self.routes {
            if route.matches(kind) {
                handler(envelope);
                handled += 1;
            }
        }

        if handled == 0 {
            log::debug!("[Router] No handler for {}", kind);
            DispatchOutcome::Unhandled
        } else {
            log::trace!("[Router] {} handled by {} handler(s)", kind, handled);
            DispatchOutcome::Handled(handled)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn recorder(router: &mut EventRouter, route: Route, tag: &'static str) -> Arc<Mutex<Vec<String>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        router.on(route, move |envelope| {
            sink.lock().unwrap().push(format!("{tag}:{}", envelope.kind()));
        });
        seen
    }

    #[test]
    fn test_malformed_frames_invoke_nothing() {
        let mut router = EventRouter::new();
        let seen = recorder(&mut router, Route::AnyUpdate, "any");
        let chat = recorder(&mut router, Route::ChatMessage, "chat");

        assert_eq!(router.dispatch("definitely not json"), DispatchOutcome::Malformed);
        assert_eq!(router.dispatch(""), DispatchOutcome::Malformed);
        assert_eq!(router.dispatch("42"), DispatchOutcome::Malformed);
        assert_eq!(router.dispatch(r#"{"no_type":true}"#), DispatchOutcome::Malformed);

        assert!(seen.lock().unwrap().is_empty());
        assert!(chat.lock().unwrap().is_empty());
    }

    #[test]
    fn test_unknown_types_invoke_nothing() {
        let mut router = EventRouter::new();
        let seen = recorder(&mut router, Route::AnyUpdate, "any");

        assert_eq!(router.dispatch(r#"{"type":"menu_changed"}"#), DispatchOutcome::Unknown);
        assert_eq!(
            router.dispatch(r#"{"type":"realtime_update","updateType":"coupon_applied"}"#),
            DispatchOutcome::Unknown
        );
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_handlers_run_in_registration_order() {
        let mut router = EventRouter::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        for tag in ["first", "second", "third"] {
            let log = Arc::clone(&log);
            router.on(Route::Update(UpdateKind::CartCleared), move |_| {
                log.lock().unwrap().push(tag);
            });
        }

        let outcome = router.dispatch(r#"{"type":"realtime_update","updateType":"cart_cleared"}"#);
        assert_eq!(outcome, DispatchOutcome::Handled(3));
        assert_eq!(*log.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_routes_select_by_kind_and_subkind() {
        let mut router = EventRouter::new();
        let cart = recorder(&mut router, Route::Update(UpdateKind::CartCleared), "cart");
        let any = recorder(&mut router, Route::AnyUpdate, "any");
        let note = recorder(&mut router, Route::Notification, "note");

        router.dispatch(r#"{"type":"realtime_update","updateType":"rider_assigned"}"#);
        router.dispatch(r#"{"type":"realtime_update","updateType":"cart_cleared"}"#);
        router.dispatch(r#"{"type":"notification","data":{"title":"t","message":"m"}}"#);

        assert_eq!(*cart.lock().unwrap(), vec!["cart:realtime_update(cart_cleared)"]);
        assert_eq!(any.lock().unwrap().len(), 2);
        assert_eq!(*note.lock().unwrap(), vec!["note:notification"]);
    }

    #[test]
    fn test_known_kind_without_handler_is_unhandled() {
        let mut router = EventRouter::new();
        assert!(router.is_empty());
        assert_eq!(router.dispatch(r#"{"type":"auth_ack"}"#), DispatchOutcome::Unhandled);
    }
}
