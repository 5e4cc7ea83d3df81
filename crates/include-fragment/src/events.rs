//! Public signals emitted by an include-fragment element.
//!
//! Signals reach observers two ways:
//!
//! - synchronous listeners, run in registration order at the moment the
//!   signal fires (this is how the cancelable pre-replace signal hands out
//!   its mutable fragment);
//! - a `tokio::sync::broadcast` bus carrying serializable [`FragmentEvent`]
//!   values for async consumers. When nobody subscribes, events are dropped.
//!
//! Listeners are always invoked with no element or document lock held.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast;

use crate::dom::Fragment;

/// Every signal an element emits, in the order an activation may emit them:
/// `load-start → (pre-replace)? → load → (post-replace)? → load-end`, or
/// `load-start → error → load-end`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum FragmentEvent {
    /// An activation entered `loading`.
    LoadStart { src: String },
    /// Fetched markup was parsed and is about to replace the element.
    PreReplace { src: String },
    /// The activation finished successfully.
    Load { src: String },
    /// The element was replaced in its document.
    PostReplace { src: String },
    /// The activation is over.
    LoadEnd { src: String },
    /// The activation failed.
    Error { src: String, reason: String },
}

impl FragmentEvent {
    /// Signal name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::LoadStart { .. } => "load-start",
            Self::PreReplace { .. } => "pre-replace",
            Self::Load { .. } => "load",
            Self::PostReplace { .. } => "post-replace",
            Self::LoadEnd { .. } => "load-end",
            Self::Error { .. } => "error",
        }
    }

    pub fn src(&self) -> &str {
        match self {
            Self::LoadStart { src }
            | Self::PreReplace { src }
            | Self::Load { src }
            | Self::PostReplace { src }
            | Self::LoadEnd { src }
            | Self::Error { src, .. } => src,
        }
    }

    /// Only pre-replace can be canceled.
    pub fn cancelable(&self) -> bool {
        matches!(self, Self::PreReplace { .. })
    }

    /// Errors stay on the element; everything else propagates to ancestors.
    pub fn bubbles(&self) -> bool {
        !matches!(self, Self::Error { .. })
    }
}

/// Payload of the pre-replace signal.
///
/// Listeners may edit `fragment` in place; whatever it holds after the last
/// listener is what gets spliced. Calling [`ReplaceEvent::prevent_default`]
/// keeps the element in its document.
#[derive(Debug)]
pub struct ReplaceEvent {
    pub src: String,
    pub fragment: Fragment,
    canceled: bool,
}

impl ReplaceEvent {
    pub fn new(src: impl Into<String>, fragment: Fragment) -> Self {
        Self {
            src: src.into(),
            fragment,
            canceled: false,
        }
    }

    pub fn prevent_default(&mut self) {
        self.canceled = true;
    }

    pub fn default_prevented(&self) -> bool {
        self.canceled
    }
}

type Listener = Arc<dyn Fn(&FragmentEvent) + Send + Sync>;
type ReplaceListener = Arc<dyn Fn(&mut ReplaceEvent) + Send + Sync>;

/// Identifies a registered listener so it can be removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
struct Registry {
    next_id: u64,
    listeners: Vec<(ListenerId, Listener)>,
    replace_listeners: Vec<(ListenerId, ReplaceListener)>,
}

impl Registry {
    fn next(&mut self) -> ListenerId {
        self.next_id += 1;
        ListenerId(self.next_id)
    }
}

/// Per-element signal dispatcher.
pub struct EventBus {
    sender: broadcast::Sender<FragmentEvent>,
    registry: Mutex<Registry>,
}

impl EventBus {
    /// Create a bus with the given broadcast buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            registry: Mutex::new(Registry::default()),
        }
    }

    fn registry(&self) -> std::sync::MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Listen to every signal.
    pub fn listen(&self, f: impl Fn(&FragmentEvent) + Send + Sync + 'static) -> ListenerId {
        let mut reg = self.registry();
        let id = reg.next();
        reg.listeners.push((id, Arc::new(f)));
        id
    }

    /// Listen to pre-replace with mutable access to the payload.
    pub fn listen_replace(
        &self,
        f: impl Fn(&mut ReplaceEvent) + Send + Sync + 'static,
    ) -> ListenerId {
        let mut reg = self.registry();
        let id = reg.next();
        reg.replace_listeners.push((id, Arc::new(f)));
        id
    }

    /// Remove a listener. Returns whether it was registered.
    pub fn unlisten(&self, id: ListenerId) -> bool {
        let mut reg = self.registry();
        let before = reg.listeners.len() + reg.replace_listeners.len();
        reg.listeners.retain(|(i, _)| *i != id);
        reg.replace_listeners.retain(|(i, _)| *i != id);
        before != reg.listeners.len() + reg.replace_listeners.len()
    }

    /// Subscribe to all future signals.
    pub fn subscribe(&self) -> broadcast::Receiver<FragmentEvent> {
        self.sender.subscribe()
    }

    /// Fire a signal: synchronous listeners first, then the broadcast bus.
    pub fn emit(&self, event: FragmentEvent) {
        tracing::trace!(src = event.src(), "{}", event.name());
        let listeners: Vec<Listener> = self
            .registry()
            .listeners
            .iter()
            .map(|(_, l)| l.clone())
            .collect();
        for listener in listeners {
            listener(&event);
        }
        let _ = self.sender.send(event);
    }

    /// Fire pre-replace. Returns `true` when no listener canceled it.
    pub fn dispatch_replace(&self, event: &mut ReplaceEvent) -> bool {
        let replace_listeners: Vec<ReplaceListener> = self
            .registry()
            .replace_listeners
            .iter()
            .map(|(_, l)| l.clone())
            .collect();
        for listener in replace_listeners {
            listener(event);
        }
        self.emit(FragmentEvent::PreReplace {
            src: event.src.clone(),
        });
        !event.default_prevented()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = FragmentEvent::Error {
            src: "/boom".to_string(),
            reason: "Failed to load resource: the server responded with a status of 500".into(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"error\""));
        assert!(json.contains("/boom"));

        let parsed: FragmentEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn test_error_is_neither_cancelable_nor_bubbling() {
        let err = FragmentEvent::Error {
            src: String::new(),
            reason: String::new(),
        };
        assert!(!err.cancelable());
        assert!(!err.bubbles());
        assert!(FragmentEvent::PreReplace { src: String::new() }.cancelable());
    }

    #[test]
    fn test_emit_no_subscribers() {
        let bus = EventBus::new(16);
        bus.emit(FragmentEvent::LoadStart { src: "/x".into() });
    }

    #[test]
    fn test_listeners_run_in_order_then_broadcast() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let s1 = seen.clone();
        bus.listen(move |e| s1.lock().unwrap().push(format!("a:{}", e.name())));
        let s2 = seen.clone();
        bus.listen(move |e| s2.lock().unwrap().push(format!("b:{}", e.name())));

        bus.emit(FragmentEvent::Load { src: "/x".into() });
        assert_eq!(*seen.lock().unwrap(), vec!["a:load", "b:load"]);
        assert_eq!(rx.try_recv().unwrap().name(), "load");
    }

    #[test]
    fn test_unlisten() {
        let bus = EventBus::new(16);
        let count = Arc::new(Mutex::new(0));
        let c = count.clone();
        let id = bus.listen(move |_| *c.lock().unwrap() += 1);
        bus.emit(FragmentEvent::Load { src: String::new() });
        assert!(bus.unlisten(id));
        assert!(!bus.unlisten(id));
        bus.emit(FragmentEvent::Load { src: String::new() });
        assert_eq!(*count.lock().unwrap(), 1);
    }

    #[test]
    fn test_replace_listener_can_mutate_and_cancel() {
        let bus = EventBus::new(16);
        bus.listen_replace(|e| {
            if let Some(el) = e.fragment.first_element_mut() {
                el.set_text_content("hey");
            }
        });
        let mut event = ReplaceEvent::new("/hello", Fragment::parse("<div>hello</div>"));
        assert!(bus.dispatch_replace(&mut event));
        assert_eq!(event.fragment.to_html(), "<div>hey</div>");

        bus.listen_replace(|e| e.prevent_default());
        let mut event = ReplaceEvent::new("/hello", Fragment::parse("<div>hello</div>"));
        assert!(!bus.dispatch_replace(&mut event));
    }
}
