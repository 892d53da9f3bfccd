//! Minimal named pub/sub register.
//!
//! Callbacks hang off string ids in two buckets, "before" and "after", and
//! run in registration order. The register makes no attempt at fancy
//! dispatch: wildcard handling is the *caller's* job — existence checks and
//! triggers accept id lists, so a caller interested in
//! `"resolving.my_app::Logger"` also passes `"resolving.*"`.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::container::Container;
use crate::instance::Instance;

/// Callback invoked with the produced instance and the owning container.
pub type EventCallback = Arc<dyn Fn(&Instance, &Container) + Send + Sync>;

/// Handle for removing one registered callback.
///
/// Stands in for callable identity: two registrations of the same closure
/// are distinct handlers with distinct tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventToken(u64);

struct Handler {
    token: EventToken,
    callback: EventCallback,
}

/// Before/after callback register keyed by string id.
#[derive(Default)]
pub struct Events {
    // Bucket keys are the raw id prefixed with '<' (before) or '>' (after).
    handlers: RwLock<HashMap<String, Vec<Handler>>>,
    next_token: AtomicU64,
}

impl Events {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a callback for before-triggers of `id`.
    pub fn before(&self, id: &str, callback: EventCallback) -> EventToken {
        self.register('<', id, callback)
    }

    /// Registers a callback for after-triggers of `id`.
    pub fn after(&self, id: &str, callback: EventCallback) -> EventToken {
        self.register('>', id, callback)
    }

    fn register(&self, prefix: char, id: &str, callback: EventCallback) -> EventToken {
        let token = EventToken(self.next_token.fetch_add(1, Ordering::Relaxed));
        self.handlers
            .write()
            .entry(format!("{prefix}{id}"))
            .or_default()
            .push(Handler { token, callback });
        token
    }

    /// Runs every before-callback registered for `id`, in registration order.
    pub fn trigger_before(&self, id: &str, instance: &Instance, container: &Container) {
        self.trigger('<', id, instance, container);
    }

    /// Runs every after-callback registered for `id`, in registration order.
    pub fn trigger_after(&self, id: &str, instance: &Instance, container: &Container) {
        self.trigger('>', id, instance, container);
    }

    fn trigger(&self, prefix: char, id: &str, instance: &Instance, container: &Container) {
        // Snapshot the list so a callback may register or remove handlers.
        let callbacks: Vec<EventCallback> = {
            let handlers = self.handlers.read();
            match handlers.get(&format!("{prefix}{id}")) {
                Some(list) => list.iter().map(|h| Arc::clone(&h.callback)).collect(),
                None => return,
            }
        };

        for callback in callbacks {
            callback(instance, container);
        }
    }

    /// Is any of these ids registered for before-triggers?
    pub fn has_before(&self, ids: &[&str]) -> bool {
        self.has_with_prefix('<', ids)
    }

    /// Is any of these ids registered for after-triggers?
    pub fn has_after(&self, ids: &[&str]) -> bool {
        self.has_with_prefix('>', ids)
    }

    /// Is any of these ids registered at all?
    pub fn has(&self, ids: &[&str]) -> bool {
        self.has_before(ids) || self.has_after(ids)
    }

    fn has_with_prefix(&self, prefix: char, ids: &[&str]) -> bool {
        let handlers = self.handlers.read();
        ids.iter()
            .any(|id| handlers.contains_key(&format!("{prefix}{id}")))
    }

    /// Runs `body` only when one of `ids` has before-listeners.
    pub fn with_before(&self, ids: &[&str], body: impl FnOnce(&Events)) {
        if self.has_before(ids) {
            body(self);
        }
    }

    /// Runs `body` only when one of `ids` has after-listeners.
    pub fn with_after(&self, ids: &[&str], body: impl FnOnce(&Events)) {
        if self.has_after(ids) {
            body(self);
        }
    }

    /// Removes before-handlers for `id`: all of them, or one token.
    pub fn remove_before(&self, id: &str, token: Option<EventToken>) {
        self.remove_with_prefix('<', id, token);
    }

    /// Removes after-handlers for `id`: all of them, or one token.
    pub fn remove_after(&self, id: &str, token: Option<EventToken>) {
        self.remove_with_prefix('>', id, token);
    }

    /// Removes before- and after-handlers for `id`.
    pub fn remove(&self, id: &str, token: Option<EventToken>) {
        self.remove_before(id, token);
        self.remove_after(id, token);
    }

    fn remove_with_prefix(&self, prefix: char, id: &str, token: Option<EventToken>) {
        let mut handlers = self.handlers.write();
        let bucket = format!("{prefix}{id}");

        match token {
            Some(token) => {
                if let Some(list) = handlers.get_mut(&bucket) {
                    list.retain(|h| h.token != token);
                    if list.is_empty() {
                        handlers.remove(&bucket);
                    }
                }
            }
            None => {
                handlers.remove(&bucket);
            }
        }
    }

    /// Drops every registered handler.
    pub fn clear(&self) {
        self.handlers.write().clear();
    }
}

impl fmt::Debug for Events {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let handlers = self.handlers.read();
        let registered: usize = handlers.values().map(Vec::len).sum();
        f.debug_struct("Events")
            .field("ids", &handlers.len())
            .field("handlers", &registered)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    fn counting_callback(counter: &Arc<AtomicU32>) -> EventCallback {
        let counter = Arc::clone(counter);
        Arc::new(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn after_trigger_runs_handlers_in_order() {
        let container = Container::new();
        let events = Events::new();
        let order = Arc::new(RwLock::new(Vec::new()));

        for tag in ["first", "second"] {
            let order = Arc::clone(&order);
            events.after(
                "resolving.test",
                Arc::new(move |_, _| order.write().push(tag)),
            );
        }

        events.trigger_after("resolving.test", &Instance::of(0u8), &container);
        assert_eq!(*order.read(), vec!["first", "second"]);
    }

    #[test]
    fn before_and_after_buckets_are_distinct() {
        let container = Container::new();
        let events = Events::new();
        let counter = Arc::new(AtomicU32::new(0));

        events.before("boot", counting_callback(&counter));
        events.trigger_after("boot", &Instance::of(0u8), &container);
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        events.trigger_before("boot", &Instance::of(0u8), &container);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn wildcard_existence_is_caller_driven() {
        let events = Events::new();
        events.after("resolving.*", Arc::new(|_, _| {}));

        assert!(!events.has_after(&["resolving.Logger"]));
        assert!(events.has_after(&["resolving.Logger", "resolving.*"]));
        assert!(events.has(&["resolving.*"]));
    }

    #[test]
    fn remove_by_token_leaves_others() {
        let container = Container::new();
        let events = Events::new();
        let counter = Arc::new(AtomicU32::new(0));

        let token = events.after("tick", counting_callback(&counter));
        events.after("tick", counting_callback(&counter));

        events.remove_after("tick", Some(token));
        events.trigger_after("tick", &Instance::of(0u8), &container);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn remove_without_token_drops_id() {
        let container = Container::new();
        let events = Events::new();
        let counter = Arc::new(AtomicU32::new(0));

        events.after("tick", counting_callback(&counter));
        events.before("tick", counting_callback(&counter));
        events.remove("tick", None);

        events.trigger_after("tick", &Instance::of(0u8), &container);
        events.trigger_before("tick", &Instance::of(0u8), &container);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert!(!events.has(&["tick"]));
    }

    #[test]
    fn with_after_guards_execution() {
        let events = Events::new();
        let mut ran = false;

        events.with_after(&["missing"], |_| ran = true);
        assert!(!ran);

        events.after("present", Arc::new(|_, _| {}));
        events.with_after(&["missing", "present"], |_| ran = true);
        assert!(ran);
    }

    #[test]
    fn clear_drops_everything() {
        let events = Events::new();
        events.after("a", Arc::new(|_, _| {}));
        events.before("b", Arc::new(|_, _| {}));

        events.clear();
        assert!(!events.has(&["a", "b"]));
    }

    #[test]
    fn handler_may_register_during_trigger() {
        let container = Container::new();
        let events = Arc::new(Events::new());
        let counter = Arc::new(AtomicU32::new(0));

        let inner_events = Arc::clone(&events);
        let inner_counter = Arc::clone(&counter);
        events.after(
            "boot",
            Arc::new(move |_, _| {
                inner_counter.fetch_add(1, Ordering::SeqCst);
                inner_events.after("boot", Arc::new(|_, _| {}));
            }),
        );

        events.trigger_after("boot", &Instance::of(0u8), &container);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
