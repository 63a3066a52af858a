//! Subscription registry: namespace → ordered registrations.
//!
//! Insertion order matters twice: namespaces are replayed to the gateway in
//! first-registration order after a reconnect, and callbacks within a
//! namespace fire in registration order. A namespace key exists only while
//! it has at least one registration.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::errors::EventsError;
use crate::event::Delivery;
use crate::matcher::Filter;

/// A subscription callback.
///
/// Cloning shares the same callback; [`same_as`](Self::same_as) compares
/// identity, which is how a single registration is removed again.
#[derive(Clone)]
pub struct EventCallback(Arc<dyn Fn(&Delivery) + Send + Sync>);

impl EventCallback {
    /// Wrap a closure.
    pub fn new(f: impl Fn(&Delivery) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    /// Invoke the callback.
    pub fn call(&self, delivery: &Delivery) {
        (self.0)(delivery);
    }

    /// Whether both handles point at the same callback.
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for EventCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EventCallback")
            .field(&Arc::as_ptr(&self.0).cast::<()>())
            .finish()
    }
}

/// One `(namespace, filter, callback)` entry.
#[derive(Clone, Debug)]
pub struct Registration {
    /// Namespace the callback listens on.
    pub namespace: String,
    /// Event-type filter.
    pub filter: Filter,
    /// Callback invoked for matching events.
    pub callback: EventCallback,
}

/// Outcome of [`SubscriptionRegistry::register`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Registered {
    /// The namespace had no registrations before this one, so the gateway
    /// must be told to start streaming it.
    pub is_first: bool,
}

/// Outcome of [`SubscriptionRegistry::unregister`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Unregistered {
    /// How many registrations were removed.
    pub removed: usize,
    /// The removal left the namespace without registrations, so the gateway
    /// must be told to stop streaming it.
    pub became_empty: bool,
}

/// Reject empty namespaces.
pub fn validate_namespace(namespace: &str) -> Result<(), EventsError> {
    if namespace.is_empty() {
        return Err(EventsError::invalid_argument(
            "a subscription requires a non-empty namespace name",
        ));
    }
    Ok(())
}

/// In-memory map of namespace → ordered registrations.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    entries: IndexMap<String, Vec<Registration>>,
}

impl SubscriptionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a registration.
    pub fn register(
        &mut self,
        namespace: &str,
        filter: Filter,
        callback: EventCallback,
    ) -> Result<Registered, EventsError> {
        validate_namespace(namespace)?;
        let list = self.entries.entry(namespace.to_string()).or_default();
        let is_first = list.is_empty();
        list.push(Registration {
            namespace: namespace.to_string(),
            filter,
            callback,
        });
        Ok(Registered { is_first })
    }

    /// Remove registrations.
    ///
    /// Without a callback every registration of the namespace goes. With one,
    /// only the first registration holding that same callback is removed.
    /// Unknown namespaces and unknown callbacks remove nothing.
    pub fn unregister(
        &mut self,
        namespace: &str,
        callback: Option<&EventCallback>,
    ) -> Unregistered {
        let Some(callback) = callback else {
            let removed = self
                .entries
                .shift_remove(namespace)
                .map_or(0, |list| list.len());
            return Unregistered {
                removed,
                became_empty: removed > 0,
            };
        };

        let Some(list) = self.entries.get_mut(namespace) else {
            return Unregistered {
                removed: 0,
                became_empty: false,
            };
        };
        let Some(index) = list.iter().position(|r| r.callback.same_as(callback)) else {
            return Unregistered {
                removed: 0,
                became_empty: false,
            };
        };
        let _ = list.remove(index);
        let became_empty = list.is_empty();
        if became_empty {
            let _ = self.entries.shift_remove(namespace);
        }
        Unregistered {
            removed: 1,
            became_empty,
        }
    }

    /// Namespaces in first-registration order.
    pub fn namespaces(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// Registrations of a namespace, in registration order.
    pub fn entries_for(&self, namespace: &str) -> &[Registration] {
        self.entries
            .get(namespace)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Owned copy of a namespace's `(filter, callback)` pairs, so callbacks
    /// can run after the registry lock is released.
    pub fn snapshot(&self, namespace: &str) -> Vec<(Filter, EventCallback)> {
        self.entries_for(namespace)
            .iter()
            .map(|r| (r.filter.clone(), r.callback.clone()))
            .collect()
    }

    /// Whether the namespace has registrations.
    pub fn contains(&self, namespace: &str) -> bool {
        self.entries.contains_key(namespace)
    }

    /// Number of namespaces.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no namespace is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> EventCallback {
        EventCallback::new(|_| {})
    }

    #[test]
    fn first_registration_is_reported() {
        let mut registry = SubscriptionRegistry::new();
        let first = registry.register("IAM", Filter::any(), noop()).unwrap();
        let second = registry.register("IAM", Filter::any(), noop()).unwrap();
        let other = registry.register("AUTH", Filter::any(), noop()).unwrap();
        assert!(first.is_first);
        assert!(!second.is_first);
        assert!(other.is_first);
        assert_eq!(registry.entries_for("IAM").len(), 2);
    }

    #[test]
    fn empty_namespace_is_rejected_without_side_effects() {
        let mut registry = SubscriptionRegistry::new();
        let err = registry.register("", Filter::any(), noop()).unwrap_err();
        assert_eq!(err.code(), "DATA.INVALID");
        assert!(registry.is_empty());
    }

    #[test]
    fn namespaces_keep_first_registration_order() {
        let mut registry = SubscriptionRegistry::new();
        for ns in ["C", "A", "B", "A"] {
            let _ = registry.register(ns, Filter::any(), noop()).unwrap();
        }
        assert_eq!(registry.namespaces(), vec!["C", "A", "B"]);
    }

    #[test]
    fn unregister_all_removes_namespace() {
        let mut registry = SubscriptionRegistry::new();
        let _ = registry.register("IAM", Filter::any(), noop()).unwrap();
        let _ = registry.register("IAM", Filter::any(), noop()).unwrap();
        let out = registry.unregister("IAM", None);
        assert_eq!(
            out,
            Unregistered {
                removed: 2,
                became_empty: true
            }
        );
        assert!(!registry.contains("IAM"));
        assert!(registry.entries_for("IAM").is_empty());
    }

    #[test]
    fn unregister_all_on_unknown_namespace() {
        let mut registry = SubscriptionRegistry::new();
        let out = registry.unregister("IAM", None);
        assert_eq!(out.removed, 0);
        assert!(!out.became_empty);
    }

    #[test]
    fn unregister_by_callback_removes_only_that_one() {
        let mut registry = SubscriptionRegistry::new();
        let a = noop();
        let b = noop();
        let _ = registry.register("IAM", Filter::any(), a.clone()).unwrap();
        let _ = registry.register("IAM", Filter::any(), b.clone()).unwrap();

        let out = registry.unregister("IAM", Some(&a));
        assert_eq!(out.removed, 1);
        assert!(!out.became_empty);
        let remaining = registry.entries_for("IAM");
        assert_eq!(remaining.len(), 1);
        assert!(remaining[0].callback.same_as(&b));

        let out = registry.unregister("IAM", Some(&b));
        assert!(out.became_empty);
        assert!(!registry.contains("IAM"));
    }

    #[test]
    fn unregister_by_callback_removes_first_duplicate_only() {
        let mut registry = SubscriptionRegistry::new();
        let a = noop();
        let _ = registry.register("IAM", Filter::exact("x"), a.clone()).unwrap();
        let _ = registry.register("IAM", Filter::exact("y"), a.clone()).unwrap();

        let out = registry.unregister("IAM", Some(&a));
        assert_eq!(out.removed, 1);
        let remaining = registry.entries_for("IAM");
        assert_eq!(remaining.len(), 1);
        assert!(remaining[0].filter.matches("y"));
    }

    #[test]
    fn unregister_unknown_callback_is_noop() {
        let mut registry = SubscriptionRegistry::new();
        let _ = registry.register("IAM", Filter::any(), noop()).unwrap();
        let out = registry.unregister("IAM", Some(&noop()));
        assert_eq!(out.removed, 0);
        assert!(!out.became_empty);
        assert!(registry.contains("IAM"));
    }

    #[test]
    fn removal_preserves_order_of_remaining_namespaces() {
        let mut registry = SubscriptionRegistry::new();
        for ns in ["A", "B", "C"] {
            let _ = registry.register(ns, Filter::any(), noop()).unwrap();
        }
        let _ = registry.unregister("B", None);
        assert_eq!(registry.namespaces(), vec!["A", "C"]);
    }

    #[test]
    fn callback_identity_survives_clone() {
        let a = noop();
        let a2 = a.clone();
        assert!(a.same_as(&a2));
        assert!(!a.same_as(&noop()));
    }
}
