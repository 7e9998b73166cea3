//! Cancellation handles for subscriptions.

use std::any::TypeId;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, Weak};

use tracing::debug;

use crate::registry::{RegistryState, contains_entry, remove_entry};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Identifier of a single subscription.
///
/// Generated from a process-wide monotonic counter and never reused, so a
/// stale handle can never remove a newer, unrelated entry - not even one
/// registered on a different registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub(crate) fn next() -> Self {
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle for cancelling one subscription.
///
/// Returned by [`EventRegistry::subscribe`](crate::EventRegistry::subscribe)
/// and [`subscribe_bound`](crate::EventRegistry::subscribe_bound). The token
/// holds a non-owning reference back to the registry: it never keeps the
/// registry alive, and cancelling after the registry was dropped is a no-op.
///
/// Dropping a token does NOT cancel its subscription; convert it with
/// [`into_guard`](Self::into_guard) for cancel-on-drop behavior.
#[must_use = "dropping a token does not cancel the subscription; keep it (or convert it into a guard) to detach later"]
pub struct SubscriptionToken {
    registry: Weak<Mutex<RegistryState>>,
    channel: TypeId,
    channel_name: &'static str,
    id: SubscriptionId,
}

impl SubscriptionToken {
    pub(crate) fn new(
        registry: Weak<Mutex<RegistryState>>,
        channel: TypeId,
        channel_name: &'static str,
        id: SubscriptionId,
    ) -> Self {
        Self {
            registry,
            channel,
            channel_name,
            id,
        }
    }

    /// The subscription's id.
    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Name of the channel the subscription was made on.
    #[must_use]
    pub fn channel_name(&self) -> &'static str {
        self.channel_name
    }

    pub(crate) fn channel(&self) -> TypeId {
        self.channel
    }

    /// Cancel the subscription.
    ///
    /// Idempotent: cancelling twice, cancelling an entry that was already
    /// pruned, or cancelling after the registry itself was dropped are all
    /// no-ops.
    ///
    /// # Panics
    ///
    /// Panics if the registry lock is poisoned.
    pub fn cancel(&self) {
        let Some(state) = self.registry.upgrade() else {
            return;
        };
        if remove_entry(&state, self.channel, self.id) {
            debug!(channel = self.channel_name, subscription_id = %self.id, "subscription cancelled");
        }
    }

    /// Whether the subscription is still registered.
    ///
    /// Returns `false` once the entry was cancelled, pruned, or the registry
    /// no longer exists. An owner-bound entry whose owner is already gone
    /// still reports `true` until a dispatch on its channel prunes it.
    ///
    /// # Panics
    ///
    /// Panics if the registry lock is poisoned.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.registry
            .upgrade()
            .is_some_and(|state| contains_entry(&state, self.channel, self.id))
    }

    /// Wrap the token so the subscription is cancelled when the wrapper is
    /// dropped.
    pub fn into_guard(self) -> SubscriptionGuard {
        SubscriptionGuard { token: Some(self) }
    }
}

impl fmt::Debug for SubscriptionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionToken")
            .field("channel", &self.channel_name)
            .field("id", &self.id)
            .finish()
    }
}

/// RAII wrapper around a [`SubscriptionToken`] that cancels on drop.
///
/// Ties a subscription to a scope, or to a field of the observing component
/// so the subscription ends with it.
#[must_use = "dropping a guard cancels its subscription immediately"]
pub struct SubscriptionGuard {
    // Some until dropped or released.
    token: Option<SubscriptionToken>,
}

impl SubscriptionGuard {
    /// The wrapped token.
    ///
    /// # Panics
    ///
    /// Panics if the guard was already released (not reachable through the
    /// public API).
    #[must_use]
    pub fn token(&self) -> &SubscriptionToken {
        self.token.as_ref().expect("guard already released")
    }

    /// Detach the token from the guard without cancelling.
    #[must_use]
    pub fn release(mut self) -> SubscriptionToken {
        self.token.take().expect("guard already released")
    }
}

impl fmt::Debug for SubscriptionGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionGuard")
            .field("token", &self.token)
            .finish()
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        if let Some(token) = self.token.take() {
            token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::channel::Channel;
    use crate::registry::EventRegistry;

    struct Beat;

    impl Channel for Beat {
        type Payload = ();
    }

    #[test]
    fn test_ids_are_monotonic() {
        let registry = EventRegistry::new();
        let first = registry.subscribe::<Beat, _>(|_| {});
        let second = registry.subscribe::<Beat, _>(|_| {});

        assert!(second.id() > first.id());
    }

    #[test]
    fn test_cancel_after_registry_dropped_is_noop() {
        let registry = EventRegistry::new();
        let token = registry.subscribe::<Beat, _>(|_| {});
        drop(registry);

        assert!(!token.is_active());
        token.cancel();
    }

    #[test]
    fn test_is_active_tracks_lifecycle() {
        let registry = EventRegistry::new();
        let token = registry.subscribe::<Beat, _>(|_| {});
        assert!(token.is_active());

        token.cancel();
        assert!(!token.is_active());
    }

    #[test]
    fn test_guard_cancels_on_drop() {
        let registry = EventRegistry::new();
        let count = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&count);
        let guard = registry
            .subscribe::<Beat, _>(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .into_guard();

        registry.dispatch::<Beat>(&());
        assert_eq!(count.load(Ordering::SeqCst), 1);

        drop(guard);
        registry.dispatch::<Beat>(&());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_guard_release_keeps_subscription() {
        let registry = EventRegistry::new();
        let guard = registry.subscribe::<Beat, _>(|_| {}).into_guard();

        let token = guard.release();
        assert!(token.is_active());
        assert_eq!(registry.subscriber_count::<Beat>(), 1);
    }

    #[test]
    fn test_token_debug_names_channel() {
        let registry = EventRegistry::new();
        let token = registry.subscribe::<Beat, _>(|_| {});

        let rendered = format!("{token:?}");
        assert!(rendered.contains("SubscriptionToken"));
        assert!(rendered.contains("Beat"));
    }
}
