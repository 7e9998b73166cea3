//! The observer registry: typed subscription, dispatch, and lazy pruning.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex};

use tracing::{debug, trace, warn};

use crate::channel::Channel;
use crate::token::{SubscriptionId, SubscriptionToken};

/// Outcome of invoking a stored callback.
enum Delivery {
    /// The callback ran.
    Delivered,
    /// The owner behind an owner-bound entry is gone; the entry must be
    /// pruned without invoking the callback.
    OwnerGone,
}

type Callback<P> = Arc<dyn Fn(&P) -> Delivery + Send + Sync>;

/// A snapshot of one channel's entries, taken at dispatch start.
type DispatchBatch<P> = Vec<(SubscriptionId, Callback<P>)>;

/// Address identity of an owning `Arc`, used only for bulk removal.
///
/// Valid as an identity only while the owner is alive, which holds for both
/// call sites: `subscribe_bound` and `unsubscribe_all` each borrow the
/// owning `Arc`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OwnerKey(usize);

impl OwnerKey {
    fn of<O>(owner: &Arc<O>) -> Self {
        Self(Arc::as_ptr(owner).cast::<()>().addr())
    }
}

/// One registered interest on a channel.
struct Entry<C: Channel> {
    id: SubscriptionId,
    owner: Option<OwnerKey>,
    callback: Callback<C::Payload>,
}

/// Type-erased access to one channel's entry list.
trait Slot: Any + Send {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn contains(&self, id: SubscriptionId) -> bool;
    fn remove(&mut self, id: SubscriptionId) -> bool;
    fn remove_owner(&mut self, owner: OwnerKey) -> usize;
    fn len(&self) -> usize;
}

struct ChannelSlot<C: Channel> {
    entries: Vec<Entry<C>>,
}

impl<C: Channel> Slot for ChannelSlot<C> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn contains(&self, id: SubscriptionId) -> bool {
        self.entries.iter().any(|entry| entry.id == id)
    }

    fn remove(&mut self, id: SubscriptionId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.id != id);
        self.entries.len() != before
    }

    fn remove_owner(&mut self, owner: OwnerKey) -> usize {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.owner != Some(owner));
        before.saturating_sub(self.entries.len())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Shared registry state: one slot per channel that has ever seen a
/// subscription.
pub(crate) struct RegistryState {
    slots: HashMap<TypeId, Box<dyn Slot>>,
}

impl RegistryState {
    fn slot_mut<C: Channel>(&mut self) -> &mut ChannelSlot<C> {
        self.slots
            .entry(TypeId::of::<C>())
            .or_insert_with(|| {
                Box::new(ChannelSlot::<C> {
                    entries: Vec::new(),
                })
            })
            .as_any_mut()
            .downcast_mut::<ChannelSlot<C>>()
            .expect("channel slot type mismatch")
    }

    fn slot<C: Channel>(&self) -> Option<&ChannelSlot<C>> {
        self.slots
            .get(&TypeId::of::<C>())
            .and_then(|slot| slot.as_any().downcast_ref::<ChannelSlot<C>>())
    }
}

/// Removes one entry if still present. Shared by every cancellation path.
///
/// # Panics
///
/// Panics if the lock is poisoned.
pub(crate) fn remove_entry(
    state: &Mutex<RegistryState>,
    channel: TypeId,
    id: SubscriptionId,
) -> bool {
    let mut state = state.lock().expect("lock poisoned");
    state
        .slots
        .get_mut(&channel)
        .is_some_and(|slot| slot.remove(id))
}

/// Whether an entry is still registered.
///
/// # Panics
///
/// Panics if the lock is poisoned.
pub(crate) fn contains_entry(
    state: &Mutex<RegistryState>,
    channel: TypeId,
    id: SubscriptionId,
) -> bool {
    let state = state.lock().expect("lock poisoned");
    state
        .slots
        .get(&channel)
        .is_some_and(|slot| slot.contains(id))
}

/// Multi-channel observer registry.
///
/// Producers call [`dispatch`](Self::dispatch) once per logical state
/// change; the registry fans the payload out synchronously to every live
/// subscriber of that channel, in registration order. Subscriptions are
/// removed explicitly through their [`SubscriptionToken`], in bulk via
/// [`unsubscribe_all`](Self::unsubscribe_all), or lazily when a dispatch
/// finds an owner-bound entry whose owner was dropped.
///
/// `EventRegistry` is a cheap handle: clones share the same state, so a
/// producer and its observers can each hold one.
///
/// **Note:** callbacks live inside the registry's shared state. A callback
/// that captures a cloned `EventRegistry` therefore keeps that state alive
/// through a reference cycle. Hold the clone outside the callback where
/// possible; a [`SubscriptionToken`] is always safe to store in observer
/// state, since its registry reference is weak.
#[derive(Clone)]
pub struct EventRegistry {
    state: Arc<Mutex<RegistryState>>,
}

impl EventRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(RegistryState {
                slots: HashMap::new(),
            })),
        }
    }

    /// Subscribe a plain closure to channel `C`.
    ///
    /// The callback runs synchronously on the dispatching thread for every
    /// event on `C` until cancelled through the returned token. Dropping
    /// the token does not cancel.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn subscribe<C, F>(&self, callback: F) -> SubscriptionToken
    where
        C: Channel,
        F: Fn(&C::Payload) + Send + Sync + 'static,
    {
        let callback: Callback<C::Payload> = Arc::new(move |payload| {
            callback(payload);
            Delivery::Delivered
        });
        self.insert::<C>(None, callback)
    }

    /// Subscribe to channel `C` on behalf of `owner`.
    ///
    /// The registry keeps only a weak reference to `owner`, never extending
    /// its lifetime. While the owner is alive, the callback receives the
    /// resolved owner together with the payload; once the owner is dropped
    /// the entry goes inert and is pruned by the next dispatch on `C`, with
    /// no explicit unsubscribe required.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn subscribe_bound<C, O, F>(&self, owner: &Arc<O>, callback: F) -> SubscriptionToken
    where
        C: Channel,
        O: Send + Sync + 'static,
        F: Fn(&O, &C::Payload) + Send + Sync + 'static,
    {
        let weak = Arc::downgrade(owner);
        let callback: Callback<C::Payload> = Arc::new(move |payload| match weak.upgrade() {
            Some(owner) => {
                callback(&owner, payload);
                Delivery::Delivered
            }
            None => Delivery::OwnerGone,
        });
        self.insert::<C>(Some(OwnerKey::of(owner)), callback)
    }

    fn insert<C: Channel>(
        &self,
        owner: Option<OwnerKey>,
        callback: Callback<C::Payload>,
    ) -> SubscriptionToken {
        let id = SubscriptionId::next();
        {
            let mut state = self.state.lock().expect("lock poisoned");
            state.slot_mut::<C>().entries.push(Entry {
                id,
                owner,
                callback,
            });
        }

        debug!(
            channel = C::name(),
            subscription_id = %id,
            owner_bound = owner.is_some(),
            "subscriber registered"
        );

        SubscriptionToken::new(
            Arc::downgrade(&self.state),
            TypeId::of::<C>(),
            C::name(),
            id,
        )
    }

    /// Cancel the subscription identified by `token`.
    ///
    /// Idempotent: cancelling an entry that was already cancelled or pruned
    /// is a no-op, as is presenting a token issued by a different registry.
    /// Equivalent to [`SubscriptionToken::cancel`].
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn cancel(&self, token: &SubscriptionToken) {
        if remove_entry(&self.state, token.channel(), token.id()) {
            debug!(
                channel = token.channel_name(),
                subscription_id = %token.id(),
                "subscription cancelled"
            );
        }
    }

    /// Remove every subscription bound to `owner`, across all channels.
    ///
    /// Eager counterpart to the lazy pruning performed by
    /// [`dispatch`](Self::dispatch): an owner that wants to detach before
    /// it is dropped calls this. Plain closure subscriptions are never
    /// affected. Returns the number of entries removed.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn unsubscribe_all<O>(&self, owner: &Arc<O>) -> usize
    where
        O: Send + Sync + 'static,
    {
        let key = OwnerKey::of(owner);
        let removed = {
            let mut state = self.state.lock().expect("lock poisoned");
            state
                .slots
                .values_mut()
                .map(|slot| slot.remove_owner(key))
                .sum()
        };

        if removed > 0 {
            debug!(removed, "owner subscriptions removed");
        }
        removed
    }

    /// Dispatch `payload` to every live subscriber of `C`.
    ///
    /// Callbacks run synchronously on the calling thread, in registration
    /// order, each at most once per dispatch. The entry list is snapshotted
    /// at dispatch start: entries subscribed by a callback during the pass
    /// are not invoked until the next dispatch, and entries cancelled during
    /// the pass are skipped if not yet reached. Owner-bound entries whose
    /// owner has been dropped are removed here, as a side effect of the
    /// dispatch, and skipped.
    ///
    /// A panicking callback is caught, reported via `tracing`, and does not
    /// prevent delivery to the remaining entries; the entry stays
    /// registered. Returns the number of callbacks that ran to completion.
    ///
    /// The internal lock is never held while a callback runs, so callbacks
    /// may freely re-enter the registry (subscribe, cancel, or dispatch
    /// again). In multi-threaded hosts this also means a cancellation racing
    /// with an in-flight dispatch on another thread may still see one final
    /// delivery.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn dispatch<C: Channel>(&self, payload: &C::Payload) -> usize {
        let channel = TypeId::of::<C>();
        let batch: DispatchBatch<C::Payload> = {
            let state = self.state.lock().expect("lock poisoned");
            match state.slot::<C>() {
                Some(slot) => slot
                    .entries
                    .iter()
                    .map(|entry| (entry.id, Arc::clone(&entry.callback)))
                    .collect(),
                None => return 0,
            }
        };

        trace!(channel = C::name(), entries = batch.len(), "dispatching");

        let mut delivered = 0_usize;
        for (id, callback) in batch {
            // An earlier callback in this pass may have cancelled this entry.
            if !contains_entry(&self.state, channel, id) {
                continue;
            }

            match catch_unwind(AssertUnwindSafe(|| (*callback)(payload))) {
                Ok(Delivery::Delivered) => delivered = delivered.saturating_add(1),
                Ok(Delivery::OwnerGone) => {
                    remove_entry(&self.state, channel, id);
                    trace!(
                        channel = C::name(),
                        subscription_id = %id,
                        "owner dropped, entry pruned"
                    );
                }
                Err(panic) => {
                    warn!(
                        channel = C::name(),
                        subscription_id = %id,
                        error = ?panic,
                        "subscriber panicked"
                    );
                }
            }
        }
        delivered
    }

    /// Number of entries currently registered on `C`.
    ///
    /// Includes owner-bound entries whose owner has been dropped but which
    /// no dispatch on `C` has pruned yet.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn subscriber_count<C: Channel>(&self) -> usize {
        let state = self.state.lock().expect("lock poisoned");
        state.slot::<C>().map_or(0, |slot| slot.entries.len())
    }

    /// Whether any channel has a registered entry.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        let state = self.state.lock().expect("lock poisoned");
        state.slots.values().all(|slot| slot.len() == 0)
    }

    /// Remove every subscription on every channel.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn clear(&self) {
        let mut state = self.state.lock().expect("lock poisoned");
        state.slots.clear();
        debug!("all subscriptions cleared");
    }
}

impl Default for EventRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self
            .state
            .lock()
            .map(|state| state.slots.values().map(|slot| slot.len()).sum::<usize>())
            .unwrap_or_default();
        f.debug_struct("EventRegistry")
            .field("subscription_count", &count)
            .finish()
    }
}
