//! Chime - a typed, cancellable observer registry.
//!
//! This crate provides:
//! - A [`Channel`] trait for compile-time event channels with fixed payloads
//! - An [`EventRegistry`] that fans payloads out to subscribers synchronously
//! - [`SubscriptionToken`] handles for explicit, idempotent cancellation
//! - Owner-bound subscriptions that go inert when their owner is dropped
//!
//! # Architecture
//!
//! A producer calls [`EventRegistry::dispatch`] once per logical state
//! change; the registry invokes every live subscriber of that channel in
//! registration order, on the calling thread. Subscriptions come in two
//! forms:
//!
//! 1. **Plain closures**: [`EventRegistry::subscribe`] stores the closure
//!    until it is cancelled through its token.
//!
//! 2. **Owner-bound closures**: [`EventRegistry::subscribe_bound`] holds
//!    only a weak reference to the owning object. Once the owner is dropped
//!    the entry is pruned lazily, by the next dispatch on its channel, with
//!    no explicit unsubscribe call.
//!
//! # Example
//!
//! ```rust
//! use chime::EventRegistry;
//! use chime::playback::{Started, TrackInfo};
//!
//! let registry = EventRegistry::new();
//!
//! let token = registry.subscribe::<Started, _>(|track| {
//!     println!("now playing: {}", track.title);
//! });
//!
//! let delivered = registry.dispatch::<Started>(&TrackInfo::new("Hey Jude", "The Beatles"));
//! assert_eq!(delivered, 1);
//!
//! token.cancel();
//! assert_eq!(
//!     registry.dispatch::<Started>(&TrackInfo::new("Let It Be", "The Beatles")),
//!     0
//! );
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod playback;
pub mod prelude;

mod channel;
mod registry;
mod token;

pub use channel::Channel;
pub use registry::EventRegistry;
pub use token::{SubscriptionGuard, SubscriptionId, SubscriptionToken};
