//! Prelude module - commonly used types for convenient import.
//!
//! Use `use chime::prelude::*;` to import the essential surface.
//!
//! # Example
//!
//! ```rust
//! use chime::prelude::*;
//!
//! struct Muted;
//!
//! impl Channel for Muted {
//!     type Payload = bool;
//! }
//!
//! let registry = EventRegistry::new();
//! let token = registry.subscribe::<Muted, _>(|muted| {
//!     if *muted {
//!         // dim the artwork, show the banner, ...
//!     }
//! });
//!
//! registry.dispatch::<Muted>(&true);
//! token.cancel();
//! ```

// Channels
pub use crate::Channel;

// Registry
pub use crate::EventRegistry;

// Cancellation handles
pub use crate::{SubscriptionGuard, SubscriptionId, SubscriptionToken};
