//! Compile-time event channel identifiers.

/// A statically known event channel.
///
/// A channel is identified by a marker type implementing this trait; the
/// associated [`Payload`](Channel::Payload) fixes the data every dispatch on
/// that channel carries. Because channels are selected by type, a callback
/// subscribed to one channel can never receive another channel's payload,
/// and there is no runtime topic namespace to mistype.
///
/// Implementors are usually zero-sized:
///
/// ```rust
/// use chime::Channel;
///
/// struct VolumeChanged;
///
/// impl Channel for VolumeChanged {
///     type Payload = f32;
///
///     fn name() -> &'static str {
///         "volume_changed"
///     }
/// }
/// ```
pub trait Channel: 'static {
    /// Data delivered to every subscriber of this channel.
    type Payload: Send + Sync + 'static;

    /// Short channel name used in logs.
    ///
    /// Never used for routing. The default is the marker's type name, which
    /// can be verbose - override it where log readability matters.
    fn name() -> &'static str {
        std::any::type_name::<Self>()
    }
}
