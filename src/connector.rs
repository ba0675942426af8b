//! The narrow interface to the network connector that owns the socket.

/// Collaborator interface to the network layer.
///
/// The intake engine never touches a socket itself; it asks the connector to
/// arrange future notification, and to resume a dispatch loop parked on this
/// request. Both operations must tolerate redundant calls, and both are
/// invoked with the engine's state lock released, so an implementation may
/// call straight back into the intake without deadlocking.
pub trait Connector: Send + Sync {
    /// Ask the network layer to notify (by pushing content) when more bytes
    /// might be readable. Requested exactly once per became-not-ready
    /// transition.
    fn request_fill_interest(&self);

    /// Cross-thread resume primitive: schedule or unpark a dispatch thread
    /// so that it re-enters this request's handling loop. Safe to call
    /// redundantly.
    fn wake(&self);
}
