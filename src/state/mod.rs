//! The two per-request state machines.
//!
//! - [`channel`]: the dispatch action controller driving the handling loop
//! - `read` (internal): the async read state machine bridging push-style
//!   readiness to the listener and the controller
//!
//! Both are pure transition machines; the intake engine composes them under
//! one lock and performs their effects with the lock released.

pub mod channel;
pub use channel::Action;
pub use channel::Phase;

pub(crate) mod read;
