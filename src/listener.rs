//! The consumer callback capability: the push-style sink an application
//! registers to be told when request body content can be read.

use std::error::Error;

use crate::error::IntakeError;

/// Boxed error type returned by listener callbacks.
pub type BoxError = Box<dyn Error + Send + Sync>;

/// A push-style consumer of request body content.
///
/// At most one listener may be registered per request, and at most one of
/// these callbacks is in flight at any time. Callbacks always run on a
/// dispatch thread that currently owns the request's handling loop, never on
/// the producer thread, and never with the engine's state lock held, so an
/// implementation is free to read from the intake inside
/// [`on_data_available`](ReadListener::on_data_available).
///
/// An `Err` returned from `on_data_available` or `on_all_data_read` is caught
/// at the invocation boundary and converted into a single
/// [`on_error`](ReadListener::on_error) delivery plus request abandonment; it
/// never propagates silently and is never retried.
pub trait ReadListener: Send {
    /// Content can be read without blocking.
    ///
    /// Invoked once per batch of newly available content. If the listener
    /// does not fully drain the ready content, readiness is re-evaluated
    /// after it returns and another cycle is scheduled (never recursively
    /// within the same call).
    fn on_data_available(&mut self) -> Result<(), BoxError>;

    /// The last byte has been consumed and the stream ended normally.
    ///
    /// Fires exactly once, and never before every pushed byte was made
    /// available to the listener.
    fn on_all_data_read(&mut self) -> Result<(), BoxError>;

    /// The stream terminated abnormally, or a prior callback failed.
    ///
    /// Fires at most once and is mutually exclusive with
    /// [`on_all_data_read`](ReadListener::on_all_data_read).
    fn on_error(&mut self, cause: &IntakeError);
}

/// Which delivery path a listener registration took.
///
/// Returned by [`BodyIntake::set_listener`](crate::BodyIntake::set_listener)
/// so that callers and tests can observe how the registration raced with
/// content arrival.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// Content was already ready and the registering thread was inside the
    /// handling loop: the callbacks were delivered synchronously, within the
    /// registration call itself.
    Delivered,
    /// Content was already ready but no thread was inside the handling loop:
    /// a wake was issued and the next `enter_handling` will perform the
    /// delivery via the read-callback action.
    WakeIssued,
    /// No content was ready: fill-interest was requested and the listener
    /// will be notified once the producer pushes content.
    Pending,
}
