//! The asynchronous request-body intake engine of an HTTP server.
//!
//! This crate implements the hard concurrent core of request body
//! consumption: an application registers a callback-driven consumer for an
//! incoming byte stream whose chunks arrive piecemeal on an I/O thread,
//! while the consuming callbacks run on a separate dispatch thread, with
//! neither thread blocking the other and with at most one in-flight
//! callback invocation at any time.
//!
//! # Components
//!
//! - [`content::Chunk`] / [`content::ContentQueue`]: the immutable content
//!   units and the ordered per-request buffer of pending content, including
//!   the normal (`Eof`) and abnormal (`EarlyEof`) end-of-stream sentinels
//! - [`state::channel`]: the dispatch action controller, the per-request
//!   loop that alternates between doing work and waiting, driven by
//!   `enter_handling` / `exit_handling` transitions
//! - `state::read` (internal): the async read state machine that bridges
//!   push-style readiness to the controller and the listener
//! - [`ReadListener`]: the three-operation consumer callback capability
//!   (`on_data_available`, `on_all_data_read`, `on_error`)
//! - [`Connector`]: the narrow interface to the network layer
//!   (fill-interest and the cross-thread wake primitive)
//! - [`intake_channel`]: assembles the [`BodyIntake`] / [`DispatchChannel`]
//!   pair for one request
//!
//! # Threading contract
//!
//! Exactly one producer thread pushes content; a pool of dispatch threads
//! takes turns owning the handling loop, at most one at a time. All state
//! lives in a single mutex-guarded domain per request, held only for the
//! duration of a transition and never across a callback or connector call.
//! Listener callbacks always run on a thread that currently owns the
//! handling loop, never on the producer thread. The wake primitive is safe
//! to call redundantly; readiness transitions that pile up while a
//! notification is pending coalesce into that one notification.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use http_intake::content::{Chunk, ReadOutcome};
//! use http_intake::state::Action;
//! use http_intake::{Connector, intake_channel};
//!
//! struct NullConnector;
//!
//! impl Connector for NullConnector {
//!     fn request_fill_interest(&self) {}
//!     fn wake(&self) {}
//! }
//!
//! let (intake, channel) = intake_channel(Arc::new(NullConnector));
//!
//! // the producer (I/O thread) pushes content as it arrives
//! intake.push(Chunk::from(&b"Hello"[..])).unwrap();
//! intake.eof().unwrap();
//!
//! // the dispatch thread drives the handling loop
//! assert_eq!(channel.enter_handling(), Action::Dispatch);
//!
//! // inside the dispatch, the application reads the body
//! let mut body = Vec::new();
//! while intake.is_ready() {
//!     match intake.try_read().unwrap() {
//!         ReadOutcome::Byte(b) => body.push(b),
//!         ReadOutcome::EndOfStream => break,
//!     }
//! }
//! assert_eq!(body, b"Hello");
//!
//! assert_eq!(channel.exit_handling(), Action::Terminated);
//! ```

pub mod content;
pub mod state;

mod connector;
pub use connector::Connector;

mod error;
pub use error::IntakeError;

mod listener;
pub use listener::BoxError;
pub use listener::ReadListener;
pub use listener::RegisterOutcome;

mod intake;
pub use intake::BodyIntake;
pub use intake::DispatchChannel;
pub use intake::intake_channel;

mod utils;
