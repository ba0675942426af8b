//! The per-request dispatch action controller.
//!
//! The surrounding server drives each request through a handling loop: take
//! ownership with [`ChannelState::enter_handling`], perform the returned
//! [`Action`], report back with [`ChannelState::exit_handling`], and repeat
//! until the controller answers [`Action::Wait`] (park) or
//! [`Action::Terminated`]. The controller is a pure transition machine: no
//! locks, no I/O, no callbacks. The intake engine holds it inside the
//! request's single state lock and turns its answers into effects.

use tracing::{error, trace, warn};

/// Where the request currently stands in its dispatch lifecycle.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Phase {
    /// No thread has taken ownership of the request yet.
    Idle,
    /// A dispatch thread is running the initial application work.
    Dispatched,
    /// The application switched to async mode; a dispatch thread is inside
    /// the handling loop.
    AsyncStarted,
    /// No thread owns the request; it is parked awaiting a wake.
    AsyncWaiting,
    /// A wake has been requested but no thread has re-entered handling yet.
    AsyncWoken,
    /// The request is finished at this layer.
    Completed,
}

/// The unit of work a thread inside the handling loop must perform next.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Action {
    /// Run the application's request handling code.
    Dispatch,
    /// Deliver the owed read notification to the registered listener.
    ReadCallback,
    /// Deliver the owed write notification (output half of the server).
    WriteCallback,
    /// Nothing is pending: release ownership and park.
    Wait,
    /// The request is complete: leave the loop for good.
    Terminated,
}

/// Dispatch controller state: the current phase plus the work owed to the
/// next thread inside the handling loop.
///
/// Owed callbacks coalesce: readiness transitions that pile up while a
/// callback is still owed collapse into the single pending notification, so
/// at most one read callback is ever outstanding.
#[derive(Debug)]
pub(crate) struct ChannelState {
    phase: Phase,
    read_owed: bool,
    write_owed: bool,
    complete_requested: bool,
}

impl ChannelState {
    pub(crate) fn new() -> Self {
        Self { phase: Phase::Idle, read_owed: false, write_owed: false, complete_requested: false }
    }

    #[inline]
    pub(crate) fn phase(&self) -> Phase {
        self.phase
    }

    /// Returns true while some thread owns the handling loop
    #[inline]
    pub(crate) fn in_handling(&self) -> bool {
        matches!(self.phase, Phase::Dispatched | Phase::AsyncStarted)
    }

    /// Returns true once `start_async` has switched the request to async
    /// mode and it has not completed
    #[inline]
    pub(crate) fn is_async(&self) -> bool {
        matches!(self.phase, Phase::AsyncStarted | Phase::AsyncWaiting | Phase::AsyncWoken)
    }

    /// A thread takes ownership of the request and asks what to do.
    ///
    /// Valid from `Idle` (fresh request: dispatch the application),
    /// `AsyncWoken` (a wake was issued: perform the owed callback) and
    /// `Completed` (nothing left). Entering from any other phase is a driver
    /// bug: it is logged and answered with `Wait` rather than panicking.
    pub(crate) fn enter_handling(&mut self) -> Action {
        let action = match self.phase {
            Phase::Completed => Action::Terminated,
            Phase::Idle => {
                self.phase = Phase::Dispatched;
                Action::Dispatch
            }
            Phase::AsyncWoken => {
                self.phase = Phase::AsyncStarted;
                if self.take_read_owed() {
                    Action::ReadCallback
                } else if self.take_write_owed() {
                    Action::WriteCallback
                } else {
                    // a redundant wake with nothing owed; go back to sleep
                    warn!("entered handling on a spurious wake");
                    self.phase = Phase::AsyncWaiting;
                    Action::Wait
                }
            }
            phase => {
                error!(?phase, "enter_handling from a phase no thread may enter from");
                Action::Wait
            }
        };
        trace!(phase = ?self.phase, ?action, "enter_handling");
        action
    }

    /// The owning thread finished one unit of work; decide what comes next.
    ///
    /// Owed callbacks keep the loop going; otherwise an async request parks
    /// in `AsyncWaiting` and a synchronous one completes.
    pub(crate) fn exit_handling(&mut self) -> Action {
        let action = match self.phase {
            Phase::Dispatched => {
                self.phase = Phase::Completed;
                Action::Terminated
            }
            Phase::AsyncStarted => {
                if self.take_read_owed() {
                    Action::ReadCallback
                } else if self.take_write_owed() {
                    Action::WriteCallback
                } else if self.complete_requested {
                    self.phase = Phase::Completed;
                    Action::Terminated
                } else {
                    self.phase = Phase::AsyncWaiting;
                    Action::Wait
                }
            }
            phase => {
                error!(?phase, "exit_handling without owning the handling loop");
                Action::Wait
            }
        };
        trace!(phase = ?self.phase, ?action, "exit_handling");
        action
    }

    /// Requests a wake of the parked handling loop.
    ///
    /// Returns true iff a parked thread must actually be resumed: only the
    /// `AsyncWaiting -> AsyncWoken` transition does. In every other phase a
    /// wake is a recorded no-op, which makes redundant wakes safe.
    pub(crate) fn wake(&mut self) -> bool {
        match self.phase {
            Phase::AsyncWaiting => {
                self.phase = Phase::AsyncWoken;
                trace!("wake: resuming parked handling loop");
                true
            }
            phase => {
                trace!(?phase, "wake: nothing parked, coalesced");
                false
            }
        }
    }

    /// The application signals it will continue processing asynchronously.
    ///
    /// Valid only while `Dispatched`; the request then stays alive after the
    /// dispatch returns, parked until woken.
    pub(crate) fn start_async(&mut self) {
        match self.phase {
            Phase::Dispatched => self.phase = Phase::AsyncStarted,
            phase => error!(?phase, "start_async is only valid while dispatched"),
        }
    }

    /// The application signals the request is finished; honored at the next
    /// `exit_handling`.
    pub(crate) fn complete(&mut self) {
        self.complete_requested = true;
    }

    /// Records that a read notification is owed. Coalescing: a second owed
    /// read before the first is performed is absorbed.
    #[inline]
    pub(crate) fn set_read_owed(&mut self) {
        self.read_owed = true;
    }

    /// Records that a write notification is owed.
    #[inline]
    pub(crate) fn set_write_owed(&mut self) {
        self.write_owed = true;
    }

    #[inline]
    fn take_read_owed(&mut self) -> bool {
        std::mem::take(&mut self.read_owed)
    }

    #[inline]
    fn take_write_owed(&mut self) -> bool {
        std::mem::take(&mut self.write_owed)
    }
}
