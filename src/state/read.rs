//! The async read state machine.
//!
//! Bridges push-style readiness (content arriving on the producer thread) to
//! the dispatch action controller and the registered listener. The decisions
//! here are pure: the intake engine calls them under the request's state
//! lock and performs the resulting effects (fill-interest, wake, callback
//! delivery) with the lock released.

use tracing::trace;

use crate::error::IntakeError;
use crate::listener::ReadListener;
use crate::utils::ensure;

/// Readiness of the registered listener with respect to pending content.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum ReadyState {
    /// No notification is pending: either nothing demanded one yet, or the
    /// last one was delivered.
    Idle,
    /// The listener wants content but none is available; fill-interest has
    /// been requested.
    Unready,
    /// Content became ready and a notification is pending delivery by the
    /// handling loop.
    Woken,
}

/// Which terminal callback, if any, has been delivered.
///
/// `on_all_data_read` and `on_error` are mutually exclusive and each fires
/// at most once; after either the machine is permanently terminal.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum TerminalMark {
    None,
    AllDataRead,
    Errored,
}

/// What a listener registration must do next.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum RegisterDecision {
    /// Content is ready and the registering thread owns the handling loop:
    /// deliver the callbacks synchronously, within the registering call.
    DeliverNow,
    /// Content is ready but no thread owns the handling loop: owe a read
    /// callback and wake the dispatch channel.
    WakeChannel,
    /// Nothing is ready: ask the connector for fill-interest.
    FillInterest,
}

/// What a content arrival must do next.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum Arrival {
    /// A thread is inside the handling loop: owe it a read callback, no
    /// wake needed.
    ScheduleNoWake,
    /// No thread owns the handling loop: owe a read callback and wake.
    ScheduleAndWake,
    /// A notification is already pending; this arrival coalesces into it.
    AlreadyPending,
    /// No listener is registered; readiness only matters to blocking reads.
    NoListener,
}

/// Listener registration and readiness state for one request.
pub(crate) struct ReadState {
    listener: Option<Box<dyn ReadListener>>,
    registered: bool,
    ready_state: ReadyState,
    terminal_mark: TerminalMark,
}

impl std::fmt::Debug for ReadState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadState")
            .field("registered", &self.registered)
            .field("in_callback", &(self.registered && self.listener.is_none()))
            .field("ready_state", &self.ready_state)
            .field("terminal_mark", &self.terminal_mark)
            .finish()
    }
}

impl ReadState {
    pub(crate) fn new() -> Self {
        Self { listener: None, registered: false, ready_state: ReadyState::Idle, terminal_mark: TerminalMark::None }
    }

    /// Registers the one-shot listener and decides the delivery path.
    ///
    /// `ready` is the content queue's current readiness and `in_handling`
    /// whether the registering thread owns the handling loop. A second
    /// registration fails fast with [`IntakeError::DuplicateRegistration`].
    pub(crate) fn on_register(
        &mut self,
        listener: Box<dyn ReadListener>,
        ready: bool,
        in_handling: bool,
    ) -> Result<RegisterDecision, IntakeError> {
        ensure!(!self.registered, IntakeError::DuplicateRegistration);

        self.registered = true;
        self.listener = Some(listener);

        let decision = if ready {
            if in_handling {
                RegisterDecision::DeliverNow
            } else {
                self.ready_state = ReadyState::Woken;
                RegisterDecision::WakeChannel
            }
        } else {
            self.ready_state = ReadyState::Unready;
            RegisterDecision::FillInterest
        };
        trace!(?decision, in_handling, "listener registered");
        Ok(decision)
    }

    /// Content (or a terminal sentinel) arrived; decide how to notify.
    ///
    /// Arrivals while a notification is already pending coalesce into the
    /// one pending notification: each readiness transition triggers at most
    /// one new delivery cycle.
    pub(crate) fn on_content(&mut self, in_handling: bool) -> Arrival {
        if !self.registered || self.terminal_mark != TerminalMark::None {
            return Arrival::NoListener;
        }

        let arrival = match self.ready_state {
            ReadyState::Woken => Arrival::AlreadyPending,
            ReadyState::Idle | ReadyState::Unready => {
                if in_handling {
                    self.ready_state = ReadyState::Idle;
                    Arrival::ScheduleNoWake
                } else {
                    self.ready_state = ReadyState::Woken;
                    Arrival::ScheduleAndWake
                }
            }
        };
        trace!(?arrival, in_handling, "content arrived");
        arrival
    }

    /// Takes the listener out for a callback invocation outside the lock.
    pub(crate) fn take_listener(&mut self) -> Option<Box<dyn ReadListener>> {
        self.listener.take()
    }

    /// Puts the listener back after a callback returned.
    pub(crate) fn restore_listener(&mut self, listener: Box<dyn ReadListener>) {
        debug_assert!(self.listener.is_none());
        self.listener = Some(listener);
    }

    /// Returns true if a listener has ever been registered
    #[inline]
    pub(crate) fn is_registered(&self) -> bool {
        self.registered
    }

    /// Returns true while a callback invocation is in flight
    #[inline]
    pub(crate) fn in_callback(&self) -> bool {
        self.registered && self.listener.is_none()
    }

    #[inline]
    pub(crate) fn terminal_mark(&self) -> TerminalMark {
        self.terminal_mark
    }

    #[inline]
    pub(crate) fn mark_all_data_read(&mut self) {
        debug_assert_eq!(self.terminal_mark, TerminalMark::None);
        self.terminal_mark = TerminalMark::AllDataRead;
    }

    #[inline]
    pub(crate) fn mark_errored(&mut self) {
        debug_assert_eq!(self.terminal_mark, TerminalMark::None);
        self.terminal_mark = TerminalMark::Errored;
    }

    #[inline]
    pub(crate) fn set_ready_state(&mut self, ready_state: ReadyState) {
        self.ready_state = ready_state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::BoxError;

    struct NoopListener;

    impl ReadListener for NoopListener {
        fn on_data_available(&mut self) -> Result<(), BoxError> {
            Ok(())
        }
        fn on_all_data_read(&mut self) -> Result<(), BoxError> {
            Ok(())
        }
        fn on_error(&mut self, _cause: &IntakeError) {}
    }

    fn register(state: &mut ReadState, ready: bool, in_handling: bool) -> RegisterDecision {
        state.on_register(Box::new(NoopListener), ready, in_handling).unwrap()
    }

    #[test]
    fn ready_inside_handling_delivers_now() {
        let mut state = ReadState::new();
        assert_eq!(register(&mut state, true, true), RegisterDecision::DeliverNow);
    }

    #[test]
    fn ready_outside_handling_wakes_the_channel() {
        let mut state = ReadState::new();
        assert_eq!(register(&mut state, true, false), RegisterDecision::WakeChannel);
    }

    #[test]
    fn unready_registration_requests_fill_interest() {
        let mut state = ReadState::new();
        assert_eq!(register(&mut state, false, true), RegisterDecision::FillInterest);
    }

    #[test]
    fn second_registration_fails_fast() {
        let mut state = ReadState::new();
        register(&mut state, false, true);
        assert!(matches!(
            state.on_register(Box::new(NoopListener), false, true),
            Err(IntakeError::DuplicateRegistration)
        ));
    }

    #[test]
    fn arrival_without_listener_is_ignored() {
        let mut state = ReadState::new();
        assert_eq!(state.on_content(false), Arrival::NoListener);
    }

    #[test]
    fn arrival_outside_handling_schedules_a_wake() {
        let mut state = ReadState::new();
        register(&mut state, false, true);
        assert_eq!(state.on_content(false), Arrival::ScheduleAndWake);
    }

    #[test]
    fn arrival_inside_handling_schedules_without_wake() {
        let mut state = ReadState::new();
        register(&mut state, false, true);
        assert_eq!(state.on_content(true), Arrival::ScheduleNoWake);
    }

    #[test]
    fn back_to_back_arrivals_coalesce() {
        let mut state = ReadState::new();
        register(&mut state, false, true);
        assert_eq!(state.on_content(false), Arrival::ScheduleAndWake);
        assert_eq!(state.on_content(false), Arrival::AlreadyPending);
    }

    #[test]
    fn arrivals_after_terminal_mark_are_ignored() {
        let mut state = ReadState::new();
        register(&mut state, true, true);
        state.mark_all_data_read();
        assert_eq!(state.on_content(false), Arrival::NoListener);
    }
}
