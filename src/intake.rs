//! The intake engine: one lock, two state machines, and the wake contract.
//!
//! [`intake_channel`] creates the two halves of the engine for one request:
//!
//! - [`BodyIntake`]: the content side. The producer (network thread) pushes
//!   chunks into it; the consumer reads from it and may register a
//!   [`ReadListener`] for push-style consumption.
//! - [`DispatchChannel`]: the dispatch re-entry surface the surrounding
//!   server loop drives with `enter_handling` / `exit_handling`.
//!
//! Both halves share a single mutex-guarded state so every push, read and
//! state transition is atomic end-to-end. The lock is held only for the
//! duration of a transition: listener callbacks and connector calls always
//! run with the lock released, which keeps application code free to read
//! from the intake inside a callback and lets the connector call straight
//! back in.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use tracing::{error, trace, warn};

use crate::connector::Connector;
use crate::content::{Chunk, ContentQueue, ReadOutcome, Terminal};
use crate::error::IntakeError;
use crate::listener::{ReadListener, RegisterOutcome};
use crate::state::channel::{Action, ChannelState, Phase};
use crate::state::read::{Arrival, ReadState, ReadyState, RegisterDecision, TerminalMark};
use crate::utils::ensure;

/// Creates the intake/dispatch pair for one request.
///
/// The connector is the narrow interface back to the network layer; see
/// [`Connector`] for the contract it must honor.
pub fn intake_channel(connector: Arc<dyn Connector>) -> (BodyIntake, DispatchChannel) {
    let shared = Arc::new(Shared {
        connector,
        inner: Mutex::new(Inner {
            queue: ContentQueue::new(),
            read: ReadState::new(),
            channel: ChannelState::new(),
            fill_requested: false,
        }),
        cond: Condvar::new(),
    });

    (BodyIntake { shared: Arc::clone(&shared) }, DispatchChannel { shared })
}

struct Shared {
    connector: Arc<dyn Connector>,
    inner: Mutex<Inner>,
    cond: Condvar,
}

struct Inner {
    queue: ContentQueue,
    read: ReadState,
    channel: ChannelState,
    /// Latched on each fill-interest request, released on the next push, so
    /// fill-interest goes out exactly once per became-not-ready transition.
    fill_requested: bool,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        // a panic inside application code never runs with this lock held,
        // so a poisoned guard still carries consistent state
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Resumes a parked dispatch loop: unparks `await_wake` callers and asks
    /// the connector to reschedule the request. Called without the lock.
    fn resume_dispatch(&self) {
        self.cond.notify_all();
        self.connector.wake();
    }
}

/// The notification due to the listener at the start of a delivery cycle.
enum Notice {
    DataAvailable,
    AllDataRead,
    Error(IntakeError),
}

fn next_notice(inner: &Inner) -> Option<Notice> {
    if !inner.read.is_registered() || inner.read.terminal_mark() != TerminalMark::None {
        return None;
    }
    // an abnormal terminal preempts queued data: the listener gets the
    // failure as soon as a cycle runs, never a partial success
    match inner.queue.terminal() {
        Terminal::EarlyEof => Some(Notice::Error(IntakeError::StreamTruncated)),
        _ if inner.queue.has_data() => Some(Notice::DataAvailable),
        Terminal::Eof => Some(Notice::AllDataRead),
        Terminal::NotReached => None,
    }
}

/// The content side of one request's body intake.
///
/// Cloneable; clones share the same underlying request state. The producer
/// thread uses [`push`](Self::push), the consuming application uses the read
/// surface ([`is_ready`](Self::is_ready), [`try_read`](Self::try_read),
/// [`blocking_read`](Self::blocking_read)) or registers a [`ReadListener`]
/// via [`set_listener`](Self::set_listener).
#[derive(Clone)]
pub struct BodyIntake {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for BodyIntake {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.shared.lock();
        f.debug_struct("BodyIntake")
            .field("queue", &inner.queue)
            .field("read", &inner.read)
            .field("channel", &inner.channel)
            .finish()
    }
}

impl BodyIntake {
    /// Pushes one content chunk (data or a terminal sentinel).
    ///
    /// Called by the producer thread. Returns whether a wake of the dispatch
    /// loop was issued for this arrival; arrivals while a notification is
    /// already pending coalesce and report `false`. Blocked
    /// [`blocking_read`](Self::blocking_read) callers are unblocked by every
    /// push, including `EarlyEof`.
    ///
    /// Fails fast with [`IntakeError::ProducerAfterTerminal`] once a
    /// terminal sentinel has been pushed.
    pub fn push(&self, chunk: Chunk) -> Result<bool, IntakeError> {
        let mut inner = self.shared.lock();
        inner.queue.push(chunk)?;
        inner.fill_requested = false;
        // readiness changed: unblock any parked blocking reader
        self.shared.cond.notify_all();

        let in_handling = inner.channel.in_handling();
        let arrival = inner.read.on_content(in_handling);
        let wake = schedule_arrival(&mut inner, arrival);
        drop(inner);

        if wake {
            self.shared.resume_dispatch();
        }
        Ok(wake)
    }

    /// Pushes the normal end-of-stream sentinel.
    pub fn eof(&self) -> Result<bool, IntakeError> {
        self.push(Chunk::Eof)
    }

    /// Pushes the abnormal end-of-stream sentinel.
    ///
    /// Unblocks any blocking read immediately and, once queued data drains,
    /// guarantees an `on_error` (never `on_all_data_read`) if a listener is
    /// registered.
    pub fn early_eof(&self) -> Result<bool, IntakeError> {
        self.push(Chunk::EarlyEof)
    }

    /// Non-blocking read of the next body byte.
    ///
    /// The caller must have confirmed readiness (via
    /// [`is_ready`](Self::is_ready) or an `on_data_available` callback);
    /// reading an open, empty stream fails fast with
    /// [`IntakeError::NotReady`].
    pub fn try_read(&self) -> Result<ReadOutcome, IntakeError> {
        let mut inner = self.shared.lock();
        let outcome = inner.queue.try_read()?;

        if matches!(outcome, ReadOutcome::EndOfStream)
            && inner.read.is_registered()
            && !inner.read.in_callback()
            && inner.read.terminal_mark() == TerminalMark::None
        {
            // the consumer drained to EOF outside a callback: the owed
            // on_all_data_read is delivered through the handling loop
            let in_handling = inner.channel.in_handling();
            let arrival = inner.read.on_content(in_handling);
            let wake = schedule_arrival(&mut inner, arrival);
            drop(inner);
            if wake {
                self.shared.resume_dispatch();
            }
        }
        Ok(outcome)
    }

    /// Returns true iff a read would succeed without blocking.
    ///
    /// A `false` answer additionally arranges, exactly once per
    /// became-not-ready transition, that the connector is asked for
    /// fill-interest so a future push will arrive.
    pub fn is_ready(&self) -> bool {
        let mut inner = self.shared.lock();
        if inner.queue.is_ready() {
            return true;
        }

        if inner.read.is_registered() {
            inner.read.set_ready_state(ReadyState::Unready);
        }
        let fill = !inner.fill_requested;
        inner.fill_requested = true;
        drop(inner);

        if fill {
            self.shared.connector.request_fill_interest();
        }
        false
    }

    /// Blocking read: parks the calling thread until content or a terminal
    /// state arrives, then behaves as [`try_read`](Self::try_read).
    ///
    /// Only for the pull-style mode: fails fast with
    /// [`IntakeError::ListenerMode`] if a listener is registered. A
    /// truncated stream surfaces as [`IntakeError::StreamTruncated`] once
    /// queued data drains.
    pub fn blocking_read(&self) -> Result<ReadOutcome, IntakeError> {
        let mut inner = self.shared.lock();
        if inner.read.is_registered() {
            warn!("blocking read while a read listener is registered");
            return Err(IntakeError::ListenerMode);
        }

        loop {
            if inner.queue.is_ready() {
                return inner.queue.try_read();
            }
            if !inner.fill_requested {
                inner.fill_requested = true;
                drop(inner);
                self.shared.connector.request_fill_interest();
                inner = self.shared.lock();
                continue;
            }
            inner = self
                .shared
                .cond
                .wait(inner)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Registers the one-shot read listener and reports which delivery path
    /// fired.
    ///
    /// - Content already ready, registering thread inside the handling
    ///   loop: the callbacks run synchronously within this call
    ///   ([`RegisterOutcome::Delivered`]).
    /// - Content already ready, no thread inside the handling loop: a wake
    ///   is issued and the next `enter_handling` performs the delivery
    ///   ([`RegisterOutcome::WakeIssued`]).
    /// - Nothing ready: fill-interest is requested and the listener waits
    ///   for the producer ([`RegisterOutcome::Pending`]).
    ///
    /// Registering before [`DispatchChannel::start_async`] fails fast with
    /// [`IntakeError::AsyncNotStarted`]: outside async mode the handling
    /// loop terminates after the dispatch and a deferred callback would be
    /// silently lost. A second registration fails fast with
    /// [`IntakeError::DuplicateRegistration`].
    pub fn set_listener(&self, listener: Box<dyn ReadListener>) -> Result<RegisterOutcome, IntakeError> {
        let mut inner = self.shared.lock();
        ensure!(inner.channel.is_async(), IntakeError::AsyncNotStarted);
        let ready = inner.queue.is_ready();
        let in_handling = inner.channel.in_handling();
        let decision = inner.read.on_register(listener, ready, in_handling)?;

        let outcome = match decision {
            RegisterDecision::DeliverNow => {
                drop(inner);
                self.run_read_callback();
                RegisterOutcome::Delivered
            }
            RegisterDecision::WakeChannel => {
                inner.channel.set_read_owed();
                let wake = inner.channel.wake();
                drop(inner);
                if wake {
                    self.shared.resume_dispatch();
                }
                RegisterOutcome::WakeIssued
            }
            RegisterDecision::FillInterest => {
                let fill = !inner.fill_requested;
                inner.fill_requested = true;
                drop(inner);
                if fill {
                    self.shared.connector.request_fill_interest();
                }
                RegisterOutcome::Pending
            }
        };
        Ok(outcome)
    }

    /// Executes one read-notification cycle.
    ///
    /// This is the body of the [`Action::ReadCallback`] unit of work: the
    /// handling loop calls it whenever `enter_handling` / `exit_handling`
    /// answers `ReadCallback`. At most one listener callback is in flight at
    /// any time; a cycle delivers `on_error` for an abnormal terminal,
    /// otherwise `on_data_available` for ready content, followed by
    /// `on_all_data_read` in the same cycle if the callback drained the
    /// stream to its normal end. A callback that leaves data unread re-arms
    /// one owed read callback instead of recursing.
    pub fn run_read_callback(&self) {
        let mut inner = self.shared.lock();
        let Some(notice) = next_notice(&inner) else {
            self.settle_quiet(inner);
            return;
        };
        let Some(listener) = inner.read.take_listener() else {
            // a callback is already in flight on another action; coalesce
            warn!("read callback cycle while a callback is in flight");
            return;
        };
        // the pending notification is being consumed now
        inner.read.set_ready_state(ReadyState::Idle);

        match notice {
            Notice::DataAvailable => self.deliver_data(inner, listener),
            Notice::AllDataRead => self.deliver_all_read(inner, listener),
            Notice::Error(cause) => self.deliver_error(inner, listener, cause),
        }
    }

    /// Delivers `on_data_available`, then settles what the callback left
    /// behind: terminal delivery in the same cycle, a re-armed callback for
    /// unread data, or an unready transition with fill-interest.
    fn deliver_data(&self, inner: MutexGuard<'_, Inner>, mut listener: Box<dyn ReadListener>) {
        drop(inner);
        trace!("delivering on_data_available");
        let result = listener.on_data_available();

        let mut inner = self.shared.lock();
        if let Err(cause) = result {
            self.abandon(inner, listener, cause);
            return;
        }
        inner.read.restore_listener(listener);

        if inner.queue.has_data() {
            // the callback did not drain ready content: re-arm exactly one
            // owed callback, never recurse within this cycle
            let in_handling = inner.channel.in_handling();
            let arrival = inner.read.on_content(in_handling);
            let wake = schedule_arrival(&mut inner, arrival);
            drop(inner);
            if wake {
                self.shared.resume_dispatch();
            }
            return;
        }

        match inner.queue.terminal() {
            Terminal::Eof => {
                let Some(listener) = inner.read.take_listener() else { return };
                self.deliver_all_read(inner, listener);
            }
            Terminal::EarlyEof => {
                let Some(listener) = inner.read.take_listener() else { return };
                self.deliver_error(inner, listener, IntakeError::StreamTruncated);
            }
            Terminal::NotReached => self.settle_quiet(inner),
        }
    }

    fn deliver_all_read(&self, inner: MutexGuard<'_, Inner>, mut listener: Box<dyn ReadListener>) {
        drop(inner);
        trace!("delivering on_all_data_read");
        let result = listener.on_all_data_read();

        let mut inner = self.shared.lock();
        inner.read.mark_all_data_read();
        inner.read.restore_listener(listener);
        if let Err(cause) = result {
            // on_all_data_read already fired, so on_error must not: the
            // failure is logged and the request abandoned
            error!(cause = %cause, "on_all_data_read failed; abandoning request");
            inner.channel.complete();
        }
    }

    fn deliver_error(&self, inner: MutexGuard<'_, Inner>, mut listener: Box<dyn ReadListener>, cause: IntakeError) {
        drop(inner);
        trace!(cause = %cause, "delivering on_error");
        listener.on_error(&cause);

        let mut inner = self.shared.lock();
        inner.read.mark_errored();
        inner.read.restore_listener(listener);
    }

    /// Converts a failed callback into a single `on_error` delivery plus
    /// request abandonment.
    fn abandon(
        &self,
        mut inner: MutexGuard<'_, Inner>,
        mut listener: Box<dyn ReadListener>,
        cause: Box<dyn std::error::Error + Send + Sync>,
    ) {
        error!(cause = %cause, "listener callback failed; abandoning request");
        inner.channel.complete();
        drop(inner);

        let cause = IntakeError::callback(cause);
        listener.on_error(&cause);

        let mut inner = self.shared.lock();
        inner.read.mark_errored();
        inner.read.restore_listener(listener);
    }

    /// Nothing is due: if the stream drained without a terminal, transition
    /// to unready and arrange fill-interest.
    fn settle_quiet(&self, mut inner: MutexGuard<'_, Inner>) {
        if inner.queue.is_ready()
            || !inner.read.is_registered()
            || inner.read.terminal_mark() != TerminalMark::None
        {
            return;
        }
        inner.read.set_ready_state(ReadyState::Unready);
        let fill = !inner.fill_requested;
        inner.fill_requested = true;
        drop(inner);
        if fill {
            self.shared.connector.request_fill_interest();
        }
    }
}

/// Turns an arrival decision into owed work on the channel; returns whether
/// a parked dispatch loop must be resumed.
fn schedule_arrival(inner: &mut MutexGuard<'_, Inner>, arrival: Arrival) -> bool {
    match arrival {
        Arrival::ScheduleNoWake => {
            inner.channel.set_read_owed();
            false
        }
        Arrival::ScheduleAndWake => {
            inner.channel.set_read_owed();
            inner.channel.wake()
        }
        Arrival::AlreadyPending | Arrival::NoListener => false,
    }
}

/// The dispatch re-entry surface the surrounding server loop drives.
///
/// Exactly one thread owns the handling loop at a time, enforced by the
/// controller's phase transitions. The loop pattern is:
///
/// ```ignore
/// let mut action = channel.enter_handling();
/// loop {
///     match action {
///         Action::Dispatch => run_application(),
///         Action::ReadCallback => intake.run_read_callback(),
///         Action::WriteCallback => output.run_write_callback(),
///         Action::Wait => break,       // ownership released, parked
///         Action::Terminated => break, // request finished
///     }
///     action = channel.exit_handling();
/// }
/// ```
pub struct DispatchChannel {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for DispatchChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.shared.lock();
        f.debug_struct("DispatchChannel").field("channel", &inner.channel).finish()
    }
}

impl DispatchChannel {
    /// A thread takes ownership of the request's handling loop.
    pub fn enter_handling(&self) -> Action {
        self.shared.lock().channel.enter_handling()
    }

    /// The owning thread finished one unit of work; answers the next action
    /// or releases ownership with [`Action::Wait`].
    pub fn exit_handling(&self) -> Action {
        self.shared.lock().channel.exit_handling()
    }

    /// The application signals it will continue asynchronously. Valid only
    /// while inside the initial dispatch.
    pub fn start_async(&self) {
        self.shared.lock().channel.start_async();
    }

    /// The application signals the request is finished; honored at the next
    /// `exit_handling`.
    pub fn complete(&self) {
        self.shared.lock().channel.complete();
    }

    /// The output half reports it can make progress; owes a
    /// [`Action::WriteCallback`] and wakes the loop if it is parked.
    /// Returns whether a wake was issued.
    pub fn on_write_possible(&self) -> bool {
        let mut inner = self.shared.lock();
        inner.channel.set_write_owed();
        let wake = inner.channel.wake();
        drop(inner);
        if wake {
            self.shared.resume_dispatch();
        }
        wake
    }

    /// Current phase, for observability and tests.
    pub fn phase(&self) -> Phase {
        self.shared.lock().channel.phase()
    }

    /// Parks the calling thread while the request is in
    /// [`Phase::AsyncWaiting`]; returns once a wake arrives (or immediately
    /// if the request is not parked).
    ///
    /// For embeddings that dedicate a thread to the request loop; pools that
    /// reschedule through [`Connector::wake`] never need it.
    pub fn await_wake(&self) {
        let mut inner = self.shared.lock();
        while inner.channel.phase() == Phase::AsyncWaiting {
            inner = self
                .shared
                .cond
                .wait(inner)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}
