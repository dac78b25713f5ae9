use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::handle::{Handle, Route};
use crate::identity::Identity;
use crate::mailbox::{Mailbox, Wake};
use crate::pattern::Pattern;
use crate::receiver_table::{Handler, HandlerOutcome, ReceiverTable};
use crate::term::{Envelope, Term, EXIT_TAG};

/// Why a process stopped running.
///
/// Mirrors the terminal reason field of a process record; `ProcessExited` is
/// the one addition beyond the core taxonomy, used for an OS-backed child
/// whose pipe closed without an explicit handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    Normal,
    UnhandledMessage,
    ExplicitTerminate,
    UncaughtHandlerFailure,
    ExitSignal,
    ProcessExited,
}

enum State {
    Starting,
    Running,
    Terminated(TerminationReason),
}

/// The full bookkeeping record for one process: its handle, mailbox,
/// receiver table, and lifecycle state. Shared via `Arc` between the
/// dispatch loop's owning thread and the runtime's process table; only the
/// owning thread ever calls [`run_dispatch_loop`](ProcessRecord::run_dispatch_loop).
pub struct ProcessRecord {
    handle: Handle,
    mailbox: Mailbox,
    receiver_table: Mutex<ReceiverTable>,
    state: Mutex<State>,
    condvar: Condvar,
}

impl ProcessRecord {
    /// Creates a fresh process record with a newly assigned identity and its
    /// own local mailbox; the returned handle routes directly to it.
    pub fn spawn_new(name: impl Into<Arc<str>>) -> Arc<ProcessRecord> {
        let mailbox = Mailbox::new();
        let handle = Handle::new(Identity::next(), name, Route::Local(mailbox.sender()));
        Arc::new(ProcessRecord {
            handle,
            mailbox,
            receiver_table: Mutex::new(ReceiverTable::new()),
            state: Mutex::new(State::Starting),
            condvar: Condvar::new(),
        })
    }

    /// Creates a process record under an identity the caller already owns,
    /// rather than minting a fresh one.
    ///
    /// Used only by an OS-backed child reconstructing the identity its
    /// parent assigned it before the re-exec.
    pub(crate) fn spawn_with_identity(identity: Identity, name: impl Into<Arc<str>>) -> Arc<ProcessRecord> {
        let mailbox = Mailbox::new();
        let handle = Handle::new(identity, name, Route::Local(mailbox.sender()));
        Arc::new(ProcessRecord {
            handle,
            mailbox,
            receiver_table: Mutex::new(ReceiverTable::new()),
            state: Mutex::new(State::Starting),
            condvar: Condvar::new(),
        })
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    pub fn mailbox(&self) -> &Mailbox {
        &self.mailbox
    }

    /// Installs or replaces a pattern/handler binding.
    ///
    /// Callers (the Spawner, or the runtime's root-invariant check) are
    /// responsible for verifying the caller is allowed to mutate this
    /// process's table before calling this.
    pub fn install_receiver(&self, pattern: Pattern, handler: Handler) {
        self.receiver_table.lock().unwrap().install(pattern, handler);
    }

    pub fn is_alive(&self) -> bool {
        self.handle.is_alive()
    }

    /// Requests that the dispatch loop stop at its next safe point (between
    /// handler invocations, or immediately if currently blocked waiting for
    /// the next envelope).
    pub fn request_terminate(&self) {
        self.mailbox.request_terminate();
    }

    /// Blocks the caller until this process is terminated, or `timeout`
    /// elapses (returning `false` in that case).
    pub fn wait(&self, timeout: Option<Duration>) -> bool {
        let mut state = self.state.lock().unwrap();
        let deadline = timeout.map(|d| Instant::now() + d);
        loop {
            if matches!(&*state, State::Terminated(_)) {
                return true;
            }
            state = match deadline {
                None => self.condvar.wait(state).unwrap(),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return matches!(&*state, State::Terminated(_));
                    }
                    let (guard, timeout_result) =
                        self.condvar.wait_timeout(state, deadline - now).unwrap();
                    if timeout_result.timed_out() && !matches!(&*guard, State::Terminated(_)) {
                        return false;
                    }
                    guard
                }
            };
        }
    }

    fn mark_running(&self) {
        *self.state.lock().unwrap() = State::Running;
    }

    fn mark_terminated(&self, reason: TerminationReason) {
        *self.state.lock().unwrap() = State::Terminated(reason);
        self.handle.mark_dead();
        self.condvar.notify_all();
    }

    /// Runs the per-process event loop to completion: block on the mailbox,
    /// match against the receiver table, invoke the first matching handler,
    /// and repeat until a terminal condition is reached. Link fan-out and
    /// registry deregistration are the caller's responsibility once this
    /// returns.
    pub fn run_dispatch_loop(self: &Arc<Self>) -> TerminationReason {
        self.mark_running();
        let reason = loop {
            match self.mailbox.dequeue_or_terminate() {
                None => break TerminationReason::ExplicitTerminate,
                Some(Wake::Terminate) => break TerminationReason::ExplicitTerminate,
                Some(Wake::Envelope(envelope)) => {
                    match self.dispatch_one(envelope) {
                        Some(reason) => break reason,
                        None => continue,
                    }
                }
            }
        };
        info!(
            "process {} ({}) terminated: {:?}",
            self.handle.name(),
            self.handle.identity(),
            reason
        );
        self.mark_terminated(reason);
        reason
    }

    /// Dispatches one envelope; returns `Some(reason)` if this envelope
    /// ends the loop, `None` to keep dispatching.
    fn dispatch_one(&self, envelope: Envelope) -> Option<TerminationReason> {
        let outcome = self.receiver_table.lock().unwrap().dispatch(envelope.clone());
        match outcome {
            Some(HandlerOutcome::Continue) => None,
            Some(HandlerOutcome::Stop) => Some(TerminationReason::Normal),
            Some(HandlerOutcome::Failed(message)) => {
                warn!("handler failed: {message}");
                Some(TerminationReason::UncaughtHandlerFailure)
            }
            None if is_exit_tag(&envelope) => {
                debug!("no EXIT handler installed; applying default exit handler");
                Some(TerminationReason::ExitSignal)
            }
            None => {
                warn!("unhandled message");
                Some(TerminationReason::UnhandledMessage)
            }
        }
    }
}

fn is_exit_tag(envelope: &Envelope) -> bool {
    matches!(envelope.first(), Some(Term::Atom(tag)) if tag == EXIT_TAG)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::Matcher;

    #[test]
    fn unhandled_message_terminates_with_unhandled_message() {
        let record = ProcessRecord::spawn_new("p");
        crate::mailbox::enqueue(&record.mailbox().sender(), vec![Term::atom("unknown")]);
        let reason = record.clone().run_dispatch_loop();
        assert_eq!(reason, TerminationReason::UnhandledMessage);
    }

    #[test]
    fn exit_sentinel_terminates_normally() {
        let record = ProcessRecord::spawn_new("p");
        record.install_receiver(
            Pattern::new(vec![Matcher::Literal(Term::atom("die"))]),
            Box::new(|_| HandlerOutcome::Stop),
        );
        crate::mailbox::enqueue(&record.mailbox().sender(), vec![Term::atom("die")]);
        let reason = record.clone().run_dispatch_loop();
        assert_eq!(reason, TerminationReason::Normal);
    }

    #[test]
    fn unhandled_exit_envelope_applies_default_exit_handler() {
        let record = ProcessRecord::spawn_new("p");
        crate::mailbox::enqueue(
            &record.mailbox().sender(),
            vec![Term::atom(EXIT_TAG), Term::Int(0)],
        );
        let reason = record.clone().run_dispatch_loop();
        assert_eq!(reason, TerminationReason::ExitSignal);
    }

    #[test]
    fn explicit_terminate_request_ends_the_loop() {
        let record = ProcessRecord::spawn_new("p");
        record.request_terminate();
        let reason = record.clone().run_dispatch_loop();
        assert_eq!(reason, TerminationReason::ExplicitTerminate);
    }
}
