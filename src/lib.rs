//! An Erlang-style process/mailbox/link runtime.
//!
//! Independent processes communicate exclusively by asynchronous message
//! send; each has a private mailbox and an insertion-ordered table of
//! pattern/handler bindings; each can be bidirectionally linked to other
//! processes so abnormal termination propagates along link edges. Two
//! interchangeable process flavors share this contract: thread-backed
//! (same address space) and OS-process-backed (a re-exec'd child process,
//! reached over a framed byte-stream transport).
//!
//! Call [`child_entrypoint`] as the first statement of `fn main()` in any
//! binary that calls [`spawn_os`]/[`spawn_os_link`] — it takes over and
//! never returns when the running binary is actually a re-exec'd child.

mod body;
mod child;
mod error;
mod handle;
mod identity;
mod link;
mod mailbox;
mod panic;
mod pattern;
mod process;
mod receiver_table;
mod runtime;
mod spawner;
mod term;
mod transport;

pub use body::{BodyLookupError, ProcessBody};
pub use error::{BodyNotFound, DuplicateBodyName, NotMainProcessError, TransportError};
pub use handle::{Handle, Route};
pub use identity::Identity;
pub use pattern::{Matcher, Pattern};
pub use process::TerminationReason;
pub use receiver_table::{Handler, HandlerOutcome};
pub use runtime::{Runtime, ROOT_NAME};
pub use spawner::{spawn, spawn_link, spawn_os, spawn_os_link, ThreadBody};
pub use term::{exit_envelope, Envelope, Term, EXIT_TAG};

/// Re-exported so [`process_body!`] can expand to `$crate::inventory::submit!`
/// without requiring callers to depend on `inventory` directly.
#[doc(hidden)]
pub use inventory;

/// Sends `envelope` to `target`; non-blocking and silent if the target is
/// dead or unreachable.
///
/// Dispatches differently depending on where it's called from: inside a
/// re-exec'd OS-backed child it forwards non-local sends to the parent
/// broker over the child's own stdout; everywhere else it goes through the
/// process-wide [`Runtime`].
pub fn send(target: &Handle, envelope: Envelope) {
    if child::is_child_process() {
        match target.route() {
            Route::Local(sender) => mailbox::enqueue(sender, envelope),
            Route::Broker(id) => child::send_upstream(*id, envelope),
        }
    } else {
        Runtime::current().send(target, envelope);
    }
}

/// Installs or replaces a pattern/handler binding on `target`.
///
/// Enforces the root invariant for `target == Runtime::current().root_handle()`.
///
/// Inside a re-exec'd OS-backed child (which never bootstraps a [`Runtime`])
/// this only does something when `target` is the calling process's own
/// handle, which is the only target spec bodies ever install receivers on
/// from inside the OS-backed flavor — there is no wire operation to mutate
/// another process's table remotely.
pub fn install_receiver(target: &Handle, pattern: Pattern, handler: Handler) -> Result<(), NotMainProcessError> {
    if let Some(record) = child::local_record() {
        if target.identity() == record.handle().identity() {
            record.install_receiver(pattern, handler);
        }
        return Ok(());
    }
    Runtime::current().install_receiver(target, pattern, handler)
}

/// Requests that `target` terminate. Terminating the root process tears
/// down every other live process too.
///
/// Inside a re-exec'd OS-backed child, a self-targeted request is applied
/// directly to the local process record; any other target is forwarded to
/// the parent broker, which resolves it against the real process tables.
pub fn terminate(target: &Handle) {
    if let Some(record) = child::local_record() {
        if target.identity() == record.handle().identity() {
            record.request_terminate();
        } else {
            child::terminate_upstream(target.identity());
        }
        return;
    }
    Runtime::current().terminate(target)
}

/// Blocks until `target` terminates, or `timeout` elapses (returning `false`
/// in that case). `None` blocks indefinitely.
///
/// Inside a re-exec'd OS-backed child this only blocks for a self-targeted
/// wait; there is no request/response channel back from the parent broker
/// for a remote process's termination, so waiting on any other target
/// returns immediately based on the last liveness this process observed for
/// it (e.g. via a received `EXIT` envelope).
pub fn wait(target: &Handle, timeout: Option<std::time::Duration>) -> bool {
    if let Some(record) = child::local_record() {
        if target.identity() == record.handle().identity() {
            return record.wait(timeout);
        }
        return !target.is_alive();
    }
    Runtime::current().wait(target, timeout)
}

/// Reports whether `target` is still alive.
///
/// Outside a re-exec'd OS-backed child this is resolved against the
/// authoritative process tables by identity, so it is accurate even for a
/// `Handle` that crossed the wire. Inside a child, only the calling
/// process's own liveness is tracked authoritatively; a remote target's
/// liveness reflects the last `EXIT` this process observed for it, same as
/// `wait` above.
pub fn is_alive(target: &Handle) -> bool {
    if let Some(record) = child::local_record() {
        if target.identity() == record.handle().identity() {
            return record.is_alive();
        }
        return target.is_alive();
    }
    Runtime::current().is_alive(target)
}

/// Transfers control to the dispatch loop and exits the whole program,
/// without returning, if this binary is actually a re-exec'd OS-backed
/// child spawned by [`spawn_os`]/[`spawn_os_link`]. Otherwise returns
/// immediately so the embedding program's real `main` proceeds unaffected.
///
/// Must be the first statement of `fn main()` in any binary that uses the
/// OS-backed flavor.
pub fn child_entrypoint() {
    child::run();
}
