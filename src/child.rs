//! The re-exec'd side of an OS-backed process.
//!
//! A child never bootstraps its own [`crate::runtime::Runtime`] — doing so
//! would mint identities from a counter starting back at 1, colliding with
//! identities the parent has already handed out. Instead it reconstructs the
//! single [`ProcessRecord`] its parent assigned it and forwards any outbound
//! send to a non-local target back over its own stdout as a
//! `(destination, envelope)` frame, letting the parent's broker re-resolve
//! the route.

use std::sync::{Arc, Mutex};

use log::warn;
use once_cell::sync::OnceCell;

use crate::body;
use crate::identity::Identity;
use crate::mailbox::enqueue;
use crate::panic::catch_handler;
use crate::process::{ProcessRecord, TerminationReason};
use crate::spawner::{ENV_BODY, ENV_IDENTITY, ENV_NAME};
use crate::term::{is_terminate_signal, mark_exit_handle_dead, terminate_envelope, Envelope};
use crate::transport;

static UPSTREAM: OnceCell<Mutex<std::io::Stdout>> = OnceCell::new();

/// The single [`ProcessRecord`] this child runs as, once [`run`] has
/// reconstructed it. Exposed so the crate's public `install_receiver`/
/// `terminate`/`wait`/`is_alive` facade can operate on it directly instead of
/// reaching for a [`crate::runtime::Runtime`] this process never bootstraps.
static RECORD: OnceCell<Arc<ProcessRecord>> = OnceCell::new();

fn install_upstream() {
    UPSTREAM.get_or_init(|| Mutex::new(std::io::stdout()));
}

/// True only inside a re-exec'd OS-backed child, after [`run`] has installed
/// its upstream writer. Used by the crate's public free functions to decide
/// whether to go through [`crate::runtime::Runtime`] or operate locally/
/// upstream instead.
pub(crate) fn is_child_process() -> bool {
    UPSTREAM.get().is_some()
}

/// This child's own process record, if [`run`] has reconstructed one yet.
pub(crate) fn local_record() -> Option<Arc<ProcessRecord>> {
    RECORD.get().cloned()
}

pub(crate) fn send_upstream(destination: Identity, envelope: Envelope) {
    let stdout = match UPSTREAM.get() {
        Some(stdout) => stdout,
        None => return,
    };
    let mut guard = stdout.lock().unwrap();
    if transport::write_frame::<_, (Identity, Envelope)>(&mut *guard, &(destination, envelope)).is_err() {
        warn!("failed to forward frame to parent broker for {destination}");
    }
}

/// Asks the parent broker to terminate the process identified by
/// `destination`, which isn't this child itself. The broker recognizes the
/// reserved terminate envelope on a forwarded frame and treats it as a
/// terminate request rather than an ordinary message to route.
pub(crate) fn terminate_upstream(destination: Identity) {
    send_upstream(destination, terminate_envelope());
}

/// Reads this process's `LINKPROC_*` environment variables, if present, and
/// runs as an OS-backed child: reconstructs its assigned identity, drains its
/// stdin for inbound frames, runs the registered body, then its dispatch
/// loop, then exits the whole program. Returns without doing anything if
/// these variables are absent, so the embedding binary's own `main` can
/// continue as normal — this is what makes it safe to call unconditionally
/// as the first statement of `fn main()`.
pub fn run() {
    let body_name = match std::env::var(ENV_BODY) {
        Ok(name) => name,
        Err(_) => return,
    };
    let identity_raw: u64 = std::env::var(ENV_IDENTITY)
        .expect("LINKPROC_BODY set without LINKPROC_IDENTITY")
        .parse()
        .expect("LINKPROC_IDENTITY was not a valid u64");
    let name = std::env::var(ENV_NAME).unwrap_or_else(|_| body_name.clone());

    let entry = match body::lookup(&body_name) {
        Ok(entry) => entry,
        Err(err) => {
            eprintln!("linkproc: {err}");
            std::process::exit(1);
        }
    };

    install_upstream();
    let identity = Identity::from_raw(identity_raw);
    let record = ProcessRecord::spawn_with_identity(identity, name);
    RECORD.set(record.clone()).ok();
    crate::runtime::enter_context(identity);
    spawn_stdin_reader(record.clone());

    let handle = record.handle().clone();
    let reason = match catch_handler(move || entry(handle)) {
        Ok(()) => record.run_dispatch_loop(),
        Err(message) => {
            warn!("process body panicked before entering dispatch loop: {message}");
            TerminationReason::UncaughtHandlerFailure
        }
    };
    log::info!("OS-backed process exiting: {reason:?}");
    std::process::exit(0);
}

fn spawn_stdin_reader(record: Arc<ProcessRecord>) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut locked = stdin.lock();
        let sender = record.mailbox().sender();
        loop {
            match transport::read_frame::<_, Envelope>(&mut locked) {
                Ok(Some(envelope)) if is_terminate_signal(&envelope) => {
                    record.request_terminate();
                }
                Ok(Some(envelope)) => {
                    mark_exit_handle_dead(&envelope);
                    enqueue(&sender, envelope);
                }
                Ok(None) => {
                    record.request_terminate();
                    break;
                }
                Err(err) => {
                    warn!("transport read error on child stdin, terminating: {err}");
                    record.request_terminate();
                    break;
                }
            }
        }
    });
}
