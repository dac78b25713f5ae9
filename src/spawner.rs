//! Creates new processes of either flavor and wires them into the runtime
//! before they can run their first instruction, per the link-before-first-
//! tick ordering guarantee.

use std::sync::Arc;

use log::warn;

use crate::body::{self, BodyLookupError};
use crate::handle::Handle;
use crate::identity::Identity;
use crate::panic::catch_handler;
use crate::process::{ProcessRecord, TerminationReason};
use crate::runtime::{enter_context, Runtime};

/// A thread-backed process body: an arbitrary closure run once, in the new
/// process's own context, to install its initial receivers before the
/// dispatch loop takes over.
pub type ThreadBody = Box<dyn FnOnce(Handle) + Send + 'static>;

/// Starts a new thread-backed process running `body(handle)`, with no link
/// to the caller.
pub fn spawn(name: impl Into<Arc<str>>, body: impl FnOnce(Handle) + Send + 'static) -> Handle {
    spawn_thread(name.into(), None, Box::new(body))
}

/// As [`spawn`], but atomically links the new process to the caller before
/// it can run, so a child that dies immediately still delivers `EXIT`.
pub fn spawn_link(name: impl Into<Arc<str>>, body: impl FnOnce(Handle) + Send + 'static) -> Handle {
    let parent = Runtime::current().caller_identity();
    spawn_thread(name.into(), parent, Box::new(body))
}

/// Starts a new OS-process-backed process running the body registered under
/// `body_name` via [`crate::process_body!`], with no link to the caller.
pub fn spawn_os(name: impl Into<Arc<str>>, body_name: &str) -> Result<Handle, BodyLookupError> {
    spawn_process(name.into(), body_name, None)
}

/// As [`spawn_os`], linked to the caller before the child's body can run.
pub fn spawn_os_link(name: impl Into<Arc<str>>, body_name: &str) -> Result<Handle, BodyLookupError> {
    let parent = Runtime::current().caller_identity();
    spawn_process(name.into(), body_name, parent)
}

fn spawn_thread(name: Arc<str>, link_to: Option<Identity>, body: ThreadBody) -> Handle {
    let runtime = Runtime::current();
    let record = ProcessRecord::spawn_new(name);
    let handle = record.handle().clone();
    runtime.register(&record, link_to);

    std::thread::Builder::new()
        .name(handle.name().to_string())
        .spawn(move || run_thread_process(record, body))
        .expect("failed to spawn process thread");

    handle
}

fn run_thread_process(record: Arc<ProcessRecord>, body: ThreadBody) {
    let id = record.handle().identity();
    enter_context(id);
    let body_handle = record.handle().clone();
    let reason = match catch_handler(move || body(body_handle)) {
        Ok(()) => record.run_dispatch_loop(),
        Err(message) => {
            warn!("process body panicked before entering dispatch loop: {message}");
            TerminationReason::UncaughtHandlerFailure
        }
    };
    Runtime::current().finalize_termination(id, reason);
}

/// The environment variables a re-exec'd OS-backed child reads to recover
/// the identity, name, and body its parent already assigned it.
pub(crate) const ENV_BODY: &str = "LINKPROC_BODY";
pub(crate) const ENV_IDENTITY: &str = "LINKPROC_IDENTITY";
pub(crate) const ENV_NAME: &str = "LINKPROC_NAME";

fn spawn_process(name: Arc<str>, body_name: &str, link_to: Option<Identity>) -> Result<Handle, BodyLookupError> {
    // Fail fast in the parent: an unregistered name is a synchronous error,
    // not a silent hang waiting on a child that will immediately exit.
    body::lookup(body_name)?;

    let identity = Identity::next();
    let exe = std::env::current_exe().expect("failed to resolve current executable for re-exec");

    let mut command = std::process::Command::new(exe);
    command
        .env(ENV_BODY, body_name)
        .env(ENV_IDENTITY, identity.as_u64().to_string())
        .env(ENV_NAME, name.as_ref())
        .stdin(std::process::Stdio::piped())
        .stdout(std::process::Stdio::piped());

    let mut child = command.spawn().expect("failed to spawn OS-backed process");
    let stdin = child.stdin.take().expect("child stdin was piped");
    let stdout = child.stdout.take().expect("child stdout was piped");

    let handle = Handle::new(identity, name, crate::handle::Route::Broker(identity));
    Runtime::current().register_os_child(handle.clone(), stdin, child, link_to);

    crate::transport::spawn_child_reader(
        stdout,
        move |destination, envelope| Runtime::current().route_from_child((destination, envelope)),
        move || Runtime::current().finalize_remote_termination(identity, TerminationReason::ProcessExited),
    );

    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::term::Term;

    #[test]
    fn spawn_runs_body_and_reaches_dispatch_loop() {
        let _ = env_logger::builder().is_test(true).try_init();
        Runtime::bootstrap();
        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        let child = spawn("child", move |handle| {
            crate::runtime::Runtime::current()
                .install_receiver(
                    &handle,
                    crate::pattern::Pattern::new(vec![crate::pattern::Matcher::Literal(Term::atom("stop"))]),
                    Box::new(move |_| {
                        let _ = done_tx.send(());
                        crate::receiver_table::HandlerOutcome::Stop
                    }),
                )
                .unwrap();
        });
        Runtime::current().send(&child, vec![Term::atom("stop")]);
        done_rx.recv_timeout(std::time::Duration::from_secs(2)).unwrap();
    }
}
