use std::cell::Cell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dashmap::DashMap;
use log::{info, warn};
use once_cell::sync::OnceCell;

use crate::error::NotMainProcessError;
use crate::handle::{Handle, Route};
use crate::identity::Identity;
use crate::link::LinkGraph;
use crate::mailbox::enqueue;
use crate::pattern::Pattern;
use crate::process::{ProcessRecord, TerminationReason};
use crate::receiver_table::Handler;
use crate::term::{exit_envelope, Envelope};
use crate::transport::{self, ChildToBrokerFrame};

/// The reserved name of the distinguished root process.
pub const ROOT_NAME: &str = "__main__";

thread_local! {
    static CURRENT_PROCESS: Cell<Option<Identity>> = Cell::new(None);
}

/// Marks the calling thread as executing in the context of `id`. Used both
/// by the root's bootstrapping thread and by every spawned process's
/// dispatch thread, since a process's body runs on the same thread that
/// later drives its dispatch loop.
pub(crate) fn enter_context(id: Identity) {
    CURRENT_PROCESS.with(|cell| cell.set(Some(id)));
}

fn current_context() -> Option<Identity> {
    CURRENT_PROCESS.with(|cell| cell.get())
}

/// An OS-backed child's side of the transport: its stdin (to send frames
/// to it), the `Child` handle itself (to wait/kill at shutdown), and the
/// canonical `Handle` callers hold for it (shared liveness flag + identity,
/// needed to build the `(EXIT, handle)` envelope fanned out to its links).
struct OsChildLink {
    handle: Handle,
    stdin: Mutex<std::process::ChildStdin>,
    child: Mutex<std::process::Child>,
}

/// Process-wide runtime state: the process table, the link graph, the
/// distinguished root process, and the OS-backed child routing table that
/// backs the transport layer. Created once via [`Runtime::bootstrap`] and
/// accessed thereafter via [`Runtime::current`].
pub struct Runtime {
    processes: DashMap<Identity, Arc<ProcessRecord>>,
    links: LinkGraph,
    root: Arc<ProcessRecord>,
    os_children: DashMap<Identity, Arc<OsChildLink>>,
    shutting_down: AtomicBool,
}

static RUNTIME: OnceCell<Runtime> = OnceCell::new();
static ROOT_DISPATCH_STARTED: OnceCell<()> = OnceCell::new();

impl Runtime {
    /// Initializes the process-wide runtime singleton, creating the root
    /// process and marking the calling thread as its context. Safe to call
    /// more than once; only the first call has effect.
    pub fn bootstrap() -> &'static Runtime {
        let runtime = RUNTIME.get_or_init(|| {
            let root = ProcessRecord::spawn_new(ROOT_NAME);
            let processes = DashMap::new();
            processes.insert(root.handle().identity(), root.clone());
            Runtime {
                processes,
                links: LinkGraph::new(),
                root,
                os_children: DashMap::new(),
                shutting_down: AtomicBool::new(false),
            }
        });
        enter_context(runtime.root.handle().identity());
        ROOT_DISPATCH_STARTED.get_or_init(|| {
            let root = runtime.root.clone();
            let root_id = root.handle().identity();
            std::thread::Builder::new()
                .name("__main__-dispatch".to_string())
                .spawn(move || {
                    enter_context(root_id);
                    let reason = root.run_dispatch_loop();
                    Runtime::current().finalize_termination(root_id, reason);
                })
                .expect("failed to spawn root process dispatch thread");
        });
        runtime
    }

    /// Returns the already-bootstrapped runtime.
    ///
    /// # Panics
    /// Panics if [`Runtime::bootstrap`] has not been called yet.
    pub fn current() -> &'static Runtime {
        RUNTIME
            .get()
            .expect("Runtime::bootstrap() must run before Runtime::current()")
    }

    pub fn root_handle(&self) -> Handle {
        self.root.handle().clone()
    }

    fn is_current_context(&self, id: Identity) -> bool {
        current_context() == Some(id)
    }

    /// The identity of whatever process the calling thread is currently
    /// running as, if any. `None` outside of any process's body or
    /// dispatch loop (e.g. before bootstrap).
    pub(crate) fn caller_identity(&self) -> Option<Identity> {
        current_context()
    }

    /// Registers a freshly created process record, before it starts
    /// running, optionally linking it to `link_to`. Must be called before
    /// the new process's first instruction runs, so the link edge (if any)
    /// always exists before the child can terminate.
    pub(crate) fn register(&self, record: &Arc<ProcessRecord>, link_to: Option<Identity>) {
        self.processes.insert(record.handle().identity(), record.clone());
        if let Some(parent) = link_to {
            self.links.link(parent, record.handle().identity());
        }
    }

    pub(crate) fn register_os_child(
        &self,
        handle: Handle,
        stdin: std::process::ChildStdin,
        child: std::process::Child,
        link_to: Option<Identity>,
    ) {
        let id = handle.identity();
        if let Some(parent) = link_to {
            self.links.link(parent, id);
        }
        self.os_children.insert(
            id,
            Arc::new(OsChildLink {
                handle,
                stdin: Mutex::new(stdin),
                child: Mutex::new(child),
            }),
        );
    }

    /// Installs or replaces a pattern/handler binding on `target`.
    ///
    /// Enforces the root invariant: mutating the root's table is only
    /// permitted from the context that is currently running as the root
    /// process (its bootstrapping thread, or its own dispatch loop).
    pub fn install_receiver(
        &self,
        target: &Handle,
        pattern: Pattern,
        handler: Handler,
    ) -> Result<(), NotMainProcessError> {
        let root_id = self.root.handle().identity();
        if target.identity() == root_id && !self.is_current_context(root_id) {
            return Err(NotMainProcessError);
        }
        if let Some(record) = self.processes.get(&target.identity()) {
            record.install_receiver(pattern, handler);
        }
        Ok(())
    }

    /// Enqueues `envelope` on `target`; non-blocking, silently a no-op if
    /// the target is dead or unreachable.
    pub fn send(&self, target: &Handle, envelope: Envelope) {
        match target.route() {
            Route::Local(sender) => enqueue(sender, envelope),
            Route::Broker(id) => self.send_to_broker(*id, envelope),
        }
    }

    fn send_to_broker(&self, id: Identity, envelope: Envelope) {
        if let Some(link) = self.os_children.get(&id) {
            let mut stdin = link.stdin.lock().unwrap();
            if transport::write_frame(&mut *stdin, &envelope).is_err() {
                warn!("failed to write frame to OS-backed process {id}; treating as dead");
            }
        }
    }

    /// Routes a frame read from an OS-backed child's stdout: `destination`
    /// may be any live process, local or another OS-backed child. A child
    /// forwards a terminate request for some other process as the reserved
    /// terminate envelope addressed at that process; the broker recognizes
    /// it here rather than delivering it as an ordinary message.
    pub(crate) fn route_from_child(&self, frame: ChildToBrokerFrame) {
        let (destination, envelope) = frame;
        if crate::term::is_terminate_signal(&envelope) {
            self.terminate_by_identity(destination);
            return;
        }
        if let Some(record) = self.processes.get(&destination) {
            self.send(record.handle(), envelope);
        } else {
            self.send_to_broker(destination, envelope);
        }
    }

    /// Requests termination of `target`. Terminating the root process is
    /// special: it tears down every other live process too, per the root
    /// shutdown contract.
    pub fn terminate(&self, target: &Handle) {
        self.terminate_by_identity(target.identity());
    }

    fn terminate_by_identity(&self, id: Identity) {
        if id == self.root.handle().identity() {
            self.shutdown();
            return;
        }
        if let Some(record) = self.processes.get(&id) {
            record.request_terminate();
        } else if let Some(link) = self.os_children.get(&id) {
            let _ = transport::write_frame(&mut *link.stdin.lock().unwrap(), &crate::term::terminate_envelope());
        }
    }

    pub fn wait(&self, target: &Handle, timeout: Option<Duration>) -> bool {
        if let Some(record) = self.processes.get(&target.identity()) {
            return record.wait(timeout);
        }
        if let Some(link) = self.os_children.get(&target.identity()) {
            // Native `Child` offers no timed join; block until the child
            // exits. Liveness is already tracked via the shared flag, so a
            // caller that only wants a liveness probe should use `is_alive`.
            let _ = link.child.lock().unwrap().wait();
            return true;
        }
        true
    }

    /// Resolves liveness by identity against the authoritative process/child
    /// tables rather than trusting `target`'s own liveness flag: a `Handle`
    /// reconstructed by [`Deserialize`](serde::Deserialize) carries a fresh,
    /// disconnected flag that never reflects the real process's state, so a
    /// deserialized copy must be resolved back to the canonical record.
    pub fn is_alive(&self, target: &Handle) -> bool {
        if let Some(record) = self.processes.get(&target.identity()) {
            return record.handle().is_alive();
        }
        if let Some(link) = self.os_children.get(&target.identity()) {
            return link.handle.is_alive();
        }
        false
    }

    /// Fans `(EXIT, dead_handle)` out to every peer still linked to
    /// `dead_handle`'s identity, then drops those edges.
    fn fan_out_exit(&self, dead_handle: &Handle, reason: TerminationReason) {
        info!(
            "{} terminated ({:?}); fanning out to links",
            dead_handle.name(),
            reason
        );
        let peers = self.links.take_links_of(dead_handle.identity());
        for peer in peers {
            if let Some(peer_record) = self.processes.get(&peer) {
                self.send(peer_record.handle(), exit_envelope(dead_handle.clone()));
            } else if let Some(peer_link) = self.os_children.get(&peer) {
                self.send(&peer_link.handle.clone(), exit_envelope(dead_handle.clone()));
            }
        }
    }

    /// Called once a thread-backed (or root) process's dispatch loop
    /// returns: deregisters it and fans `EXIT` out to its links.
    pub(crate) fn finalize_termination(&self, id: Identity, reason: TerminationReason) {
        let record = match self.processes.remove(&id) {
            Some((_, record)) => record,
            None => return,
        };
        self.fan_out_exit(record.handle(), reason);
    }

    /// Called by an OS-backed child's reader thread when its pipe closes:
    /// deregisters the broker-side bookkeeping and fans `EXIT` out exactly
    /// as a local termination would.
    pub(crate) fn finalize_remote_termination(&self, id: Identity, reason: TerminationReason) {
        let link = match self.os_children.remove(&id) {
            Some((_, link)) => link,
            None => return,
        };
        link.handle.mark_dead();
        self.fan_out_exit(&link.handle, reason);
    }

    /// Terminates every live non-root process, broadcasting a tag-only
    /// `(EXIT,)` envelope to each regardless of link membership, waits for
    /// all of them (and the root itself) to finish, per
    /// `test_killing_main_should_kill__all__processes`.
    pub fn shutdown(&self) {
        if self.shutting_down.swap(true, Ordering::AcqRel) {
            // A concurrent shutdown is already in flight; just wait for root.
            self.root.wait(None);
            return;
        }
        let root_id = self.root.handle().identity();
        let others: Vec<Arc<ProcessRecord>> = self
            .processes
            .iter()
            .filter(|entry| *entry.key() != root_id)
            .map(|entry| entry.value().clone())
            .collect();
        for record in &others {
            self.send(record.handle(), crate::term::tag_only_exit_envelope());
            record.request_terminate();
        }
        let os_child_ids: Vec<Identity> = self.os_children.iter().map(|e| *e.key()).collect();
        for id in &os_child_ids {
            if let Some(link) = self.os_children.get(id) {
                let _ = transport::write_frame(
                    &mut *link.stdin.lock().unwrap(),
                    &crate::term::terminate_envelope(),
                );
            }
        }
        for record in &others {
            record.wait(None);
        }
        for id in &os_child_ids {
            if let Some(link) = self.os_children.get(id) {
                let _ = link.child.lock().unwrap().wait();
            }
        }
        self.root.request_terminate();
        self.root.wait(None);
        self.shutting_down.store(false, Ordering::Release);
    }
}
