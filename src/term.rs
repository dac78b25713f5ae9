use crate::handle::Handle;

/// One positional value inside an envelope.
///
/// This is the concrete, serializable payload alphabet handlers exchange.
/// The first element of an envelope is conventionally a short symbolic
/// [`Term::Atom`] used as a message tag.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Term {
    Atom(String),
    Int(i64),
    Bool(bool),
    Str(String),
    Handle(Handle),
    Unit,
}

impl Term {
    pub fn atom(s: impl Into<String>) -> Term {
        Term::Atom(s.into())
    }

    pub fn str(s: impl Into<String>) -> Term {
        Term::Str(s.into())
    }

    /// True if this term carries a process handle.
    pub fn is_handle(&self) -> bool {
        matches!(self, Term::Handle(_))
    }
}

impl From<&str> for Term {
    fn from(s: &str) -> Self {
        Term::Atom(s.to_string())
    }
}

impl From<i64> for Term {
    fn from(n: i64) -> Self {
        Term::Int(n)
    }
}

impl From<bool> for Term {
    fn from(b: bool) -> Self {
        Term::Bool(b)
    }
}

impl From<Handle> for Term {
    fn from(h: Handle) -> Self {
        Term::Handle(h)
    }
}

/// An ordered tuple of values delivered as one message.
pub type Envelope = Vec<Term>;

/// The reserved tag used for link-death notifications.
pub const EXIT_TAG: &str = "EXIT";

/// The internal tag carried over the Transport layer to ask an OS-backed
/// child's dispatch loop to terminate. Never delivered to user handlers:
/// a child's local reader thread intercepts it before it reaches the
/// mailbox, the same way a direct terminate request bypasses the dispatch
/// loop for in-process handles.
pub const TERMINATE_TAG: &str = "__terminate__";

/// Builds the reserved `(EXIT, handle_of_dead_peer)` envelope delivered to
/// linked peers on termination.
pub fn exit_envelope(dead: Handle) -> Envelope {
    vec![Term::Atom(EXIT_TAG.to_string()), Term::Handle(dead)]
}

/// Builds the tag-only `(EXIT,)` envelope the root shutdown broadcast
/// delivers to every live process, linked or not.
pub fn tag_only_exit_envelope() -> Envelope {
    vec![Term::Atom(EXIT_TAG.to_string())]
}

/// Builds the internal terminate-control envelope sent to an OS-backed
/// child over the Transport layer.
pub fn terminate_envelope() -> Envelope {
    vec![Term::Atom(TERMINATE_TAG.to_string())]
}

/// True if `envelope` is the reserved terminate-control envelope, shared by
/// the broker (deciding how to treat a frame forwarded up from a child) and
/// a child's own stdin reader (deciding whether to intercept it before the
/// mailbox).
pub(crate) fn is_terminate_signal(envelope: &Envelope) -> bool {
    matches!(envelope.first(), Some(Term::Atom(tag)) if tag == TERMINATE_TAG)
}

/// Marks the dead peer's handle carried by an `(EXIT, handle)` envelope as
/// dead in place. A re-exec'd OS-backed child never shares the dying
/// process's original liveness flag — it only ever sees a handle that
/// crossed the wire, getting a fresh, disconnected flag on deserialization —
/// so without this, `is_alive`/`wait` on that specific handle copy would
/// report it alive forever despite the EXIT that just announced its death.
pub(crate) fn mark_exit_handle_dead(envelope: &Envelope) {
    if matches!(envelope.first(), Some(Term::Atom(tag)) if tag == EXIT_TAG) {
        if let Some(Term::Handle(handle)) = envelope.get(1) {
            handle.mark_dead();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atom_from_str() {
        assert_eq!(Term::from("ping"), Term::Atom("ping".to_string()));
    }
}
