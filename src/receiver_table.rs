use log::{debug, trace};

use crate::panic::catch_handler;
use crate::pattern::Pattern;
use crate::term::Envelope;

/// Distinguished return value from a handler invocation, modeling the
/// sentinel-based `Exit` control signal as data rather than as a second
/// unwinding channel.
pub enum HandlerOutcome {
    /// The handler returned normally; keep dispatching.
    Continue,
    /// The handler raised the `Exit` sentinel; end the loop with reason
    /// `normal`.
    Stop,
    /// The handler panicked; the process terminates with reason
    /// `uncaught-handler-failure`.
    Failed(String),
}

pub type Handler = Box<dyn FnMut(Envelope) -> HandlerOutcome + Send>;

/// Insertion-ordered list of pattern to handler bindings for one process.
///
/// Lookup scans in insertion order and the first match wins. Re-installing
/// an already-bound pattern replaces its handler in place, preserving the
/// binding's original position.
#[derive(Default)]
pub struct ReceiverTable {
    bindings: Vec<(Pattern, Handler)>,
}

impl ReceiverTable {
    pub fn new() -> ReceiverTable {
        ReceiverTable::default()
    }

    /// Appends a new pattern/handler binding, or replaces the handler of an
    /// existing identical pattern in place.
    pub fn install(&mut self, pattern: Pattern, handler: Handler) {
        if let Some(slot) = self.bindings.iter_mut().find(|(p, _)| *p == pattern) {
            slot.1 = handler;
        } else {
            self.bindings.push((pattern, handler));
        }
    }

    /// Finds the first binding matching `envelope` and invokes its handler,
    /// capturing a panic as [`HandlerOutcome::Failed`]. Returns `None` if no
    /// pattern matches, in which case the caller treats the envelope as an
    /// unhandled message.
    pub fn dispatch(&mut self, envelope: Envelope) -> Option<HandlerOutcome> {
        let slot = self
            .bindings
            .iter_mut()
            .find(|(pattern, _)| pattern.matches(&envelope))?;
        trace!("dispatching envelope against matched pattern");
        let handler = &mut slot.1;
        let outcome = match catch_handler(move || handler(envelope)) {
            Ok(outcome) => outcome,
            Err(message) => HandlerOutcome::Failed(message),
        };
        match &outcome {
            HandlerOutcome::Continue => {}
            HandlerOutcome::Stop => debug!("handler raised Exit sentinel"),
            HandlerOutcome::Failed(message) => debug!("handler failed: {message}"),
        }
        Some(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::Matcher;
    use crate::term::Term;

    #[test]
    fn scans_bindings_in_insertion_order() {
        let mut table = ReceiverTable::new();
        table.install(
            Pattern::new(vec![Matcher::Literal(Term::atom("pong"))]),
            Box::new(|_| HandlerOutcome::Continue),
        );
        table.install(
            Pattern::new(vec![Matcher::Literal(Term::atom("ping"))]),
            Box::new(|_| HandlerOutcome::Stop),
        );
        assert!(matches!(
            table.dispatch(vec![Term::atom("ping")]),
            Some(HandlerOutcome::Stop)
        ));
    }

    #[test]
    fn rebinding_replaces_handler_in_place() {
        let mut table = ReceiverTable::new();
        table.install(
            Pattern::new(vec![Matcher::Literal(Term::atom("x"))]),
            Box::new(|_| HandlerOutcome::Continue),
        );
        table.install(
            Pattern::new(vec![Matcher::Literal(Term::atom("x"))]),
            Box::new(|_| HandlerOutcome::Stop),
        );
        assert_eq!(table.bindings.len(), 1);
        assert!(matches!(
            table.dispatch(vec![Term::atom("x")]),
            Some(HandlerOutcome::Stop)
        ));
    }

    #[test]
    fn unmatched_envelope_returns_none() {
        let mut table = ReceiverTable::new();
        table.install(
            Pattern::new(vec![Matcher::Literal(Term::atom("x"))]),
            Box::new(|_| HandlerOutcome::Continue),
        );
        assert!(table.dispatch(vec![Term::atom("y")]).is_none());
    }

    #[test]
    fn panicking_handler_yields_failed_outcome() {
        let mut table = ReceiverTable::new();
        table.install(
            Pattern::new(vec![Matcher::Literal(Term::atom("boom"))]),
            Box::new(|_| panic!("kaboom")),
        );
        assert!(matches!(
            table.dispatch(vec![Term::atom("boom")]),
            Some(HandlerOutcome::Failed(message)) if message == "kaboom"
        ));
    }
}
