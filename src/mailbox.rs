use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_channel::{Receiver, Select, Sender};

use crate::term::Envelope;

/// What woke up a blocked [`Mailbox::dequeue_or_terminate`] call.
pub enum Wake {
    Envelope(Envelope),
    Terminate,
}

/// FIFO queue of envelopes, single-consumer (the owning dispatch loop),
/// multi-producer (any live handle holding a clone of the sender side).
///
/// Enqueue is non-blocking and tolerates a dropped/terminated receiver
/// silently: senders never learn a peer has died by sending to it.
///
/// A terminate request is tracked separately from the envelope channel so
/// it can wake a blocked consumer immediately, but [`dequeue_or_terminate`]
/// always drains any already-enqueued envelope first — a terminate
/// requested after a message was sent is observed only once that message
/// (and everything before it) has been delivered.
pub struct Mailbox {
    envelopes: Receiver<Envelope>,
    sender: Sender<Envelope>,
    terminate_requested: AtomicBool,
    wake_tx: Sender<()>,
    wake_rx: Receiver<()>,
}

impl Mailbox {
    pub fn new() -> Mailbox {
        let (sender, envelopes) = crossbeam_channel::unbounded();
        let (wake_tx, wake_rx) = crossbeam_channel::bounded(1);
        Mailbox {
            envelopes,
            sender,
            terminate_requested: AtomicBool::new(false),
            wake_tx,
            wake_rx,
        }
    }

    /// A cloneable handle to this mailbox's producing end.
    pub fn sender(&self) -> Sender<Envelope> {
        self.sender.clone()
    }

    /// Requests that a blocked [`dequeue_or_terminate`](Self::dequeue_or_terminate)
    /// eventually wake up and report [`Wake::Terminate`]. Idempotent.
    pub fn request_terminate(&self) {
        self.terminate_requested.store(true, Ordering::Release);
        let _ = self.wake_tx.try_send(());
    }

    /// Blocks until the next envelope arrives or termination was requested
    /// and every envelope enqueued before the request has been drained.
    pub fn dequeue_or_terminate(&self) -> Option<Wake> {
        loop {
            if let Ok(envelope) = self.envelopes.try_recv() {
                return Some(Wake::Envelope(envelope));
            }
            if self.terminate_requested.load(Ordering::Acquire) {
                return Some(Wake::Terminate);
            }
            let mut select = Select::new();
            let envelope_op = select.recv(&self.envelopes);
            let wake_op = select.recv(&self.wake_rx);
            let ready = select.select();
            match ready.index() {
                i if i == envelope_op => {
                    if let Ok(envelope) = ready.recv(&self.envelopes) {
                        return Some(Wake::Envelope(envelope));
                    }
                }
                i if i == wake_op => {
                    let _ = ready.recv(&self.wake_rx);
                    // loop back around: re-check priority (envelope before terminate)
                }
                _ => unreachable!(),
            }
        }
    }
}

impl Default for Mailbox {
    fn default() -> Self {
        Mailbox::new()
    }
}

/// Enqueues an envelope onto `sender`, discarding the error that results
/// from the receiving mailbox having been dropped (a terminated process).
pub fn enqueue(sender: &Sender<Envelope>, envelope: Envelope) {
    let _ = sender.send(envelope);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::term::Term;

    #[test]
    fn fifo_order_is_preserved() {
        let mailbox = Mailbox::new();
        enqueue(&mailbox.sender(), vec![Term::Int(1)]);
        enqueue(&mailbox.sender(), vec![Term::Int(2)]);
        assert!(matches!(
            mailbox.dequeue_or_terminate(),
            Some(Wake::Envelope(e)) if e == vec![Term::Int(1)]
        ));
        assert!(matches!(
            mailbox.dequeue_or_terminate(),
            Some(Wake::Envelope(e)) if e == vec![Term::Int(2)]
        ));
    }

    #[test]
    fn enqueue_on_dropped_mailbox_is_a_silent_no_op() {
        let mailbox = Mailbox::new();
        let sender = mailbox.sender();
        drop(mailbox);
        enqueue(&sender, vec![Term::atom("ping")]);
    }

    #[test]
    fn terminate_request_wakes_a_blocked_dequeue() {
        let mailbox = Mailbox::new();
        mailbox.request_terminate();
        assert!(matches!(mailbox.dequeue_or_terminate(), Some(Wake::Terminate)));
    }

    #[test]
    fn terminate_is_ordered_after_previously_enqueued_envelopes() {
        let mailbox = Mailbox::new();
        enqueue(&mailbox.sender(), vec![Term::atom("last-message")]);
        mailbox.request_terminate();
        assert!(matches!(mailbox.dequeue_or_terminate(), Some(Wake::Envelope(_))));
        assert!(matches!(mailbox.dequeue_or_terminate(), Some(Wake::Terminate)));
    }
}
