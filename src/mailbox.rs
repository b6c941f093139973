//! Per-actor mailbox: three logical sub-queues (urgent/normal/deferred)
//! merged by priority, generalized from the teacher's single-FIFO
//! `kernel::queue`/`kernel::mailbox` pair (`MailboxSender`/`QueueReader`,
//! scheduled/suspended atomics) into the spec's priority-merged contract.
//!
//! Producers enqueue wait-free via `crossbeam_queue::SegQueue`; the
//! consumer side (`try_dequeue`/`skip`) is exercised only by the worker
//! currently executing the owning actor, matching the single-consumer
//! discipline the spec requires.

use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_queue::SegQueue;

use crate::envelope::Envelope;

pub(crate) struct Mailbox {
    urgent: SegQueue<Envelope>,
    normal: SegQueue<Envelope>,
    deferred: SegQueue<Envelope>,
    len: std::sync::atomic::AtomicUsize,
    runnable: AtomicBool,
    executing: AtomicBool,
}

impl Mailbox {
    pub fn new() -> Self {
        Mailbox {
            urgent: SegQueue::new(),
            normal: SegQueue::new(),
            deferred: SegQueue::new(),
            len: std::sync::atomic::AtomicUsize::new(0),
            runnable: AtomicBool::new(false),
            executing: AtomicBool::new(false),
        }
    }

    /// Enqueues `envelope`, returning `true` if this was the transition from
    /// empty to non-empty (the caller uses this to decide whether the ACB
    /// needs to be submitted to the scheduler).
    pub fn enqueue(&self, envelope: Envelope) -> bool {
        let was_empty = self.len.fetch_add(1, Ordering::AcqRel) == 0;
        if envelope.kind.is_urgent() {
            self.urgent.push(envelope);
        } else {
            self.normal.push(envelope);
        }
        was_empty
    }

    /// Called only by the actor's currently executing worker. Urgent
    /// entries are always returned ahead of normal ones.
    pub fn try_dequeue(&self) -> Option<Envelope> {
        if let Some(e) = self.urgent.pop() {
            self.len.fetch_sub(1, Ordering::AcqRel);
            return Some(e);
        }
        if let Some(e) = self.normal.pop() {
            self.len.fetch_sub(1, Ordering::AcqRel);
            return Some(e);
        }
        None
    }

    /// Moves `envelope` to the deferred sub-queue, preserving arrival order
    /// among deferred entries.
    pub fn skip(&self, envelope: Envelope) {
        self.deferred.push(envelope);
    }

    /// Reinjects all deferred entries into the normal queue at the head,
    /// preserving their relative order, ahead of anything already enqueued
    /// there. Called on every behavior change (`become`/`unbecome`).
    pub fn reinject_deferred(&self) {
        let mut carried = Vec::new();
        while let Some(e) = self.deferred.pop() {
            carried.push(e);
        }
        if carried.is_empty() {
            return;
        }
        // drain whatever is currently in `normal` so deferred entries can be
        // pushed back in front of it, then restore the rest in order.
        let mut rest = Vec::new();
        while let Some(e) = self.normal.pop() {
            rest.push(e);
        }
        for e in carried {
            self.normal.push(e);
        }
        for e in rest {
            self.normal.push(e);
        }
    }

    pub fn has_msgs(&self) -> bool {
        self.len.load(Ordering::Acquire) > 0
    }

    /// Attempts to transition non-runnable -> runnable; returns `true` if
    /// this call performed the transition (the caller should submit the ACB
    /// to the scheduler exactly once per such transition).
    pub fn mark_runnable(&self) -> bool {
        self.runnable
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn clear_runnable(&self) {
        self.runnable.store(false, Ordering::Release);
    }

    pub fn try_begin_execute(&self) -> bool {
        self.executing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn end_execute(&self) {
        self.executing.store(false, Ordering::Release);
    }

    /// Drains every sub-queue, invoking `f` on each envelope (used to flush
    /// a terminated actor's mailbox to dead letters).
    pub fn drain_all(&self, mut f: impl FnMut(Envelope)) {
        while let Some(e) = self.urgent.pop() {
            f(e);
        }
        while let Some(e) = self.normal.pop() {
            f(e);
        }
        while let Some(e) = self.deferred.pop() {
            f(e);
        }
        self.len.store(0, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::EnvelopeKind;
    use crate::id::MessageId;

    fn user(n: u32) -> Envelope {
        Envelope {
            sender: None,
            kind: EnvelopeKind::User {
                payload: crate::envelope::Payload::new(n),
                message_id: MessageId::NONE,
            },
        }
    }

    fn payload_of(e: Envelope) -> u32 {
        match e.kind {
            EnvelopeKind::User { payload, .. } => payload.downcast::<u32>().unwrap(),
            _ => panic!("expected a user envelope"),
        }
    }

    #[test]
    fn fifo_per_producer() {
        let mb = Mailbox::new();
        mb.enqueue(user(1));
        mb.enqueue(user(2));
        mb.enqueue(user(3));
        assert_eq!(payload_of(mb.try_dequeue().unwrap()), 1);
        assert_eq!(payload_of(mb.try_dequeue().unwrap()), 2);
        assert_eq!(payload_of(mb.try_dequeue().unwrap()), 3);
        assert!(mb.try_dequeue().is_none());
    }

    #[test]
    fn skip_then_reinject_preserves_order() {
        let mb = Mailbox::new();
        mb.enqueue(user(1));
        mb.enqueue(user(2));
        mb.enqueue(user(3));

        let e1 = mb.try_dequeue().unwrap();
        mb.skip(e1);
        let e2 = mb.try_dequeue().unwrap();
        mb.skip(e2);
        // envelope 3 remains at the front of `normal`.
        assert_eq!(payload_of(mb.try_dequeue().unwrap()), 3);

        mb.reinject_deferred();
        assert_eq!(payload_of(mb.try_dequeue().unwrap()), 1);
        assert_eq!(payload_of(mb.try_dequeue().unwrap()), 2);
    }

    #[test]
    fn urgent_precedes_normal() {
        let mb = Mailbox::new();
        mb.enqueue(user(1));
        mb.enqueue(Envelope {
            sender: None,
            kind: EnvelopeKind::Exit {
                from: crate::id::ActorId(1),
                reason: crate::envelope::ExitReason::Normal,
            },
        });
        let first = mb.try_dequeue().unwrap();
        assert!(matches!(first.kind, EnvelopeKind::Exit { .. }));
    }
}
