//! Envelopes and the type-erased payload they carry, generalizing the
//! teacher's `AnyMessage` (one-shot `Box<dyn Any + Send>` plus downcast) into
//! the immutable, routed unit the mailbox and scheduler pass around.

use std::any::Any;
use std::fmt;

use crate::cell::ActorRef;
use crate::id::{ActorId, MessageId};

/// A type-erased message body. Consumed exactly once via `downcast`.
pub struct Payload(Box<dyn Any + Send>);

impl Payload {
    pub fn new<T: Send + 'static>(value: T) -> Self {
        Payload(Box::new(value))
    }

    pub(crate) fn type_id(&self) -> std::any::TypeId {
        (*self.0).type_id()
    }

    pub(crate) fn downcast<T: Send + 'static>(self) -> Result<T, Payload> {
        match self.0.downcast::<T>() {
            Ok(boxed) => Ok(*boxed),
            Err(boxed) => Err(Payload(boxed)),
        }
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Payload(..)")
    }
}

/// The reason an actor terminated. `Normal` does not propagate through a
/// link unless the peer traps exits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitReason {
    Normal,
    Killed,
    User(i32),
    UnhandledException,
    Unreachable,
}

impl ExitReason {
    pub fn is_normal(&self) -> bool {
        matches!(self, ExitReason::Normal)
    }

    /// Suggested process exit code for a root actor terminating with this
    /// reason, for embedders that map actor lifecycle onto `main`'s return
    /// (spec §6; the core exposes the mapping, not a CLI binary).
    pub fn exit_code(&self) -> i32 {
        match self {
            ExitReason::Normal => 0,
            ExitReason::UnhandledException => 2,
            ExitReason::Killed | ExitReason::User(_) | ExitReason::Unreachable => 1,
        }
    }
}

/// The result of a correlated request, delivered back to the sender's
/// mailbox as a `Reply` envelope.
pub(crate) enum ReplyOutcome {
    Value(Payload),
    Error(crate::error::RuntimeError),
}

/// The routing-relevant variants an envelope can carry. `User` is dispatched
/// through the current behavior's clauses; the others bypass clause
/// matching (spec §4.3 step 1, §4.4, §4.5).
pub(crate) enum EnvelopeKind {
    User { payload: Payload, message_id: MessageId },
    Reply { message_id: MessageId, outcome: ReplyOutcome },
    Exit { from: ActorId, reason: ExitReason },
    Down { from: ActorId, reason: ExitReason },
}

impl EnvelopeKind {
    /// Urgent envelopes (system signals) are merged ahead of normal traffic;
    /// everything else (including replies, which still need per-sender
    /// FIFO ordering preserved) goes through the normal sub-queue.
    pub(crate) fn is_urgent(&self) -> bool {
        matches!(self, EnvelopeKind::Exit { .. } | EnvelopeKind::Down { .. })
    }
}

pub(crate) struct Envelope {
    pub sender: Option<ActorId>,
    pub kind: EnvelopeKind,
}

/// The sender of a message, as seen by a receiving handler.
pub type Sender = Option<ActorRef>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_code_matches_spec_mapping() {
        assert_eq!(ExitReason::Normal.exit_code(), 0);
        assert_eq!(ExitReason::User(7).exit_code(), 1);
        assert_eq!(ExitReason::Killed.exit_code(), 1);
        assert_eq!(ExitReason::UnhandledException.exit_code(), 2);
    }
}
