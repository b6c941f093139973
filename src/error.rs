//! Error kinds surfaced by the runtime (spec §7). Every variant here is a
//! runtime condition an embedder can observe and recover from; scheduler
//! invariant violations (e.g. a double-executed ACB) are bugs and abort the
//! process instead of producing a `RuntimeError`.

use thiserror::Error;

use crate::id::ActorId;

#[derive(Debug, Error, Clone)]
pub enum RuntimeError {
    #[error("no clause in the current behavior matched the message")]
    UnexpectedMessage,

    #[error("request to {target} timed out")]
    Timeout { target: ActorId },

    #[error("actor {target} has exited")]
    ActorExited { target: ActorId },

    #[error("no actor is registered under id {0}")]
    NoSuchDestination(ActorId),

    #[error("mailbox for actor {0} is closed")]
    MailboxClosed(ActorId),

    #[error("the actor system is shutting down")]
    SchedulerShutdown,

    #[error("invalid atom encoding for {input:?}: {reason}")]
    InvalidAtomEncoding { input: String, reason: &'static str },

    #[error("the request's receiving actor is no longer reachable")]
    RequestReceiverDown,
}
