//! Ordered, type-matched message handlers: a behavior. Generalizes the
//! teacher's per-type `Receive<Msg>` impl (normally wired up by the
//! `#[actor(...)]` macro) into a runtime clause list, per the design note in
//! spec §9: "a tagged-variant list with a match function per payload shape"
//! instead of type introspection at the call site.

use std::any::TypeId;

use crate::cell::ActorContext;
use crate::envelope::{ExitReason, Payload, Sender};

/// What a clause's handler decided to do with an envelope.
pub enum Action<S> {
    /// Reply to the sender of a request with this value.
    Reply(Payload),
    /// Defer this envelope (carrying the message the clause was just
    /// handed back, unmodified) until the next `become`/`unbecome`.
    Skip(Payload),
    /// Replace the current behavior, pushing the old one onto the stack.
    Become(Behavior<S>),
    /// Pop back to the previously installed behavior.
    Unbecome,
    /// Terminate the actor with this reason.
    Quit(ExitReason),
    /// No reply, no behavior change.
    Nothing,
}

impl<S> Action<S> {
    /// Replies to the sender of the current request with `value`. Has no
    /// effect on an asynchronous (non-request) envelope.
    pub fn reply<T: Send + 'static>(value: T) -> Action<S> {
        Action::Reply(Payload::new(value))
    }

    /// Defers the envelope this clause was just handed, to be re-examined
    /// after the next `become`/`unbecome`. `value` is the same message the
    /// clause received, handed straight back so the original envelope is
    /// preserved rather than discarded.
    pub fn skip<T: Send + 'static>(value: T) -> Action<S> {
        Action::Skip(Payload::new(value))
    }
}

type ClauseFn<S> = Box<dyn Fn(&mut S, &ActorContext, Payload, Sender) -> Action<S> + Send>;

struct Clause<S> {
    type_id: TypeId,
    call: ClauseFn<S>,
}

/// An ordered list of typed handler clauses. Dispatch picks the first
/// clause whose type matches the envelope's payload.
pub struct Behavior<S> {
    clauses: Vec<Clause<S>>,
}

impl<S> Default for Behavior<S> {
    fn default() -> Self {
        Behavior { clauses: Vec::new() }
    }
}

impl<S: 'static> Behavior<S> {
    pub fn new() -> Self {
        Behavior::default()
    }

    /// Adds a clause matching messages of type `M`. Earlier clauses for the
    /// same actor always take precedence (first match wins).
    pub fn on<M, F>(mut self, handler: F) -> Self
    where
        M: Send + 'static,
        F: Fn(&mut S, &ActorContext, M, Sender) -> Action<S> + Send + 'static,
    {
        self.clauses.push(Clause {
            type_id: TypeId::of::<M>(),
            call: Box::new(move |state, ctx, payload, sender| {
                let message = payload
                    .downcast::<M>()
                    .unwrap_or_else(|_| panic!("clause type_id matched but downcast failed"));
                handler(state, ctx, message, sender)
            }),
        });
        self
    }

    /// Runs the first matching clause. Returns the untouched payload (for
    /// dead-lettering/`unexpected_message`) if no clause matches.
    pub(crate) fn dispatch(&self, state: &mut S, ctx: &ActorContext, payload: Payload, sender: Sender) -> Result<Action<S>, Payload> {
        let type_id = payload.type_id();
        for clause in &self.clauses {
            if clause.type_id == type_id {
                return Ok((clause.call)(state, ctx, payload, sender));
            }
        }
        Err(payload)
    }
}
