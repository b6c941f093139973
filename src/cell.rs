//! The actor control block (ACB) and the actor-facing handles built on top
//! of it. Generalizes the teacher's `ActorCell`/`CellInternal`
//! (`old_src/actor/actor_cell.rs`) from a parent/child supervision tree into
//! the spec's flat registry of symmetrically linked peers.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::behavior::{Action, Behavior};
use crate::envelope::{Envelope, EnvelopeKind, ExitReason, Payload, ReplyOutcome, Sender};
use crate::error::RuntimeError;
use crate::id::{ActorId, MessageId};
use crate::mailbox::Mailbox;
use crate::system::SystemHandle;

/// An opaque, copyable reference to an actor. Holding a handle keeps the
/// actor *addressable*; it does not keep it alive in the logical sense. A
/// handle to a terminated actor resolves to dead-letter/`request_receiver_down`
/// semantics on send rather than panicking.
#[derive(Clone)]
pub struct ActorRef {
    pub(crate) id: ActorId,
    pub(crate) system: SystemHandle,
}

impl ActorRef {
    pub fn id(&self) -> ActorId {
        self.id
    }

    /// The display name given at `spawn`, or `"<unknown>"` for an id the
    /// registry no longer holds (already terminated and reaped).
    pub fn name(&self) -> String {
        self.system.lookup(self.id).map(|acb| acb.name.clone()).unwrap_or_else(|| "<unknown>".to_string())
    }

    /// Fire-and-forget send. Succeeds silently even if the actor has
    /// terminated (the envelope becomes a dead letter).
    pub fn send<T: Send + 'static>(&self, from: Sender, payload: T) {
        self.system.clone().tell(
            self.id,
            from.map(|r| r.id),
            Payload::new(payload),
            MessageId::NONE,
        );
    }
}

impl std::fmt::Debug for ActorRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ActorRef({})", self.id)
    }
}

impl PartialEq for ActorRef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
impl Eq for ActorRef {}

/// Passed to every handler clause; provides the operations a running actor
/// performs on itself or on peers (send, request, link, monitor, quit).
/// Non-generic over actor state; only `Behavior<S>` construction (inside
/// `Action::Become`) needs to know `S`, and that happens in the caller's own
/// generic context, not here.
pub struct ActorContext {
    pub(crate) system: SystemHandle,
    pub(crate) self_id: ActorId,
    /// Set by `quit()` called from inside a handler that is still running
    /// under the ACB's cell lock; the scheduler applies it once that lock
    /// is released (spec §4.2's "end of a handler invocation" suspension
    /// point), avoiding a self-deadlock on the non-reentrant cell mutex.
    pub(crate) quit_requested: std::cell::Cell<Option<ExitReason>>,
    /// Continuations registered via `request()` during the handler
    /// invocation currently running under this context, queued rather than
    /// written straight into the cell (see `request`'s doc comment), and
    /// drained by the scheduler once the cell lock is released.
    pub(crate) pending_registrations: RefCell<Vec<PendingRegistration>>,
}

impl ActorContext {
    pub(crate) fn new(system: SystemHandle, self_id: ActorId) -> Self {
        ActorContext {
            system,
            self_id,
            quit_requested: std::cell::Cell::new(None),
            pending_registrations: RefCell::new(Vec::new()),
        }
    }

    /// Drains the continuations queued by `request()` calls made during the
    /// handler invocation just finished.
    pub(crate) fn take_pending_registrations(&self) -> Vec<PendingRegistration> {
        std::mem::take(&mut self.pending_registrations.borrow_mut())
    }

    pub fn myself(&self) -> ActorRef {
        ActorRef {
            id: self.self_id,
            system: self.system.clone(),
        }
    }

    pub fn send<T: Send + 'static>(&self, target: &ActorRef, payload: T) {
        target.system.clone().tell(
            target.id,
            Some(self.self_id),
            Payload::new(payload),
            MessageId::NONE,
        );
    }

    /// Allocates a correlation id, enqueues `payload` to `target`, and
    /// records `continuation` to run on this actor when a reply (or
    /// timeout) arrives. The continuation sees this actor's state as of
    /// that instant, serialized with its other handlers (spec §4.4).
    pub fn request<T, R, S, F>(&self, target: &ActorRef, timeout: Duration, payload: T, continuation: F)
    where
        T: Send + 'static,
        R: Send + 'static,
        S: Send + 'static,
        F: FnOnce(&mut S, &ActorContext, Result<R, RuntimeError>) -> Action<S> + Send + 'static,
    {
        let message_id = self.system.ids.next_message_id();
        let deadline = Instant::now() + timeout;

        let reply_handler: ReplyHandler<S> = Box::new(move |state, ctx, result| {
            let typed = result.and_then(|payload| {
                payload
                    .downcast::<R>()
                    .map_err(|_| RuntimeError::UnexpectedMessage)
            });
            continuation(state, ctx, typed)
        });

        // `request` is called from inside a running handler, while the
        // scheduler still holds this actor's cell lock across the whole
        // dispatch (run_quantum). Registering the continuation by locking
        // the cell here would re-lock that same non-reentrant mutex, so it
        // is queued instead and applied by the scheduler once the lock for
        // this invocation is released, same deferral as `quit_requested`.
        self.pending_registrations.borrow_mut().push(PendingRegistration {
            message_id,
            handler: Box::new(reply_handler),
        });
        self.system.clone().register_deadline(self.self_id, message_id, deadline);
        self.system.clone().tell(
            target.id,
            Some(self.self_id),
            Payload::new(payload),
            message_id,
        );
    }

    pub fn link(&self, other: &ActorRef) {
        self.system.link(self.self_id, other.id);
    }

    pub fn unlink(&self, other: &ActorRef) {
        self.system.unlink(self.self_id, other.id);
    }

    pub fn monitor(&self, other: &ActorRef) {
        self.system.monitor(self.self_id, other.id);
    }

    pub fn demonitor(&self, other: &ActorRef) {
        self.system.demonitor(self.self_id, other.id);
    }

    pub fn set_trap_exits(&self, trap: bool) {
        if let Some(acb) = self.system.lookup(self.self_id) {
            acb.trap_exits.store(trap, Ordering::Release);
        }
    }

    /// Requests termination with `reason`. Takes effect once the currently
    /// executing handler returns (see `quit_requested`), not immediately:
    /// calling `terminate` synchronously here would re-lock the ACB's cell
    /// mutex the caller is already holding.
    pub fn quit(&self, reason: ExitReason) {
        self.quit_requested.set(Some(reason));
    }
}

type ReplyHandler<S> = Box<dyn FnOnce(&mut S, &ActorContext, Result<Payload, RuntimeError>) -> Action<S> + Send>;

/// A continuation queued by `request()`, still boxed behind `Any` until the
/// scheduler hands it to the (statically typed) cell that owns it.
pub(crate) struct PendingRegistration {
    pub message_id: MessageId,
    pub handler: Box<dyn Any + Send>,
}

/// What a cell decided after processing one envelope.
pub(crate) enum Delivery {
    Continue,
    Quit(ExitReason),
}

/// Non-generic face of a `StatefulCell<S>`, so the scheduler and registry
/// can hold actors of arbitrary state type behind one trait object, the
/// same erasure shape as the teacher's `BoxActor<Msg>`, but erasing the
/// state type instead of (only) the message type.
pub(crate) trait CellObject: Send {
    fn start(&mut self, ctx: &ActorContext);
    fn stop(&mut self, ctx: &ActorContext);
    fn handle_user(&mut self, ctx: &ActorContext, payload: Payload, sender: Sender, message_id: MessageId) -> Delivery;
    fn handle_reply(&mut self, ctx: &ActorContext, message_id: MessageId, outcome: Result<Payload, RuntimeError>) -> Delivery;
    fn handle_exit_as_message(&mut self, ctx: &ActorContext, from: ActorId, reason: ExitReason) -> Delivery;
    fn handle_down(&mut self, ctx: &ActorContext, from: ActorId, reason: ExitReason) -> Delivery;
    fn register_pending_erased(&mut self, message_id: MessageId, handler: Box<dyn Any + Send>);
}

/// A down-notification payload, delivered to a monitor's behavior clauses
/// like any other typed message.
#[derive(Debug, Clone)]
pub struct Down {
    pub actor: ActorId,
    pub reason: ExitReason,
}

/// An exit signal delivered as an ordinary message to an actor that has
/// opted into trapping exits.
#[derive(Debug, Clone)]
pub struct ExitSignal {
    pub actor: ActorId,
    pub reason: ExitReason,
}

/// A one-shot `pre_start`/`post_stop` hook, run with exclusive access to
/// the actor's state.
pub type LifecycleHook<S> = Box<dyn FnOnce(&mut S, &ActorContext) + Send>;

pub(crate) struct StatefulCell<S: Send + 'static> {
    state: S,
    stack: Vec<Behavior<S>>,
    pending: HashMap<MessageId, ReplyHandler<S>>,
    pre_start: Option<LifecycleHook<S>>,
    post_stop: Option<LifecycleHook<S>>,
}

impl<S: Send + 'static> StatefulCell<S> {
    pub fn new(state: S, initial: Behavior<S>, pre_start: Option<LifecycleHook<S>>, post_stop: Option<LifecycleHook<S>>) -> Self {
        StatefulCell {
            state,
            stack: vec![initial],
            pending: HashMap::new(),
            pre_start,
            post_stop,
        }
    }

    fn apply_action(&mut self, ctx: &ActorContext, sender: Option<ActorId>, message_id: MessageId, action: Action<S>) -> Delivery {
        match action {
            Action::Reply(value) => {
                if message_id.is_request() {
                    if let Some(sender_id) = sender {
                        ctx.system
                            .clone()
                            .reply(sender_id, message_id, ReplyOutcome::Value(value));
                    }
                }
                Delivery::Continue
            }
            Action::Skip(payload) => {
                if let Some(acb) = ctx.system.lookup(ctx.self_id) {
                    acb.mailbox.skip(Envelope {
                        sender,
                        kind: EnvelopeKind::User { payload, message_id },
                    });
                }
                Delivery::Continue
            }
            Action::Become(behavior) => {
                self.stack.push(behavior);
                if let Some(acb) = ctx.system.lookup(ctx.self_id) {
                    acb.mailbox.reinject_deferred();
                }
                Delivery::Continue
            }
            Action::Unbecome => {
                if self.stack.len() > 1 {
                    self.stack.pop();
                }
                if let Some(acb) = ctx.system.lookup(ctx.self_id) {
                    acb.mailbox.reinject_deferred();
                }
                Delivery::Continue
            }
            Action::Quit(reason) => Delivery::Quit(reason),
            Action::Nothing => Delivery::Continue,
        }
    }
}

impl<S: Send + 'static> CellObject for StatefulCell<S> {
    fn start(&mut self, ctx: &ActorContext) {
        if let Some(f) = self.pre_start.take() {
            f(&mut self.state, ctx);
        }
    }

    fn stop(&mut self, ctx: &ActorContext) {
        if let Some(f) = self.post_stop.take() {
            f(&mut self.state, ctx);
        }
    }

    fn handle_user(&mut self, ctx: &ActorContext, payload: Payload, sender: Sender, message_id: MessageId) -> Delivery {
        let sender_id = sender.as_ref().map(|s| s.id);
        let behavior = self.stack.last().expect("behavior stack is never empty");
        match behavior.dispatch(&mut self.state, ctx, payload, sender) {
            Ok(action) => self.apply_action(ctx, sender_id, message_id, action),
            Err(_unmatched) => {
                if message_id.is_request() {
                    if let Some(sid) = sender_id {
                        ctx.system.clone().reply(
                            sid,
                            message_id,
                            ReplyOutcome::Error(RuntimeError::UnexpectedMessage),
                        );
                    }
                } else {
                    ctx.system.record_dead_letter(ctx.self_id);
                }
                Delivery::Continue
            }
        }
    }

    fn handle_reply(&mut self, ctx: &ActorContext, message_id: MessageId, outcome: Result<Payload, RuntimeError>) -> Delivery {
        match self.pending.remove(&message_id) {
            Some(handler) => {
                let action = handler(&mut self.state, ctx, outcome);
                self.apply_action(ctx, None, MessageId::NONE, action)
            }
            None => Delivery::Continue, // late/duplicate reply for a request already resolved.
        }
    }

    fn handle_exit_as_message(&mut self, ctx: &ActorContext, from: ActorId, reason: ExitReason) -> Delivery {
        let behavior = self.stack.last().expect("behavior stack is never empty");
        let payload = Payload::new(ExitSignal { actor: from, reason });
        match behavior.dispatch(&mut self.state, ctx, payload, None) {
            Ok(action) => self.apply_action(ctx, None, MessageId::NONE, action),
            Err(_unmatched) => Delivery::Continue,
        }
    }

    fn handle_down(&mut self, ctx: &ActorContext, from: ActorId, reason: ExitReason) -> Delivery {
        let behavior = self.stack.last().expect("behavior stack is never empty");
        let payload = Payload::new(Down { actor: from, reason });
        match behavior.dispatch(&mut self.state, ctx, payload, None) {
            Ok(action) => self.apply_action(ctx, None, MessageId::NONE, action),
            Err(_unmatched) => Delivery::Continue,
        }
    }

    fn register_pending_erased(&mut self, message_id: MessageId, handler: Box<dyn Any + Send>) {
        if let Ok(handler) = handler.downcast::<ReplyHandler<S>>() {
            self.pending.insert(message_id, *handler);
        }
    }
}

/// The actor control block. Holds the mailbox, the type-erased cell
/// (state + behavior stack), the exit-reason latch, and the link/monitor
/// sets. At most one worker executes `cell` at a time (enforced by the
/// scheduler's executing flag on `mailbox`).
pub(crate) struct Acb {
    pub id: ActorId,
    pub name: String,
    pub mailbox: Mailbox,
    pub cell: Mutex<Box<dyn CellObject>>,
    pub exit_reason: Mutex<Option<ExitReason>>,
    pub links: Mutex<HashSet<ActorId>>,
    pub monitors: Mutex<HashSet<ActorId>>,
    pub trap_exits: AtomicBool,
}

impl Acb {
    pub fn has_exited(&self) -> bool {
        self.exit_reason.lock().is_some()
    }
}
