//! Credit-backpressured stream source/sink. No direct teacher equivalent
//! (`old_src/channel.rs` is pub/sub fan-out, not a single-producer credit
//! stream); the credit/ack shape here generalizes the teacher's
//! mailbox-dispatch loop (produce only as much as the consumer has granted)
//! the way a reactive-streams `Subscription::request(n)` gates a publisher.

use crate::behavior::{Action, Behavior};
use crate::cell::{ActorContext, ActorRef};
use crate::envelope::{ExitReason, Sender};
use crate::system::ActorSystem;

/// One round of production. The distilled spec's dual-purposed `skip()`
/// (no value this cycle vs. terminate) is split into two explicit tags,
/// see DESIGN.md's resolved Open Question.
pub enum Produce<T> {
    Produced(T),
    Pending,
    Complete,
}

/// Delivered once, at stream construction, so the sink learns which actor
/// to grant credit to.
pub struct Subscribed(pub ActorRef);

/// Grants `0` additional values of credit to a source.
pub struct Ack(pub usize);

/// Delivered to the sink after the last value, once every in-flight value
/// has already been delivered.
pub struct StreamComplete;

struct SourceState<T> {
    target: ActorRef,
    produce: Box<dyn FnMut() -> Produce<T> + Send>,
    credit: usize,
}

fn drain<T: Send + 'static>(state: &mut SourceState<T>, ctx: &ActorContext) -> Action<SourceState<T>> {
    while state.credit > 0 {
        match (state.produce)() {
            Produce::Produced(value) => {
                ctx.send(&state.target, value);
                state.credit -= 1;
            }
            Produce::Pending => break,
            Produce::Complete => {
                ctx.send(&state.target, StreamComplete);
                return Action::Quit(ExitReason::Normal);
            }
        }
    }
    Action::Nothing
}

/// Spawns a source actor driving `produce` under credit-based backpressure
/// from `target` (spec §4.7): the source announces itself to `target` via
/// `Subscribed`, produces nothing until `target` grants credit with `Ack`,
/// delivers each produced value to `target` as an ordinary envelope (so
/// per-(source,sink) FIFO ordering falls out of the mailbox's own
/// guarantee), and quits once `produce` yields `Complete`, after the
/// sink has seen every value already in flight.
pub fn new_stream<T, P>(system: &ActorSystem, target: ActorRef, produce: P) -> ActorRef
where
    T: Send + 'static,
    P: FnMut() -> Produce<T> + Send + 'static,
{
    let announce_to = target.clone();
    system.spawn_with(
        "stream-source",
        SourceState {
            target,
            produce: Box::new(produce),
            credit: 0,
        },
        Behavior::new().on(|state: &mut SourceState<T>, ctx, Ack(n): Ack, _sender: Sender| {
            state.credit += n;
            drain(state, ctx)
        }),
        Some(Box::new(move |_state, ctx| {
            ctx.send(&announce_to, Subscribed(ctx.myself()));
        })),
        None,
    )
}

impl ActorSystem {
    /// Convenience entry point mirroring the embedding API's
    /// `new_stream(target, produce)`.
    pub fn new_stream<T, P>(&self, target: ActorRef, produce: P) -> ActorRef
    where
        T: Send + 'static,
        P: FnMut() -> Produce<T> + Send + 'static,
    {
        new_stream(self, target, produce)
    }
}
