//! The actor system: registry, configuration, and shutdown coordination.
//! Generalizes the teacher's `kernel::provider` (`DashMap`-backed path
//! registry, `create_actor`) into the spec's flat id-keyed registry; the
//! teacher's root/user/system/temp guardian tree (`old_src/system/system.rs`)
//! is not reproduced; spec.md has no actor hierarchy.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::behavior::Behavior;
use crate::cell::{Acb, ActorContext, ActorRef, CellObject, Delivery, LifecycleHook, StatefulCell};
use crate::config::SystemConfig;
use crate::envelope::{Envelope, EnvelopeKind, ExitReason, Payload, ReplyOutcome, Sender};
use crate::error::RuntimeError;
use crate::id::{ActorId, IdAllocator, MessageId};
use crate::scheduler::{Scheduler, StealBackoff};

pub(crate) type SystemHandle = Arc<SystemInner>;

struct DeadLetterRecord {
    actor: ActorId,
}

struct PendingDeadline {
    owner: ActorId,
    message_id: MessageId,
    deadline: Instant,
}

pub(crate) struct SystemInner {
    pub registry: DashMap<ActorId, Arc<Acb>>,
    pub ids: IdAllocator,
    pub config: SystemConfig,
    pub scheduler: Scheduler,
    dead_letters: Mutex<VecDeque<DeadLetterRecord>>,
    deadlines: Mutex<Vec<PendingDeadline>>,
    shutting_down: AtomicBool,
}

const DEAD_LETTER_CAPACITY: usize = 1024;

impl SystemInner {
    pub fn lookup(&self, id: ActorId) -> Option<Arc<Acb>> {
        self.registry.get(&id).map(|e| e.clone())
    }

    /// Enqueues a user message. Sending to an unknown id is
    /// `no_such_destination`; sending to a known-but-terminated actor is a
    /// silent dead letter (spec §7), and both cases succeed without
    /// propagating an error for asynchronous sends, matching the contract
    /// that `tell` never fails observably for the caller.
    pub fn tell(self: &Arc<Self>, target: ActorId, sender: Option<ActorId>, payload: Payload, message_id: MessageId) {
        match self.lookup(target) {
            Some(acb) => {
                if acb.has_exited() {
                    self.record_dead_letter(target);
                    if message_id.is_request() {
                        if let Some(sender_id) = sender {
                            self.clone().reply(sender_id, message_id, ReplyOutcome::Error(RuntimeError::RequestReceiverDown));
                        }
                    }
                    return;
                }
                let was_empty = acb.mailbox.enqueue(Envelope {
                    sender,
                    kind: EnvelopeKind::User { payload, message_id },
                });
                if was_empty && acb.mailbox.mark_runnable() {
                    self.scheduler.submit(target);
                }
            }
            None => {
                trace!(target_id = target.get(), "send to unknown actor id");
                if message_id.is_request() {
                    if let Some(sender_id) = sender {
                        self.clone().reply(sender_id, message_id, ReplyOutcome::Error(RuntimeError::NoSuchDestination(target)));
                    }
                }
            }
        }
    }

    /// Delivers a reply/error/timeout outcome to the original requester.
    pub fn reply(self: &Arc<Self>, target: ActorId, message_id: MessageId, outcome: ReplyOutcome) {
        if let Some(acb) = self.lookup(target) {
            if acb.has_exited() {
                return;
            }
            let was_empty = acb.mailbox.enqueue(Envelope {
                sender: None,
                kind: EnvelopeKind::Reply { message_id, outcome },
            });
            if was_empty && acb.mailbox.mark_runnable() {
                self.scheduler.submit(target);
            }
        }
    }

    pub fn register_deadline(self: &Arc<Self>, owner: ActorId, message_id: MessageId, deadline: Instant) {
        self.deadlines.lock().push(PendingDeadline { owner, message_id, deadline });
    }

    pub fn record_dead_letter(&self, actor: ActorId) {
        let mut dl = self.dead_letters.lock();
        if dl.len() >= DEAD_LETTER_CAPACITY {
            dl.pop_front();
        }
        dl.push_back(DeadLetterRecord { actor });
        debug!(actor_id = actor.get(), "dead letter recorded");
    }

    pub fn dead_letter_count(&self) -> usize {
        self.dead_letters.lock().len()
    }

    /// Ids of actors that produced a dead letter, most recent first,
    /// bounded by the same ring capacity as the dead-letter log itself.
    pub fn dead_letter_actor_ids(&self) -> Vec<ActorId> {
        self.dead_letters.lock().iter().rev().map(|r| r.actor).collect()
    }

    pub fn link(&self, a: ActorId, b: ActorId) {
        if let (Some(acb_a), Some(acb_b)) = (self.lookup(a), self.lookup(b)) {
            acb_a.links.lock().insert(b);
            acb_b.links.lock().insert(a);
        }
    }

    pub fn unlink(&self, a: ActorId, b: ActorId) {
        if let Some(acb_a) = self.lookup(a) {
            acb_a.links.lock().remove(&b);
        }
        if let Some(acb_b) = self.lookup(b) {
            acb_b.links.lock().remove(&a);
        }
    }

    pub fn monitor(&self, watcher: ActorId, target: ActorId) {
        if let Some(acb) = self.lookup(target) {
            acb.monitors.lock().insert(watcher);
        }
    }

    pub fn demonitor(&self, watcher: ActorId, target: ActorId) {
        if let Some(acb) = self.lookup(target) {
            acb.monitors.lock().remove(&watcher);
        }
    }

    /// Terminates `id` with `reason`: sets the exit-reason latch exactly
    /// once, drains the mailbox to dead letters, and fans the exit out to
    /// links (subject to trap-exits/normal-reason suppression) and
    /// down-notifications to monitors (spec §4.5). Idempotent: a second
    /// call observes the latch already set and does nothing.
    pub fn terminate(self: &Arc<Self>, id: ActorId, reason: ExitReason) {
        let acb = match self.lookup(id) {
            Some(acb) => acb,
            None => return,
        };

        {
            let mut latch = acb.exit_reason.lock();
            if latch.is_some() {
                return;
            }
            *latch = Some(reason.clone());
        }

        let ctx = ActorContext::new(self.clone(), id);
        acb.cell.lock().stop(&ctx);

        acb.mailbox.drain_all(|_| {
            self.record_dead_letter(id);
        });

        let links = std::mem::take(&mut *acb.links.lock());
        for peer in links {
            self.unlink(id, peer);
            self.deliver_exit_signal(peer, id, reason.clone());
        }

        let monitors = std::mem::take(&mut *acb.monitors.lock());
        for watcher in monitors {
            self.deliver_down(watcher, id, reason.clone());
        }

        debug!(actor_id = id.get(), name = %acb.name, reason = ?reason, "actor terminated");
    }

    fn deliver_exit_signal(self: &Arc<Self>, peer: ActorId, from: ActorId, reason: ExitReason) {
        if let Some(peer_acb) = self.lookup(peer) {
            if peer_acb.has_exited() {
                return;
            }
            let was_empty = peer_acb.mailbox.enqueue(Envelope {
                sender: Some(from),
                kind: EnvelopeKind::Exit { from, reason },
            });
            if was_empty && peer_acb.mailbox.mark_runnable() {
                self.scheduler.submit(peer);
            }
        }
    }

    fn deliver_down(self: &Arc<Self>, watcher: ActorId, from: ActorId, reason: ExitReason) {
        if let Some(watcher_acb) = self.lookup(watcher) {
            if watcher_acb.has_exited() {
                return;
            }
            let was_empty = watcher_acb.mailbox.enqueue(Envelope {
                sender: Some(from),
                kind: EnvelopeKind::Down { from, reason },
            });
            if was_empty && watcher_acb.mailbox.mark_runnable() {
                self.scheduler.submit(watcher);
            }
        }
    }

    /// Applies §4.5's exit-signal semantics for a peer link: trapping
    /// actors receive the signal as an ordinary message; non-trapping
    /// actors ignore `normal` and otherwise cascade-terminate with `reason`.
    pub(crate) fn apply_exit_signal(self: &Arc<Self>, acb: &Arc<Acb>, from: ActorId, reason: ExitReason) {
        if acb.trap_exits.load(Ordering::Acquire) {
            let ctx = ActorContext::new(self.clone(), acb.id);
            let delivery = acb.cell.lock().handle_exit_as_message(&ctx, from, reason);
            if let Delivery::Quit(r) = delivery {
                self.terminate(acb.id, r);
            }
        } else if reason.is_normal() {
            // ignored: exits with `normal` do not cascade to non-trapping peers.
        } else {
            self.terminate(acb.id, reason);
        }
    }
}

fn deadline_sweep(system: &SystemHandle) {
    let expired: Vec<(ActorId, MessageId)> = {
        let mut deadlines = system.deadlines.lock();
        let now = Instant::now();
        let (due, keep): (Vec<_>, Vec<_>) = deadlines.drain(..).partition(|d| now >= d.deadline);
        *deadlines = keep;
        due.into_iter().map(|d| (d.owner, d.message_id)).collect()
    };
    for (owner, message_id) in expired {
        system.reply(owner, message_id, ReplyOutcome::Error(RuntimeError::Timeout { target: owner }));
    }
}

/// The embedding entry point: `system(config) -> System`.
pub struct ActorSystem {
    pub(crate) inner: SystemHandle,
    deadline_shutdown: Arc<AtomicBool>,
    deadline_thread: Option<std::thread::JoinHandle<()>>,
}

const DEADLINE_SWEEP_INTERVAL: Duration = Duration::from_millis(5);

impl ActorSystem {
    pub fn new() -> Self {
        Self::with_config(SystemConfig::load())
    }

    pub fn with_config(config: SystemConfig) -> Self {
        let backoff = StealBackoff {
            aggressive_poll_attempts: config.aggressive_poll_attempts,
            aggressive_steal_interval: config.aggressive_steal_interval,
            moderate_poll_attempts: config.moderate_poll_attempts,
        };
        let inner = Arc::new_cyclic(|weak: &std::sync::Weak<SystemInner>| SystemInner {
            registry: DashMap::new(),
            ids: IdAllocator::new(),
            scheduler: Scheduler::new(config.scheduler_max_threads, config.scheduler_max_throughput, backoff, weak.clone()),
            config,
            dead_letters: Mutex::new(VecDeque::new()),
            deadlines: Mutex::new(Vec::new()),
            shutting_down: AtomicBool::new(false),
        });

        let shutdown = Arc::new(AtomicBool::new(false));
        let sweep_system = inner.clone();
        let sweep_shutdown = shutdown.clone();
        let deadline_thread = std::thread::Builder::new()
            .name("nucleus-deadline-sweep".into())
            .spawn(move || {
                while !sweep_shutdown.load(Ordering::Acquire) {
                    deadline_sweep(&sweep_system);
                    std::thread::sleep(DEADLINE_SWEEP_INTERVAL);
                }
            })
            .expect("failed to spawn deadline-sweep thread");

        ActorSystem {
            inner,
            deadline_shutdown: shutdown,
            deadline_thread: Some(deadline_thread),
        }
    }

    pub fn config(&self) -> &SystemConfig {
        &self.inner.config
    }

    pub fn dead_letter_count(&self) -> usize {
        self.inner.dead_letter_count()
    }

    pub fn dead_letter_actor_ids(&self) -> Vec<ActorId> {
        self.inner.dead_letter_actor_ids()
    }

    pub fn spawn<S: Send + 'static>(&self, name: impl Into<String>, state: S, behavior: Behavior<S>) -> ActorRef {
        self.spawn_with(name, state, behavior, None, None)
    }

    pub fn spawn_with<S: Send + 'static>(
        &self,
        name: impl Into<String>,
        state: S,
        behavior: Behavior<S>,
        pre_start: Option<LifecycleHook<S>>,
        post_stop: Option<LifecycleHook<S>>,
    ) -> ActorRef {
        if self.inner.shutting_down.load(Ordering::Acquire) {
            warn!("spawn requested after shutdown; ignoring");
        }
        let id = self.inner.ids.next_actor_id();
        let cell: Box<dyn CellObject> = Box::new(StatefulCell::new(state, behavior, pre_start, post_stop));
        let acb = Arc::new(Acb {
            id,
            name: name.into(),
            mailbox: crate::mailbox::Mailbox::new(),
            cell: Mutex::new(cell),
            exit_reason: Mutex::new(None),
            links: Mutex::new(HashSet::new()),
            monitors: Mutex::new(HashSet::new()),
            trap_exits: AtomicBool::new(false),
        });
        self.inner.registry.insert(id, acb.clone());
        trace!(actor_id = id.get(), name = %acb.name, "actor spawned");

        let ctx = ActorContext::new(self.inner.clone(), id);
        acb.cell.lock().start(&ctx);

        ActorRef { id, system: self.inner.clone() }
    }

    /// Registers a lightweight, externally-driven actor whose envelopes are
    /// forwarded to the returned `ScopedActor` rather than dispatched on the
    /// worker pool, the "scoped actor ... driven by an external thread via
    /// blocking receive" of the glossary.
    pub fn scoped_actor(&self) -> ScopedActor {
        let id = self.inner.ids.next_actor_id();
        let (tx, rx) = mpsc::channel();
        let cell: Box<dyn CellObject> = Box::new(ScopedCell { tx, resolved: Mutex::new(HashSet::new()) });
        let acb = Arc::new(Acb {
            id,
            name: format!("scoped-{}", id.get()),
            mailbox: crate::mailbox::Mailbox::new(),
            cell: Mutex::new(cell),
            exit_reason: Mutex::new(None),
            links: Mutex::new(HashSet::new()),
            monitors: Mutex::new(HashSet::new()),
            trap_exits: AtomicBool::new(false),
        });
        self.inner.registry.insert(id, acb.clone());
        ScopedActor {
            actor_ref: ActorRef { id, system: self.inner.clone() },
            rx,
        }
    }

    /// Stops accepting new spawns, sends `normal` exits to every
    /// still-registered actor, and waits for every ACB to reach
    /// `terminated` before joining the scheduler's workers.
    pub fn shutdown(mut self) {
        self.inner.shutting_down.store(true, Ordering::Release);
        let ids: Vec<ActorId> = self.inner.registry.iter().map(|e| *e.key()).collect();
        for id in ids {
            self.inner.terminate(id, ExitReason::Normal);
        }

        let deadline = Instant::now() + Duration::from_secs(5);
        while self.inner.registry.iter().any(|e| !e.value().has_exited()) {
            if Instant::now() > deadline {
                warn!("shutdown timed out waiting for actors to terminate");
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }

        self.deadline_shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.deadline_thread.take() {
            let _ = handle.join();
        }
        self.inner.scheduler.shutdown();
    }
}

impl Default for ActorSystem {
    fn default() -> Self {
        ActorSystem::new()
    }
}

/// A lightweight handle for blocking request/response exchanges driven from
/// outside the worker pool (tests, `main`, CLI glue), the embedding API's
/// scoped actor. Not scheduled: its envelopes are forwarded directly to an
/// `mpsc` channel the owning thread polls.
pub struct ScopedActor {
    actor_ref: ActorRef,
    rx: mpsc::Receiver<ScopedMsg>,
}

pub(crate) enum ScopedMsg {
    Reply(MessageId, Result<Payload, RuntimeError>),
}

impl ScopedActor {
    pub fn actor_ref(&self) -> ActorRef {
        self.actor_ref.clone()
    }

    /// Sends a correlated request to `target` and blocks the calling
    /// thread until a reply, error, or timeout is observed.
    pub fn request<T, R>(&self, target: &ActorRef, timeout: Duration, payload: T) -> Result<R, RuntimeError>
    where
        T: Send + 'static,
        R: Send + 'static,
    {
        let message_id = self.actor_ref.system.ids.next_message_id();
        self.actor_ref
            .system
            .clone()
            .register_deadline(self.actor_ref.id, message_id, Instant::now() + timeout);
        self.actor_ref.system.clone().tell(
            target.id,
            Some(self.actor_ref.id),
            Payload::new(payload),
            message_id,
        );

        loop {
            match self.rx.recv_timeout(timeout + Duration::from_millis(50)) {
                Ok(ScopedMsg::Reply(id, outcome)) if id == message_id => {
                    return outcome.and_then(|p| p.downcast::<R>().map_err(|_| RuntimeError::UnexpectedMessage));
                }
                Ok(_) => continue, // a stale reply for an earlier, already-resolved request.
                Err(_) => return Err(RuntimeError::Timeout { target: target.id }),
            }
        }
    }
}

struct ScopedCell {
    tx: mpsc::Sender<ScopedMsg>,
    resolved: Mutex<HashSet<MessageId>>,
}

impl CellObject for ScopedCell {
    fn start(&mut self, _ctx: &ActorContext) {}
    fn stop(&mut self, _ctx: &ActorContext) {}

    fn handle_user(&mut self, _ctx: &ActorContext, _payload: Payload, _sender: Sender, _message_id: MessageId) -> Delivery {
        Delivery::Continue
    }

    fn handle_reply(&mut self, _ctx: &ActorContext, message_id: MessageId, outcome: Result<Payload, RuntimeError>) -> Delivery {
        let mut resolved = self.resolved.lock();
        if resolved.insert(message_id) {
            let _ = self.tx.send(ScopedMsg::Reply(message_id, outcome));
        }
        Delivery::Continue
    }

    fn handle_exit_as_message(&mut self, _ctx: &ActorContext, _from: ActorId, _reason: ExitReason) -> Delivery {
        Delivery::Continue
    }

    fn handle_down(&mut self, _ctx: &ActorContext, _from: ActorId, _reason: ExitReason) -> Delivery {
        Delivery::Continue
    }

    fn register_pending_erased(&mut self, _message_id: MessageId, _handler: Box<dyn std::any::Any + Send>) {}
}
