//! Work-stealing worker pool: an explicit steal/park/quantum loop, unlike
//! the teacher's Tokio-task dispatch (`old_src/kernel/kernel.rs`'s
//! `dispatcher.execute`). Grounded on the Injector/Stealer/Worker layering
//! in `examples/other_examples/d1e3da53_snowdamiz-mesh-lang__...scheduler.rs`
//! and the named-thread, instrumented dispatch loop in
//! `examples/other_examples/2e6fbced_reifydb-reifydb__...pool.rs`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_deque::{Injector, Steal, Stealer, Worker};
use parking_lot::{Condvar, Mutex};
use rand::Rng;
use tracing::{debug, trace, warn};

use crate::cell::{ActorContext, Delivery};
use crate::envelope::{EnvelopeKind, ExitReason, ReplyOutcome};
use crate::id::ActorId;
use crate::system::SystemInner;

struct Parker {
    lock: Mutex<bool>, // true => a wakeup is pending
    cv: Condvar,
}

impl Parker {
    fn new() -> Self {
        Parker {
            lock: Mutex::new(false),
            cv: Condvar::new(),
        }
    }

    fn wake_all(&self) {
        let mut pending = self.lock.lock();
        *pending = true;
        self.cv.notify_all();
    }

    fn park_for(&self, timeout: Duration) {
        let mut pending = self.lock.lock();
        if !*pending {
            let _ = self.cv.wait_for(&mut pending, timeout);
        }
        *pending = false;
    }
}

pub(crate) struct Scheduler {
    injector: Arc<Injector<ActorId>>,
    parker: Arc<Parker>,
    shutdown: Arc<AtomicBool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

/// Governs how long an idle worker busy-polls before parking, mirroring
/// the `work-stealing.*` keys of spec §6.
#[derive(Clone, Copy)]
pub(crate) struct StealBackoff {
    pub aggressive_poll_attempts: u32,
    pub aggressive_steal_interval: u32,
    pub moderate_poll_attempts: u32,
}

impl Scheduler {
    pub fn new(num_threads: usize, quantum: u32, backoff: StealBackoff, system: Weak<SystemInner>) -> Self {
        let num_threads = num_threads.max(1);
        let injector = Arc::new(Injector::new());
        let parker = Arc::new(Parker::new());
        let shutdown = Arc::new(AtomicBool::new(false));

        let workers: Vec<Worker<ActorId>> = (0..num_threads).map(|_| Worker::new_fifo()).collect();
        let stealers: Vec<Stealer<ActorId>> = workers.iter().map(|w| w.stealer()).collect();

        let mut handles = Vec::with_capacity(num_threads);
        for (idx, local) in workers.into_iter().enumerate() {
            let injector = injector.clone();
            let stealers = stealers.clone();
            let parker = parker.clone();
            let shutdown = shutdown.clone();
            let system = system.clone();
            let handle = std::thread::Builder::new()
                .name(format!("nucleus-worker-{idx}"))
                .spawn(move || worker_loop(idx, local, injector, stealers, parker, shutdown, system, quantum, backoff))
                .expect("failed to spawn worker thread");
            handles.push(handle);
        }

        Scheduler {
            injector,
            parker,
            shutdown,
            handles: Mutex::new(handles),
        }
    }

    /// Submits an actor id to the shared overflow queue; called exactly
    /// once per non-runnable -> runnable transition (or on quantum-end
    /// resubmission while messages remain).
    pub fn submit(&self, id: ActorId) {
        self.injector.push(id);
        self.parker.wake_all();
    }

    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
        self.parker.wake_all();
        let mut handles = self.handles.lock();
        for h in handles.drain(..) {
            let _ = h.join();
        }
    }
}

/// Best-effort extraction of a panic payload's message, for the warning
/// logged when a handler panics (spec §7's `unhandled_exception`).
fn panic_message(payload: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "<non-string panic payload>".to_string()
    }
}

fn find_job(local: &Worker<ActorId>, injector: &Injector<ActorId>, stealers: &[Stealer<ActorId>]) -> Option<ActorId> {
    if let Some(job) = local.pop() {
        return Some(job);
    }
    loop {
        match injector.steal_batch_and_pop(local) {
            Steal::Success(job) => return Some(job),
            Steal::Retry => continue,
            Steal::Empty => break,
        }
    }
    if stealers.is_empty() {
        return None;
    }
    let start = rand::thread_rng().gen_range(0..stealers.len());
    for offset in 0..stealers.len() {
        let idx = (start + offset) % stealers.len();
        loop {
            match stealers[idx].steal_batch_and_pop(local) {
                Steal::Success(job) => return Some(job),
                Steal::Retry => continue,
                Steal::Empty => break,
            }
        }
    }
    None
}

/// Three-stage idle backoff: spin-poll aggressively, ease off to a short
/// sleep between polls, then park on the condvar until woken by a submit.
/// `empty_polls` counts consecutive misses and resets on any hit.
#[allow(clippy::too_many_arguments)]
fn worker_loop(
    idx: usize,
    local: Worker<ActorId>,
    injector: Arc<Injector<ActorId>>,
    stealers: Vec<Stealer<ActorId>>,
    parker: Arc<Parker>,
    shutdown: Arc<AtomicBool>,
    system: Weak<SystemInner>,
    quantum: u32,
    backoff: StealBackoff,
) {
    trace!(worker = idx, "worker started");
    let mut empty_polls: u32 = 0;
    while !shutdown.load(Ordering::Acquire) {
        match find_job(&local, &injector, &stealers) {
            Some(id) => {
                empty_polls = 0;
                let Some(system) = system.upgrade() else { break };
                run_quantum(&system, id, quantum);
            }
            None if empty_polls < backoff.aggressive_poll_attempts => {
                empty_polls += 1;
                if empty_polls.is_multiple_of(backoff.aggressive_steal_interval.max(1)) {
                    std::thread::yield_now();
                }
            }
            None if empty_polls < backoff.aggressive_poll_attempts + backoff.moderate_poll_attempts => {
                empty_polls += 1;
                std::thread::sleep(Duration::from_micros(100));
            }
            None => parker.park_for(Duration::from_millis(20)),
        }
    }
    debug!(worker = idx, "worker stopped");
}

/// Drives up to `quantum` envelopes through `id`'s current behavior, then
/// re-submits the actor if work remains or clears its runnable flag.
fn run_quantum(system: &Arc<SystemInner>, id: ActorId, quantum: u32) {
    let acb = match system.lookup(id) {
        Some(acb) => acb,
        None => return,
    };

    if !acb.mailbox.try_begin_execute() {
        // Scheduler invariant violation: two workers picked up the same
        // ACB. This is a bug, not a runtime condition (spec §7).
        panic!("actor {} was submitted to two workers concurrently", id);
    }

    let ctx = ActorContext::new(system.clone(), id);

    let mut processed = 0;
    let mut terminated = false;
    while processed < quantum {
        if acb.has_exited() {
            terminated = true;
            break;
        }
        let envelope = match acb.mailbox.try_dequeue() {
            Some(e) => e,
            None => break,
        };

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let mut cell = acb.cell.lock();
            match envelope.kind {
                EnvelopeKind::User { payload, message_id } => cell.handle_user(&ctx, payload, envelope.sender.map(|id| crate::cell::ActorRef { id, system: system.clone() }), message_id),
                EnvelopeKind::Reply { message_id, outcome } => {
                    let outcome = match outcome {
                        ReplyOutcome::Value(p) => Ok(p),
                        ReplyOutcome::Error(e) => Err(e),
                    };
                    cell.handle_reply(&ctx, message_id, outcome)
                }
                EnvelopeKind::Exit { from, reason } => {
                    drop(cell);
                    system.apply_exit_signal(&acb, from, reason);
                    Delivery::Continue
                }
                EnvelopeKind::Down { from, reason } => cell.handle_down(&ctx, from, reason),
            }
        }));

        processed += 1;

        // A panic inside a user handler terminates only this actor (spec
        // §7), not the worker thread that happened to be running it.
        let delivery = match outcome {
            Ok(delivery) => delivery,
            Err(payload) => {
                warn!(actor_id = id.get(), panic = %panic_message(&payload), "actor handler panicked");
                system.terminate(id, ExitReason::UnhandledException);
                terminated = true;
                break;
            }
        };

        // Continuations from any ctx.request() calls made during dispatch
        // above are queued rather than written straight into the cell
        // (that lock was held for the whole dispatch); apply them now that
        // it is free.
        let pending = ctx.take_pending_registrations();
        if !pending.is_empty() {
            let mut cell = acb.cell.lock();
            for reg in pending {
                cell.register_pending_erased(reg.message_id, reg.handler);
            }
        }

        if let Some(reason) = ctx.quit_requested.take() {
            system.terminate(id, reason);
            terminated = true;
            break;
        }

        if let Delivery::Quit(reason) = delivery {
            system.terminate(id, reason);
            terminated = true;
            break;
        }
    }

    acb.mailbox.end_execute();

    if terminated {
        return;
    }

    if acb.mailbox.has_msgs() {
        system.scheduler.submit(id);
    } else {
        acb.mailbox.clear_runnable();
        if acb.mailbox.has_msgs() && acb.mailbox.mark_runnable() {
            system.scheduler.submit(id);
        }
    }
}
