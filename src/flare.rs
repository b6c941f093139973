//! The flare actor: a blocking actor whose mailbox readiness is exposed as
//! a pollable file descriptor, grounded on
//! `original_source/libcaf_core/test/flare_actor.cpp`'s `detail::flare_actor`
//! (a self-pipe counter bumped on enqueue, drained on `receive`). Built the
//! same way `ScopedActor` in `system.rs` is: a `CellObject` that never runs
//! user behavior on the worker pool, only hands envelopes to an externally
//! driven thread.

use std::collections::{HashSet, VecDeque};
use std::convert::TryFrom;
use std::io;
use std::os::unix::io::RawFd;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::cell::{Acb, ActorContext, ActorRef, CellObject, Delivery};
use crate::envelope::{ExitReason, Payload, Sender};
use crate::error::RuntimeError;
use crate::id::{ActorId, MessageId};
use crate::mailbox::Mailbox;
use crate::system::ActorSystem;

/// A byte-counter self-pipe: one byte written per enqueued envelope, one
/// byte read per `receive`. Keeps `descriptor()` readable exactly while the
/// internal queue is non-empty (spec §4.6's invariant).
struct SelfPipe {
    read_fd: RawFd,
    write_fd: RawFd,
}

impl SelfPipe {
    fn new() -> io::Result<Self> {
        let mut fds = [0 as RawFd; 2];
        let rc = unsafe { libc::pipe(fds.as_mut_ptr()) };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(SelfPipe {
            read_fd: fds[0],
            write_fd: fds[1],
        })
    }

    fn bump(&self) {
        let byte: u8 = 1;
        loop {
            let rc = unsafe { libc::write(self.write_fd, &byte as *const u8 as *const _, 1) };
            if rc >= 0 {
                return;
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return;
            }
        }
    }

    /// Blocks until at least one byte is available, then consumes exactly
    /// one. A blocking read on the pipe is what makes `receive` a thread-
    /// level suspension point rather than a spin loop.
    fn drain_one(&self) {
        let mut byte: u8 = 0;
        loop {
            let rc = unsafe { libc::read(self.read_fd, &mut byte as *mut u8 as *mut _, 1) };
            if rc >= 0 {
                return;
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return;
            }
        }
    }
}

impl Drop for SelfPipe {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.read_fd);
            libc::close(self.write_fd);
        }
    }
}

struct FlareShared {
    queue: Mutex<VecDeque<Payload>>,
    pipe: SelfPipe,
}

/// `CellObject` face installed in the flare's ACB. Never inspects a
/// behavior stack; every user envelope is queued verbatim for the owning
/// thread's `receive` call, mirroring `ScopedCell`'s forwarding shape.
struct FlareCell {
    shared: Arc<FlareShared>,
}

impl CellObject for FlareCell {
    fn start(&mut self, _ctx: &ActorContext) {}
    fn stop(&mut self, _ctx: &ActorContext) {}

    fn handle_user(&mut self, _ctx: &ActorContext, payload: Payload, _sender: Sender, _message_id: MessageId) -> Delivery {
        self.shared.queue.lock().push_back(payload);
        self.shared.pipe.bump();
        Delivery::Continue
    }

    fn handle_reply(&mut self, _ctx: &ActorContext, _message_id: MessageId, _outcome: Result<Payload, RuntimeError>) -> Delivery {
        Delivery::Continue
    }

    fn handle_exit_as_message(&mut self, _ctx: &ActorContext, _from: ActorId, _reason: ExitReason) -> Delivery {
        Delivery::Continue
    }

    fn handle_down(&mut self, _ctx: &ActorContext, _from: ActorId, _reason: ExitReason) -> Delivery {
        Delivery::Continue
    }

    fn register_pending_erased(&mut self, _message_id: MessageId, _handler: Box<dyn std::any::Any + Send>) {
        // A flare actor never issues `request`; nothing is ever pending.
    }
}

/// A blocking actor whose mailbox readiness is visible to an external
/// poll/select loop via `descriptor()` (spec §4.6).
pub struct Flare {
    actor_ref: ActorRef,
    shared: Arc<FlareShared>,
}

impl Flare {
    pub fn actor_ref(&self) -> ActorRef {
        self.actor_ref.clone()
    }

    /// A readable handle: pollable with `libc::poll`/`select` the same way
    /// any other file descriptor is, readable iff at least one envelope is
    /// queued.
    pub fn descriptor(&self) -> RawFd {
        self.shared.pipe.read_fd
    }

    /// Polls `descriptor()` for up to `timeout`; a convenience wrapper
    /// around the `pollfd`/`POLLIN` check the original flare actor's own
    /// tests perform by hand.
    pub fn is_ready(&self, timeout: Duration) -> bool {
        let mut pfd = libc::pollfd {
            fd: self.shared.pipe.read_fd,
            events: libc::POLLIN,
            revents: 0,
        };
        let millis = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX);
        let rc = unsafe { libc::poll(&mut pfd, 1, millis) };
        rc == 1 && (pfd.revents & libc::POLLIN) != 0
    }

    /// Blocks the calling thread until an envelope of type `T` is
    /// available, dispatches it to `handler`, and decrements readiness.
    /// Envelopes of an unexpected type are dead-lettered and skipped.
    pub fn receive<T, R>(&self, handler: impl FnOnce(T) -> R) -> R
    where
        T: Send + 'static,
    {
        loop {
            self.shared.pipe.drain_one();
            let next = self.shared.queue.lock().pop_front();
            let Some(payload) = next else {
                // Spurious wakeup (e.g. the byte belonged to an envelope a
                // concurrent `receive` already consumed); go around again.
                continue;
            };
            match payload.downcast::<T>() {
                Ok(value) => return handler(value),
                Err(_unmatched) => {
                    self.actor_ref.system.record_dead_letter(self.actor_ref.id);
                    continue;
                }
            }
        }
    }
}

impl ActorSystem {
    /// Registers a flare actor: a non-scheduled actor, like `scoped_actor`,
    /// but one that additionally signals an OS-level descriptor on every
    /// enqueue so it can be driven from an external event loop instead of a
    /// known-in-advance request/response exchange.
    pub fn flare_actor(&self) -> Flare {
        let id = self.inner.ids.next_actor_id();
        let shared = Arc::new(FlareShared {
            queue: Mutex::new(VecDeque::new()),
            pipe: SelfPipe::new().expect("failed to create flare self-pipe"),
        });
        let cell: Box<dyn CellObject> = Box::new(FlareCell { shared: shared.clone() });
        let acb = Arc::new(Acb {
            id,
            name: format!("flare-{}", id.get()),
            mailbox: Mailbox::new(),
            cell: Mutex::new(cell),
            exit_reason: Mutex::new(None),
            links: Mutex::new(HashSet::new()),
            monitors: Mutex::new(HashSet::new()),
            trap_exits: AtomicBool::new(false),
        });
        self.inner.registry.insert(id, acb.clone());
        Flare {
            actor_ref: ActorRef { id, system: self.inner.clone() },
            shared,
        }
    }
}
