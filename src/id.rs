use std::sync::atomic::{AtomicU64, Ordering};

/// Dense actor identifier, unique within a system and never reused during
/// the system's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActorId(pub(crate) u64);

impl ActorId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ActorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Correlation id for a request/response exchange. `0` means "no reply
/// expected" (a fire-and-forget send).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageId(pub(crate) u64);

impl MessageId {
    pub const NONE: MessageId = MessageId(0);

    pub fn is_request(self) -> bool {
        self.0 != 0
    }
}

#[derive(Debug, Default)]
pub(crate) struct IdAllocator {
    next_actor: AtomicU64,
    next_message: AtomicU64,
}

impl IdAllocator {
    pub fn new() -> Self {
        IdAllocator {
            // ids start at 1 so that ActorId(0) can stay reserved/invalid.
            next_actor: AtomicU64::new(1),
            next_message: AtomicU64::new(1),
        }
    }

    pub fn next_actor_id(&self) -> ActorId {
        ActorId(self.next_actor.fetch_add(1, Ordering::Relaxed))
    }

    pub fn next_message_id(&self) -> MessageId {
        MessageId(self.next_message.fetch_add(1, Ordering::Relaxed))
    }
}
