pub mod atom;
pub mod behavior;
pub(crate) mod cell;
pub mod config;
pub mod error;
pub(crate) mod envelope;
pub mod flare;
pub mod id;
pub(crate) mod mailbox;
pub(crate) mod scheduler;
pub mod stream;
pub mod system;

pub use behavior::{Action, Behavior};
pub use cell::{ActorContext, ActorRef, Down, ExitSignal};
pub use envelope::{ExitReason, Sender};
pub use error::RuntimeError;
pub use flare::Flare;
pub use id::{ActorId, MessageId};
pub use stream::{new_stream, Ack, Produce, StreamComplete, Subscribed};
pub use system::{ActorSystem, ScopedActor};
