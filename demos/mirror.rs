//! Spawns a mirror actor and requests it reverse a string, blocking on the
//! reply from a scoped actor.

use std::time::Duration;

use nucleus::{Action, ActorSystem, Behavior};

fn main() {
    tracing_subscriber::fmt::init();

    let system = ActorSystem::new();

    let mirror = system.spawn(
        "mirror",
        (),
        Behavior::<()>::new().on(|_state: &mut (), _ctx, msg: String, _sender| {
            let reversed: String = msg.chars().rev().collect();
            Action::reply(reversed)
        }),
    );

    let scoped = system.scoped_actor();
    let reply: String = scoped
        .request(&mirror, Duration::from_secs(5), "Hello World!".to_string())
        .expect("mirror should reply before the timeout");

    println!("sent \"Hello World!\", mirror replied \"{reply}\"");

    system.shutdown();
}
