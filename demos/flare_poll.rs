//! Drives a flare actor from a chain of forwarding dispatchers, polling its
//! descriptor the way an external event loop would rather than calling
//! `receive` eagerly.

use std::time::Duration;

use nucleus::{Action, ActorRef, ActorSystem, Behavior};

fn main() {
    tracing_subscriber::fmt::init();

    let system = ActorSystem::new();
    let flare = system.flare_actor();
    let sink = flare.actor_ref();

    let dispatcher = system.spawn(
        "dispatcher",
        sink,
        Behavior::<ActorRef>::new().on(|sink: &mut ActorRef, ctx, i: i32, _sender| {
            std::thread::sleep(Duration::from_millis(50));
            ctx.send(sink, i);
            Action::Nothing
        }),
    );

    for i in 1..=5 {
        dispatcher.send(None, i);
    }

    println!("sent 5 values through a forwarding dispatcher");
    for _ in 1..=5 {
        while !flare.is_ready(Duration::from_millis(20)) {
            println!("flare not ready yet, polling again");
        }
        flare.receive::<i32, _>(|i| println!("flare received {i}"));
    }

    system.shutdown();
}
