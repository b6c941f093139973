use std::time::Duration;

use nucleus::{ActorSystem, Behavior};

#[test]
fn mirror_request_completes_with_reversed_string() {
    let system = ActorSystem::new();

    let mirror = system.spawn(
        "mirror",
        (),
        Behavior::<()>::new().on(|_state: &mut (), ctx, msg: String, sender| {
            let reversed: String = msg.chars().rev().collect();
            let _ = sender;
            let _ = ctx;
            nucleus::Action::reply(reversed)
        }),
    );

    let scoped = system.scoped_actor();
    let reply: String = scoped
        .request(&mirror, Duration::from_secs(10), "Hello World!".to_string())
        .expect("request should succeed");

    assert_eq!(reply, "!dlroW olleH");

    system.shutdown();
}
