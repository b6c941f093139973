use std::time::Duration;

use nucleus::{ActorSystem, Behavior};

#[test]
fn direct_flare_tracks_readiness_per_message() {
    let system = ActorSystem::new();
    let flare = system.flare_actor();

    assert!(!flare.is_ready(Duration::from_millis(50)));

    flare.actor_ref().send(None, 42i32);
    assert!(flare.is_ready(Duration::from_millis(200)));
    flare.receive::<i32, _>(|i| assert_eq!(i, 42));
    assert!(!flare.is_ready(Duration::from_millis(50)));

    flare.actor_ref().send(None, 42i32);
    flare.actor_ref().send(None, 43i32);
    flare.actor_ref().send(None, 44i32);
    assert!(flare.is_ready(Duration::from_millis(200)));
    flare.receive::<i32, _>(|i| assert_eq!(i, 42));
    assert!(flare.is_ready(Duration::from_millis(50)));
    flare.receive::<i32, _>(|i| assert_eq!(i, 43));
    assert!(flare.is_ready(Duration::from_millis(50)));
    flare.receive::<i32, _>(|i| assert_eq!(i, 44));
    assert!(!flare.is_ready(Duration::from_millis(50)));

    system.shutdown();
}

#[test]
fn indirect_flare_through_dispatcher_chain() {
    let system = ActorSystem::new();
    let flare = system.flare_actor();
    let sink = flare.actor_ref();

    let c = system.spawn(
        "dispatcher-c",
        sink,
        Behavior::<nucleus::ActorRef>::new().on(|sink: &mut nucleus::ActorRef, ctx, i: i32, _sender| {
            std::thread::sleep(Duration::from_millis(100));
            ctx.send(sink, i);
            nucleus::Action::Nothing
        }),
    );
    let b = system.spawn(
        "dispatcher-b",
        c,
        Behavior::<nucleus::ActorRef>::new().on(|next: &mut nucleus::ActorRef, ctx, i: i32, _sender| {
            std::thread::sleep(Duration::from_millis(100));
            ctx.send(next, i);
            nucleus::Action::Nothing
        }),
    );
    let a = system.spawn(
        "dispatcher-a",
        b,
        Behavior::<nucleus::ActorRef>::new().on(|next: &mut nucleus::ActorRef, ctx, i: i32, _sender| {
            std::thread::sleep(Duration::from_millis(100));
            ctx.send(next, i);
            nucleus::Action::Nothing
        }),
    );

    a.send(None, 42i32);
    assert!(flare.is_ready(Duration::from_secs(1)));
    flare.receive::<i32, _>(|i| assert_eq!(i, 42));
    assert!(!flare.is_ready(Duration::from_millis(50)));

    a.send(None, 42i32);
    a.send(None, 43i32);
    a.send(None, 44i32);
    assert!(flare.is_ready(Duration::from_secs(1)));
    flare.receive::<i32, _>(|i| assert_eq!(i, 42));
    assert!(flare.is_ready(Duration::from_secs(1)));
    flare.receive::<i32, _>(|i| assert_eq!(i, 43));
    assert!(flare.is_ready(Duration::from_secs(1)));
    flare.receive::<i32, _>(|i| assert_eq!(i, 44));
    assert!(!flare.is_ready(Duration::from_millis(50)));

    system.shutdown();
}
