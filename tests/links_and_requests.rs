use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use nucleus::{Action, ActorSystem, Behavior, Down, ExitReason};

struct Go;

#[test]
fn link_propagation_terminates_peer_and_monitor_sees_one_down() {
    let system = ActorSystem::new();

    let (b_done_tx, b_done_rx) = mpsc::channel();
    let b = system.spawn_with(
        "b",
        (),
        Behavior::<()>::new(),
        None,
        Some(Box::new(move |_state: &mut (), _ctx| {
            let _ = b_done_tx.send(());
        })),
    );

    let b_for_link = b.clone();
    let a = system.spawn_with(
        "a",
        (),
        Behavior::<()>::new().on(|_state: &mut (), ctx, _go: Go, _sender| {
            ctx.quit(ExitReason::User(7));
            Action::Nothing
        }),
        Some(Box::new(move |_state: &mut (), ctx| {
            ctx.link(&b_for_link);
        })),
        None,
    );

    let down_count = Arc::new(AtomicUsize::new(0));
    let (down_tx, down_rx) = mpsc::channel();
    let a_for_monitor = a.clone();
    let _c = system.spawn_with(
        "c",
        down_count.clone(),
        Behavior::<Arc<AtomicUsize>>::new().on(move |state: &mut Arc<AtomicUsize>, _ctx, down: Down, _sender| {
            state.fetch_add(1, Ordering::SeqCst);
            assert_eq!(down.reason, ExitReason::User(7));
            let _ = down_tx.send(());
            Action::Nothing
        }),
        Some(Box::new(move |_state, ctx| {
            ctx.monitor(&a_for_monitor);
        })),
        None,
    );

    a.send(None, Go);

    b_done_rx
        .recv_timeout(Duration::from_secs(2))
        .expect("b should terminate with a's reason via the link");
    down_rx
        .recv_timeout(Duration::from_secs(2))
        .expect("c should observe a's down notification");

    // A second down notification (e.g. from cyclic re-delivery) would
    // arrive well within this window.
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(down_count.load(Ordering::SeqCst), 1, "monitor must see exactly one down notification");

    system.shutdown();
}

#[test]
fn handler_panic_terminates_actor_and_propagates_to_links() {
    let system = ActorSystem::new();

    let (down_tx, down_rx) = mpsc::channel();
    let victim = system.spawn("victim", (), Behavior::<()>::new().on(|_state: &mut (), _ctx, _go: Go, _sender| panic!("boom")));

    let victim_for_monitor = victim.clone();
    let _watcher = system.spawn_with(
        "watcher",
        (),
        Behavior::<()>::new().on(move |_state: &mut (), _ctx, down: Down, _sender| {
            let _ = down_tx.send(down.reason);
            Action::Nothing
        }),
        Some(Box::new(move |_state: &mut (), ctx| {
            ctx.monitor(&victim_for_monitor);
        })),
        None,
    );

    victim.send(None, Go);

    let reason = down_rx.recv_timeout(Duration::from_secs(2)).expect("watcher should see the victim terminate");
    assert_eq!(reason, ExitReason::UnhandledException);

    system.shutdown();
}

#[test]
fn request_to_silent_actor_times_out_within_quantum_skew() {
    let system = ActorSystem::new();
    let silent = system.spawn(
        "silent",
        (),
        Behavior::<()>::new().on(|_state: &mut (), _ctx, _msg: String, _sender| Action::Nothing),
    );

    let scoped = system.scoped_actor();
    let start = Instant::now();
    let result: Result<(), nucleus::RuntimeError> = scoped.request(&silent, Duration::from_millis(50), "hello".to_string());
    let elapsed = start.elapsed();

    assert!(matches!(result, Err(nucleus::RuntimeError::Timeout { .. })));
    assert!(elapsed >= Duration::from_millis(50), "timeout fired too early: {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(500), "timeout fired far outside quantum skew: {:?}", elapsed);

    system.shutdown();
}

#[test]
fn ctx_request_from_inside_a_handler_does_not_deadlock() {
    let system = ActorSystem::new();

    let responder = system.spawn(
        "responder",
        (),
        Behavior::<()>::new().on(|_state: &mut (), _ctx, msg: String, _sender| {
            let reversed: String = msg.chars().rev().collect();
            Action::reply(reversed)
        }),
    );

    let (reply_tx, reply_rx) = mpsc::channel();
    let caller = system.spawn(
        "caller",
        (),
        Behavior::<()>::new().on(move |_state: &mut (), ctx, _go: Go, _sender| {
            let reply_tx = reply_tx.clone();
            ctx.request(&responder, Duration::from_secs(2), "hello".to_string(), move |_state: &mut (), _ctx, result: Result<String, nucleus::RuntimeError>| {
                let _ = reply_tx.send(result);
                Action::Nothing
            });
            Action::Nothing
        }),
    );

    caller.send(None, Go);

    let result = reply_rx.recv_timeout(Duration::from_secs(2)).expect("continuation should run once the reply arrives");
    assert_eq!(result.expect("responder should reply"), "olleh".to_string());

    system.shutdown();
}

#[test]
fn skip_then_become_preserves_the_original_message() {
    let system = ActorSystem::new();

    struct Open;

    let gate = system.spawn(
        "gate",
        (),
        Behavior::<()>::new()
            .on(|_state: &mut (), _ctx, msg: String, _sender| Action::skip(msg))
            .on(|_state: &mut (), _ctx, _open: Open, _sender| {
                Action::Become(Behavior::<()>::new().on(|_state: &mut (), _ctx, msg: String, _sender| Action::reply(msg)))
            }),
    );

    let scoped = system.scoped_actor();
    let gate_for_request = gate.clone();
    let handle = std::thread::spawn(move || scoped.request::<String, String>(&gate_for_request, Duration::from_secs(2), "hello".to_string()));

    // Give the request envelope time to land and be skipped into the
    // deferred sub-queue before triggering the become that reinjects it.
    std::thread::sleep(Duration::from_millis(100));
    gate.send(None, Open);

    let result = handle.join().expect("request thread should not panic");
    assert_eq!(
        result.expect("gate should reply once opened"),
        "hello".to_string(),
        "the deferred envelope's original payload must survive become"
    );

    system.shutdown();
}
