use std::collections::HashMap;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use nucleus::{Ack, ActorSystem, Behavior, Produce, StreamComplete, Subscribed};

const NUM_SOURCES: i32 = 20;
const NUM_MSGS: i32 = 1000;
const WINDOW: usize = 8;

struct SinkState {
    seen: Arc<Mutex<HashMap<u64, Vec<i32>>>>,
    total: Arc<Mutex<usize>>,
    completed: usize,
    done_tx: mpsc::Sender<()>,
}

#[test]
fn twenty_sources_deliver_all_values_in_order_with_no_duplicates() {
    let system = ActorSystem::new();
    let (done_tx, done_rx) = mpsc::channel();
    let seen = Arc::new(Mutex::new(HashMap::new()));
    let total = Arc::new(Mutex::new(0usize));

    let sink = system.spawn(
        "sink",
        SinkState {
            seen: seen.clone(),
            total: total.clone(),
            completed: 0,
            done_tx,
        },
        Behavior::<SinkState>::new()
            .on(|_state: &mut SinkState, ctx, Subscribed(source): Subscribed, _sender| {
                ctx.send(&source, Ack(WINDOW));
                nucleus::Action::Nothing
            })
            .on(|state: &mut SinkState, ctx, value: i32, sender| {
                *state.total.lock() += 1;
                let source = sender.expect("values always carry their source as sender");
                state.seen.lock().entry(source.id().get()).or_default().push(value);
                ctx.send(&source, Ack(1));
                nucleus::Action::Nothing
            })
            .on(|state: &mut SinkState, _ctx, _msg: StreamComplete, _sender| {
                state.completed += 1;
                if state.completed == NUM_SOURCES as usize {
                    let _ = state.done_tx.send(());
                }
                nucleus::Action::Nothing
            }),
    );

    for _ in 0..NUM_SOURCES {
        let mut next = 0i32;
        nucleus::new_stream(&system, sink.clone(), move || {
            if next < NUM_MSGS {
                let v = next;
                next += 1;
                Produce::Produced(v)
            } else {
                Produce::Complete
            }
        });
    }

    done_rx
        .recv_timeout(Duration::from_secs(10))
        .expect("all sources should complete within the deadline");

    // Give the sink a moment to drain the handful of envelopes that may
    // still be in flight right after the completion count hit 20.
    std::thread::sleep(Duration::from_millis(50));

    assert_eq!(*total.lock(), (NUM_SOURCES * NUM_MSGS) as usize);

    let seen = seen.lock();
    assert_eq!(seen.len(), NUM_SOURCES as usize);
    for values in seen.values() {
        let expected: Vec<i32> = (0..NUM_MSGS).collect();
        assert_eq!(values, &expected, "a source's values must arrive in production order with no gaps or duplicates");
    }

    system.shutdown();
}
