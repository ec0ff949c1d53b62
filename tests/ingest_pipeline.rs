//! End-to-end tests of the ingestion pipeline without a network.
//!
//! Payloads are fed straight into a `DashContext`, exactly as the client task does with
//! the messages it receives from the bridge.

use racedash::dispatch::FnConsumer;
use racedash::metrics::{BarMode, PositionBarEngine, Published};
use racedash::persistence::{FileStorage, GRAPH_KEYS_KEY, KeyValueStore, STATE_JSON_KEY};
use racedash::tracker::{GraphCommand, GraphsEngine};
use racedash::{DashContext, PauseState, ProtocolVersion, VersionStatus};
use serde_json::{Value, json};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

fn payload(position: i32, speed: f64) -> String {
    json!({
        "VersionMajor": 2,
        "VersionMinor": 11,
        "SessionType": 2,
        "SessionPhase": 5,
        "StartLights": 6,
        "PitState": 0,
        "LayoutLength": 1000.0,
        "LapDistance": 950.0,
        "Position": position,
        "CarSpeed": speed,
        "VehicleInfo": { "SlotId": 1, "ClassPerformanceIndex": 7 },
        "DriverData": [
            {
                "DriverInfo": { "SlotId": 1, "ClassPerformanceIndex": 7, "Name": "UGxheWVy" },
                "Place": position,
                "LapDistance": 950.0
            },
            {
                "DriverInfo": { "SlotId": 2, "ClassPerformanceIndex": 7, "Name": "Uml2YWw=" },
                "Place": 1,
                "LapDistance": 20.0
            }
        ]
    })
    .to_string()
}

#[test]
fn a_failing_consumer_does_not_stop_the_others() {
    let mut context = DashContext::in_memory();
    let calls = Arc::new(AtomicUsize::new(0));

    let before = Arc::clone(&calls);
    context.register(Box::new(FnConsumer::new("before", move |_| {
        before.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })));
    context.register(Box::new(FnConsumer::new("broken", |_| anyhow::bail!("renderer gone"))));
    context.register(Box::new(FnConsumer::new("panicking", |_| panic!("index out of bounds"))));
    let after = Arc::clone(&calls);
    context.register(Box::new(FnConsumer::new("after", move |_| {
        after.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })));

    for position in 1..=3 {
        let report = context.handle_message(&payload(position, 50.0)).unwrap();
        assert_eq!(report.invoked, 4);
        assert_eq!(report.failed, 2);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 6);
}

#[test]
fn relative_bar_wraps_around_the_line() {
    let mut context = DashContext::in_memory();
    let (consumer, view) = Published::new(PositionBarEngine::new(BarMode::Relative));
    context.register(Box::new(consumer));

    context.handle_message(&payload(2, 50.0));

    let view = view.borrow();
    assert!(view.visible);
    let names: Vec<&str> = view.drivers.iter().map(|d| d.display_name.as_str()).collect();
    assert_eq!(names, vec!["Player", "Rival"]);
    assert!(view.drivers[0].is_user);
    assert_eq!(view.drivers[1].gap_text.as_deref(), Some("+70m"));
}

#[test]
fn dumped_state_round_trips_through_an_override() {
    let dir = tempfile::tempdir().unwrap();
    let storage: Arc<dyn KeyValueStore> = Arc::new(FileStorage::open(dir.path()).unwrap());

    let mut context = DashContext::new(Arc::clone(&storage), ProtocolVersion::default());
    context.handle_message(&payload(4, 50.0));
    let original = context.current().unwrap();
    let dump = context.dump_state();

    let mut fresh = DashContext::new(Arc::clone(&storage), ProtocolVersion::default());
    fresh.install_override(&dump).unwrap();
    fresh.handle_message(&payload(9, 80.0));
    assert_eq!(*fresh.current().unwrap(), *original);
    drop(fresh);

    // The override survives a restart through the persisted envelope
    let envelope: Value =
        serde_json::from_str(&storage.get(STATE_JSON_KEY).unwrap().unwrap()).unwrap();
    assert_eq!(envelope["format"], 1);

    let mut restarted = DashContext::new(Arc::clone(&storage), ProtocolVersion::default());
    restarted.handle_message(&payload(9, 80.0));
    assert_eq!(*restarted.current().unwrap(), *original);

    assert!(restarted.clear_override().unwrap());
    assert!(storage.get(STATE_JSON_KEY).unwrap().is_none());
}

#[test]
fn pause_freezes_dispatch_on_the_last_snapshot() {
    let mut context = DashContext::in_memory();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&seen);
    context.register(Box::new(FnConsumer::new("positions", move |cx| {
        log.lock().unwrap().push(cx.snapshot.position);
        Ok(())
    })));

    context.handle_message(&payload(3, 50.0));
    assert_eq!(context.toggle_pause().unwrap(), PauseState::Paused);
    context.handle_message(&payload(5, 50.0));
    assert_eq!(context.toggle_pause().unwrap(), PauseState::Resumed);
    context.handle_message(&payload(6, 50.0));

    assert_eq!(*seen.lock().unwrap(), vec![3, 3, 6]);
}

#[test]
fn version_mismatch_is_reported() {
    let mut context = DashContext::new(
        Arc::new(racedash::persistence::MemoryStorage::new()),
        ProtocolVersion { major: 3, minor: 0 },
    );
    assert_eq!(context.version_status(), VersionStatus::Unknown);

    context.handle_message(&payload(1, 50.0));
    assert!(matches!(context.version_status(), VersionStatus::Mismatch { .. }));
}

#[test]
fn graphs_track_selected_fields_and_persist_the_selection() {
    let dir = tempfile::tempdir().unwrap();
    let storage: Arc<dyn KeyValueStore> = Arc::new(FileStorage::open(dir.path()).unwrap());

    let mut context = DashContext::in_memory();
    let (engine, control) = GraphsEngine::with_storage(5, Arc::clone(&storage));
    let (consumer, view) = Published::new(engine);
    context.register(Box::new(consumer));

    assert!(control.send(GraphCommand::Select(vec!["CarSpeed".to_string(), "Fuel".to_string()])));
    for speed in 1..=8 {
        context.handle_message(&payload(1, speed as f64));
    }

    {
        let view = view.borrow();
        assert_eq!(view.series.len(), 1);
        let speed = &view.series[0];
        assert_eq!(speed.path, "CarSpeed");
        assert_eq!(speed.samples, vec![4.0, 5.0, 6.0, 7.0, 8.0]);
        assert_eq!((speed.min, speed.max), (1.0, 8.0));
        assert_eq!(view.pending, vec!["Fuel".to_string()]);
    }

    let persisted = storage.get(GRAPH_KEYS_KEY).unwrap().unwrap();
    assert_eq!(persisted, r#"["CarSpeed","Fuel"]"#);

    // A new engine picks the selection back up
    let (engine, _control) = GraphsEngine::with_storage(5, Arc::clone(&storage));
    assert_eq!(engine.tracker().pending(), ["CarSpeed".to_string(), "Fuel".to_string()]);
}
