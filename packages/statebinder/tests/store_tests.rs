//! Integration tests for state protection, commits and event ordering.

use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use statebinder::{args, EventKind, Listener, ModuleDef, StateEntry, Store, StoreError, StoreEvent};

fn counter_def() -> ModuleDef {
    ModuleDef::new()
        .state(json!({ "a": 0, "b": "text" }))
        .mutation("increment", |state, args| {
            let by = args.first().and_then(Value::as_i64).unwrap_or(1);
            state.set("a", state.get_i64("a").unwrap_or(0) + by)?;
            Ok(())
        })
        .mutation("removeB", |state, _| {
            state.delete("b")?;
            Ok(())
        })
}

/// Log of event kind names plus markers pushed by mutation bodies.
fn log_listener(log: &Arc<Mutex<Vec<String>>>) -> Listener {
    let log = log.clone();
    Listener::new(move |_, event| log.lock().unwrap().push(event.kind().to_string()))
}

#[test]
fn write_outside_commit_fails() {
    let store = Store::new(counter_def()).unwrap();

    let err = store.state().set("a", 5).unwrap_err();
    assert!(matches!(err, StoreError::StateFrozen { ref key } if key == "a"));
    assert!(err.to_string().contains("frozen"));

    assert!(store.state().delete("b").is_err());
    assert_eq!(store.state().get("a").unwrap(), json!(0));
    assert_eq!(store.state().get("b").unwrap(), json!("text"));
}

#[test]
fn write_inside_mutation_is_visible_afterwards() {
    let store = Store::new(counter_def()).unwrap();

    store.commit("increment", args![1]).unwrap();
    assert_eq!(store.state().get_i64("a"), Some(1));

    store.commit("increment", args![4]).unwrap();
    assert_eq!(store.state().get_i64("a"), Some(5));

    store.commit("removeB", args![]).unwrap();
    assert!(store.state().get("b").is_none());
}

#[test]
fn nested_values_are_sealed_all_the_way_down() {
    let store = Store::new(ModuleDef::new().state(json!({ "a": { "b": { "c": { "d": null } } } })))
        .unwrap();

    let a = match store.state().get("a").unwrap() {
        StateEntry::Frozen(frozen) => frozen,
        other => panic!("Expected a sealed value, got {other:?}"),
    };
    let d = a.get("b").and_then(|b| b.get("c")).and_then(|c| c.get("d")).unwrap();
    assert!(d.is_null());
    assert_eq!(a.to_value(), json!({ "b": { "c": { "d": null } } }));
}

#[test]
fn overly_deep_state_is_rejected() {
    let mut value = json!(null);
    for _ in 0..=statebinder::MAX_STATE_DEPTH {
        value = json!({ "next": value });
    }

    let err = Store::new(ModuleDef::new().state(json!({ "deep": value }))).unwrap_err();
    assert!(matches!(err, StoreError::StateTooDeep { .. }));
}

#[test]
fn missing_mutation_is_named() {
    let store = Store::new(counter_def()).unwrap();

    let err = store.commit("doesNotExist", args![]).unwrap_err();
    assert!(err.is_lookup());
    match err {
        StoreError::MutationNotFound { name } => assert_eq!(name, "doesNotExist"),
        other => panic!("Expected MutationNotFound, got {other:?}"),
    }
}

#[test]
fn commit_events_wrap_the_mutation_body() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let marker = log.clone();
    let store = Store::new(ModuleDef::new().state(json!({ "x": 1 })).mutation(
        "swap",
        move |state, _| {
            marker.lock().unwrap().push("body".to_string());
            state.set("y", 2)?;
            state.delete("x")?;
            Ok(())
        },
    ))
    .unwrap();

    let listener = log_listener(&log);
    for kind in [
        EventKind::BeforeCommit,
        EventKind::Set,
        EventKind::Delete,
        EventKind::Commit,
    ] {
        store.on(kind, listener.clone());
    }
    log.lock().unwrap().clear();

    store.commit("swap", args![]).unwrap();

    assert_eq!(
        *log.lock().unwrap(),
        vec!["beforecommit", "body", "set", "delete", "commit"]
    );
}

#[test]
fn set_events_carry_old_and_new_values() {
    let store = Store::new(counter_def()).unwrap();
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    store.on(
        EventKind::Set,
        Listener::new(move |_, event| sink.lock().unwrap().push(event.clone())),
    );

    store.commit("increment", args![3]).unwrap();

    let events = events.lock().unwrap();
    match &events[..] {
        [StoreEvent::Set { prop, value, old }] => {
            assert_eq!(prop, "a");
            assert_eq!(value, &json!(3));
            assert_eq!(old, &Some(json!(0)));
        }
        other => panic!("Expected one Set event, got {other:?}"),
    }
}

#[test]
fn listener_registered_twice_runs_once() {
    let store = Store::new(counter_def()).unwrap();
    let log = Arc::new(Mutex::new(Vec::new()));
    let listener = log_listener(&log);

    store.on(EventKind::Commit, listener.clone());
    store.on(EventKind::Commit, listener.clone());
    store.commit("increment", args![]).unwrap();

    assert_eq!(*log.lock().unwrap(), vec!["commit"]);
}

#[test]
fn unsubscribe_stops_delivery() {
    let store = Store::new(counter_def()).unwrap();
    let log = Arc::new(Mutex::new(Vec::new()));
    let removals = Arc::new(Mutex::new(Vec::new()));
    store.on(EventKind::RemoveListener, log_listener(&removals));

    let subscription = store.on(EventKind::Commit, log_listener(&log));
    store.commit("increment", args![]).unwrap();
    subscription.unsubscribe();
    subscription.unsubscribe();
    store.commit("increment", args![]).unwrap();

    assert_eq!(log.lock().unwrap().len(), 1);
    assert_eq!(*removals.lock().unwrap(), vec!["removelistener"]);
}

#[test]
fn event_kinds_parse_from_wire_names() {
    assert_eq!("beforecommit".parse::<EventKind>().unwrap(), EventKind::BeforeCommit);
    assert_eq!(
        "unregisterModule".parse::<EventKind>().unwrap(),
        EventKind::UnregisterModule
    );
    assert!(matches!(
        "bogus".parse::<EventKind>(),
        Err(StoreError::EventNotFound { ref name }) if name == "bogus"
    ));
}

#[test]
fn freeze_can_be_disabled() {
    let store = Store::new(
        ModuleDef::new()
            .state(json!({ "list": [1, 2] }))
            .should_freeze(false),
    )
    .unwrap();

    match store.state().get("list").unwrap() {
        StateEntry::Raw(mut copy) => {
            copy.as_array_mut().unwrap().push(json!(3));
            assert_eq!(store.state().get("list").unwrap(), json!([1, 2]));
        }
        other => panic!("Expected a raw copy, got {other:?}"),
    }
    assert!(store.state().set("list", json!([])).is_err());
}

#[test]
fn state_factory_gives_each_store_its_own_state() {
    let def = counter_def().state_fn(|| json!({ "a": 10 }));
    let first = Store::new(def.clone()).unwrap();
    let second = Store::new(def).unwrap();

    first.commit("increment", args![]).unwrap();
    assert_eq!(first.state().get_i64("a"), Some(11));
    assert_eq!(second.state().get_i64("a"), Some(10));
}
