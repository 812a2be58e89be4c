//! Integration tests for namespaced modules, getters and plugins.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use statebinder::{args, EventKind, Listener, ModuleDef, Plugin, Store, StoreError, StoreEvent};

fn change_module() -> ModuleDef {
    ModuleDef::new()
        .state(json!({ "value": "initial" }))
        .mutation("change", |state, args| {
            let next = args.first().cloned().unwrap_or(Value::Null);
            state.set("value", next)?;
            Ok(())
        })
}

fn items_module() -> ModuleDef {
    ModuleDef::new()
        .state(json!({ "items": ["a", "b"] }))
        .getter("items", |state, _, _, _| {
            state.get_value("items").unwrap_or_else(|| json!([]))
        })
        .getter("length", |_, getters, _, _| {
            let items = getters.get("items").unwrap_or_else(|| json!([]));
            json!(items.as_array().map_or(0, Vec::len))
        })
}

#[test]
fn namespaced_commit_changes_only_that_module() {
    let store = Store::new(ModuleDef::new().state(json!({ "value": "root" }))).unwrap();
    store.register_module("my.module", change_module()).unwrap();
    store.register_module("other", change_module()).unwrap();

    store.commit("my.module.change", args!["changed"]).unwrap();

    let module = store.module("my.module").unwrap();
    assert_eq!(module.state().get_value("value"), Some(json!("changed")));
    assert_eq!(
        store.module("other").unwrap().state().get_value("value"),
        Some(json!("initial"))
    );
    assert_eq!(store.state().get_value("value"), Some(json!("root")));
}

#[test]
fn namespaced_lookup_failures_name_the_missing_part() {
    let store = Store::new(ModuleDef::new()).unwrap();
    store.register_module("my.module", change_module()).unwrap();

    match store.commit("my.module.missing", args![]) {
        Err(StoreError::MutationNotFound { name }) => assert_eq!(name, "missing"),
        other => panic!("Expected MutationNotFound, got {other:?}"),
    }
    match store.commit("my.nonexistent.change", args![]) {
        Err(StoreError::ModuleNotFound { namespace }) => assert_eq!(namespace, "my.nonexistent"),
        other => panic!("Expected ModuleNotFound, got {other:?}"),
    }
}

#[test]
fn module_state_is_mirrored_under_its_namespace() {
    let store = Store::new(ModuleDef::new()).unwrap();
    store.register_module("my.module", change_module()).unwrap();
    store.commit("my.module.change", args!["seen"]).unwrap();

    assert_eq!(
        store.state().to_value(),
        json!({ "my.module": { "value": "seen" } })
    );
}

#[test]
fn module_state_cannot_be_written_from_outside() {
    let store = Store::new(ModuleDef::new()).unwrap();
    let module = store.register_module("counter", change_module()).unwrap();

    assert!(matches!(
        module.state().set("value", "sneaky"),
        Err(StoreError::StateFrozen { ref key }) if key == "counter.value"
    ));
}

#[test]
fn missing_getters_are_none() {
    let store = Store::new(ModuleDef::new()).unwrap();
    store.register_module("list", items_module()).unwrap();

    assert_eq!(store.getters().get("undefinedName"), None);
    assert_eq!(store.getters().get("list.undefinedName"), None);
    assert_eq!(store.getters().get("nowhere.items"), None);
}

#[test]
fn getters_can_use_other_getters() {
    let store = Store::new(items_module()).unwrap();
    store.register_module("list", items_module()).unwrap();

    assert_eq!(store.getters().get("length"), Some(json!(2)));
    assert_eq!(store.getters().get("list.length"), Some(json!(2)));
}

#[test]
fn getter_events_use_qualified_names() {
    let store = Store::new(ModuleDef::new()).unwrap();
    let list = store.register_module("list", items_module()).unwrap();
    let names = Arc::new(Mutex::new(Vec::new()));
    let sink = names.clone();
    store.on(
        EventKind::Getter,
        Listener::new(move |_, event| {
            if let StoreEvent::Getter { name, .. } = event {
                sink.lock().unwrap().push(name.clone());
            }
        }),
    );

    list.getters().get("items");
    store.getters().get("list.items");

    assert_eq!(*names.lock().unwrap(), vec!["list.items", "list.items"]);
}

#[test]
fn nested_modules_register_flattened() {
    let store = Store::new(ModuleDef::new()).unwrap();
    store
        .register_module("b", ModuleDef::new().module("a", change_module()))
        .unwrap();

    assert_eq!(store.modules(), vec!["b", "b.a"]);
    store.commit("b.a.change", args![42]).unwrap();
    assert_eq!(
        store.state().to_value(),
        json!({ "b": { "a": { "value": 42 } } })
    );
}

#[test]
fn duplicate_registration_fails() {
    let store = Store::new(ModuleDef::new()).unwrap();
    store.register_module("x", change_module()).unwrap();

    assert!(matches!(
        store.register_module("x", change_module()),
        Err(StoreError::ModuleExists { ref namespace }) if namespace == "x"
    ));
}

#[test]
fn failed_nested_registration_leaves_the_tree_unchanged() {
    let store = Store::new(ModuleDef::new()).unwrap();
    let broken = change_module().module("child", ModuleDef::new().state(json!([1, 2])));

    assert!(matches!(
        store.register_module("p", broken),
        Err(StoreError::InvalidState { found: "array" })
    ));
    assert!(store.modules().is_empty());
    assert!(store.module("p").is_none());
    assert!(!store.state().contains_key("p"));

    store
        .register_module("p", change_module().module("child", change_module()))
        .unwrap();
    assert_eq!(store.modules(), vec!["p", "p.child"]);
}

#[test]
fn register_events_carry_the_definition() {
    let store = Store::new(ModuleDef::new()).unwrap();
    let defs = Arc::new(Mutex::new(Vec::new()));
    let sink = defs.clone();
    store.on(
        EventKind::RegisterModule,
        Listener::new(move |_, event| {
            if let StoreEvent::RegisterModule { namespace, def, .. } = event {
                sink.lock().unwrap().push((namespace.clone(), format!("{def:?}")));
            }
        }),
    );

    store
        .register_module("b", items_module().module("a", change_module()))
        .unwrap();

    let defs = defs.lock().unwrap();
    assert_eq!(defs.len(), 2);
    assert_eq!(defs[0].0, "b");
    assert!(defs[0].1.contains("\"length\""));
    assert!(defs[0].1.contains("\"a\""));
    assert_eq!(defs[1].0, "b.a");
    assert!(defs[1].1.contains("\"change\""));
}

#[test]
fn unregister_is_idempotent() {
    let store = Store::new(ModuleDef::new()).unwrap();
    store.register_module("x", change_module()).unwrap();

    assert!(store.unregister_module("x").is_some());
    assert!(store.module("x").is_none());
    assert!(!store.state().contains_key("x"));

    assert!(store.unregister_module("x").is_none());
    assert!(store.module("x").is_none());
    assert!(!store.state().contains_key("x"));
}

#[test]
fn module_lifecycle_events_fire() {
    let store = Store::new(ModuleDef::new()).unwrap();
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = log.clone();
    let listener = Listener::new(move |_, event| {
        let entry = match event {
            StoreEvent::RegisterModule { namespace, .. } => format!("+{namespace}"),
            StoreEvent::UnregisterModule { namespace, .. } => format!("-{namespace}"),
            _ => return,
        };
        sink.lock().unwrap().push(entry);
    });
    store.on(EventKind::RegisterModule, listener.clone());
    store.on(EventKind::UnregisterModule, listener);

    store
        .register_module("b", ModuleDef::new().module("a", change_module()))
        .unwrap();
    store.unregister_module("b");

    assert_eq!(*log.lock().unwrap(), vec!["+b", "+b.a", "-b.a", "-b"]);
}

#[test]
fn plugins_install_once_per_tree() {
    let installs = Arc::new(AtomicUsize::new(0));
    let counter = installs.clone();
    let plugin = Plugin::new(move |store, options| {
        counter.fetch_add(1, Ordering::SeqCst);
        let namespace = options.first().and_then(Value::as_str).unwrap_or("plugin");
        store.register_module(namespace, ModuleDef::new().state(json!({ "installed": true })))?;
        Ok(())
    });

    let store = Store::new(ModuleDef::new()).unwrap();
    let plugin_events = Arc::new(Mutex::new(0));
    let sink = plugin_events.clone();
    store.on(
        EventKind::Plugin,
        Listener::new(move |_, _| *sink.lock().unwrap() += 1),
    );

    store.use_plugin(plugin.clone(), args!["extras"]).unwrap();
    store.use_plugin(plugin, args!["extras"]).unwrap();

    assert_eq!(installs.load(Ordering::SeqCst), 1);
    assert_eq!(*plugin_events.lock().unwrap(), 1);
    assert_eq!(store.modules(), vec!["extras"]);
}
