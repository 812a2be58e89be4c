// A todo list store with a namespaced module, a logging plugin and a bus observer.
//
// Run with `RUST_LOG=debug cargo run --example todo` to see store internals.
// Store options may be supplied as JSON in STATEBINDER_OPTIONS, e.g.
// `{"should_freeze": false}`.

use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::{json, Value};
use statebinder::{args, Args, EventKind, Listener, ModuleDef, Plugin, Store, StoreEvent, StoreOptions};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn todos() -> ModuleDef {
    ModuleDef::new()
        .state_fn(|| json!({ "items": [], "loading": false }))
        .mutation("add", |state, args| {
            let mut items = state.get_value("items").unwrap_or_else(|| json!([]));
            if let (Some(list), Some(title)) = (items.as_array_mut(), args.first()) {
                list.push(json!({ "title": title, "done": false }));
            }
            state.set("items", items)?;
            Ok(())
        })
        .mutation("toggle", |state, args| {
            let index = args
                .first()
                .and_then(Value::as_u64)
                .context("toggle needs an index")? as usize;
            let mut items = state.get_value("items").unwrap_or_else(|| json!([]));
            let done = items
                .get_mut(index)
                .and_then(|item| item.get_mut("done"))
                .context("no todo at that index")?;
            *done = json!(!done.as_bool().unwrap_or(false));
            state.set("items", items)?;
            Ok(())
        })
        .mutation("loading", |state, args| {
            state.set("loading", args.first().cloned().unwrap_or(json!(false)))?;
            Ok(())
        })
        .action("fetch", |ctx: Store, _args: Args| async move {
            ctx.commit("loading", args![true])?;
            tokio::time::sleep(Duration::from_millis(50)).await;
            for title in ["water plants", "call the library"] {
                ctx.commit("add", args![title])?;
            }
            ctx.commit("loading", args![false])?;
            Ok(json!(2))
        })
        .getter("remaining", |state, _, _, _| {
            let items = state.get_value("items").unwrap_or_else(|| json!([]));
            let remaining = items
                .as_array()
                .map_or(0, |list| list.iter().filter(|item| item["done"] == json!(false)).count());
            json!(remaining)
        })
}

fn change_logger() -> Plugin {
    Plugin::new(|store, _options| {
        store.on(
            EventKind::Set,
            Listener::new(|_, event| {
                if let StoreEvent::Set { prop, value, .. } = event {
                    tracing::info!(%prop, %value, "state changed");
                }
            }),
        );
        Ok(())
    })
}

fn load_options() -> Result<StoreOptions> {
    match std::env::var("STATEBINDER_OPTIONS") {
        Ok(raw) => serde_json::from_str(&raw).context("Failed to parse STATEBINDER_OPTIONS"),
        Err(_) => Ok(StoreOptions::default()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,statebinder=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let options = load_options()?;
    let store = Store::new(ModuleDef::new().options(options).module("todos", todos()))?;
    store.use_plugin(change_logger(), args![])?;

    let mut receiver = store.subscribe().context("store has no event bus")?;
    let observer = tokio::spawn(async move {
        let mut commits = 0;
        while let Ok(envelope) = receiver.recv().await {
            if envelope.kind() == EventKind::Commit {
                commits += 1;
            }
        }
        commits
    });

    let fetched = store.dispatch("todos.fetch", args![]).await?;
    tracing::info!(%fetched, "todos fetched");

    store.commit("todos.toggle", args![0])?;
    tracing::info!(
        remaining = %store.getters().get("todos.remaining").unwrap_or(serde_json::Value::Null),
        "after toggle"
    );

    if let Err(err) = store.state().set("todos", json!({})) {
        tracing::info!(%err, "direct write rejected");
    }

    println!("{}", serde_json::to_string_pretty(&store.state().to_value())?);

    drop(store);
    let commits = observer.await?;
    tracing::info!(commits, "observer finished");
    Ok(())
}
