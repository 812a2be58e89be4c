//! Action trait and the type-erased action runner.
//!
//! Actions are the asynchronous side of a store: they may await IO, commit
//! mutations, and dispatch other actions. They never write state directly.
//!
//! # Key Properties
//!
//! - **Context is the owning node**: an action receives the [`Store`] that owns
//!   it, so `ctx.commit("local")` targets its own module and `ctx.root()`
//!   reaches tree-wide names
//! - **Writes go through commits**: every commit re-opens the target node's
//!   gate on its own, before and after any await point
//! - **Plain values are accepted**: synchronous action bodies are coerced into
//!   an already-resolved future

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{self, BoxFuture, FutureExt};
use serde_json::Value;

use crate::store::Store;
use crate::Args;

/// An asynchronous store action.
///
/// Implement this for actions that carry their own dependencies; for
/// closures use [`ModuleDef::action`](crate::ModuleDef::action).
///
/// # Example
///
/// ```ignore
/// use statebinder::{async_trait, Action, Args, Store};
///
/// struct FetchTodos {
///     client: reqwest::Client,
/// }
///
/// #[async_trait]
/// impl Action for FetchTodos {
///     async fn run(&self, ctx: Store, _args: Args) -> anyhow::Result<Value> {
///         let todos: Value = self.client.get(URL).send().await?.json().await?;
///         ctx.commit("replace", vec![todos])?;
///         Ok(Value::Null)
///     }
/// }
/// ```
#[async_trait]
pub trait Action: Send + Sync + 'static {
    /// Run the action with its owning node and the dispatch arguments.
    async fn run(&self, ctx: Store, args: Args) -> anyhow::Result<Value>;
}

/// Type-erased action as stored on a node.
///
/// Calling it runs whatever synchronous work the body does before its first
/// await point and returns the pending remainder.
pub(crate) type ActionFn =
    Arc<dyn Fn(Store, Args) -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync>;

/// Wrap a closure returning a future.
pub(crate) fn from_async<F, Fut>(action: F) -> ActionFn
where
    F: Fn(Store, Args) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    Arc::new(move |ctx, args| action(ctx, args).boxed())
}

/// Wrap a synchronous closure; its result becomes an already-resolved future.
pub(crate) fn from_sync<F>(action: F) -> ActionFn
where
    F: Fn(Store, Args) -> anyhow::Result<Value> + Send + Sync + 'static,
{
    Arc::new(move |ctx, args| future::ready(action(ctx, args)).boxed())
}

/// Wrap an [`Action`] implementation.
pub(crate) fn from_impl<A: Action>(action: A) -> ActionFn {
    let action = Arc::new(action);
    Arc::new(move |ctx, args| {
        let action = action.clone();
        async move { action.run(ctx, args).await }.boxed()
    })
}
