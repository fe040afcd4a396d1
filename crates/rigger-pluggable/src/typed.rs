//! Adapters from strongly typed closures to JSON hook handlers.
//!
//! Hook payloads cross the runtime as [`serde_json::Value`]; these helpers
//! decode the memo and arguments before calling the closure and encode its
//! result afterwards.

use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::{BoxFuture, ready};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{BoxError, HookFn, HookInput};

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, BoxError> {
    Ok(serde_json::from_value(value)?)
}

fn encode<T: Serialize>(value: &T) -> Result<Value, BoxError> {
    Ok(serde_json::to_value(value)?)
}

fn failed(err: BoxError) -> BoxFuture<'static, Result<Value, BoxError>> {
    ready(Err(err)).boxed()
}

/// Wraps a `Modify` hook receiving the running memo and the arguments.
pub fn modify<T, A, F, Fut>(handler: F) -> HookFn
where
    T: Serialize + DeserializeOwned + Send + 'static,
    A: DeserializeOwned + Send + 'static,
    F: Fn(T, A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, BoxError>> + Send + 'static,
{
    Arc::new(move |input: HookInput| {
        let decoded = decode::<T>(input.memo).and_then(|memo| Ok((memo, decode::<A>(input.args)?)));
        match decoded {
            Ok((memo, args)) => {
                let fut = handler(memo, args);
                async move { encode(&fut.await?) }.boxed()
            }
            Err(err) => failed(err),
        }
    })
}

/// Wraps an `Add` hook contributing zero or more items.
pub fn add<T, A, F, Fut>(handler: F) -> HookFn
where
    T: Serialize + Send + 'static,
    A: DeserializeOwned + Send + 'static,
    F: Fn(A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Vec<T>, BoxError>> + Send + 'static,
{
    Arc::new(move |input: HookInput| match decode::<A>(input.args) {
        Ok(args) => {
            let fut = handler(args);
            async move { encode(&fut.await?) }.boxed()
        }
        Err(err) => failed(err),
    })
}

/// Wraps a `Get` hook. `None` lets later hooks answer.
pub fn get<T, A, F, Fut>(handler: F) -> HookFn
where
    T: Serialize + Send + 'static,
    A: DeserializeOwned + Send + 'static,
    F: Fn(A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<T>, BoxError>> + Send + 'static,
{
    Arc::new(move |input: HookInput| match decode::<A>(input.args) {
        Ok(args) => {
            let fut = handler(args);
            async move {
                match fut.await? {
                    Some(value) => encode(&value),
                    None => Ok(Value::Null),
                }
            }
            .boxed()
        }
        Err(err) => failed(err),
    })
}

/// Wraps an `Event` hook.
pub fn event<A, F, Fut>(handler: F) -> HookFn
where
    A: DeserializeOwned + Send + 'static,
    F: Fn(A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
{
    Arc::new(move |input: HookInput| match decode::<A>(input.args) {
        Ok(args) => {
            let fut = handler(args);
            async move {
                fut.await?;
                Ok(Value::Null)
            }
            .boxed()
        }
        Err(err) => failed(err),
    })
}
