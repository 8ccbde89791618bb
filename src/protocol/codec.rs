//! Deferred-aware JSON encoding
//!
//! Execution results may carry fields whose computation had not finished when
//! the message was built. Encoding walks the tree, records every pending value,
//! waits for all of them and walks again, until a pass records none. Partially
//! resolved trees never leave this module.

use std::fmt;
use std::future::Future;

use futures::future::{self, BoxFuture, FutureExt, Shared};
use serde_json::{Map, Number, Value};
use tracing::trace;

/// A value whose computation may still be running
///
/// Cloning shares the same computation. The future is driven by whoever
/// awaits it first, so a deferred value nobody else polls is resolved by the
/// encoder itself.
#[derive(Clone)]
pub struct Deferred {
    inner: Shared<BoxFuture<'static, ResultValue>>,
}

impl Deferred {
    /// Wrap a future producing a result value
    pub fn new<F>(future: F) -> Self
    where
        F: Future<Output = ResultValue> + Send + 'static,
    {
        Self {
            inner: future.boxed().shared(),
        }
    }

    /// The resolved value, or `None` while the computation is pending
    pub fn resolved(&self) -> Option<&ResultValue> {
        self.inner.peek()
    }

    /// Wait for the value
    pub async fn wait(&self) -> ResultValue {
        self.inner.clone().await
    }
}

impl fmt::Debug for Deferred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.resolved() {
            Some(value) => f.debug_tuple("Deferred").field(value).finish(),
            None => f.write_str("Deferred(<pending>)"),
        }
    }
}

/// A GraphQL result tree that may contain deferred values
#[derive(Debug, Clone)]
pub enum ResultValue {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    List(Vec<ResultValue>),
    /// Fields in response order
    Object(Vec<(String, ResultValue)>),
    Deferred(Deferred),
}

impl ResultValue {
    /// Build an object from `(field, value)` pairs, keeping their order
    pub fn object<I, K>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, ResultValue)>,
        K: Into<String>,
    {
        Self::Object(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Build a deferred value from a future
    pub fn deferred<F>(future: F) -> Self
    where
        F: Future<Output = ResultValue> + Send + 'static,
    {
        Self::Deferred(Deferred::new(future))
    }

    /// Look up a field of an object value
    pub fn get(&self, field: &str) -> Option<&ResultValue> {
        match self {
            Self::Object(fields) => fields.iter().find(|(k, _)| k == field).map(|(_, v)| v),
            _ => None,
        }
    }
}

impl From<Value> for ResultValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => Self::Number(n),
            Value::String(s) => Self::String(s),
            Value::Array(items) => Self::List(items.into_iter().map(Self::from).collect()),
            Value::Object(map) => {
                Self::Object(map.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
        }
    }
}

impl From<&str> for ResultValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for ResultValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<bool> for ResultValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for ResultValue {
    fn from(n: i64) -> Self {
        Self::Number(n.into())
    }
}

impl From<f64> for ResultValue {
    fn from(n: f64) -> Self {
        Number::from_f64(n).map_or(Self::Null, Self::Number)
    }
}

impl From<Deferred> for ResultValue {
    fn from(d: Deferred) -> Self {
        Self::Deferred(d)
    }
}

/// Outcome of a single walk over a result tree
#[derive(Debug)]
pub enum EncodePass {
    /// Every value was resolved
    Complete(Value),
    /// Values still computing, in encounter order
    Pending(Vec<Deferred>),
}

/// Encoder that re-walks a tree until no deferred value is pending
#[derive(Debug, Default)]
pub struct Encoder {
    passes: usize,
}

impl Encoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of passes performed so far
    pub fn passes(&self) -> usize {
        self.passes
    }

    /// Walk the tree once, collecting pending values
    pub fn encode_pass(&mut self, value: &ResultValue) -> EncodePass {
        self.passes += 1;
        let mut pending = Vec::new();
        let json = walk(value, &mut pending);
        if pending.is_empty() {
            EncodePass::Complete(json)
        } else {
            EncodePass::Pending(pending)
        }
    }

    /// Resolve the tree into plain JSON
    pub async fn resolve(&mut self, value: &ResultValue) -> Value {
        loop {
            match self.encode_pass(value) {
                EncodePass::Complete(json) => return json,
                EncodePass::Pending(pending) => {
                    trace!(
                        pending = pending.len(),
                        pass = self.passes,
                        "waiting on deferred values"
                    );
                    future::join_all(pending.iter().map(|d| d.inner.clone())).await;
                }
            }
        }
    }

    /// Resolve the tree and serialize it to JSON text
    pub async fn encode(&mut self, value: &ResultValue) -> Result<String, serde_json::Error> {
        let json = self.resolve(value).await;
        serde_json::to_string(&json)
    }
}

/// Resolve and serialize a result tree
pub async fn encode(value: &ResultValue) -> Result<String, serde_json::Error> {
    Encoder::new().encode(value).await
}

fn walk(value: &ResultValue, pending: &mut Vec<Deferred>) -> Value {
    match value {
        ResultValue::Null => Value::Null,
        ResultValue::Bool(b) => Value::Bool(*b),
        ResultValue::Number(n) => Value::Number(n.clone()),
        ResultValue::String(s) => Value::String(s.clone()),
        ResultValue::List(items) => {
            Value::Array(items.iter().map(|item| walk(item, pending)).collect())
        }
        ResultValue::Object(fields) => {
            let mut map = Map::with_capacity(fields.len());
            for (key, field) in fields {
                map.insert(key.clone(), walk(field, pending));
            }
            Value::Object(map)
        }
        ResultValue::Deferred(deferred) => match deferred.resolved() {
            Some(resolved) => walk(resolved, pending),
            None => {
                pending.push(deferred.clone());
                Value::Null
            }
        },
    }
}
