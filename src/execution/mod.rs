//! Execution engine interface
//!
//! The server does not parse or execute GraphQL itself. It hands each `start`
//! request to an [`Executor`] and forwards whatever comes back: a single
//! response, or a stream of responses for subscriptions.

mod response;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::{Map, Value};

use crate::connection::RequestContext;
use crate::error::ExecutionError;
use crate::protocol::StartPayload;

pub use response::{GraphQLError, Location, PathSegment, Response};

/// Stream of responses produced by a subscription
pub type ResponseStream = BoxStream<'static, Response>;

/// How the engine should run resolvers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionStrategy {
    /// Resolvers run as tasks on the async runtime
    #[default]
    Async,
}

/// Parameters handed to the execution engine
#[derive(Debug, Clone)]
pub struct ExecutionParams {
    pub query: String,
    pub variables: Map<String, Value>,
    pub operation_name: Option<String>,
    /// Results may contain deferred values; the encoder waits for them
    pub return_promise: bool,
    pub strategy: ExecutionStrategy,
}

impl ExecutionParams {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            variables: Map::new(),
            operation_name: None,
            return_promise: true,
            strategy: ExecutionStrategy::Async,
        }
    }
}

impl From<StartPayload> for ExecutionParams {
    fn from(payload: StartPayload) -> Self {
        Self {
            variables: payload.variables.unwrap_or_default(),
            operation_name: payload.operation_name,
            ..Self::new(payload.query)
        }
    }
}

/// What the engine returned for one operation
pub enum ExecutionResult {
    /// A query or mutation result
    Single(Response),
    /// A subscription: one response per event until exhausted or stopped
    Stream(ResponseStream),
}

impl std::fmt::Debug for ExecutionResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Single(response) => f.debug_tuple("Single").field(response).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// GraphQL execution engine
///
/// Every call must produce a fresh result; streams are never shared between
/// operations.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(
        &self,
        request_context: &RequestContext,
        params: ExecutionParams,
    ) -> Result<ExecutionResult, ExecutionError>;
}
