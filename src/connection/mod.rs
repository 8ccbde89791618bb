//! Connection-scoped state
//!
//! One [`ConnectionContext`] exists per accepted socket. It owns the outbound
//! transport, the read-only request context and the operation registry, and
//! is dropped once the socket is gone and every operation has been disposed.

mod context;
mod registry;

pub use context::{ConnectionContext, ConnectionState, RequestContext, Transport};
pub use registry::{OperationHandle, OperationRegistry};
