//! Registry of in-flight operations for one connection
//!
//! Maps the client-chosen operation id to a cancellable handle. An id maps to
//! at most one live operation; ids may be reused once the previous operation
//! has been removed.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::error::{ProtocolError, ProtocolResult};

/// Handle to a running operation
///
/// `dispose` cancels the operation; the operation task holds the guard from
/// `finish_guard` and releases it when it exits, which wakes `finished`.
#[derive(Debug, Clone)]
pub struct OperationHandle {
    serial: u64,
    cancel: CancellationToken,
    done: CancellationToken,
}

impl OperationHandle {
    fn new(serial: u64) -> Self {
        Self {
            serial,
            cancel: CancellationToken::new(),
            done: CancellationToken::new(),
        }
    }

    /// Per-connection generation number, distinct for every handle
    pub fn serial(&self) -> u64 {
        self.serial
    }

    /// Cancel the operation. Idempotent.
    pub fn dispose(&self) {
        self.cancel.cancel();
    }

    pub fn is_disposed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once `dispose` has been called
    pub async fn disposed(&self) {
        self.cancel.cancelled().await;
    }

    /// Guard held by the operation task for its whole lifetime
    pub fn finish_guard(&self) -> DropGuard {
        self.done.clone().drop_guard()
    }

    pub fn is_finished(&self) -> bool {
        self.done.is_cancelled()
    }

    /// Resolves once the operation task has exited
    pub async fn finished(&self) {
        self.done.cancelled().await;
    }
}

/// Operation id to handle mapping
#[derive(Debug, Default)]
pub struct OperationRegistry {
    operations: Mutex<HashMap<String, OperationHandle>>,
    next_serial: AtomicU64,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a handle that is not registered yet
    pub fn new_handle(&self) -> OperationHandle {
        OperationHandle::new(self.next_serial.fetch_add(1, Ordering::Relaxed))
    }

    /// Register a handle; fails if the id is already live
    pub fn register(&self, op_id: &str, handle: OperationHandle) -> ProtocolResult<()> {
        match self.operations.lock().entry(op_id.to_string()) {
            Entry::Occupied(_) => Err(ProtocolError::DuplicateOperation(op_id.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(handle);
                Ok(())
            }
        }
    }

    /// Create and register a handle in one step
    pub fn reserve(&self, op_id: &str) -> ProtocolResult<OperationHandle> {
        let handle = self.new_handle();
        self.register(op_id, handle.clone())?;
        Ok(handle)
    }

    pub fn get(&self, op_id: &str) -> Option<OperationHandle> {
        self.operations.lock().get(op_id).cloned()
    }

    pub fn has(&self, op_id: &str) -> bool {
        self.operations.lock().contains_key(op_id)
    }

    /// Whether `op_id` is still registered to this exact handle
    pub fn is_current(&self, op_id: &str, handle: &OperationHandle) -> bool {
        self.operations
            .lock()
            .get(op_id)
            .is_some_and(|h| h.serial == handle.serial)
    }

    /// Remove an operation; no-op when absent
    pub fn remove(&self, op_id: &str) -> Option<OperationHandle> {
        self.operations.lock().remove(op_id)
    }

    /// Remove `op_id` only if it still maps to `handle`
    ///
    /// Returns `false` when a stop (or a later start reusing the id) got there
    /// first.
    pub fn remove_if_current(&self, op_id: &str, handle: &OperationHandle) -> bool {
        let mut operations = self.operations.lock();
        let current = operations
            .get(op_id)
            .is_some_and(|h| h.serial == handle.serial);
        if current {
            operations.remove(op_id);
        }
        current
    }

    /// Remove every operation
    pub fn drain(&self) -> Vec<(String, OperationHandle)> {
        self.operations.lock().drain().collect()
    }

    pub fn len(&self) -> usize {
        self.operations.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.lock().is_empty()
    }

    pub fn ids(&self) -> Vec<String> {
        self.operations.lock().keys().cloned().collect()
    }
}
