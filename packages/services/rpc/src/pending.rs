use std::collections::HashMap;

use async_std::channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use remrpc_identity::CorrelationId;
use rmpv::Value;

use crate::error::ErrorCode;

/// Answer delivered to a waiting caller.
#[derive(Debug, Clone, PartialEq)]
pub enum CallOutcome {
    Reply(Value),
    Error { code: ErrorCode, detail: String },
    /// Answer carried the serial but its content was malformed.
    Anomaly(String),
}

/// In-flight calls keyed by serial. Each entry is completed at most once: whoever removes it first wins.
#[derive(Default)]
pub struct PendingTable {
    waiters: Mutex<HashMap<CorrelationId, Sender<CallOutcome>>>,
}

impl PendingTable {
    pub fn insert(&self, serial: CorrelationId) -> Receiver<CallOutcome> {
        let (tx, rx) = bounded(1);
        if self.waiters.lock().insert(serial, tx).is_some() {
            log::warn!("[PendingTable] serial {} reused, previous waiter dropped", serial);
        }
        rx
    }

    /// Wake the waiter of `serial`. Returns false if nobody waits for it anymore.
    pub fn complete(&self, serial: CorrelationId, outcome: CallOutcome) -> bool {
        let waiter = self.waiters.lock().remove(&serial);
        match waiter {
            Some(tx) => tx.try_send(outcome).is_ok(),
            None => false,
        }
    }

    pub fn remove(&self, serial: CorrelationId) -> bool {
        self.waiters.lock().remove(&serial).is_some()
    }

    /// Remove the entry of `serial` when the returned guard is dropped, whatever way the caller leaves.
    pub fn guard(&self, serial: CorrelationId) -> PendingGuard<'_> {
        PendingGuard { table: self, serial }
    }

    /// Drop every waiter, their receivers observe a closed channel.
    pub fn clear(&self) -> usize {
        let mut waiters = self.waiters.lock();
        let count = waiters.len();
        waiters.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.waiters.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct PendingGuard<'a> {
    table: &'a PendingTable,
    serial: CorrelationId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.table.remove(self.serial) {
            log::debug!("[PendingTable] dropped abandoned waiter {}", self.serial);
        }
    }
}
