//! Transaction coordinator types.
//!
//! A transaction is scoped to one collection and buffers vector
//! mutations as an explicit tagged-operation log. Nothing touches shared
//! index state until commit, which replays the buffer; abort discards it.
//! The buffer of an Active transaction is invisible to reads and to
//! every other transaction.
//!
//! Lifecycle: Active → {Committed, Aborted}, both terminal. Terminal
//! statuses are retained so aborting an already-aborted transaction is
//! idempotent while aborting a committed one fails with `InvalidState`.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::{NotFoundError, Result, TrellisError};
use crate::types::{CollectionId, Timestamp, TransactionId, VectorId, VectorRecord};

/// One buffered vector mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum VectorOp {
    /// Insert a new vector; fails at commit if the id already exists.
    Create(VectorRecord),
    /// Remove a vector by id.
    Delete(VectorId),
    /// Insert or replace a vector.
    Upsert(VectorRecord),
}

impl VectorOp {
    /// The vector id this operation targets.
    pub fn vector_id(&self) -> VectorId {
        match self {
            Self::Create(record) | Self::Upsert(record) => record.id,
            Self::Delete(id) => *id,
        }
    }
}

/// Transaction lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionStatus {
    /// Accepting staged operations.
    Active,
    /// Buffer applied to every attached index.
    Committed,
    /// Buffer discarded.
    Aborted,
}

/// A transaction and its private operation buffer.
#[derive(Debug, Clone)]
pub struct Transaction {
    /// Transaction id, monotonically increasing per collection.
    pub id: TransactionId,
    /// The collection this transaction is scoped to.
    pub collection: CollectionId,
    /// When the transaction was opened.
    pub created_at: Timestamp,
    /// Ordered operation buffer.
    pub ops: Vec<VectorOp>,
}

impl Transaction {
    /// Opens a transaction.
    pub fn new(id: TransactionId, collection: CollectionId) -> Self {
        Self {
            id,
            collection,
            created_at: Timestamp::now(),
            ops: Vec::new(),
        }
    }
}

/// Per-collection transaction bookkeeping: active buffers plus the
/// terminal status of finished transactions.
#[derive(Debug, Default)]
pub(crate) struct TransactionTable {
    active: BTreeMap<TransactionId, Transaction>,
    terminated: BTreeMap<TransactionId, TransactionStatus>,
}

impl TransactionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a freshly opened transaction.
    pub fn begin(&mut self, transaction: Transaction) {
        self.active.insert(transaction.id, transaction);
    }

    /// Fails unless the transaction exists and is Active.
    pub fn ensure_active(&self, id: TransactionId) -> Result<()> {
        if self.active.contains_key(&id) {
            return Ok(());
        }
        Err(self.terminal_error(id))
    }

    /// Appends an operation to an Active transaction's buffer.
    pub fn stage(&mut self, id: TransactionId, op: VectorOp) -> Result<()> {
        if let Some(transaction) = self.active.get_mut(&id) {
            transaction.ops.push(op);
            return Ok(());
        }
        Err(self.terminal_error(id))
    }

    /// Removes an Active transaction for commit, leaving its terminal
    /// status to be recorded by [`Self::record_terminal`].
    pub fn take_active(&mut self, id: TransactionId) -> Result<Transaction> {
        if let Some(transaction) = self.active.remove(&id) {
            return Ok(transaction);
        }
        Err(self.terminal_error(id))
    }

    /// Records the terminal status of a finished transaction.
    pub fn record_terminal(&mut self, id: TransactionId, status: TransactionStatus) {
        debug_assert!(status != TransactionStatus::Active);
        self.terminated.insert(id, status);
    }

    /// Aborts a transaction: discards any Active buffer. Idempotent on an
    /// already-Aborted transaction, `InvalidState` on a Committed one.
    pub fn abort(&mut self, id: TransactionId) -> Result<()> {
        if self.active.remove(&id).is_some() {
            self.terminated.insert(id, TransactionStatus::Aborted);
            return Ok(());
        }
        match self.terminated.get(&id) {
            Some(TransactionStatus::Aborted) => Ok(()),
            Some(TransactionStatus::Committed) => Err(TrellisError::invalid_state(format!(
                "transaction {id} is already committed"
            ))),
            _ => Err(NotFoundError::Transaction(id).into()),
        }
    }

    /// Current status of a known transaction.
    pub fn status(&self, id: TransactionId) -> Option<TransactionStatus> {
        if self.active.contains_key(&id) {
            return Some(TransactionStatus::Active);
        }
        self.terminated.get(&id).copied()
    }

    fn terminal_error(&self, id: TransactionId) -> TrellisError {
        match self.terminated.get(&id) {
            Some(status) => TrellisError::invalid_state(format!(
                "transaction {id} is not active (status: {status:?})"
            )),
            None => NotFoundError::Transaction(id).into(),
        }
    }
}

/// The net effect of a buffer on one vector id.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ResolvedOp {
    /// Write a record (Create or Upsert after last-writer-wins).
    Put {
        record: VectorRecord,
        /// True when the surviving op is a Create that must collide with
        /// an already-committed id.
        is_create: bool,
    },
    /// Remove a vector.
    Remove {
        id: VectorId,
        /// True when an earlier op in the same buffer created the vector,
        /// so its absence from committed state is expected and the remove
        /// nets out to nothing.
        buffered_only: bool,
    },
}

impl ResolvedOp {
    pub fn vector_id(&self) -> VectorId {
        match self {
            Self::Put { record, .. } => record.id,
            Self::Remove { id, .. } => *id,
        }
    }
}

/// Collapses an ordered buffer to one effective operation per vector id.
///
/// Later operations override earlier ones on the same id (last-writer-
/// wins pre-commit), with one exception: a second `Create` for an id
/// already created in the buffer is a `DuplicateId` failure, not an
/// override. A `Create` following an in-buffer `Delete` of a committed
/// vector nets out to a replacement and skips the committed-id collision
/// check. Output preserves first-mention order.
pub(crate) fn resolve_ops(ops: &[VectorOp]) -> Result<Vec<ResolvedOp>> {
    struct Slot {
        resolved: ResolvedOp,
        created_in_buffer: bool,
        deleted_in_buffer: bool,
    }

    let mut order: Vec<VectorId> = Vec::new();
    let mut slots: HashMap<VectorId, Slot> = HashMap::new();

    for op in ops {
        let id = op.vector_id();
        if !slots.contains_key(&id) {
            order.push(id);
        }
        match op {
            VectorOp::Create(record) => {
                if let Some(slot) = slots.get(&id) {
                    if slot.created_in_buffer {
                        return Err(TrellisError::duplicate_id(
                            id,
                            "created twice in one transaction",
                        ));
                    }
                }
                let deleted_in_buffer = slots.get(&id).is_some_and(|s| s.deleted_in_buffer);
                slots.insert(
                    id,
                    Slot {
                        resolved: ResolvedOp::Put {
                            record: record.clone(),
                            is_create: !deleted_in_buffer,
                        },
                        created_in_buffer: true,
                        deleted_in_buffer,
                    },
                );
            }
            VectorOp::Upsert(record) => {
                let prior = slots.get(&id);
                let created_in_buffer = prior.is_some_and(|s| s.created_in_buffer);
                let deleted_in_buffer = prior.is_some_and(|s| s.deleted_in_buffer);
                slots.insert(
                    id,
                    Slot {
                        resolved: ResolvedOp::Put {
                            record: record.clone(),
                            is_create: false,
                        },
                        created_in_buffer,
                        deleted_in_buffer,
                    },
                );
            }
            VectorOp::Delete(id) => {
                let prior = slots.get(id);
                let buffered_only = prior
                    .is_some_and(|s| matches!(s.resolved, ResolvedOp::Put { .. }));
                let created_in_buffer = prior.is_some_and(|s| s.created_in_buffer);
                slots.insert(
                    *id,
                    Slot {
                        resolved: ResolvedOp::Remove {
                            id: *id,
                            buffered_only,
                        },
                        created_in_buffer,
                        deleted_in_buffer: true,
                    },
                );
            }
        }
    }

    Ok(order
        .into_iter()
        .map(|id| slots.remove(&id).expect("slot exists for ordered id").resolved)
        .collect())
}
