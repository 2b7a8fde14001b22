use std::cell::Cell;
use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};

use ndarray::{Array, Dimension};
use serde::Serialize;

/// Process-wide count of numeric buffers currently held by compute scopes.
#[derive(Debug, Default)]
pub struct BufferLedger {
    live_buffers: AtomicUsize,
    live_bytes: AtomicUsize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerSnapshot {
    pub live_buffers: usize,
    pub live_bytes: usize,
}

impl BufferLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            live_buffers: self.live_buffers.load(Ordering::Acquire),
            live_bytes: self.live_bytes.load(Ordering::Acquire),
        }
    }

    fn acquire(&self, bytes: usize) {
        self.live_buffers.fetch_add(1, Ordering::AcqRel);
        self.live_bytes.fetch_add(bytes, Ordering::AcqRel);
    }

    fn release(&self, bytes: usize) {
        self.live_buffers.fetch_sub(1, Ordering::AcqRel);
        self.live_bytes.fetch_sub(bytes, Ordering::AcqRel);
    }
}

/// Scope for one engine computation.
///
/// Every tensor produced while computing is adopted here. The returned
/// [`ScopedTensor`] borrows the scope, so none can outlive it, and each one
/// releases its buffer from the ledger when dropped, error paths included.
pub struct ComputeScope<'l> {
    ledger: &'l BufferLedger,
    adopted: Cell<usize>,
}

impl<'l> ComputeScope<'l> {
    pub fn new(ledger: &'l BufferLedger) -> Self {
        Self {
            ledger,
            adopted: Cell::new(0),
        }
    }

    pub fn adopt<A, D: Dimension>(&self, array: Array<A, D>) -> ScopedTensor<'_, A, D> {
        let bytes = array.len() * std::mem::size_of::<A>();
        self.ledger.acquire(bytes);
        self.adopted.set(self.adopted.get() + 1);
        ScopedTensor {
            array,
            bytes,
            ledger: self.ledger,
        }
    }

    /// Number of tensors adopted over the scope's lifetime.
    pub fn adopted(&self) -> usize {
        self.adopted.get()
    }
}

pub struct ScopedTensor<'s, A, D: Dimension> {
    array: Array<A, D>,
    bytes: usize,
    ledger: &'s BufferLedger,
}

impl<A, D: Dimension> Deref for ScopedTensor<'_, A, D> {
    type Target = Array<A, D>;

    fn deref(&self) -> &Self::Target {
        &self.array
    }
}

impl<A, D: Dimension> Drop for ScopedTensor<'_, A, D> {
    fn drop(&mut self) {
        self.ledger.release(self.bytes);
    }
}
