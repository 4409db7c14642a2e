//! Priority admission gate — bounds how many rounds execute at once.
//!
//! A counting semaphore whose waiters are served by priority (higher
//! first) and, within a priority, in arrival order. State lives behind a
//! `std::sync::Mutex` that is only held for bookkeeping, never across an
//! `.await`.
//!
//! A release hands the slot straight to the best waiter under the same
//! lock, so the admitted count never dips while someone is queued and a
//! late arrival cannot overtake the queue.

use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use roundgate_core::RoundError;
use tokio::sync::oneshot;
use tracing::{debug, trace};

/// Priority rounds are admitted at unless a caller says otherwise.
pub const DEFAULT_PRIORITY: i32 = 0;

/// Waiting-queue order: higher priority first, then earlier arrival.
type WaiterKey = (Reverse<i32>, u64);

#[derive(Debug)]
struct GateState {
    admitted: usize,
    next_seq: u64,
    waiters: BTreeMap<WaiterKey, oneshot::Sender<()>>,
}

/// Bounded-concurrency limiter with priority-ordered waiters.
#[derive(Debug)]
pub struct AdmissionGate {
    capacity: usize,
    max_waiting: Option<usize>,
    state: Mutex<GateState>,
}

impl AdmissionGate {
    /// A gate admitting at most `capacity` holders at once, with an
    /// unbounded waiting queue.
    pub fn new(capacity: usize) -> Arc<Self> {
        Self::with_queue_limit(capacity, None)
    }

    /// Like [`AdmissionGate::new`], failing `acquire` with
    /// [`RoundError::AdmissionSaturated`] once `max_waiting` callers are queued.
    ///
    /// Panics if `capacity` is zero.
    pub fn with_queue_limit(capacity: usize, max_waiting: Option<usize>) -> Arc<Self> {
        assert!(capacity > 0, "admission gate capacity must be positive");
        Arc::new(Self {
            capacity,
            max_waiting,
            state: Mutex::new(GateState {
                admitted: 0,
                next_seq: 0,
                waiters: BTreeMap::new(),
            }),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of permits currently held.
    pub fn admitted(&self) -> usize {
        self.lock_state().admitted
    }

    /// Number of callers queued for a permit.
    pub fn waiting(&self) -> usize {
        self.lock_state().waiters.len()
    }

    /// Wait for a permit. The permit is released when dropped.
    ///
    /// Dropping the returned future while it waits removes the caller from
    /// the queue without disturbing anyone else's position.
    pub async fn acquire(self: &Arc<Self>, priority: i32) -> Result<AdmissionPermit, RoundError> {
        let (key, rx) = {
            let mut state = self.lock_state();
            if state.admitted < self.capacity {
                state.admitted += 1;
                trace!(priority, admitted = state.admitted, "admitted immediately");
                return Ok(AdmissionPermit { gate: self.clone() });
            }
            if let Some(limit) = self.max_waiting {
                if state.waiters.len() >= limit {
                    return Err(RoundError::AdmissionSaturated {
                        waiting: state.waiters.len(),
                        limit,
                    });
                }
            }
            let key = (Reverse(priority), state.next_seq);
            state.next_seq += 1;
            let (tx, rx) = oneshot::channel();
            state.waiters.insert(key, tx);
            debug!(priority, waiting = state.waiters.len(), "round queued for admission");
            (key, rx)
        };

        let mut ticket = QueuedTicket {
            gate: self.clone(),
            key,
            rx,
            armed: true,
        };
        match (&mut ticket.rx).await {
            Ok(()) => {
                ticket.armed = false;
                Ok(AdmissionPermit { gate: self.clone() })
            }
            Err(_) => {
                ticket.armed = false;
                Err(RoundError::AdmissionClosed)
            }
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Give a freed slot to the best live waiter, or return it to the pool.
    fn hand_off(state: &mut GateState) {
        while let Some((_, tx)) = state.waiters.pop_first() {
            if tx.send(()).is_ok() {
                return;
            }
        }
        state.admitted -= 1;
    }
}

/// A held slot. Dropping it releases the slot.
#[derive(Debug)]
pub struct AdmissionPermit {
    gate: Arc<AdmissionGate>,
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        let mut state = self.gate.lock_state();
        AdmissionGate::hand_off(&mut state);
        trace!(admitted = state.admitted, "permit released");
    }
}

/// A caller's place in the queue while its `acquire` future is pending.
struct QueuedTicket {
    gate: Arc<AdmissionGate>,
    key: WaiterKey,
    rx: oneshot::Receiver<()>,
    armed: bool,
}

impl Drop for QueuedTicket {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = self.gate.lock_state();
        if state.waiters.remove(&self.key).is_none() && self.rx.try_recv().is_ok() {
            // Granted in the same instant we were cancelled: the slot is
            // ours and must be passed on.
            AdmissionGate::hand_off(&mut state);
        }
    }
}
