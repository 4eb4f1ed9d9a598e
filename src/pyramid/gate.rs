//! Bounded admission gate for tile production.
//!
//! The gate is a counting semaphore: [`AdmissionGate::acquire`] suspends until
//! a permit is free, and the returned [`GatePermit`] gives the permit back when
//! released or dropped. Because release happens in `Drop`, a unit of work that
//! fails, returns early, or panics still frees its permit.
//!
//! Acquisition observes a [`CancellationToken`]: a cancelled waiter stops
//! waiting and never holds a permit.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

// =============================================================================
// Parallelism
// =============================================================================

/// How many tiles may be produced at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parallelism {
    /// Every tile task may run concurrently
    Unbounded,
    /// One tile at a time, in deterministic order
    Sequential,
    /// At most this many tiles in flight (always > 1)
    Bounded(usize),
}

impl Parallelism {
    /// Interpret a raw limit: `<= 0` is unbounded, `1` is sequential, and
    /// anything larger bounds the number of tiles in flight.
    pub fn from_limit(limit: i64) -> Self {
        match limit {
            i64::MIN..=0 => Parallelism::Unbounded,
            1 => Parallelism::Sequential,
            n => Parallelism::Bounded(usize::try_from(n).unwrap_or(usize::MAX)),
        }
    }

    /// Bounded by the number of available CPUs.
    pub fn available() -> Self {
        let cpus = std::thread::available_parallelism().map_or(1, |n| n.get());
        Self::from_limit(i64::try_from(cpus).unwrap_or(i64::MAX))
    }

    /// Permit count for the gate, `None` when unbounded.
    pub fn limit(&self) -> Option<usize> {
        match self {
            Parallelism::Unbounded => None,
            Parallelism::Sequential => Some(1),
            Parallelism::Bounded(n) => Some(*n),
        }
    }
}

impl Default for Parallelism {
    fn default() -> Self {
        Self::available()
    }
}

impl fmt::Display for Parallelism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Parallelism::Unbounded => f.write_str("unbounded"),
            Parallelism::Sequential => f.write_str("sequential"),
            Parallelism::Bounded(n) => write!(f, "bounded({})", n),
        }
    }
}

// =============================================================================
// Admission Gate
// =============================================================================

/// Acquisition was abandoned because the work was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

/// Counting admission gate.
///
/// Cloning the gate shares the same permits.
#[derive(Debug, Clone)]
pub struct AdmissionGate {
    /// Permits, `None` when unbounded
    semaphore: Option<Arc<Semaphore>>,

    /// Total permits, `None` when unbounded
    limit: Option<usize>,

    /// Permits currently held
    in_flight: Arc<AtomicUsize>,

    /// Highest number of permits ever held at once
    peak: Arc<AtomicUsize>,
}

impl AdmissionGate {
    /// Create a gate that admits at most `permits` holders at once.
    pub fn new(permits: usize) -> Self {
        let permits = permits.max(1);
        Self {
            semaphore: Some(Arc::new(Semaphore::new(permits))),
            limit: Some(permits),
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Create a gate that never suspends.
    pub fn unbounded() -> Self {
        Self {
            semaphore: None,
            limit: None,
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Create the gate matching a parallelism setting.
    pub fn for_parallelism(parallelism: Parallelism) -> Self {
        match parallelism.limit() {
            Some(permits) => Self::new(permits),
            None => Self::unbounded(),
        }
    }

    /// Wait for a permit.
    ///
    /// Returns [`Cancelled`] if `cancel` fires first; no permit is held in
    /// that case.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<GatePermit, Cancelled> {
        if cancel.is_cancelled() {
            return Err(Cancelled);
        }

        let permit = match &self.semaphore {
            Some(semaphore) => {
                let semaphore = semaphore.clone();
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(Cancelled),
                    permit = semaphore.acquire_owned() => Some(permit.map_err(|_| Cancelled)?),
                }
            }
            None => None,
        };

        let held = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(held, Ordering::SeqCst);

        Ok(GatePermit {
            _permit: permit,
            in_flight: self.in_flight.clone(),
        })
    }

    /// Permits currently held.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of permits held at once since creation.
    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Permit limit, `None` when unbounded.
    pub fn limit(&self) -> Option<usize> {
        self.limit
    }
}

/// A held admission permit. Released on drop.
#[derive(Debug)]
pub struct GatePermit {
    _permit: Option<OwnedSemaphorePermit>,
    in_flight: Arc<AtomicUsize>,
}

impl GatePermit {
    /// Return the permit to the gate.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

// =============================================================================
// Tests
// =============================================================================
