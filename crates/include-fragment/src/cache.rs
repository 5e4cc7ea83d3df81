//! Fragment cache — memoizes one load outcome per element.
//!
//! The cache holds at most one entry: the current locator and a shared,
//! lazily-settled [`Settlement`] of its pipeline run. Readers get clones of
//! the settlement, never the slot itself, so nothing outside the cache can
//! overwrite or remove what future reads observe.
//!
//! ## Staleness
//!
//! Every new entry and every [`FragmentCache::invalidate`] bumps a
//! generation counter. An activation remembers the generation it started
//! under; if the counter has moved by the time its settlement resolves, the
//! result is stale and the activation discards it.

use futures::future::{BoxFuture, FutureExt, Shared};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::task::{Context, Poll};

use crate::types::{FragmentError, LoadOutcome};

/// A read-only, clonable handle on a (possibly pending) load outcome.
///
/// All clones share one underlying computation: the pipeline runs once, no
/// matter how many readers await it.
#[derive(Clone)]
pub struct Settlement {
    inner: Shared<BoxFuture<'static, LoadOutcome>>,
}

impl Settlement {
    /// Wrap a pipeline run.
    pub fn new(run: BoxFuture<'static, LoadOutcome>) -> Self {
        Self { inner: run.shared() }
    }

    /// An already-settled outcome.
    pub fn ready(outcome: LoadOutcome) -> Self {
        Self::new(futures::future::ready(outcome).boxed())
    }

    /// The outcome, if the run has completed.
    pub fn peek(&self) -> Option<&LoadOutcome> {
        self.inner.peek()
    }

    pub fn is_settled(&self) -> bool {
        self.peek().is_some()
    }
}

impl Future for Settlement {
    type Output = LoadOutcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.inner).poll(cx)
    }
}

impl std::fmt::Debug for Settlement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.peek() {
            Some(outcome) => f.debug_tuple("Settlement").field(outcome).finish(),
            None => f.write_str("Settlement(<pending>)"),
        }
    }
}

/// The cached entry: current locator and its settlement.
struct CachedEntry {
    locator: String,
    generation: u64,
    settlement: Settlement,
}

/// A settlement handed out by the cache, tagged with its generation.
#[derive(Debug, Clone)]
pub struct Lookup {
    pub settlement: Settlement,
    pub generation: u64,
    /// Whether this lookup started a new pipeline run.
    pub started: bool,
}

/// Per-element single-entry cache.
pub struct FragmentCache {
    slot: Mutex<Option<CachedEntry>>,
    generation: AtomicU64,
}

impl FragmentCache {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            generation: AtomicU64::new(0),
        }
    }

    /// The settlement for `locator`, starting `run` only when there is no
    /// entry for that locator yet.
    ///
    /// A pending or settled entry for the same locator is reused, which
    /// deduplicates concurrent activations. An entry for another locator is
    /// replaced; its run keeps going but can no longer reach this cache.
    pub fn get_or_start<F>(&self, locator: &str, run: F) -> Lookup
    where
        F: FnOnce() -> BoxFuture<'static, LoadOutcome>,
    {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(entry) = slot.as_ref() {
            if entry.locator == locator {
                return Lookup {
                    settlement: entry.settlement.clone(),
                    generation: entry.generation,
                    started: false,
                };
            }
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let settlement = Settlement::new(run());
        tracing::trace!("fragment cache entry #{generation} for {locator:?}");
        *slot = Some(CachedEntry {
            locator: locator.to_string(),
            generation,
            settlement: settlement.clone(),
        });

        Lookup {
            settlement,
            generation,
            started: true,
        }
    }

    /// The current settlement, or an already-failed one when nothing has
    /// been activated yet.
    pub fn current(&self) -> Settlement {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|e| e.settlement.clone())
            .unwrap_or_else(|| Settlement::ready(Err(FragmentError::NoSource)))
    }

    /// Drop the entry so the next lookup re-runs the pipeline, even for an
    /// unchanged locator.
    pub fn invalidate(&self) {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.take().is_some() {
            tracing::trace!("fragment cache invalidated");
        }
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Whether a lookup from `generation` still reflects the cache.
    pub fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    /// Locator of the cached entry, if any.
    pub fn locator(&self) -> Option<String> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|e| e.locator.clone())
    }

    pub fn is_empty(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

impl Default for FragmentCache {
    fn default() -> Self {
        Self::new()
    }
}
