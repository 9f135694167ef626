//! Session registry of created host elements
//!
//! Provides [`Registry`], the single source of truth for which host handles
//! this session created. One registry is built per session and shared by
//! reference; all mutations are serialized behind one lock.

use crate::error::InstrError;
use crate::handle::ElementHandle;
use crate::host::HostApi;
use indexmap::IndexSet;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// Registry statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Handles recorded (duplicates not counted)
    pub recorded: usize,
    /// Handles confirmed deleted by `clear`
    pub cleared: usize,
    /// Handles kept after a failed host delete
    pub retained_after_failure: usize,
    /// Non-empty redraws issued
    pub redraws: usize,
}

#[derive(Debug, Default)]
struct Inner {
    handles: IndexSet<ElementHandle>,
    stats: RegistryStats,
}

/// Ordered set of live handles owned by this session
pub struct Registry {
    host: Arc<dyn HostApi>,
    /// Resolved from host capabilities at construction
    can_recreate: bool,
    inner: Mutex<Inner>,
}

impl Registry {
    /// Create an empty registry bound to `host`
    #[must_use]
    pub fn new(host: Arc<dyn HostApi>) -> Self {
        let can_recreate = host.capabilities().supports_recreate;
        Self {
            host,
            can_recreate,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Track `handle`; returns `false` if it was already tracked
    pub fn record(&self, handle: ElementHandle) -> bool {
        let mut inner = self.inner.lock();
        let inserted = inner.handles.insert(handle);
        if inserted {
            inner.stats.recorded += 1;
            tracing::debug!("Recorded {handle} ({} tracked)", inner.handles.len());
        }
        inserted
    }

    /// Track handles left over from an earlier session
    pub fn adopt(&self, handles: impl IntoIterator<Item = ElementHandle>) -> usize {
        let mut inner = self.inner.lock();
        let before = inner.handles.len();
        inner.handles.extend(handles);
        let adopted = inner.handles.len() - before;
        inner.stats.recorded += adopted;
        adopted
    }

    /// Delete every tracked element in one batched host call, then refresh.
    ///
    /// No host call is made when nothing is tracked. On failure, handles the
    /// host did delete are dropped and the rest stay tracked for the next call.
    ///
    /// # Returns
    /// Number of handles removed
    ///
    /// # Errors
    /// `HostCallFailed` if the host delete failed, after bookkeeping is updated
    pub fn clear(&self) -> Result<usize, InstrError> {
        let mut inner = self.inner.lock();
        if inner.handles.is_empty() {
            return Ok(0);
        }

        let batch: Vec<ElementHandle> = inner.handles.iter().copied().collect();
        match self.host.delete(&batch) {
            Ok(()) => {
                self.host.refresh();
                inner.handles.clear();
                inner.stats.cleared += batch.len();
                tracing::info!("Cleared {} instruction elements", batch.len());
                Ok(batch.len())
            }
            Err(err) => {
                let retained: IndexSet<ElementHandle> = match err.failed_handles() {
                    Some(failed) => batch
                        .iter()
                        .copied()
                        .filter(|h| failed.contains(h))
                        .collect(),
                    None => inner.handles.clone(),
                };
                let removed = batch.len() - retained.len();
                if removed > 0 {
                    self.host.refresh();
                }
                inner.stats.cleared += removed;
                inner.stats.retained_after_failure += retained.len();
                inner.handles = retained;
                tracing::warn!(
                    "Clear removed {removed} of {} elements, {} retained: {err}",
                    batch.len(),
                    inner.handles.len()
                );
                Err(err.into())
            }
        }
    }

    /// Force the host to materialize every tracked element, then refresh.
    ///
    /// No host call is made when nothing is tracked. Degrades to a plain
    /// refresh on hosts without recreate support.
    ///
    /// # Errors
    /// `HostCallFailed` if the host recreate failed
    pub fn redraw(&self) -> Result<usize, InstrError> {
        let mut inner = self.inner.lock();
        if inner.handles.is_empty() {
            return Ok(0);
        }

        let batch: Vec<ElementHandle> = inner.handles.iter().copied().collect();
        if self.can_recreate {
            if let Err(err) = self.host.recreate(&batch) {
                tracing::warn!("Redraw of {} elements failed: {err}", batch.len());
                return Err(err.into());
            }
        }
        self.host.refresh();
        inner.stats.redraws += 1;
        tracing::info!("Redrew {} instruction elements", batch.len());
        Ok(batch.len())
    }

    /// Check if `handle` is tracked
    #[inline]
    #[must_use]
    pub fn contains(&self, handle: ElementHandle) -> bool {
        self.inner.lock().handles.contains(&handle)
    }

    /// Tracked handles in recording order
    #[must_use]
    pub fn handles(&self) -> Vec<ElementHandle> {
        self.inner.lock().handles.iter().copied().collect()
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().handles.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().handles.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        self.inner.lock().stats
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Registry")
            .field("can_recreate", &self.can_recreate)
            .field("handles", &inner.handles)
            .field("stats", &inner.stats)
            .finish_non_exhaustive()
    }
}
