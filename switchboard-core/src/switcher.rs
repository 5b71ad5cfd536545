//! Program source selection
//!
//! The switcher owns the id -> source registry and the single active
//! selection. The selection is one atomically swapped pointer: readers on
//! the output paths load it without locking, and concurrent selections
//! resolve to whichever store lands last.

use arc_swap::ArcSwapOption;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::error::{Result, SwitchboardError};
use crate::ingest::SourceSlot;
use crate::types::{Frame, SourceState};

/// Registry of ingesting sources plus the active selection
pub struct Switcher {
    sources: RwLock<HashMap<String, Arc<SourceSlot>>>,
    active: ArcSwapOption<SourceSlot>,
    staleness: Duration,
}

impl Switcher {
    /// Create a switcher; frames older than `staleness` are not served
    pub fn new(staleness: Duration) -> Self {
        Self {
            sources: RwLock::new(HashMap::new()),
            active: ArcSwapOption::empty(),
            staleness,
        }
    }

    /// Add a source, replacing any previous registration under the same id
    ///
    /// If the replaced source was active, the selection follows the new one.
    pub fn register(&self, slot: Arc<SourceSlot>) {
        let mut sources = self.sources.write();
        let id = slot.id().to_string();
        if self.active_id_is(&id) {
            self.active.store(Some(slot.clone()));
        }
        debug!("Registered source {}", id);
        sources.insert(id, slot);
    }

    /// Remove `slot`; clears the selection if it was active
    ///
    /// Only this exact registration is removed: a newer slot registered
    /// under the same id stays. Returns whether the selection was cleared.
    pub fn unregister(&self, slot: &Arc<SourceSlot>) -> bool {
        let mut sources = self.sources.write();
        let id = slot.id();
        if sources
            .get(id)
            .is_some_and(|current| Arc::ptr_eq(current, slot))
        {
            sources.remove(id);
            debug!("Unregistered source {}", id);
        }

        let is_active = self
            .active
            .load_full()
            .is_some_and(|active| Arc::ptr_eq(&active, slot));
        if is_active {
            self.active.store(None);
            info!("Active source {} removed, program output is now empty", id);
        }
        is_active
    }

    /// Make `id` the program source
    ///
    /// Takes effect on the next output cycle. Fails with `UnknownSource`
    /// and leaves the selection untouched when `id` is not registered or
    /// its ingestion has stopped.
    pub fn select_source(&self, id: &str) -> Result<()> {
        let sources = self.sources.read();
        let slot = sources
            .get(id)
            .filter(|slot| slot.state() != SourceState::Stopped)
            .ok_or_else(|| SwitchboardError::unknown_source(id))?;

        // Stored under the registry lock so an unregister can't slip in between
        self.active.store(Some(slot.clone()));
        info!("Program source is now {}", id);
        Ok(())
    }

    /// Select nothing
    pub fn clear_selection(&self) {
        self.active.store(None);
    }

    /// Id of the active source
    pub fn active_source(&self) -> Option<String> {
        self.active.load_full().map(|slot| slot.id().to_string())
    }

    /// Latest frame of the active source
    ///
    /// `None` means "skip this cycle": nothing selected, no frame yet, or
    /// the active source's frame is older than the staleness window.
    pub fn current_frame(&self) -> Option<Arc<Frame>> {
        self.current_frame_at(Instant::now())
    }

    /// [`Self::current_frame`] evaluated at `now`
    pub fn current_frame_at(&self, now: Instant) -> Option<Arc<Frame>> {
        let slot = self.active.load_full()?;
        if slot.state() == SourceState::Stopped {
            return None;
        }
        slot.buffer().latest_at(now, self.staleness)
    }

    /// Registered source ids, sorted
    pub fn sources(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sources.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sources.read().contains_key(id)
    }

    pub fn staleness(&self) -> Duration {
        self.staleness
    }

    fn active_id_is(&self, id: &str) -> bool {
        self.active
            .load_full()
            .is_some_and(|slot| slot.id() == id)
    }
}

impl std::fmt::Debug for Switcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Switcher")
            .field("sources", &self.sources())
            .field("active", &self.active_source())
            .field("staleness", &self.staleness)
            .finish()
    }
}
