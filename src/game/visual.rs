//! Visual collaborator module
//!
//! Boundary to the world-representation layer that owns physical/rendered
//! objects. The state services only hold opaque handles: they ask for a
//! visual on spawn and hand the handle back on removal. A failure to create
//! a visual is recoverable - the entity state exists either way.

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::trace;

use super::Position;

/// Opaque handle to a world-representation object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VisualHandle(pub u64);

/// World-representation collaborator: creates and destroys the physical
/// objects backing NPCs and loot pickups
pub trait WorldVisuals: Send + Sync {
    /// Create a visual of `kind` at `position`
    fn spawn(&self, kind: &str, position: Position) -> anyhow::Result<VisualHandle>;

    /// Destroy a previously created visual
    fn destroy(&self, handle: VisualHandle);
}

/// No-op visuals used when no engine runtime is attached (tests, headless
/// runs)
#[derive(Debug, Default)]
pub struct NullVisuals {
    next_handle: AtomicU64,
}

impl WorldVisuals for NullVisuals {
    fn spawn(&self, kind: &str, position: Position) -> anyhow::Result<VisualHandle> {
        let handle = VisualHandle(self.next_handle.fetch_add(1, Ordering::SeqCst));
        trace!(kind = kind, position = %position, handle = handle.0, "Spawned null visual");
        Ok(handle)
    }

    fn destroy(&self, handle: VisualHandle) {
        trace!(handle = handle.0, "Destroyed null visual");
    }
}
