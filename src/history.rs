//! Undo/redo history - a ring of deltas capped by a full snapshot
//!
//! Only the newest entry stores a full `Snapshot`; every older entry
//! stores the `SnapshotDelta` that, restored against the logical snapshot
//! above it, reproduces the logical snapshot at its own position.
//! `position` walks the ring; `current` is the materialized snapshot the
//! cursor points at (empty past the end). `before_restore` remembers the
//! live state at the moment of the first undo, so a final redo returns
//! the user exactly where they left.

use log::debug;
use thiserror::Error;

use crate::simulation::Simulation;
use crate::snapshot::{Snapshot, SnapshotDelta};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HistoryError {
    #[error("nothing left to undo")]
    NothingToUndo,
    #[error("nothing left to redo")]
    NothingToRedo,
}

enum HistoryEntry {
    Snap(Snapshot),
    Delta(SnapshotDelta),
}

impl HistoryEntry {
    fn byte_size(&self) -> usize {
        match self {
            HistoryEntry::Snap(snap) => snap.byte_size(),
            HistoryEntry::Delta(delta) => delta.byte_size(),
        }
    }
}

pub struct History {
    entries: Vec<HistoryEntry>,
    position: usize,
    current: Option<Snapshot>,
    before_restore: Option<Snapshot>,
    /// Entry-count cap. Deltas can outgrow snapshots in pathological
    /// cases; `total_bytes` exposes the real footprint so a byte budget
    /// can be layered on top.
    pub undo_history_limit: usize,
}

impl Default for History {
    fn default() -> Self {
        History::new(5)
    }
}

impl History {
    pub fn new(undo_history_limit: usize) -> Self {
        History {
            entries: Vec::new(),
            position: 0,
            current: None,
            before_restore: None,
            undo_history_limit,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn can_undo(&self) -> bool {
        self.position > 0
    }

    pub fn can_redo(&self) -> bool {
        self.position < self.entries.len()
    }

    pub fn has_before_restore(&self) -> bool {
        self.before_restore.is_some()
    }

    pub fn total_bytes(&self) -> usize {
        self.entries.iter().map(HistoryEntry::byte_size).sum()
    }

    /// Push the current sim state. Entries above the cursor are dropped;
    /// the entry below the insertion point is rebased so its delta leads
    /// to the new snapshot; the previous full snapshot is demoted to a
    /// delta; the front is trimmed to the limit.
    pub fn push(&mut self, sim: &Simulation) {
        self.before_restore = None;
        let last = Snapshot::from_sim(sim);

        let rebase_onto: Option<Snapshot> = if self.position > 0 {
            if self.position < self.entries.len() {
                // Step the materialized cursor snapshot back one so it
                // becomes the logical snapshot below the insertion point.
                match (self.current.take(), &self.entries[self.position - 1]) {
                    (_, HistoryEntry::Snap(snap)) => Some(snap.clone()),
                    (Some(current), HistoryEntry::Delta(delta)) => Some(delta.restore(&current)),
                    (None, HistoryEntry::Delta(_)) => None,
                }
            } else {
                match self.entries.last() {
                    Some(HistoryEntry::Snap(snap)) => Some(snap.clone()),
                    _ => None,
                }
            }
        } else {
            None
        };

        self.entries.truncate(self.position);
        if let Some(base) = rebase_onto {
            let delta = SnapshotDelta::diff(&base, &last);
            if let Some(prev) = self.entries.last_mut() {
                *prev = HistoryEntry::Delta(delta);
            }
        }
        self.entries.push(HistoryEntry::Snap(last));
        self.position += 1;
        self.current = None;
        while self.entries.len() > self.undo_history_limit {
            self.entries.remove(0);
            self.position -= 1;
        }
        debug!(
            "history push: {} entries, position {}, {} bytes",
            self.entries.len(),
            self.position,
            self.total_bytes()
        );
    }

    /// Step back one entry and restore it into the sim.
    pub fn undo(&mut self, sim: &mut Simulation) -> Result<(), HistoryError> {
        if self.position == 0 {
            return Err(HistoryError::NothingToUndo);
        }
        if self.before_restore.is_none() {
            self.before_restore = Some(Snapshot::from_sim(sim));
        }
        self.position -= 1;
        let stepped = match (&self.entries[self.position], self.current.as_ref()) {
            (HistoryEntry::Snap(snap), _) => snap.clone(),
            (HistoryEntry::Delta(delta), Some(current)) => delta.restore(current),
            // Entries below the top are always deltas and the cursor is
            // materialized on the way down; nothing sane to do otherwise.
            (HistoryEntry::Delta(_), None) => {
                self.position += 1;
                return Err(HistoryError::NothingToUndo);
            }
        };
        stepped.restore_into(sim);
        self.current = Some(stepped);
        Ok(())
    }

    /// Step forward one entry; stepping past the end restores the state
    /// captured before the first undo.
    pub fn redo(&mut self, sim: &mut Simulation) -> Result<(), HistoryError> {
        if self.position >= self.entries.len() {
            return Err(HistoryError::NothingToRedo);
        }
        self.position += 1;
        if self.position == self.entries.len() {
            self.current = None;
            if let Some(before) = self.before_restore.take() {
                before.restore_into(sim);
            } else if let Some(HistoryEntry::Snap(snap)) = self.entries.last() {
                // No pre-undo state to return to; the top snapshot is it.
                snap.clone().restore_into(sim);
            }
            return Ok(());
        }
        // The entry at the new position is only a full snapshot at the
        // top; otherwise step forward through the delta below it.
        let stepped = match (&self.entries[self.position], self.current.as_ref()) {
            (HistoryEntry::Snap(snap), _) => snap.clone(),
            (_, Some(current)) => match &self.entries[self.position - 1] {
                HistoryEntry::Delta(delta) => delta.forward(current),
                HistoryEntry::Snap(snap) => snap.clone(),
            },
            (_, None) => {
                self.position -= 1;
                return Err(HistoryError::NothingToRedo);
            }
        };
        stepped.restore_into(sim);
        self.current = Some(stepped);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimulationConfig;
    use crate::elements::{PT_DUST, PT_WATR};

    fn sim() -> Simulation {
        Simulation::new(SimulationConfig::default()).unwrap()
    }

    #[test]
    fn undo_redo_walks_the_ring() {
        let mut sim = sim();
        let mut history = History::new(3);

        history.push(&sim); // A: empty
        let a = Snapshot::from_sim(&sim).hash();

        sim.create_part(-2, 10, 60, PT_DUST);
        history.push(&sim); // B
        let b = Snapshot::from_sim(&sim).hash();

        sim.create_part(-2, 20, 60, PT_WATR);
        history.push(&sim); // C
        let c = Snapshot::from_sim(&sim).hash();

        // The first undo materializes the top entry (the state just
        // pushed); each further undo steps one entry down.
        history.undo(&mut sim).unwrap();
        assert_eq!(Snapshot::from_sim(&sim).hash(), c);
        history.undo(&mut sim).unwrap();
        assert_eq!(Snapshot::from_sim(&sim).hash(), b);
        history.undo(&mut sim).unwrap();
        assert_eq!(Snapshot::from_sim(&sim).hash(), a);
        assert_eq!(history.undo(&mut sim), Err(HistoryError::NothingToUndo));

        history.redo(&mut sim).unwrap();
        assert_eq!(Snapshot::from_sim(&sim).hash(), b);
        history.redo(&mut sim).unwrap();
        assert_eq!(Snapshot::from_sim(&sim).hash(), c);
        // The final redo returns to the pre-undo live state.
        history.redo(&mut sim).unwrap();
        assert_eq!(Snapshot::from_sim(&sim).hash(), c);
        assert!(!history.has_before_restore());
        assert_eq!(history.redo(&mut sim), Err(HistoryError::NothingToRedo));
    }

    #[test]
    fn final_redo_restores_the_pre_undo_state() {
        let mut sim = sim();
        let mut history = History::new(5);
        history.push(&sim);

        // Work after the last push is recoverable through beforeRestore.
        sim.create_part(-2, 30, 60, PT_DUST);
        let live = Snapshot::from_sim(&sim).hash();
        history.undo(&mut sim).unwrap();
        assert_ne!(Snapshot::from_sim(&sim).hash(), live);
        history.redo(&mut sim).unwrap();
        assert_eq!(Snapshot::from_sim(&sim).hash(), live);
        assert!(!history.has_before_restore());
    }

    #[test]
    fn push_at_cursor_drops_the_tail_and_rebases() {
        let mut sim = sim();
        let mut history = History::new(8);

        history.push(&sim); // A
        sim.create_part(-2, 10, 60, PT_DUST);
        history.push(&sim); // B
        sim.create_part(-2, 20, 60, PT_DUST);
        history.push(&sim); // C
        assert_eq!(history.len(), 3);

        history.undo(&mut sim).unwrap(); // materialize C
        history.undo(&mut sim).unwrap(); // back to B
        sim.create_part(-2, 40, 60, PT_WATR);
        history.push(&sim); // B' replaces the dropped C
        let b_prime = Snapshot::from_sim(&sim).hash();
        assert_eq!(history.len(), 2);
        assert_eq!(history.position(), 2);

        history.undo(&mut sim).unwrap(); // materialize B'
        history.undo(&mut sim).unwrap(); // back to the rebased base
        let base = Snapshot::from_sim(&sim).hash();
        history.redo(&mut sim).unwrap();
        assert_eq!(Snapshot::from_sim(&sim).hash(), b_prime);
        assert_ne!(base, b_prime);
    }

    #[test]
    fn ring_is_trimmed_to_the_limit() {
        let mut sim = sim();
        let mut history = History::new(3);
        for x in 0..6 {
            sim.create_part(-2, 10 + x, 60, PT_DUST);
            history.push(&sim);
        }
        assert_eq!(history.len(), 3);
        assert_eq!(history.position(), 3);
        // Only three undos are possible.
        assert!(history.undo(&mut sim).is_ok());
        assert!(history.undo(&mut sim).is_ok());
        assert!(history.undo(&mut sim).is_ok());
        assert_eq!(history.undo(&mut sim), Err(HistoryError::NothingToUndo));
    }

    #[test]
    fn only_the_last_entry_is_a_full_snapshot() {
        let mut sim = sim();
        let mut history = History::new(8);
        for x in 0..4 {
            sim.create_part(-2, 10 + x, 60, PT_DUST);
            history.push(&sim);
        }
        let full: usize = history
            .entries
            .iter()
            .filter(|e| matches!(e, HistoryEntry::Snap(_)))
            .count();
        assert_eq!(full, 1);
        assert!(matches!(history.entries.last(), Some(HistoryEntry::Snap(_))));
    }
}
