use crate::models::Entry;
use crate::util::calculate_index_to_restore;

/// An entry removed locally whose remote delete has not been sent yet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct DeletedSlot {
    pub entry: Entry,
    /// Position in the list as it would look with every parked entry still in it.
    pub original_index: usize,
    /// Distinguishes two deletions of the same entry (delete, undo, delete).
    pub ticket: u64,
}

/// Soft-deleted entries, in removal order.
///
/// Pinned indices share one coordinate space: the live list with every
/// parked entry put back where it was. In that space a live entry's position
/// minus the number of parked entries before it is its live index, which is
/// exactly what `calculate_index_to_restore` computes on undo.
#[derive(Clone, Debug, Default)]
pub(crate) struct DeletedEntries {
    slots: Vec<DeletedSlot>,
    next_ticket: u64,
}

impl DeletedEntries {
    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slots(&self) -> &[DeletedSlot] {
        &self.slots
    }

    pub fn contains(&self, id: &str) -> bool {
        self.slots.iter().any(|s| s.entry.id == id)
    }

    /// Position in the shared space of the live entry at `live_index`.
    fn pin(&self, live_index: usize) -> usize {
        let mut pinned: Vec<usize> = self.slots.iter().map(|s| s.original_index).collect();
        pinned.sort_unstable();

        let mut pos = live_index;
        for k in pinned {
            if k <= pos {
                pos += 1;
            } else {
                break;
            }
        }
        pos
    }

    /// Parks `entry`, which was just removed from `live_index`.
    pub fn park(&mut self, entry: Entry, live_index: usize) -> u64 {
        let original_index = self.pin(live_index);
        self.next_ticket += 1;
        let ticket = self.next_ticket;
        self.slots.push(DeletedSlot {
            entry,
            original_index,
            ticket,
        });
        ticket
    }

    /// Undo: the entry and the live index to put it back at.
    pub fn take(&mut self, id: &str) -> Option<(Entry, usize)> {
        let at = self.slots.iter().position(|s| s.entry.id == id)?;
        let slot = self.slots.remove(at);
        let others: Vec<usize> = self.slots.iter().map(|s| s.original_index).collect();
        let index = calculate_index_to_restore(slot.original_index, &others);
        Some((slot.entry, index))
    }

    /// Grace period over: drops the slot if `ticket` still owns it.
    pub fn confirm(&mut self, id: &str, ticket: u64) -> Option<Entry> {
        let at = self
            .slots
            .iter()
            .position(|s| s.entry.id == id && s.ticket == ticket)?;
        Some(self.forget(at))
    }

    /// Drops the slot whatever its ticket (entry deleted elsewhere).
    pub fn discard(&mut self, id: &str) -> Option<Entry> {
        let at = self.slots.iter().position(|s| s.entry.id == id)?;
        Some(self.forget(at))
    }

    fn forget(&mut self, at: usize) -> Entry {
        let slot = self.slots.remove(at);
        for s in self.slots.iter_mut() {
            if s.original_index > slot.original_index {
                s.original_index -= 1;
            }
        }
        slot.entry
    }

    /// Keeps a parked entry's data current without showing it.
    pub fn refresh(&mut self, entry: Entry) -> bool {
        match self.slots.iter_mut().find(|s| s.entry.id == entry.id) {
            Some(slot) => {
                slot.entry = entry;
                true
            }
            None => false,
        }
    }

    /// A new entry appeared at `live_index`.
    pub fn note_live_insert(&mut self, live_index: usize) {
        let pos = self.pin(live_index);
        for s in self.slots.iter_mut() {
            if s.original_index >= pos {
                s.original_index += 1;
            }
        }
    }

    /// The live entry at `live_index` is about to vanish without being parked.
    pub fn note_live_removal(&mut self, live_index: usize) {
        let pos = self.pin(live_index);
        for s in self.slots.iter_mut() {
            if s.original_index > pos {
                s.original_index -= 1;
            }
        }
    }

    /// Re-pins every slot against a fresh server list (which still contains
    /// the parked entries) and returns the live part of it. Slots whose entry
    /// is gone from the server are dropped.
    pub fn rebase(&mut self, server: Vec<Entry>) -> Vec<Entry> {
        let mut live = Vec::with_capacity(server.len());
        let mut seen: Vec<String> = vec![];

        for (pos, entry) in server.into_iter().enumerate() {
            match self.slots.iter_mut().find(|s| s.entry.id == entry.id) {
                Some(slot) => {
                    slot.original_index = pos;
                    seen.push(entry.id.clone());
                    slot.entry = entry;
                }
                None => live.push(entry),
            }
        }

        self.slots.retain(|s| seen.iter().any(|id| id == &s.entry.id));
        live
    }
}
