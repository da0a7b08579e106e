use crate::models::{Entry, SENTINEL_ID};

/// The ordered list the page renders.
///
/// Lookups match the exact id first and fall back to the first entry still
/// carrying the sentinel id, so a server answer for a freshly added entry lands
/// on its local placeholder whichever of them arrives first.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct EntryList {
    entries: Vec<Entry>,
}

/// What `upsert` did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Upserted {
    Replaced(usize),
    Appended(usize),
}

impl EntryList {
    #[cfg(test)]
    pub fn new(entries: Vec<Entry>) -> Self {
        Self { entries }
    }

    pub fn as_slice(&self) -> &[Entry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Entry> {
        self.entries.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Entry> {
        self.entries.get_mut(index)
    }

    pub fn position_exact(&self, id: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.id == id)
    }

    pub fn sentinel_index(&self) -> Option<usize> {
        self.position_exact(SENTINEL_ID)
    }

    pub fn has_sentinel(&self) -> bool {
        self.sentinel_index().is_some()
    }

    /// Exact id, else the first sentinel entry.
    pub fn find_index(&self, id: &str) -> Option<usize> {
        self.position_exact(id).or_else(|| self.sentinel_index())
    }

    #[cfg(test)]
    pub fn find(&self, id: &str) -> Option<&Entry> {
        self.find_index(id).and_then(|i| self.entries.get(i))
    }

    /// Replaces the matching entry in place, or appends.
    pub fn upsert(&mut self, entry: Entry) -> Upserted {
        match self.find_index(&entry.id) {
            Some(i) => {
                self.entries[i] = entry;
                Upserted::Replaced(i)
            }
            None => {
                self.entries.push(entry);
                Upserted::Appended(self.entries.len() - 1)
            }
        }
    }

    /// Removes the matching entry; `None` when nothing matched.
    pub fn remove_by_id(&mut self, id: &str) -> Option<(usize, Entry)> {
        let i = self.find_index(id)?;
        Some((i, self.entries.remove(i)))
    }

    /// Clamped to the current length.
    pub fn insert_at(&mut self, index: usize, entry: Entry) -> usize {
        let index = index.min(self.entries.len());
        self.entries.insert(index, entry);
        index
    }

    /// Gives the placeholder its server id. `false` when no placeholder is left.
    pub fn resolve_sentinel(&mut self, id: &str) -> bool {
        match self.sentinel_index() {
            Some(i) => {
                self.entries[i].id = id.to_string();
                true
            }
            None => false,
        }
    }

    pub fn replace_all(&mut self, entries: Vec<Entry>) {
        self.entries = entries;
    }
}
