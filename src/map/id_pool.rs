//! Recycling id allocator, one per entity kind

use std::collections::BTreeSet;

use crate::common::{EntityKind, SlamError, SlamResult};

/// Issues small non-negative ids and reissues released ones smallest-first
#[derive(Debug, Clone)]
pub struct IdPool {
    kind: EntityKind,
    next: usize,
    released: BTreeSet<usize>,
    live: BTreeSet<usize>,
}

impl IdPool {
    pub fn new(kind: EntityKind) -> Self {
        IdPool {
            kind,
            next: 0,
            released: BTreeSet::new(),
            live: BTreeSet::new(),
        }
    }

    /// Smallest released id if any, else the next counter value
    pub fn get_id(&mut self) -> usize {
        let id = match self.released.pop_first() {
            Some(id) => id,
            None => {
                let id = self.next;
                self.next += 1;
                id
            }
        };
        self.live.insert(id);
        id
    }

    /// Mark `id` available for reuse. Fails if `id` is not live.
    pub fn release_id(&mut self, id: usize) -> SlamResult<()> {
        if !self.live.remove(&id) {
            return Err(SlamError::unknown_id(self.kind, id));
        }
        self.released.insert(id);
        Ok(())
    }

    pub fn is_live(&self, id: usize) -> bool {
        self.live.contains(&id)
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }
}
