//! Fixed-capacity mean vector and covariance matrix with a slot allocator
//!
//! Entities do not index the shared state directly. They request a [`Slot`]
//! (a contiguous index range) of the size they need and keep it until they
//! are destroyed. Free ranges are handed out first-fit in ascending order of
//! their start index. Adjacent free ranges are merged on release, but
//! allocated slots are never moved, so a fragmented arena can refuse a
//! request even though its total free capacity would suffice.

use nalgebra::{DMatrix, DMatrixView, DMatrixViewMut, DVector, DVectorView, DVectorViewMut};
use std::collections::BTreeMap;
use std::ops::Range;
use tracing::{debug, warn};

use crate::common::{SlamError, SlamResult};

/// Contiguous, exclusively owned index range of the shared state
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Slot {
    start: usize,
    len: usize,
}

impl Slot {
    pub fn empty() -> Self {
        Slot { start: 0, len: 0 }
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn end(&self) -> usize {
        self.start + self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.end()
    }

    pub fn contains(&self, index: usize) -> bool {
        self.range().contains(&index)
    }
}

/// Shared state buffer of a map
#[derive(Debug, Clone)]
pub struct StateArena {
    mean: DVector<f64>,
    covariance: DMatrix<f64>,
    /// start -> len
    free: BTreeMap<usize, usize>,
    /// start -> len
    allocated: BTreeMap<usize, usize>,
    high_water_mark: usize,
}

impl StateArena {
    /// Create an arena of `max_size` states, zero mean and zero covariance
    pub fn new(max_size: usize) -> Self {
        let mut free = BTreeMap::new();
        if max_size > 0 {
            free.insert(0, max_size);
        }
        StateArena {
            mean: DVector::zeros(max_size),
            covariance: DMatrix::zeros(max_size, max_size),
            free,
            allocated: BTreeMap::new(),
            high_water_mark: 0,
        }
    }

    pub fn max_size(&self) -> usize {
        self.mean.len()
    }

    /// Highest index ever allocated, plus one
    pub fn high_water_mark(&self) -> usize {
        self.high_water_mark
    }

    pub fn used_size(&self) -> usize {
        self.allocated.values().sum()
    }

    pub fn free_size(&self) -> usize {
        self.max_size() - self.used_size()
    }

    pub fn largest_free(&self) -> usize {
        self.free.values().copied().max().unwrap_or(0)
    }

    /// Whether a slot of `size` states can currently be allocated
    pub fn unused_states(&self, size: usize) -> bool {
        size == 0 || self.largest_free() >= size
    }

    /// Reserve `size` contiguous states, first-fit
    pub fn allocate(&mut self, size: usize) -> SlamResult<Slot> {
        if size == 0 {
            return Ok(Slot::empty());
        }

        let found = self
            .free
            .iter()
            .find(|&(_, &len)| len >= size)
            .map(|(&start, &len)| (start, len));

        let (start, len) = match found {
            Some(range) => range,
            None => {
                let err = SlamError::CapacityExceeded {
                    requested: size,
                    largest_free: self.largest_free(),
                    capacity: self.max_size(),
                };
                warn!("{}", err);
                return Err(err);
            }
        };

        self.free.remove(&start);
        if len > size {
            self.free.insert(start + size, len - size);
        }
        self.allocated.insert(start, size);
        self.high_water_mark = self.high_water_mark.max(start + size);

        debug!(start, size, "allocated slot");
        Ok(Slot { start, len: size })
    }

    /// Return `slot` to the free ranges. Numeric contents are left untouched.
    pub fn release(&mut self, slot: Slot) -> SlamResult<()> {
        if slot.is_empty() {
            return Ok(());
        }
        if self.allocated.get(&slot.start) != Some(&slot.len) {
            return Err(SlamError::UnknownSlot {
                start: slot.start,
                end: slot.end(),
            });
        }
        self.allocated.remove(&slot.start);

        let mut start = slot.start;
        let mut len = slot.len;

        let before = self
            .free
            .range(..start)
            .next_back()
            .map(|(&s, &l)| (s, l));
        if let Some((prev_start, prev_len)) = before {
            if prev_start + prev_len == start {
                self.free.remove(&prev_start);
                start = prev_start;
                len += prev_len;
            }
        }
        if let Some(next_len) = self.free.remove(&(start + len)) {
            len += next_len;
        }
        self.free.insert(start, len);

        debug!(start = slot.start, size = slot.len, "released slot");
        Ok(())
    }

    pub fn is_allocated(&self, slot: Slot) -> bool {
        slot.is_empty() || self.allocated.get(&slot.start) == Some(&slot.len)
    }

    /// Allocated slots in ascending order
    pub fn slots(&self) -> Vec<Slot> {
        self.allocated
            .iter()
            .map(|(&start, &len)| Slot { start, len })
            .collect()
    }

    /// Union of all allocated ranges, ascending
    pub fn used_indices(&self) -> Vec<usize> {
        self.allocated
            .iter()
            .flat_map(|(&start, &len)| start..start + len)
            .collect()
    }

    pub fn mean(&self) -> &DVector<f64> {
        &self.mean
    }

    pub fn mean_mut(&mut self) -> &mut DVector<f64> {
        &mut self.mean
    }

    pub fn covariance(&self) -> &DMatrix<f64> {
        &self.covariance
    }

    pub fn covariance_mut(&mut self) -> &mut DMatrix<f64> {
        &mut self.covariance
    }

    pub fn slot_mean(&self, slot: Slot) -> DVectorView<'_, f64> {
        self.mean.rows(slot.start, slot.len)
    }

    pub fn slot_mean_mut(&mut self, slot: Slot) -> DVectorViewMut<'_, f64> {
        self.mean.rows_mut(slot.start, slot.len)
    }

    /// Diagonal covariance block of `slot`
    pub fn slot_covariance(&self, slot: Slot) -> DMatrixView<'_, f64> {
        self.covariance
            .view((slot.start, slot.start), (slot.len, slot.len))
    }

    pub fn slot_covariance_mut(&mut self, slot: Slot) -> DMatrixViewMut<'_, f64> {
        self.covariance
            .view_mut((slot.start, slot.start), (slot.len, slot.len))
    }

    /// Cross-covariance block between `rows` and `cols`
    pub fn cross_covariance(&self, rows: Slot, cols: Slot) -> DMatrixView<'_, f64> {
        self.covariance
            .view((rows.start, cols.start), (rows.len, cols.len))
    }
}
