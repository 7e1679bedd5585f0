//! Byte budget shared by all entries of a store

/// Tracks used vs. allowed bytes (key + value lengths)
#[derive(Debug, Clone)]
pub(crate) struct SizeBudget {
    max: usize,
    current: usize,
}

impl SizeBudget {
    pub(crate) fn new(max: usize) -> Self {
        Self { max, current: 0 }
    }

    pub(crate) fn max(&self) -> usize {
        self.max
    }

    pub(crate) fn current(&self) -> usize {
        self.current
    }

    /// Whether `size` bytes could be stored at all, with nothing else present
    pub(crate) fn fits(&self, size: usize) -> bool {
        size <= self.max
    }

    /// Whether `size` more bytes can be stored without evicting anything
    pub(crate) fn has_room(&self, size: usize) -> bool {
        size <= self.max - self.current
    }

    pub(crate) fn charge(&mut self, size: usize) {
        debug_assert!(self.has_room(size), "charge of {} exceeds budget", size);
        self.current += size;
    }

    pub(crate) fn release(&mut self, size: usize) {
        debug_assert!(size <= self.current, "release of {} below zero", size);
        self.current -= size;
    }
}
