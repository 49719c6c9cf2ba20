//! Fixed-capacity circular buffer

/// A circular buffer that overwrites its oldest slot once full.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    slots: Vec<Option<T>>,
    /// Slot the next push writes to
    next: usize,
    len: usize,
}

impl<T> RingBuffer<T> {
    /// Create a buffer holding at most `capacity` items (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self {
            slots,
            next: 0,
            len: 0,
        }
    }

    /// Insert an item, returning the item it overwrote (if the buffer was full).
    pub fn push(&mut self, item: T) -> Option<T> {
        let overwritten = self.slots[self.next].replace(item);
        self.next = (self.next + 1) % self.slots.len();
        if overwritten.is_none() {
            self.len += 1;
        }
        overwritten
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Iterate from the most recent item to the oldest.
    pub fn iter_newest_first(&self) -> impl Iterator<Item = &T> + '_ {
        let cap = self.slots.len();
        (0..self.len).filter_map(move |i| self.slots[(self.next + cap - 1 - i) % cap].as_ref())
    }

    /// Remove every item, handing each to `f` (oldest first).
    pub fn drain_with(&mut self, mut f: impl FnMut(T)) {
        let cap = self.slots.len();
        let start = (self.next + cap - self.len) % cap;
        for i in 0..self.len {
            if let Some(item) = self.slots[(start + i) % cap].take() {
                f(item);
            }
        }
        self.next = 0;
        self.len = 0;
    }
}

impl<T: Clone> RingBuffer<T> {
    /// Clone up to `n` items, newest first.
    pub fn newest(&self, n: usize) -> Vec<T> {
        self.iter_newest_first().take(n).cloned().collect()
    }
}
