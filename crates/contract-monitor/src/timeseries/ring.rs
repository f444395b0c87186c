//! Bounded circular buffer backing every metric series.

/// A bounded circular buffer.
///
/// When full, the oldest item is overwritten. Push is O(1).
#[derive(Clone, Debug)]
pub struct RingBuffer<T> {
    buffer: Vec<Option<T>>,
    head: usize,
    len: usize,
}

impl<T: Clone> RingBuffer<T> {
    /// Create a ring buffer with the given capacity (at least one slot).
    pub fn new(capacity: usize) -> Self {
        let cap = capacity.max(1);
        Self {
            buffer: vec![None; cap],
            head: 0,
            len: 0,
        }
    }

    /// Push an item and return the one it evicted, if the buffer was full.
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = self.buffer[self.head].replace(item);
        self.head = (self.head + 1) % self.buffer.len();
        if self.len < self.buffer.len() {
            self.len += 1;
        }
        evicted
    }

    /// Iterate oldest first.
    pub fn iter(&self) -> RingBufferIter<'_, T> {
        self.iter_from(0)
    }

    /// Iterate over the most recent `n` items (or fewer), oldest first.
    pub fn recent(&self, n: usize) -> RingBufferIter<'_, T> {
        self.iter_from(self.len.saturating_sub(n))
    }

    /// The newest item.
    pub fn latest(&self) -> Option<&T> {
        if self.len == 0 {
            return None;
        }
        let cap = self.buffer.len();
        self.buffer[(self.head + cap - 1) % cap].as_ref()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    fn iter_from(&self, skip: usize) -> RingBufferIter<'_, T> {
        let cap = self.buffer.len();
        let oldest = if self.len < cap { 0 } else { self.head };
        RingBufferIter {
            buffer: &self.buffer,
            pos: (oldest + skip) % cap,
            remaining: self.len - skip.min(self.len),
        }
    }
}

/// Iterator over a [`RingBuffer`].
pub struct RingBufferIter<'a, T> {
    buffer: &'a [Option<T>],
    pos: usize,
    remaining: usize,
}

impl<'a, T> Iterator for RingBufferIter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let item = self.buffer[self.pos].as_ref();
        self.pos = (self.pos + 1) % self.buffer.len();
        self.remaining -= 1;
        item
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<T> ExactSizeIterator for RingBufferIter<'_, T> {}
