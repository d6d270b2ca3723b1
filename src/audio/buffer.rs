//! Mirrored byte ring buffer
//!
//! Re-chunks variable-size network payloads into fixed-size reads. The
//! backing store is twice the logical capacity and every write lands in
//! both halves, so the occupied region starting at the read cursor is
//! always one contiguous slice even when it wraps logically.
//!
//! Owned by the producer thread; not shared.

use crate::error::BufferError;

/// Fixed-capacity mirrored ring buffer
pub struct RingBuffer {
    /// Backing store, `2 * capacity` bytes
    data: Box<[u8]>,
    capacity: usize,
    /// Read cursor, `0..capacity`
    head: usize,
    /// Write cursor, `0..capacity`
    tail: usize,
    len: usize,
    /// Writes rejected because the buffer was full
    overflow_count: u64,
}

impl RingBuffer {
    /// Create a ring buffer holding up to `capacity` bytes
    pub fn new(capacity: usize) -> Result<Self, BufferError> {
        if capacity == 0 {
            return Err(BufferError::ZeroCapacity);
        }

        Ok(Self {
            data: vec![0u8; capacity * 2].into_boxed_slice(),
            capacity,
            head: 0,
            tail: 0,
            len: 0,
            overflow_count: 0,
        })
    }

    /// Append all of `bytes` or nothing
    ///
    /// Fails with [`BufferError::Full`] when free space is short, leaving the
    /// buffer untouched.
    pub fn write(&mut self, bytes: &[u8]) -> Result<(), BufferError> {
        if bytes.is_empty() {
            return Ok(());
        }
        let free = self.free_space();
        if bytes.len() > free {
            self.overflow_count += 1;
            return Err(BufferError::Full {
                requested: bytes.len(),
                free,
            });
        }

        let cap = self.capacity;
        let first = bytes.len().min(cap - self.tail);
        let (front, rest) = bytes.split_at(first);

        self.data[self.tail..self.tail + first].copy_from_slice(front);
        self.data[self.tail + cap..self.tail + cap + first].copy_from_slice(front);

        if !rest.is_empty() {
            self.data[..rest.len()].copy_from_slice(rest);
            self.data[cap..cap + rest.len()].copy_from_slice(rest);
        }

        self.tail = (self.tail + bytes.len()) % cap;
        self.len += bytes.len();
        Ok(())
    }

    /// The whole occupied region as one slice, oldest byte first
    ///
    /// Does not advance the read cursor. The borrow ends before the next
    /// `write` or `consume`.
    pub fn readable(&self) -> &[u8] {
        &self.data[self.head..self.head + self.len]
    }

    /// Drop `n` bytes from the front
    pub fn consume(&mut self, n: usize) -> Result<(), BufferError> {
        if n > self.len {
            return Err(BufferError::ConsumeTooMuch {
                requested: n,
                available: self.len,
            });
        }

        self.head = (self.head + n) % self.capacity;
        self.len -= n;
        Ok(())
    }

    /// Discard everything
    pub fn clear(&mut self) {
        self.head = 0;
        self.tail = 0;
        self.len = 0;
    }

    /// Occupied bytes
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn free_space(&self) -> usize {
        self.capacity - self.len
    }

    /// Number of rejected writes
    pub fn overflow_count(&self) -> u64 {
        self.overflow_count
    }

    /// Get fill level as a fraction of capacity
    pub fn fill_level(&self) -> f32 {
        self.len as f32 / self.capacity as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(matches!(RingBuffer::new(0), Err(BufferError::ZeroCapacity)));
    }

    #[test]
    fn test_ring_buffer_basic() {
        let mut buffer = RingBuffer::new(8).unwrap();
        assert!(buffer.is_empty());
        assert!(buffer.readable().is_empty());

        buffer.write(&[1, 2, 3]).unwrap();
        assert_eq!(buffer.readable(), &[1, 2, 3]);
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.free_space(), 5);

        buffer.consume(2).unwrap();
        assert_eq!(buffer.readable(), &[3]);
    }

    #[test]
    fn test_wrapped_region_is_contiguous() {
        let mut buffer = RingBuffer::new(8).unwrap();
        buffer.write(&[0; 6]).unwrap();
        buffer.consume(6).unwrap();

        // Writes across the logical end
        buffer.write(&[1, 2, 3, 4, 5]).unwrap();
        assert_eq!(buffer.readable(), &[1, 2, 3, 4, 5]);

        buffer.write(&[6, 7, 8]).unwrap();
        assert!(buffer.is_full());
        assert_eq!(buffer.readable(), &[1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_full_write_leaves_state_unchanged() {
        let mut buffer = RingBuffer::new(4).unwrap();
        buffer.write(&[9, 9, 9]).unwrap();

        let err = buffer.write(&[1, 2]).unwrap_err();
        assert_eq!(err, BufferError::Full { requested: 2, free: 1 });
        assert_eq!(buffer.readable(), &[9, 9, 9]);
        assert_eq!(buffer.overflow_count(), 1);

        buffer.write(&[4]).unwrap();
        assert!(buffer.is_full());
    }

    #[test]
    fn test_consume_too_much() {
        let mut buffer = RingBuffer::new(4).unwrap();
        buffer.write(&[1, 2]).unwrap();
        assert_eq!(
            buffer.consume(3),
            Err(BufferError::ConsumeTooMuch { requested: 3, available: 2 })
        );
        assert_eq!(buffer.len(), 2);
        assert!(buffer.consume(0).is_ok());
    }

    #[test]
    fn test_empty_write_is_noop() {
        let mut buffer = RingBuffer::new(1).unwrap();
        buffer.write(&[7]).unwrap();
        assert!(buffer.write(&[]).is_ok());
        assert_eq!(buffer.overflow_count(), 0);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Write(Vec<u8>),
        Consume(usize),
    }

    fn arb_op() -> impl Strategy<Value = Op> {
        prop_oneof![
            proptest::collection::vec(any::<u8>(), 0..48).prop_map(Op::Write),
            (0usize..48).prop_map(Op::Consume),
        ]
    }

    proptest! {
        #[test]
        fn prop_matches_model_queue(
            capacity in 1usize..64,
            ops in proptest::collection::vec(arb_op(), 0..64),
        ) {
            let mut buffer = RingBuffer::new(capacity).unwrap();
            let mut model: std::collections::VecDeque<u8> = Default::default();

            for op in ops {
                match op {
                    Op::Write(bytes) => {
                        let fits = bytes.len() <= capacity - model.len();
                        prop_assert_eq!(buffer.write(&bytes).is_ok(), fits);
                        if fits {
                            model.extend(bytes);
                        }
                    }
                    Op::Consume(n) => {
                        let ok = n <= model.len();
                        prop_assert_eq!(buffer.consume(n).is_ok(), ok);
                        if ok {
                            model.drain(..n);
                        }
                    }
                }

                prop_assert!(buffer.len() <= buffer.capacity());
                prop_assert_eq!(buffer.readable().len(), model.len());
                let expected: Vec<u8> = model.iter().copied().collect();
                prop_assert_eq!(buffer.readable(), &expected[..]);
            }
        }

        #[test]
        fn prop_write_then_read_round_trip(
            capacity in 1usize..256,
            offset in 0usize..256,
            bytes in proptest::collection::vec(any::<u8>(), 0..256),
        ) {
            prop_assume!(bytes.len() <= capacity);
            let mut buffer = RingBuffer::new(capacity).unwrap();

            // Move the cursors to an arbitrary position first
            let offset = offset % capacity;
            buffer.write(&vec![0; offset]).unwrap();
            buffer.consume(offset).unwrap();

            buffer.write(&bytes).unwrap();
            prop_assert_eq!(buffer.readable(), &bytes[..]);
        }
    }
}
