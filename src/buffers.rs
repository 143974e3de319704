//! Ping-pong storage for double-buffered particle state.
//!
//! Two equally sized slots live in one array and a single index says which
//! slot is authoritative. A step reads [`PingPong::read`], writes
//! [`PingPong::write`], and only then calls [`PingPong::swap`].
//!
//! ```ignore
//! let mut pair = PingPong::new(vec![0.0f32; 4], vec![0.0f32; 4]);
//! let (src, dst) = pair.split();
//! dst.copy_from_slice(src);
//! pair.swap();
//! ```

/// Which slot is read and which is written during the next step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferRoles {
    pub read: usize,
    pub write: usize,
}

/// Two slots plus the index of the read slot.
#[derive(Debug, Clone)]
pub struct PingPong<T> {
    slots: [T; 2],
    read: usize,
}

impl<T> PingPong<T> {
    /// Create a pair whose first slot starts as the read slot.
    pub fn new(first: T, second: T) -> Self {
        Self {
            slots: [first, second],
            read: 0,
        }
    }

    /// Index of the slot holding the authoritative state.
    #[inline]
    pub fn read_index(&self) -> usize {
        self.read
    }

    /// Index of the slot receiving the next state.
    #[inline]
    pub fn write_index(&self) -> usize {
        1 - self.read
    }

    /// Current read/write assignment.
    pub fn roles(&self) -> BufferRoles {
        BufferRoles {
            read: self.read_index(),
            write: self.write_index(),
        }
    }

    #[inline]
    pub fn read(&self) -> &T {
        &self.slots[self.read]
    }

    #[inline]
    pub fn write(&self) -> &T {
        &self.slots[1 - self.read]
    }

    #[inline]
    pub fn read_mut(&mut self) -> &mut T {
        &mut self.slots[self.read]
    }

    /// Borrow the read slot immutably and the write slot mutably at once.
    pub fn split(&mut self) -> (&T, &mut T) {
        let (first, second) = self.slots.split_at_mut(1);
        if self.read == 0 {
            (&first[0], &mut second[0])
        } else {
            (&second[0], &mut first[0])
        }
    }

    /// Slot by absolute index, independent of roles.
    pub fn slot(&self, index: usize) -> &T {
        &self.slots[index]
    }

    /// Both slots in index order.
    pub fn slots(&self) -> &[T; 2] {
        &self.slots
    }

    /// Flip roles. Call only once the write slot is completely written.
    pub fn swap(&mut self) {
        self.read = 1 - self.read;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roles_alternate_every_swap() {
        let mut pair = PingPong::new('a', 'b');
        let mut last_written = None;
        for step in 0..9 {
            let roles = pair.roles();
            assert_ne!(roles.read, roles.write);
            if let Some(prev) = last_written {
                // The slot read now is the slot written by the previous step.
                assert_eq!(roles.read, prev, "step {}", step);
            }
            last_written = Some(roles.write);
            pair.swap();
        }
    }

    #[test]
    fn test_split_targets_distinct_slots() {
        let mut pair = PingPong::new(vec![1, 2, 3], vec![0, 0, 0]);
        {
            let (src, dst) = pair.split();
            for (d, s) in dst.iter_mut().zip(src.iter()) {
                *d = s * 10;
            }
        }
        pair.swap();
        assert_eq!(pair.read(), &vec![10, 20, 30]);
        assert_eq!(pair.write(), &vec![1, 2, 3]);

        let (src, dst) = pair.split();
        assert_eq!(src, &vec![10, 20, 30]);
        dst[0] = 99;
        assert_eq!(pair.slot(0)[0], 99);
    }

    #[test]
    fn test_starts_reading_first_slot() {
        let pair = PingPong::new(1u8, 2u8);
        assert_eq!(pair.read_index(), 0);
        assert_eq!(pair.write_index(), 1);
        assert_eq!(*pair.read(), 1);
        assert_eq!(*pair.write(), 2);
    }
}
