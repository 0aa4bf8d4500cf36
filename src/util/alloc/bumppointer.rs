use crate::policy::region::RegionId;
use crate::util::Address;

/// A mutator's allocation buffer: the `(region, cursor, limit)` triple it bumps into.
///
/// The buffer is owned by exactly one mutator and never shared. When it runs out, the mutator
/// binds it to a fresh Eden region instead of growing it.
#[derive(Debug)]
pub struct AllocationBuffer {
    region: Option<RegionId>,
    /// Epoch of the region when the buffer was bound. A region that was reclaimed and claimed
    /// again has a different epoch.
    epoch: usize,
    cursor: Address,
    limit: Address,
}

impl AllocationBuffer {
    pub const fn new() -> Self {
        AllocationBuffer {
            region: None,
            epoch: 0,
            cursor: Address::ZERO,
            limit: Address::ZERO,
        }
    }

    pub fn rebind(&mut self, region: RegionId, epoch: usize, start: Address, end: Address) {
        self.region = Some(region);
        self.epoch = epoch;
        self.cursor = start;
        self.limit = end;
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Bump the cursor by `bytes` and return the old cursor, or `None` if the buffer is too
    /// small.
    pub fn alloc(&mut self, bytes: usize) -> Option<Address> {
        let result = self.cursor;
        let new_cursor = result + bytes;
        if self.region.is_some() && new_cursor <= self.limit {
            self.cursor = new_cursor;
            Some(result)
        } else {
            None
        }
    }

    pub fn region(&self) -> Option<RegionId> {
        self.region
    }

    pub fn epoch(&self) -> usize {
        self.epoch
    }

    pub fn cursor(&self) -> Address {
        self.cursor
    }

    pub fn limit(&self) -> Address {
        self.limit
    }
}

impl Default for AllocationBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::constants::HEAP_START;

    #[test]
    fn empty_buffer_fails() {
        let mut buffer = AllocationBuffer::new();
        assert_eq!(buffer.alloc(16), None);
    }

    #[test]
    fn bump_until_full() {
        let mut buffer = AllocationBuffer::new();
        buffer.rebind(RegionId::from_index(0), 1, HEAP_START, HEAP_START + 64);
        assert_eq!(buffer.alloc(32), Some(HEAP_START));
        assert_eq!(buffer.alloc(32), Some(HEAP_START + 32));
        assert_eq!(buffer.alloc(8), None);
        assert_eq!(buffer.cursor(), buffer.limit());
        buffer.reset();
        assert_eq!(buffer.region(), None);
    }
}
