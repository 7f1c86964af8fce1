//! Object allocator statistics

/// Snapshot of an allocator's counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AllocatorStats {
    /// Payload size served by the allocator
    pub object_size: usize,
    /// Bytes per page, including links, headers, pads and fill
    pub page_size: usize,
    /// Slots currently on the free list
    pub free_objects: usize,
    /// Blocks currently owned by clients
    pub objects_in_use: usize,
    /// Live pages
    pub pages_in_use: usize,
    /// High-water mark of `objects_in_use`
    pub most_objects: usize,
    /// Successful allocations (wraps)
    pub allocations: u32,
    /// Free requests, including rejected ones (wraps)
    pub deallocations: u32,
}

impl AllocatorStats {
    /// Bytes of client payload currently handed out
    pub fn bytes_in_use(&self) -> usize {
        self.objects_in_use * self.object_size
    }

    /// Fraction of slots in use across live pages (0.0 when there are none)
    pub fn utilization(&self) -> f64 {
        let total = self.objects_in_use + self.free_objects;
        if total == 0 {
            0.0
        } else {
            self.objects_in_use as f64 / total as f64
        }
    }

    pub(crate) fn record_allocation(&mut self, pooled: bool) {
        self.allocations = self.allocations.wrapping_add(1);
        self.objects_in_use += 1;
        self.most_objects = self.most_objects.max(self.objects_in_use);
        if pooled {
            self.free_objects -= 1;
        }
    }

    pub(crate) fn record_free(&mut self, pooled: bool) {
        self.objects_in_use = self.objects_in_use.saturating_sub(1);
        if pooled {
            self.free_objects += 1;
        }
    }
}
