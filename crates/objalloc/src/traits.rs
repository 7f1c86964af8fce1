//! Capacity reporting shared by allocator front-ends

/// Memory usage reporting for an allocator
///
/// "Used" counts client payload bytes only; header, pad and alignment
/// overhead is visible through [`MemoryUsage::overhead_memory`].
pub trait MemoryUsage {
    /// Payload bytes currently handed out
    fn used_memory(&self) -> usize;

    /// Payload bytes that can be handed out without acquiring a page
    ///
    /// `None` when the allocator forwards to the system allocator.
    fn available_memory(&self) -> Option<usize>;

    /// Bytes held from the system allocator, if known
    fn reserved_memory(&self) -> Option<usize>;

    /// Reserved bytes that can never hold payload
    fn overhead_memory(&self) -> Option<usize> {
        match (self.reserved_memory(), self.available_memory()) {
            (Some(reserved), Some(available)) => {
                Some(reserved.saturating_sub(self.used_memory() + available))
            }
            _ => None,
        }
    }

    /// Returns payload usage as a percentage (0.0 to 100.0) of payload capacity
    ///
    /// Returns `None` if capacity is unknown.
    fn memory_usage_percent(&self) -> Option<f32> {
        self.available_memory().map(|available| {
            let total = self.used_memory() + available;
            if total == 0 {
                0.0
            } else {
                (self.used_memory() as f32 / total as f32) * 100.0
            }
        })
    }

    /// Checks if usage is at or above `threshold_percent`
    fn is_memory_pressure(&self, threshold_percent: f32) -> Option<bool> {
        self.memory_usage_percent()
            .map(|usage| usage >= threshold_percent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed {
        used: usize,
        available: Option<usize>,
        reserved: Option<usize>,
    }

    impl MemoryUsage for Fixed {
        fn used_memory(&self) -> usize {
            self.used
        }

        fn available_memory(&self) -> Option<usize> {
            self.available
        }

        fn reserved_memory(&self) -> Option<usize> {
            self.reserved
        }
    }

    #[test]
    fn test_defaults() {
        let usage = Fixed {
            used: 48,
            available: Some(16),
            reserved: Some(100),
        };
        assert_eq!(usage.overhead_memory(), Some(36));
        assert_eq!(usage.memory_usage_percent(), Some(75.0));
        assert_eq!(usage.is_memory_pressure(80.0), Some(false));
    }

    #[test]
    fn test_unknown_capacity() {
        let usage = Fixed {
            used: 8,
            available: None,
            reserved: None,
        };
        assert_eq!(usage.overhead_memory(), None);
        assert_eq!(usage.memory_usage_percent(), None);
    }

    #[test]
    fn test_empty_is_zero_percent() {
        let usage = Fixed {
            used: 0,
            available: Some(0),
            reserved: Some(0),
        };
        assert_eq!(usage.memory_usage_percent(), Some(0.0));
    }
}
