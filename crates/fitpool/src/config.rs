//! Pool configuration parameters.

use crate::error::PoolError;

/// What the pool does with a request no free block can satisfy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FallbackPolicy {
    /// Serve the request from the system allocator. Released through the
    /// same `free` call; the origin is recovered from the header address.
    #[default]
    System,
    /// Refuse the request: `allocate` returns `None`.
    Deny,
}

/// Configuration for a [`MemoryPool`](crate::MemoryPool).
///
/// The arena size is fixed for the lifetime of the pool. Validated at
/// construction; all values are immutable after creation.
#[derive(Clone, Debug)]
pub struct PoolConfig {
    /// Arena size in bytes.
    ///
    /// Every allocation carves `size + overhead` bytes out of it, so the
    /// largest request the pool can serve is `capacity - overhead`.
    pub capacity: usize,

    /// Behaviour when the arena cannot satisfy a request.
    ///
    /// Default: [`FallbackPolicy::System`].
    pub fallback: FallbackPolicy,

    /// Whether dropping the pool reports outstanding allocations.
    ///
    /// Default: `true`. The report is a `log::warn!`; the arena is
    /// released either way.
    pub leak_check: bool,
}

impl PoolConfig {
    /// Default arena size: 64 MiB.
    pub const DEFAULT_CAPACITY: usize = 64 * 1024 * 1024;

    /// Create a config for an arena of `capacity` bytes.
    ///
    /// Uses default values for all other parameters.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            fallback: FallbackPolicy::default(),
            leak_check: true,
        }
    }

    /// Replace the fallback policy.
    pub fn with_fallback(mut self, fallback: FallbackPolicy) -> Self {
        self.fallback = fallback;
        self
    }

    /// Enable or disable the teardown leak report.
    pub fn with_leak_check(mut self, leak_check: bool) -> Self {
        self.leak_check = leak_check;
        self
    }

    /// Check that the arena can be reserved with the given alignment.
    pub fn validate(&self, align: usize) -> Result<(), PoolError> {
        if self.capacity == 0 {
            return Err(PoolError::InvalidConfig {
                reason: "capacity must be non-zero".into(),
            });
        }
        // Layout rejects sizes that overflow isize once rounded up to `align`.
        if self.capacity > isize::MAX as usize - (align - 1) {
            return Err(PoolError::InvalidConfig {
                reason: format!(
                    "capacity {} exceeds the addressable limit for alignment {align}",
                    self.capacity
                ),
            });
        }
        Ok(())
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_capacity_is_64mb() {
        let config = PoolConfig::default();
        assert_eq!(config.capacity, 64 * 1024 * 1024);
        assert_eq!(config.fallback, FallbackPolicy::System);
        assert!(config.leak_check);
    }

    #[test]
    fn builders_override_defaults() {
        let config = PoolConfig::new(4096)
            .with_fallback(FallbackPolicy::Deny)
            .with_leak_check(false);
        assert_eq!(config.capacity, 4096);
        assert_eq!(config.fallback, FallbackPolicy::Deny);
        assert!(!config.leak_check);
    }

    #[test]
    fn zero_capacity_rejected() {
        let err = PoolConfig::new(0).validate(64).unwrap_err();
        assert!(matches!(err, PoolError::InvalidConfig { .. }));
    }

    #[test]
    fn oversized_capacity_rejected() {
        let err = PoolConfig::new(usize::MAX).validate(64).unwrap_err();
        assert!(matches!(err, PoolError::InvalidConfig { .. }));
    }

    #[test]
    fn ordinary_capacity_accepted() {
        assert!(PoolConfig::new(1024).validate(64).is_ok());
    }
}
