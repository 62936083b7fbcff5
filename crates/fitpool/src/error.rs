//! Pool-specific error types.

use std::error::Error;
use std::fmt;

/// Errors that can occur during pool construction, release, or self-check.
///
/// Pool exhaustion is deliberately absent: a request the arena cannot
/// satisfy is served by the fallback path (or refused with `None` under
/// [`FallbackPolicy::Deny`](crate::config::FallbackPolicy::Deny)).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PoolError {
    /// The configuration cannot describe a usable arena.
    InvalidConfig {
        /// Why the configuration was rejected.
        reason: String,
    },
    /// The system allocator refused to reserve the arena.
    ArenaAllocation {
        /// Number of bytes requested for the arena.
        capacity: usize,
    },
    /// A pool pointer was released a second time.
    ///
    /// The owner word of the allocation was already cleared by the first
    /// release, so the pool state was left untouched.
    DoubleFree {
        /// Arena offset of the allocation's header.
        offset: usize,
    },
    /// The header in front of a pool pointer does not name a live block
    /// starting at that offset.
    CorruptHeader {
        /// Arena offset of the recovered header.
        offset: usize,
        /// The owner id found in the header.
        owner: usize,
    },
    /// [`MemoryPool::check`](crate::MemoryPool::check) found a broken
    /// structural invariant.
    Inconsistent {
        /// Description of the first violation found.
        reason: String,
    },
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfig { reason } => {
                write!(f, "invalid pool configuration: {reason}")
            }
            Self::ArenaAllocation { capacity } => {
                write!(f, "failed to reserve a {capacity}-byte arena")
            }
            Self::DoubleFree { offset } => {
                write!(f, "double free of pool allocation at offset {offset}")
            }
            Self::CorruptHeader { offset, owner } => {
                write!(
                    f,
                    "corrupt allocation header at offset {offset}: owner id {owner} is not a live block there"
                )
            }
            Self::Inconsistent { reason } => {
                write!(f, "pool invariant violated: {reason}")
            }
        }
    }
}

impl Error for PoolError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_offset() {
        let err = PoolError::DoubleFree { offset: 173 };
        assert_eq!(
            err.to_string(),
            "double free of pool allocation at offset 173"
        );
    }

    #[test]
    fn corrupt_header_mentions_owner() {
        let err = PoolError::CorruptHeader {
            offset: 8,
            owner: 42,
        };
        let msg = err.to_string();
        assert!(msg.contains("offset 8"));
        assert!(msg.contains("owner id 42"));
    }
}
