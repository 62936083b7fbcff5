//! Test utilities for fitpool development.
//!
//! Provides byte-pattern helpers for detecting overlapping or clobbered
//! allocations, and a [`LiveSet`] that tracks outstanding allocations of
//! one pool so tests can release them in arbitrary order.

#![deny(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod live;
pub mod pattern;

pub use live::{LiveAlloc, LiveSet};
