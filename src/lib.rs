//! # hotpath-rs
//!
//! A streaming approximate heavy-hitter engine over suffix sequences, built
//! for memory-allocation profiling: feed it sampled backtraces (ordered
//! call-site codes) with weights, and it reports which contiguous backtrace
//! suffixes account for more than a chosen fraction of the total sampled
//! weight, with lower/upper bounds on each estimate.
//!
//! The engine combines an online generalized suffix tree (Ukkonen's
//! construction, streamed via common-prefix deltas) with lossy counting, so
//! memory stays bounded by the error parameter regardless of stream length.
//!
//! ## Example
//!
//! ```rust
//! use hotpath_rs::HeavyHitters;
//!
//! let mut hh: HeavyHitters<u64> = HeavyHitters::new(0.01);
//! // A backtrace [1, 2, 3] with a unique end marker, sampled weight 5.
//! hh.insert(0, &[1, 2, 3, 1 << 63], 5);
//!
//! let report = hh.output(0.5);
//! assert_eq!(report.grand_total, 5);
//! assert_eq!(report.hitters[0].total, 5);
//! ```
//!
//! Callers stream backtraces incrementally: `insert(common_prefix, ext, n)`
//! inserts the previous backtrace's first `common_prefix` symbols followed by
//! `ext`. The [`SeenSet`] helper strips revisited frames (recursion) from a
//! growing backtrace before insertion.

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]

use std::fmt;
use std::hash::Hash;

mod cursor;
mod debug;
mod engine;
mod node;
mod queue;
mod seen;
pub mod trace;

pub use engine::{HeavyHitters, Hitter, MemoryStats, Report};
pub use seen::SeenSet;

/// An opaque symbol in a backtrace: a call-site code, an end-of-string
/// marker, or anything else hashable and comparable.
///
/// Two conventions callers must honor:
///
/// - [`Symbol::DUMMY`] is reserved for the engine's internal sentinels and
///   must never appear in an inserted sequence.
/// - The last symbol of every inserted sequence must be unique to that
///   sequence and must never occur mid-sequence. This guarantees every
///   inserted sequence ends at its own tree leaf.
pub trait Symbol: Copy + Eq + Hash + fmt::Debug {
    /// Reserved sentinel value, never part of real input.
    const DUMMY: Self;
}

impl Symbol for u64 {
    const DUMMY: Self = u64::MAX;
}

impl Symbol for u32 {
    const DUMMY: Self = u32::MAX;
}

#[cfg(test)]
mod proptests;
