//! Heuristics module for duty construction.
//!
//! The greedy constructor seeds the master problem and repairs rounded
//! column generation selections.

pub mod construction;

pub use construction::*;
