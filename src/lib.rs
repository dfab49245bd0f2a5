//! Ordered key/value symbol table backed by a
//! [left-leaning red-black tree][llrb]. Search, insert, delete and the
//! ordered queries (min, max, floor, ceiling, rank, select, range) all
//! run in O(log n) node visits.
//!
//! [llrb]: https://en.wikipedia.org/wiki/Left-leaning_red-black_tree

mod depth;
mod empty;
mod error;
mod table;

pub use crate::depth::Depth;
pub use crate::empty::Empty;
pub use crate::error::Error;
pub use crate::table::{Iter, OrderedTable, Range, Reverse, Stats};

#[cfg(test)]
mod table_test;
