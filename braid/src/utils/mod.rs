//! Utilities for memory-efficient data structures.
//!
//! This module provides low-level utilities used internally by the runtime.
//! In particular, it exposes a generational [`Slab`] that backs the
//! scheduler's task table.

mod slab;

pub(crate) use slab::{Key, Slab};
