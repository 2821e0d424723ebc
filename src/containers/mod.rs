//! Growable containers built on the aligned allocator
//!
//! - **`ValVec`** - type-erased vector of fixed-size elements whose element
//!   shifts run through the memory engine

mod val_vec;

pub use val_vec::{Element, ValVec};
