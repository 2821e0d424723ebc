//! C FFI compatibility layer
//!
//! C-callable entry points mirroring the raw memory API, the aligned
//! allocator and the container types. Failures are reported as null
//! pointers or [`CResult`] codes, never by unwinding.

pub mod c_api;
pub mod containers;
pub mod types;

pub use c_api::*;
pub use containers::*;

use crate::error::MemError;

/// Status code returned by fallible C entry points
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CResult {
    /// Operation succeeded
    Success = 0,
    /// Null handle, bad index or malformed argument
    InvalidInput = -1,
    /// Allocation failed or a size computation overflowed
    MemoryError = -2,
    /// Configuration file could not be read or written
    IoError = -3,
    /// Any other failure
    InternalError = -5,
    /// Nothing to return, e.g. popping an empty vector
    NotFound = -6,
}

impl From<&MemError> for CResult {
    fn from(err: &MemError) -> Self {
        match err {
            MemError::InvalidArgument { .. } | MemError::OutOfBounds { .. } => CResult::InvalidInput,
            MemError::OutOfMemory { .. } | MemError::CapacityOverflow { .. } => CResult::MemoryError,
            MemError::Io(_) => CResult::IoError,
            _ => CResult::InternalError,
        }
    }
}

impl From<crate::Result<()>> for CResult {
    fn from(result: crate::Result<()>) -> Self {
        match result {
            Ok(()) => CResult::Success,
            Err(ref e) => {
                log::debug!("ffi call failed: {}", e);
                CResult::from(e)
            }
        }
    }
}
