//! Error handling for the lvmem library
//!
//! Every fallible operation in the crate reports through [`MemError`]. The raw
//! pointer layer keeps the C-shaped convention of null sentinels, the safe
//! layer converts those sentinels into these variants.

use thiserror::Error;

/// Main error type for the lvmem library
#[derive(Error, Debug)]
pub enum MemError {
    /// I/O related errors (configuration files)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Null pointer, zero-sized base or otherwise unusable argument
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Error message describing the issue
        message: String,
    },

    /// Index out of bounds access
    #[error("Out of bounds: index {index}, size {size}")]
    OutOfBounds {
        /// The invalid index
        index: usize,
        /// The valid size/length
        size: usize,
    },

    /// Memory allocation failures
    #[error("Memory allocation failed: requested {size} bytes")]
    OutOfMemory {
        /// Number of bytes requested
        size: usize,
    },

    /// Size or count arithmetic that would wrap
    #[error("Capacity overflow: {operation}")]
    CapacityOverflow {
        /// The computation that overflowed
        operation: String,
    },

    /// Configuration or parameter errors
    #[error("Invalid configuration: {message}")]
    Configuration {
        /// Configuration error message
        message: String,
    },

    /// Serialization of configuration state
    #[error("Serialization error: {message}")]
    Serialization {
        /// Error message from the serializer
        message: String,
    },
}

impl MemError {
    /// Create an invalid argument error
    pub fn invalid_argument<S: Into<String>>(message: S) -> Self {
        Self::InvalidArgument { message: message.into() }
    }

    /// Create an out of bounds error
    pub fn out_of_bounds(index: usize, size: usize) -> Self {
        Self::OutOfBounds { index, size }
    }

    /// Create an out of memory error
    pub fn out_of_memory(size: usize) -> Self {
        Self::OutOfMemory { size }
    }

    /// Create a capacity overflow error
    pub fn capacity_overflow<S: Into<String>>(operation: S) -> Self {
        Self::CapacityOverflow { operation: operation.into() }
    }

    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration { message: message.into() }
    }

    /// Create a serialization error
    pub fn serialization<S: Into<String>>(message: S) -> Self {
        Self::Serialization { message: message.into() }
    }

    /// Check if this is a recoverable error
    ///
    /// Allocation exhaustion and overflow leave the caller's data intact, so a
    /// retry with a smaller request can succeed.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Io(_) => true,
            Self::OutOfMemory { .. } => true,
            Self::CapacityOverflow { .. } => true,
            Self::InvalidArgument { .. } => false,
            Self::OutOfBounds { .. } => false,
            Self::Configuration { .. } => false,
            Self::Serialization { .. } => false,
        }
    }

    /// Get the error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::Io(_) => "io",
            Self::InvalidArgument { .. } => "argument",
            Self::OutOfBounds { .. } => "bounds",
            Self::OutOfMemory { .. } => "memory",
            Self::CapacityOverflow { .. } => "overflow",
            Self::Configuration { .. } => "config",
            Self::Serialization { .. } => "serialization",
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, MemError>;

/// Assert that an index is within bounds
#[inline]
pub fn check_bounds(index: usize, size: usize) -> Result<()> {
    if index >= size {
        Err(MemError::out_of_bounds(index, size))
    } else {
        Ok(())
    }
}

/// Assert that a range is within bounds
#[inline]
pub fn check_range(start: usize, end: usize, size: usize) -> Result<()> {
    if start > end {
        return Err(MemError::invalid_argument(format!(
            "Invalid range: start {} > end {}",
            start, end
        )));
    }
    if end > size {
        return Err(MemError::out_of_bounds(end, size));
    }
    Ok(())
}

/// Multiply two sizes, reporting wrap-around as a capacity overflow
#[inline]
pub fn checked_size(count: usize, stride: usize, operation: &str) -> Result<usize> {
    count
        .checked_mul(stride)
        .ok_or_else(|| MemError::capacity_overflow(format!("{}: {} * {}", operation, count, stride)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = MemError::invalid_argument("null destination");
        assert_eq!(err.category(), "argument");
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_bounds_checking() {
        assert!(check_bounds(5, 10).is_ok());
        assert!(check_bounds(10, 10).is_err());
        assert!(check_bounds(15, 10).is_err());
    }

    #[test]
    fn test_range_checking() {
        assert!(check_range(2, 8, 10).is_ok());
        assert!(check_range(8, 2, 10).is_err()); // start > end
        assert!(check_range(2, 15, 10).is_err()); // end > size
    }

    #[test]
    fn test_checked_size() {
        assert_eq!(checked_size(4, 8, "vec growth").unwrap(), 32);
        let err = checked_size(usize::MAX, 2, "vec growth").unwrap_err();
        assert_eq!(err.category(), "overflow");
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_all_error_types() {
        let bounds_err = MemError::out_of_bounds(5, 3);
        assert_eq!(bounds_err.category(), "bounds");
        assert!(!bounds_err.is_recoverable());

        let memory_err = MemError::out_of_memory(1024);
        assert_eq!(memory_err.category(), "memory");
        assert!(memory_err.is_recoverable());

        let overflow_err = MemError::capacity_overflow("repeat");
        assert_eq!(overflow_err.category(), "overflow");

        let config_err = MemError::configuration("alignment must be a power of two");
        assert_eq!(config_err.category(), "config");
        assert!(!config_err.is_recoverable());

        let ser_err = MemError::serialization("unexpected token");
        assert_eq!(ser_err.category(), "serialization");
    }

    #[test]
    fn test_error_display() {
        let bounds_err = MemError::out_of_bounds(10, 5);
        let bounds_display = format!("{}", bounds_err);
        assert!(bounds_display.contains("Out of bounds"));
        assert!(bounds_display.contains("10"));
        assert!(bounds_display.contains("5"));

        let oom = format!("{}", MemError::out_of_memory(4096));
        assert!(oom.contains("4096"));
    }

    #[test]
    fn test_from_io_error() {
        let io_error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err: MemError = io_error.into();

        assert_eq!(err.category(), "io");
        assert!(err.is_recoverable());
        assert!(format!("{}", err).contains("I/O error"));
    }
}
