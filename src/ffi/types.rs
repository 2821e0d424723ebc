//! Opaque handles passed across the C boundary

/// Opaque handle for [`ValVec`](crate::ValVec)
#[repr(C)]
pub struct CValVec {
    _private: [u8; 0],
}

/// Opaque handle for [`TaggedStr`](crate::TaggedStr)
#[repr(C)]
pub struct CTaggedStr {
    _private: [u8; 0],
}
