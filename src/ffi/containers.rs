//! C API for the vector and string containers
//!
//! Containers live behind opaque boxed handles. Constructors return null on
//! failure; mutators return a [`CResult`] and leave the container unchanged
//! when they fail.

use super::types::{CTaggedStr, CValVec};
use super::CResult;
use crate::{TaggedStr, ValVec};
use std::ffi::CStr;
use std::os::raw::{c_char, c_void};
use std::ptr;
use std::slice;

unsafe fn vec_mut<'a>(vec: *mut CValVec) -> Option<&'a mut ValVec> {
    unsafe { (vec as *mut ValVec).as_mut() }
}

unsafe fn str_mut<'a>(s: *mut CTaggedStr) -> Option<&'a mut TaggedStr> {
    unsafe { (s as *mut TaggedStr).as_mut() }
}

/// `count` elements at `data` as bytes, `None` for a null pointer
unsafe fn element_bytes<'a>(vec: &ValVec, data: *const c_void, count: usize) -> Option<&'a [u8]> {
    if data.is_null() {
        return None;
    }
    let len = count.checked_mul(vec.elem_size())?;
    Some(unsafe { slice::from_raw_parts(data as *const u8, len) })
}

fn into_handle<T, H>(value: crate::Result<T>) -> *mut H {
    match value {
        Ok(v) => Box::into_raw(Box::new(v)) as *mut H,
        Err(e) => {
            log::debug!("ffi constructor failed: {}", e);
            ptr::null_mut()
        }
    }
}

/// Create a vector with room for `capacity` elements of `elem_size` bytes
///
/// The returned handle must be released with [`lvmem_vec_free`]. Returns
/// null for a zero element size or when allocation fails.
#[no_mangle]
pub extern "C" fn lvmem_vec_new(capacity: usize, elem_size: usize) -> *mut CValVec {
    into_handle(ValVec::with_capacity(capacity, elem_size))
}

/// Release a vector handle
///
/// # Safety
///
/// `vec` must be null or a handle from [`lvmem_vec_new`] not yet freed.
#[no_mangle]
pub unsafe extern "C" fn lvmem_vec_free(vec: *mut CValVec) {
    if !vec.is_null() {
        drop(unsafe { Box::from_raw(vec as *mut ValVec) });
    }
}

/// Append `count` elements read from `data`
///
/// # Safety
///
/// `vec` must be a live handle and `data` readable for `count` elements.
#[no_mangle]
pub unsafe extern "C" fn lvmem_vec_push(vec: *mut CValVec, data: *const c_void, count: usize) -> CResult {
    let Some(vec) = (unsafe { vec_mut(vec) }) else {
        return CResult::InvalidInput;
    };
    match unsafe { element_bytes(vec, data, count) } {
        Some(bytes) => vec.push(bytes).into(),
        None => CResult::InvalidInput,
    }
}

/// Insert `count` elements read from `data` before element `index`
///
/// # Safety
///
/// `vec` must be a live handle and `data` readable for `count` elements.
#[no_mangle]
pub unsafe extern "C" fn lvmem_vec_insert(
    vec: *mut CValVec,
    index: usize,
    data: *const c_void,
    count: usize,
) -> CResult {
    let Some(vec) = (unsafe { vec_mut(vec) }) else {
        return CResult::InvalidInput;
    };
    match unsafe { element_bytes(vec, data, count) } {
        Some(bytes) => vec.insert(index, bytes).into(),
        None => CResult::InvalidInput,
    }
}

/// Remove the last element
///
/// # Safety
///
/// `vec` must be null or a live handle.
#[no_mangle]
pub unsafe extern "C" fn lvmem_vec_pop(vec: *mut CValVec) -> CResult {
    let Some(vec) = (unsafe { vec_mut(vec) }) else {
        return CResult::InvalidInput;
    };
    if vec.pop() {
        CResult::Success
    } else {
        CResult::NotFound
    }
}

/// Pointer to element `index`, null past the end
///
/// # Safety
///
/// `vec` must be null or a live handle. The pointer is invalidated by any
/// call that grows or frees the vector.
#[no_mangle]
pub unsafe extern "C" fn lvmem_vec_get(vec: *mut CValVec, index: usize) -> *const c_void {
    unsafe { vec_mut(vec) }
        .and_then(|v| v.get(index))
        .map_or(ptr::null(), |e| e.as_ptr() as *const c_void)
}

/// Element count, 0 for a null handle
///
/// # Safety
///
/// `vec` must be null or a live handle.
#[no_mangle]
pub unsafe extern "C" fn lvmem_vec_len(vec: *mut CValVec) -> usize {
    unsafe { vec_mut(vec) }.map_or(0, |v| v.len())
}

/// Copy a C string into a new tagged string, null on failure
///
/// # Safety
///
/// `s` must be null or a valid null-terminated string. A null `s` yields an
/// empty string.
#[no_mangle]
pub unsafe extern "C" fn lvmem_str_from_cstr(s: *const c_char) -> *mut CTaggedStr {
    if s.is_null() {
        return into_handle(TaggedStr::with_capacity(0));
    }
    into_handle(TaggedStr::from_cstr(unsafe { CStr::from_ptr(s) }))
}

/// Copy `len` bytes into a new tagged string, null on failure
///
/// # Safety
///
/// `data` must be readable for `len` bytes.
#[no_mangle]
pub unsafe extern "C" fn lvmem_str_from_slice(data: *const c_char, len: usize) -> *mut CTaggedStr {
    if data.is_null() && len > 0 {
        return ptr::null_mut();
    }
    let bytes = if len == 0 {
        &[][..]
    } else {
        unsafe { slice::from_raw_parts(data as *const u8, len) }
    };
    into_handle(TaggedStr::from_slice(bytes))
}

/// Release a string handle
///
/// # Safety
///
/// `s` must be null or a handle from this module not yet freed.
#[no_mangle]
pub unsafe extern "C" fn lvmem_str_free(s: *mut CTaggedStr) {
    if !s.is_null() {
        drop(unsafe { Box::from_raw(s as *mut TaggedStr) });
    }
}

/// Append one byte
///
/// # Safety
///
/// `s` must be null or a live handle.
#[no_mangle]
pub unsafe extern "C" fn lvmem_str_push(s: *mut CTaggedStr, c: c_char) -> CResult {
    match unsafe { str_mut(s) } {
        Some(s) => s.push(c as u8).into(),
        None => CResult::InvalidInput,
    }
}

/// Append a C string
///
/// # Safety
///
/// `s` must be a live handle and `tail` a valid null-terminated string.
#[no_mangle]
pub unsafe extern "C" fn lvmem_str_push_str(s: *mut CTaggedStr, tail: *const c_char) -> CResult {
    match unsafe { str_mut(s) } {
        Some(s) if !tail.is_null() => s.push_bytes(unsafe { CStr::from_ptr(tail) }.to_bytes()).into(),
        _ => CResult::InvalidInput,
    }
}

/// Append `chunk` `times` times
///
/// # Safety
///
/// `s` must be a live handle and `chunk` a valid null-terminated string.
#[no_mangle]
pub unsafe extern "C" fn lvmem_str_repeat(s: *mut CTaggedStr, chunk: *const c_char, times: usize) -> CResult {
    match unsafe { str_mut(s) } {
        Some(s) if !chunk.is_null() => s.repeat(unsafe { CStr::from_ptr(chunk) }.to_bytes(), times).into(),
        _ => CResult::InvalidInput,
    }
}

/// Strip bytes of `set` from both ends
///
/// # Safety
///
/// `s` must be a live handle and `set` a valid null-terminated string.
#[no_mangle]
pub unsafe extern "C" fn lvmem_str_trim(s: *mut CTaggedStr, set: *const c_char) -> CResult {
    match unsafe { str_mut(s) } {
        Some(s) if !set.is_null() => {
            s.trim(unsafe { CStr::from_ptr(set) }.to_bytes());
            CResult::Success
        }
        _ => CResult::InvalidInput,
    }
}

/// Offset of `needle` in the string, -1 when absent
///
/// # Safety
///
/// `s` must be a live handle and `needle` a valid null-terminated string.
#[no_mangle]
pub unsafe extern "C" fn lvmem_str_find(s: *mut CTaggedStr, needle: *const c_char) -> isize {
    match unsafe { str_mut(s) } {
        Some(s) if !needle.is_null() => s
            .find(unsafe { CStr::from_ptr(needle) }.to_bytes())
            .map_or(-1, |i| i as isize),
        _ => -1,
    }
}

/// Null-terminated content. Valid until the string is next modified.
///
/// # Safety
///
/// `s` must be null or a live handle.
#[no_mangle]
pub unsafe extern "C" fn lvmem_str_data(s: *mut CTaggedStr) -> *const c_char {
    unsafe { str_mut(s) }.map_or(ptr::null(), |s| s.as_c_str().as_ptr())
}

/// Length in bytes, 0 for a null handle
///
/// # Safety
///
/// `s` must be null or a live handle.
#[no_mangle]
pub unsafe extern "C" fn lvmem_str_len(s: *mut CTaggedStr) -> usize {
    unsafe { str_mut(s) }.map_or(0, |s| s.len())
}
