//! TaggedStr: length-tracked, always null-terminated byte string
//!
//! The buffer holds `capacity` bytes including the terminator and the byte
//! at `len` is always zero. Growth uses zero-filled storage from the
//! aligned allocator, so every byte past `len` is zero as well.

use crate::error::{MemError, Result};
use crate::memory::{get_global_engine, AlignedAllocator};
use std::borrow::Cow;
use std::ffi::{CStr, CString};
use std::fmt;
use std::ptr::NonNull;
use std::slice;
use std::str::FromStr;

/// Growable null-terminated byte string
///
/// # Examples
///
/// ```rust
/// use lvmem::TaggedStr;
///
/// let mut s = TaggedStr::from_slice(b"hello").unwrap();
/// s.push(b'!').unwrap();
/// assert_eq!(s.as_bytes(), b"hello!");
/// s.trim(b"!h");
/// assert_eq!(s.as_bytes(), b"ello");
/// ```
pub struct TaggedStr {
    data: Option<NonNull<u8>>,
    len: usize,
    cap: usize,
    allocator: AlignedAllocator,
}

impl TaggedStr {
    /// Empty string without storage
    pub fn new() -> Self {
        Self {
            data: None,
            len: 0,
            cap: 0,
            allocator: AlignedAllocator::default(),
        }
    }

    /// Empty string with room for `n` bytes plus the terminator
    pub fn with_capacity(n: usize) -> Result<Self> {
        let cap = n
            .checked_add(1)
            .ok_or_else(|| MemError::capacity_overflow("string allocation"))?;
        let mut s = Self::new();
        s.data = Some(s.allocator.allocate_zeroed(cap)?);
        s.cap = cap;
        Ok(s)
    }

    /// Copy `bytes` into a new string
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let mut s = Self::with_capacity(bytes.len())?;
        unsafe { get_global_engine().copy_raw(s.ptr(), bytes.as_ptr(), bytes.len()) };
        s.len = bytes.len();
        Ok(s)
    }

    /// Copy a C string, terminator excluded
    pub fn from_cstr(cstr: &CStr) -> Result<Self> {
        Self::from_slice(cstr.to_bytes())
    }

    #[inline]
    fn ptr(&self) -> *mut u8 {
        self.data.map_or(std::ptr::null_mut(), NonNull::as_ptr)
    }

    /// Length in bytes, terminator excluded
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the string is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Buffer size including the terminator
    #[inline]
    pub fn capacity(&self) -> usize {
        self.cap
    }

    /// Content without the terminator
    pub fn as_bytes(&self) -> &[u8] {
        match self.data {
            Some(ptr) => unsafe { slice::from_raw_parts(ptr.as_ptr(), self.len) },
            None => &[],
        }
    }

    /// Content including the terminator
    pub fn as_bytes_with_nul(&self) -> &[u8] {
        match self.data {
            // SAFETY: cap > len whenever data is present
            Some(ptr) => unsafe { slice::from_raw_parts(ptr.as_ptr(), self.len + 1) },
            None => b"\0",
        }
    }

    /// Borrow as a C string, cut at the first interior zero byte if any
    pub fn as_c_str(&self) -> &CStr {
        CStr::from_bytes_until_nul(self.as_bytes_with_nul()).unwrap_or_default()
    }

    /// Owned copy as a [`CString`]
    pub fn to_cstring(&self) -> CString {
        CString::from(self.as_c_str())
    }

    /// Content as UTF-8, replacing invalid sequences
    pub fn to_string_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.as_bytes())
    }

    /// Grow the buffer to `new_cap` bytes, keeping content
    fn grow_to(&mut self, new_cap: usize) -> Result<()> {
        if new_cap <= self.cap {
            return Ok(());
        }
        let block = unsafe { self.allocator.grow_zeroed(self.data, self.cap, new_cap)? };
        self.data = Some(block);
        self.cap = new_cap;
        Ok(())
    }

    /// Grow so that `extra` more bytes and the terminator fit
    fn make_room(&mut self, extra: usize) -> Result<()> {
        let needed = self
            .len
            .checked_add(extra)
            .and_then(|n| n.checked_add(1))
            .ok_or_else(|| MemError::capacity_overflow("string growth"))?;
        if needed <= self.cap {
            return Ok(());
        }
        self.grow_to(needed.max(self.cap.saturating_mul(2)))
    }

    /// Append one byte
    pub fn push(&mut self, byte: u8) -> Result<()> {
        self.make_room(1)?;
        unsafe {
            let p = self.ptr().add(self.len);
            p.write(byte);
            p.add(1).write(0);
        }
        self.len += 1;
        Ok(())
    }

    /// Append raw bytes
    pub fn push_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        self.make_room(bytes.len())?;
        unsafe {
            let p = self.ptr().add(self.len);
            get_global_engine().copy_raw(p, bytes.as_ptr(), bytes.len());
            p.add(bytes.len()).write(0);
        }
        self.len += bytes.len();
        Ok(())
    }

    /// Append a string slice
    pub fn push_str(&mut self, s: &str) -> Result<()> {
        self.push_bytes(s.as_bytes())
    }

    /// Append `chunk` `times` times.
    ///
    /// The buffer grows to exactly the required size when it is too small.
    pub fn repeat(&mut self, chunk: &[u8], times: usize) -> Result<()> {
        if chunk.is_empty() || times == 0 {
            return Ok(());
        }
        let total = chunk
            .len()
            .checked_mul(times)
            .ok_or_else(|| MemError::capacity_overflow("string repeat"))?;
        let needed = self
            .len
            .checked_add(total)
            .and_then(|n| n.checked_add(1))
            .ok_or_else(|| MemError::capacity_overflow("string repeat"))?;
        self.grow_to(needed)?;

        let engine = get_global_engine();
        unsafe {
            let mut p = self.ptr().add(self.len);
            for _ in 0..times {
                engine.copy_raw(p, chunk.as_ptr(), chunk.len());
                p = p.add(chunk.len());
            }
            p.write(0);
        }
        self.len += total;
        Ok(())
    }

    /// Strip bytes contained in `set` from both ends.
    ///
    /// The kept middle is moved to the front and the vacated tail zeroed.
    /// Capacity is unchanged.
    pub fn trim(&mut self, set: &[u8]) {
        if self.len == 0 || set.is_empty() {
            return;
        }
        let bytes = self.as_bytes();
        let Some(start) = bytes.iter().position(|b| !set.contains(b)) else {
            self.clear();
            return;
        };
        // A kept byte exists, so rposition finds one at or after start
        let end = bytes.iter().rposition(|b| !set.contains(b)).map_or(start, |e| e + 1);
        let new_len = end - start;

        let engine = get_global_engine();
        unsafe {
            engine.move_raw(self.ptr(), self.ptr().add(start), new_len);
            engine.set_raw(self.ptr().add(new_len), 0, self.cap - new_len);
        }
        self.len = new_len;
    }

    /// Remove and return the last byte
    pub fn pop(&mut self) -> Option<u8> {
        let last = *self.as_bytes().last()?;
        self.len -= 1;
        unsafe { self.ptr().add(self.len).write(0) };
        Some(last)
    }

    /// Zero the content and set the length to zero
    pub fn clear(&mut self) {
        if self.data.is_some() {
            unsafe { get_global_engine().set_raw(self.ptr(), 0, self.len) };
        }
        self.len = 0;
    }

    /// Ensure room for `additional` more bytes
    pub fn reserve(&mut self, additional: usize) -> Result<()> {
        let needed = self
            .len
            .checked_add(additional)
            .and_then(|n| n.checked_add(1))
            .ok_or_else(|| MemError::capacity_overflow("string reserve"))?;
        self.grow_to(needed)
    }

    /// Shrink the buffer to `len + 1` bytes
    pub fn fit(&mut self) -> Result<()> {
        if self.data.is_none() || self.cap == self.len + 1 {
            return Ok(());
        }
        let size = self.len + 1;
        let block = unsafe { self.allocator.grow_zeroed(self.data, size, size)? };
        self.data = Some(block);
        self.cap = size;
        Ok(())
    }

    /// Offset of the first occurrence of `needle`.
    ///
    /// An empty needle matches at 0.
    pub fn find(&self, needle: &[u8]) -> Option<usize> {
        find_bytes(self.as_bytes(), needle)
    }

    /// Release storage. The string stays usable and empty.
    pub fn free(&mut self) {
        unsafe { self.allocator.release(&mut self.data) };
        self.len = 0;
        self.cap = 0;
    }
}

/// Substring search driven by the engine's byte scan
pub(crate) fn find_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    let Some((&first, rest)) = needle.split_first() else {
        return Some(0);
    };
    if needle.len() > haystack.len() {
        return None;
    }
    let engine = get_global_engine();
    let last_start = haystack.len() - needle.len();
    let mut from = 0;
    while from <= last_start {
        let at = from + engine.find_byte(&haystack[from..=last_start], first)?;
        let tail = &haystack[at + 1..at + needle.len()];
        if engine.compare(tail, rest) == 0 {
            return Some(at);
        }
        from = at + 1;
    }
    None
}

impl Default for TaggedStr {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TaggedStr {
    fn drop(&mut self) {
        self.free();
    }
}

impl Clone for TaggedStr {
    fn clone(&self) -> Self {
        Self::from_slice(self.as_bytes()).unwrap_or_else(|e| {
            log::warn!("TaggedStr clone failed: {}", e);
            Self::new()
        })
    }
}

impl PartialEq for TaggedStr {
    fn eq(&self, other: &Self) -> bool {
        get_global_engine().compare(self.as_bytes(), other.as_bytes()) == 0
    }
}

impl Eq for TaggedStr {}

impl PartialEq<[u8]> for TaggedStr {
    fn eq(&self, other: &[u8]) -> bool {
        self.as_bytes() == other
    }
}

impl PartialEq<str> for TaggedStr {
    fn eq(&self, other: &str) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl FromStr for TaggedStr {
    type Err = MemError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_slice(s.as_bytes())
    }
}

impl fmt::Write for TaggedStr {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.push_str(s).map_err(|_| fmt::Error)
    }
}

impl fmt::Debug for TaggedStr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaggedStr")
            .field("content", &self.to_string_lossy())
            .field("len", &self.len)
            .field("capacity", &self.cap)
            .finish()
    }
}

impl fmt::Display for TaggedStr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_lossy())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt::Write;

    fn assert_terminated(s: &TaggedStr) {
        if s.data.is_some() {
            assert!(s.capacity() > s.len());
            assert_eq!(s.as_bytes_with_nul()[s.len()], 0);
        }
    }

    #[test]
    fn test_push_and_trim() {
        let mut s = TaggedStr::from_slice(b"hello").unwrap();
        assert_eq!(s.capacity(), 6);
        s.push(b'!').unwrap();
        assert_eq!(s.as_bytes(), b"hello!");
        assert_eq!(s.len(), 6);
        assert_terminated(&s);

        let cap = s.capacity();
        s.trim(b"!h");
        assert_eq!(s.as_bytes(), b"ello");
        assert_eq!(s.len(), 4);
        assert_eq!(s.capacity(), cap);
        assert_terminated(&s);
    }

    #[test]
    fn test_push_doubles() {
        let mut s = TaggedStr::with_capacity(1).unwrap();
        s.push(b'a').unwrap();
        assert_eq!(s.capacity(), 2);
        s.push(b'b').unwrap();
        assert_eq!(s.capacity(), 4);
        assert_eq!(s, *"ab");
    }

    #[test]
    fn test_push_on_empty() {
        let mut s = TaggedStr::new();
        assert!(s.as_c_str().to_bytes().is_empty());
        s.push_str("abc").unwrap();
        s.push(b'd').unwrap();
        assert_eq!(s.as_bytes(), b"abcd");
        assert_terminated(&s);
    }

    #[test]
    fn test_repeat() {
        let mut s = TaggedStr::from_slice(b">").unwrap();
        s.repeat(b"ab", 3).unwrap();
        assert_eq!(s.as_bytes(), b">ababab");
        assert_eq!(s.capacity(), 8);
        assert_terminated(&s);

        assert!(s.repeat(b"xy", usize::MAX).is_err());
        assert_eq!(s.as_bytes(), b">ababab");
        s.repeat(b"", 5).unwrap();
        s.repeat(b"z", 0).unwrap();
        assert_eq!(s.len(), 7);
    }

    #[test]
    fn test_trim_everything() {
        let mut s = TaggedStr::from_slice(b"  \t ").unwrap();
        s.trim(b" \t");
        assert!(s.is_empty());
        assert_eq!(s.as_bytes_with_nul(), b"\0");

        let mut s = TaggedStr::from_slice(b"xx").unwrap();
        s.trim(b"");
        assert_eq!(s.as_bytes(), b"xx");
    }

    #[test]
    fn test_trim_zeroes_tail() {
        let mut s = TaggedStr::from_slice(b"--abc--").unwrap();
        s.trim(b"-");
        let raw = unsafe { slice::from_raw_parts(s.ptr(), s.capacity()) };
        assert_eq!(raw, b"abc\0\0\0\0\0");
    }

    #[test]
    fn test_pop_clear_fit() {
        let mut s = TaggedStr::from_slice(b"xyz").unwrap();
        assert_eq!(s.pop(), Some(b'z'));
        assert_eq!(s.as_bytes(), b"xy");
        assert_terminated(&s);

        s.reserve(32).unwrap();
        assert!(s.capacity() >= 35);
        s.fit().unwrap();
        assert_eq!(s.capacity(), 3);
        assert_eq!(s.as_bytes(), b"xy");

        s.clear();
        assert!(s.is_empty());
        assert_eq!(s.pop(), None);
    }

    #[test]
    fn test_find() {
        let s: TaggedStr = "needle in a haystack of needles".parse().unwrap();
        assert_eq!(s.find(b"needle"), Some(0));
        assert_eq!(s.find(b"hay"), Some(12));
        assert_eq!(s.find(b"needles"), Some(24));
        assert_eq!(s.find(b""), Some(0));
        assert_eq!(s.find(b"pin"), None);
        assert_eq!(TaggedStr::new().find(b"a"), None);
    }

    #[test]
    fn test_cstr_round_trip() {
        let source = CStr::from_bytes_with_nul(b"ffi\0").unwrap();
        let s = TaggedStr::from_cstr(source).unwrap();
        assert_eq!(s.as_c_str(), source);
        assert_eq!(s.to_cstring().as_bytes(), b"ffi");
    }

    #[test]
    fn test_fmt_write() {
        let mut s = TaggedStr::new();
        write!(s, "{}-{}", 12, "ab").unwrap();
        assert_eq!(s.to_string(), "12-ab");
        assert_eq!(s.clone(), s);
    }

    #[test]
    fn test_free_then_reuse() {
        let mut s = TaggedStr::from_slice(b"data").unwrap();
        s.free();
        assert_eq!(s.capacity(), 0);
        assert!(s.as_bytes().is_empty());
        s.push(b'q').unwrap();
        assert_eq!(s.as_bytes(), b"q");
    }
}
