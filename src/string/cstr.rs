//! Null-terminated string helpers over byte slices
//!
//! Slices are read as C strings: content ends at the first zero byte, or
//! at the end of the slice when it holds none. Functions that build a new
//! string return a [`TaggedStr`].

use super::tagged_str::{find_bytes, TaggedStr};
use crate::error::Result;
use crate::memory::{get_global_engine, mem_find_byte_unchecked};

/// Length of the C string at `ptr`.
///
/// # Safety
///
/// `ptr` must point to a readable, null-terminated byte sequence. The scan
/// is unbounded; a missing terminator reads past the allocation.
pub unsafe fn strlen(ptr: *const u8) -> usize {
    unsafe { mem_find_byte_unchecked(ptr, 0).offset_from(ptr) as usize }
}

/// Length of the C string held in `s`
pub fn strnlen(s: &[u8]) -> usize {
    get_global_engine().find_byte(s, 0).unwrap_or(s.len())
}

#[inline]
fn content(s: &[u8]) -> &[u8] {
    &s[..strnlen(s)]
}

/// Copy `src` to the front of `dst` through the engine
#[inline]
fn copy_into(dst: &mut [u8], src: &[u8]) {
    let dst = &mut dst[..src.len()];
    // Distinct borrows never alias, so the engine cannot reject the pair
    unsafe { get_global_engine().copy_raw(dst.as_mut_ptr(), src.as_ptr(), src.len()) };
}

/// Offset of the first `c` in the C string `s`.
///
/// Searching for zero finds the terminator, when `s` holds one.
pub fn strchr(s: &[u8], c: u8) -> Option<usize> {
    if c == 0 {
        return get_global_engine().find_byte(s, 0);
    }
    get_global_engine().find_byte(content(s), c)
}

/// Offset of the last `c` in the C string `s`
pub fn strrchr(s: &[u8], c: u8) -> Option<usize> {
    if c == 0 {
        return strchr(s, 0);
    }
    content(s).iter().rposition(|&b| b == c)
}

/// Offset of `needle` within the first `n` bytes of `haystack`.
///
/// An empty needle matches at 0; a needle longer than `n` never matches.
pub fn strnstr(haystack: &[u8], needle: &[u8], n: usize) -> Option<usize> {
    let needle = content(needle);
    if needle.is_empty() {
        return Some(0);
    }
    if needle.len() > n {
        return None;
    }
    let hay = content(haystack);
    find_bytes(&hay[..hay.len().min(n)], needle)
}

/// Compare at most `n` bytes of two C strings
pub fn strncmp(a: &[u8], b: &[u8], n: usize) -> i32 {
    let a = content(a);
    let b = content(b);
    let common = a.len().min(b.len()).min(n);
    let ord = get_global_engine().compare(&a[..common], &b[..common]);
    if ord != 0 || common == n {
        return ord;
    }
    // One string ended inside the window: compare against its terminator
    let x = a.get(common).copied().unwrap_or(0);
    let y = b.get(common).copied().unwrap_or(0);
    i32::from(x) - i32::from(y)
}

/// Copy the C string `src` into `dst`, truncating to fit and always
/// terminating a non-empty `dst`. Returns the length of `src`.
pub fn strlcpy(dst: &mut [u8], src: &[u8]) -> usize {
    let src = content(src);
    if dst.is_empty() {
        return src.len();
    }
    let copied = src.len().min(dst.len() - 1);
    copy_into(dst, &src[..copied]);
    dst[copied] = 0;
    src.len()
}

/// Append the C string `src` to the C string in `dst`, truncating to fit.
///
/// Returns the length the concatenation would have had. When `dst` holds
/// no terminator within its length, returns `dst.len() + strlen(src)` and
/// leaves `dst` unchanged.
pub fn strlcat(dst: &mut [u8], src: &[u8]) -> usize {
    let src = content(src);
    let dst_len = strnlen(dst);
    if dst.len() <= dst_len {
        return src.len() + dst.len();
    }
    let room = dst.len() - dst_len - 1;
    let copied = src.len().min(room);
    copy_into(&mut dst[dst_len..], &src[..copied]);
    dst[dst_len + copied] = 0;
    dst_len + src.len()
}

/// Up to `len` bytes of `s` starting at `start`.
///
/// A start past the end yields an empty string.
pub fn substr(s: &[u8], start: usize, len: usize) -> Result<TaggedStr> {
    let s = content(s);
    if start >= s.len() {
        return TaggedStr::from_slice(b"");
    }
    let end = start + len.min(s.len() - start);
    TaggedStr::from_slice(&s[start..end])
}

/// Concatenate two C strings
pub fn strjoin(a: &[u8], b: &[u8]) -> Result<TaggedStr> {
    let (a, b) = (content(a), content(b));
    let mut out = TaggedStr::with_capacity(a.len() + b.len())?;
    out.push_bytes(a)?;
    out.push_bytes(b)?;
    Ok(out)
}

/// Copy of `s` with bytes from `set` stripped from both ends
pub fn strtrim(s: &[u8], set: &[u8]) -> Result<TaggedStr> {
    let mut out = TaggedStr::from_slice(content(s))?;
    out.trim(content(set));
    Ok(out)
}

/// Split `s` on `sep`, dropping empty fields
pub fn split(s: &[u8], sep: u8) -> Result<Vec<TaggedStr>> {
    content(s)
        .split(|&b| b == sep)
        .filter(|field| !field.is_empty())
        .map(TaggedStr::from_slice)
        .collect()
}

/// New string built by applying `f(index, byte)` to every byte of `s`
pub fn strmapi<F>(s: &[u8], mut f: F) -> Result<TaggedStr>
where
    F: FnMut(usize, u8) -> u8,
{
    let s = content(s);
    let mut out = TaggedStr::with_capacity(s.len())?;
    for (i, &b) in s.iter().enumerate() {
        out.push(f(i, b))?;
    }
    Ok(out)
}

/// Apply `f(index, &mut byte)` to every byte of the C string in `s`
pub fn striteri<F>(s: &mut [u8], mut f: F)
where
    F: FnMut(usize, &mut u8),
{
    let len = strnlen(s);
    for (i, b) in s[..len].iter_mut().enumerate() {
        f(i, b);
    }
}
