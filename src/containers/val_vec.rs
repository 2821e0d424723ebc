//! ValVec: type-erased growable vector over the aligned allocator
//!
//! Elements are opaque runs of `elem_size` bytes. Storage comes from
//! [`AlignedAllocator`] and every internal copy or shift goes through the
//! global [`MemEngine`](crate::memory::MemEngine), so element moves use the
//! same width-adaptive kernels as raw `mem_*` calls.
//!
//! Capacity grows to `max(2 * capacity, required)` and freshly added
//! capacity is zeroed. A failed growth leaves the vector untouched.

use crate::error::{checked_size, MemError, Result};
use crate::memory::{get_global_engine, AlignedAllocator};
use std::fmt;
use std::mem;
use std::ptr::NonNull;
use std::slice;

mod sealed {
    pub trait Sealed {}
}

/// Plain-old-data types that can be stored in a [`ValVec`] by value.
///
/// # Safety
///
/// Implementors must have no padding and accept every bit pattern, so
/// that viewing a value as bytes and reading it back from bytes is sound.
pub unsafe trait Element: Copy + sealed::Sealed + 'static {}

macro_rules! impl_element {
    ($($t:ty),* $(,)?) => {
        $(
            impl sealed::Sealed for $t {}
            unsafe impl Element for $t {}
        )*
    };
}

impl_element!(u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize, f32, f64);

#[inline]
fn element_bytes<T: Element>(values: &[T]) -> &[u8] {
    // SAFETY: Element types have no padding
    unsafe { slice::from_raw_parts(values.as_ptr() as *const u8, mem::size_of_val(values)) }
}

/// Growable vector of fixed-size opaque elements
///
/// # Examples
///
/// ```rust
/// use lvmem::ValVec;
///
/// let mut vec = ValVec::with_capacity(4, 4).unwrap();
/// vec.push_values(&[1i32, 2, 3]).unwrap();
/// vec.insert_values(1, &[99i32]).unwrap();
/// assert_eq!(vec.len(), 4);
/// assert_eq!(vec.get_value::<i32>(1), Some(99));
/// ```
pub struct ValVec {
    data: Option<NonNull<u8>>,
    len: usize,
    cap: usize,
    elem_size: usize,
    allocator: AlignedAllocator,
}

impl ValVec {
    /// Create an empty vector of `elem_size` byte elements
    pub fn new(elem_size: usize) -> Result<Self> {
        Self::with_capacity(0, elem_size)
    }

    /// Create a vector with room for `cap` elements of `elem_size` bytes
    pub fn with_capacity(cap: usize, elem_size: usize) -> Result<Self> {
        Self::with_allocator(cap, elem_size, AlignedAllocator::default())
    }

    /// Create a vector that draws storage from `allocator`
    pub fn with_allocator(cap: usize, elem_size: usize, allocator: AlignedAllocator) -> Result<Self> {
        if elem_size == 0 {
            return Err(MemError::invalid_argument("element size must be non-zero"));
        }
        let mut vec = Self {
            data: None,
            len: 0,
            cap: 0,
            elem_size,
            allocator,
        };
        if cap > 0 {
            let bytes = checked_size(cap, elem_size, "vector allocation")?;
            vec.data = Some(allocator.allocate_zeroed(bytes)?);
            vec.cap = cap;
        }
        Ok(vec)
    }

    /// Create a vector for values of type `T`
    pub fn for_type<T: Element>(cap: usize) -> Result<Self> {
        Self::with_capacity(cap, mem::size_of::<T>())
    }

    /// Number of elements
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the vector holds no elements
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Capacity in elements
    #[inline]
    pub fn capacity(&self) -> usize {
        self.cap
    }

    /// Element stride in bytes
    #[inline]
    pub fn elem_size(&self) -> usize {
        self.elem_size
    }

    /// Live elements as one contiguous byte slice
    pub fn as_bytes(&self) -> &[u8] {
        match self.data {
            // SAFETY: len * elem_size bytes are initialized
            Some(ptr) => unsafe { slice::from_raw_parts(ptr.as_ptr(), self.len * self.elem_size) },
            None => &[],
        }
    }

    /// Mutable view of the live elements
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        match self.data {
            Some(ptr) => unsafe { slice::from_raw_parts_mut(ptr.as_ptr(), self.len * self.elem_size) },
            None => &mut [],
        }
    }

    /// Iterate over elements as byte slices
    pub fn iter(&self) -> slice::ChunksExact<'_, u8> {
        self.as_bytes().chunks_exact(self.elem_size)
    }

    /// Element count held by `data`, which must be whole elements
    fn count_of(&self, data: &[u8]) -> Result<usize> {
        if data.len() % self.elem_size != 0 {
            return Err(MemError::invalid_argument(format!(
                "{} bytes is not a whole number of {} byte elements",
                data.len(),
                self.elem_size
            )));
        }
        Ok(data.len() / self.elem_size)
    }

    /// Make room for at least `needed` elements
    fn grow_to(&mut self, needed: usize) -> Result<()> {
        if needed <= self.cap {
            return Ok(());
        }
        let new_cap = needed.max(self.cap.saturating_mul(2));
        let new_bytes = checked_size(new_cap, self.elem_size, "vector growth")?;
        let old_bytes = self.cap * self.elem_size;
        // SAFETY: data is a live block of old_bytes from our allocator
        let block = unsafe { self.allocator.grow_zeroed(self.data, old_bytes, new_bytes)? };
        self.data = Some(block);
        self.cap = new_cap;
        Ok(())
    }

    /// Base pointer of element `index`. Requires `index <= cap` and data present.
    #[inline]
    fn slot(&self, index: usize) -> *mut u8 {
        match self.data {
            Some(ptr) => unsafe { ptr.as_ptr().add(index * self.elem_size) },
            None => std::ptr::null_mut(),
        }
    }

    /// Append the elements packed in `data`.
    ///
    /// `data.len()` must be a multiple of [`Self::elem_size`]; an empty
    /// slice is a no-op.
    pub fn push(&mut self, data: &[u8]) -> Result<()> {
        let count = self.count_of(data)?;
        if count == 0 {
            return Ok(());
        }
        let needed = self
            .len
            .checked_add(count)
            .ok_or_else(|| MemError::capacity_overflow("vector push"))?;
        self.grow_to(needed)?;
        unsafe {
            get_global_engine().copy_raw(self.slot(self.len), data.as_ptr(), data.len());
        }
        self.len = needed;
        Ok(())
    }

    /// Insert the elements packed in `data` before element `index`.
    ///
    /// Elements from `index` on are shifted up. `index == len` appends.
    pub fn insert(&mut self, index: usize, data: &[u8]) -> Result<()> {
        if index > self.len {
            return Err(MemError::out_of_bounds(index, self.len));
        }
        let count = self.count_of(data)?;
        if count == 0 {
            return Ok(());
        }
        let needed = self
            .len
            .checked_add(count)
            .ok_or_else(|| MemError::capacity_overflow("vector insert"))?;
        self.grow_to(needed)?;

        let engine = get_global_engine();
        unsafe {
            let at = self.slot(index);
            engine.move_raw(self.slot(index + count), at, (self.len - index) * self.elem_size);
            engine.copy_raw(at, data.as_ptr(), data.len());
        }
        self.len = needed;
        Ok(())
    }

    /// Remove the last element and zero its slot. Returns false when empty.
    pub fn pop(&mut self) -> bool {
        if self.len == 0 {
            return false;
        }
        self.len -= 1;
        unsafe { get_global_engine().set_raw(self.slot(self.len), 0, self.elem_size) };
        true
    }

    /// Move the last element into `out` and zero its slot.
    ///
    /// `out` must be exactly one element long. Returns false when empty.
    pub fn pop_into(&mut self, out: &mut [u8]) -> Result<bool> {
        if out.len() != self.elem_size {
            return Err(MemError::invalid_argument(format!(
                "output of {} bytes for {} byte elements",
                out.len(),
                self.elem_size
            )));
        }
        if self.len == 0 {
            return Ok(false);
        }
        self.len -= 1;
        unsafe { get_global_engine().take_raw(out.as_mut_ptr(), self.slot(self.len), self.elem_size) };
        Ok(true)
    }

    /// Remove element `index`, shifting later elements down
    pub fn remove(&mut self, index: usize) -> Result<()> {
        if index >= self.len {
            return Err(MemError::out_of_bounds(index, self.len));
        }
        let engine = get_global_engine();
        unsafe {
            engine.move_raw(
                self.slot(index),
                self.slot(index + 1),
                (self.len - index - 1) * self.elem_size,
            );
            self.len -= 1;
            engine.set_raw(self.slot(self.len), 0, self.elem_size);
        }
        Ok(())
    }

    /// Element `index`, or `None` past the end
    pub fn get(&self, index: usize) -> Option<&[u8]> {
        if index >= self.len {
            return None;
        }
        let start = index * self.elem_size;
        Some(&self.as_bytes()[start..start + self.elem_size])
    }

    /// Mutable element `index`
    pub fn get_mut(&mut self, index: usize) -> Option<&mut [u8]> {
        if index >= self.len {
            return None;
        }
        let start = index * self.elem_size;
        let size = self.elem_size;
        Some(&mut self.as_bytes_mut()[start..start + size])
    }

    /// Last element
    pub fn peek_last(&self) -> Option<&[u8]> {
        self.len.checked_sub(1).and_then(|i| self.get(i))
    }

    /// Zero the live elements and set the length to zero. Capacity is kept.
    pub fn clear(&mut self) {
        if self.data.is_some() {
            unsafe { get_global_engine().set_raw(self.slot(0), 0, self.len * self.elem_size) };
        }
        self.len = 0;
    }

    /// Ensure room for `additional` more elements
    pub fn reserve(&mut self, additional: usize) -> Result<()> {
        let needed = self
            .len
            .checked_add(additional)
            .ok_or_else(|| MemError::capacity_overflow("vector reserve"))?;
        self.grow_to(needed)
    }

    /// Shrink capacity to the current length
    pub fn fit(&mut self) -> Result<()> {
        if self.len == self.cap {
            return Ok(());
        }
        if self.len == 0 {
            self.free_storage();
            return Ok(());
        }
        let bytes = self.len * self.elem_size;
        let block = unsafe { self.allocator.grow_zeroed(self.data, bytes, bytes)? };
        self.data = Some(block);
        self.cap = self.len;
        Ok(())
    }

    /// Reverse element order in place
    pub fn reverse(&mut self) {
        if self.len < 2 {
            return;
        }
        let engine = get_global_engine();
        for i in 0..self.len / 2 {
            // Distinct slots never overlap, so the swap always succeeds
            unsafe { engine.swap_raw(self.slot(i), self.slot(self.len - i - 1), self.elem_size) };
        }
    }

    fn free_storage(&mut self) {
        unsafe { self.allocator.release(&mut self.data) };
        self.len = 0;
        self.cap = 0;
    }

    /// Release storage. The vector stays usable with zero capacity.
    pub fn free(&mut self) {
        self.free_storage();
    }

    fn check_type<T: Element>(&self) -> Result<()> {
        if mem::size_of::<T>() != self.elem_size {
            return Err(MemError::invalid_argument(format!(
                "{} is {} bytes, vector elements are {}",
                std::any::type_name::<T>(),
                mem::size_of::<T>(),
                self.elem_size
            )));
        }
        Ok(())
    }

    /// Append typed values
    pub fn push_values<T: Element>(&mut self, values: &[T]) -> Result<()> {
        self.check_type::<T>()?;
        self.push(element_bytes(values))
    }

    /// Insert typed values before `index`
    pub fn insert_values<T: Element>(&mut self, index: usize, values: &[T]) -> Result<()> {
        self.check_type::<T>()?;
        self.insert(index, element_bytes(values))
    }

    /// Element `index` read as `T`
    pub fn get_value<T: Element>(&self, index: usize) -> Option<T> {
        self.check_type::<T>().ok()?;
        let bytes = self.get(index)?;
        // SAFETY: size matches and T accepts every bit pattern
        Some(unsafe { (bytes.as_ptr() as *const T).read_unaligned() })
    }

    /// Remove the last element, returning it as `T`
    pub fn pop_value<T: Element>(&mut self) -> Option<T> {
        let value = self.get_value::<T>(self.len.checked_sub(1)?)?;
        self.pop();
        Some(value)
    }
}

impl Drop for ValVec {
    fn drop(&mut self) {
        self.free_storage();
    }
}

impl Clone for ValVec {
    fn clone(&self) -> Self {
        let mut out = Self {
            data: None,
            len: 0,
            cap: 0,
            elem_size: self.elem_size,
            allocator: self.allocator,
        };
        // Clone cannot report failure; an exhausted allocator yields an empty copy
        if let Err(e) = out.push(self.as_bytes()) {
            log::warn!("ValVec clone failed: {}", e);
        }
        out
    }
}

impl PartialEq for ValVec {
    fn eq(&self, other: &Self) -> bool {
        self.elem_size == other.elem_size && get_global_engine().compare(self.as_bytes(), other.as_bytes()) == 0
    }
}

impl Eq for ValVec {}

impl fmt::Debug for ValVec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValVec")
            .field("len", &self.len)
            .field("capacity", &self.cap)
            .field("elem_size", &self.elem_size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(vec: &ValVec) -> Vec<i32> {
        (0..vec.len()).map(|i| vec.get_value::<i32>(i).unwrap()).collect()
    }

    #[test]
    fn test_push_and_insert() {
        let mut vec = ValVec::for_type::<i32>(4).unwrap();
        vec.push_values(&[1i32, 2, 3]).unwrap();
        assert_eq!(vec.len(), 3);
        assert_eq!(vec.get_value::<i32>(0), Some(1));
        assert_eq!(vec.get_value::<i32>(2), Some(3));

        vec.insert_values(1, &[99i32]).unwrap();
        assert_eq!(values(&vec), vec![1, 99, 2, 3]);
        assert_eq!(vec.capacity(), 4);
    }

    #[test]
    fn test_growth_doubles() {
        let mut vec = ValVec::with_capacity(2, 8).unwrap();
        for i in 0..3u64 {
            vec.push_values(&[i]).unwrap();
        }
        assert_eq!(vec.capacity(), 4);
        vec.push_values(&[0u64; 10]).unwrap();
        assert_eq!(vec.capacity(), 13);
        assert!(vec.len() <= vec.capacity());
    }

    #[test]
    fn test_new_capacity_zeroed() {
        let mut vec = ValVec::with_capacity(1, 4).unwrap();
        vec.push(&[0xFF; 4]).unwrap();
        vec.push(&[0xEE; 4]).unwrap();
        vec.reserve(10).unwrap();
        let raw = unsafe { slice::from_raw_parts(vec.slot(0), vec.capacity() * 4) };
        assert!(raw[8..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_invalid_arguments() {
        assert!(ValVec::new(0).is_err());
        assert!(ValVec::with_capacity(usize::MAX, 8).is_err());

        let mut vec = ValVec::new(4).unwrap();
        assert!(vec.push(&[1, 2, 3]).is_err());
        assert!(vec.insert(1, &[0; 4]).is_err());
        assert!(vec.push_values(&[1u64]).is_err());
        assert!(vec.push(&[]).is_ok());
        assert!(vec.is_empty());
    }

    #[test]
    fn test_pop_zeroes_slot() {
        let mut vec = ValVec::for_type::<u32>(4).unwrap();
        vec.push_values(&[7u32, 8]).unwrap();
        assert!(vec.pop());
        assert_eq!(vec.len(), 1);
        let raw = unsafe { slice::from_raw_parts(vec.slot(1), 4) };
        assert_eq!(raw, &[0, 0, 0, 0]);

        assert_eq!(vec.pop_value::<u32>(), Some(7));
        assert!(!vec.pop());
        assert_eq!(vec.pop_value::<u32>(), None);
    }

    #[test]
    fn test_pop_into() {
        let mut vec = ValVec::new(2).unwrap();
        vec.push(b"abcd").unwrap();
        let mut out = [0u8; 2];
        assert!(vec.pop_into(&mut out).unwrap());
        assert_eq!(&out, b"cd");
        assert!(vec.pop_into(&mut [0u8; 3]).is_err());
        assert_eq!(vec.peek_last(), Some(&b"ab"[..]));
    }

    #[test]
    fn test_remove_and_reverse() {
        let mut vec = ValVec::for_type::<i32>(0).unwrap();
        vec.push_values(&[1i32, 2, 3, 4, 5]).unwrap();
        vec.remove(1).unwrap();
        assert_eq!(values(&vec), vec![1, 3, 4, 5]);
        assert!(vec.remove(4).is_err());

        vec.reverse();
        assert_eq!(values(&vec), vec![5, 4, 3, 1]);
    }

    #[test]
    fn test_get_bounds() {
        let mut vec = ValVec::new(1).unwrap();
        vec.push(b"xy").unwrap();
        assert_eq!(vec.get(1), Some(&b"y"[..]));
        assert_eq!(vec.get(2), None);
        vec.get_mut(0).unwrap()[0] = b'z';
        assert_eq!(vec.as_bytes(), b"zy");
        assert_eq!(vec.iter().count(), 2);
    }

    #[test]
    fn test_clear_fit_free() {
        let mut vec = ValVec::with_capacity(16, 2).unwrap();
        vec.push(b"aabbcc").unwrap();
        vec.fit().unwrap();
        assert_eq!(vec.capacity(), 3);
        assert_eq!(vec.as_bytes(), b"aabbcc");

        vec.clear();
        assert!(vec.is_empty());
        assert_eq!(vec.capacity(), 3);

        vec.free();
        assert_eq!(vec.capacity(), 0);
        vec.push(b"zz").unwrap();
        assert_eq!(vec.len(), 1);
    }

    #[test]
    fn test_clone_eq() {
        let mut vec = ValVec::new(3).unwrap();
        vec.push(b"abcdef").unwrap();
        let copy = vec.clone();
        assert_eq!(copy, vec);
        vec.pop();
        assert_ne!(copy, vec);
    }
}
