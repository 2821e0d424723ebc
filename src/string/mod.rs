//! Null-terminated strings
//!
//! [`TaggedStr`] is the owned, growable form. The [`cstr`] functions work on
//! borrowed byte slices read as C strings and build `TaggedStr` results.

pub mod cstr;
mod tagged_str;

pub use cstr::{split, strchr, strjoin, strlcat, strlcpy, strlen, strncmp, strnlen, strnstr, strrchr, strtrim, substr};
pub use tagged_str::TaggedStr;
