//! Utility functions.

use std::ops::Range;
use std::path::Path;

/// Converts `offset`/`len` into a byte range, if it lies entirely within `total` bytes.
pub fn checked_range(offset: u64, len: u64, total: usize) -> Option<Range<usize>> {
    let end = offset.checked_add(len)?;
    if end > total as u64 {
        return None;
    }
    Some(offset as usize..end as usize)
}

/// Size in bytes of `count` records of `entsize` bytes, or `None` on overflow.
pub fn table_size(count: u64, entsize: u64) -> Option<u64> {
    count.checked_mul(entsize)
}

/// Final component of `path` as UTF-8, if any.
pub fn file_name_str(path: &Path) -> Option<&str> {
    path.file_name()?.to_str()
}
