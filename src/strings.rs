//! Library-name string evidence.
//!
//! Splits a data blob into NUL-delimited tokens and keeps those that look like shared
//! object file names. This is purely textual: nothing checks whether a token is ever
//! passed to a loader.

use memchr::{memchr_iter, memmem};

const SHARED_OBJECT_MARKER: &[u8] = b".so";

/// Tokens of `buffer` containing `.so`, in first-seen order, duplicates kept.
///
/// A trailing token with no terminating NUL is still considered.
pub fn scan(buffer: &[u8]) -> Vec<String> {
    let finder = memmem::Finder::new(SHARED_OBJECT_MARKER);
    let mut found = Vec::new();
    let mut start = 0;

    let ends = memchr_iter(0, buffer).chain(std::iter::once(buffer.len()));
    for end in ends {
        let token = &buffer[start..end];
        start = end + 1;
        if !token.is_empty() && finder.find(token).is_some() {
            found.push(String::from_utf8_lossy(token).into_owned());
        }
    }
    found
}
