//! Single-hunk text diff.
//!
//! Incremental typing changes one contiguous region at a time, so one edit is
//! enough to describe it. This is not a general multi-hunk diff.

use crate::operation::Edit;
use crate::text::{char_len, slice};

/// Smallest single edit turning `old` into `new`, or `None` if they are equal.
///
/// Strips the longest common prefix, then the longest common suffix that does
/// not overlap it. Pure additions become an insert, pure removals a delete
/// (with the removed text), and anything else a modify of the changed hunk.
pub fn diff(old: &str, new: &str) -> Option<Edit> {
    if old == new {
        return None;
    }

    let prefix = old
        .chars()
        .zip(new.chars())
        .take_while(|(a, b)| a == b)
        .count();

    let old_len = char_len(old);
    let new_len = char_len(new);
    let max_suffix = old_len.min(new_len) - prefix;
    let suffix = old
        .chars()
        .rev()
        .zip(new.chars().rev())
        .take(max_suffix)
        .take_while(|(a, b)| a == b)
        .count();

    let removed = slice(old, prefix, old_len - suffix);
    let inserted = slice(new, prefix, new_len - suffix);

    let edit = match (removed.is_empty(), inserted.is_empty()) {
        (true, false) => Edit::insert(prefix, inserted),
        (false, true) => Edit::delete(prefix, removed),
        _ => Edit::modify(prefix, removed, inserted),
    };
    Some(edit)
}
