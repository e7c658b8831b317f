//! Character-indexed string helpers.
//!
//! Operations address text by `char` index. These helpers translate to byte
//! offsets and saturate at the end of the string instead of panicking.

/// Number of `char`s in `s`.
pub fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Byte offset of the `char` at `index`, or `s.len()` past the end.
pub fn byte_offset(s: &str, index: usize) -> usize {
    s.char_indices().nth(index).map_or(s.len(), |(offset, _)| offset)
}

/// Substring covering chars `[start, end)`. Out-of-range bounds are clamped.
pub fn slice(s: &str, start: usize, end: usize) -> &str {
    let from = byte_offset(s, start);
    let to = byte_offset(s, end.max(start));
    &s[from..to]
}

/// Substring from char `start` to the end.
pub fn slice_from(s: &str, start: usize) -> &str {
    &s[byte_offset(s, start)..]
}

/// Replace chars `[start, start + len)` of `s` with `with`.
pub fn splice(s: &str, start: usize, len: usize, with: &str) -> String {
    let from = byte_offset(s, start);
    let to = byte_offset(s, start.saturating_add(len));
    let mut out = String::with_capacity(s.len() - (to - from) + with.len());
    out.push_str(&s[..from]);
    out.push_str(with);
    out.push_str(&s[to..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multibyte_offsets() {
        let s = "héllo";
        assert_eq!(char_len(s), 5);
        assert_eq!(byte_offset(s, 2), 3);
        assert_eq!(slice(s, 1, 3), "él");
        assert_eq!(slice_from(s, 3), "lo");
    }

    #[test]
    fn test_out_of_range_saturates() {
        assert_eq!(byte_offset("abc", 10), 3);
        assert_eq!(slice("abc", 2, 10), "c");
        assert_eq!(slice("abc", 5, 1), "");
        assert_eq!(splice("abc", 10, 2, "!"), "abc!");
    }

    #[test]
    fn test_splice() {
        assert_eq!(splice("HELLO", 1, 3, ""), "HO");
        assert_eq!(splice("AC", 1, 0, "B"), "ABC");
        assert_eq!(splice("añb", 1, 1, "nn"), "annb");
    }
}
