//! Golden transform vectors.
//!
//! Each vector is a base text, two concurrent operations and the text both
//! replicas must end up with. Any implementation of the transform rules has
//! to reproduce every one of them.

use concord_core::{apply, transform, ClientId, Edit, Operation};

/// A golden transform vector.
#[derive(Debug, Clone)]
pub struct TransformVector {
    /// Human-readable name for the vector.
    pub name: &'static str,
    /// Text both operations were made on.
    pub base: &'static str,
    pub a: Operation,
    pub b: Operation,
    /// Converged text.
    pub expected: &'static str,
}

fn op(client: u32, edit: Edit) -> Operation {
    Operation::stamped(ClientId(client), 1, edit)
}

/// Get all golden transform vectors.
pub fn all_vectors() -> Vec<TransformVector> {
    vec![
        TransformVector {
            name: "concurrent inserts at the same position",
            base: "AC",
            a: op(1, Edit::insert(1, "B")),
            b: op(2, Edit::insert(1, "X")),
            expected: "ABXC",
        },
        TransformVector {
            name: "concurrent inserts, higher client first",
            base: "AC",
            a: op(2, Edit::insert(1, "X")),
            b: op(1, Edit::insert(1, "B")),
            expected: "ABXC",
        },
        TransformVector {
            name: "insert inside a concurrent delete",
            base: "HELLO",
            a: op(1, Edit::delete(1, "ELL")),
            b: op(2, Edit::insert(2, "Z")),
            expected: "HZO",
        },
        TransformVector {
            name: "insert inside a delete of unknown content",
            base: "HELLO",
            a: op(1, Edit::delete_len(1, 3)),
            b: op(2, Edit::insert(2, "Z")),
            expected: "HO",
        },
        TransformVector {
            name: "insert after a delete",
            base: "HELLO",
            a: op(1, Edit::delete(0, "HE")),
            b: op(2, Edit::insert(5, "!")),
            expected: "LLO!",
        },
        TransformVector {
            name: "overlapping deletes",
            base: "abcdefg",
            a: op(1, Edit::delete(1, "bcd")),
            b: op(2, Edit::delete(2, "cdef")),
            expected: "ag",
        },
        TransformVector {
            name: "identical deletes",
            base: "abcdefg",
            a: op(1, Edit::delete(2, "cd")),
            b: op(2, Edit::delete(2, "cd")),
            expected: "abefg",
        },
        TransformVector {
            name: "delete before a modify",
            base: "abcdef",
            a: op(1, Edit::delete(0, "ab")),
            b: op(2, Edit::modify(3, "de", "DE")),
            expected: "cDEf",
        },
        TransformVector {
            name: "delete overlapping a modify",
            base: "abcdefg",
            a: op(1, Edit::delete(1, "bcd")),
            b: op(2, Edit::modify(3, "def", "XY")),
            expected: "ag",
        },
        TransformVector {
            name: "insert inside a modify",
            base: "hello",
            a: op(1, Edit::insert(3, "*")),
            b: op(2, Edit::modify(2, "llo", "LP")),
            expected: "he*LP",
        },
        TransformVector {
            name: "modifies on the same range, lower client wins",
            base: "abcd",
            a: op(2, Edit::modify(0, "abc", "HIGH")),
            b: op(1, Edit::modify(0, "abc", "LOW")),
            expected: "LOWd",
        },
        TransformVector {
            name: "partially overlapping modifies",
            base: "abcdefg",
            a: op(3, Edit::modify(1, "bcd", "1")),
            b: op(2, Edit::modify(2, "cdef", "2")),
            expected: "ab2g",
        },
        TransformVector {
            name: "multibyte text",
            base: "día 日本",
            a: op(1, Edit::insert(2, "!")),
            b: op(2, Edit::delete(4, "日")),
            expected: "dí!a 本",
        },
    ]
}

/// Run a vector: both application orders, as `(left, right)`.
pub fn run_vector(vector: &TransformVector) -> (String, String) {
    let (a2, b2) = transform(&vector.a, &vector.b);
    let left = apply(&apply(vector.base, &vector.a), &b2);
    let right = apply(&apply(vector.base, &vector.b), &a2);
    (left, right)
}

/// Verify all vectors.
///
/// Returns (name, matches, left text) for each vector.
pub fn verify_all_vectors() -> Vec<(String, bool, String)> {
    all_vectors()
        .iter()
        .map(|v| {
            let (left, right) = run_vector(v);
            let matches = left == right && left == v.expected;
            (v.name.to_string(), matches, left)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_vectors_hold() {
        for (name, matches, got) in verify_all_vectors() {
            assert!(matches, "vector '{name}' produced {got:?}");
        }
    }

    #[test]
    fn test_vectors_hold_mirrored() {
        for vector in all_vectors() {
            let mirrored = TransformVector {
                a: vector.b.clone(),
                b: vector.a.clone(),
                ..vector.clone()
            };
            let (left, right) = run_vector(&mirrored);
            assert_eq!(left, right, "vector '{}' diverged mirrored", vector.name);
            assert_eq!(left, vector.expected, "vector '{}'", vector.name);
        }
    }
}
