//! Proptest generators for property-based testing.
//!
//! Edits are only meaningful against a given text, so most generators come
//! in two steps: generate the text, then an edit that is valid on it. For
//! sequences, where the text is only known at run time, [`EditSeed`] defers
//! the choice of position and range until it is materialized.

use proptest::prelude::*;

use concord_core::text::{char_len, slice};
use concord_core::{ClientId, Edit, Operation};

/// Short texts from a small alphabet, so positions and contents collide often.
pub fn base_text() -> impl Strategy<Value = String> {
    "[abcé日 ]{0,10}".prop_map(String::from)
}

/// Inserted content; may be empty, which makes the edit a no-op.
pub fn content() -> impl Strategy<Value = String> {
    "[xyzü]{0,3}".prop_map(String::from)
}

/// A client id from a small range, so ties happen.
pub fn client_id() -> impl Strategy<Value = ClientId> {
    (0u32..4).prop_map(ClientId)
}

/// Two distinct client ids.
pub fn distinct_clients() -> impl Strategy<Value = (ClientId, ClientId)> {
    (client_id(), client_id()).prop_filter("clients must differ", |(a, b)| a != b)
}

/// A valid edit on `text`.
pub fn edit_on(text: String) -> BoxedStrategy<Edit> {
    let n = char_len(&text);

    let insert = (0..=n, content())
        .prop_map(|(position, content)| Edit::insert(position, content))
        .boxed();

    let modify_text = text.clone();
    let modify = (0..=n)
        .prop_flat_map(move |position| (Just(position), 0..=n - position, content()))
        .prop_map(move |(position, len, new)| {
            Edit::modify(position, slice(&modify_text, position, position + len), new)
        })
        .boxed();

    if n == 0 {
        return prop_oneof![insert, modify].boxed();
    }

    let delete_text = text;
    let delete = (0..n)
        .prop_flat_map(move |position| (Just(position), 1..=n - position, any::<bool>()))
        .prop_map(move |(position, len, known)| {
            if known {
                Edit::delete(position, slice(&delete_text, position, position + len))
            } else {
                Edit::delete_len(position, len)
            }
        })
        .boxed();

    prop_oneof![insert, delete, modify].boxed()
}

/// Two concurrent operations from different clients on the same base text.
#[derive(Debug, Clone)]
pub struct ConcurrentPair {
    pub base: String,
    pub a: Operation,
    pub b: Operation,
}

impl Arbitrary for ConcurrentPair {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        base_text()
            .prop_flat_map(|base| {
                (
                    Just(base.clone()),
                    edit_on(base.clone()),
                    edit_on(base),
                    distinct_clients(),
                    1u64..100,
                    1u64..100,
                )
            })
            .prop_map(|(base, a, b, (ca, cb), ta, tb)| ConcurrentPair {
                base,
                a: Operation::stamped(ca, ta, a),
                b: Operation::stamped(cb, tb, b),
            })
            .boxed()
    }
}

/// An edit whose position and range are picked once the text is known.
#[derive(Debug, Clone)]
pub struct EditSeed {
    pub kind: u8,
    pub at: usize,
    pub len: usize,
    pub content: String,
}

impl EditSeed {
    /// Turn the seed into a valid edit on `text`.
    pub fn materialize(&self, text: &str) -> Edit {
        let n = char_len(text);
        let position = self.at % (n + 1);
        let room = n - position;

        match self.kind % 4 {
            1 if room > 0 => {
                let len = 1 + self.len % room;
                Edit::delete(position, slice(text, position, position + len))
            }
            2 if room > 0 => Edit::delete_len(position, 1 + self.len % room),
            3 => {
                let len = self.len % (room + 1);
                Edit::modify(position, slice(text, position, position + len), self.content.clone())
            }
            _ => Edit::insert(position, self.content.clone()),
        }
    }
}

impl Arbitrary for EditSeed {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (any::<u8>(), 0usize..64, 0usize..64, content())
            .prop_map(|(kind, at, len, content)| EditSeed {
                kind,
                at,
                len,
                content,
            })
            .boxed()
    }
}

/// Up to `max` edit seeds.
pub fn edit_seeds(max: usize) -> impl Strategy<Value = Vec<EditSeed>> {
    prop::collection::vec(any::<EditSeed>(), 0..=max)
}
