//! Applying operations to text.

use crate::operation::{Edit, Operation};
use crate::text::{char_len, splice};

/// Apply `op` to `text`, returning the edited text.
///
/// Positions are char indices. The caller guarantees the operation is valid
/// for `text` (see [`crate::validate_against`]); out-of-range positions are
/// clamped to the end of the text rather than panicking. No-ops return the
/// text unchanged.
pub fn apply(text: &str, op: &Operation) -> String {
    apply_edit(text, &op.edit)
}

/// Apply a bare edit to `text`.
pub fn apply_edit(text: &str, edit: &Edit) -> String {
    if edit.is_no_op() {
        return text.to_owned();
    }
    match edit {
        Edit::Insert(ins) => splice(text, ins.position, 0, &ins.content),
        Edit::Delete(del) => splice(text, del.position, del.length, ""),
        Edit::Modify(modify) => splice(
            text,
            modify.position,
            char_len(&modify.old_content),
            &modify.new_content,
        ),
    }
}

/// Apply a sequence of operations in order.
pub fn apply_all<'a>(text: &str, ops: impl IntoIterator<Item = &'a Operation>) -> String {
    ops.into_iter()
        .fold(text.to_owned(), |acc, op| apply(&acc, op))
}
