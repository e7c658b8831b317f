//! The pairwise transform engine.
//!
//! Given two operations `a` and `b` derived from the same base text,
//! [`transform`] returns `(a', b')` such that
//!
//! ```text
//! apply(apply(T, a), b') == apply(apply(T, b), a')
//! ```
//!
//! Every operation covers a half-open range `[start, end)` of the base text
//! (empty for an insert). Disjoint ranges just shift past each other. Two
//! empty ranges at the same point are a tie, broken by client id. Overlapping
//! ranges are resolved per pair:
//!
//! | pair | overlap resolution |
//! |------|--------------------|
//! | insert / delete | insert clamps to the delete start and survives |
//! | insert / modify | insert clamps to the modify start, modify absorbs it |
//! | delete / delete | the shared range is deleted once |
//! | delete / modify | delete wins, the modify's range is gone |
//! | modify / modify | lower client id wins, the other becomes a no-op |
//!
//! The engine performs no bounds checking: inputs must be valid against
//! their base (see [`crate::validate_against`]). Range arithmetic saturates,
//! so an out-of-range input gives a meaningless result, never a panic.

use crate::operation::{Delete, Edit, Insert, Modify, Operation};
use crate::text::{char_len, slice, slice_from};

/// Transform two concurrent operations against each other.
pub fn transform(a: &Operation, b: &Operation) -> (Operation, Operation) {
    if a.is_no_op() || b.is_no_op() {
        return (a.clone(), b.clone());
    }

    match (&a.edit, &b.edit) {
        (Edit::Insert(x), Edit::Insert(y)) => insert_insert(a, x, b, y),
        (Edit::Insert(x), Edit::Delete(y)) => insert_delete(a, x, b, y),
        (Edit::Insert(x), Edit::Modify(y)) => insert_modify(a, x, b, y),
        (Edit::Delete(x), Edit::Insert(y)) => swap(insert_delete(b, y, a, x)),
        (Edit::Delete(x), Edit::Delete(y)) => delete_delete(a, x, b, y),
        (Edit::Delete(x), Edit::Modify(y)) => delete_modify(a, x, b, y),
        (Edit::Modify(x), Edit::Insert(y)) => swap(insert_modify(b, y, a, x)),
        (Edit::Modify(x), Edit::Delete(y)) => swap(delete_modify(b, y, a, x)),
        (Edit::Modify(x), Edit::Modify(y)) => modify_modify(a, x, b, y),
    }
}

/// Rebase `op` past each of `applied` in order.
///
/// Each element of `applied` must be concurrent with `op` as rebased so far,
/// i.e. the sequence was applied one after another on `op`'s base.
pub fn transform_against<'a>(
    op: &Operation,
    applied: impl IntoIterator<Item = &'a Operation>,
) -> Operation {
    applied
        .into_iter()
        .fold(op.clone(), |current, other| transform(other, &current).1)
}

fn swap((a, b): (Operation, Operation)) -> (Operation, Operation) {
    (b, a)
}

/// `op` moved past an `earlier` edit that sits entirely before it.
fn shifted_past(op: &Operation, earlier: &Edit) -> Operation {
    let position = op
        .edit
        .position()
        .saturating_add(earlier.inserted_len())
        .saturating_sub(earlier.range_len());
    op.with_edit(op.edit.with_position(position))
}

/// `a` happens first: it stays put, `b` shifts.
fn a_first(a: &Operation, b: &Operation) -> (Operation, Operation) {
    (a.clone(), shifted_past(b, &a.edit))
}

/// `b` happens first: it stays put, `a` shifts.
fn b_first(a: &Operation, b: &Operation) -> (Operation, Operation) {
    (shifted_past(a, &b.edit), b.clone())
}

fn insert_insert(a: &Operation, x: &Insert, b: &Operation, y: &Insert) -> (Operation, Operation) {
    let a_goes_first = x.position < y.position
        || (x.position == y.position && a.client_id() <= b.client_id());

    if a_goes_first {
        a_first(a, b)
    } else {
        b_first(a, b)
    }
}

fn insert_delete(a: &Operation, ins: &Insert, b: &Operation, del: &Delete) -> (Operation, Operation) {
    let del_end = del.position.saturating_add(del.length);

    if ins.position <= del.position {
        return a_first(a, b);
    }
    if ins.position >= del_end {
        return b_first(a, b);
    }

    // Insert lands inside the deleted range: it moves to the range start.
    let offset = ins.position - del.position;
    if del.removed_known() {
        // The delete must now skip the inserted text in the middle of its
        // range, which a single delete cannot express.
        let old = format!(
            "{}{}{}",
            slice(&del.removed, 0, offset),
            ins.content,
            slice_from(&del.removed, offset)
        );
        let ins2 = a.with_edit(Edit::insert(del.position, ins.content.clone()));
        let del2 = b.with_edit(Edit::modify(del.position, old, ins.content.clone()));
        (ins2, del2)
    } else {
        // Without the removed text the delete can only swallow the insert.
        let ins2 = a.with_edit(Edit::insert(del.position, ""));
        let del2 = b.with_edit(Edit::delete_len(
            del.position,
            del.length.saturating_add(char_len(&ins.content)),
        ));
        (ins2, del2)
    }
}

fn insert_modify(a: &Operation, ins: &Insert, b: &Operation, m: &Modify) -> (Operation, Operation) {
    let m_end = m.position.saturating_add(char_len(&m.old_content));

    if ins.position <= m.position {
        return a_first(a, b);
    }
    if ins.position >= m_end {
        return b_first(a, b);
    }

    let offset = ins.position - m.position;
    let old = format!(
        "{}{}{}",
        slice(&m.old_content, 0, offset),
        ins.content,
        slice_from(&m.old_content, offset)
    );
    let new = format!("{}{}", ins.content, m.new_content);

    let ins2 = a.with_edit(Edit::insert(m.position, ins.content.clone()));
    let m2 = b.with_edit(Edit::modify(m.position, old, new));
    (ins2, m2)
}

fn delete_delete(a: &Operation, x: &Delete, b: &Operation, y: &Delete) -> (Operation, Operation) {
    let x_end = x.position.saturating_add(x.length);
    let y_end = y.position.saturating_add(y.length);

    if x_end <= y.position {
        return a_first(a, b);
    }
    if y_end <= x.position {
        return b_first(a, b);
    }

    // Overlap: each side deletes only what the other left behind.
    let start = x.position.min(y.position);
    let lo = x.position.max(y.position);
    let hi = x_end.min(y_end);

    (
        a.with_edit(without_overlap(x, start, lo, hi)),
        b.with_edit(without_overlap(y, start, lo, hi)),
    )
}

/// `del` minus the chars `[lo, hi)`, starting at `start`.
fn without_overlap(del: &Delete, start: usize, lo: usize, hi: usize) -> Edit {
    let length = del.length - (hi - lo);
    if del.removed_known() {
        let removed = format!(
            "{}{}",
            slice(&del.removed, 0, lo - del.position),
            slice_from(&del.removed, hi - del.position)
        );
        Edit::delete(start, removed)
    } else {
        Edit::delete_len(start, length)
    }
}

fn delete_modify(a: &Operation, del: &Delete, b: &Operation, m: &Modify) -> (Operation, Operation) {
    let d0 = del.position;
    let d1 = d0.saturating_add(del.length);
    let m0 = m.position;
    let m1 = m0.saturating_add(char_len(&m.old_content));

    if d1 <= m0 {
        return a_first(a, b);
    }
    if m1 <= d0 {
        return b_first(a, b);
    }

    // Overlap: the delete wins and the whole union disappears.
    let start = d0.min(m0);

    // What is left of the modify's range once the delete ran.
    let left = if m0 < d0 { slice(&m.old_content, 0, d0 - m0) } else { "" };
    let right = if m1 > d1 { slice_from(&m.old_content, d1 - m0) } else { "" };
    let m2 = b.with_edit(Edit::modify(start, format!("{left}{right}"), ""));

    // The delete additionally removes whatever the modify wrote.
    let before = m0.saturating_sub(d0);
    let after = d1.saturating_sub(m1);
    let del2 = if del.removed_known() {
        let head = slice(&del.removed, 0, before);
        let tail = if d1 > m1 { slice_from(&del.removed, m1 - d0) } else { "" };
        Edit::delete(start, format!("{head}{}{tail}", m.new_content))
    } else {
        Edit::delete_len(
            start,
            before
                .saturating_add(char_len(&m.new_content))
                .saturating_add(after),
        )
    };

    (a.with_edit(del2), m2)
}

fn modify_modify(a: &Operation, x: &Modify, b: &Operation, y: &Modify) -> (Operation, Operation) {
    let x_end = x.position.saturating_add(char_len(&x.old_content));
    let y_end = y.position.saturating_add(char_len(&y.old_content));
    let a_wins = a.client_id() <= b.client_id();

    let tie = x_end <= y.position && y_end <= x.position;
    if tie {
        return if a_wins { a_first(a, b) } else { b_first(a, b) };
    }
    if x_end <= y.position {
        return a_first(a, b);
    }
    if y_end <= x.position {
        return b_first(a, b);
    }

    // Overlap: last writer by client id wins, the loser collapses.
    if a_wins {
        let (winner, loser) = overlap_winner(x, y);
        (a.with_edit(winner), b.with_edit(loser))
    } else {
        let (winner, loser) = overlap_winner(y, x);
        (a.with_edit(loser), b.with_edit(winner))
    }
}

/// Resolve overlapping modifies in favour of `w` over `l`.
///
/// Returns `(w', l')`: `w'` rewrites the union of both ranges on top of `l`'s
/// result, `l'` is a no-op on top of `w`'s result.
fn overlap_winner(w: &Modify, l: &Modify) -> (Edit, Edit) {
    let w0 = w.position;
    let w1 = w0.saturating_add(char_len(&w.old_content));
    let l0 = l.position;
    let l1 = l0.saturating_add(char_len(&l.old_content));

    let old_head = if w0 < l0 { slice(&w.old_content, 0, l0 - w0) } else { "" };
    let old_tail = if w1 > l1 { slice_from(&w.old_content, l1 - w0) } else { "" };
    let new_head = if l0 < w0 { slice(&l.old_content, 0, w0 - l0) } else { "" };
    let new_tail = if l1 > w1 { slice_from(&l.old_content, w1 - l0) } else { "" };

    let winner = Edit::modify(
        w0.min(l0),
        format!("{old_head}{}{old_tail}", l.new_content),
        format!("{new_head}{}{new_tail}", w.new_content),
    );
    let loser = Edit::modify(w0, w.new_content.clone(), w.new_content.clone());
    (winner, loser)
}
