//! Validation of edits against the text they target.
//!
//! The transform engine trusts its inputs. Anything that builds an edit from
//! outside data (user input, a peer's message) checks it here first.

use crate::error::{Result, ValidationError};
use crate::operation::Edit;
use crate::text::{char_len, slice};

/// Check that `edit` is well-formed relative to `text`.
///
/// Rules:
/// 1. The affected range lies inside the text
/// 2. A modify's `old_content` matches the text at its position
/// 3. A delete that carries its removed text matches the text at its position
pub fn validate_against(text: &str, edit: &Edit) -> Result<()> {
    let len = char_len(text);
    let position = edit.position();

    if position > len {
        return Err(ValidationError::PositionOutOfBounds { position, len });
    }

    let end = match position.checked_add(edit.range_len()) {
        Some(end) if end <= len => end,
        Some(end) => return Err(ValidationError::RangeOutOfBounds { position, end, len }),
        None => {
            return Err(ValidationError::RangeOutOfBounds {
                position,
                end: usize::MAX,
                len,
            })
        }
    };

    match edit {
        Edit::Insert(_) => {}
        Edit::Delete(del) => {
            if del.removed_known() {
                let found = slice(text, position, end);
                if found != del.removed {
                    return Err(ValidationError::RemovedMismatch {
                        position,
                        claimed: del.removed.clone(),
                        found: found.to_owned(),
                    });
                }
            }
        }
        Edit::Modify(modify) => {
            let found = slice(text, position, end);
            if found != modify.old_content {
                return Err(ValidationError::ContentMismatch {
                    position,
                    expected: modify.old_content.clone(),
                    found: found.to_owned(),
                });
            }
        }
    }

    Ok(())
}
