//! Operation: an edit plus the metadata identifying who made it and when.
//!
//! Operations are immutable values. Transforming an operation produces a new
//! one with adjusted fields and the same [`Origin`].

use serde::{Deserialize, Serialize};

use crate::text::char_len;
use crate::types::{ClientId, Timestamp};

/// Who produced an operation, and at which point of their logical clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Origin {
    /// The originating client.
    pub client_id: ClientId,
    /// Logical timestamp assigned by the originating client at submission.
    pub timestamp: Timestamp,
}

/// Insert `content` before the char at `position`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Insert {
    pub position: usize,
    pub content: String,
}

/// Remove `length` chars starting at `position`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delete {
    pub position: usize,
    pub length: usize,
    /// The text removed, retained for undo. Empty when the sender did not
    /// include it; see [`Delete::removed_known`].
    pub removed: String,
}

impl Delete {
    /// Whether `removed` actually describes the deleted range.
    pub fn removed_known(&self) -> bool {
        char_len(&self.removed) == self.length
    }
}

/// Replace `old_content` at `position` with `new_content`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Modify {
    pub position: usize,
    pub old_content: String,
    pub new_content: String,
}

/// Discriminant of an [`Edit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditKind {
    Insert,
    Delete,
    Modify,
}

impl EditKind {
    /// Wire name of the kind.
    pub const fn as_str(self) -> &'static str {
        match self {
            EditKind::Insert => "insert",
            EditKind::Delete => "delete",
            EditKind::Modify => "modify",
        }
    }
}

/// The closed set of text edits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Edit {
    Insert(Insert),
    Delete(Delete),
    Modify(Modify),
}

impl Edit {
    /// Insert `content` at `position`.
    pub fn insert(position: usize, content: impl Into<String>) -> Self {
        Edit::Insert(Insert {
            position,
            content: content.into(),
        })
    }

    /// Delete the text `removed`, which starts at `position`.
    pub fn delete(position: usize, removed: impl Into<String>) -> Self {
        let removed = removed.into();
        Edit::Delete(Delete {
            position,
            length: char_len(&removed),
            removed,
        })
    }

    /// Delete `length` chars at `position` without knowing their content.
    pub fn delete_len(position: usize, length: usize) -> Self {
        Edit::Delete(Delete {
            position,
            length,
            removed: String::new(),
        })
    }

    /// Replace `old_content` at `position` with `new_content`.
    pub fn modify(
        position: usize,
        old_content: impl Into<String>,
        new_content: impl Into<String>,
    ) -> Self {
        Edit::Modify(Modify {
            position,
            old_content: old_content.into(),
            new_content: new_content.into(),
        })
    }

    pub fn kind(&self) -> EditKind {
        match self {
            Edit::Insert(_) => EditKind::Insert,
            Edit::Delete(_) => EditKind::Delete,
            Edit::Modify(_) => EditKind::Modify,
        }
    }

    /// Start of the affected range.
    pub fn position(&self) -> usize {
        match self {
            Edit::Insert(ins) => ins.position,
            Edit::Delete(del) => del.position,
            Edit::Modify(modify) => modify.position,
        }
    }

    /// Number of chars of the original text this edit covers.
    pub fn range_len(&self) -> usize {
        match self {
            Edit::Insert(_) => 0,
            Edit::Delete(del) => del.length,
            Edit::Modify(modify) => char_len(&modify.old_content),
        }
    }

    /// Number of chars this edit leaves in place of its range.
    pub fn inserted_len(&self) -> usize {
        match self {
            Edit::Insert(ins) => char_len(&ins.content),
            Edit::Delete(_) => 0,
            Edit::Modify(modify) => char_len(&modify.new_content),
        }
    }

    /// End of the affected range (exclusive), saturating at `usize::MAX`.
    pub fn end(&self) -> usize {
        self.position().saturating_add(self.range_len())
    }

    /// True when applying this edit cannot change any text.
    pub fn is_no_op(&self) -> bool {
        match self {
            Edit::Insert(ins) => ins.content.is_empty(),
            Edit::Delete(del) => del.length == 0,
            Edit::Modify(modify) => modify.old_content == modify.new_content,
        }
    }

    /// Same edit moved to `position`.
    pub fn with_position(&self, position: usize) -> Self {
        let mut moved = self.clone();
        match &mut moved {
            Edit::Insert(ins) => ins.position = position,
            Edit::Delete(del) => del.position = position,
            Edit::Modify(modify) => modify.position = position,
        }
        moved
    }
}

/// A stamped edit: the unit exchanged between replicas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub origin: Origin,
    pub edit: Edit,
}

impl Operation {
    pub fn new(origin: Origin, edit: Edit) -> Self {
        Self { origin, edit }
    }

    /// Build an operation with explicit origin fields.
    pub fn stamped(client_id: ClientId, timestamp: Timestamp, edit: Edit) -> Self {
        Self {
            origin: Origin {
                client_id,
                timestamp,
            },
            edit,
        }
    }

    pub fn client_id(&self) -> ClientId {
        self.origin.client_id
    }

    pub fn timestamp(&self) -> Timestamp {
        self.origin.timestamp
    }

    pub fn kind(&self) -> EditKind {
        self.edit.kind()
    }

    pub fn is_no_op(&self) -> bool {
        self.edit.is_no_op()
    }

    /// A new operation with the same origin carrying `edit`.
    pub fn with_edit(&self, edit: Edit) -> Self {
        Self {
            origin: self.origin,
            edit,
        }
    }
}

/// Free-function form of [`Operation::is_no_op`].
pub fn is_no_op(op: &Operation) -> bool {
    op.is_no_op()
}
