//! Sync protocol message types.
//!
//! Messages travel as JSON objects tagged by `type`, with camelCase fields:
//!
//! ```text
//! {"type":"operation","documentId":"chan-1","operation":{...}}
//! {"type":"ack","documentId":"chan-1","timestamp":1}
//! {"type":"syncRequest","documentId":"chan-1"}
//! {"type":"snapshot","documentId":"chan-1","text":"..."}
//! ```

use serde::{Deserialize, Serialize};

use concord_core::{ClientId, Delete, DocumentId, Edit, EditKind, Operation, Timestamp};

use crate::error::{Result, SyncError};

/// Sync protocol messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SyncMessage {
    /// An operation submitted by a client, relayed to the others.
    #[serde(rename_all = "camelCase")]
    Operation {
        document_id: DocumentId,
        operation: WireOperation,
    },

    /// The server has accepted the sender's operation with this timestamp.
    #[serde(rename_all = "camelCase")]
    Ack {
        document_id: DocumentId,
        timestamp: Timestamp,
    },

    /// A client asks for the authoritative document.
    #[serde(rename_all = "camelCase")]
    SyncRequest { document_id: DocumentId },

    /// The authoritative document, in answer to a sync request.
    #[serde(rename_all = "camelCase")]
    Snapshot { document_id: DocumentId, text: String },
}

impl SyncMessage {
    /// Wrap an operation for `document_id`.
    pub fn operation(document_id: &DocumentId, op: &Operation) -> Self {
        SyncMessage::Operation {
            document_id: document_id.clone(),
            operation: WireOperation::from(op),
        }
    }

    /// The document this message concerns.
    pub fn document_id(&self) -> &DocumentId {
        match self {
            SyncMessage::Operation { document_id, .. }
            | SyncMessage::Ack { document_id, .. }
            | SyncMessage::SyncRequest { document_id }
            | SyncMessage::Snapshot { document_id, .. } => document_id,
        }
    }

    /// The `type` tag as it appears on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            SyncMessage::Operation { .. } => "operation",
            SyncMessage::Ack { .. } => "ack",
            SyncMessage::SyncRequest { .. } => "syncRequest",
            SyncMessage::Snapshot { .. } => "snapshot",
        }
    }

    /// Encode as JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode from JSON.
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| SyncError::InvalidMessage(e.to_string()))
    }
}

/// An operation as it appears on the wire.
///
/// Which optional fields are set depends on `type`: an insert carries
/// `content`; a delete carries `length` and optionally its removed text in
/// `content`; a modify carries `oldContent` and `newContent`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireOperation {
    #[serde(rename = "type")]
    pub kind: EditKind,
    pub position: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_content: Option<String>,
    pub client_id: ClientId,
    pub timestamp: Timestamp,
}

impl From<&Operation> for WireOperation {
    fn from(op: &Operation) -> Self {
        let mut wire = WireOperation {
            kind: op.kind(),
            position: op.edit.position(),
            content: None,
            length: None,
            old_content: None,
            new_content: None,
            client_id: op.client_id(),
            timestamp: op.timestamp(),
        };
        match &op.edit {
            Edit::Insert(ins) => wire.content = Some(ins.content.clone()),
            Edit::Delete(del) => {
                wire.length = Some(del.length);
                if del.removed_known() {
                    wire.content = Some(del.removed.clone());
                }
            }
            Edit::Modify(modify) => {
                wire.old_content = Some(modify.old_content.clone());
                wire.new_content = Some(modify.new_content.clone());
            }
        }
        wire
    }
}

impl TryFrom<WireOperation> for Operation {
    type Error = SyncError;

    fn try_from(wire: WireOperation) -> Result<Self> {
        let edit = match wire.kind {
            EditKind::Insert => Edit::insert(wire.position, required(wire.content, "content")?),
            EditKind::Delete => {
                let length = required(wire.length, "length")?;
                if wire.position.checked_add(length).is_none() {
                    return Err(SyncError::InvalidMessage(format!(
                        "delete range {}+{length} overflows",
                        wire.position
                    )));
                }
                Edit::Delete(Delete {
                    position: wire.position,
                    length,
                    removed: wire.content.unwrap_or_default(),
                })
            }
            EditKind::Modify => Edit::modify(
                wire.position,
                required(wire.old_content, "oldContent")?,
                required(wire.new_content, "newContent")?,
            ),
        };
        Ok(Operation::stamped(wire.client_id, wire.timestamp, edit))
    }
}

fn required<T>(field: Option<T>, name: &str) -> Result<T> {
    field.ok_or_else(|| SyncError::InvalidMessage(format!("operation missing {name}")))
}
