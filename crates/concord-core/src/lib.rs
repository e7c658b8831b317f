//! # Concord Core
//!
//! Pure primitives for Concord: the operation model and the operational
//! transform engine for collaboratively edited linear text.
//!
//! This crate contains no I/O, no locking, no networking. It is pure
//! computation over text and edit operations.
//!
//! ## Key Types
//!
//! - [`Operation`] - An edit stamped with its origin (client id + logical timestamp)
//! - [`Edit`] - The closed set of edit kinds: insert, delete, modify
//! - [`ClientId`] - Totally ordered client identity, used for tie-breaking
//! - [`DocumentId`] - Identifier of a collaboratively edited document
//!
//! ## Engine
//!
//! - [`transform`] - Rebase two concurrent operations past each other
//! - [`apply`] - Apply an operation to a text
//! - [`diff`] - Turn an old/new text pair into a single edit
//!
//! All positions and lengths count `char`s, not bytes.
//!
//! ```rust
//! use concord_core::{apply, transform, ClientId, Edit, Operation};
//!
//! let base = "AC";
//! let a = Operation::stamped(ClientId(1), 1, Edit::insert(1, "B"));
//! let b = Operation::stamped(ClientId(2), 1, Edit::insert(1, "X"));
//!
//! let (a2, b2) = transform(&a, &b);
//! let left = apply(&apply(base, &a), &b2);
//! let right = apply(&apply(base, &b), &a2);
//! assert_eq!(left, "ABXC");
//! assert_eq!(left, right);
//! ```

pub mod apply;
pub mod diff;
pub mod error;
pub mod operation;
pub mod text;
pub mod transform;
pub mod types;
pub mod validation;

pub use apply::{apply, apply_all};
pub use diff::diff;
pub use error::{Result, ValidationError};
pub use operation::{is_no_op, Delete, Edit, EditKind, Insert, Modify, Operation, Origin};
pub use transform::{transform, transform_against};
pub use types::{ClientId, DocumentId, Timestamp};
pub use validation::validate_against;
