//! # Concord Testkit
//!
//! Testing utilities for Concord.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Golden vectors**: Concurrent operation pairs with the text both sides must converge to
//! - **Generators**: Proptest strategies for valid edits and concurrent pairs
//! - **Fixtures**: Replicas with hand-delivered messages, for choosing interleavings
//!
//! ## Golden Vectors
//!
//! ```rust
//! use concord_testkit::vectors::{all_vectors, run_vector};
//!
//! for vector in all_vectors() {
//!     let (left, right) = run_vector(&vector);
//!     assert_eq!(left, right, "{}", vector.name);
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use concord_core::{apply, transform};
//! use concord_testkit::generators::ConcurrentPair;
//!
//! proptest! {
//!     #[test]
//!     fn converges(pair: ConcurrentPair) {
//!         let (a2, b2) = transform(&pair.a, &pair.b);
//!         prop_assert_eq!(
//!             apply(&apply(&pair.base, &pair.a), &b2),
//!             apply(&apply(&pair.base, &pair.b), &a2),
//!         );
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust
//! use concord_testkit::fixtures::TestFixture;
//!
//! let mut fixture = TestFixture::new("AC");
//! fixture.alice.type_text("ABC");
//! fixture.bob.type_text("AXC");
//! fixture.exchange();
//! assert_eq!(fixture.alice.text, "ABXC");
//! assert!(fixture.converged());
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{replicas, Replica, TestFixture};
pub use generators::{ConcurrentPair, EditSeed};
pub use vectors::{all_vectors, run_vector, verify_all_vectors, TransformVector};
