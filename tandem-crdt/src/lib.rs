//! # tandem-crdt — Convergent character sequence for tandem
//!
//! Implements a WOOT-style sequence CRDT: every character carries the
//! identifiers of the two neighbors it was intended to sit between, so
//! concurrent inserts and deletes commute without an external total order.
//!
//! ```text
//! local keystroke                     remote operation
//!       │                                   │
//!       ▼                                   ▼
//! Document::insert()              Document::integrate_insert()
//!       │  (mints CharId,                   │  (interval narrowing,
//!       │   records intent)                 │   id tie-breaking)
//!       └───────────┬───────────────────────┘
//!                   ▼
//!          [start] c₁ c₂ … cₙ [end]      (tombstones stay in place)
//! ```
//!
//! ## Modules
//!
//! - [`id`] — character identifiers and their total order
//! - [`woot`] — the document sequence and its operations
//! - [`codec`] — full-document snapshot serialization (wire + on-disk)
//!
//! Reference: Oster et al. — Data Consistency for P2P Collaborative Editing
//! (the WOOT paper), <https://hal.inria.fr/inria-00108523/document>

pub mod codec;
pub mod id;
pub mod woot;

pub use codec::{load, save, SnapshotError};
pub use id::CharId;
pub use woot::{Character, CrdtError, Document};
