//! # tandem-server — Relay for tandem editing sessions
//!
//! The relay owns connection bookkeeping and fan-out, nothing else: it
//! mints site ids, bootstraps joiners from an existing peer, and routes
//! frames. It holds no document replica of its own.
//!
//! ```text
//! Client A ──┐                        ┌── writer task ── Client A
//!             ├── reader tasks ──┬────┤
//! Client B ──┘                   │    └── writer task ── Client B
//!                                ▼
//!                   ┌─────────────────────────┐
//!                   │ general dispatch (join, │
//!                   │ operation fan-out)      │
//!                   ├─────────────────────────┤
//!                   │ sync dispatch (docSync, │
//!                   │ users broadcasts)       │
//!                   └─────────────────────────┘
//! ```
//!
//! Two dispatch queues keep a slow snapshot forward from head-of-line
//! blocking operation fan-out.

pub mod registry;
pub mod relay;

pub use registry::{ClientHandle, Registry};
pub use relay::{Relay, RelayConfig};
