//! # tandem-client — Terminal client for tandem sessions
//!
//! Two producers feed one consumer: terminal key events and inbound wire
//! messages are merged by the [`engine`], which is the sole owner of the
//! local replica. The [`editor`] is a pure view over the visible text; it
//! never mutates the replica itself.
//!
//! ```text
//! key events ──┐                      ┌──► outbound operations
//!              ├──► Engine ── replica ┤
//! wire frames ─┘        │             └──► snapshot save/load
//!                       ▼
//!                 Editor (cursor, viewport, status bar)
//! ```

pub mod editor;
pub mod engine;
pub mod logging;
