//! Structured logging vocabulary.
//!
//! Library code emits `tracing` events with an `event` name from [`events`]
//! and field values rendered through [`fields`]. It never installs a global
//! subscriber.

pub mod events;
pub mod fields;
