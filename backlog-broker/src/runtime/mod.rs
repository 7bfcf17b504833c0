//! Runtime integration layer.
//!
//! Isolates task spawning and cancellation so the client receive loop and the
//! relay accept loop share one shutdown discipline.

pub(crate) mod loop_runtime;
