//! Session layer: per-visitor actors and the arena that owns them
//!
//! One logical actor per session key. All operations, including timer-driven
//! flushes, pass through the actor's mailbox and run strictly in order.

pub mod actor;
pub mod arena;

pub use actor::{SessionActor, SessionOp, SessionStats, TurnOutcome};
pub use arena::SessionArena;
