//! Vitrine Server
//!
//! The storefront assistant backend: per-session actors with timer-driven
//! archive sync, the retrieval-augmented answer pipeline, and the tool
//! executor, wired to SQLite storage and HTTP collaborators in production
//! and to deterministic simulations in tests.

pub mod analytics;
pub mod http;
pub mod inference;
pub mod knowledge;
pub mod models;
pub mod pipeline;
pub mod session;
pub mod sim;
pub mod storage;
pub mod tools;
pub mod vector;

pub use models::{ArchiveRecord, Message, MessageRole};
pub use pipeline::{Answer, AnswerPipeline, AnswerRequest, AnswerSource};
pub use session::{SessionArena, SessionStats, TurnOutcome};
