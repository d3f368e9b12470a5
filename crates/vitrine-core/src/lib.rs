//! Vitrine Core
//!
//! Core types, errors, and constants for the Vitrine storefront assistant
//! backend.
//!
//! # Overview
//!
//! Vitrine answers shopper questions over chat. Each visitor session is owned
//! by a single-threaded session actor backed by a fast local buffer that is
//! periodically flushed to a durable archive; user turns are answered by a
//! retrieval-augmented pipeline with one tool-calling round trip.
//!
//! # TigerStyle
//!
//! This crate follows [TigerStyle](https://github.com/tigerbeetle/tigerbeetle/blob/main/docs/TIGER_STYLE.md)
//! engineering principles:
//! - Safety > Performance > Developer Experience
//! - Explicit limits with big-endian naming (e.g., `ARCHIVE_BATCH_COUNT_MAX`)
//! - Assertions on preconditions
//! - No recursion (bounded iteration only)

pub mod config;
pub mod constants;
pub mod error;
pub mod http;
pub mod io;

pub use config::{PipelineConfig, SessionConfig, StorageConfig, VitrineConfig};
pub use constants::*;
pub use error::{Error, Result};
pub use http::{HttpClient, HttpError, HttpMethod, HttpRequest, HttpResponse, HttpResult};
pub use io::{IoContext, RngProvider, StdRngProvider, TimeProvider, WallClockTime};
