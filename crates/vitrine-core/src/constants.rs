//! TigerStyle constants for Vitrine
//!
//! All limits are explicit, use big-endian naming (most significant first),
//! and include units in the name.

// =============================================================================
// Session Limits
// =============================================================================

/// Maximum length of a session ID in bytes
pub const SESSION_ID_LENGTH_BYTES_MAX: usize = 128;

/// Maximum size of a message content in bytes (64 KB)
pub const MESSAGE_CONTENT_SIZE_BYTES_MAX: usize = 64 * 1024;

/// Maximum size of an inline image payload in bytes, base64 text (4 MB)
pub const IMAGE_PAYLOAD_SIZE_BYTES_MAX: usize = 4 * 1024 * 1024;

/// Maximum depth of a session mailbox
pub const MAILBOX_DEPTH_MAX: usize = 1024;

/// Maximum number of concurrently resident sessions
pub const SESSIONS_ACTIVE_COUNT_MAX: usize = 100_000;

// =============================================================================
// Archive Sync Limits
// =============================================================================

/// Delay between the first unsynced append and the flush that archives it (10 sec)
pub const FLUSH_DELAY_MS: u64 = 10 * 1000;

/// Delay before retrying a flush whose archive write failed (30 sec)
pub const FLUSH_RETRY_DELAY_MS: u64 = 30 * 1000;

/// Maximum number of unsynced messages marked synced per flush
pub const ARCHIVE_BATCH_COUNT_MAX: usize = 50;

/// Number of most recent messages kept in the hot buffer after a trim
pub const HOT_CONTEXT_MESSAGES_COUNT: usize = 20;

// =============================================================================
// Pipeline Limits
// =============================================================================

/// Number of similarity matches requested per vector search
pub const VECTOR_SEARCH_TOP_K: usize = 5;

/// Maximum number of tool-calling round trips per answered turn
pub const TOOL_ROUND_TRIPS_COUNT_MAX: usize = 1;

/// Maximum tokens requested per LLM completion
pub const COMPLETION_TOKENS_COUNT_MAX: u32 = 1024;

/// Dimensions of the embedding vectors produced by the embedding model
pub const EMBEDDING_DIMENSIONS_COUNT: usize = 384;

/// Default number of analytics events fetched by the customer-context tool
pub const CUSTOMER_CONTEXT_EVENTS_COUNT_DEFAULT: u32 = 10;

// Compile-time assertions for constant validity
const _: () = {
    assert!(SESSION_ID_LENGTH_BYTES_MAX >= 36); // must fit a UUID
    assert!(FLUSH_RETRY_DELAY_MS >= FLUSH_DELAY_MS);
    assert!(ARCHIVE_BATCH_COUNT_MAX >= HOT_CONTEXT_MESSAGES_COUNT);
    assert!(HOT_CONTEXT_MESSAGES_COUNT > 0);
    assert!(TOOL_ROUND_TRIPS_COUNT_MAX >= 1);
    assert!(VECTOR_SEARCH_TOP_K > 0);
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flush_delays_ordered() {
        // A failed flush must never retry more eagerly than a fresh one fires
        assert!(FLUSH_RETRY_DELAY_MS >= FLUSH_DELAY_MS);
    }

    #[test]
    fn test_limits_have_units_in_names() {
        // This test documents the naming convention
        // All byte limits end in _BYTES_
        // All time limits end in _MS
        // All count limits end in _COUNT_
        let _: usize = SESSION_ID_LENGTH_BYTES_MAX;
        let _: u64 = FLUSH_DELAY_MS;
        let _: usize = ARCHIVE_BATCH_COUNT_MAX;
    }
}
