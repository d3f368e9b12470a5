//! Configuration for Vitrine
//!
//! TigerStyle: Explicit defaults, validation, reasonable limits.

use crate::constants::*;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Main configuration for Vitrine
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VitrineConfig {
    /// Session actor and archive sync configuration
    #[serde(default)]
    pub session: SessionConfig,

    /// Answer pipeline configuration
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Storage configuration
    #[serde(default)]
    pub storage: StorageConfig,
}

impl VitrineConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.session.validate()?;
        self.pipeline.validate()?;
        self.storage.validate()?;
        Ok(())
    }
}

/// Session actor and archive sync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Delay between first unsynced append and flush (milliseconds)
    #[serde(default = "default_flush_delay_ms")]
    pub flush_delay_ms: u64,

    /// Delay before retrying a failed flush (milliseconds)
    #[serde(default = "default_flush_retry_delay_ms")]
    pub flush_retry_delay_ms: u64,

    /// Maximum unsynced messages marked synced per flush
    #[serde(default = "default_archive_batch_count_max")]
    pub archive_batch_count_max: usize,

    /// Messages kept in the hot buffer after a trim
    #[serde(default = "default_hot_context_messages_count")]
    pub hot_context_messages_count: usize,

    /// Maximum mailbox depth per session
    #[serde(default = "default_mailbox_depth_max")]
    pub mailbox_depth_max: usize,
}

fn default_flush_delay_ms() -> u64 {
    FLUSH_DELAY_MS
}

fn default_flush_retry_delay_ms() -> u64 {
    FLUSH_RETRY_DELAY_MS
}

fn default_archive_batch_count_max() -> usize {
    ARCHIVE_BATCH_COUNT_MAX
}

fn default_hot_context_messages_count() -> usize {
    HOT_CONTEXT_MESSAGES_COUNT
}

fn default_mailbox_depth_max() -> usize {
    MAILBOX_DEPTH_MAX
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            flush_delay_ms: default_flush_delay_ms(),
            flush_retry_delay_ms: default_flush_retry_delay_ms(),
            archive_batch_count_max: default_archive_batch_count_max(),
            hot_context_messages_count: default_hot_context_messages_count(),
            mailbox_depth_max: default_mailbox_depth_max(),
        }
    }
}

impl SessionConfig {
    fn validate(&self) -> Result<()> {
        if self.archive_batch_count_max == 0 {
            return Err(Error::InvalidConfiguration {
                field: "session.archive_batch_count_max".into(),
                reason: "must be positive".into(),
            });
        }

        if self.hot_context_messages_count == 0 {
            return Err(Error::InvalidConfiguration {
                field: "session.hot_context_messages_count".into(),
                reason: "must be positive".into(),
            });
        }

        if self.flush_retry_delay_ms < self.flush_delay_ms {
            return Err(Error::InvalidConfiguration {
                field: "session.flush_retry_delay_ms".into(),
                reason: "must not be shorter than flush_delay_ms".into(),
            });
        }

        if self.mailbox_depth_max == 0 || self.mailbox_depth_max > MAILBOX_DEPTH_MAX {
            return Err(Error::InvalidConfiguration {
                field: "session.mailbox_depth_max".into(),
                reason: format!("must be in 1..={}", MAILBOX_DEPTH_MAX),
            });
        }

        Ok(())
    }
}

/// Answer pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Inference gateway base URL (OpenAI-compatible)
    #[serde(default = "default_inference_url")]
    pub inference_url: String,

    /// Inference gateway API key
    #[serde(default)]
    pub inference_api_key: Option<String>,

    /// Chat model name
    #[serde(default = "default_chat_model")]
    pub chat_model: String,

    /// Vision model name (image description)
    #[serde(default = "default_vision_model")]
    pub vision_model: String,

    /// Embedding model name
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Vector index query endpoint
    #[serde(default)]
    pub vector_url: Option<String>,

    /// Knowledge proxy endpoint (JSON-RPC)
    #[serde(default)]
    pub knowledge_url: Option<String>,

    /// Knowledge proxy API key
    #[serde(default)]
    pub knowledge_api_key: Option<String>,

    /// Analytics service base URL
    #[serde(default)]
    pub analytics_url: Option<String>,

    /// Similarity matches requested per query
    #[serde(default = "default_vector_top_k")]
    pub vector_top_k: usize,

    /// Maximum tokens per completion
    #[serde(default = "default_completion_tokens_max")]
    pub completion_tokens_max: u32,
}

fn default_inference_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_chat_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_vision_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_vector_top_k() -> usize {
    VECTOR_SEARCH_TOP_K
}

fn default_completion_tokens_max() -> u32 {
    COMPLETION_TOKENS_COUNT_MAX
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            inference_url: default_inference_url(),
            inference_api_key: None,
            chat_model: default_chat_model(),
            vision_model: default_vision_model(),
            embedding_model: default_embedding_model(),
            vector_url: None,
            knowledge_url: None,
            knowledge_api_key: None,
            analytics_url: None,
            vector_top_k: default_vector_top_k(),
            completion_tokens_max: default_completion_tokens_max(),
        }
    }
}

impl PipelineConfig {
    fn validate(&self) -> Result<()> {
        if self.inference_url.is_empty() {
            return Err(Error::InvalidConfiguration {
                field: "pipeline.inference_url".into(),
                reason: "must not be empty".into(),
            });
        }

        if self.vector_top_k == 0 {
            return Err(Error::InvalidConfiguration {
                field: "pipeline.vector_top_k".into(),
                reason: "must be positive".into(),
            });
        }

        if self.knowledge_url.is_some() && self.knowledge_api_key.is_none() {
            return Err(Error::InvalidConfiguration {
                field: "pipeline.knowledge_api_key".into(),
                reason: "required when knowledge_url is set".into(),
            });
        }

        Ok(())
    }
}

/// Storage backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database path; ":memory:" for an ephemeral store
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

fn default_database_path() -> String {
    "vitrine.db".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

impl StorageConfig {
    fn validate(&self) -> Result<()> {
        if self.database_path.is_empty() {
            return Err(Error::InvalidConfiguration {
                field: "storage.database_path".into(),
                reason: "must not be empty".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = VitrineConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_retry_delay_must_cover_flush_delay() {
        let mut config = VitrineConfig::default();
        config.session.flush_delay_ms = 10_000;
        config.session.flush_retry_delay_ms = 5_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_knowledge_url_requires_api_key() {
        let mut config = VitrineConfig::default();
        config.pipeline.knowledge_url = Some("https://knowledge.example.com".into());
        config.pipeline.knowledge_api_key = None;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_batch_rejected() {
        let mut config = VitrineConfig::default();
        config.session.archive_batch_count_max = 0;
        assert!(config.validate().is_err());
    }
}
