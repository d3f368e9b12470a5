//! Vitrine server binary
//!
//! Wires SQLite storage and the HTTP collaborators into a session arena and
//! feeds stdin lines through it as user turns. The HTTP front door stays an
//! external concern; this binary is the backend plus a local console.

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use vitrine_core::{IoContext, VitrineConfig};
use vitrine_server::analytics::HttpAnalyticsClient;
use vitrine_server::http::ReqwestHttpClient;
use vitrine_server::inference::HttpInferenceClient;
use vitrine_server::knowledge::HttpKnowledgeClient;
use vitrine_server::pipeline::AnswerPipeline;
use vitrine_server::session::SessionArena;
use vitrine_server::storage::SqliteStore;
use vitrine_server::tools::{register_builtin_tools, ToolRegistry};
use vitrine_server::vector::HttpVectorIndex;
use vitrine_server::MessageRole;

/// Vitrine server CLI
#[derive(Parser, Debug)]
#[command(name = "vitrine-server")]
#[command(about = "Vitrine storefront assistant backend")]
#[command(version)]
struct Cli {
    /// SQLite database path (":memory:" for ephemeral)
    #[arg(short, long, default_value = "vitrine.db")]
    database: String,

    /// Inference gateway base URL (OpenAI-compatible)
    #[arg(long, env = "VITRINE_INFERENCE_URL")]
    inference_url: Option<String>,

    /// Inference gateway API key
    #[arg(long, env = "VITRINE_INFERENCE_API_KEY", hide_env_values = true)]
    inference_api_key: Option<String>,

    /// Vector index query endpoint
    #[arg(long, env = "VITRINE_VECTOR_URL")]
    vector_url: Option<String>,

    /// Knowledge proxy endpoint (JSON-RPC)
    #[arg(long, env = "VITRINE_KNOWLEDGE_URL")]
    knowledge_url: Option<String>,

    /// Knowledge proxy API key
    #[arg(long, env = "VITRINE_KNOWLEDGE_API_KEY", hide_env_values = true)]
    knowledge_api_key: Option<String>,

    /// Analytics service base URL
    #[arg(long, env = "VITRINE_ANALYTICS_URL")]
    analytics_url: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn into_config(self) -> (String, VitrineConfig) {
        let mut config = VitrineConfig::default();
        config.storage.database_path = self.database.clone();
        if let Some(url) = self.inference_url {
            config.pipeline.inference_url = url;
        }
        config.pipeline.inference_api_key = self.inference_api_key;
        config.pipeline.vector_url = self.vector_url;
        config.pipeline.knowledge_url = self.knowledge_url;
        config.pipeline.knowledge_api_key = self.knowledge_api_key;
        config.pipeline.analytics_url = self.analytics_url;
        (self.database, config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .init();

    let (database, config) = cli.into_config();
    config.validate()?;

    tracing::info!(database = %database, "vitrine server starting");

    let store = Arc::new(SqliteStore::open(&config.storage.database_path).await?);
    let http = Arc::new(ReqwestHttpClient::new());

    let inference = Arc::new(HttpInferenceClient::new(http.clone(), &config.pipeline));
    let vector: Option<Arc<dyn vitrine_server::vector::VectorIndex>> = config
        .pipeline
        .vector_url
        .as_ref()
        .map(|url| {
            Arc::new(HttpVectorIndex::new(http.clone(), url.clone()))
                as Arc<dyn vitrine_server::vector::VectorIndex>
        });
    let knowledge = match (&config.pipeline.knowledge_url, &config.pipeline.knowledge_api_key) {
        (Some(url), Some(key)) => Some(Arc::new(HttpKnowledgeClient::new(
            http.clone(),
            url.clone(),
            key.clone(),
        )) as Arc<dyn vitrine_server::knowledge::KnowledgeClient>),
        _ => None,
    };
    let analytics: Option<Arc<dyn vitrine_server::analytics::AnalyticsClient>> = config
        .pipeline
        .analytics_url
        .as_ref()
        .map(|url| {
            Arc::new(HttpAnalyticsClient::new(http.clone(), url.clone()))
                as Arc<dyn vitrine_server::analytics::AnalyticsClient>
        });

    let tools = Arc::new(ToolRegistry::new());
    register_builtin_tools(&tools, analytics, knowledge.clone()).await;
    tracing::info!(tools = ?tools.list().await, "tool registry ready");

    let pipeline = Arc::new(AnswerPipeline::new(
        inference,
        vector,
        knowledge,
        store.clone(),
        tools,
        config.pipeline.clone(),
    ));

    let io = IoContext::production();
    let arena = Arc::new(SessionArena::new(
        store.clone(),
        store,
        pipeline,
        io.clone(),
        config.session.clone(),
    ));

    // Local console: one session per process run
    let session_id = io.gen_uuid();
    tracing::info!(session_id = %session_id, "console session ready, type a question");

    use tokio::io::{AsyncBufReadExt, BufReader};
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }
        if line == "/quit" {
            break;
        }

        match arena
            .handle_turn(&session_id, MessageRole::User, line, None)
            .await
        {
            Ok(outcome) => {
                if let Some(reply) = outcome.messages.last() {
                    let source = outcome
                        .answer
                        .as_ref()
                        .map(|a| a.source.to_string())
                        .unwrap_or_else(|| "fallback".to_string());
                    println!("[{source}] {}", reply.content);
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "turn failed");
            }
        }
    }

    tracing::info!("vitrine server shutting down");
    Ok(())
}
