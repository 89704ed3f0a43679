
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::database::SearchHit;
use crate::{RagError, Result};

/// Persona instructions prefixed to every system message.
pub const SYSTEM_PROMPT: &str = "You are MapleBond, a North American native life specialist, designed to assist with immigration, studying, job hunting, and housing in North America.
- Respond to user queries based on the provided data, focusing on practical advice for integrating into North American life.
- Provide answers in a clear, concise list format, with two lines of whitespace between each answer.
- If the query is unclear or beyond the scope of available information, respond with \"I'm not sure\" and suggest that the user might want to explore further on their own.
";

/// Separator between the persona instructions and the retrieved context.
pub const CONTEXT_HEADER: &str = "System-generated context based on user query:\n";

/// Ceiling on the assembled system message. Tokens are approximated by
/// whitespace-delimited word count; the cut itself is by character count.
pub const MAX_PROMPT_TOKENS: usize = 4096;

/// How many documents ground an answer by default.
pub const DEFAULT_ANSWER_RESULTS: usize = 1;

/// Default k for standalone similarity search.
pub const DEFAULT_SEARCH_RESULTS: usize = 3;

/// Bounded wait for the completion call.
pub const COMPLETION_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// One role-tagged message of a conversation. Conversations are built per
/// request and never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    #[inline]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    #[inline]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

/// Maps text to a fixed-dimension embedding vector.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Maps a conversation to generated text, within a bounded wait.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage], timeout: Duration) -> Result<String>;
}

/// Nearest-neighbor lookup against the vector index.
#[async_trait]
pub trait DocumentRetriever: Send + Sync {
    async fn nearest(&self, query_vector: &[f32], k: usize) -> Result<Vec<SearchHit>>;
}

/// Orchestrates embed, search, prompt assembly and completion.
///
/// Stateless across calls; collaborators are injected so the engine can be
/// constructed once at startup and shared behind an `Arc`.
pub struct RagEngine {
    embedder: Arc<dyn EmbeddingProvider>,
    retriever: Arc<dyn DocumentRetriever>,
    completer: Arc<dyn CompletionProvider>,
}

impl RagEngine {
    #[inline]
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        retriever: Arc<dyn DocumentRetriever>,
        completer: Arc<dyn CompletionProvider>,
    ) -> Self {
        Self {
            embedder,
            retriever,
            completer,
        }
    }

    /// Embed the query once and return the top-k most similar documents,
    /// highest similarity first. An empty store yields an empty vector.
    ///
    /// Blank queries and `k == 0` are rejected before anything is embedded.
    #[inline]
    pub async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>> {
        if query.trim().is_empty() {
            return Err(RagError::InvalidInput("No input provided".to_string()));
        }

        if k == 0 {
            return Err(RagError::InvalidInput(
                "Result count must be at least 1".to_string(),
            ));
        }

        let query_embedding = self.embedder.embed(query).await?;
        self.retriever.nearest(&query_embedding, k).await
    }

    /// Produce a grounded answer to `question` using `num_results` retrieved
    /// documents as context.
    ///
    /// Validation happens before any network call; downstream failures are
    /// surfaced with their stage attached and never retried.
    #[inline]
    pub async fn answer(&self, question: &str, num_results: usize) -> Result<String> {
        if question.trim().is_empty() {
            return Err(RagError::InvalidInput("No input provided".to_string()));
        }

        let hits = self.similarity_search(question, num_results).await?;

        for hit in &hits {
            debug!(
                score = hit.similarity_score,
                title = %hit.document.title,
                "Retrieved context document"
            );
        }

        let system_message = assemble_system_message(&hits);

        let messages = vec![
            ChatMessage::system(system_message),
            ChatMessage::user(question),
        ];

        self.completer.complete(&messages, COMPLETION_TIMEOUT).await
    }
}

#[derive(Serialize)]
struct ContextDocument<'a> {
    title: &'a str,
    desc: &'a str,
}

/// Render one hit as a context block. Only `title` and `desc` survive; every
/// other document field and the similarity score are deliberately dropped to
/// keep the prompt small.
fn context_block(hit: &SearchHit) -> String {
    let extract = ContextDocument {
        title: &hit.document.title,
        desc: &hit.document.desc,
    };
    serde_json::to_string_pretty(&extract).unwrap_or_default()
}

/// Assemble the system message for a set of hits: persona instructions, the
/// context header, then one block per hit joined by a blank line in result
/// order, all squeezed under the token budget.
#[inline]
pub fn assemble_system_message(hits: &[SearchHit]) -> String {
    let context = hits
        .iter()
        .map(context_block)
        .collect::<Vec<_>>()
        .join("\n\n");

    let message = format!("{SYSTEM_PROMPT}{CONTEXT_HEADER}{context}");
    enforce_token_budget(&message, MAX_PROMPT_TOKENS)
}

/// Hard-truncate `message` to `ceiling` characters when its whitespace word
/// count exceeds `ceiling`, stripping surrounding whitespace afterwards.
///
/// The word-count trigger paired with a character-count cut is an intentional
/// rough token approximation; the cut can land mid-word.
#[inline]
pub fn enforce_token_budget(message: &str, ceiling: usize) -> String {
    let word_count = message.split_whitespace().count();
    if word_count <= ceiling {
        return message.to_string();
    }

    let truncated: String = message.chars().take(ceiling).collect();
    truncated.trim().to_string()
}
