//! Grounded answer generation from retrieved chunks.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use docrag_core::{CompletionModel, CompletionRequest, SearchResult, SynthesisError};

pub const SYSTEM_PROMPT: &str = "You answer questions about a document using only the context passages you are given. \
Do not use outside knowledge. If the context does not contain enough information to answer, say so explicitly.";

pub struct AnswerSynthesizer {
    model: Arc<dyn CompletionModel>,
    temperature: f32,
    max_context_chars: usize,
}

impl AnswerSynthesizer {
    pub fn new(model: Arc<dyn CompletionModel>, temperature: f32, max_context_chars: usize) -> Self {
        Self { model, temperature, max_context_chars: max_context_chars.max(1) }
    }

    /// The user prompt that would be sent for these chunks, or `None` when
    /// none of them carries any text.
    pub fn build_prompt(&self, query: &str, chunks: &[SearchResult]) -> Option<String> {
        let context = render_context(chunks, self.max_context_chars)?;
        Some(format!(
            "Please provide a comprehensive answer to the following question using only the provided context.\n\
             If the answer cannot be fully derived from the context, please say so.\n\n\
             Question: {}\n\n\
             Context:\n{}\n\n\
             Please provide a detailed answer and cite specific chunks of the context where appropriate.",
            query.trim(),
            context
        ))
    }

    /// One completion call; failures are returned as-is without retrying.
    pub async fn synthesize(&self, query: &str, chunks: &[SearchResult], max_tokens: usize) -> Result<String, SynthesisError> {
        let prompt = self.build_prompt(query, chunks).ok_or(SynthesisError::NoContext)?;
        let started = Instant::now();
        let request = CompletionRequest { system: SYSTEM_PROMPT, prompt: &prompt, temperature: self.temperature, max_tokens };
        let result = self.model.complete(&request).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(answer) => debug!(
                model = %self.model.model_id(),
                chunks = chunks.len(),
                prompt_chars = prompt.chars().count(),
                answer_chars = answer.chars().count(),
                elapsed_ms,
                "synthesized answer"
            ),
            Err(e) => warn!(model = %self.model.model_id(), elapsed_ms, error = %e, "answer synthesis failed"),
        }
        result
    }
}

/// Chunk texts in result order, each labelled with its rank and page, joined
/// by blank lines and cut at `max_chars` characters. Blank chunks are skipped.
pub fn render_context(chunks: &[SearchResult], max_chars: usize) -> Option<String> {
    let mut context = String::new();
    let mut used = 0usize;
    for (i, chunk) in chunks.iter().enumerate() {
        let text = chunk.content.trim();
        if text.is_empty() {
            continue;
        }
        let label = match chunk.page_num {
            Some(page) => format!("Chunk {} (page {}):", i + 1, page),
            None => format!("Chunk {}:", i + 1),
        };
        let block = format!("{}\n{}", label, text);
        let sep = if context.is_empty() { 0 } else { 2 };
        let len = block.chars().count();
        if used + sep + len > max_chars {
            if context.is_empty() {
                context.extend(block.chars().take(max_chars));
            }
            break;
        }
        if sep > 0 {
            context.push_str("\n\n");
        }
        context.push_str(&block);
        used += sep + len;
    }
    (!context.is_empty()).then_some(context)
}
