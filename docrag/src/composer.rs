//! Prompt assembly, generation, and answer post-processing.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, error, info};

use crate::document::SearchResult;
use crate::error::{RagError, Result};
use crate::generation::GenerationProvider;

/// Placed between chunk texts when building the context block.
pub const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

/// Marks the end of a model's reasoning preamble.
pub const REASONING_END_MARKER: &str = "</think>";

/// The prompt used unless another template is configured.
pub const DEFAULT_TEMPLATE: &str = r#"
Introduction: Answer the question at the end based only on the following context, and only output the answer as response, no need to output your thinking process. PS: Give the most detailed answer, use more than one phrase to answer if possible.

Context:

```text
{context}
```

Question: "{question}"

---

What you should respond is the answer text itself, don't included "Answer: " as the beginning of your response.
"#;

const DEFAULT_GENERATION_TIMEOUT: Duration = Duration::from_secs(120);

const CONTEXT_SLOT: &str = "{context}";
const QUESTION_SLOT: &str = "{question}";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(String),
    Context,
    Question,
}

/// A prompt with `{context}` and `{question}` slots.
///
/// Any other text, braces included, is kept literally. Substituted values are
/// inserted verbatim and never scanned for slots themselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    segments: Vec<Segment>,
}

impl PromptTemplate {
    /// Parse a template.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if either slot is missing.
    pub fn new(template: &str) -> Result<Self> {
        let mut segments = Vec::new();
        let mut rest = template;
        let (mut has_context, mut has_question) = (false, false);

        loop {
            let next_context = rest.find(CONTEXT_SLOT);
            let next_question = rest.find(QUESTION_SLOT);
            let (at, slot, len) = match (next_context, next_question) {
                (Some(c), Some(q)) if q < c => (q, Segment::Question, QUESTION_SLOT.len()),
                (Some(c), _) => (c, Segment::Context, CONTEXT_SLOT.len()),
                (None, Some(q)) => (q, Segment::Question, QUESTION_SLOT.len()),
                (None, None) => break,
            };
            if at > 0 {
                segments.push(Segment::Text(rest[..at].to_string()));
            }
            match slot {
                Segment::Context => has_context = true,
                Segment::Question => has_question = true,
                Segment::Text(_) => {}
            }
            segments.push(slot);
            rest = &rest[at + len..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Text(rest.to_string()));
        }

        if !has_context || !has_question {
            return Err(RagError::ConfigError(
                "prompt template must contain both {context} and {question}".to_string(),
            ));
        }
        Ok(Self { segments })
    }

    /// Fill both slots.
    pub fn render(&self, context: &str, question: &str) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Context => out.push_str(context),
                Segment::Question => out.push_str(question),
            }
        }
        out
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self::new(DEFAULT_TEMPLATE)
            .unwrap_or_else(|_| unreachable!("default template has both slots"))
    }
}

/// A generated answer with the prompt that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Answer {
    /// The rendered prompt sent to the generation backend.
    pub prompt: String,
    /// The answer text, reasoning removed.
    pub text: String,
    /// `source` of each context chunk, in retrieval order.
    pub sources: Vec<String>,
}

/// Join chunk texts in order with [`CONTEXT_SEPARATOR`].
pub fn build_context(results: &[SearchResult]) -> String {
    results.iter().map(|r| r.chunk.text.as_str()).collect::<Vec<_>>().join(CONTEXT_SEPARATOR)
}

/// Drop a reasoning preamble ending in `</think>` from model output.
///
/// Everything up to and including the first marker is removed, then leading
/// newlines, then surrounding whitespace. Output without the marker is only
/// trimmed.
pub fn strip_reasoning(output: &str) -> String {
    match output.split_once(REASONING_END_MARKER) {
        Some((_, answer)) => answer.trim_start_matches('\n').trim().to_string(),
        None => output.trim().to_string(),
    }
}

/// Turns retrieved context and a question into an [`Answer`].
pub struct AnswerComposer {
    generator: Arc<dyn GenerationProvider>,
    template: PromptTemplate,
    generation_timeout: Duration,
}

impl AnswerComposer {
    /// Create a composer with the default template and a 120 s timeout.
    pub fn new(generator: Arc<dyn GenerationProvider>) -> Self {
        Self {
            generator,
            template: PromptTemplate::default(),
            generation_timeout: DEFAULT_GENERATION_TIMEOUT,
        }
    }

    pub fn with_template(mut self, template: PromptTemplate) -> Self {
        self.template = template;
        self
    }

    /// Bound each generation call.
    pub fn with_generation_timeout(mut self, timeout: Duration) -> Self {
        self.generation_timeout = timeout;
        self
    }

    /// Render the prompt for `question` over `results`.
    pub fn prompt(&self, question: &str, results: &[SearchResult]) -> String {
        self.template.render(&build_context(results), question)
    }

    /// Generate an answer to `question` grounded in `results`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Timeout`] if generation exceeds the timeout, and
    /// generation backend errors unchanged.
    pub async fn compose(&self, question: &str, results: &[SearchResult]) -> Result<Answer> {
        let prompt = self.prompt(question, results);
        debug!(
            model = %self.generator.model_id(),
            context_chunks = results.len(),
            prompt_len = prompt.len(),
            "generating answer"
        );

        let raw = tokio::time::timeout(self.generation_timeout, self.generator.generate(&prompt))
            .await
            .map_err(|_| {
                error!(timeout_secs = self.generation_timeout.as_secs(), "generation timed out");
                RagError::Timeout {
                    operation: "generation".to_string(),
                    seconds: self.generation_timeout.as_secs(),
                }
            })??;

        let text = strip_reasoning(&raw);
        let sources = results.iter().map(|r| r.chunk.source().to_string()).collect();
        info!(answer_len = text.len(), "answer generated");
        Ok(Answer { prompt, text, sources })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_reasoning_preamble() {
        assert_eq!(
            strip_reasoning("<think>reasoning</think>Paris is the capital."),
            "Paris is the capital."
        );
        assert_eq!(strip_reasoning("<think>a</think>\n\n  Lyon  \n"), "Lyon");
        assert_eq!(strip_reasoning("  plain answer \n"), "plain answer");
    }

    #[test]
    fn only_first_marker_is_consumed() {
        assert_eq!(strip_reasoning("x</think>y</think>z"), "y</think>z");
    }

    #[test]
    fn render_is_single_pass() {
        let template = PromptTemplate::new("C={context} Q={question}").unwrap();
        assert_eq!(template.render("{question}", "{context}"), "C={question} Q={context}");
    }

    #[test]
    fn other_braces_are_literal() {
        let template = PromptTemplate::new("{\"q\": \"{question}\"} {context} {other}").unwrap();
        assert_eq!(template.render("ctx", "why"), "{\"q\": \"why\"} ctx {other}");
    }

    #[test]
    fn missing_slot_is_config_error() {
        assert!(matches!(PromptTemplate::new("only {context}"), Err(RagError::ConfigError(_))));
        assert!(matches!(PromptTemplate::new("only {question}"), Err(RagError::ConfigError(_))));
    }

    #[test]
    fn default_template_embeds_context_in_a_fence() {
        let prompt = PromptTemplate::default().render("the context", "the question");
        assert!(prompt.contains("```text\nthe context\n```"));
        assert!(prompt.contains("Question: \"the question\""));
    }
}
