//! Generation provider trait for producing answers from a prompt.

use async_trait::async_trait;

use crate::error::Result;

/// A language model backend that turns a fully rendered prompt into text.
///
/// The output is returned raw; post-processing such as removing a reasoning
/// preamble is the caller's concern.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Generate a completion for `prompt`.
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Identify the backend and model, e.g. `ollama/deepseek-r1:8b`.
    fn model_id(&self) -> String;
}
