//! Query-time behaviour: admission threshold, composition and the service context.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use docrag::{
    AskOutcome, Chunk, ChunkMetadata, EmbeddingProvider, GenerationProvider, InMemoryVectorStore,
    PromptTemplate, RagConfig, RagError, RagService, Result, Retrieval, Retriever, VectorStore,
};
use proptest::prelude::*;

/// Embeds every query to the same fixed vector.
struct FixedEmbedder(Vec<f32>);

#[async_trait]
impl EmbeddingProvider for FixedEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Ok(self.0.clone())
    }

    fn dimensions(&self) -> usize {
        self.0.len()
    }

    fn model_id(&self) -> String {
        "fake/fixed".to_string()
    }
}

/// Embeds by keyword: "sky" points along x, anything else along y.
struct KeywordEmbedder;

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(if text.to_lowercase().contains("sky") { vec![1.0, 0.0] } else { vec![0.0, 1.0] })
    }

    fn dimensions(&self) -> usize {
        2
    }

    fn model_id(&self) -> String {
        "fake/keyword".to_string()
    }
}

/// Returns a canned reply and remembers the prompt it was given.
struct ScriptedGenerator {
    reply: String,
    delay: Duration,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    fn new(reply: &str) -> Self {
        Self { reply: reply.to_string(), delay: Duration::ZERO, prompts: Mutex::new(Vec::new()) }
    }

    fn slow(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl GenerationProvider for ScriptedGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        tokio::time::sleep(self.delay).await;
        Ok(self.reply.clone())
    }

    fn model_id(&self) -> String {
        "fake/scripted".to_string()
    }
}

fn chunk(id: &str, text: &str, source: &str, embedding: Vec<f32>) -> Chunk {
    Chunk {
        id: id.to_string(),
        text: text.to_string(),
        embedding,
        metadata: ChunkMetadata {
            source: source.to_string(),
            start_index: 0,
            chunk_index: 0,
            extra: BTreeMap::new(),
        },
        document_id: id.to_string(),
    }
}

fn sky_store() -> Arc<InMemoryVectorStore> {
    Arc::new(
        InMemoryVectorStore::from_chunks(vec![
            chunk("sky.md#0", "The sky is blue.", "data/sky.md", vec![0.9, 0.1]),
            chunk("grass.md#0", "Grass is green.", "data/grass.md", vec![0.2, 0.8]),
        ])
        .unwrap(),
    )
}

fn service(generator: Arc<ScriptedGenerator>, store: Arc<InMemoryVectorStore>) -> RagService {
    RagService::builder()
        .config(RagConfig::default())
        .embedding_provider(Arc::new(KeywordEmbedder))
        .generation_provider(generator)
        .vector_store(store)
        .build()
        .unwrap()
}

#[tokio::test]
async fn empty_store_is_no_match() {
    let generator = Arc::new(ScriptedGenerator::new("unused"));
    let service = service(generator.clone(), Arc::new(InMemoryVectorStore::new()));

    let outcome = service.ask("What colour is the sky?").await.unwrap();
    assert!(matches!(outcome, AskOutcome::NoMatch));
    assert!(generator.prompts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn irrelevant_question_is_no_match() {
    let generator = Arc::new(ScriptedGenerator::new("unused"));
    let store = InMemoryVectorStore::from_chunks(vec![chunk(
        "sky.md#0",
        "The sky is blue.",
        "data/sky.md",
        vec![1.0, 0.0],
    )])
    .unwrap();
    let service = service(generator.clone(), Arc::new(store));

    let outcome = service.ask("Who wrote Hamlet?").await.unwrap();
    assert!(matches!(outcome, AskOutcome::NoMatch));
    assert!(generator.prompts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn answer_strips_reasoning_and_lists_sources() {
    let generator =
        Arc::new(ScriptedGenerator::new("<think>reasoning</think>Paris is the capital."));
    let service = service(generator.clone(), sky_store());

    let AskOutcome::Answered(answer) = service.ask("What colour is the sky?").await.unwrap() else {
        panic!("expected an answer");
    };
    assert_eq!(answer.text, "Paris is the capital.");
    assert_eq!(answer.sources, vec!["data/sky.md", "data/grass.md"]);

    let prompts = generator.prompts.lock().unwrap();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("The sky is blue.\n\n---\n\nGrass is green."));
    assert!(prompts[0].contains("Question: \"What colour is the sky?\""));
    assert_eq!(prompts[0], answer.prompt);
}

#[tokio::test]
async fn answer_prompt_is_built_from_the_retrieved_context() {
    let generator = Arc::new(ScriptedGenerator::new("Blue."));
    let service = service(generator, sky_store());
    let question = "What colour is the sky?";

    let retrieval = service.retriever().retrieve(question).await.unwrap();
    assert!(retrieval.is_match());
    let sources: Vec<&str> = retrieval.results().iter().map(|r| r.chunk.source()).collect();
    assert_eq!(sources, vec!["data/sky.md", "data/grass.md"]);

    let AskOutcome::Answered(answer) = service.ask(question).await.unwrap() else {
        panic!("expected an answer");
    };
    assert_eq!(answer.prompt, service.composer().prompt(question, retrieval.results()));

    // Grass scores about 0.83 against this question, the sky far less.
    let unrelated = service.retriever().search("Who wrote Hamlet?", 5, 0.9).await.unwrap();
    assert!(!unrelated.is_match());
    assert!(unrelated.results().is_empty());
}

#[tokio::test]
async fn custom_template_is_used() {
    let generator = Arc::new(ScriptedGenerator::new("blue"));
    let service = RagService::builder()
        .embedding_provider(Arc::new(KeywordEmbedder))
        .generation_provider(generator.clone())
        .vector_store(sky_store())
        .template(PromptTemplate::new("Q: {question}\nC: {context}").unwrap())
        .build()
        .unwrap();

    service.ask("sky?").await.unwrap();
    let prompts = generator.prompts.lock().unwrap();
    assert!(prompts[0].starts_with("Q: sky?\nC: The sky is blue."));
}

#[tokio::test]
async fn slow_generation_times_out() {
    let generator = Arc::new(ScriptedGenerator::new("late").slow(Duration::from_secs(5)));
    let service = RagService::builder()
        .embedding_provider(Arc::new(KeywordEmbedder))
        .generation_provider(generator)
        .vector_store(sky_store())
        .generation_timeout(Duration::from_millis(20))
        .build()
        .unwrap();

    let err = service.ask("What colour is the sky?").await.unwrap_err();
    assert!(matches!(err, RagError::Timeout { .. }), "got {err:?}");
    assert!(err.is_retryable());
}

#[tokio::test]
async fn empty_question_is_config_error() {
    let service = service(Arc::new(ScriptedGenerator::new("unused")), sky_store());
    let err = service.ask("   ").await.unwrap_err();
    assert!(matches!(err, RagError::ConfigError(_)));
}

/// Claims two dimensions but returns one.
struct ShortEmbedder;

#[async_trait]
impl EmbeddingProvider for ShortEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Ok(vec![1.0])
    }

    fn dimensions(&self) -> usize {
        2
    }

    fn model_id(&self) -> String {
        "fake/short".to_string()
    }
}

#[tokio::test]
async fn wrong_query_dimensions_is_a_mismatch() {
    let retriever = Retriever::new(Arc::new(ShortEmbedder), sky_store(), &RagConfig::default());
    let err = retriever.retrieve("sky").await.unwrap_err();
    assert!(matches!(err, RagError::EmbeddingMismatch(_)));
}

#[test]
fn builder_requires_both_providers() {
    let result = RagService::builder().embedding_provider(Arc::new(KeywordEmbedder)).build();
    assert!(matches!(result, Err(RagError::ConfigError(_))));
}

/// `NoMatch` exactly when nothing is stored or the best score is below the
/// threshold; a `Matches` set always starts at or above it.
mod prop_threshold_admission {
    use super::*;

    const DIM: usize = 4;

    fn arb_vector() -> impl Strategy<Value = Vec<f32>> {
        proptest::collection::vec(-1.0f32..1.0f32, DIM)
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn admission_follows_top_score(
            stored in proptest::collection::vec(arb_vector(), 0..8),
            query in arb_vector(),
            threshold in 0.0f32..=1.0f32,
            k in 1usize..6,
        ) {
            let chunks: Vec<Chunk> = stored
                .into_iter()
                .enumerate()
                .filter(|(_, v)| v.iter().any(|x| *x != 0.0))
                .map(|(i, v)| chunk(&format!("doc.md#{i}"), "text", "data/doc.md", v))
                .collect();

            let rt = tokio::runtime::Runtime::new().unwrap();
            let (retrieval, raw) = rt.block_on(async {
                let store = Arc::new(InMemoryVectorStore::from_chunks(chunks).unwrap());
                let raw = store.search(&query, k).await.unwrap();
                let embedder = Arc::new(FixedEmbedder(query.clone()));
                let retriever = Retriever::new(embedder, store, &RagConfig::default());
                (retriever.search("question", k, threshold).await.unwrap(), raw)
            });

            match retrieval {
                Retrieval::NoMatch => {
                    prop_assert!(raw.is_empty() || raw[0].score < threshold);
                }
                Retrieval::Matches(results) => {
                    prop_assert!(!results.is_empty());
                    prop_assert!(results[0].score >= threshold);
                    prop_assert_eq!(results.len(), raw.len());
                }
            }
        }
    }
}
