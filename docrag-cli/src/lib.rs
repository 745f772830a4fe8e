//! Command-line front end for docrag: build an index from a document
//! directory, or ask a single question against it.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use docrag::{AskOutcome, IndexReport, RagService, Settings};
use tracing::debug;

/// Printed when no stored chunk is relevant to the query.
pub const NO_MATCH_MESSAGE: &str = "Unable to find matching results.";

#[derive(Debug, Parser)]
#[command(name = "docrag")]
#[command(version)]
#[command(about = "Index documents and answer questions over them", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Load, chunk and embed the document directory, then publish the index.
    Index {
        /// Document root (overrides DOCRAG_DATA_DIR).
        #[arg(long)]
        data_dir: Option<PathBuf>,
        /// Store location (overrides DOCRAG_STORE_DIR).
        #[arg(long)]
        store_dir: Option<PathBuf>,
    },
    /// Answer a question from the published index.
    Query {
        /// The query text.
        query_text: String,
        /// Store location (overrides DOCRAG_STORE_DIR).
        #[arg(long)]
        store_dir: Option<PathBuf>,
        /// Number of chunks to retrieve (overrides DOCRAG_TOP_K).
        #[arg(long)]
        top_k: Option<usize>,
        /// Minimum relevance of the best chunk (overrides DOCRAG_RELEVANCE_THRESHOLD).
        #[arg(long)]
        threshold: Option<f32>,
        /// Print the rendered prompt before the response.
        #[arg(long)]
        show_prompt: bool,
    },
}

impl Commands {
    /// Fold command-line overrides into `settings`.
    pub fn apply(&self, settings: &mut Settings) {
        match self {
            Commands::Index { data_dir, store_dir } => {
                if let Some(dir) = data_dir {
                    settings.data_dir = dir.clone();
                }
                if let Some(dir) = store_dir {
                    settings.store_dir = dir.clone();
                }
            }
            Commands::Query { store_dir, top_k, threshold, .. } => {
                if let Some(dir) = store_dir {
                    settings.store_dir = dir.clone();
                }
                if let Some(k) = top_k {
                    settings.rag.top_k = *k;
                }
                if let Some(t) = threshold {
                    settings.rag.relevance_threshold = *t;
                }
            }
        }
    }
}

/// Run `cli` against `settings` and return what should be printed.
pub async fn run(cli: Cli, mut settings: Settings) -> anyhow::Result<String> {
    cli.command.apply(&mut settings);
    debug!(?settings, "resolved settings");

    match cli.command {
        Commands::Index { .. } => {
            let indexer = settings.indexer()?;
            let report = indexer.build().await.context("index build failed")?;
            Ok(format_report(&report))
        }
        Commands::Query { query_text, show_prompt, .. } => {
            let service = RagService::open(&settings).await?;
            let outcome = service.ask(&query_text).await?;
            service.close();
            Ok(format_outcome(&outcome, show_prompt))
        }
    }
}

pub fn format_report(report: &IndexReport) -> String {
    format!(
        "Saved {} chunks from {} documents to {}.",
        report.chunks,
        report.documents,
        report.store_path.display()
    )
}

/// Render a query outcome as `Response: ...` followed by the source list.
pub fn format_outcome(outcome: &AskOutcome, show_prompt: bool) -> String {
    match outcome {
        AskOutcome::NoMatch => NO_MATCH_MESSAGE.to_string(),
        AskOutcome::Answered(answer) => {
            let response = format!("Response: {}\nSources: {:?}", answer.text, answer.sources);
            if show_prompt { format!("{}\n\n{}", answer.prompt, response) } else { response }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docrag::Answer;

    fn answered() -> AskOutcome {
        AskOutcome::Answered(Answer {
            prompt: "Context: sky\nQuestion: color?".to_string(),
            text: "Blue.".to_string(),
            sources: vec!["data/sky.md".to_string(), "data/grass.md".to_string()],
        })
    }

    #[test]
    fn parses_query_flags() {
        let cli = Cli::try_parse_from([
            "docrag",
            "query",
            "What color is the sky?",
            "--top-k",
            "3",
            "--threshold",
            "0.7",
            "--show-prompt",
        ])
        .unwrap();

        match cli.command {
            Commands::Query { query_text, store_dir, top_k, threshold, show_prompt } => {
                assert_eq!(query_text, "What color is the sky?");
                assert_eq!(store_dir, None);
                assert_eq!(top_k, Some(3));
                assert_eq!(threshold, Some(0.7));
                assert!(show_prompt);
            }
            other => panic!("expected query, got {other:?}"),
        }
    }

    #[test]
    fn query_requires_text() {
        assert!(Cli::try_parse_from(["docrag", "query"]).is_err());
        assert!(Cli::try_parse_from(["docrag", "query", "q", "--top-k", "many"]).is_err());
    }

    #[test]
    fn overrides_replace_only_given_settings() {
        let cli = Cli::try_parse_from(["docrag", "index", "--data-dir", "docs"]).unwrap();
        let mut settings = Settings::default();
        cli.command.apply(&mut settings);
        assert_eq!(settings.data_dir, PathBuf::from("docs"));
        assert_eq!(settings.store_dir, PathBuf::from("chroma"));

        let cli =
            Cli::try_parse_from(["docrag", "query", "q", "--store-dir", "/tmp/s", "--top-k", "2"])
                .unwrap();
        cli.command.apply(&mut settings);
        assert_eq!(settings.store_dir, PathBuf::from("/tmp/s"));
        assert_eq!(settings.rag.top_k, 2);
        assert_eq!(settings.rag.relevance_threshold, 0.5);
    }

    #[test]
    fn formats_outcomes() {
        assert_eq!(format_outcome(&AskOutcome::NoMatch, true), NO_MATCH_MESSAGE);
        assert_eq!(
            format_outcome(&answered(), false),
            "Response: Blue.\nSources: [\"data/sky.md\", \"data/grass.md\"]"
        );
        let with_prompt = format_outcome(&answered(), true);
        assert!(with_prompt.starts_with("Context: sky\nQuestion: color?\n\nResponse: Blue."));
    }

    #[test]
    fn formats_report() {
        let report = IndexReport {
            documents: 2,
            chunks: 7,
            generation: "gen-1".to_string(),
            store_path: PathBuf::from("chroma"),
        };
        assert_eq!(format_report(&report), "Saved 7 chunks from 2 documents to chroma.");
    }
}
