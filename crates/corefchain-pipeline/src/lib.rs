//! Corefchain Pipeline
//!
//! Resolves one entity category at a time across a legal narrative and
//! chains the categories, each pass reading the previous pass's rewrite.
//!
//! # Architecture
//!
//! ```text
//! Document → Chunker → Entity Extractor → Coreference Clusterer
//!          → Cluster Verifier → Mention Substitutor → rewritten Document
//!          → (next category)
//! ```
//!
//! Every completion call goes through a [`RetryPolicy`] that bounds the
//! attempts and only returns validator-accepted responses. Stages commit
//! their artifacts to a [`RunStore`](corefchain_domain::traits::RunStore)
//! before the run state advances, so a later invocation can resume from
//! any committed stage.
//!
//! # Key Features
//!
//! - **Token-bounded chunking**: paragraph and sentence units, with a
//!   minimum word count for the last segment
//! - **Per-unit isolation**: a failing segment or cluster is recorded in its
//!   artifact and never aborts the pass
//! - **Majority verification**: `V` independent passes per candidate cluster
//! - **Order-independent substitution**: spans are sorted and checked for
//!   overlap before a single rewrite
//!
//! # Example Usage
//!
//! ```no_run
//! use corefchain_domain::{Document, EntityCategory, Stage};
//! use corefchain_llm::MockProvider;
//! use corefchain_pipeline::{Orchestrator, PipelineConfig, PromptSet, WordCounter};
//! use corefchain_store::SqliteStore;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let provider = Arc::new(MockProvider::default());
//! let store = SqliteStore::new(":memory:")?;
//! let orchestrator = Orchestrator::new(
//!     provider,
//!     store,
//!     PipelineConfig::default(),
//!     PromptSet::defaults(),
//!     Arc::new(WordCounter),
//! )?;
//!
//! let document = Document::new("case-001", EntityCategory::Person, "Maria crossed the border.");
//! let report = orchestrator.run_category(&document, &Stage::ALL).await?;
//!
//! println!("Resolved: {} mentions", report.resolved);
//! println!("Unresolved: {} mentions", report.unresolved);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

mod artifact;
mod chunking;
mod config;
mod coref;
mod error;
mod extractor;
mod orchestrator;
mod parser;
mod prompt;
mod report;
mod retry;
mod substitute;
mod tokenizer;
mod verifier;


pub use artifact::{ClustersArtifact, MentionsArtifact};
pub use chunking::Chunker;
pub use config::{
    CategoryConfig, ChunkingConfig, CompletionConfig, CorefConfig, NerConfig, PipelineConfig,
    RetryConfig, StorageBackend, StorageConfig, TokenizerConfig,
};
pub use coref::{Clustering, CorefClusterer, CorefMemory, ProposalError};
pub use error::PipelineError;
pub use extractor::{locate_mentions, EntityExtractor, SegmentExtraction};
pub use orchestrator::Orchestrator;
pub use parser::{
    extract_json_object, parse_extraction, parse_proposal, parse_verdict, CorefProposal,
    ExplicitSpan, ExtractionPayload, Verdict,
};
pub use prompt::{
    default_coref_template, default_ner_template, default_verify_template, extraction_template,
    CategoryPrompts, PromptSet, FALLBACK_PREAMBLES,
};
pub use report::{CategoryReport, ChainReport, StageTiming};
pub use retry::{Accepted, RetryPolicy};
pub use substitute::substitute;
pub use tokenizer::{counter_from_config, HfTokenCounter, TokenCounter, WordCounter};
pub use verifier::{decide, ClusterVerifier, VerificationOutcome};
