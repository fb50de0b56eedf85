//! Stage sequencing, persistence and the category chain

use crate::artifact::{ClustersArtifact, MentionsArtifact};
use crate::chunking::Chunker;
use crate::config::{CategoryConfig, PipelineConfig};
use crate::coref::CorefClusterer;
use crate::error::PipelineError;
use crate::extractor::EntityExtractor;
use crate::prompt::{CategoryPrompts, PromptSet};
use crate::report::{CategoryReport, ChainReport, StageTiming};
use crate::retry::RetryPolicy;
use crate::substitute::substitute;
use crate::tokenizer::TokenCounter;
use crate::verifier::ClusterVerifier;
use corefchain_domain::traits::RunStore;
use corefchain_domain::{
    ArtifactKind, Document, RunId, RunKey, RunState, Segment, Stage, StageRecord,
};
use corefchain_llm::CompletionProvider;
use corefchain_store::unix_now;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fmt::Display;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Values produced or loaded while a category pass runs
#[derive(Default)]
struct PassData {
    source: Option<String>,
    segments: Option<Vec<Segment>>,
    mentions: Option<MentionsArtifact>,
    clusters: Option<ClustersArtifact>,
}

/// Runs the pipeline stages of one or more category passes
///
/// Stages of the same (document, category) are serialized through a
/// per-run lock; different runs proceed independently. The store is only
/// locked for the duration of a single read or write.
pub struct Orchestrator<P, S> {
    provider: Arc<P>,
    store: Mutex<S>,
    config: PipelineConfig,
    prompts: PromptSet,
    counter: Arc<dyn TokenCounter>,
    run_locks: Mutex<HashMap<RunKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl<P, S> Orchestrator<P, S>
where
    P: CompletionProvider,
    S: RunStore,
    S::Error: Display,
{
    /// Create an orchestrator, validating the configuration
    pub fn new(
        provider: Arc<P>,
        store: S,
        config: PipelineConfig,
        prompts: PromptSet,
        counter: Arc<dyn TokenCounter>,
    ) -> Result<Self, PipelineError> {
        config.validate().map_err(PipelineError::Config)?;
        Ok(Self {
            provider,
            store: Mutex::new(store),
            config,
            prompts,
            counter,
            run_locks: Mutex::new(HashMap::new()),
        })
    }

    /// Active configuration
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run the requested stages of one category pass
    ///
    /// Requested stages run in pipeline order. Each commits its artifacts
    /// before the run state advances; a failing stage leaves the state at
    /// the last committed stage.
    pub async fn run_category(
        &self,
        document: &Document,
        stages: &[Stage],
    ) -> Result<CategoryReport, PipelineError> {
        let key = RunKey::new(document.id.clone(), document.category);
        let lock = self.run_lock(&key)?;
        let result = {
            let _guard = lock.lock().await;
            self.run_stages(&key, document, stages).await
        };
        self.release_lock(&key, lock);
        result
    }

    async fn run_stages(
        &self,
        key: &RunKey,
        document: &Document,
        stages: &[Stage],
    ) -> Result<CategoryReport, PipelineError> {
        let category = self.config.category(document.category).ok_or_else(|| {
            PipelineError::Config(format!("category '{}' is not configured", document.category))
        })?;
        let prompts = self.prompts.get(document.category);

        let mut requested = stages.to_vec();
        requested.sort();
        requested.dedup();

        let mut state = self
            .with_store(|store| store.load_state(key))?
            .unwrap_or_else(|| RunState::new(key.clone(), unix_now()));
        if let Some((stage, prerequisite)) = state.missing_prerequisite(&requested) {
            return Err(PipelineError::MissingPrerequisite {
                stage,
                prerequisite,
            });
        }

        let run_id = RunId::new();
        let started = Instant::now();
        let mut data = PassData::default();
        let mut timings = Vec::new();

        info!("{}: running stages {:?} (status {})", key, requested, state.status);

        for stage in &requested {
            let stage_started = Instant::now();
            let artifacts = match self
                .run_stage(*stage, key, document, category, &prompts, &mut data)
                .await
            {
                Ok(artifacts) => artifacts,
                Err(e) => {
                    error!("{}: stage '{}' aborted: {}", key, stage, e);
                    return Err(e);
                }
            };
            let elapsed = stage_started.elapsed();
            self.commit(&mut state, *stage, run_id, artifacts, elapsed)?;

            info!(
                "{}: stage '{}' committed in {:.2}s ({:.2}s so far)",
                key,
                stage,
                elapsed.as_secs_f64(),
                started.elapsed().as_secs_f64()
            );
            timings.push(StageTiming {
                stage: *stage,
                elapsed_ms: millis(elapsed),
            });
        }

        let mut report = CategoryReport::new(key.clone(), state.status);
        self.fill_report(&mut report, &state, &mut data)?;
        report.timings = timings;
        report.total_ms = millis(started.elapsed());

        info!(
            "{}: {} mention(s), {} resolved, {} unresolved, {} singleton",
            key, report.mentions, report.resolved, report.unresolved, report.singleton
        );
        Ok(report)
    }

    /// Run the requested stages for every configured category in chain order
    ///
    /// Each category reads the previous category's rewritten document, so
    /// every category must end with a committed `resolve` stage.
    pub async fn run_chain(
        &self,
        document_id: &str,
        text: &str,
        stages: &[Stage],
    ) -> Result<ChainReport, PipelineError> {
        let started = Instant::now();
        let mut input = text.to_string();
        let mut categories = Vec::new();

        for category in self.config.chain() {
            let document = Document::new(document_id, category, input);
            categories.push(self.run_category(&document, stages).await?);

            let key = RunKey::new(document_id, category);
            input = self
                .artifact(&key, ArtifactKind::Rewritten)?
                .ok_or(PipelineError::MissingArtifact {
                    key,
                    kind: ArtifactKind::Rewritten,
                })?;
        }

        info!(
            "{}: chain of {} categories finished in {:.2}s",
            document_id,
            categories.len(),
            started.elapsed().as_secs_f64()
        );
        Ok(ChainReport {
            document_id: document_id.to_string(),
            categories,
            output: input,
        })
    }

    /// Run state of every category recorded for a document, in chain order
    pub fn status(&self, document_id: &str) -> Result<Vec<RunState>, PipelineError> {
        let keys = self.with_store(|store| store.list_runs(document_id))?;
        let mut states = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(state) = self.with_store(|store| store.load_state(&key))? {
                states.push(state);
            }
        }
        states.sort_by_key(|s| s.key.category.chain_position());
        Ok(states)
    }

    /// Read a committed artifact
    ///
    /// Artifacts of a stage whose record was dropped by an earlier re-run
    /// stay in the store but are stale, so they read as absent.
    pub fn artifact(&self, key: &RunKey, kind: ArtifactKind) -> Result<Option<String>, PipelineError> {
        let committed = self
            .with_store(|store| store.load_state(key))?
            .is_some_and(|state| state.artifact(kind).is_some());
        if !committed {
            return Ok(None);
        }
        self.with_store(|store| store.get_artifact(key, kind))
    }

    async fn run_stage(
        &self,
        stage: Stage,
        key: &RunKey,
        document: &Document,
        category: &CategoryConfig,
        prompts: &CategoryPrompts,
        data: &mut PassData,
    ) -> Result<Vec<(ArtifactKind, String)>, PipelineError> {
        match stage {
            Stage::Chunk => {
                let chunker = Chunker::from_config(&self.config.chunking, Arc::clone(&self.counter));
                let segments = chunker.chunk(&document.text)?;
                info!(
                    "{}: {} segment(s) of at most {} {}",
                    key,
                    segments.len(),
                    self.config.chunking.max_tokens,
                    self.counter.unit()
                );

                let artifacts = vec![
                    (ArtifactKind::Source, document.text.clone()),
                    (ArtifactKind::Segments, serde_json::to_string_pretty(&segments)?),
                ];
                data.source = Some(document.text.clone());
                data.segments = Some(segments);
                Ok(artifacts)
            }
            Stage::Ner => {
                let segments = self.segments(key, data)?;
                let extractor = EntityExtractor::new(
                    Arc::clone(&self.provider),
                    key.category,
                    &category.ner.model,
                    &prompts.ner,
                    self.policy(category.ner.max_retries),
                )
                .with_concurrency(self.config.completion.concurrency);

                let mentions = MentionsArtifact {
                    category: key.category,
                    extractions: extractor.extract_all(&segments).await,
                };
                let body = serde_json::to_string_pretty(&mentions)?;
                data.mentions = Some(mentions);
                Ok(vec![(ArtifactKind::Mentions, body)])
            }
            Stage::Coref => {
                let segments = self.segments(key, data)?;
                let mentions = self.mentions(key, data)?;

                let clusterer = CorefClusterer::new(
                    Arc::clone(&self.provider),
                    &category.coref.model,
                    &prompts.coref,
                    self.policy(category.coref.max_retries),
                )
                .with_proposals(category.coref.propose_with_llm);
                let clustering = clusterer.cluster(&segments, &mentions.extractions).await;

                let verifier = ClusterVerifier::new(
                    Arc::clone(&self.provider),
                    &category.coref.model,
                    &prompts.verify,
                    self.policy(category.coref.max_retries),
                    category.coref.verify_passes,
                )
                .with_singletons(category.coref.verify_singletons)
                .with_concurrency(self.config.completion.concurrency);
                let outcome = verifier
                    .verify_all(&clustering.candidates, &mentions.extractions, &segments)
                    .await;

                let clusters = ClustersArtifact {
                    memory: clustering.memory,
                    proposal_errors: clustering.proposal_errors,
                    candidates: clustering.candidates,
                    verifications: outcome.records,
                    confirmed: outcome.confirmed,
                };
                let body = serde_json::to_string_pretty(&clusters)?;
                data.clusters = Some(clusters);
                Ok(vec![(ArtifactKind::Clusters, body)])
            }
            Stage::Resolve => {
                let source = self.source(key, document, data)?;
                let segments = self.segments(key, data)?;
                let mentions = self.mentions(key, data)?;
                let clusters = self.clusters(key, data)?;

                let rewritten = substitute(&source, &segments, &mentions.extractions, &clusters.confirmed)?;
                Ok(vec![(ArtifactKind::Rewritten, rewritten)])
            }
        }
    }

    fn policy(&self, max_attempts: usize) -> RetryPolicy {
        RetryPolicy::from_config(&self.config.completion, &self.config.retry, max_attempts)
    }

    /// Write a stage's artifacts, then advance and persist the run state
    fn commit(
        &self,
        state: &mut RunState,
        stage: Stage,
        run_id: RunId,
        artifacts: Vec<(ArtifactKind, String)>,
        elapsed: Duration,
    ) -> Result<(), PipelineError> {
        let key = state.key.clone();
        if let Some(kind) = unproduced(stage, &artifacts) {
            return Err(PipelineError::MissingArtifact { key, kind });
        }
        let handles = self.with_store(|store| {
            artifacts
                .iter()
                .map(|(kind, body)| store.put_artifact(&key, *kind, body))
                .collect::<Result<Vec<_>, _>>()
        })?;

        let now = unix_now();
        state.commit(
            stage,
            StageRecord {
                run_id,
                artifacts: handles,
                committed_at: now,
                elapsed_ms: millis(elapsed),
            },
            now,
        );
        self.with_store(|store| store.save_state(state))
    }

    fn fill_report(
        &self,
        report: &mut CategoryReport,
        state: &RunState,
        data: &mut PassData,
    ) -> Result<(), PipelineError> {
        if state.is_complete(Stage::Chunk) {
            report.record_segments(&self.segments(&state.key, data)?);
        }
        if state.is_complete(Stage::Ner) {
            report.record_mentions(&self.mentions(&state.key, data)?);
        }
        if state.is_complete(Stage::Coref) {
            let clusters = self.clusters(&state.key, data)?;
            report.record_clusters(&clusters);
            if state.is_complete(Stage::Resolve) {
                report.record_resolution(&clusters);
            }
        }
        Ok(())
    }

    /// Text the committed segments were cut from
    fn source(&self, key: &RunKey, document: &Document, data: &mut PassData) -> Result<String, PipelineError> {
        if let Some(source) = &data.source {
            return Ok(source.clone());
        }
        let source = self.load_text(key, ArtifactKind::Source)?;
        if !document.text.is_empty() && source != document.text {
            warn!(
                "{}: document text differs from the committed source; using the committed source",
                key
            );
        }
        data.source = Some(source.clone());
        Ok(source)
    }

    fn segments(&self, key: &RunKey, data: &mut PassData) -> Result<Vec<Segment>, PipelineError> {
        if data.segments.is_none() {
            data.segments = Some(self.load_json(key, ArtifactKind::Segments)?);
        }
        Ok(data.segments.clone().unwrap_or_default())
    }

    fn mentions(&self, key: &RunKey, data: &mut PassData) -> Result<MentionsArtifact, PipelineError> {
        match &data.mentions {
            Some(mentions) => Ok(mentions.clone()),
            None => {
                let mentions: MentionsArtifact = self.load_json(key, ArtifactKind::Mentions)?;
                data.mentions = Some(mentions.clone());
                Ok(mentions)
            }
        }
    }

    fn clusters(&self, key: &RunKey, data: &mut PassData) -> Result<ClustersArtifact, PipelineError> {
        match &data.clusters {
            Some(clusters) => Ok(clusters.clone()),
            None => {
                let clusters: ClustersArtifact = self.load_json(key, ArtifactKind::Clusters)?;
                data.clusters = Some(clusters.clone());
                Ok(clusters)
            }
        }
    }

    fn load_text(&self, key: &RunKey, kind: ArtifactKind) -> Result<String, PipelineError> {
        self.with_store(|store| store.get_artifact(key, kind))?
            .ok_or_else(|| PipelineError::MissingArtifact {
                key: key.clone(),
                kind,
            })
    }

    fn load_json<T: DeserializeOwned>(&self, key: &RunKey, kind: ArtifactKind) -> Result<T, PipelineError> {
        let body = self.load_text(key, kind)?;
        Ok(serde_json::from_str(&body)?)
    }

    fn with_store<T>(&self, f: impl FnOnce(&mut S) -> Result<T, S::Error>) -> Result<T, PipelineError> {
        let mut store = self
            .store
            .lock()
            .map_err(|_| PipelineError::Store("store lock poisoned".to_string()))?;
        f(&mut store).map_err(|e| PipelineError::Store(e.to_string()))
    }

    fn run_lock(&self, key: &RunKey) -> Result<Arc<tokio::sync::Mutex<()>>, PipelineError> {
        let mut locks = self
            .run_locks
            .lock()
            .map_err(|_| PipelineError::Store("run lock table poisoned".to_string()))?;
        Ok(Arc::clone(locks.entry(key.clone()).or_default()))
    }

    /// Forget the lock of a run nobody else holds or waits on
    fn release_lock(&self, key: &RunKey, lock: Arc<tokio::sync::Mutex<()>>) {
        if let Ok(mut locks) = self.run_locks.lock() {
            // One reference lives in the table, the other is `lock`.
            if Arc::strong_count(&lock) == 2 {
                locks.remove(key);
            }
        }
    }
}

/// First artifact `stage` must commit that `artifacts` lacks
fn unproduced(stage: Stage, artifacts: &[(ArtifactKind, String)]) -> Option<ArtifactKind> {
    stage
        .produces()
        .iter()
        .copied()
        .find(|kind| !artifacts.iter().any(|(k, _)| k == kind))
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
