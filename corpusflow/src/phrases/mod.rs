//! The phrase detection step.
//!
//! Learning phrases needs a full pass over the corpus per level, which is
//! too slow for an interactive preview. The step therefore behaves
//! differently per [`RunMode`]:
//!
//! - If the artifact for its sub-pipeline fingerprint is on disk, both
//!   modes load it and apply every level.
//! - In batch mode, a missing artifact is computed inline, one level at a
//!   time, each level learned on the output of the previous ones.
//! - In preview mode, a missing artifact is handed to a background job
//!   (at most one per fingerprint) and the tokenized input passes through
//!   unchanged.

#[cfg(test)]
mod phrase_tests;
mod settings;
mod task;

pub use settings::{PhraseMode, PhraseSettings};
pub use task::{BuildPhrasesTask, BUILD_PHRASES_TASK};

use crate::cache::{apply_levels, apply_models, ArtifactCache, PHRASE_ARTIFACT_KIND};
use crate::core::{Content, Document, ModelStatus, RunMode, Sentence};
use crate::errors::{CorpusflowError, SettingsError};
use crate::fingerprint::Fingerprint;
use crate::nlp::{
    CollocationLearner, LearnerSettings, PhraseLearner, PhraseModel, RegexTokenizer, Tokenizer,
};
use crate::observability::SpanTimer;
use crate::pipeline::{deferred, tee, DocumentStream, StepEnv, StepSettings};
use crate::queue::{EnqueueOutcome, JobDispatcher};
use crate::steps::{canonicalize_settings, parse_settings, Step};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// Registered name of the phrase step.
pub const PHRASE_STEP_NAME: &str = "phrases";

/// Documents buffered for the second branch of a training pass before the
/// step falls back to re-reading its input.
pub const DEFAULT_FANOUT_BUDGET: usize = 10_000;

/// Where the phrase model for one step instance stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhraseModelState {
    /// Nothing on disk and no job computing it.
    NoArtifact,
    /// A background job is queued or running.
    JobActive,
    /// The artifact is on disk.
    ArtifactReady,
}

/// Detects multi-word phrases and joins them into single tokens.
#[derive(Debug, Clone)]
pub struct PhraseStep {
    cache: ArtifactCache,
    dispatcher: Arc<JobDispatcher>,
    tokenizer: Arc<dyn Tokenizer>,
    learner: Arc<dyn PhraseLearner>,
    fanout_budget: usize,
}

impl PhraseStep {
    /// Creates the step with the default tokenizer and learner.
    #[must_use]
    pub fn new(dispatcher: Arc<JobDispatcher>) -> Self {
        Self {
            cache: dispatcher.cache().clone(),
            dispatcher,
            tokenizer: Arc::new(RegexTokenizer::new()),
            learner: Arc::new(CollocationLearner),
            fanout_budget: DEFAULT_FANOUT_BUDGET,
        }
    }

    /// Replaces the tokenizer.
    #[must_use]
    pub fn with_tokenizer(mut self, tokenizer: Arc<dyn Tokenizer>) -> Self {
        self.tokenizer = tokenizer;
        self
    }

    /// Replaces the learner.
    #[must_use]
    pub fn with_learner(mut self, learner: Arc<dyn PhraseLearner>) -> Self {
        self.learner = learner;
        self
    }

    /// Sets how many documents a training pass may buffer.
    #[must_use]
    pub fn with_fanout_budget(mut self, budget: usize) -> Self {
        self.fanout_budget = budget;
        self
    }

    /// Returns the dispatcher.
    #[must_use]
    pub const fn dispatcher(&self) -> &Arc<JobDispatcher> {
        &self.dispatcher
    }

    /// Reports the model state for the step instance at `env`.
    ///
    /// # Errors
    ///
    /// Returns an error if the data source is not registered.
    pub fn state(&self, env: &StepEnv) -> Result<PhraseModelState, CorpusflowError> {
        let base = env.base_path()?;
        let fingerprint = env.fingerprint();
        if self.cache.exists(&base, &fingerprint, PHRASE_ARTIFACT_KIND) {
            return Ok(PhraseModelState::ArtifactReady);
        }
        if self.dispatcher.find_active(&fingerprint).is_some() {
            return Ok(PhraseModelState::JobActive);
        }
        Ok(PhraseModelState::NoArtifact)
    }

    /// Reports the status of the model for the step instance at `env`.
    ///
    /// # Errors
    ///
    /// Returns an error if the data source is not registered.
    pub fn status(&self, env: &StepEnv) -> Result<ModelStatus, CorpusflowError> {
        let base = env.base_path()?;
        Ok(self
            .dispatcher
            .status_at(&base, &env.fingerprint(), PHRASE_ARTIFACT_KIND))
    }

    fn tokenize(&self, input: DocumentStream) -> DocumentStream {
        let tokenizer = Arc::clone(&self.tokenizer);
        Box::new(input.map(move |result| result.map(|doc| tokenizer.tokenize_document(doc))))
    }

    fn run(
        &self,
        input: DocumentStream,
        env: &StepEnv,
        settings: PhraseSettings,
    ) -> Result<DocumentStream, CorpusflowError> {
        let base = env.base_path()?;
        let fingerprint = env.fingerprint();
        let tokens = self.tokenize(input);

        if self.cache.exists(&base, &fingerprint, PHRASE_ARTIFACT_KIND) {
            tracing::debug!(
                fingerprint = %fingerprint,
                step_id = %env.step().step_id,
                mode = %env.mode(),
                "Using cached phrase model"
            );
            return self.apply_cached(&base, &fingerprint, settings.mode, tokens);
        }

        match env.mode() {
            RunMode::Batch => self.compute(env, &base, &fingerprint, settings, tokens),
            RunMode::Preview => {
                self.request_background_build(env, &fingerprint)?;
                Ok(tokens)
            }
        }
    }

    fn apply_cached(
        &self,
        base: &Path,
        fingerprint: &Fingerprint,
        mode: PhraseMode,
        tokens: DocumentStream,
    ) -> Result<DocumentStream, CorpusflowError> {
        if mode == PhraseMode::Tokenize {
            return Ok(self.cache.load_and_apply::<PhraseModel>(
                base,
                fingerprint,
                PHRASE_ARTIFACT_KIND,
                tokens,
            )?);
        }
        let models = self
            .cache
            .load_levels::<PhraseModel>(base, fingerprint, PHRASE_ARTIFACT_KIND)?;
        Ok(phrase_and_render(Arc::new(models), tokens, mode))
    }

    fn request_background_build(
        &self,
        env: &StepEnv,
        fingerprint: &Fingerprint,
    ) -> Result<(), CorpusflowError> {
        let args = vec![
            serde_json::to_value(env.sub_pipeline())?,
            serde_json::Value::String(fingerprint.to_string()),
        ];
        match self
            .dispatcher
            .enqueue_if_absent(fingerprint, BUILD_PHRASES_TASK, args)
        {
            EnqueueOutcome::Enqueued(job) | EnqueueOutcome::Existing(job) => {
                tracing::debug!(
                    fingerprint = %fingerprint,
                    step_id = %env.step().step_id,
                    job_id = %job.id,
                    status = %job.status,
                    "Phrase model not ready; passing tokens through"
                );
            }
            EnqueueOutcome::Unavailable => {
                tracing::debug!(
                    fingerprint = %fingerprint,
                    step_id = %env.step().step_id,
                    "Phrase model not ready and no background job; passing tokens through"
                );
            }
        }
        Ok(())
    }

    /// Learns and saves every level, then returns the phrased stream.
    ///
    /// Each pass splits the tokenized input in two: one branch is rewritten
    /// by the levels learned so far and trains the next level, the other is
    /// buffered for the following pass. If the buffer overflows, the input
    /// is rebuilt from the data source instead. The final pass applies every
    /// level to the input it kept.
    fn compute(
        &self,
        env: &StepEnv,
        base: &Path,
        fingerprint: &Fingerprint,
        settings: PhraseSettings,
        tokens: DocumentStream,
    ) -> Result<DocumentStream, CorpusflowError> {
        let timer = SpanTimer::start(format!("phrases:{fingerprint}"));
        let learner_settings = settings.learner_settings();
        let mut models: Vec<PhraseModel> = Vec::new();
        let mut input = tokens;

        tracing::info!(
            fingerprint = %fingerprint,
            step_id = %env.step().step_id,
            levels = settings.passes(),
            "Computing phrase model"
        );

        for level in 1..=settings.passes() {
            let (training, rest) = tee(input, self.fanout_budget);
            let training = apply_models(Arc::new(models.clone()), training.into_stream());
            let model = self.learn(training, &learner_settings)?;
            tracing::debug!(fingerprint = %fingerprint, level, phrasegrams = model.len(), "Learned phrase level");
            self.cache
                .save(base, fingerprint, PHRASE_ARTIFACT_KIND, level, &model)?;
            models.push(model);

            input = if rest.is_overflowed() {
                drop(rest);
                tracing::info!(
                    fingerprint = %fingerprint,
                    level,
                    budget = self.fanout_budget,
                    "Fan-out budget exceeded; re-reading input"
                );
                self.tokenize(env.replay_upstream(RunMode::Batch)?)
            } else {
                rest.into_stream()
            };
        }

        self.cache
            .mark_complete(base, fingerprint, PHRASE_ARTIFACT_KIND, settings.passes())?;
        timer.finish();
        Ok(phrase_and_render(Arc::new(models), input, settings.mode))
    }

    fn learn(
        &self,
        training: DocumentStream,
        settings: &LearnerSettings,
    ) -> Result<PhraseModel, CorpusflowError> {
        let tokenizer = Arc::clone(&self.tokenizer);
        let mut failure = None;
        let model = {
            let mut sentences = training
                .map_while(|result| match result {
                    Ok(doc) => Some(doc),
                    Err(e) => {
                        failure = Some(e);
                        None
                    }
                })
                .flat_map(move |doc| document_sentences(doc, tokenizer.as_ref()));
            self.learner.learn(&mut sentences, settings)
        };
        match failure {
            Some(e) => Err(e),
            None => Ok(model),
        }
    }
}

fn document_sentences(document: Document, tokenizer: &dyn Tokenizer) -> Vec<Sentence> {
    match document.content {
        Content::Sentences(sentences) => sentences,
        Content::Text(text) => tokenizer.tokenize(&text),
    }
}

/// Applies `models` to every tokenized document and renders the result
/// as text per `mode`.
fn phrase_and_render(
    models: Arc<Vec<PhraseModel>>,
    tokens: DocumentStream,
    mode: PhraseMode,
) -> DocumentStream {
    Box::new(tokens.map(move |result| {
        result.map(|document| {
            let original = match &document.content {
                Content::Sentences(sentences) => sentences.clone(),
                Content::Text(text) => vec![text.split_whitespace().map(str::to_string).collect()],
            };
            let phrased: Vec<Sentence> = original
                .iter()
                .map(|sentence| apply_levels(&models, sentence.clone()))
                .collect();
            document.with_content(Content::Text(mode.render(&original, &phrased)))
        })
    }))
}

impl Step for PhraseStep {
    fn name(&self) -> &str {
        PHRASE_STEP_NAME
    }

    fn title(&self) -> &str {
        "Detect phrases"
    }

    fn validate(&self, settings: &StepSettings) -> Result<(), SettingsError> {
        parse_settings::<PhraseSettings>(settings)?.validate()
    }

    fn canonical_settings(&self, settings: &StepSettings) -> StepSettings {
        canonicalize_settings::<PhraseSettings>(settings)
    }

    fn process(
        &self,
        input: DocumentStream,
        env: StepEnv,
        settings: &StepSettings,
    ) -> Result<DocumentStream, CorpusflowError> {
        let settings: PhraseSettings = parse_settings(settings)?;
        settings
            .validate()
            .map_err(|e| e.with_step_id(env.step().step_id.clone()))?;
        let step = self.clone();
        Ok(deferred(move || step.run(input, &env, settings)))
    }
}

