//! Tests for the phrase step across run modes.

#[cfg(test)]
mod tests {
    use crate::config::CorpusflowConfig;
    use crate::core::{Content, ModelStatus, RunMode};
    use crate::errors::CorpusflowError;
    use crate::cache::{ArtifactCache, PHRASE_ARTIFACT_KIND};
    use crate::fingerprint::fingerprint;
    use crate::nlp::PhraseModel;
    use crate::phrases::{PhraseModelState, PhraseStep};
    use crate::pipeline::{DocumentStream, PipelineDefinition, StepDescriptor};
    use crate::queue::InMemoryTaskQueue;
    use crate::service::Corpusflow;
    use crate::testing::{
        collocation_corpus, memory_source, phrase_pipeline, recording_flow, RecordingQueue,
        UnreachableQueue,
    };
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::path::Path;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn flow_in(dir: &Path, config: CorpusflowConfig) -> (Corpusflow, InMemoryTaskQueue, Arc<RecordingQueue>) {
        let (flow, queue, recorder) = recording_flow(config.with_storage_root(dir));
        flow.register_source(Arc::new(memory_source("A", dir, collocation_corpus(10))));
        (flow, queue, recorder)
    }

    fn texts(stream: DocumentStream) -> Vec<String> {
        stream.map(|doc| doc.unwrap().to_text()).collect()
    }

    fn artifact_files(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    fn with_mode(definition: PipelineDefinition, mode: &str) -> PipelineDefinition {
        let mut definition = definition;
        definition.steps[0]
            .settings
            .insert("mode".to_string(), json!(mode));
        definition
    }

    #[test]
    fn test_invalid_level_rejected_at_build() {
        let dir = TempDir::new().unwrap();
        let (flow, _queue, recorder) = flow_in(dir.path(), CorpusflowConfig::default());

        let err = flow
            .build(&phrase_pipeline("A", 7), RunMode::Batch)
            .err()
            .unwrap();
        match err {
            CorpusflowError::Settings(e) => {
                assert_eq!(e.step_id.as_deref(), Some("phrases_1"));
                assert_eq!(e.key.as_deref(), Some("level"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(recorder.enqueue_count(), 0);
    }

    #[test]
    fn test_preview_is_lazy() {
        let dir = TempDir::new().unwrap();
        let (flow, _queue, recorder) = flow_in(dir.path(), CorpusflowConfig::default());

        let mut stream = flow.build(&phrase_pipeline("A", 2), RunMode::Preview).unwrap();
        assert_eq!(recorder.enqueue_count(), 0);

        stream.next().unwrap().unwrap();
        assert_eq!(recorder.enqueue_count(), 1);
    }

    #[test]
    fn test_preview_passes_tokens_through_and_enqueues_once() {
        let dir = TempDir::new().unwrap();
        let (flow, queue, recorder) = flow_in(dir.path(), CorpusflowConfig::default());
        let definition = phrase_pipeline("A", 2);

        for _ in 0..3 {
            let documents: Vec<_> = flow
                .build(&definition, RunMode::Preview)
                .unwrap()
                .map(Result::unwrap)
                .collect();
            assert_eq!(documents.len(), 30);
            assert!(documents.iter().all(|doc| doc.is_tokenized()));
            assert_eq!(documents[0].to_text(), "w0a new york w0b");
            assert!(documents.iter().all(|doc| !doc.to_text().contains('_')));
        }

        assert_eq!(recorder.enqueue_count(), 1);
        assert_eq!(queue.len(), 1);

        let request = &recorder.requests()[0];
        let fp = fingerprint("A", "text", &definition.steps);
        assert_eq!(request.task, "build_phrases");
        assert_eq!(request.args[1], json!(fp.as_str()));
        assert_eq!(request.metadata.get("fingerprint").map(String::as_str), Some(fp.as_str()));
        assert!(!dir.path().join("A").exists());
    }

    #[test]
    fn test_preview_with_unreachable_queue_still_streams() {
        let dir = TempDir::new().unwrap();
        let queue = Arc::new(UnreachableQueue::new());
        let flow = Corpusflow::new(
            CorpusflowConfig::default().with_storage_root(dir.path()),
            queue.clone(),
        );
        flow.register_source(Arc::new(memory_source("A", dir.path(), collocation_corpus(10))));

        let output = texts(flow.build(&phrase_pipeline("A", 2), RunMode::Preview).unwrap());
        assert_eq!(output.len(), 30);
        assert_eq!(output[2], "new york city w0e");
        assert!(queue.attempts() > 0);
    }

    #[test]
    fn test_batch_level_two() {
        let dir = TempDir::new().unwrap();
        let (flow, _queue, recorder) = flow_in(dir.path(), CorpusflowConfig::default());
        let definition = phrase_pipeline("A", 2);

        let output = texts(flow.build(&definition, RunMode::Batch).unwrap());
        assert_eq!(output.len(), 30);
        assert_eq!(output[0], "w0a new_york w0b");
        assert_eq!(output[1], "w0c machine_learning w0d");
        assert_eq!(output[2], "new_york city w0e");
        assert_eq!(recorder.enqueue_count(), 0);

        let fp = fingerprint("A", "text", &definition.steps);
        assert_eq!(
            artifact_files(&dir.path().join("A")),
            vec![format!("{fp}.phras"), format!("{fp}.phras.1")]
        );
    }

    #[test]
    fn test_batch_level_three_joins_trigrams() {
        let dir = TempDir::new().unwrap();
        let (flow, _queue, _recorder) = flow_in(dir.path(), CorpusflowConfig::default());
        let definition = phrase_pipeline("A", 3);

        let output = texts(flow.build(&definition, RunMode::Batch).unwrap());
        assert_eq!(output[0], "w0a new_york w0b");
        assert_eq!(output[2], "new_york_city w0e");
        assert_eq!(output[29], "new_york_city w9e");

        let fp = fingerprint("A", "text", &definition.steps);
        assert_eq!(
            artifact_files(&dir.path().join("A")),
            vec![
                format!("{fp}.phras"),
                format!("{fp}.phras.1"),
                format!("{fp}.phras.2"),
            ]
        );
    }

    #[test]
    fn test_small_fanout_budget_replays_input() {
        let buffered = TempDir::new().unwrap();
        let replayed = TempDir::new().unwrap();
        let (default_flow, _, _) = flow_in(buffered.path(), CorpusflowConfig::default());
        let (small_flow, _, _) = flow_in(replayed.path(), CorpusflowConfig::default().with_fanout_budget(2));
        let definition = phrase_pipeline("A", 3);

        let expected = texts(default_flow.build(&definition, RunMode::Batch).unwrap());
        let actual = texts(small_flow.build(&definition, RunMode::Batch).unwrap());
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_cached_model_is_reused() {
        let dir = TempDir::new().unwrap();
        let (flow, _queue, recorder) = flow_in(dir.path(), CorpusflowConfig::default());
        let definition = phrase_pipeline("A", 3);

        let first = texts(flow.build(&definition, RunMode::Batch).unwrap());
        let preview = texts(flow.build(&definition, RunMode::Preview).unwrap());
        let second = texts(flow.build(&definition, RunMode::Batch).unwrap());

        assert_eq!(preview, first);
        assert_eq!(second, first);
        assert_eq!(recorder.enqueue_count(), 0);
    }

    #[test]
    fn test_state_transitions() {
        let dir = TempDir::new().unwrap();
        let (flow, queue, _recorder) = flow_in(dir.path(), CorpusflowConfig::default());
        let definition = phrase_pipeline("A", 2);
        let step = PhraseStep::new(Arc::clone(flow.dispatcher()));
        let env = flow.engine().env_for(&definition, 0, RunMode::Preview).unwrap();

        assert_eq!(step.state(&env).unwrap(), PhraseModelState::NoArtifact);
        assert_eq!(step.status(&env).unwrap(), ModelStatus::Unavailable);

        let _ = texts(flow.build(&definition, RunMode::Preview).unwrap());
        assert_eq!(step.state(&env).unwrap(), PhraseModelState::JobActive);
        assert_eq!(step.status(&env).unwrap(), ModelStatus::Queued);

        assert_eq!(queue.run_pending(), 1);
        assert_eq!(step.state(&env).unwrap(), PhraseModelState::ArtifactReady);
        assert_eq!(step.status(&env).unwrap(), ModelStatus::Ok);

        let output = texts(flow.build(&definition, RunMode::Preview).unwrap());
        assert_eq!(output[0], "w0a new_york w0b");
    }

    #[test]
    fn test_append_mode() {
        let dir = TempDir::new().unwrap();
        let (flow, _queue, _recorder) = flow_in(dir.path(), CorpusflowConfig::default());
        let definition = with_mode(phrase_pipeline("A", 2), "append");

        let output = texts(flow.build(&definition, RunMode::Batch).unwrap());
        assert_eq!(output[0], "w0a new york w0b new_york");
        assert_eq!(output[1], "w0c machine learning w0d machine_learning");

        let cached = texts(flow.build(&definition, RunMode::Preview).unwrap());
        assert_eq!(cached, output);
    }

    #[test]
    fn test_replace_mode() {
        let dir = TempDir::new().unwrap();
        let (flow, _queue, _recorder) = flow_in(dir.path(), CorpusflowConfig::default());
        let definition = with_mode(phrase_pipeline("A", 3), "replace");

        let output = texts(flow.build(&definition, RunMode::Batch).unwrap());
        assert_eq!(output[0], "new_york");
        assert_eq!(output[1], "machine_learning");
        assert_eq!(output[2], "new_york_city");
    }

    #[test]
    fn test_output_is_text_in_batch() {
        let dir = TempDir::new().unwrap();
        let (flow, _queue, _recorder) = flow_in(dir.path(), CorpusflowConfig::default());

        let document = flow
            .build(&phrase_pipeline("A", 2), RunMode::Batch)
            .unwrap()
            .next()
            .unwrap()
            .unwrap();
        assert!(matches!(document.content, Content::Text(_)));
    }

    #[test]
    fn test_stale_level_without_marker_is_recomputed() {
        let dir = TempDir::new().unwrap();
        let (flow, _queue, _recorder) = flow_in(dir.path(), CorpusflowConfig::default());
        let definition = phrase_pipeline("A", 2);
        let fp = fingerprint("A", "text", &definition.steps);
        let base = dir.path().join("A");
        std::fs::create_dir_all(&base).unwrap();
        std::fs::write(base.join(format!("{fp}.phras.1")), b"half a model").unwrap();

        let cache = ArtifactCache::new(dir.path());
        assert!(cache.prefix_exists(&base, &fp, PHRASE_ARTIFACT_KIND));
        assert!(!cache.exists(&base, &fp, PHRASE_ARTIFACT_KIND));

        let output = texts(flow.build(&definition, RunMode::Batch).unwrap());
        assert_eq!(output[0], "w0a new_york w0b");
        assert!(base.join(format!("{fp}.phras")).exists());
        assert!(cache.exists(&base, &fp, PHRASE_ARTIFACT_KIND));
        let levels = cache
            .load_levels::<PhraseModel>(&base, &fp, PHRASE_ARTIFACT_KIND)
            .unwrap();
        assert_eq!(levels.len(), 1);
    }

    #[test]
    fn test_fingerprint_normalizes_settings() {
        let dir = TempDir::new().unwrap();
        let (flow, _queue, _recorder) = flow_in(dir.path(), CorpusflowConfig::default());
        let with_settings = |pairs: &[(&str, serde_json::Value)]| {
            let step = pairs.iter().fold(
                StepDescriptor::new("phrases", "phrases_1"),
                |step, (key, value)| step.with_setting(*key, value.clone()),
            );
            let definition = PipelineDefinition::new("A", "text").with_step(step);
            flow.fingerprint(&definition, "phrases_1").unwrap()
        };

        let bare = with_settings(&[]);
        let explicit = with_settings(&[
            ("mode", json!("tokenize")),
            ("level", json!(2)),
            ("min_count", json!(5)),
            ("threshold", json!(10.0)),
            ("scoring", json!("default")),
        ]);
        assert_eq!(bare, explicit);
        assert_eq!(with_settings(&[("threshold", json!(10))]), bare);
        assert_eq!(with_settings(&[("schema_position", json!(4))]), bare);
        assert_ne!(with_settings(&[("level", json!(3))]), bare);

        let fixture = phrase_pipeline("A", 2);
        assert_eq!(
            flow.fingerprint(&fixture, "phrases_1").unwrap(),
            fingerprint("A", "text", &fixture.steps)
        );
    }

    #[test]
    fn test_loosely_spelled_settings_share_one_artifact() {
        let dir = TempDir::new().unwrap();
        let (flow, queue, recorder) = flow_in(dir.path(), CorpusflowConfig::default());
        let loose = PipelineDefinition::new("A", "text").with_step(
            StepDescriptor::new("phrases", "phrases_1")
                .with_setting("min_count", json!(3))
                .with_setting("threshold", json!(1)),
        );
        let canonical = phrase_pipeline("A", 2);
        let fp = flow.fingerprint(&canonical, "phrases_1").unwrap();
        assert_eq!(flow.fingerprint(&loose, "phrases_1").unwrap(), fp);

        let _ = texts(flow.build(&loose, RunMode::Preview).unwrap());
        assert_eq!(recorder.requests()[0].args[1], json!(fp.as_str()));

        assert_eq!(queue.run_pending(), 1);
        assert_eq!(queue.jobs()[0].status, crate::core::JobStatus::Finished);

        let output = texts(flow.build(&canonical, RunMode::Preview).unwrap());
        assert_eq!(output[0], "w0a new_york w0b");
        assert_eq!(recorder.enqueue_count(), 1);
    }

    #[test]
    fn test_words_containing_delimiter_are_not_phrases() {
        let dir = TempDir::new().unwrap();
        let (flow, _queue, _recorder) = flow_in(dir.path(), CorpusflowConfig::default());
        let mut corpus = collocation_corpus(10);
        corpus.push("use snake_case names".to_string());
        flow.register_source(Arc::new(memory_source("B", dir.path(), corpus)));

        let append = with_mode(phrase_pipeline("B", 2), "append");
        let output = texts(flow.build(&append, RunMode::Batch).unwrap());
        assert_eq!(output[30], "use snake_case names");
        assert_eq!(output[0], "w0a new york w0b new_york");

        let replace = with_mode(phrase_pipeline("B", 2), "replace");
        let output = texts(flow.build(&replace, RunMode::Batch).unwrap());
        assert_eq!(output[30], "");
    }
}
