//! On-disk cache of leveled, fingerprint-addressed artifacts.
//!
//! An artifact of kind `K` for fingerprint `F` under a data source's storage
//! directory consists of level files `F.K.1 .. F.K.N`, applied in ascending
//! order, and a completion marker `F.K` written after the last level. Files
//! are written to a hidden temporary name and renamed into place, so a crash
//! never leaves a truncated file under a final name.

mod manifest;
mod model;

pub use manifest::{level_file_name, marker_file_name, ArtifactManifest};
pub use model::{apply_levels, LeveledModel};

use crate::core::{Content, Sentence};
use crate::errors::ArtifactError;
use crate::fingerprint::Fingerprint;
use crate::pipeline::DocumentStream;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Artifact kind for phrase models.
pub const PHRASE_ARTIFACT_KIND: &str = "phras";

/// File-backed artifact cache.
///
/// The cache never deletes files. Writers racing on the same fingerprint
/// produce identical content, so the last rename wins harmlessly.
#[derive(Debug, Clone)]
pub struct ArtifactCache {
    storage_root: PathBuf,
}

impl ArtifactCache {
    /// Creates a cache rooted at `storage_root`.
    ///
    /// The root is only used by [`ArtifactCache::locate`]; every other
    /// operation takes the data source's own base path.
    #[must_use]
    pub fn new(storage_root: impl Into<PathBuf>) -> Self {
        Self {
            storage_root: storage_root.into(),
        }
    }

    /// Returns the storage root.
    #[must_use]
    pub fn storage_root(&self) -> &Path {
        &self.storage_root
    }

    /// Returns true when a completed artifact exists.
    ///
    /// Level files without a completion marker count as absent.
    #[must_use]
    pub fn exists(&self, base_path: &Path, fingerprint: &Fingerprint, kind: &str) -> bool {
        match self.manifest(base_path, fingerprint, kind) {
            Ok(Some(manifest)) => {
                let missing = manifest
                    .files
                    .iter()
                    .find(|name| !base_path.join(name).is_file());
                if let Some(name) = missing {
                    tracing::warn!(
                        fingerprint = %fingerprint,
                        kind,
                        file = %name,
                        "Completion marker lists a missing level file"
                    );
                    return false;
                }
                true
            }
            Ok(None) => {
                if self.prefix_exists(base_path, fingerprint, kind) {
                    tracing::warn!(
                        fingerprint = %fingerprint,
                        kind,
                        base_path = %base_path.display(),
                        "Partial artifact without completion marker; treating as absent"
                    );
                }
                false
            }
            Err(e) => {
                tracing::warn!(
                    fingerprint = %fingerprint,
                    kind,
                    error = %e,
                    "Unreadable completion marker; treating artifact as absent"
                );
                false
            }
        }
    }

    /// Returns true when any file named `<fingerprint>.<kind>*` exists,
    /// completed or not.
    #[must_use]
    pub fn prefix_exists(&self, base_path: &Path, fingerprint: &Fingerprint, kind: &str) -> bool {
        let prefix = marker_file_name(fingerprint, kind);
        let Ok(entries) = fs::read_dir(base_path) else {
            return false;
        };
        entries
            .filter_map(Result::ok)
            .any(|entry| entry.file_name().to_string_lossy().starts_with(&prefix))
    }

    /// Reads the completion marker, if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the marker exists but cannot be read or parsed.
    pub fn manifest(
        &self,
        base_path: &Path,
        fingerprint: &Fingerprint,
        kind: &str,
    ) -> Result<Option<ArtifactManifest>, ArtifactError> {
        let path = base_path.join(marker_file_name(fingerprint, kind));
        if !path.is_file() {
            return Ok(None);
        }
        let file = File::open(&path).map_err(|e| ArtifactError::io(&path, e))?;
        let manifest: ArtifactManifest = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| ArtifactError::format(&path, e))?;
        if manifest.fingerprint != *fingerprint || manifest.kind != kind {
            return Err(ArtifactError::format(
                &path,
                "completion marker belongs to a different artifact",
            ));
        }
        Ok(Some(manifest))
    }

    /// Saves one level of an artifact.
    ///
    /// Previously written levels are never touched; a failure leaves at most
    /// a hidden temporary file behind.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be written.
    pub fn save<M: LeveledModel>(
        &self,
        base_path: &Path,
        fingerprint: &Fingerprint,
        kind: &str,
        level: u32,
        model: &M,
    ) -> Result<PathBuf, ArtifactError> {
        let name = level_file_name(fingerprint, kind, level);
        let path = write_atomically(base_path, &name, |writer| model.write_to(writer))?;
        tracing::debug!(
            fingerprint = %fingerprint,
            kind,
            level,
            path = %path.display(),
            "Saved artifact level"
        );
        Ok(path)
    }

    /// Writes the completion marker for `levels` saved levels.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactError::MissingLevel`] if a level file is absent,
    /// or an IO error if the marker cannot be written.
    pub fn mark_complete(
        &self,
        base_path: &Path,
        fingerprint: &Fingerprint,
        kind: &str,
        levels: u32,
    ) -> Result<ArtifactManifest, ArtifactError> {
        let manifest = ArtifactManifest::new(fingerprint.clone(), kind, levels);
        let marker = marker_file_name(fingerprint, kind);
        for (level, name) in (1..).zip(&manifest.files) {
            if !base_path.join(name).is_file() {
                return Err(ArtifactError::MissingLevel {
                    path: base_path.join(&marker),
                    level,
                });
            }
        }

        write_atomically(base_path, &marker, |writer| {
            serde_json::to_writer_pretty(writer, &manifest).map_err(std::io::Error::from)
        })?;
        tracing::info!(fingerprint = %fingerprint, kind, levels, "Artifact complete");
        Ok(manifest)
    }

    /// Loads every level of a completed artifact, lowest level first.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactError::NotFound`] without a completion marker, or
    /// an error if any level is missing or unreadable.
    pub fn load_levels<M: LeveledModel>(
        &self,
        base_path: &Path,
        fingerprint: &Fingerprint,
        kind: &str,
    ) -> Result<Vec<M>, ArtifactError> {
        let manifest =
            self.manifest(base_path, fingerprint, kind)?
                .ok_or_else(|| ArtifactError::NotFound {
                    base: base_path.to_path_buf(),
                    name: marker_file_name(fingerprint, kind),
                })?;

        (1..)
            .zip(&manifest.files)
            .map(|(level, name)| {
                let path = base_path.join(name);
                let file = File::open(&path).map_err(|e| match e.kind() {
                    std::io::ErrorKind::NotFound => ArtifactError::MissingLevel {
                        path: base_path.join(marker_file_name(fingerprint, kind)),
                        level,
                    },
                    _ => ArtifactError::io(&path, e),
                })?;
                M::read_from(&mut BufReader::new(file)).map_err(|e| ArtifactError::format(&path, e))
            })
            .collect()
    }

    /// Loads the artifact and rewrites each tokenized document through all
    /// levels in order. Documents keep their metadata and their position.
    ///
    /// Levels are loaded eagerly so a broken artifact fails here rather
    /// than mid-stream.
    ///
    /// # Errors
    ///
    /// See [`ArtifactCache::load_levels`].
    pub fn apply_stream<M: LeveledModel>(
        &self,
        base_path: &Path,
        fingerprint: &Fingerprint,
        kind: &str,
        tokens: DocumentStream,
    ) -> Result<DocumentStream, ArtifactError> {
        let levels = Arc::new(self.load_levels::<M>(base_path, fingerprint, kind)?);
        tracing::debug!(fingerprint = %fingerprint, kind, levels = levels.len(), "Applying cached artifact");
        Ok(apply_models(levels, tokens))
    }

    /// Like [`ArtifactCache::apply_stream`], then re-joins the tokens into
    /// document text.
    ///
    /// # Errors
    ///
    /// See [`ArtifactCache::load_levels`].
    pub fn load_and_apply<M: LeveledModel>(
        &self,
        base_path: &Path,
        fingerprint: &Fingerprint,
        kind: &str,
        tokens: DocumentStream,
    ) -> Result<DocumentStream, ArtifactError> {
        let stream = self.apply_stream::<M>(base_path, fingerprint, kind, tokens)?;
        Ok(Box::new(stream.map(|result| {
            result.map(|document| {
                let text = document.to_text();
                document.with_content(Content::Text(text))
            })
        })))
    }

    /// Finds the data-source directory holding a completed artifact for a
    /// bare fingerprint.
    ///
    /// Looks in the storage root itself and its immediate subdirectories.
    #[must_use]
    pub fn locate(&self, fingerprint: &Fingerprint, kind: &str) -> Option<PathBuf> {
        if self.exists(&self.storage_root, fingerprint, kind) {
            return Some(self.storage_root.clone());
        }
        let entries = fs::read_dir(&self.storage_root).ok()?;
        entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.is_dir())
            .find(|dir| self.exists(dir, fingerprint, kind))
    }
}

/// Applies `levels` to every document of `tokens`, lazily.
pub(crate) fn apply_models<M: LeveledModel>(
    levels: Arc<Vec<M>>,
    tokens: DocumentStream,
) -> DocumentStream {
    Box::new(tokens.map(move |result| {
        result.map(|document| {
            let sentences: Vec<Sentence> = match &document.content {
                Content::Sentences(sentences) => sentences
                    .iter()
                    .map(|sentence| apply_levels(&levels, sentence.clone()))
                    .collect(),
                Content::Text(text) => {
                    let words = text.split_whitespace().map(str::to_string).collect();
                    vec![apply_levels(&levels, words)]
                }
            };
            document.with_content(Content::Sentences(sentences))
        })
    }))
}

/// Writes `name` under `dir` through a hidden temporary file and a rename.
fn write_atomically<F>(dir: &Path, name: &str, write: F) -> Result<PathBuf, ArtifactError>
where
    F: FnOnce(&mut dyn Write) -> std::io::Result<()>,
{
    fs::create_dir_all(dir).map_err(|e| ArtifactError::io(dir, e))?;

    let target = dir.join(name);
    let temp = dir.join(format!(".{name}.{}.tmp", uuid::Uuid::new_v4().simple()));

    let result = (|| {
        let file = File::create(&temp)?;
        let mut writer = BufWriter::new(file);
        write(&mut writer)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        drop(writer);
        fs::rename(&temp, &target)
    })();

    if let Err(e) = result {
        let _ = fs::remove_file(&temp);
        return Err(ArtifactError::io(&target, e));
    }
    Ok(target)
}
