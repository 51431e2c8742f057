//! Completion marker for leveled artifacts.

use crate::fingerprint::Fingerprint;
use serde::{Deserialize, Serialize};

/// Written as `<fingerprint>.<kind>` after every level file is in place.
///
/// An artifact without a manifest is incomplete, whatever level files are
/// on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactManifest {
    /// The fingerprint the artifact belongs to.
    pub fingerprint: Fingerprint,
    /// The artifact kind (e.g. `"phras"`).
    pub kind: String,
    /// Number of levels, numbered from 1.
    pub levels: u32,
    /// Level file names in application order.
    pub files: Vec<String>,
    /// When the artifact was completed (ISO 8601).
    pub created_at: String,
}

impl ArtifactManifest {
    /// Creates a manifest for `levels` level files.
    #[must_use]
    pub fn new(fingerprint: Fingerprint, kind: impl Into<String>, levels: u32) -> Self {
        let kind = kind.into();
        let files = (1..=levels)
            .map(|level| level_file_name(&fingerprint, &kind, level))
            .collect();
        Self {
            fingerprint,
            kind,
            levels,
            files,
            created_at: crate::utils::iso_timestamp(),
        }
    }
}

/// Name of the completion marker: `<fingerprint>.<kind>`.
#[must_use]
pub fn marker_file_name(fingerprint: &Fingerprint, kind: &str) -> String {
    format!("{fingerprint}.{kind}")
}

/// Name of one level file: `<fingerprint>.<kind>.<level>`.
#[must_use]
pub fn level_file_name(fingerprint: &Fingerprint, kind: &str, level: u32) -> String {
    format!("{fingerprint}.{kind}.{level}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::fingerprint;

    #[test]
    fn test_names() {
        let fp = fingerprint("A", "text", &[]);
        assert_eq!(marker_file_name(&fp, "phras"), format!("{fp}.phras"));
        assert_eq!(level_file_name(&fp, "phras", 2), format!("{fp}.phras.2"));
    }

    #[test]
    fn test_manifest_lists_levels_in_order() {
        let fp = fingerprint("A", "text", &[]);
        let manifest = ArtifactManifest::new(fp.clone(), "phras", 3);
        assert_eq!(
            manifest.files,
            vec![
                format!("{fp}.phras.1"),
                format!("{fp}.phras.2"),
                format!("{fp}.phras.3"),
            ]
        );
    }
}
