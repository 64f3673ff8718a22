//! Purpose: Discover the subordinate archives a primary archive declares and materialize them.
//! Exports: `declared_subordinates`, `extract_subordinates`, `Extraction`, `SubordinateOutcome`.
//! Role: Builds the subordinate half of a resolution chain during resolver construction.
//! Invariants: Extraction target is always `cache_dir/<normalized token>`; reruns replace it.
//! Invariants: A failing token is recorded and dropped; it never aborts the remaining tokens.
//! Invariants: Opened archives keep declaration order.
use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};

use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::core::archive::{Archive, Layer};
use crate::core::error::{Error, ErrorKind};
use crate::core::layout::Layout;
use crate::core::manifest::Manifest;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// No entry under the bundle prefix carries this token.
    NotBundled,
    /// The token would resolve outside the cache directory.
    UnsafeName,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SubordinateStatus {
    Opened,
    ExtractionFailed { reason: String },
    OpenFailed { reason: String },
    Skipped { reason: SkipReason },
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct SubordinateOutcome {
    pub token: String,
    pub target: Option<PathBuf>,
    #[serde(flatten)]
    pub status: SubordinateStatus,
}

impl SubordinateOutcome {
    pub fn is_opened(&self) -> bool {
        matches!(self.status, SubordinateStatus::Opened)
    }
}

#[derive(Debug, Default)]
pub struct Extraction {
    pub archives: Vec<Archive>,
    pub outcomes: Vec<SubordinateOutcome>,
}

/// Normalized tokens declared by a primary manifest, in declaration order.
///
/// The first declaration section present wins even when it lacks the dependency key.
pub fn declared_subordinates(manifest: Option<&Manifest>, layout: &Layout) -> Vec<String> {
    let Some(manifest) = manifest else {
        return Vec::new();
    };
    let Some(section) = layout
        .declaration_sections()
        .iter()
        .find_map(|name| manifest.section(name))
    else {
        return Vec::new();
    };
    let Some(list) = section.get(layout.dependency_key()) else {
        return Vec::new();
    };
    list.split_whitespace()
        .map(|token| layout.normalize_token(token))
        .collect()
}

pub fn extract_subordinates(primary: &dyn Layer, cache_dir: &Path, layout: &Layout) -> Extraction {
    let tokens = declared_subordinates(primary.manifest(), layout);
    let mut extraction = Extraction::default();
    if tokens.is_empty() {
        debug!(archive = %primary.origin().display(), "no subordinate archives declared");
        return extraction;
    }

    for token in tokens {
        let (outcome, archive) = extract_one(primary, cache_dir, layout, token);
        if let Some(archive) = archive {
            extraction.archives.push(archive);
        }
        extraction.outcomes.push(outcome);
    }
    extraction
}

fn extract_one(
    primary: &dyn Layer,
    cache_dir: &Path,
    layout: &Layout,
    token: String,
) -> (SubordinateOutcome, Option<Archive>) {
    if !is_contained_name(&token) {
        warn!(token = %token, "subordinate name escapes the cache directory; skipping");
        let outcome = SubordinateOutcome {
            token,
            target: None,
            status: SubordinateStatus::Skipped {
                reason: SkipReason::UnsafeName,
            },
        };
        return (outcome, None);
    }

    let target = cache_dir.join(&token);
    let entry = layout.bundle_entry_path(&token);
    if !primary.has_entry(&entry) {
        debug!(token = %token, entry = %entry, "declared subordinate is not bundled; skipping");
        let outcome = SubordinateOutcome {
            token,
            target: Some(target),
            status: SubordinateStatus::Skipped {
                reason: SkipReason::NotBundled,
            },
        };
        return (outcome, None);
    }

    if let Err(err) = materialize(primary, &entry, &target) {
        warn!(
            token = %token,
            path = %target.display(),
            error = %err,
            "subordinate extraction failed; dropping from chain"
        );
        let outcome = SubordinateOutcome {
            token,
            target: Some(target),
            status: SubordinateStatus::ExtractionFailed {
                reason: err.to_string(),
            },
        };
        return (outcome, None);
    }

    match Archive::open(&target) {
        Ok(archive) => {
            info!(token = %token, path = %target.display(), "subordinate archive opened");
            let outcome = SubordinateOutcome {
                token,
                target: Some(target),
                status: SubordinateStatus::Opened,
            };
            (outcome, Some(archive))
        }
        Err(err) => {
            warn!(
                token = %token,
                path = %target.display(),
                error = %err,
                "subordinate archive could not be opened; dropping from chain"
            );
            let outcome = SubordinateOutcome {
                token,
                target: Some(target),
                status: SubordinateStatus::OpenFailed {
                    reason: err.to_string(),
                },
            };
            (outcome, None)
        }
    }
}

// Stage next to the target and rename over it: readers holding the previous file keep a valid mapping.
fn materialize(primary: &dyn Layer, entry: &str, target: &Path) -> Result<(), Error> {
    let parent = target.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(|err| Error::from_io(err).with_path(parent))?;

    let mut staging =
        NamedTempFile::new_in(parent).map_err(|err| Error::from_io(err).with_path(parent))?;
    let copied = primary.copy_entry(entry, staging.as_file_mut())?;
    if copied.is_none() {
        return Err(Error::new(ErrorKind::NotFound)
            .with_message("bundled entry vanished during extraction")
            .with_name(entry));
    }
    staging
        .as_file_mut()
        .flush()
        .map_err(|err| Error::from_io(err).with_path(target))?;
    staging
        .persist(target)
        .map_err(|err| Error::from_io(err.error).with_path(target))?;
    Ok(())
}

fn is_contained_name(token: &str) -> bool {
    !token.is_empty()
        && Path::new(token)
            .components()
            .all(|component| matches!(component, Component::Normal(_)))
}

#[cfg(test)]
mod tests {
    use super::{
        SkipReason, SubordinateStatus, declared_subordinates, extract_subordinates,
    };
    use crate::core::archive::{Archive, Layer};
    use crate::core::layout::Layout;
    use crate::core::manifest::Manifest;
    use crate::core::test_support::{ZipFixture, declaring_manifest, manifest_text};

    fn subordinate(entry: &str, body: &str) -> Vec<u8> {
        ZipFixture::new().entry(entry, body).build()
    }

    fn parse(text: &str) -> Manifest {
        Manifest::parse(text.as_bytes()).expect("manifest")
    }

    #[test]
    fn declarations_prefer_the_current_section() {
        let layout = Layout::default();
        let text = manifest_text(
            "",
            &[
                ("staf/service/", "Packaged-Jars: legacy\n"),
                ("staf/service/info", "Packaged-Jars: alpha beta.jar  GAMMA.JAR\n"),
            ],
        );
        assert_eq!(
            declared_subordinates(Some(&parse(&text)), &layout),
            vec!["alpha.jar", "beta.jar", "GAMMA.JAR"]
        );
    }

    #[test]
    fn declarations_fall_back_to_the_legacy_section() {
        let layout = Layout::default();
        let text = manifest_text("", &[("staf/service/", "Packaged-Jars: legacy\n")]);
        assert_eq!(
            declared_subordinates(Some(&parse(&text)), &layout),
            vec!["legacy.jar"]
        );
    }

    #[test]
    fn continued_declaration_after_a_repeated_key_is_read_whole() {
        let layout = Layout::default();
        let text = manifest_text(
            "",
            &[(
                "staf/service/info",
                "Packaged-Jars: old\nService-Class: Demo\nPackaged-Jars: alpha be\n ta\n",
            )],
        );
        assert_eq!(
            declared_subordinates(Some(&parse(&text)), &layout),
            vec!["alpha.jar", "beta.jar"]
        );
    }

    #[test]
    fn missing_declarations_yield_nothing() {
        let layout = Layout::default();
        assert!(declared_subordinates(None, &layout).is_empty());

        let no_section = manifest_text("Packaged-Jars: alpha\n", &[]);
        assert!(declared_subordinates(Some(&parse(&no_section)), &layout).is_empty());

        // The current section is chosen even without the key; the legacy one is not consulted.
        let keyless = manifest_text(
            "",
            &[
                ("staf/service/info", "Service-Class: Demo\n"),
                ("staf/service/", "Packaged-Jars: legacy\n"),
            ],
        );
        assert!(declared_subordinates(Some(&parse(&keyless)), &layout).is_empty());
    }

    #[test]
    fn extraction_records_each_outcome_in_order() {
        let cache = tempfile::tempdir().expect("tempdir");
        let primary_bytes = ZipFixture::new()
            .manifest(declaring_manifest("good broken missing ../evil"))
            .entry("STAF-INF/jars/good.jar", subordinate("pkg/A.class", "a"))
            .entry("STAF-INF/jars/broken.jar", "not a zip at all")
            .build();
        let primary = Archive::from_bytes("/virtual/primary.jar", primary_bytes).expect("primary");

        let extraction = extract_subordinates(&primary, cache.path(), &Layout::default());

        assert_eq!(extraction.archives.len(), 1);
        assert_eq!(
            extraction.archives[0].origin(),
            cache.path().join("good.jar").as_path()
        );
        let statuses: Vec<_> = extraction
            .outcomes
            .iter()
            .map(|outcome| (outcome.token.as_str(), outcome.status.clone()))
            .collect();
        assert_eq!(statuses[0], ("good.jar", SubordinateStatus::Opened));
        assert_eq!(statuses[1].0, "broken.jar");
        assert!(matches!(statuses[1].1, SubordinateStatus::OpenFailed { .. }));
        assert_eq!(
            statuses[2],
            (
                "missing.jar",
                SubordinateStatus::Skipped {
                    reason: SkipReason::NotBundled
                }
            )
        );
        assert_eq!(
            statuses[3],
            (
                "../evil.jar",
                SubordinateStatus::Skipped {
                    reason: SkipReason::UnsafeName
                }
            )
        );
        assert!(extraction.outcomes[3].target.is_none());
        assert!(!cache.path().join("missing.jar").exists());
    }

    #[test]
    fn extraction_failure_drops_only_that_token() {
        let cache = tempfile::tempdir().expect("tempdir");
        // A directory squatting on the target path makes the final rename fail.
        std::fs::create_dir(cache.path().join("blocked.jar")).expect("squat");
        let primary_bytes = ZipFixture::new()
            .manifest(declaring_manifest("blocked after"))
            .entry("STAF-INF/jars/blocked.jar", subordinate("a.txt", "a"))
            .entry("STAF-INF/jars/after.jar", subordinate("b.txt", "b"))
            .build();
        let primary = Archive::from_bytes("/virtual/primary.jar", primary_bytes).expect("primary");

        let extraction = extract_subordinates(&primary, cache.path(), &Layout::default());

        assert!(matches!(
            extraction.outcomes[0].status,
            SubordinateStatus::ExtractionFailed { .. }
        ));
        assert!(extraction.outcomes[1].is_opened());
        assert_eq!(extraction.archives.len(), 1);
        assert!(extraction.archives[0].has_entry("b.txt"));
    }

    #[test]
    fn reextraction_replaces_the_cached_copy() {
        let cache = tempfile::tempdir().expect("tempdir");
        let layout = Layout::default();

        for body in ["first", "second"] {
            let primary_bytes = ZipFixture::new()
                .manifest(declaring_manifest("dep"))
                .entry("STAF-INF/jars/dep.jar", subordinate("v.txt", body))
                .build();
            let primary =
                Archive::from_bytes("/virtual/primary.jar", primary_bytes).expect("primary");
            let extraction = extract_subordinates(&primary, cache.path(), &layout);
            assert_eq!(
                extraction.archives[0].read_entry("v.txt").expect("read").as_deref(),
                Some(body.as_bytes())
            );
        }

        let files: Vec<_> = std::fs::read_dir(cache.path())
            .expect("read dir")
            .map(|entry| entry.expect("entry").file_name())
            .collect();
        assert_eq!(files, vec![std::ffi::OsString::from("dep.jar")]);
    }

    #[test]
    fn missing_cache_directory_is_created() {
        let root = tempfile::tempdir().expect("tempdir");
        let cache = root.path().join("nested").join("cache");
        let primary_bytes = ZipFixture::new()
            .manifest(declaring_manifest("dep"))
            .entry("STAF-INF/jars/dep.jar", subordinate("v.txt", "v"))
            .build();
        let primary = Archive::from_bytes("/virtual/primary.jar", primary_bytes).expect("primary");

        let extraction = extract_subordinates(&primary, &cache, &Layout::default());
        assert_eq!(extraction.archives.len(), 1);
        assert!(cache.join("dep.jar").is_file());
    }
}
