//! Patch applicator - runs patch definitions against workspace files.
//!
//! Each patch is a single anchor-delimited block replacement in a single
//! file. Application goes through the safety guard and the verified edit
//! primitive, so a patch either lands atomically or leaves the file as it
//! was. Re-running a patch whose replacement is already in place reports
//! `AlreadyApplied` instead of failing.

use crate::config::schema::{PatchConfig, PatchDefinition};
use crate::edit::{EditError, EditResult};
use crate::replacer::{replace_block, MarkerDelta};
use crate::safety::{SafetyError, WorkspaceGuard};
use crate::span::{MatchError, SpanMatcher};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Result of running a single patch.
#[derive(Debug)]
#[must_use = "PatchResult should be checked for success/failure"]
pub enum PatchResult {
    /// Patch was applied (or, for a read-only check, would apply)
    Applied {
        file: PathBuf,
        /// Spans the anchor pair matched; above 1 only under `on_ambiguous = "first"`
        matches: usize,
        marker: Option<MarkerDelta>,
    },
    /// File already contains the replacement text
    AlreadyApplied { file: PathBuf },
    /// Patch could not run at all
    Failed { file: PathBuf, reason: String },
}

impl fmt::Display for PatchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatchResult::Applied { file, matches, .. } => {
                if *matches > 1 {
                    write!(
                        f,
                        "applied first of {} matches to {}",
                        matches,
                        file.display()
                    )
                } else {
                    write!(f, "applied to {}", file.display())
                }
            }
            PatchResult::AlreadyApplied { file } => {
                write!(f, "already applied to {}", file.display())
            }
            PatchResult::Failed { file, reason } => {
                write!(f, "failed on {}: {}", file.display(), reason)
            }
        }
    }
}

/// Errors during patch application.
#[derive(Debug)]
pub enum ApplicationError {
    /// File unreadable or missing
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Edit application error (verification, UTF-8, write)
    Edit(EditError),
    /// Anchor pair failed to resolve a unique span
    Match { file: PathBuf, source: MatchError },
    /// Target path rejected by the workspace guard
    Safety(SafetyError),
}

impl fmt::Display for ApplicationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApplicationError::Io { path, source } => {
                write!(f, "I/O error on {}: {}", path.display(), source)
            }
            ApplicationError::Edit(e) => write!(f, "edit error: {}", e),
            ApplicationError::Match { file, source } => {
                write!(f, "{} in {}", source, file.display())
            }
            ApplicationError::Safety(e) => write!(f, "unsafe patch target: {}", e),
        }
    }
}

impl std::error::Error for ApplicationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ApplicationError::Io { source, .. } => Some(source),
            ApplicationError::Edit(e) => Some(e),
            ApplicationError::Match { source, .. } => Some(source),
            ApplicationError::Safety(e) => Some(e),
        }
    }
}

impl From<EditError> for ApplicationError {
    fn from(e: EditError) -> Self {
        ApplicationError::Edit(e)
    }
}

impl From<SafetyError> for ApplicationError {
    fn from(e: SafetyError) -> Self {
        ApplicationError::Safety(e)
    }
}

/// Apply every patch in the configuration against a workspace.
///
/// Returns one result per patch, keyed by patch id, in definition order.
/// Patches are independent: a failure in one does not stop the rest.
pub fn apply_patches(
    config: &PatchConfig,
    workspace_root: &Path,
) -> Vec<(String, Result<PatchResult, ApplicationError>)> {
    run_patches(config, workspace_root, false)
}

/// Evaluate patch status without mutating any file.
///
/// Mirrors `apply_patches` result semantics: `Applied` means "would apply".
pub fn check_patches(
    config: &PatchConfig,
    workspace_root: &Path,
) -> Vec<(String, Result<PatchResult, ApplicationError>)> {
    run_patches(config, workspace_root, true)
}

fn run_patches(
    config: &PatchConfig,
    workspace_root: &Path,
    check_only: bool,
) -> Vec<(String, Result<PatchResult, ApplicationError>)> {
    let guard = WorkspaceGuard::new(workspace_root);

    config
        .patches
        .iter()
        .map(|patch| {
            let result = match &guard {
                Ok(guard) => run_one(patch, guard, config.meta.workspace_relative, check_only),
                Err(e) => Ok(PatchResult::Failed {
                    file: PathBuf::from(&patch.file),
                    reason: format!("workspace unusable: {e}"),
                }),
            };
            (patch.id.clone(), result)
        })
        .collect()
}

fn run_one(
    patch: &PatchDefinition,
    guard: &WorkspaceGuard,
    workspace_relative: bool,
    check_only: bool,
) -> Result<PatchResult, ApplicationError> {
    let target = if workspace_relative {
        guard.workspace_root().join(&patch.file)
    } else {
        PathBuf::from(&patch.file)
    };

    if !target.exists() {
        return Err(ApplicationError::Io {
            path: target,
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "file does not exist"),
        });
    }

    let path = guard.validate_path(&target)?;

    let content = fs::read_to_string(&path).map_err(|source| ApplicationError::Io {
        path: path.clone(),
        source,
    })?;

    let matcher = SpanMatcher::new(&patch.span.start_anchor, &patch.span.end_anchor);
    let outcome = match replace_block(
        &content,
        &matcher,
        &patch.replacement,
        patch.marker.as_deref(),
        patch.on_ambiguous.policy(),
    ) {
        Ok(outcome) => outcome,
        Err(
            err @ (MatchError::StartAnchorNotFound { .. } | MatchError::EndAnchorNotFound { .. }),
        ) => {
            // Anchors gone but the new block is present: a previous run
            // already landed this patch.
            if content.contains(&patch.replacement) {
                return Ok(PatchResult::AlreadyApplied { file: path });
            }
            return Err(ApplicationError::Match {
                file: path,
                source: err,
            });
        }
        Err(err) => {
            return Err(ApplicationError::Match {
                file: path,
                source: err,
            })
        }
    };

    if check_only {
        return Ok(PatchResult::Applied {
            file: path,
            matches: outcome.matches,
            marker: outcome.marker,
        });
    }

    guard.revalidate(&path)?;

    match outcome.replacement.to_edit(&path).apply()? {
        EditResult::Applied { .. } => Ok(PatchResult::Applied {
            file: path,
            matches: outcome.matches,
            marker: outcome.marker,
        }),
        EditResult::AlreadyApplied { .. } => Ok(PatchResult::AlreadyApplied { file: path }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::loader::load_from_str;
    use std::fs;

    const SOURCE: &str = "header\n// begin block\nold body ref ref\n// end block\nfooter ref\n";

    fn patch_toml(extra: &str) -> String {
        format!(
            r#"
[meta]
name = "test"
workspace_relative = true

[[patches]]
id = "rewrite-block"
file = "source.txt"
replacement = "new body"
marker = "ref"
{extra}

[patches.span]
start_anchor = "// begin block"
end_anchor = "// end block"
"#
        )
    }

    fn workspace_with_source(content: &str) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("source.txt"), content).unwrap();
        dir
    }

    #[test]
    fn applies_patch_and_reports_marker_delta() {
        let dir = workspace_with_source(SOURCE);
        let config = load_from_str(&patch_toml("")).unwrap();

        let results = apply_patches(&config, dir.path());
        assert_eq!(results.len(), 1);
        let (id, result) = &results[0];
        assert_eq!(id, "rewrite-block");

        match result.as_ref().unwrap() {
            PatchResult::Applied { matches, marker, .. } => {
                assert_eq!(*matches, 1);
                let delta = marker.as_ref().unwrap();
                assert_eq!(delta.removed(), 2);
            }
            other => panic!("expected Applied, got {other:?}"),
        }

        let patched = fs::read_to_string(dir.path().join("source.txt")).unwrap();
        assert_eq!(patched, "header\nnew body\nfooter ref\n");
    }

    #[test]
    fn second_run_reports_already_applied() {
        let dir = workspace_with_source(SOURCE);
        let config = load_from_str(&patch_toml("")).unwrap();

        let first = apply_patches(&config, dir.path());
        assert!(matches!(
            first[0].1.as_ref().unwrap(),
            PatchResult::Applied { .. }
        ));

        let second = apply_patches(&config, dir.path());
        assert!(matches!(
            second[0].1.as_ref().unwrap(),
            PatchResult::AlreadyApplied { .. }
        ));
    }

    #[test]
    fn missing_anchor_is_a_match_error() {
        let dir = workspace_with_source("no anchors at all\n");
        let config = load_from_str(&patch_toml("")).unwrap();

        let results = apply_patches(&config, dir.path());
        match results[0].1.as_ref().unwrap_err() {
            ApplicationError::Match { source, .. } => {
                assert!(matches!(source, MatchError::StartAnchorNotFound { .. }));
            }
            other => panic!("expected Match error, got {other}"),
        }
    }

    #[test]
    fn ambiguous_anchors_fail_by_default() {
        let doubled = format!("{SOURCE}{SOURCE}");
        let dir = workspace_with_source(&doubled);
        let config = load_from_str(&patch_toml("")).unwrap();

        let results = apply_patches(&config, dir.path());
        match results[0].1.as_ref().unwrap_err() {
            ApplicationError::Match { source, .. } => {
                assert_eq!(*source, MatchError::AmbiguousMatch { count: 2 });
            }
            other => panic!("expected Match error, got {other}"),
        }

        // Nothing written on failure
        let content = fs::read_to_string(dir.path().join("source.txt")).unwrap();
        assert_eq!(content, doubled);
    }

    #[test]
    fn first_policy_applies_and_reports_count() {
        let doubled = format!("{SOURCE}{SOURCE}");
        let dir = workspace_with_source(&doubled);
        let config = load_from_str(&patch_toml("on_ambiguous = \"first\"")).unwrap();

        let results = apply_patches(&config, dir.path());
        match results[0].1.as_ref().unwrap() {
            PatchResult::Applied { matches, .. } => assert_eq!(*matches, 2),
            other => panic!("expected Applied, got {other:?}"),
        }
    }

    #[test]
    fn check_does_not_modify_files() {
        let dir = workspace_with_source(SOURCE);
        let config = load_from_str(&patch_toml("")).unwrap();

        let results = check_patches(&config, dir.path());
        assert!(matches!(
            results[0].1.as_ref().unwrap(),
            PatchResult::Applied { .. }
        ));

        let content = fs::read_to_string(dir.path().join("source.txt")).unwrap();
        assert_eq!(content, SOURCE);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_from_str(&patch_toml("")).unwrap();

        let results = apply_patches(&config, dir.path());
        assert!(matches!(
            results[0].1.as_ref().unwrap_err(),
            ApplicationError::Io { .. }
        ));
    }
}
