use crate::replacer::AmbiguityPolicy;
use serde::Deserialize;
use std::fmt;

#[derive(Debug, Deserialize, Default, Clone)]
pub struct PatchConfig {
    #[serde(default)]
    pub meta: Metadata,
    #[serde(default)]
    pub patches: Vec<PatchDefinition>,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct Metadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Resolve patch file paths against the workspace root
    #[serde(default)]
    pub workspace_relative: bool,
}

/// One anchor-delimited block replacement against one file.
#[derive(Debug, Deserialize, Clone)]
pub struct PatchDefinition {
    pub id: String,
    pub file: String,
    pub span: SpanQuery,
    /// Literal text that replaces the matched span, anchors included
    pub replacement: String,
    /// Substring whose occurrence delta is reported as a sanity diagnostic
    #[serde(default)]
    pub marker: Option<String>,
    #[serde(default)]
    pub on_ambiguous: AmbiguousAction,
}

/// The anchor pair delimiting the span to replace.
#[derive(Debug, Deserialize, Clone)]
pub struct SpanQuery {
    pub start_anchor: String,
    pub end_anchor: String,
}

/// What to do when the anchor pair matches more than one span.
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum AmbiguousAction {
    /// Refuse to patch (default)
    #[default]
    Fail,
    /// Patch the first span and report the match count
    First,
}

impl AmbiguousAction {
    pub fn policy(self) -> AmbiguityPolicy {
        match self {
            AmbiguousAction::Fail => AmbiguityPolicy::Fail,
            AmbiguousAction::First => AmbiguityPolicy::First,
        }
    }
}

impl PatchConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        if self.patches.is_empty() {
            issues.push(ValidationIssue::EmptyPatchList);
        }

        for patch in &self.patches {
            if patch.id.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    patch_id: None,
                    field: "id",
                });
            }
            if patch.file.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    patch_id: Some(patch.id.clone()),
                    field: "file",
                });
            }
            if patch.span.start_anchor.is_empty() {
                issues.push(ValidationIssue::MissingField {
                    patch_id: Some(patch.id.clone()),
                    field: "span.start_anchor",
                });
            }
            if patch.span.end_anchor.is_empty() {
                issues.push(ValidationIssue::MissingField {
                    patch_id: Some(patch.id.clone()),
                    field: "span.end_anchor",
                });
            }
            // An empty replacement makes already-applied detection
            // meaningless; block deletion still needs a placeholder comment.
            if patch.replacement.is_empty() {
                issues.push(ValidationIssue::MissingField {
                    patch_id: Some(patch.id.clone()),
                    field: "replacement",
                });
            }
            if let Some(marker) = &patch.marker {
                if marker.is_empty() {
                    issues.push(ValidationIssue::InvalidValue {
                        patch_id: Some(patch.id.clone()),
                        message: "marker must not be empty".to_string(),
                    });
                }
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, issue) in self.issues.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone)]
pub enum ValidationIssue {
    EmptyPatchList,
    MissingField {
        patch_id: Option<String>,
        field: &'static str,
    },
    InvalidValue {
        patch_id: Option<String>,
        message: String,
    },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::EmptyPatchList => write!(f, "patch file contains no patches"),
            ValidationIssue::MissingField { patch_id, field } => match patch_id {
                Some(id) => write!(f, "patch '{id}' missing required field '{field}'"),
                None => write!(f, "patch missing required field '{field}'"),
            },
            ValidationIssue::InvalidValue { patch_id, message } => match patch_id {
                Some(id) => write!(f, "patch '{id}' has invalid configuration: {message}"),
                None => write!(f, "invalid patch configuration: {message}"),
            },
        }
    }
}
