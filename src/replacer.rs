use crate::edit::{Edit, EditVerification};
use crate::span::{MatchError, SpanMatcher};
use std::path::PathBuf;

/// How to treat an anchor pair that matches more than one span.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AmbiguityPolicy {
    /// Fail with [`MatchError::AmbiguousMatch`]. The safe default.
    #[default]
    Fail,
    /// Replace the first span. The outcome still carries the total match
    /// count so callers cannot mistake a multi-occurrence edit for a
    /// single-occurrence one.
    First,
}

/// Occurrence counts of a tracked marker substring before and after an edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerDelta {
    pub marker: String,
    pub before: usize,
    pub after: usize,
}

impl MarkerDelta {
    /// Net occurrences removed; negative means the edit added occurrences.
    pub fn removed(&self) -> i64 {
        self.before as i64 - self.after as i64
    }
}

/// A replacement operation with source and target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replacement {
    /// Byte range being replaced
    pub byte_start: usize,
    pub byte_end: usize,
    /// Original text (for verification)
    pub original: String,
    /// New text
    pub replacement: String,
}

impl Replacement {
    /// Convert to an [`Edit`] for the given file path.
    pub fn to_edit(&self, file: impl Into<PathBuf>) -> Edit {
        Edit::with_verification(
            file.into(),
            self.byte_start,
            self.byte_end,
            self.replacement.clone(),
            EditVerification::from_text(&self.original),
        )
    }
}

/// Result of a block replacement on in-memory text.
///
/// Invariant: `new_text` equals the input with exactly the matched span
/// substituted; every byte outside the span is unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "PatchOutcome carries the new text; dropping it discards the edit"]
pub struct PatchOutcome {
    /// The full patched text
    pub new_text: String,
    /// The span that was replaced, as a reusable edit description
    pub replacement: Replacement,
    /// Total number of non-overlapping spans the anchor pair matched
    pub matches: usize,
    /// Marker occurrence counts, when a marker was requested
    pub marker: Option<MarkerDelta>,
}

/// Count non-overlapping occurrences of `needle` in `text`.
pub fn count_occurrences(text: &str, needle: &str) -> usize {
    if needle.is_empty() {
        return 0;
    }
    text.matches(needle).count()
}

/// Replace the anchor-delimited block in `source` with `replacement`.
///
/// This is the whole core of the tool: a pure, single-shot
/// `(text, rule) -> text'` transform. It never touches the file system;
/// persisting the result is the caller's job (see [`Replacement::to_edit`]).
///
/// On any error the caller's text is unaffected and nothing was computed
/// worth keeping - a failed match is an error, never a silent no-op.
pub fn replace_block(
    source: &str,
    matcher: &SpanMatcher,
    replacement: &str,
    marker: Option<&str>,
    policy: AmbiguityPolicy,
) -> Result<PatchOutcome, MatchError> {
    let (span, matches) = match policy {
        AmbiguityPolicy::Fail => matcher.find_unique(source).map(|span| (span, 1))?,
        AmbiguityPolicy::First => matcher.find_first(source)?,
    };

    let mut new_text =
        String::with_capacity(source.len() - span.len() + replacement.len());
    new_text.push_str(&source[..span.byte_start]);
    new_text.push_str(replacement);
    new_text.push_str(&source[span.byte_end..]);

    let marker = marker.filter(|m| !m.is_empty()).map(|m| MarkerDelta {
        marker: m.to_string(),
        before: count_occurrences(source, m),
        after: count_occurrences(&new_text, m),
    });

    Ok(PatchOutcome {
        new_text,
        replacement: Replacement {
            byte_start: span.byte_start,
            byte_end: span.byte_end,
            original: span.text,
            replacement: replacement.to_string(),
        },
        matches,
        marker,
    })
}
