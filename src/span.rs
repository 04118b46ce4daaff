use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MatchError {
    #[error("start anchor {anchor:?} not found")]
    StartAnchorNotFound { anchor: String },

    #[error("no end anchor {anchor:?} after start anchor at byte {start}")]
    EndAnchorNotFound { anchor: String, start: usize },

    #[error("anchor pair matched {count} spans, expected exactly 1")]
    AmbiguousMatch { count: usize },
}

/// A matched span within source text.
///
/// Byte offsets always fall on char boundaries because anchors are matched
/// as substrings of the source `&str`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpanMatch {
    /// Starting byte offset (inclusive) - first byte of the start anchor
    pub byte_start: usize,
    /// Ending byte offset (exclusive) - one past the last byte of the end anchor
    pub byte_end: usize,
    /// The matched text, both anchors included
    pub text: String,
}

impl SpanMatch {
    pub fn len(&self) -> usize {
        self.byte_end - self.byte_start
    }

    pub fn is_empty(&self) -> bool {
        self.byte_start == self.byte_end
    }
}

/// Span rule delimited by a literal start/end anchor pair.
///
/// A span runs from the first byte of the start anchor through the last byte
/// of the *first* end anchor occurring after it (shortest-match). Subsequent
/// spans are searched from the end of the previous one, so reported spans
/// never overlap.
///
/// Anchors are matched byte-exactly; no pattern syntax is interpreted. Empty
/// anchors never match.
///
/// # Example
///
/// ```
/// use anchor_patcher::span::SpanMatcher;
///
/// let matcher = SpanMatcher::new("// begin", "// end");
/// let m = matcher.find_unique("a\n// begin\nbody\n// end\nb").unwrap();
/// assert!(m.text.starts_with("// begin"));
/// assert!(m.text.ends_with("// end"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpanMatcher {
    start_anchor: String,
    end_anchor: String,
}

impl SpanMatcher {
    pub fn new(start_anchor: impl Into<String>, end_anchor: impl Into<String>) -> Self {
        Self {
            start_anchor: start_anchor.into(),
            end_anchor: end_anchor.into(),
        }
    }

    pub fn start_anchor(&self) -> &str {
        &self.start_anchor
    }

    pub fn end_anchor(&self) -> &str {
        &self.end_anchor
    }

    /// Find all non-overlapping spans in `source`, in order.
    pub fn find_all(&self, source: &str) -> Vec<SpanMatch> {
        if self.start_anchor.is_empty() || self.end_anchor.is_empty() {
            return Vec::new();
        }

        let mut spans = Vec::new();
        let mut at = 0;

        while let Some(offset) = source[at..].find(&self.start_anchor) {
            let start = at + offset;
            // End anchor must begin strictly after the start anchor's text
            let search_from = start + self.start_anchor.len();
            let Some(end_offset) = source[search_from..].find(&self.end_anchor) else {
                break;
            };
            let end = search_from + end_offset + self.end_anchor.len();
            spans.push(SpanMatch {
                byte_start: start,
                byte_end: end,
                text: source[start..end].to_string(),
            });
            at = end;
        }

        spans
    }

    /// Find exactly one span.
    pub fn find_unique(&self, source: &str) -> Result<SpanMatch, MatchError> {
        let spans = self.find_all(source);

        match spans.len() {
            0 => Err(self.no_match_error(source)),
            1 => Ok(spans.into_iter().next().expect("len checked == 1")),
            n => Err(MatchError::AmbiguousMatch { count: n }),
        }
    }

    /// Find the first span, along with the total number of spans found.
    ///
    /// Callers that tolerate ambiguity use this to act on the first span
    /// while still surfacing the full match count.
    pub fn find_first(&self, source: &str) -> Result<(SpanMatch, usize), MatchError> {
        let spans = self.find_all(source);
        let count = spans.len();

        match spans.into_iter().next() {
            Some(span) => Ok((span, count)),
            None => Err(self.no_match_error(source)),
        }
    }

    /// Report which anchor failed to resolve.
    ///
    /// An end anchor that occurs only *before* the start anchor is still a
    /// missing end anchor: the span rule only looks forward.
    fn no_match_error(&self, source: &str) -> MatchError {
        if self.start_anchor.is_empty() {
            return MatchError::StartAnchorNotFound {
                anchor: self.start_anchor.clone(),
            };
        }
        match source.find(&self.start_anchor) {
            None => MatchError::StartAnchorNotFound {
                anchor: self.start_anchor.clone(),
            },
            Some(start) => MatchError::EndAnchorNotFound {
                anchor: self.end_anchor.clone(),
                start,
            },
        }
    }
}

/// Minimum similarity for a line to count as an anchor suggestion.
const SUGGESTION_THRESHOLD: f64 = 0.6;

/// Find the line in `source` most similar to a drifted anchor.
///
/// Returns the 1-based line number and the line text when some line clears
/// the similarity threshold. Used for diagnostics only; never affects
/// matching.
pub fn closest_line(source: &str, anchor: &str) -> Option<(usize, String)> {
    let needle = anchor.lines().next().unwrap_or(anchor).trim();
    if needle.is_empty() {
        return None;
    }

    let mut best: Option<(f64, usize, &str)> = None;
    for (idx, line) in source.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let score = strsim::normalized_levenshtein(needle, trimmed);
        if score >= SUGGESTION_THRESHOLD && best.map_or(true, |(s, _, _)| score > s) {
            best = Some((score, idx + 1, trimmed));
        }
    }

    best.map(|(_, line_no, text)| (line_no, text.to_string()))
}
