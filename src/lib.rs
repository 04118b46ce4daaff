//! Anchor Patcher: targeted source-text patching
//!
//! Locates a block of text delimited by a start/end anchor pair, replaces
//! it with new literal content, and reports how many occurrences of a
//! tracked marker substring changed.
//!
//! # Architecture
//!
//! Matching and application are separate layers. [`span::SpanMatcher`]
//! resolves the anchor pair to a byte span with shortest-match semantics;
//! [`replacer::replace_block`] is the pure `(text, rule) -> text'`
//! transform; [`Edit`] carries a verified byte-span replacement out to disk.
//! Patch definitions ([`config`]) are TOML files mapping onto the same
//! three layers.
//!
//! # Safety
//!
//! - A failed match is a hard error naming the anchor that did not resolve;
//!   there is no silent no-op path
//! - An ambiguous anchor pair fails by default; opting into first-match
//!   still reports the full match count
//! - Edits verify the expected before-text and write atomically
//!   (tempfile + fsync + rename), so the target is never left truncated
//! - Patch targets are checked against the workspace boundary
//!
//! # Example
//!
//! ```
//! use anchor_patcher::replacer::{replace_block, AmbiguityPolicy};
//! use anchor_patcher::span::SpanMatcher;
//!
//! let matcher = SpanMatcher::new("// begin", "// end");
//! let outcome = replace_block(
//!     "keep\n// begin\nold\n// end\nkeep",
//!     &matcher,
//!     "// replaced",
//!     None,
//!     AmbiguityPolicy::Fail,
//! )
//! .unwrap();
//!
//! assert_eq!(outcome.new_text, "keep\n// replaced\nkeep");
//! ```

pub mod config;
pub mod edit;
pub mod replacer;
pub mod safety;
pub mod span;

// Re-exports
pub use config::{
    apply_patches, check_patches, load_from_path, load_from_str, ApplicationError, ConfigError,
    PatchConfig, PatchResult,
};
pub use edit::{Edit, EditError, EditResult, EditVerification};
pub use replacer::{replace_block, AmbiguityPolicy, MarkerDelta, PatchOutcome, Replacement};
pub use safety::{SafetyError, WorkspaceGuard};
pub use span::{MatchError, SpanMatch, SpanMatcher};
