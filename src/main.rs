use anchor_patcher::config::{
    apply_patches, check_patches, load_from_path, ApplicationError, PatchResult,
};
use anchor_patcher::edit::EditResult;
use anchor_patcher::replacer::{replace_block, AmbiguityPolicy, MarkerDelta};
use anchor_patcher::span::{closest_line, MatchError, SpanMatcher};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use similar::{ChangeTag, TextDiff};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Parser)]
#[command(name = "anchor-patcher")]
#[command(about = "Targeted source-text patching with anchor-delimited block replacement", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replace one anchor-delimited block in one file
    Replace {
        /// File to patch
        #[arg(short, long)]
        file: PathBuf,

        /// Literal text marking the start of the block
        #[arg(long)]
        start: String,

        /// Literal text marking the end of the block
        #[arg(long)]
        end: String,

        /// Replacement text (anchors included)
        #[arg(short, long, conflicts_with = "replacement_file")]
        replacement: Option<String>,

        /// Read the replacement text from a file
        #[arg(long)]
        replacement_file: Option<PathBuf>,

        /// Report the occurrence delta of this substring after patching
        #[arg(short, long)]
        marker: Option<String>,

        /// Replace the first span when the anchor pair matches several
        #[arg(long)]
        allow_multiple: bool,

        /// Dry run - show what would change without modifying the file
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Show unified diff of changes
        #[arg(short, long)]
        diff: bool,
    },

    /// Apply patch definition files to a workspace
    Apply {
        /// Path to workspace root (defaults to current directory)
        #[arg(short, long)]
        workspace: Option<PathBuf>,

        /// Specific patch file to apply (otherwise applies all in patches/)
        #[arg(short, long)]
        patches: Option<PathBuf>,

        /// Dry run - show what would be changed without modifying files
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Show unified diff of changes
        #[arg(short, long)]
        diff: bool,
    },

    /// Check status of patches without applying
    Check {
        /// Path to workspace root (defaults to current directory)
        #[arg(short, long)]
        workspace: Option<PathBuf>,

        /// Specific patch file to check
        #[arg(short, long)]
        patches: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Replace {
            file,
            start,
            end,
            replacement,
            replacement_file,
            marker,
            allow_multiple,
            dry_run,
            diff,
        } => cmd_replace(
            file,
            start,
            end,
            replacement,
            replacement_file,
            marker,
            allow_multiple,
            dry_run,
            diff,
        ),

        Commands::Apply {
            workspace,
            patches,
            dry_run,
            diff,
        } => cmd_apply(workspace, patches, dry_run, diff),

        Commands::Check { workspace, patches } => cmd_check(workspace, patches),
    }
}

/// Resolve workspace path: explicit flag, then environment, then cwd.
fn resolve_workspace(cli_workspace: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = cli_workspace {
        return path
            .canonicalize()
            .with_context(|| format!("workspace not accessible: {}", path.display()));
    }

    if let Ok(env_path) = env::var("ANCHOR_PATCHER_WORKSPACE") {
        let path = PathBuf::from(&env_path);
        if path.exists() {
            return Ok(path.canonicalize()?);
        }
        eprintln!(
            "{}",
            format!(
                "Warning: ANCHOR_PATCHER_WORKSPACE is set but path doesn't exist: {}",
                env_path
            )
            .yellow()
        );
    }

    Ok(env::current_dir()?)
}

/// Discover all .toml patch files in `<workspace>/patches`.
fn discover_patch_files(workspace: &Path) -> Result<Vec<PathBuf>> {
    let patches_dir = workspace.join("patches");

    if !patches_dir.exists() {
        anyhow::bail!("no patches directory at {}", patches_dir.display());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(&patches_dir).max_depth(1) {
        let entry = entry?;
        if entry.file_type().is_file()
            && entry.path().extension().and_then(|s| s.to_str()) == Some("toml")
        {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort();

    if files.is_empty() {
        anyhow::bail!("no .toml patch files found in {}", patches_dir.display());
    }

    Ok(files)
}

/// Show unified diff between original and modified content.
fn display_diff(file: &Path, original: &str, modified: &str) {
    println!(
        "\n{}",
        format!("--- {} (original)", file.display()).dimmed()
    );
    println!("{}", format!("+++ {} (patched)", file.display()).dimmed());

    let diff = TextDiff::from_lines(original, modified);

    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => format!("-{}", change).red(),
            ChangeTag::Insert => format!("+{}", change).green(),
            ChangeTag::Equal => format!(" {}", change).normal(),
        };
        print!("{}", sign);
    }
    println!();
}

/// Human-readable marker diagnostic ("N references removed").
fn marker_line(delta: &MarkerDelta) -> String {
    let removed = delta.removed();
    if removed >= 0 {
        format!("removed {} {:?} reference(s)", removed, delta.marker)
    } else {
        format!("added {} {:?} reference(s)", -removed, delta.marker)
    }
}

/// Explain a failed match, with a fuzzy suggestion for drifted anchors.
fn report_match_failure(err: &MatchError, content: &str) {
    match err {
        MatchError::StartAnchorNotFound { anchor } => {
            eprintln!("{} start anchor not found: {:?}", "✗".red(), anchor);
            if let Some((line_no, line)) = closest_line(content, anchor) {
                eprintln!("  closest line ({}): {}", line_no, line.dimmed());
            }
        }
        MatchError::EndAnchorNotFound { anchor, start } => {
            eprintln!(
                "{} end anchor not found after byte {}: {:?}",
                "✗".red(),
                start,
                anchor
            );
            if let Some((line_no, line)) = closest_line(content, anchor) {
                eprintln!("  closest line ({}): {}", line_no, line.dimmed());
            }
        }
        MatchError::AmbiguousMatch { count } => {
            eprintln!(
                "{} anchor pair matched {} spans, expected exactly 1",
                "✗".red(),
                count
            );
            eprintln!("  use --allow-multiple to patch the first span anyway");
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn cmd_replace(
    file: PathBuf,
    start: String,
    end: String,
    replacement: Option<String>,
    replacement_file: Option<PathBuf>,
    marker: Option<String>,
    allow_multiple: bool,
    dry_run: bool,
    show_diff: bool,
) -> Result<()> {
    if start.is_empty() || end.is_empty() {
        anyhow::bail!("anchors must not be empty");
    }

    let replacement = match (replacement, replacement_file) {
        (Some(text), None) => text,
        (None, Some(path)) => fs::read_to_string(&path)
            .with_context(|| format!("failed to read replacement from {}", path.display()))?,
        _ => anyhow::bail!("exactly one of --replacement or --replacement-file is required"),
    };

    let content = fs::read_to_string(&file)
        .with_context(|| format!("failed to read {}", file.display()))?;

    let matcher = SpanMatcher::new(&start, &end);
    let policy = if allow_multiple {
        AmbiguityPolicy::First
    } else {
        AmbiguityPolicy::Fail
    };

    let outcome = match replace_block(&content, &matcher, &replacement, marker.as_deref(), policy)
    {
        Ok(outcome) => outcome,
        Err(err) => {
            report_match_failure(&err, &content);
            eprintln!("  file left unmodified: {}", file.display());
            std::process::exit(1);
        }
    };

    if show_diff {
        display_diff(&file, &content, &outcome.new_text);
    }

    if dry_run {
        println!(
            "{} would replace {} bytes in {}",
            "✓".green(),
            outcome.replacement.original.len(),
            file.display()
        );
    } else {
        match outcome.replacement.to_edit(&file).apply()? {
            EditResult::Applied { .. } => println!(
                "{} replaced {} bytes in {}",
                "✓".green(),
                outcome.replacement.original.len(),
                file.display()
            ),
            EditResult::AlreadyApplied { .. } => println!(
                "{} already applied, {} unchanged",
                "⊙".yellow(),
                file.display()
            ),
        }
    }

    if outcome.matches > 1 {
        println!(
            "{}",
            format!(
                "  note: anchor pair matched {} spans; only the first was replaced",
                outcome.matches
            )
            .yellow()
        );
    }

    if let Some(delta) = &outcome.marker {
        println!("  {}", marker_line(delta));
    }

    Ok(())
}

fn cmd_apply(
    workspace: Option<PathBuf>,
    patches: Option<PathBuf>,
    dry_run: bool,
    show_diff: bool,
) -> Result<()> {
    let workspace = resolve_workspace(workspace)?;

    let patch_files = if let Some(path) = patches {
        vec![path]
    } else {
        discover_patch_files(&workspace)?
    };

    println!("Workspace: {}", workspace.display());
    println!();

    let mut total_applied = 0;
    let mut total_already_applied = 0;
    let mut total_failed = 0;

    for patch_file in patch_files {
        println!("Loading patches from {}...", patch_file.display());

        let config = load_from_path(&patch_file)?;

        // Capture target contents before applying, for diff output.
        let mut contents_before: HashMap<PathBuf, String> = HashMap::new();
        if show_diff && !dry_run {
            for patch in &config.patches {
                let target = if config.meta.workspace_relative {
                    workspace.join(&patch.file)
                } else {
                    PathBuf::from(&patch.file)
                };
                if let Ok(content) = fs::read_to_string(&target) {
                    contents_before.insert(target, content);
                }
            }
        }

        let results = if dry_run {
            println!("{}", "  [DRY RUN - no files will be modified]".cyan());
            check_patches(&config, &workspace)
        } else {
            apply_patches(&config, &workspace)
        };

        for (patch_id, result) in results {
            match result {
                Ok(PatchResult::Applied {
                    ref file,
                    matches,
                    ref marker,
                }) => {
                    let verb = if dry_run { "Would apply to" } else { "Applied to" };
                    println!("{} {}: {} {}", "✓".green(), patch_id, verb, file.display());
                    if matches > 1 {
                        println!(
                            "{}",
                            format!("    anchor pair matched {} spans; first replaced", matches)
                                .yellow()
                        );
                    }
                    if let Some(delta) = marker {
                        println!("    {}", marker_line(delta));
                    }
                    total_applied += 1;

                    if show_diff && !dry_run {
                        if let (Some(before), Ok(after)) =
                            (contents_before.get(file), fs::read_to_string(file))
                        {
                            if before != &after {
                                display_diff(file, before, &after);
                            }
                        }
                    }
                }
                Ok(PatchResult::AlreadyApplied { file }) => {
                    println!(
                        "{} {}: Already applied to {}",
                        "⊙".yellow(),
                        patch_id,
                        file.display()
                    );
                    total_already_applied += 1;
                }
                Ok(PatchResult::Failed { file, reason }) => {
                    eprintln!("{} {}: Failed - {}", "✗".red(), patch_id, reason);
                    eprintln!("  File: {}", file.display());
                    total_failed += 1;
                }
                Err(e) => {
                    eprintln!("{} {}: Error - {}", "✗".red(), patch_id, e);
                    total_failed += 1;

                    if let ApplicationError::Match { file, source } = &e {
                        if let Ok(content) = fs::read_to_string(file) {
                            report_match_failure(source, &content);
                        }
                        eprintln!("  Possible causes:");
                        eprintln!("    - File was already patched by hand");
                        eprintln!("    - Anchor text drifted from the patch definition");
                    }
                }
            }
        }

        println!();
    }

    println!("{}", "Summary:".bold());
    println!("  {} applied", format!("{}", total_applied).green());
    println!(
        "  {} already applied",
        format!("{}", total_already_applied).yellow()
    );
    println!("  {} failed", format!("{}", total_failed).red());

    if total_failed > 0 {
        std::process::exit(1);
    }

    Ok(())
}

fn cmd_check(workspace: Option<PathBuf>, patches: Option<PathBuf>) -> Result<()> {
    let workspace = resolve_workspace(workspace)?;

    let patch_files = if let Some(path) = patches {
        vec![path]
    } else {
        discover_patch_files(&workspace)?
    };

    println!("{}", "Patch Status Report".bold());
    println!("Workspace: {}", workspace.display());
    println!();

    let mut applied = Vec::new();
    let mut pending = Vec::new();
    let mut failed = Vec::new();

    for patch_file in patch_files {
        let config = load_from_path(&patch_file)?;
        let results = check_patches(&config, &workspace);

        for (patch_id, result) in results {
            match result {
                Ok(PatchResult::Applied { .. }) => pending.push(patch_id),
                Ok(PatchResult::AlreadyApplied { .. }) => applied.push(patch_id),
                Ok(PatchResult::Failed { reason, .. }) => failed.push((patch_id, reason)),
                Err(e) => failed.push((patch_id, e.to_string())),
            }
        }
    }

    if !applied.is_empty() {
        println!(
            "{} {} ({} patches)",
            "✓".green(),
            "APPLIED".green().bold(),
            applied.len()
        );
        for id in &applied {
            println!("  - {}", id);
        }
        println!();
    }

    if !pending.is_empty() {
        println!(
            "{} {} ({} patches)",
            "⊙".yellow(),
            "PENDING".yellow().bold(),
            pending.len()
        );
        for id in &pending {
            println!("  - {}", id);
        }
        println!();
    }

    if !failed.is_empty() {
        println!(
            "{} {} ({} patches)",
            "✗".red(),
            "FAILED".red().bold(),
            failed.len()
        );
        for (id, reason) in &failed {
            println!("  - {} ({})", id, reason.dimmed());
        }
        println!();
    }

    if !failed.is_empty() {
        std::process::exit(1);
    }

    Ok(())
}
