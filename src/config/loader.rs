use crate::config::schema::{PatchConfig, ValidationError};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Toml {
        path: Option<PathBuf>,
        source: toml_edit::de::Error,
    },
    Validation {
        path: Option<PathBuf>,
        source: ValidationError,
    },
}

impl ConfigError {
    fn with_path(self, path: &Path) -> Self {
        let path = path.to_path_buf();
        match self {
            ConfigError::Toml { path: None, source } => ConfigError::Toml {
                path: Some(path),
                source,
            },
            ConfigError::Validation { path: None, source } => ConfigError::Validation {
                path: Some(path),
                source,
            },
            other => other,
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "failed to read patch file {}: {}", path.display(), source)
            }
            ConfigError::Toml { path, source } => match path {
                Some(path) => {
                    write!(f, "failed to parse patch file ({}): {}", path.display(), source)
                }
                None => write!(f, "failed to parse patch file: {}", source),
            },
            ConfigError::Validation { path, source } => match path {
                Some(path) => write!(f, "invalid patch file ({}): {}", path.display(), source),
                None => write!(f, "invalid patch file: {}", source),
            },
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Toml { source, .. } => Some(source),
            ConfigError::Validation { source, .. } => Some(source),
        }
    }
}

pub fn load_from_str(input: &str) -> Result<PatchConfig, ConfigError> {
    let config: PatchConfig = toml_edit::de::from_str(input)
        .map_err(|source| ConfigError::Toml { path: None, source })?;
    config
        .validate()
        .map_err(|source| ConfigError::Validation { path: None, source })?;
    Ok(config)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<PatchConfig, ConfigError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    load_from_str(&contents).map_err(|error| error.with_path(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::AmbiguousAction;

    const EXAMPLE: &str = r#"
[meta]
name = "membership-routes"
description = "Redirect federated joins through make_join"
workspace_relative = true

[[patches]]
id = "redirect-invite-join"
file = "routes/RoomMembershipRoutes.kt"
replacement = "// rewritten block"
marker = "inviterServer"

[patches.span]
start_anchor = "// If user has a pending invite"
end_anchor = "// For local joins (no invite), check if room exists"
"#;

    #[test]
    fn loads_patch_file() {
        let config = load_from_str(EXAMPLE).unwrap();

        assert_eq!(config.meta.name, "membership-routes");
        assert!(config.meta.workspace_relative);
        assert_eq!(config.patches.len(), 1);

        let patch = &config.patches[0];
        assert_eq!(patch.id, "redirect-invite-join");
        assert_eq!(patch.marker.as_deref(), Some("inviterServer"));
        assert_eq!(patch.on_ambiguous, AmbiguousAction::Fail);
        assert!(patch.span.end_anchor.contains("local joins"));
    }

    #[test]
    fn rejects_malformed_toml() {
        let err = load_from_str("[[patches]\nid = ").unwrap_err();
        assert!(matches!(err, ConfigError::Toml { .. }));
    }

    #[test]
    fn rejects_invalid_config() {
        let err = load_from_str("[meta]\nname = \"empty\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Validation { .. }));
    }

    #[test]
    fn load_from_path_reports_missing_file() {
        let err = load_from_path("/nonexistent/patches.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn on_ambiguous_first_parses() {
        let input = EXAMPLE.replace(
            "marker = \"inviterServer\"",
            "marker = \"inviterServer\"\non_ambiguous = \"first\"",
        );
        let config = load_from_str(&input).unwrap();
        assert_eq!(config.patches[0].on_ambiguous, AmbiguousAction::First);
    }
}
