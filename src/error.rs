//! Error types with fix suggestions

use std::path::PathBuf;

use thiserror::Error;

/// Trait for errors that provide fix suggestions
pub trait FixSuggestion {
    fn fix_suggestion(&self) -> Option<&str>;
}

/// Errors surfaced by [`crate::load`].
///
/// A load either returns a fully resolved tree or exactly one of these.
/// Unresolved placeholders that are still being retried never show up here;
/// see [`crate::template::TemplateError`].
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("YAMLEX-001: Cannot read '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("YAMLEX-002: YAML parse error in {name}: {source}")]
    Yaml {
        name: String,
        #[source]
        source: serde_yaml::Error,
    },

    // ─────────────────────────────────────────────────────────────
    // Template errors (YAMLEX-010 to YAMLEX-012)
    // ─────────────────────────────────────────────────────────────
    #[error("YAMLEX-010: Cannot expand template '{template}' in {name} ('{missing}' is never defined)")]
    TemplateExhausted {
        template: String,
        missing: String,
        name: String,
    },

    #[error("YAMLEX-011: Invalid placeholder at position {position} in '{template}' ({name})")]
    InvalidPlaceholder {
        template: String,
        position: usize,
        name: String,
    },

    #[error("YAMLEX-012: Cannot invoke !{directive} '{template}' in {name}: '{missing}' is not defined yet")]
    DirectiveUnresolved {
        directive: &'static str,
        template: String,
        missing: String,
        name: String,
    },

    // ─────────────────────────────────────────────────────────────
    // Include errors (YAMLEX-020 to YAMLEX-021)
    // ─────────────────────────────────────────────────────────────
    #[error("YAMLEX-020: Include file '{}' (from {from}) does not exist", .path.display())]
    IncludeNotFound { path: PathBuf, from: String },

    #[error("YAMLEX-021: Bad include directive in {from}: {details}")]
    IncludeMalformed { details: String, from: String },

    // ─────────────────────────────────────────────────────────────
    // Script errors (YAMLEX-030 to YAMLEX-032)
    // ─────────────────────────────────────────────────────────────
    #[error("YAMLEX-030: Cannot start script '{command}': {source}")]
    ScriptSpawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("YAMLEX-031: Script execution '{command}' failed with {}", exit_label(.status))]
    ScriptExecution {
        command: String,
        status: Option<i32>,
    },

    #[error("YAMLEX-032: Bad script directive in {from}: {details}")]
    ScriptMalformed { details: String, from: String },

    #[error("YAMLEX-040: Cannot serialize document: {0}")]
    Serialize(#[from] serde_yaml::Error),
}

fn exit_label(status: &Option<i32>) -> String {
    match status {
        Some(code) => format!("exit status {}", code),
        None => "no exit status (terminated by signal)".to_string(),
    }
}

impl LoadError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LoadError::Io {
            path: path.into(),
            source,
        }
    }
}

impl FixSuggestion for LoadError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            LoadError::Io { .. } => Some("Check file path and permissions"),
            LoadError::Yaml { .. } => Some("Check YAML syntax: indentation and quoting"),
            LoadError::TemplateExhausted { .. } => Some(
                "Define the name under the top-level variables: mapping, pass it with -D name=value, or export it",
            ),
            LoadError::InvalidPlaceholder { .. } => {
                Some("Use $name or ${name}; write $$ for a literal dollar sign")
            }
            LoadError::DirectiveUnresolved { .. } => Some(
                "Directive arguments are expanded once: use names that are defined before the directive is read",
            ),
            LoadError::IncludeNotFound { .. } => {
                Some("Relative include paths are resolved against the including file's directory")
            }
            LoadError::IncludeMalformed { .. } => {
                Some("Use '!include path name=value ...' or a mapping with an '=' key for the path")
            }
            LoadError::ScriptSpawn { .. } => Some("Check that 'sh' is available on PATH"),
            LoadError::ScriptExecution { .. } => {
                Some("Run the command by hand; it must exit 0 and print YAML on stdout")
            }
            LoadError::ScriptMalformed { .. } => Some("Write the command as a plain string: !script some-command args"),
            LoadError::Serialize(_) => None,
        }
    }
}
