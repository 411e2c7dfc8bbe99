//! `!include` and `!script` directives
//!
//! Both directives are replaced in the tree by a freshly loaded document:
//! the included file, or whatever the script prints on stdout. The new
//! document is built by a child loader, so it sees the variables of the
//! loader that invoked the directive.
//!
//! Directive arguments are expanded once, when the directive is read. They
//! never go through the deferred queue.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tempfile::NamedTempFile;
use tracing::{debug, instrument};

use crate::error::LoadError;
use crate::loader::Loader;
use crate::node::Node;
use crate::parse::RawNode;
use crate::scope::Bindings;

pub const INCLUDE_TAG: &str = "include";
pub const SCRIPT_TAG: &str = "script";

/// Key of the include mapping form that holds the file name
pub const INCLUDE_PATH_KEY: &str = "=";

/// Arguments of an `!include` directive
#[derive(Debug, Clone, PartialEq)]
pub struct IncludeDirective {
    pub path: String,
    pub overrides: Bindings,
}

impl IncludeDirective {
    /// Read either `path name=value ...` or `{"=": path, name: value, ...}`
    pub(crate) fn parse(loader: &Loader, raw: RawNode) -> Result<Self, LoadError> {
        match raw {
            RawNode::String(text) => {
                let directive = loader.expand_now(INCLUDE_TAG, &text)?;
                Self::parse_inline(&directive).map_err(|details| malformed(loader, details))
            }
            RawNode::Mapping(entries) => {
                let mut path = None;
                let mut overrides = Bindings::new();
                for (key, value) in entries {
                    let RawNode::String(key) = key else {
                        return Err(malformed(
                            loader,
                            format!("keys must be strings, found a {}", key.describe()),
                        ));
                    };
                    let value = match value {
                        RawNode::String(text) => loader.expand_now(INCLUDE_TAG, &text)?,
                        RawNode::Number(n) => n.to_string(),
                        RawNode::Bool(b) => b.to_string(),
                        other => {
                            return Err(malformed(
                                loader,
                                format!("value of '{}' must be a scalar, found a {}", key, other.describe()),
                            ))
                        }
                    };
                    if key == INCLUDE_PATH_KEY {
                        path = Some(value);
                    } else {
                        overrides.insert(key, value);
                    }
                }
                let path = path.ok_or_else(|| {
                    malformed(loader, format!("mapping has no '{}' key for the file name", INCLUDE_PATH_KEY))
                })?;
                Ok(Self { path, overrides })
            }
            other => Err(malformed(
                loader,
                format!("expected a string or a mapping, found a {}", other.describe()),
            )),
        }
    }

    fn parse_inline(directive: &str) -> Result<Self, String> {
        let mut fields = directive.split_whitespace();
        let path = fields
            .next()
            .ok_or_else(|| "missing file name".to_string())?
            .to_string();

        let mut overrides = Bindings::new();
        for option in fields {
            match option.split_once('=') {
                Some((name, value)) => {
                    overrides.insert(name.to_string(), value.to_string());
                }
                None => return Err(format!("'{}' is not a name=value assignment", option)),
            }
        }

        Ok(Self { path, overrides })
    }

    /// File to load: relative paths are taken from the including document's directory
    pub fn resolve_path(&self, base_dir: &Path) -> PathBuf {
        base_dir.join(&self.path)
    }
}

fn malformed(loader: &Loader, details: String) -> LoadError {
    LoadError::IncludeMalformed {
        details,
        from: loader.name().to_string(),
    }
}

/// Replace an `!include` node by the included document
#[instrument(skip_all, fields(from = %loader.name()))]
pub(crate) fn include(loader: &Loader, raw: RawNode) -> Result<Node, LoadError> {
    let directive = IncludeDirective::parse(loader, raw)?;
    let path = directive.resolve_path(loader.base_dir());

    if !path.exists() {
        return Err(LoadError::IncludeNotFound {
            path,
            from: loader.name().to_string(),
        });
    }

    debug!("including {} with {:?}", path.display(), directive.overrides);
    let text = fs::read_to_string(&path).map_err(|e| LoadError::io(&path, e))?;
    let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
    let child = loader.child(directive.overrides, path.display().to_string(), base_dir);
    child.load_str(&text)
}

/// Replace a `!script` node by the document the command prints
#[instrument(skip_all, fields(from = %loader.name()))]
pub(crate) fn script(loader: &Loader, raw: RawNode) -> Result<Node, LoadError> {
    let command = match raw {
        RawNode::String(text) => loader.expand_now(SCRIPT_TAG, &text)?,
        other => {
            return Err(LoadError::ScriptMalformed {
                details: format!("expected a command string, found a {}", other.describe()),
                from: loader.name().to_string(),
            })
        }
    };

    // Removed from disk when dropped, whichever way this function returns.
    let output = run_captured(&command, loader.options().scratch_dir.as_deref())?;
    let text = fs::read_to_string(output.path()).map_err(|e| LoadError::io(output.path(), e))?;

    let child = loader.child(
        Bindings::new(),
        format!("<script: {}>", command),
        loader.base_dir().to_path_buf(),
    );
    child.load_str(&text)
}

/// Run `command` through `sh -c` with stdout captured in a fresh temp file
fn run_captured(command: &str, scratch_dir: Option<&Path>) -> Result<NamedTempFile, LoadError> {
    let dir = scratch_dir
        .map(Path::to_path_buf)
        .unwrap_or_else(std::env::temp_dir);
    let output = tempfile::Builder::new()
        .prefix("yamlex-script-")
        .suffix(".yml")
        .tempfile_in(&dir)
        .map_err(|e| LoadError::io(&dir, e))?;
    let stdout = output
        .reopen()
        .map_err(|e| LoadError::io(output.path(), e))?;

    debug!("running script: {}", command);
    let status = Command::new("sh")
        .arg("-c")
        .arg(command)
        .stdout(Stdio::from(stdout))
        .status()
        .map_err(|source| LoadError::ScriptSpawn {
            command: command.to_string(),
            source,
        })?;

    if !status.success() {
        return Err(LoadError::ScriptExecution {
            command: command.to_string(),
            status: status.code(),
        });
    }

    Ok(output)
}
