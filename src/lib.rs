//! yamlex - extended YAML loading
//!
//! Documents are plain YAML with three additions:
//! - `$name` / `${name}` placeholders in strings, bound from the process
//!   environment, `__DIR__`, caller parameters and the document's own
//!   top-level `variables` mapping (which may come after its uses)
//! - `!include path name=value ...` splices in another document
//! - `!script command` splices in the YAML a shell command prints
//!
//! ```no_run
//! use yamlex::{dump, load, Bindings};
//!
//! let mut params = Bindings::new();
//! params.insert("PLATFORM".into(), "x86-64-generic".into());
//! let config = load("installer.yml", &params)?;
//! println!("{}", dump(&config)?);
//! # Ok::<(), yamlex::LoadError>(())
//! ```

mod directive;
pub mod dump;
pub mod error;
pub mod loader;
pub mod node;
pub mod options;
mod parse;
mod queue;
pub mod scope;
pub mod template;

use std::fs;
use std::path::Path;

use tracing::instrument;

pub use directive::IncludeDirective;
pub use dump::{dump, to_value};
pub use error::{FixSuggestion, LoadError};
pub use loader::Loader;
pub use node::{LazyScalar, Mapping, Node, Scalar, ScalarState, TaggedNode};
pub use options::LoadOptions;
pub use scope::{Bindings, Scope, DIR_VARIABLE};

/// Load a document with the default (strict) options
pub fn load(path: impl AsRef<Path>, params: &Bindings) -> Result<Node, LoadError> {
    load_with(path, params, &LoadOptions::default())
}

/// Load a document and resolve it completely.
///
/// The root scope is seeded with the process environment, `__DIR__` (the
/// absolute directory of `path`) and `params`, in increasing priority.
#[instrument(skip_all, fields(path = %path.as_ref().display()))]
pub fn load_with(
    path: impl AsRef<Path>,
    params: &Bindings,
    options: &LoadOptions,
) -> Result<Node, LoadError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|e| LoadError::io(path, e))?;
    let absolute = fs::canonicalize(path).map_err(|e| LoadError::io(path, e))?;
    let base_dir = absolute.parent().unwrap_or(Path::new("/"));

    let loader = Loader::from_variables(
        seed_variables(base_dir, params),
        path.display().to_string(),
        base_dir,
        options.clone(),
    );
    finish(loader.load_str(&text)?)
}

/// Load a document from memory; `base_dir` stands in for the file's directory
pub fn load_str(
    text: &str,
    base_dir: impl AsRef<Path>,
    params: &Bindings,
    options: &LoadOptions,
) -> Result<Node, LoadError> {
    let base_dir = base_dir.as_ref();
    let loader = Loader::from_variables(
        seed_variables(base_dir, params),
        "<string>",
        base_dir,
        options.clone(),
    );
    finish(loader.load_str(text)?)
}

fn finish(mut tree: Node) -> Result<Node, LoadError> {
    tree.collapse();
    Ok(tree)
}

/// Environment, then `__DIR__`, then caller parameters
fn seed_variables(base_dir: &Path, params: &Bindings) -> Bindings {
    let mut variables: Bindings = std::env::vars_os()
        .filter_map(|(name, value)| Some((name.into_string().ok()?, value.into_string().ok()?)))
        .collect();
    variables.insert(DIR_VARIABLE.to_string(), base_dir.display().to_string());
    variables.extend(params.iter().map(|(k, v)| (k.clone(), v.clone())));
    variables
}
