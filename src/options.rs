//! Load policies
//!
//! Provides the global switches that apply to a whole load:
//! - Strict or lenient handling of templates that never resolve
//! - Whether scalars are expanded at all
//! - The retry budget of a deferred template
//! - Where script output is captured

use std::path::{Path, PathBuf};

/// Retry budget of a template that cannot be expanded when first read.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Policies for a single call to [`crate::load_with`]
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Fail the load when a template exhausts its retries.
    /// When false the template is kept literally and a warning is logged.
    pub strict: bool,

    /// Expand `$name` placeholders in scalars
    pub expand: bool,

    /// Deferred attempts per template before it counts as exhausted.
    /// With 0 a template that does not expand on first sight is never deferred.
    pub max_retries: u32,

    /// Directory for captured `!script` output (system temp dir when unset)
    pub scratch_dir: Option<PathBuf>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            strict: true,
            expand: true,
            max_retries: DEFAULT_MAX_RETRIES,
            scratch_dir: None,
        }
    }
}

impl LoadOptions {
    /// Keep unexpandable templates verbatim instead of failing
    pub fn lenient() -> Self {
        Self {
            strict: false,
            ..Self::default()
        }
    }

    /// Take every scalar literally
    pub fn literal() -> Self {
        Self {
            expand: false,
            ..Self::default()
        }
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn with_expand(mut self, expand: bool) -> Self {
        self.expand = expand;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_scratch_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.scratch_dir = Some(dir.as_ref().to_path_buf());
        self
    }
}
