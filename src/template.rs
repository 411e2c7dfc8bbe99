//! Single-pass template resolver with caching
//!
//! Templates are plain strings with `$name` / `${name}` placeholders and `$$`
//! as an escape for a literal dollar sign. This module:
//! - Tokenizes templates once and caches the result (retries are frequent)
//! - Substitutes all-or-nothing: the first unknown name fails the whole call
//! - Uses Arc for zero-copy sharing of tokenized templates
//!
//! The global cache is never evicted: it holds every distinct template seen
//! by the process, script output included. Long-lived library users that
//! load many unrelated documents should expect it to grow accordingly.

use std::ops::Range;
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;
use thiserror::Error;
use tracing::debug;

use crate::scope::Bindings;

/// Failure of one interpolation attempt
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    /// A placeholder names a variable that is not bound (yet). Recoverable.
    #[error("'{name}' could not be resolved in '{template}'")]
    Unresolved { name: String, template: String },

    /// `$` not followed by `$`, an identifier or `{identifier}`. Never recoverable.
    #[error("invalid placeholder at position {position} in '{template}'")]
    InvalidPlaceholder { position: usize, template: String },
}

/// Anything that can bind a placeholder name to text
pub trait Lookup {
    fn lookup(&self, name: &str) -> Option<String>;
}

impl Lookup for Bindings {
    fn lookup(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

/// Token representing a parsed template fragment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Literal text (stores range in original string)
    Literal(Range<usize>),
    /// `$$`
    Dollar,
    /// `$name` or `${name}`
    Placeholder(String),
}

/// Template resolver with caching
pub struct TemplateResolver {
    /// Cache of parsed templates
    cache: DashMap<String, Arc<Vec<Token>>>,
}

impl Default for TemplateResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateResolver {
    /// Create a new template resolver
    pub fn new() -> Self {
        Self {
            cache: DashMap::new(),
        }
    }

    /// Parse template into tokens (with caching)
    pub fn tokenize(&self, template: &str) -> Result<Arc<Vec<Token>>, TemplateError> {
        if let Some(cached) = self.cache.get(template) {
            return Ok(Arc::clone(&cached));
        }

        let bytes = template.as_bytes();
        let mut tokens = Vec::new();
        let mut literal_start = 0;
        let mut i = 0;

        while i < bytes.len() {
            if bytes[i] != b'$' {
                i += 1;
                continue;
            }

            if i > literal_start {
                tokens.push(Token::Literal(literal_start..i));
            }

            let position = i;
            let invalid = move || TemplateError::InvalidPlaceholder {
                position,
                template: template.to_string(),
            };

            match bytes.get(i + 1) {
                Some(b'$') => {
                    tokens.push(Token::Dollar);
                    i += 2;
                }
                Some(b'{') => {
                    let start = i + 2;
                    let end = scan_identifier(bytes, start);
                    if end == start || bytes.get(end) != Some(&b'}') {
                        return Err(invalid());
                    }
                    tokens.push(Token::Placeholder(template[start..end].to_string()));
                    i = end + 1;
                }
                Some(_) => {
                    let start = i + 1;
                    let end = scan_identifier(bytes, start);
                    if end == start {
                        return Err(invalid());
                    }
                    tokens.push(Token::Placeholder(template[start..end].to_string()));
                    i = end;
                }
                None => return Err(invalid()),
            }

            literal_start = i;
        }

        if literal_start < template.len() {
            tokens.push(Token::Literal(literal_start..template.len()));
        }

        let tokens = Arc::new(tokens);
        self.cache.insert(template.to_string(), Arc::clone(&tokens));
        Ok(tokens)
    }

    /// Substitute every placeholder of `template`.
    ///
    /// `overrides` are consulted before `vars`. Nothing partial is ever
    /// returned: the first name that neither binds fails the call.
    pub fn resolve<L>(
        &self,
        template: &str,
        vars: &L,
        overrides: Option<&Bindings>,
    ) -> Result<String, TemplateError>
    where
        L: Lookup + ?Sized,
    {
        // Plain text is by far the common case; keep it out of the cache.
        if !template.contains('$') {
            return Ok(template.to_string());
        }

        let tokens = self.tokenize(template)?;
        let mut result = String::with_capacity(template.len() * 2);

        for token in tokens.iter() {
            match token {
                Token::Literal(range) => result.push_str(&template[range.clone()]),
                Token::Dollar => result.push('$'),
                Token::Placeholder(name) => {
                    let value = overrides
                        .and_then(|o| o.get(name).cloned())
                        .or_else(|| vars.lookup(name))
                        .ok_or_else(|| TemplateError::Unresolved {
                            name: name.clone(),
                            template: template.to_string(),
                        })?;
                    result.push_str(&value);
                }
            }
        }

        if result != template {
            debug!("substitute {} --> {}", template, result);
        }

        Ok(result)
    }
}

/// End of the identifier starting at `start` (== `start` when there is none)
fn scan_identifier(bytes: &[u8], start: usize) -> usize {
    match bytes.get(start) {
        Some(b) if b.is_ascii_alphabetic() || *b == b'_' => {}
        _ => return start,
    }
    let mut end = start + 1;
    while let Some(b) = bytes.get(end) {
        if b.is_ascii_alphanumeric() || *b == b'_' {
            end += 1;
        } else {
            break;
        }
    }
    end
}

/// Global template resolver instance
pub static TEMPLATE_RESOLVER: Lazy<TemplateResolver> = Lazy::new(TemplateResolver::new);

/// Convenience function for interpolating against the global resolver
pub fn interpolate<L>(
    template: &str,
    vars: &L,
    overrides: Option<&Bindings>,
) -> Result<String, TemplateError>
where
    L: Lookup + ?Sized,
{
    TEMPLATE_RESOLVER.resolve(template, vars, overrides)
}
