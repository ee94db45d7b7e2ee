//! Conversion between schema paths and store keys.
//!
//! A schema leaf is addressed by its flattened path, the dot-joined list of
//! segments leading to it (`limits.http.max_body`). Inside the store every
//! key is prefixed with its namespace: `<namespace>.<flattened path>`.

use crate::SchemaError;

pub const PATH_SEPARATOR: char = '.';

/// Matches one or more trailing tokens in a watch pattern
pub const WILDCARD_TAIL: &str = ">";

/// Matches exactly one token in a watch pattern
pub const WILDCARD_TOKEN: &str = "*";

/// Validates a single path segment.
///
/// Segments must be non-empty and must not contain the separator, wildcard
/// tokens or whitespace, since any of those would change how the store
/// splits or matches the physical key.
pub fn validate_segment(
    path: &str,
    segment: &str,
) -> Result<(), SchemaError> {
    let invalid = segment.is_empty()
        || segment.contains(PATH_SEPARATOR)
        || segment.contains('*')
        || segment.contains('>')
        || segment.chars().any(char::is_whitespace);

    if invalid {
        return Err(SchemaError::InvalidSegment {
            path: path.to_string(),
            segment: segment.to_string(),
        });
    }
    Ok(())
}

/// Joins segments into a flattened path.
pub fn join_path<I, S>(segments: I) -> Result<String, SchemaError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let segments: Vec<S> = segments.into_iter().collect();
    if segments.is_empty() {
        return Err(SchemaError::EmptyPath);
    }

    let joined = segments
        .iter()
        .map(|s| s.as_ref())
        .collect::<Vec<_>>()
        .join(".");
    for segment in &segments {
        validate_segment(&joined, segment.as_ref())?;
    }
    Ok(joined)
}

/// Splits a flattened path into its segments, validating each one.
pub fn split_path(path: &str) -> Result<Vec<&str>, SchemaError> {
    if path.is_empty() {
        return Err(SchemaError::EmptyPath);
    }
    let segments: Vec<&str> = path.split(PATH_SEPARATOR).collect();
    for segment in &segments {
        validate_segment(path, segment)?;
    }
    Ok(segments)
}

pub fn validate_namespace(namespace: &str) -> Result<(), SchemaError> {
    let valid = !namespace.is_empty()
        && namespace
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid {
        return Err(SchemaError::InvalidNamespace(namespace.to_string()));
    }
    Ok(())
}

/// Returns true if `key` is matched by a dot-tokenized watch pattern.
///
/// `*` matches exactly one token, a trailing `>` matches one or more tokens.
pub fn pattern_matches(
    pattern: &str,
    key: &str,
) -> bool {
    let mut key_tokens = key.split(PATH_SEPARATOR);
    let mut pattern_tokens = pattern.split(PATH_SEPARATOR).peekable();

    while let Some(p) = pattern_tokens.next() {
        if p == WILDCARD_TAIL && pattern_tokens.peek().is_none() {
            return key_tokens.next().is_some();
        }
        match key_tokens.next() {
            Some(k) if p == WILDCARD_TOKEN || p == k => continue,
            _ => return false,
        }
    }
    key_tokens.next().is_none()
}

/// Key codec bound to one namespace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPathCodec {
    namespace: String,
    prefix: String,
}

impl KeyPathCodec {
    pub fn new(namespace: impl Into<String>) -> Result<Self, SchemaError> {
        let namespace = namespace.into();
        validate_namespace(&namespace)?;
        let prefix = format!("{namespace}{PATH_SEPARATOR}");
        Ok(Self { namespace, prefix })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Physical store key for a flattened path
    pub fn to_key(
        &self,
        path: &str,
    ) -> String {
        format!("{}{}", self.prefix, path)
    }

    /// Flattened path for a physical key, or `None` if the key belongs to
    /// another namespace.
    pub fn to_path<'a>(
        &self,
        key: &'a str,
    ) -> Option<&'a str> {
        key.strip_prefix(self.prefix.as_str()).filter(|p| !p.is_empty())
    }

    /// Pattern matching every key of the namespace at any depth
    pub fn watch_pattern(&self) -> String {
        format!("{}{}", self.prefix, WILDCARD_TAIL)
    }

    /// Extracts the namespace a namespace-wide watch pattern refers to.
    pub fn namespace_of_pattern(pattern: &str) -> Option<&str> {
        pattern
            .strip_suffix(WILDCARD_TAIL)
            .and_then(|p| p.strip_suffix(PATH_SEPARATOR))
            .filter(|ns| validate_namespace(ns).is_ok())
    }
}
