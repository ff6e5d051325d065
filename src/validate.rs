//! Identifier and path validation
//!
//! Every string that ends up in a filesystem path or a subprocess argument
//! passes through here first. All functions are pure except
//! [`resolve_within`], which reads filesystem metadata to follow symlinks.
//!
//! # Security Model
//!
//! - Model ids are checked against an injection denylist, traversal
//!   patterns, and a per-provider allowlist grammar
//! - Names derived from ids are sanitized to `[A-Za-z0-9._-]` before use
//! - Target paths are resolved (symlinks followed) and must land strictly
//!   inside the cache-tier root

use crate::error::{TierError, TierResult};
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// Maximum accepted model id length, in characters
pub const MAX_MODEL_ID_LEN: usize = 256;

/// Maximum sanitized filesystem name length, in characters
pub const MAX_FILENAME_LEN: usize = 255;

/// Characters that carry meaning to a shell
const INJECTION_CHARS: &[char] = &[
    ';', '|', '&', '$', '`', '(', ')', '{', '}', '<', '>', '\n', '\r', '\0',
];

/// Why a model id was rejected
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdRejection {
    #[error("model id cannot be empty")]
    Empty,

    #[error("model id exceeds maximum length of {MAX_MODEL_ID_LEN} characters: {0}")]
    TooLong(usize),

    #[error("model id contains dangerous character {0:?}: potential command injection attempt")]
    DangerousCharacter(char),

    #[error("model id contains path traversal pattern")]
    PathTraversal,

    #[error("invalid {provider} model id format, expected {expected}")]
    InvalidFormat {
        provider: &'static str,
        expected: &'static str,
    },

    #[error("unknown provider {0:?}, supported: huggingface, ollama")]
    UnknownProvider(String),
}

/// Check that `text` cannot walk out of the directory it is joined onto
///
/// Rejects `..` segments under either slash style, absolute Unix paths,
/// drive letters (`C:`), and UNC prefixes (`\\`).
pub fn validate_path_traversal(text: &str) -> bool {
    if text.split(['/', '\\']).any(|segment| segment == "..") {
        return false;
    }

    if text.starts_with('/') || text.starts_with("\\\\") {
        return false;
    }

    let mut chars = text.chars();
    if let (Some(first), Some(':')) = (chars.next(), chars.next()) {
        if first.is_ascii_alphabetic() {
            return false;
        }
    }

    true
}

/// Check that `text` holds no shell metacharacters or NUL bytes
pub fn validate_command_injection(text: &str) -> bool {
    !text.contains(INJECTION_CHARS)
}

/// Validate a model id against generic safety rules and the grammar of
/// `provider` (case-insensitive; `huggingface` or `ollama`)
pub fn validate_model_id(model_id: &str, provider: &str) -> Result<(), IdRejection> {
    let result = check_rules(model_id, provider);
    if let Err(ref reason) = result {
        warn!("Model id validation failed: {}", reason);
    }
    result
}

/// Tuple form of [`validate_model_id`]: `(true, "")` when valid, otherwise
/// `(false, reason)`
pub fn check_model_id(model_id: &str, provider: &str) -> (bool, String) {
    match validate_model_id(model_id, provider) {
        Ok(()) => (true, String::new()),
        Err(reason) => (false, reason.to_string()),
    }
}

/// Validate and lift any rejection into a [`TierError`]
pub fn require_model_id(model_id: &str, provider: &str) -> TierResult<()> {
    validate_model_id(model_id, provider).map_err(|r| TierError::from_rejection(model_id, r))
}

fn check_rules(model_id: &str, provider: &str) -> Result<(), IdRejection> {
    if model_id.is_empty() {
        return Err(IdRejection::Empty);
    }

    let len = model_id.chars().count();
    if len > MAX_MODEL_ID_LEN {
        return Err(IdRejection::TooLong(len));
    }

    if let Some(c) = model_id.chars().find(|c| INJECTION_CHARS.contains(c)) {
        return Err(IdRejection::DangerousCharacter(c));
    }

    if model_id.contains("..") || model_id.starts_with('/') || model_id.starts_with('\\') {
        return Err(IdRejection::PathTraversal);
    }

    match provider.to_ascii_lowercase().as_str() {
        "huggingface" => {
            if is_huggingface_id(model_id) {
                Ok(())
            } else {
                Err(IdRejection::InvalidFormat {
                    provider: "HuggingFace",
                    expected: "'organization/model-name'",
                })
            }
        }
        "ollama" => {
            if is_ollama_id(model_id) {
                Ok(())
            } else {
                Err(IdRejection::InvalidFormat {
                    provider: "Ollama",
                    expected: "'model-name' or 'model-name:tag'",
                })
            }
        }
        _ => Err(IdRejection::UnknownProvider(provider.to_string())),
    }
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

fn is_tag_char(c: char) -> bool {
    is_name_char(c) || c == '.'
}

fn all_nonempty(s: &str, pred: fn(char) -> bool) -> bool {
    !s.is_empty() && s.chars().all(pred)
}

/// `^[A-Za-z0-9_-]+/[A-Za-z0-9._-]+$`
fn is_huggingface_id(id: &str) -> bool {
    match id.split_once('/') {
        Some((org, name)) => all_nonempty(org, is_name_char) && all_nonempty(name, is_tag_char),
        None => false,
    }
}

/// `^[A-Za-z0-9_-]+(:[A-Za-z0-9._-]+)?$`
fn is_ollama_id(id: &str) -> bool {
    match id.split_once(':') {
        Some((name, tag)) => all_nonempty(name, is_name_char) && all_nonempty(tag, is_tag_char),
        None => all_nonempty(id, is_name_char),
    }
}

/// Make `name` safe to use as a single filesystem path component
///
/// Idempotent: sanitizing an already-sanitized name returns it unchanged.
pub fn sanitize_for_filesystem(name: &str) -> String {
    let trimmed = name.trim_matches(|c| c == ' ' || c == '.');

    let replaced: String = trimmed
        .chars()
        .map(|c| if is_tag_char(c) { c } else { '_' })
        .take(MAX_FILENAME_LEN)
        .collect();

    // Leading dots would create hidden files
    let stripped = replaced.trim_matches('.');

    if stripped.is_empty() {
        "unnamed".to_string()
    } else {
        stripped.to_string()
    }
}

/// Resolve `path` (relative paths are joined onto `root`) and require the
/// result to sit strictly inside `root`
///
/// The longest existing ancestor is canonicalized so symlinks cannot point
/// outside the root; the not-yet-existing remainder may not contain `..`.
pub fn resolve_within(root: &Path, path: &Path) -> TierResult<PathBuf> {
    let root = root
        .canonicalize()
        .map_err(|e| TierError::io(format!("resolving cache-tier root {}", root.display()), e))?;

    let candidate = if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    };

    let violation = || TierError::PathBoundaryViolation {
        path: path.to_path_buf(),
        root: root.clone(),
    };

    let existing = candidate
        .ancestors()
        .find(|p| p.exists())
        .ok_or_else(violation)?;

    let mut resolved = existing
        .canonicalize()
        .map_err(|e| TierError::io(format!("resolving {}", existing.display()), e))?;

    let remainder = candidate.strip_prefix(existing).map_err(|_| violation())?;
    for component in remainder.components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => {}
            _ => return Err(violation()),
        }
    }

    if resolved == root || !resolved.starts_with(&root) {
        warn!(
            "Path {} resolves outside cache-tier root {}",
            path.display(),
            root.display()
        );
        return Err(violation());
    }

    Ok(resolved)
}
