//! Path rules shared by the local and remote backends
//!
//! Paths are `/`-separated strings on both sides. A path is resolved against
//! the home directory of whichever backend is active, so the same reference
//! can point at the operator machine or at the companion computer.
//!
//! | input              | result                                   |
//! |--------------------|------------------------------------------|
//! | `~` or `~/rest`    | `<home>/rest`                            |
//! | `/abs/path`        | unchanged                                |
//! | `rel/path`         | `<workspace root>/rel/path`              |
//!
//! Normalizing an already normalized path returns it unchanged.

use serde::{Deserialize, Serialize};

use crate::error::{LinkError, Result};

pub const HOME_SHORTHAND: &str = "~/";

/// How a stored path is anchored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathScope {
    /// Relative to the workspace root
    WorkspaceRelative,
    /// Absolute, or starting with the home shorthand
    Global,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathKind {
    File,
    Directory,
}

/// A validated path as kept in configuration.
///
/// Directories always end with `/`; files always carry an extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathReference {
    path: String,
    scope: PathScope,
    kind: PathKind,
}

impl PathReference {
    pub fn new(raw: &str, scope: PathScope, kind: PathKind) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(invalid(raw, "empty path"));
        }

        let path = match kind {
            PathKind::Directory if raw.ends_with('/') => raw.to_string(),
            PathKind::Directory => format!("{}/", raw),
            PathKind::File => {
                if raw.ends_with('/') {
                    return Err(invalid(raw, "file path ends with a separator"));
                }
                if file_name(raw).and_then(|n| n.rsplit_once('.')).map_or(true, |(stem, ext)| {
                    stem.is_empty() || ext.is_empty()
                }) {
                    return Err(invalid(raw, "file path has no extension"));
                }
                raw.to_string()
            }
        };

        Ok(Self { path, scope, kind })
    }

    pub fn file(raw: &str, scope: PathScope) -> Result<Self> {
        Self::new(raw, scope, PathKind::File)
    }

    pub fn directory(raw: &str, scope: PathScope) -> Result<Self> {
        Self::new(raw, scope, PathKind::Directory)
    }

    pub fn as_str(&self) -> &str {
        &self.path
    }

    pub fn scope(&self) -> PathScope {
        self.scope
    }

    pub fn kind(&self) -> PathKind {
        self.kind
    }
}

fn invalid(path: &str, reason: &str) -> LinkError {
    LinkError::InvalidPath {
        path: path.to_string(),
        reason: reason.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathNormalizer {
    workspace_root: String,
}

impl PathNormalizer {
    /// `workspace_root` may itself use the home shorthand; it is resolved
    /// per backend at normalization time.
    pub fn new(workspace_root: impl Into<String>) -> Self {
        Self {
            workspace_root: with_trailing_slash(workspace_root.into()),
        }
    }

    pub fn workspace_root(&self) -> &str {
        &self.workspace_root
    }

    /// Workspace root as an absolute path on a backend whose home is `home`.
    pub fn resolved_root(&self, home: &str) -> String {
        let root = expand_home(&self.workspace_root, home)
            .unwrap_or_else(|| self.workspace_root.clone());
        if root.starts_with('/') {
            root
        } else {
            format!("{}{}", with_trailing_slash(home.to_string()), root)
        }
    }

    /// Resolve a raw path string for a backend whose home is `home`.
    pub fn normalize(&self, path: &str, home: &str) -> String {
        if let Some(expanded) = expand_home(path, home) {
            return expanded;
        }
        if path.starts_with('/') {
            return path.to_string();
        }
        format!("{}{}", self.resolved_root(home), path)
    }

    /// Resolve a stored reference.
    ///
    /// Workspace-relative references are re-rooted even when written with a
    /// leading separator, unless they already sit under the resolved root.
    pub fn normalize_reference(&self, reference: &PathReference, home: &str) -> String {
        let path = reference.as_str();
        match reference.scope() {
            PathScope::Global => self.normalize(path, home),
            PathScope::WorkspaceRelative => {
                if let Some(expanded) = expand_home(path, home) {
                    return expanded;
                }
                let root = self.resolved_root(home);
                if path.starts_with(&root) {
                    path.to_string()
                } else {
                    format!("{}{}", root, path.trim_start_matches('/'))
                }
            }
        }
    }

    /// Reverse projection of an absolute path for storage.
    ///
    /// Falls back to the absolute path when it lies outside the anchor.
    pub fn display_path(&self, absolute: &str, scope: PathScope, home: &str) -> String {
        match scope {
            PathScope::WorkspaceRelative => {
                let root = self.resolved_root(home);
                absolute
                    .strip_prefix(&root)
                    .map(str::to_string)
                    .unwrap_or_else(|| absolute.to_string())
            }
            PathScope::Global => {
                let home = with_trailing_slash(home.to_string());
                match absolute.strip_prefix(&home) {
                    Some(rest) => format!("{}{}", HOME_SHORTHAND, rest),
                    None if format!("{}/", absolute) == home => HOME_SHORTHAND.to_string(),
                    None => absolute.to_string(),
                }
            }
        }
    }
}

fn expand_home(path: &str, home: &str) -> Option<String> {
    if path == "~" {
        return Some(with_trailing_slash(home.to_string()));
    }
    path.strip_prefix(HOME_SHORTHAND)
        .map(|rest| format!("{}{}", with_trailing_slash(home.to_string()), rest))
}

fn with_trailing_slash(mut path: String) -> String {
    if !path.ends_with('/') {
        path.push('/');
    }
    path
}

/// Join with a single `/` between the parts.
pub fn join_path(base: &str, name: &str) -> String {
    if base.ends_with('/') {
        format!("{}{}", base, name)
    } else {
        format!("{}/{}", base, name)
    }
}

/// Parent directory, ignoring a trailing separator. `None` for the root.
pub fn parent_of(path: &str) -> Option<String> {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.rsplit_once('/') {
        Some(("", _)) => Some("/".to_string()),
        Some((parent, _)) => Some(parent.to_string()),
        None => None,
    }
}

/// Last path component, ignoring a trailing separator.
pub fn file_name(path: &str) -> Option<&str> {
    let trimmed = path.trim_end_matches('/');
    let name = trimmed.rsplit('/').next()?;
    (!name.is_empty()).then_some(name)
}
