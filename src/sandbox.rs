/*
 * Pictor - Sandboxed Filesystem & Image Generation Tool Server
 * File Path: src/sandbox.rs
 * Responsibility: Path authorization against the allow-list of root directories.
 */

use std::fs;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("Access denied: `{path}` is outside the allowed roots [{roots}]")]
    AccessDenied { path: String, roots: String },
    #[error("Path not found: `{path}` (and its parent directory does not exist)")]
    NotFound { path: String },
}

/// The set of directories tool requests may touch. Built once at startup,
/// read-only for the process lifetime.
#[derive(Debug, Clone)]
pub struct AllowedRoots {
    roots: Vec<PathBuf>,
}

impl AllowedRoots {
    /// Build the root set from a comma-separated list. Each element is
    /// home-expanded and symlink-resolved at registration time if it exists.
    /// An unset list falls back to the home directory plus the current
    /// working directory.
    pub fn from_list(list: Option<&str>) -> Self {
        let mut raw: Vec<PathBuf> = Vec::new();
        match list {
            Some(list) => {
                for entry in list.split(',') {
                    let trimmed = entry.trim();
                    if !trimmed.is_empty() {
                        raw.push(expand_home(trimmed));
                    }
                }
            }
            None => {
                if let Some(home) = dirs::home_dir() {
                    raw.push(home);
                }
                if let Ok(cwd) = std::env::current_dir() {
                    raw.push(cwd);
                }
            }
        }
        Self::new(raw)
    }

    pub fn new(dirs: Vec<PathBuf>) -> Self {
        let roots = dirs
            .into_iter()
            .map(|dir| {
                let absolute = absolutize(&dir);
                fs::canonicalize(&absolute).unwrap_or(absolute)
            })
            .collect();
        Self { roots }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    pub fn describe(&self) -> String {
        self.roots
            .iter()
            .map(|root| root.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Component-wise containment check. `Path::starts_with` only matches on
    /// whole components, so a root `/home/alice` never admits
    /// `/home/alice2/secret`.
    pub fn contains(&self, path: &Path) -> bool {
        self.roots.iter().any(|root| path.starts_with(root))
    }

    /// Authorize a caller-supplied path string. The returned path is the only
    /// value operations may hand to the filesystem.
    ///
    /// Existing targets come back symlink-resolved; non-existent targets come
    /// back as the resolved parent joined with the final component, so a
    /// later create lands exactly where the check looked.
    pub fn authorize(&self, requested: &str) -> Result<PathBuf, SandboxError> {
        let expanded = expand_home(requested);
        let candidate = normalize_lexically(&absolutize(&expanded));

        if !self.contains(&candidate) {
            return Err(self.denied(&candidate));
        }

        match fs::canonicalize(&candidate) {
            Ok(real) => {
                // A symlink planted inside a root must not lead outside it.
                if self.contains(&real) {
                    Ok(real)
                } else {
                    Err(self.denied(&candidate))
                }
            }
            Err(_) => {
                let parent = match candidate.parent() {
                    Some(parent) => parent,
                    None => {
                        return Err(SandboxError::NotFound {
                            path: candidate.to_string_lossy().into_owned(),
                        });
                    }
                };
                match fs::canonicalize(parent) {
                    Ok(real_parent) => {
                        if self.contains(&real_parent) {
                            let leaf = candidate.file_name().map(PathBuf::from).unwrap_or_default();
                            Ok(real_parent.join(leaf))
                        } else {
                            Err(self.denied(&candidate))
                        }
                    }
                    Err(_) => Err(SandboxError::NotFound {
                        path: candidate.to_string_lossy().into_owned(),
                    }),
                }
            }
        }
    }

    fn denied(&self, path: &Path) -> SandboxError {
        SandboxError::AccessDenied {
            path: path.to_string_lossy().into_owned(),
            roots: self.describe(),
        }
    }
}

/// Expand a leading `~` or `~/...` to the platform home directory.
pub fn expand_home(raw: &str) -> PathBuf {
    if raw == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    } else if let Some(rest) = raw.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(raw)
}

fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    }
}

/// Fold `.` and `..` segments without touching the filesystem.
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                // Stepping above an absolute root stays at the root.
                if !normalized.pop() && !path.is_absolute() {
                    normalized.push(component.as_os_str());
                }
            }
            Component::CurDir => {}
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}
