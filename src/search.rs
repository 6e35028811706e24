/*
 * Pictor - Sandboxed Filesystem & Image Generation Tool Server
 * File Path: src/search.rs
 * Responsibility: Recursive file search with include/exclude glob filtering.
 */

use crate::sandbox::AllowedRoots;
use glob::{MatchOptions, Pattern};
use std::fs;
use std::path::{Path, PathBuf};

/// Base names are matched without case so `*.png` finds `Shot.PNG`.
const NAME_MATCH: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// An exclude pattern, pre-compiled against root-relative paths.
///
/// A pattern with no glob metacharacters excludes any subtree whose relative
/// path contains it as a literal segment: `node_modules` behaves as
/// `**/node_modules/**`, pruning the directory itself along with everything
/// under it.
struct ExcludeFilter {
    patterns: Vec<Pattern>,
}

impl ExcludeFilter {
    fn compile(raw_patterns: &[String]) -> Self {
        let mut patterns = Vec::new();
        for raw in raw_patterns {
            if raw.is_empty() {
                continue;
            }
            if has_glob_meta(raw) {
                if let Ok(pattern) = Pattern::new(raw) {
                    patterns.push(pattern);
                }
            } else {
                for wrapped in [format!("**/{}", raw), format!("**/{}/**", raw)] {
                    if let Ok(pattern) = Pattern::new(&wrapped) {
                        patterns.push(pattern);
                    }
                }
            }
        }
        Self { patterns }
    }

    fn matches(&self, relative: &Path) -> bool {
        self.patterns
            .iter()
            .any(|pattern| pattern.matches_path(relative))
    }
}

fn has_glob_meta(pattern: &str) -> bool {
    pattern.contains(['*', '?', '['])
}

/// Walk `root` depth-first in pre-order and return every entry whose base
/// name matches `include`, skipping excluded subtrees and anything the
/// sandbox would deny. `root` must already be authorized; failures below it
/// prune silently instead of aborting the search.
pub fn search_files(
    roots: &AllowedRoots,
    root: &Path,
    include: &str,
    exclude_patterns: &[String],
) -> std::io::Result<Vec<PathBuf>> {
    let include = Pattern::new(include)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
    let excludes = ExcludeFilter::compile(exclude_patterns);

    let mut matches = Vec::new();
    walk(roots, root, root, &include, &excludes, &mut matches)?;
    Ok(matches)
}

fn walk(
    roots: &AllowedRoots,
    base: &Path,
    dir: &Path,
    include: &Pattern,
    excludes: &ExcludeFilter,
    out: &mut Vec<PathBuf>,
) -> std::io::Result<()> {
    let mut entries: Vec<_> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .collect();
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let entry_path = entry.path();

        // An entry the sandbox rejects is pruned, never fatal.
        let resolved = match roots.authorize(&entry_path.to_string_lossy()) {
            Ok(resolved) => resolved,
            Err(_) => continue,
        };

        let relative = entry_path.strip_prefix(base).unwrap_or(&entry_path);
        if excludes.matches(relative) {
            continue;
        }

        let file_name = entry_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        if include.matches_with(&file_name, NAME_MATCH) {
            out.push(resolved);
        }

        if entry_path.is_dir() {
            // Unreadable subtrees are skipped the same way denied ones are.
            let _ = walk(roots, base, &entry_path, include, excludes, out);
        }
    }

    Ok(())
}
