/*
 * Pictor - Sandboxed Filesystem & Image Generation Tool Server
 * File Path: src/locator.rs
 * Responsibility: Picking a writable save directory from platform candidates.
 */

use crate::config::OutputConfig;
use anyhow::{Context, Result};
use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Application subfolder created under the desktop/documents/home tiers.
const APP_SUBDIR: &str = "Pictor";

/// Last-resort directory under the current working directory.
const FALLBACK_SUBDIR: &str = "output";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationReason {
    Override,
    Desktop,
    Documents,
    Home,
    WorkingDir,
}

#[derive(Debug, Clone)]
pub struct CandidateLocation {
    pub dir: PathBuf,
    pub reason: LocationReason,
}

/// Build the prioritized candidate list from live platform facts. Recomputed
/// on every save; environments change between calls.
pub fn candidate_locations(config: &OutputConfig) -> Vec<CandidateLocation> {
    let mut candidates = Vec::new();

    if let Some(dir) = &config.directory {
        candidates.push(CandidateLocation {
            dir: crate::sandbox::expand_home(dir),
            reason: LocationReason::Override,
        });
    }

    if let Some(desktop) = desktop_dir(config.force_desktop) {
        candidates.push(CandidateLocation {
            dir: desktop.join(APP_SUBDIR),
            reason: LocationReason::Desktop,
        });
    }

    if let Some(documents) = documents_dir() {
        candidates.push(CandidateLocation {
            dir: documents.join(APP_SUBDIR),
            reason: LocationReason::Documents,
        });
    }

    if let Some(home) = dirs::home_dir() {
        candidates.push(CandidateLocation {
            dir: home.join(APP_SUBDIR),
            reason: LocationReason::Home,
        });
    }

    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    candidates.push(CandidateLocation {
        dir: cwd.join(FALLBACK_SUBDIR),
        reason: LocationReason::WorkingDir,
    });

    candidates
}

/// Resolve the save directory: first writable candidate wins. Every tier
/// before the last may fail silently; only an I/O failure creating the
/// working-directory fallback propagates.
pub fn resolve_output_dir(config: &OutputConfig) -> Result<PathBuf> {
    let candidates = candidate_locations(config);
    let (last, earlier) = candidates.split_last().expect("candidate list is never empty");

    for candidate in earlier {
        if is_writable(&candidate.dir) {
            return Ok(candidate.dir.clone());
        }
    }

    fs::create_dir_all(&last.dir)
        .with_context(|| format!("Failed to create fallback output directory {:?}", last.dir))?;
    Ok(last.dir.clone())
}

pub fn first_writable(candidates: &[CandidateLocation]) -> Option<PathBuf> {
    candidates
        .iter()
        .find(|candidate| is_writable(&candidate.dir))
        .map(|candidate| candidate.dir.clone())
}

/// A missing directory that can be created counts as writable. An existing
/// one must survive a throwaway probe write.
fn is_writable(dir: &Path) -> bool {
    if !dir.exists() {
        return fs::create_dir_all(dir).is_ok();
    }
    if !dir.is_dir() {
        return false;
    }

    let probe = dir.join(probe_name());
    match fs::write(&probe, b"") {
        Ok(()) => {
            let _ = fs::remove_file(&probe);
            true
        }
        Err(_) => false,
    }
}

/// Collision-resistant throwaway name: concurrent resolutions against the
/// same directory must never trip over each other.
fn probe_name() -> String {
    format!(
        ".pictor-probe-{}-{}",
        Utc::now().format("%Y%m%d%H%M%S%3f"),
        Uuid::new_v4().simple()
    )
}

#[cfg(target_os = "macos")]
fn desktop_dir(_force: bool) -> Option<PathBuf> {
    dirs::desktop_dir().or_else(|| dirs::home_dir().map(|home| home.join("Desktop")))
}

#[cfg(target_os = "windows")]
fn desktop_dir(_force: bool) -> Option<PathBuf> {
    dirs::desktop_dir().or_else(|| dirs::home_dir().map(|home| home.join("Desktop")))
}

/// On other platforms the desktop tier only applies when the environment
/// advertises one (XDG) or the configuration forces it.
#[cfg(not(any(target_os = "macos", target_os = "windows")))]
fn desktop_dir(force: bool) -> Option<PathBuf> {
    match dirs::desktop_dir() {
        Some(dir) => Some(dir),
        None if force => dirs::home_dir().map(|home| home.join("Desktop")),
        None => None,
    }
}

#[cfg(any(target_os = "macos", target_os = "windows"))]
fn documents_dir() -> Option<PathBuf> {
    dirs::document_dir().or_else(|| dirs::home_dir().map(|home| home.join("Documents")))
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
fn documents_dir() -> Option<PathBuf> {
    dirs::document_dir()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_override_candidate_comes_first_and_wins_when_writable() {
        let dir = tempdir().unwrap();
        let config = OutputConfig {
            directory: Some(dir.path().to_string_lossy().into_owned()),
            force_desktop: false,
        };

        let candidates = candidate_locations(&config);
        assert_eq!(candidates[0].reason, LocationReason::Override);
        assert_eq!(
            candidates.last().unwrap().reason,
            LocationReason::WorkingDir
        );

        let resolved = resolve_output_dir(&config).unwrap();
        assert_eq!(resolved, dir.path());
    }

    #[test]
    fn test_missing_candidate_is_created_and_counts_as_writable() {
        let dir = tempdir().unwrap();
        let fresh = dir.path().join("deep").join("save");
        let candidates = vec![CandidateLocation {
            dir: fresh.clone(),
            reason: LocationReason::Override,
        }];

        let resolved = first_writable(&candidates).unwrap();
        assert_eq!(resolved, fresh);
        assert!(fresh.is_dir());
    }

    #[cfg(unix)]
    #[test]
    fn test_read_only_candidates_are_skipped_to_a_later_tier() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let frozen_desktop = dir.path().join("Desktop");
        let frozen_documents = dir.path().join("Documents");
        let open_home = dir.path().join("home");
        for frozen in [&frozen_desktop, &frozen_documents] {
            fs::create_dir_all(frozen).unwrap();
            fs::set_permissions(frozen, fs::Permissions::from_mode(0o555)).unwrap();
        }

        // Root ignores permission bits; there is nothing to observe then.
        let check = frozen_desktop.join(".write-check");
        if fs::write(&check, b"").is_ok() {
            let _ = fs::remove_file(&check);
            return;
        }

        let candidates = vec![
            CandidateLocation {
                dir: frozen_desktop.clone(),
                reason: LocationReason::Desktop,
            },
            CandidateLocation {
                dir: frozen_documents.clone(),
                reason: LocationReason::Documents,
            },
            CandidateLocation {
                dir: open_home.clone(),
                reason: LocationReason::Home,
            },
        ];

        let resolved = first_writable(&candidates).unwrap();
        assert_eq!(resolved, open_home);

        // Restore permissions so the tempdir can be cleaned up.
        for frozen in [&frozen_desktop, &frozen_documents] {
            fs::set_permissions(frozen, fs::Permissions::from_mode(0o755)).unwrap();
        }
    }

    #[test]
    fn test_probe_write_leaves_no_residue() {
        let dir = tempdir().unwrap();
        assert!(is_writable(dir.path()));
        let leftovers: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_probe_names_do_not_collide() {
        let a = probe_name();
        let b = probe_name();
        assert_ne!(a, b);
    }

    #[test]
    fn test_file_shadowing_a_candidate_disqualifies_it() {
        let dir = tempdir().unwrap();
        let shadow = dir.path().join("not-a-dir");
        fs::write(&shadow, "occupied").unwrap();
        assert!(!is_writable(&shadow));
    }

    #[test]
    fn test_resolve_always_returns_an_existing_directory() {
        let dir = tempdir().unwrap();
        let config = OutputConfig {
            directory: Some(dir.path().join("gallery").to_string_lossy().into_owned()),
            force_desktop: false,
        };
        let resolved = resolve_output_dir(&config).unwrap();
        assert!(resolved.is_dir());
        assert!(is_writable(&resolved));
    }
}
