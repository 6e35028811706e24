/*
 * Pictor - Sandboxed Filesystem & Image Generation Tool Server
 * File Path: src/viewer.rs
 * Responsibility: Best-effort launch of the platform image viewer.
 */

use std::path::Path;
use tokio::process::Command;

/// Open `path` in the platform viewer. Purely a UX nicety: every failure is
/// logged to stderr and swallowed, and headless hosts are skipped outright.
pub async fn open_best_effort(path: &Path) {
    if is_headless() {
        eprintln!("🖥️ No display detected, skipping viewer for {:?}", path);
        return;
    }

    let mut command = launch_command(path);
    match command.spawn() {
        Ok(mut child) => {
            // Reap in the background; the viewer's exit status is nobody's
            // business but its own.
            tokio::spawn(async move {
                let _ = child.wait().await;
            });
        }
        Err(e) => {
            eprintln!("⚠️ Could not launch viewer for {:?}: {}", path, e);
        }
    }
}

#[cfg(any(target_os = "macos", target_os = "windows"))]
fn is_headless() -> bool {
    false
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
fn is_headless() -> bool {
    let has_display = |name: &str| std::env::var(name).map(|v| !v.is_empty()).unwrap_or(false);
    !has_display("DISPLAY") && !has_display("WAYLAND_DISPLAY")
}

#[cfg(target_os = "macos")]
fn launch_command(path: &Path) -> Command {
    let mut command = Command::new("open");
    command.arg(path);
    command
}

#[cfg(target_os = "windows")]
fn launch_command(path: &Path) -> Command {
    let mut command = Command::new("cmd");
    command.arg("/C").arg("start").arg("").arg(path);
    command
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
fn launch_command(path: &Path) -> Command {
    let mut command = Command::new("xdg-open");
    command.arg(path);
    command
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    #[test]
    fn test_headless_detection_follows_display_variables() {
        let advertised = std::env::var("DISPLAY").map(|v| !v.is_empty()).unwrap_or(false)
            || std::env::var("WAYLAND_DISPLAY").map(|v| !v.is_empty()).unwrap_or(false);
        assert_eq!(is_headless(), !advertised);
    }

    #[tokio::test]
    async fn test_open_best_effort_never_panics_on_missing_targets() {
        open_best_effort(Path::new("/definitely/not/here.png")).await;
    }
}
