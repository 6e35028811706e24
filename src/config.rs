/*
 * Pictor - Sandboxed Filesystem & Image Generation Tool Server
 * File Path: src/config.rs
 * Responsibility: YAML configuration structure, loading, and environment overlays
 */
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub gemini: GeminiConfig,
    #[serde(default)]
    pub sandbox: SandboxConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GeminiConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_image_model")]
    pub model: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct SandboxConfig {
    /// Comma-separated list of allowed root directories.
    /// Unset means: home directory + current working directory.
    pub allowed_roots: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct OutputConfig {
    /// Explicit save directory. Wins over every platform candidate when writable.
    pub directory: Option<String>,
    /// Try the desktop tier even on platforms that would normally skip it.
    #[serde(default)]
    pub force_desktop: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RuntimeConfig {
    /// Gates diagnostic lines on stderr. stdout stays protocol-only.
    #[serde(default)]
    pub debug: bool,
    #[serde(default = "default_max_tool_output_bytes")]
    pub max_tool_output_bytes: usize,
}

fn default_image_model() -> String {
    "gemini-2.0-flash-preview-image-generation".to_string()
}

fn default_max_tool_output_bytes() -> usize {
    50 * 1024
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: default_image_model(),
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            debug: false,
            max_tool_output_bytes: default_max_tool_output_bytes(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file at {:?}", path.as_ref()))?;
        let config: Config = serde_yaml::from_str(&content)
            .context("Failed to parse config file")?;
        Ok(config)
    }

    /// Load the config file if present, otherwise start from defaults.
    /// Environment variables overlay the file in both cases.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = if path.as_ref().exists() {
            Self::load(path)?
        } else {
            Self::default()
        };
        config.apply_env_overlays();
        Ok(config)
    }

    fn apply_env_overlays(&mut self) {
        if let Ok(key) = std::env::var("GEMINI_API_KEY") {
            if !key.is_empty() {
                self.gemini.api_key = key;
            }
        }
        if let Ok(roots) = std::env::var("PICTOR_ALLOWED_ROOTS") {
            if !roots.is_empty() {
                self.sandbox.allowed_roots = Some(roots);
            }
        }
        if let Ok(dir) = std::env::var("PICTOR_OUTPUT_DIR") {
            if !dir.is_empty() {
                self.output.directory = Some(dir);
            }
        }
        if env_flag("PICTOR_FORCE_DESKTOP") {
            self.output.force_desktop = true;
        }
        if env_flag("PICTOR_DEBUG") {
            self.runtime.debug = true;
        }
    }
}

fn env_flag(name: &str) -> bool {
    matches!(
        std::env::var(name).as_deref(),
        Ok("1") | Ok("true") | Ok("yes")
    )
}
