/*
 * Warden - Sandboxed Tool-Calling Agent
 * File Path: src/config.rs
 * Responsibility: YAML configuration structure, discovery and loading
 */
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::llm::DEFAULT_MODEL;
use crate::tools::{DEFAULT_MAX_CHARS, DEFAULT_SCRIPT_TIMEOUT_SECS, ReadLimits, ScriptPolicy};

pub const CONFIG_FILE_NAME: &str = "warden.yml";
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";
pub const CONFIG_ENV: &str = "WARDEN_CONFIG";
pub const WORKDIR_ENV: &str = "WARDEN_WORKDIR";
pub const DEFAULT_MAX_ITERATIONS: usize = 20;

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub gemini: GeminiConfig,
    pub runtime: RuntimeConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct GeminiConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: Option<f32>,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            temperature: None,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct RuntimeConfig {
    pub working_directory: PathBuf,
    pub max_iterations: usize,
    pub max_chars: usize,
    pub script_timeout_secs: u64,
    pub script_extension: String,
    pub interpreter: String,
    pub system_prompt: Option<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            working_directory: PathBuf::from("."),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            max_chars: DEFAULT_MAX_CHARS,
            script_timeout_secs: DEFAULT_SCRIPT_TIMEOUT_SECS,
            script_extension: "py".to_string(),
            interpreter: "python3".to_string(),
            system_prompt: None,
        }
    }
}

impl RuntimeConfig {
    pub fn read_limits(&self) -> ReadLimits {
        ReadLimits {
            max_chars: self.max_chars,
        }
    }

    pub fn script_policy(&self) -> ScriptPolicy {
        ScriptPolicy {
            extension: self.script_extension.trim_start_matches('.').to_string(),
            interpreter: self.interpreter.clone(),
            timeout: Duration::from_secs(self.script_timeout_secs),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file at {:?}", path.as_ref()))?;
        Self::parse(&content).with_context(|| format!("Failed to parse config file at {:?}", path.as_ref()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    /// Load the discovered config file, or defaults when there is none.
    pub fn discover(cli_path: Option<PathBuf>) -> Result<Self> {
        match resolve_config_path(cli_path) {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// `GEMINI_API_KEY` wins over the file.
    pub fn api_key(&self) -> Result<String> {
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.trim().is_empty() {
                return Ok(key);
            }
        }
        match self.gemini.api_key.as_deref().filter(|k| !k.trim().is_empty()) {
            Some(key) => Ok(key.to_string()),
            None => bail!("{} is not set and gemini.api_key is missing from the config", API_KEY_ENV),
        }
    }
}

/// Resolve config file path
/// Priority: CLI > Environment Variable > ./warden.yml > <config dir>/warden/warden.yml
pub fn resolve_config_path(cli_path: Option<PathBuf>) -> Option<PathBuf> {
    if let Some(path) = cli_path {
        return Some(path);
    }

    if let Ok(env_path) = std::env::var(CONFIG_ENV) {
        return Some(PathBuf::from(env_path));
    }

    let local = PathBuf::from(CONFIG_FILE_NAME);
    if local.is_file() {
        return Some(local);
    }

    dirs::config_dir()
        .map(|dir| dir.join("warden").join(CONFIG_FILE_NAME))
        .filter(|path| path.is_file())
}

/// Resolve the sandbox root
/// Priority: CLI > Environment Variable > runtime.working_directory
pub fn resolve_working_directory(cli_dir: Option<PathBuf>, config: &Config) -> Result<PathBuf> {
    let dir = cli_dir
        .or_else(|| std::env::var(WORKDIR_ENV).ok().map(PathBuf::from))
        .unwrap_or_else(|| config.runtime.working_directory.clone());

    if !dir.is_dir() {
        bail!("Working directory {:?} does not exist or is not a directory", dir);
    }
    Ok(dir)
}
