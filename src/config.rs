use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{GcliError, Result};

pub const DEFAULT_MODEL: &str = "gemini-2.5-pro";
pub const DEFAULT_ORIGIN: &str = "default";
/// Largest thinking budget accepted by `flash` models.
pub const FLASH_THINKING_LIMIT: i32 = 16384;
/// Thinking budget value that lets the model decide.
pub const AUTOMATIC_BUDGET: i32 = -1;

const APP_DIR: &str = "gcli";
const CONFIG_FILE: &str = "config.json";
const SESSIONS_DIR: &str = "sessions";

pub const ENV_API_KEY: &str = "GEMINI_API_KEY";
pub const ENV_ORIGIN: &str = "GEMINI_API_KEY_ORIGIN";

/// Runtime settings for a chat session.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub model: String,
    pub temperature: f32,
    pub seed: i64,
    pub max_output_tokens: u32,
    pub thinking_budget: i32,
    pub top_k: Option<u32>,
    pub top_p: Option<f32>,
    pub google_grounding: bool,
    pub url_context: bool,
    pub system_prompt: Option<String>,
    pub api_key: Option<String>,
    pub origin: String,
    pub proxy: Option<String>,
    /// Use the key-free web endpoint instead of the official API.
    pub free_mode: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_owned(),
            temperature: 0.75,
            seed: 42,
            max_output_tokens: 65536,
            thinking_budget: AUTOMATIC_BUDGET,
            top_k: None,
            top_p: None,
            google_grounding: true,
            url_context: true,
            system_prompt: None,
            api_key: None,
            origin: DEFAULT_ORIGIN.to_owned(),
            proxy: None,
            free_mode: true,
        }
    }
}

/// Which settings came from the environment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnvOverrides {
    pub api_key: bool,
    pub origin: bool,
}

impl Settings {
    /// Overlay every key present in `file`.
    pub fn apply_file(&mut self, file: ConfigFile) {
        if let Some(model) = file.model {
            self.model = model;
        }
        if let Some(temperature) = file.temperature {
            self.temperature = temperature;
        }
        if let Some(seed) = file.seed {
            self.seed = seed;
        }
        if let Some(prompt) = file.system_prompt {
            self.system_prompt = Some(prompt);
        }
        if let Some(proxy) = file.proxy.filter(|proxy| !proxy.is_empty()) {
            self.proxy = Some(proxy);
        }
        if let Some(key) = file.api_key.filter(|key| !key.is_empty()) {
            self.api_key = Some(key);
        }
        if let Some(origin) = file.origin.filter(|origin| !origin.is_empty()) {
            self.origin = origin;
        }
        if let Some(tokens) = file.max_output_tokens {
            self.max_output_tokens = tokens;
        }
        if let Some(budget) = file.thinking_budget {
            self.thinking_budget = budget;
        }
        if let Some(grounding) = file.google_grounding {
            self.google_grounding = grounding;
        }
        if let Some(url_context) = file.url_context {
            self.url_context = url_context;
        }
        if let Some(top_k) = file.top_k {
            self.top_k = u32::try_from(top_k).ok().filter(|k| *k > 0);
        }
        if let Some(top_p) = file.top_p {
            self.top_p = Some(top_p).filter(|p| *p > 0.0);
        }
    }

    pub fn to_file(&self) -> ConfigFile {
        ConfigFile {
            model: Some(self.model.clone()),
            temperature: Some(self.temperature),
            seed: Some(self.seed),
            system_prompt: self.system_prompt.clone(),
            proxy: self.proxy.clone(),
            api_key: self.api_key.clone(),
            origin: Some(self.origin.clone()),
            max_output_tokens: Some(self.max_output_tokens),
            thinking_budget: Some(self.thinking_budget),
            google_grounding: Some(self.google_grounding),
            url_context: Some(self.url_context),
            top_k: self.top_k.map(i64::from),
            top_p: self.top_p,
        }
    }

    /// Take the API key and origin from `lookup` (normally the process environment).
    pub fn apply_env<F>(&mut self, lookup: F) -> EnvOverrides
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut overrides = EnvOverrides::default();
        if let Some(origin) = lookup(ENV_ORIGIN) {
            self.origin = origin;
            overrides.origin = true;
        }
        if let Some(key) = lookup(ENV_API_KEY) {
            self.api_key = Some(key);
            overrides.api_key = true;
        }
        overrides
    }

    /// `flash` models reject budgets above [`FLASH_THINKING_LIMIT`].
    pub fn clamp_thinking_budget(&mut self) {
        if self.model.contains("flash") && self.thinking_budget > FLASH_THINKING_LIMIT {
            debug!(budget = self.thinking_budget, "clamping thinking budget for flash model");
            self.thinking_budget = FLASH_THINKING_LIMIT;
        }
    }

    pub fn is_pro_model(&self) -> bool {
        self.model.contains("pro")
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.as_deref().is_some_and(|key| !key.is_empty())
    }

    /// Origin header value, unless left at `default`.
    pub fn origin_header(&self) -> Option<&str> {
        (self.origin != DEFAULT_ORIGIN && !self.origin.is_empty()).then_some(self.origin.as_str())
    }
}

/// Shape of `config.json`. Unknown keys are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking_budget: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub google_grounding: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_context: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
}

/// `<config dir>/gcli`, created on first use.
pub fn app_dir() -> Result<PathBuf> {
    let dir = dirs::config_dir().ok_or(GcliError::NoConfigDir)?.join(APP_DIR);
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

pub fn default_config_path() -> Result<PathBuf> {
    Ok(app_dir()?.join(CONFIG_FILE))
}

pub fn sessions_dir() -> Result<PathBuf> {
    let dir = app_dir()?.join(SESSIONS_DIR);
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Read a config file. A missing file is `None`; so is one that does not
/// parse, after a warning.
pub fn load_config(path: &Path) -> Result<Option<ConfigFile>> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
        Err(error) => return Err(error.into()),
    };
    match serde_json::from_str(&raw) {
        Ok(file) => Ok(Some(file)),
        Err(error) => {
            warn!(
                path = %path.display(),
                %error,
                "could not parse configuration file or it is not a valid JSON object"
            );
            Ok(None)
        }
    }
}

pub fn save_config(path: &Path, settings: &Settings) -> Result<()> {
    let json = serde_json::to_string_pretty(&settings.to_file())?;
    fs::write(path, json)?;
    Ok(())
}
