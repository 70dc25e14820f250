use std::path::PathBuf;

use clap::Parser;

use crate::config::Settings;
use crate::stream::LocationRequest;

/// Prompt sent when only place details are wanted.
pub const LOCATION_PROBE: &str = "echo 'hello'";

#[derive(Debug, Parser)]
#[command(
    name = "gcli",
    version,
    about = "A portable, feature-rich command-line client for the Google Gemini API",
    after_help = "Positional arguments ending in .json load a saved history, existing files are attached, \
                  and everything else becomes the initial prompt."
)]
pub struct Cli {
    /// Load configuration from a specific file path
    #[arg(short = 'c', long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Model name (e.g. gemini-2.5-flash)
    #[arg(short = 'm', long)]
    pub model: Option<String>,

    /// Generation temperature
    #[arg(short = 't', long = "temp")]
    pub temperature: Option<f32>,

    /// Random seed for reproducible outputs
    #[arg(short = 's', long)]
    pub seed: Option<i64>,

    /// System prompt for the whole session
    #[arg(short = 'S', long)]
    pub system: Option<String>,

    /// Maximum number of tokens in the response
    #[arg(short = 'o', long = "max-tokens")]
    pub max_tokens: Option<u32>,

    /// Thinking budget in tokens
    #[arg(short = 'b', long)]
    pub budget: Option<i32>,

    /// Proxy URL for all requests (e.g. socks5://127.0.0.1:1080)
    #[arg(short = 'p', long)]
    pub proxy: Option<String>,

    #[arg(long)]
    pub topk: Option<u32>,

    #[arg(long)]
    pub topp: Option<f32>,

    /// Run a single prompt non-interactively and exit
    #[arg(short = 'e', long)]
    pub execute: bool,

    /// Print only the final response to stdout
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Use the key-free web endpoint (default)
    #[arg(short = 'f', long, overrides_with = "api")]
    pub free: bool,

    /// Use the official API with an API key
    #[arg(long, overrides_with = "free")]
    pub api: bool,

    /// Print the place name for the prompt's location (key-free mode)
    #[arg(long)]
    pub loc: bool,

    /// Print a map link for the prompt's location (key-free mode)
    #[arg(long)]
    pub map: bool,

    /// Disable Google Search grounding
    #[arg(long, alias = "ng")]
    pub no_grounding: bool,

    /// Disable URL context fetching
    #[arg(long, alias = "nu")]
    pub no_url_context: bool,

    /// List available models and exit
    #[arg(short = 'l', long)]
    pub list: bool,

    /// List saved sessions and exit
    #[arg(long)]
    pub list_sessions: bool,

    /// Load a named session
    #[arg(long, value_name = "NAME")]
    pub load_session: Option<String>,

    /// Save the conversation to this path on exit
    #[arg(long, value_name = "PATH")]
    pub save_session: Option<String>,

    /// Verbose diagnostics on stderr
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Prompt words, files to attach, or .json histories to load
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub inputs: Vec<String>,
}

impl Cli {
    /// Overlay command-line values on settings read from the config file.
    pub fn apply_to(&self, settings: &mut Settings) {
        if let Some(model) = &self.model {
            settings.model = model.clone();
        }
        if let Some(temperature) = self.temperature {
            settings.temperature = temperature;
        }
        if let Some(seed) = self.seed {
            settings.seed = seed;
        }
        if let Some(system) = &self.system {
            settings.system_prompt = Some(system.clone());
        }
        if let Some(tokens) = self.max_tokens {
            settings.max_output_tokens = tokens;
        }
        if let Some(budget) = self.budget {
            settings.thinking_budget = budget;
        }
        if let Some(proxy) = &self.proxy {
            settings.proxy = Some(proxy.clone());
        }
        if let Some(top_k) = self.topk {
            settings.top_k = Some(top_k).filter(|k| *k > 0);
        }
        if let Some(top_p) = self.topp {
            settings.top_p = Some(top_p).filter(|p| *p > 0.0);
        }
        if self.no_grounding {
            settings.google_grounding = false;
        }
        if self.no_url_context {
            settings.url_context = false;
        }
        if self.api {
            settings.free_mode = false;
        }
        if self.free || !self.locations().is_empty() {
            settings.free_mode = true;
        }
    }

    pub fn locations(&self) -> LocationRequest {
        LocationRequest {
            label: self.loc,
            map: self.map,
        }
    }
}

/// What each positional argument turned out to be.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Inputs {
    pub histories: Vec<String>,
    pub files: Vec<String>,
    pub prompt: String,
}

/// Sort positional arguments: `.json` histories, existing regular files,
/// then prompt words joined by spaces.
pub fn classify_inputs<F>(inputs: &[String], is_file: F) -> Inputs
where
    F: Fn(&str) -> bool,
{
    let mut sorted = Inputs::default();
    let mut words = Vec::new();
    for input in inputs {
        if input.len() > ".json".len() && input.ends_with(".json") {
            sorted.histories.push(input.clone());
        } else if is_file(input) {
            sorted.files.push(input.clone());
        } else {
            words.push(input.as_str());
        }
    }
    sorted.prompt = words.join(" ");
    sorted
}
