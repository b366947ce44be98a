//! Configuration management

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;
use crate::Result;
use crate::error::Error;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding the conversation store
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Model used when a request names none
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Provider preference order ("groq", "ollama", "huggingface")
    #[serde(default = "default_providers")]
    pub providers: Vec<String>,

    /// Groq API key (overridden by GROQ_API_KEY)
    #[serde(default)]
    pub groq_api_key: String,

    /// Optional HuggingFace token (overridden by HF_API_KEY)
    #[serde(default)]
    pub huggingface_api_key: Option<String>,

    /// Base URL of the local Ollama runtime
    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,

    /// Sampling temperature for every provider
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Completion token limit
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Maximum think/act iterations per turn
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub tools: ToolsConfig,
}

/// WebSocket gateway settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    /// Listening port (overridden by GRAVITY_PORT)
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Tool enablement and resource policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_true")]
    pub enable_web_search: bool,

    #[serde(default = "default_true")]
    pub enable_file_ops: bool,

    #[serde(default = "default_true")]
    pub enable_code_execution: bool,

    /// Roots the file tools may touch
    #[serde(default = "default_allowed_paths")]
    pub allowed_paths: Vec<PathBuf>,

    /// Hard timeout for python/shell execution, in seconds
    #[serde(default = "default_exec_timeout")]
    pub exec_timeout_secs: u64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            enable_web_search: true,
            enable_file_ops: true,
            enable_code_execution: true,
            allowed_paths: default_allowed_paths(),
            exec_timeout_secs: default_exec_timeout(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    config_dir().join("data")
}

fn default_model() -> String {
    "llama-3.1-70b-versatile".to_string()
}

fn default_providers() -> Vec<String> {
    vec!["groq".to_string(), "ollama".to_string(), "huggingface".to_string()]
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_max_iterations() -> usize {
    10
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_true() -> bool {
    true
}

fn default_allowed_paths() -> Vec<PathBuf> {
    let mut paths = vec![std::env::temp_dir()];
    if let Some(home) = dirs::home_dir() {
        paths.push(home);
    }
    paths
}

fn default_exec_timeout() -> u64 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            default_model: default_model(),
            providers: default_providers(),
            groq_api_key: String::new(),
            huggingface_api_key: None,
            ollama_url: default_ollama_url(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            max_iterations: default_max_iterations(),
            server: ServerConfig::default(),
            tools: ToolsConfig::default(),
        }
    }
}

impl Config {
    /// Apply environment overrides on top of file values.
    pub fn apply_env(&mut self) {
        if let Ok(key) = std::env::var("GROQ_API_KEY") {
            if !key.is_empty() {
                self.groq_api_key = key;
            }
        }
        if let Ok(key) = std::env::var("HF_API_KEY") {
            if !key.is_empty() {
                self.huggingface_api_key = Some(key);
            }
        }
        if let Some(port) = std::env::var("GRAVITY_PORT").ok().and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }
    }

    /// Path of the JSON conversation store.
    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join("conversations.json")
    }
}

/// How fast a model answers, as advertised to clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speed {
    Fast,
    Medium,
    Slow,
}

/// Catalog entry describing a model and its owning provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Identifier sent to the provider
    pub name: String,
    pub provider: String,
    pub context_length: u32,
    pub speed: Speed,
    pub capabilities: Vec<String>,
}

impl ModelInfo {
    fn new(name: &str, provider: &str, context_length: u32, speed: Speed, capabilities: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            provider: provider.to_string(),
            context_length,
            speed,
            capabilities: capabilities.iter().map(|c| c.to_string()).collect(),
        }
    }
}

/// Built-in model catalog, keyed by the identifier callers use.
pub fn default_catalog() -> Vec<(String, ModelInfo)> {
    vec![
        (
            "llama-3.1-70b-versatile".to_string(),
            ModelInfo::new("llama-3.1-70b-versatile", "groq", 131072, Speed::Fast, &["chat", "code", "analysis", "reasoning"]),
        ),
        (
            "llama-3.1-8b-instant".to_string(),
            ModelInfo::new("llama-3.1-8b-instant", "groq", 131072, Speed::Fast, &["chat", "quick-tasks"]),
        ),
        (
            "mixtral-8x7b-32768".to_string(),
            ModelInfo::new("mixtral-8x7b-32768", "groq", 32768, Speed::Fast, &["chat", "code", "multilingual"]),
        ),
        (
            "gemma2-9b-it".to_string(),
            ModelInfo::new("gemma2-9b-it", "groq", 8192, Speed::Fast, &["chat", "quick-tasks"]),
        ),
        (
            "ollama/llama3.1".to_string(),
            ModelInfo::new("llama3.1", "ollama", 128000, Speed::Medium, &["chat", "code", "offline"]),
        ),
        (
            "ollama/mistral".to_string(),
            ModelInfo::new("mistral", "ollama", 32000, Speed::Medium, &["chat", "code", "offline"]),
        ),
    ]
}

/// Get the config directory path
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".gravity")
}

/// Get the config file path
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

/// Load configuration from the default path, falling back to defaults.
pub fn load() -> Result<Config> {
    load_from(&config_path())
}

/// Load configuration from `path`; a missing file yields defaults.
pub fn load_from(path: &Path) -> Result<Config> {
    let mut config = if path.exists() {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)?
    } else {
        debug!("No config at {:?}, using defaults", path);
        Config::default()
    };

    config.apply_env();
    Ok(config)
}

/// Save configuration to file
pub fn save(config: &Config) -> Result<()> {
    save_to(config, &config_path())
}

fn save_to(config: &Config, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let content = serde_json::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Interactive first-run setup
pub fn onboard() -> Result<()> {
    use crate::ui;
    use inquire::{Confirm, Select, Text};

    ui::print_header("Setup Wizard", "local");
    println!("  Let's get Gravity configured.\n");

    let mut config = Config::default();

    let key = Text::new("Groq API key (leave empty to rely on Ollama/HuggingFace):")
        .prompt()
        .map_err(|e| Error::Config(format!("Prompt failed: {}", e)))?;
    config.groq_api_key = key.trim().to_string();

    let models: Vec<String> = default_catalog().into_iter().map(|(id, _)| id).collect();
    config.default_model = Select::new("Default model:", models)
        .prompt()
        .map_err(|e| Error::Config(format!("Prompt failed: {}", e)))?;

    let hf = Confirm::new("Do you have a HuggingFace token?")
        .with_default(false)
        .prompt()
        .map_err(|e| Error::Config(format!("Prompt failed: {}", e)))?;
    if hf {
        let token = Text::new("HuggingFace token:")
            .prompt()
            .map_err(|e| Error::Config(format!("Prompt failed: {}", e)))?;
        config.huggingface_api_key = Some(token.trim().to_string());
    }

    ui::print_thinking("Creating data directory");
    std::fs::create_dir_all(&config.data_dir)?;

    ui::print_thinking("Saving configuration");
    save(&config)?;

    ui::print_success("Setup complete!");
    if config.groq_api_key.is_empty() {
        ui::print_warning("GROQ_API_KEY not set; get a free key at https://console.groq.com");
    }
    ui::print_step("Run 'gravity chat' to start talking.");

    Ok(())
}
