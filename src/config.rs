//! Configuration loading.
//!
//! Loads [`BoothConfig`] from a TOML file (`--config`, else
//! `$FORTUNE_CONFIG_PATH`, else `./config.toml`). A missing file yields
//! defaults. Environment variables override file values.
//!
//! Precedence: env vars > config file > defaults.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::retry::RetryPolicy;
use crate::roster::workbook::SheetNames;

/// Environment variable naming the config file.
pub const CONFIG_PATH_VAR: &str = "FORTUNE_CONFIG_PATH";

// ── Top-level config ────────────────────────────────────────────

/// Top-level booth configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BoothConfig {
    /// Where the participant workbook comes from.
    pub source: SourceConfig,
    /// Workbook cache lifecycle.
    pub cache: CacheConfig,
    /// Model selection and call limits.
    pub llm: LlmConfig,
    /// Prompt wording knobs.
    pub prompt: PromptConfig,
    /// Terminal theme.
    pub presentation: PresentationConfig,
    /// Log level and log directory.
    pub logging: LoggingConfig,
}

impl BoothConfig {
    /// Load configuration with precedence: env vars > TOML file > defaults.
    ///
    /// `explicit` is the `--config` flag, which beats `$FORTUNE_CONFIG_PATH`.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be read or parsed.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        Self::load_with(explicit, |key| std::env::var(key).ok())
    }

    /// [`BoothConfig::load`] with an injectable environment resolver.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be read or parsed.
    pub fn load_with(
        explicit: Option<&Path>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let path = config_path_with(explicit, &env);
        let mut config = Self::load_from_file(&path)?;
        config.apply_overrides(&env);
        Ok(config)
    }

    fn load_from_file(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(contents) => {
                tracing::info!(path = %path.display(), "loading config from file");
                Self::from_toml(&contents)
                    .with_context(|| format!("invalid config at {}", path.display()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "no config file found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "failed to read config file {}: {e}",
                path.display()
            )),
        }
    }

    /// Parse a TOML string into config.
    ///
    /// # Errors
    ///
    /// Returns an error on malformed TOML or unknown enum values.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: BoothConfig = toml::from_str(toml_str).context("failed to parse config TOML")?;
        Ok(config)
    }

    /// Apply environment variable overrides.
    ///
    /// Takes a resolver function for testability (avoids `set_var` in tests).
    pub fn apply_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        // Source.
        if let Some(v) = env("FORTUNE_SOURCE_KIND") {
            match v.trim().to_ascii_lowercase().as_str() {
                "sharepoint" => self.source.kind = SourceKind::Sharepoint,
                "local" => self.source.kind = SourceKind::Local,
                _ => tracing::warn!(
                    var = "FORTUNE_SOURCE_KIND",
                    value = %v,
                    "ignoring invalid env override"
                ),
            }
        }
        if let Some(v) = env("SHAREPOINT_SITE_URL") {
            self.source.site_url = Some(v);
        }
        if let Some(v) = env("SHAREPOINT_FILE_URL") {
            self.source.file_path = Some(v);
        }
        if let Some(v) = env("FORTUNE_LOCAL_WORKBOOK") {
            self.source.local_workbook = PathBuf::from(v);
        }
        if let Some(v) = env("FORTUNE_CONTEXT_DIR") {
            self.source.context_dir = PathBuf::from(v);
        }

        // Cache.
        if let Some(v) = env("FORTUNE_CACHE_TTL_SECS") {
            match v.trim().parse::<u64>() {
                Ok(0) => self.cache.ttl_seconds = None,
                Ok(n) => self.cache.ttl_seconds = Some(n),
                Err(_) => tracing::warn!(
                    var = "FORTUNE_CACHE_TTL_SECS",
                    value = %v,
                    "ignoring invalid env override"
                ),
            }
        }

        // LLM.
        if let Some(v) = env("AI_MODEL").filter(|v| !v.trim().is_empty()) {
            self.llm.model = v;
        }
        if let Some(v) = env("FORTUNE_LLM_BASE_URL") {
            self.llm.base_url = Some(v);
        }
        if let Some(v) = env("FORTUNE_LLM_STREAM") {
            match parse_bool(&v) {
                Some(b) => self.llm.stream = b,
                None => tracing::warn!(
                    var = "FORTUNE_LLM_STREAM",
                    value = %v,
                    "ignoring invalid env override"
                ),
            }
        }

        // Logging.
        if let Some(v) = env("FORTUNE_LOG_LEVEL") {
            self.logging.level = v;
        }
    }
}

/// Resolve the config file path: explicit flag, then env var, then cwd.
pub fn config_path_with(
    explicit: Option<&Path>,
    env: impl Fn(&str) -> Option<String>,
) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }
    if let Some(p) = env(CONFIG_PATH_VAR) {
        return PathBuf::from(p);
    }
    PathBuf::from("config.toml")
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

// ── Source config ───────────────────────────────────────────────

/// Which data source backs the booth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Workbook downloaded from a SharePoint site.
    Sharepoint,
    /// Workbook read from the local filesystem.
    #[default]
    Local,
}

/// Data source settings (`[source]`).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Selected source.
    pub kind: SourceKind,
    /// SharePoint site URL, e.g. `https://tenant-my.sharepoint.com/personal/someone`.
    pub site_url: Option<String>,
    /// Server-relative path of the workbook on the site.
    pub file_path: Option<String>,
    /// Local workbook path.
    pub local_workbook: PathBuf,
    /// Directory holding `company_context.txt` and `role_definition.txt`.
    pub context_dir: PathBuf,
    /// Sheet names inside the workbook.
    pub sheets: SheetNames,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::Local,
            site_url: None,
            file_path: None,
            local_workbook: PathBuf::from("data/guest_information.xlsx"),
            context_dir: PathBuf::from("data"),
            sheets: SheetNames::default(),
        }
    }
}

// ── Cache config ────────────────────────────────────────────────

/// Workbook cache settings (`[cache]`).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Snapshot lifetime; `None` keeps it until a manual refresh.
    pub ttl_seconds: Option<u64>,
    /// Upper bound for one fetch attempt.
    pub fetch_timeout_seconds: u64,
    /// Retry policy for transient fetch failures.
    pub retry: RetryPolicy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: None,
            fetch_timeout_seconds: 30,
            retry: RetryPolicy::default(),
        }
    }
}

// ── LLM config ──────────────────────────────────────────────────

/// Model settings (`[llm]`).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Model spec, `provider/model` or a bare Gemini model name.
    pub model: String,
    /// Override for the provider's API host.
    pub base_url: Option<String>,
    /// Sampling temperature.
    pub temperature: f32,
    /// Output token cap.
    pub max_output_tokens: u32,
    /// Reasoning budget for providers that support one; `0` disables it.
    pub thinking_budget: Option<i32>,
    /// Request incremental output.
    pub stream: bool,
    /// Upper bound for one model call, retries included.
    pub timeout_seconds: u64,
    /// Retry policy for transient model failures.
    pub retry: RetryPolicy,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "gemini/gemini-2.5-flash".to_string(),
            base_url: None,
            temperature: 1.0,
            max_output_tokens: 2000,
            thinking_budget: Some(0),
            stream: false,
            timeout_seconds: 60,
            retry: RetryPolicy::default(),
        }
    }
}

// ── Prompt config ───────────────────────────────────────────────

/// Prompt wording settings (`[prompt]`).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    /// Word limit stated in the system instruction.
    pub max_words: u32,
    /// Year the fortune is for.
    pub target_year: u32,
    /// Zodiac label of the target year.
    pub year_label: String,
    /// Nationality value that switches the reply to English.
    pub secondary_language_nationality: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            max_words: 200,
            target_year: 2026,
            year_label: "Bính Ngọ".to_string(),
            secondary_language_nationality: "JP".to_string(),
        }
    }
}

// ── Presentation config ─────────────────────────────────────────

/// Terminal theme (`[presentation]`).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PresentationConfig {
    /// Main heading.
    pub title: String,
    /// Line under the heading.
    pub subtitle: String,
    /// Decorative banner line.
    pub banner: String,
    /// Line printed under each result.
    pub footer: String,
    /// Prompt for the identifier.
    pub identifier_prompt: String,
    /// Prompt for the optional fortune number.
    pub number_prompt: String,
}

impl Default for PresentationConfig {
    fn default() -> Self {
        Self {
            title: "🔮 Thầy Bói Tất Niên 🔮".to_string(),
            subtitle: "Year End Party 2025 ✨ Xem bói đầu năm Bính Ngọ 2026".to_string(),
            banner: "🎊🧧🎆🧧🎊🧧🎆🧧🎊".to_string(),
            footer: "🍀 Chúc bạn một năm mới an khang thịnh vượng! 🍀".to_string(),
            identifier_prompt: "Nhập MSNV hoặc Họ tên (Employee ID or Full Name)".to_string(),
            number_prompt: "Số may mắn (Fortune number, optional)".to_string(),
        }
    }
}

// ── Logging config ──────────────────────────────────────────────

/// Logging settings (`[logging]`).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
    /// Log directory; defaults to `~/.fortune-booth/logs`.
    pub dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            dir: None,
        }
    }
}

// ── Runtime paths ───────────────────────────────────────────────

/// Per-user runtime directories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimePaths {
    /// `~/.fortune-booth`.
    pub root: PathBuf,
    /// `~/.fortune-booth/logs`.
    pub logs_dir: PathBuf,
}

/// Resolve runtime paths under the user's home directory.
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn runtime_paths() -> Result<RuntimePaths> {
    let home = directories::BaseDirs::new()
        .ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?;
    let root = home.home_dir().join(".fortune-booth");
    Ok(RuntimePaths {
        logs_dir: root.join("logs"),
        root,
    })
}
