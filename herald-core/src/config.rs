// ABOUTME: Configuration parsing from TOML file with environment variable overrides
// ABOUTME: Validates required fields and ships the Kiddzone bot texts as defaults
use crate::paths;
use crate::registry::PruneStrategy;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telegram: Option<TelegramConfig>,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub broadcast: BroadcastConfig,
    #[serde(default)]
    pub messages: MessagesConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

// ─── TelegramConfig ─────────────────────────────────────────────

#[derive(Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: String,
}

// Custom Debug impl to redact bot_token
impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("bot_token", &"[REDACTED]")
            .finish()
    }
}

// ─── RegistryConfig ─────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Path of the JSON subscriber file
    #[serde(default = "default_registry_path")]
    pub path: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            path: default_registry_path(),
        }
    }
}

fn default_registry_path() -> String {
    paths::REGISTRY_FILE_NAME.to_string()
}

// ─── BroadcastConfig ────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastConfig {
    /// Pause between the end of one cycle and the start of the next
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Delay before the first cycle so the transport can finish connecting
    #[serde(default = "default_startup_delay_ms")]
    pub startup_delay_ms: u64,
    /// Pause after each successful send (~20 msg/s at 50ms)
    #[serde(default = "default_send_delay_ms")]
    pub send_delay_ms: u64,
    /// Let shutdown stop a cycle between recipients instead of finishing it
    #[serde(default)]
    pub interruptible_cycles: bool,
    /// Re-read the registry before writing back pruned recipients
    #[serde(default)]
    pub recheck_on_prune: bool,
    /// Drop a recipient on any failed send, including network errors,
    /// rate limits and rejected messages
    #[serde(default)]
    pub drop_on_any_failure: bool,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            startup_delay_ms: default_startup_delay_ms(),
            send_delay_ms: default_send_delay_ms(),
            interruptible_cycles: false,
            recheck_on_prune: false,
            drop_on_any_failure: false,
        }
    }
}

impl BroadcastConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn startup_delay(&self) -> Duration {
        Duration::from_millis(self.startup_delay_ms)
    }

    pub fn send_delay(&self) -> Duration {
        Duration::from_millis(self.send_delay_ms)
    }

    pub fn prune_strategy(&self) -> PruneStrategy {
        if self.recheck_on_prune {
            PruneStrategy::RecheckStored
        } else {
            PruneStrategy::ReplaceWithSnapshot
        }
    }
}

fn default_interval_secs() -> u64 {
    120
}

fn default_startup_delay_ms() -> u64 {
    1000
}

fn default_send_delay_ms() -> u64 {
    50
}

// ─── MessagesConfig ─────────────────────────────────────────────

/// User-facing texts. Sent with HTML parse mode, so `<`, `>` and `&` that
/// are not markup must be escaped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagesConfig {
    #[serde(default = "default_welcome")]
    pub welcome: String,
    #[serde(default = "default_promo")]
    pub promo: String,
    #[serde(default = "default_unsubscribed")]
    pub unsubscribed: String,
    #[serde(default = "default_not_subscribed")]
    pub not_subscribed: String,
    #[serde(default = "default_button_label")]
    pub button_label: String,
    #[serde(default = "default_web_app_url")]
    pub web_app_url: Url,
}

impl Default for MessagesConfig {
    fn default() -> Self {
        Self {
            welcome: default_welcome(),
            promo: default_promo(),
            unsubscribed: default_unsubscribed(),
            not_subscribed: default_not_subscribed(),
            button_label: default_button_label(),
            web_app_url: default_web_app_url(),
        }
    }
}

fn default_welcome() -> String {
    "Добро пожаловать в Kiddzone! Нажмите кнопку ниже, чтобы открыть приложение o(^▽^)o"
        .to_string()
}

fn default_promo() -> String {
    "Стильные образы для вашего ребёнка на каждый день. Низкие цены и высокое качество. Спешите за покупками!"
        .to_string()
}

fn default_unsubscribed() -> String {
    "Вы отписались от рассылки".to_string()
}

fn default_not_subscribed() -> String {
    "Вы и так не были подписаны на рассылку ψ(._. )&gt;".to_string()
}

fn default_button_label() -> String {
    "Открыть Web App".to_string()
}

fn default_web_app_url() -> Url {
    Url::parse("https://igor8link.github.io/").expect("default web app URL is valid")
}

// ─── LoggingConfig ──────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
    /// Also write a daily-rotated log file under the data directory
    #[serde(default)]
    pub file: bool,
    /// EnvFilter directive used when RUST_LOG is not set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

// ─── MetricsConfig ──────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Serve Prometheus metrics on this address when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prometheus_addr: Option<SocketAddr>,
}

/// Expand tilde (~) to home directory in paths
/// Logs a warning if expansion fails and falls back to the original path
fn expand_tilde(path: &str) -> String {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(base_dirs) = directories::BaseDirs::new() {
            return base_dirs
                .home_dir()
                .join(stripped)
                .to_string_lossy()
                .to_string();
        }
        tracing::warn!(
            path = %path,
            "Failed to expand tilde in path: could not determine home directory"
        );
    }
    path.to_string()
}

impl Config {
    /// Find the config file, checking multiple locations in order:
    /// 1. HERALD_CONFIG_PATH env var (if set)
    /// 2. ./config.toml
    /// 3. ~/.config/herald/config.toml
    fn find_config_file() -> Option<PathBuf> {
        if let Ok(env_path) = std::env::var("HERALD_CONFIG_PATH") {
            let path = PathBuf::from(&env_path);
            if path.exists() {
                return Some(path);
            }
        }

        let local_config = PathBuf::from("config.toml");
        if local_config.exists() {
            return Some(local_config);
        }

        let xdg_config = paths::config_file();
        if xdg_config.exists() {
            return Some(xdg_config);
        }

        None
    }

    /// Load configuration from the first config file found, with environment
    /// variable overrides. Falls back to defaults when no file exists.
    pub fn load() -> Result<Self> {
        Self::load_from(Self::find_config_file().as_deref())
    }

    /// Load configuration from an explicit path (or defaults when `None`),
    /// then apply environment overrides and validate.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(config_path) => {
                tracing::info!(
                    path = %config_path.display(),
                    "Loading configuration from file"
                );
                let content = std::fs::read_to_string(config_path)
                    .with_context(|| format!("Failed to read {}", config_path.display()))?;
                toml::from_str::<Config>(&content)
                    .with_context(|| format!("Failed to parse {}", config_path.display()))?
            }
            None => {
                tracing::info!("No config file found, using environment variables and defaults");
                Config::default()
            }
        };

        config.apply_env_overrides()?;
        config.registry.path = expand_tilde(&config.registry.path);
        config.validate()?;

        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(val) = std::env::var("TELEGRAM_BOT_TOKEN") {
            self.telegram = Some(TelegramConfig { bot_token: val });
            // Clear from environment to prevent exposure via /proc or ps
            std::env::remove_var("TELEGRAM_BOT_TOKEN");
        }
        if let Ok(val) = std::env::var("HERALD_REGISTRY_PATH") {
            self.registry.path = val;
        }
        if let Ok(val) = std::env::var("BROADCAST_INTERVAL_SECS") {
            self.broadcast.interval_secs = val.parse().with_context(|| {
                format!("BROADCAST_INTERVAL_SECS must be a number of seconds, got: {}", val)
            })?;
        }
        if let Ok(val) = std::env::var("BROADCAST_SEND_DELAY_MS") {
            self.broadcast.send_delay_ms = val.parse().with_context(|| {
                format!("BROADCAST_SEND_DELAY_MS must be a number of milliseconds, got: {}", val)
            })?;
        }
        if let Ok(val) = std::env::var("WEB_APP_URL") {
            self.messages.web_app_url = Url::parse(&val)
                .with_context(|| format!("WEB_APP_URL must be a valid URL, got: {}", val))?;
        }
        if let Ok(val) = std::env::var("METRICS_ADDR") {
            self.metrics.prometheus_addr = Some(val.parse().with_context(|| {
                format!("METRICS_ADDR must be a socket address like 127.0.0.1:9100, got: {}", val)
            })?);
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if let Some(ref telegram) = self.telegram {
            if telegram.bot_token.trim().is_empty() {
                anyhow::bail!(
                    "telegram.bot_token must not be empty (set in config.toml or TELEGRAM_BOT_TOKEN env var)"
                );
            }
        }
        if self.registry.path.trim().is_empty() {
            anyhow::bail!("registry.path must not be empty");
        }
        if self.broadcast.interval_secs == 0 {
            anyhow::bail!("broadcast.interval_secs must be greater than zero");
        }
        if self.messages.web_app_url.scheme() != "https" {
            anyhow::bail!(
                "messages.web_app_url must use https (Telegram rejects other web app URLs), got: {}",
                self.messages.web_app_url
            );
        }
        let texts = [
            ("welcome", &self.messages.welcome),
            ("promo", &self.messages.promo),
            ("unsubscribed", &self.messages.unsubscribed),
            ("not_subscribed", &self.messages.not_subscribed),
            ("button_label", &self.messages.button_label),
        ];
        for (key, text) in texts {
            if text.trim().is_empty() {
                anyhow::bail!("messages.{} must not be empty", key);
            }
        }
        Ok(())
    }

    /// Get the Telegram config, returning an error if no token was provided.
    pub fn telegram_config(&self) -> Result<&TelegramConfig> {
        self.telegram.as_ref().ok_or_else(|| {
            anyhow::anyhow!(
                "Telegram bot token is required (set [telegram] bot_token or TELEGRAM_BOT_TOKEN)"
            )
        })
    }

    pub fn registry_path(&self) -> PathBuf {
        PathBuf::from(&self.registry.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert!(config.telegram.is_none());
        assert_eq!(config.registry.path, "users.json");
        assert_eq!(config.broadcast.interval(), Duration::from_secs(120));
        assert_eq!(config.broadcast.startup_delay(), Duration::from_secs(1));
        assert_eq!(config.broadcast.send_delay(), Duration::from_millis(50));
        assert!(!config.broadcast.interruptible_cycles);
        assert!(!config.broadcast.drop_on_any_failure);
        assert_eq!(
            config.broadcast.prune_strategy(),
            PruneStrategy::ReplaceWithSnapshot
        );
        assert_eq!(
            config.messages.web_app_url.as_str(),
            "https://igor8link.github.io/"
        );
        assert!(config.metrics.prometheus_addr.is_none());
    }

    #[test]
    fn test_full_config_deserialize() {
        let toml_str = r#"
            [telegram]
            bot_token = "123456:ABC-DEF"

            [registry]
            path = "/var/lib/herald/users.json"

            [broadcast]
            interval_secs = 600
            startup_delay_ms = 0
            send_delay_ms = 100
            interruptible_cycles = true
            recheck_on_prune = true

            [messages]
            welcome = "hi"
            promo = "buy"
            button_label = "Open"
            web_app_url = "https://shop.example.com/app"

            [logging]
            json = true

            [metrics]
            prometheus_addr = "127.0.0.1:9100"
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.telegram.as_ref().unwrap().bot_token, "123456:ABC-DEF");
        assert_eq!(config.broadcast.interval_secs, 600);
        assert_eq!(config.broadcast.prune_strategy(), PruneStrategy::RecheckStored);
        assert_eq!(config.messages.button_label, "Open");
        // Unspecified texts keep their defaults
        assert_eq!(config.messages.unsubscribed, "Вы отписались от рассылки");
        assert!(config.logging.json);
        assert!(!config.logging.file);
        assert_eq!(
            config.metrics.prometheus_addr,
            Some("127.0.0.1:9100".parse().unwrap())
        );
    }

    #[test]
    fn test_telegram_config_debug_redacts_token() {
        let config = TelegramConfig {
            bot_token: "secret-token".to_string(),
        };
        let debug_str = format!("{:?}", config);
        assert!(!debug_str.contains("secret-token"), "bot_token should be redacted in Debug output");
        assert!(debug_str.contains("[REDACTED]"));
    }

    #[test]
    fn test_default_texts_escape_html() {
        let messages = MessagesConfig::default();
        assert!(!messages.not_subscribed.contains('>'));
        assert!(messages.not_subscribed.contains("&gt;"));
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let mut config = Config::default();
        config.broadcast.interval_secs = 0;
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("interval_secs"), "unexpected error: {}", err);
    }

    #[test]
    fn test_validate_rejects_plain_http_web_app() {
        let mut config = Config::default();
        config.messages.web_app_url = Url::parse("http://example.com").unwrap();
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("https"), "unexpected error: {}", err);
    }

    #[test]
    fn test_validate_rejects_every_blank_text() {
        for key in ["welcome", "promo", "unsubscribed", "not_subscribed", "button_label"] {
            let mut config = Config::default();
            let text = match key {
                "welcome" => &mut config.messages.welcome,
                "promo" => &mut config.messages.promo,
                "unsubscribed" => &mut config.messages.unsubscribed,
                "not_subscribed" => &mut config.messages.not_subscribed,
                _ => &mut config.messages.button_label,
            };
            *text = " ".to_string();

            let err = config.validate().unwrap_err().to_string();
            assert!(
                err.contains(&format!("messages.{}", key)),
                "unexpected error for {}: {}",
                key,
                err
            );
        }
    }

    #[test]
    fn test_validate_accepts_defaults() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_blank_token() {
        let mut config = Config::default();
        config.telegram = Some(TelegramConfig {
            bot_token: "  ".to_string(),
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_telegram_config_required_accessor() {
        let config = Config::default();
        assert!(config.telegram_config().is_err());
    }

    #[test]
    fn test_expand_tilde_leaves_other_paths() {
        assert_eq!(expand_tilde("/tmp/users.json"), "/tmp/users.json");
        assert_eq!(expand_tilde("users.json"), "users.json");
    }
}
