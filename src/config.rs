use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Embedded default configuration.
const DEFAULT_CONFIG: &str = include_str!("../config.default.toml");

/// Environment variable naming an alternative user config file.
pub const CONFIG_ENV: &str = "PIPESH_CONFIG";

#[derive(Debug, Deserialize)]
pub struct Config {
    pub prompt: PromptConfig,
    pub history: HistoryConfig,
    pub log: LogConfig,
    pub builtins: BuiltinsConfig,
}

#[derive(Debug, Deserialize)]
pub struct PromptConfig {
    pub symbol: String,
    /// Show `user@host` before the working directory.
    pub show_identity: bool,
    pub color: bool,
}

#[derive(Debug, Deserialize)]
pub struct HistoryConfig {
    /// Relative paths are resolved against `$HOME`.
    pub file: PathBuf,
    pub max_entries: usize,
}

#[derive(Debug, Deserialize)]
pub struct LogConfig {
    /// off, error, warn, info, debug or trace.
    pub level: String,
    /// Relative paths are resolved against `$HOME`.
    pub file: PathBuf,
}

#[derive(Debug, Deserialize)]
pub struct BuiltinsConfig {
    /// Process name `killallterms` looks for. Empty: this executable's name.
    pub process_name: String,
}

// ── User overlay: every field optional, scalars override ──

#[derive(Debug, Default, Deserialize)]
struct ConfigOverlay {
    #[serde(default)]
    prompt: PromptOverlay,
    #[serde(default)]
    history: HistoryOverlay,
    #[serde(default)]
    log: LogOverlay,
    #[serde(default)]
    builtins: BuiltinsOverlay,
}

#[derive(Debug, Default, Deserialize)]
struct PromptOverlay {
    symbol: Option<String>,
    show_identity: Option<bool>,
    color: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct HistoryOverlay {
    file: Option<PathBuf>,
    max_entries: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct LogOverlay {
    level: Option<String>,
    file: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct BuiltinsOverlay {
    process_name: Option<String>,
}

fn set<T>(slot: &mut T, value: Option<T>) {
    if let Some(v) = value {
        *slot = v;
    }
}

impl Config {
    /// The embedded defaults.
    pub fn default_config() -> Self {
        toml::from_str(DEFAULT_CONFIG).unwrap_or_else(|e| {
            log::error!("embedded default config: {e}");
            Self::fallback()
        })
    }

    fn fallback() -> Self {
        Self {
            prompt: PromptConfig {
                symbol: "$".to_string(),
                show_identity: true,
                color: true,
            },
            history: HistoryConfig {
                file: PathBuf::from(".pipesh_history"),
                max_entries: 1000,
            },
            log: LogConfig {
                level: "warn".to_string(),
                file: PathBuf::from(".local/share/pipesh/pipesh.log"),
            },
            builtins: BuiltinsConfig {
                process_name: String::new(),
            },
        }
    }

    /// Defaults, then the user overlay from `$PIPESH_CONFIG` or
    /// `~/.config/pipesh/config.toml` if one exists.
    pub fn load() -> Self {
        let mut config = Self::default_config();
        if let Some(overlay) = Self::load_overlay() {
            config.apply_overlay(overlay);
        }
        config
    }

    fn overlay_path() -> Option<PathBuf> {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Some(PathBuf::from(path));
        }
        let home = std::env::var_os("HOME")?;
        Some(Path::new(&home).join(".config/pipesh/config.toml"))
    }

    fn load_overlay() -> Option<ConfigOverlay> {
        let path = Self::overlay_path()?;
        let content = std::fs::read_to_string(&path).ok()?;
        match toml::from_str(&content) {
            Ok(overlay) => Some(overlay),
            Err(e) => {
                eprintln!("pipesh: {}: config parse error: {e}", path.display());
                None
            }
        }
    }

    fn apply_overlay(&mut self, overlay: ConfigOverlay) {
        set(&mut self.prompt.symbol, overlay.prompt.symbol);
        set(&mut self.prompt.show_identity, overlay.prompt.show_identity);
        set(&mut self.prompt.color, overlay.prompt.color);
        set(&mut self.history.file, overlay.history.file);
        set(&mut self.history.max_entries, overlay.history.max_entries);
        set(&mut self.log.level, overlay.log.level);
        set(&mut self.log.file, overlay.log.file);
        set(&mut self.builtins.process_name, overlay.builtins.process_name);
    }

    pub fn history_path(&self) -> PathBuf {
        under_home(&self.history.file)
    }

    pub fn log_path(&self) -> PathBuf {
        under_home(&self.log.file)
    }

    /// Name other shell instances run under.
    pub fn process_name(&self) -> String {
        if !self.builtins.process_name.is_empty() {
            return self.builtins.process_name.clone();
        }
        std::env::current_exe()
            .ok()
            .and_then(|exe| exe.file_name().map(|n| n.to_string_lossy().into_owned()))
            .unwrap_or_else(|| env!("CARGO_PKG_NAME").to_string())
    }
}

fn under_home(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    let home = std::env::var_os("HOME").unwrap_or_else(|| ".".into());
    Path::new(&home).join(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply_overlay_str(config: &mut Config, toml_str: &str) {
        let overlay: ConfigOverlay = toml::from_str(toml_str).unwrap();
        config.apply_overlay(overlay);
    }

    #[test]
    fn default_config_parses() {
        let config = Config::default_config();
        assert_eq!(config.prompt.symbol, "$");
        assert!(config.prompt.show_identity);
        assert_eq!(config.history.max_entries, 1000);
        assert_eq!(config.log.level, "warn");
        assert!(config.builtins.process_name.is_empty());
    }

    #[test]
    fn overlay_overrides_scalars() {
        let mut config = Config::default_config();
        apply_overlay_str(
            &mut config,
            r#"
            [prompt]
            symbol = ">"
            color = false

            [log]
            level = "debug"
        "#,
        );
        assert_eq!(config.prompt.symbol, ">");
        assert!(!config.prompt.color);
        assert_eq!(config.log.level, "debug");
        // untouched values keep their defaults
        assert!(config.prompt.show_identity);
        assert_eq!(config.history.max_entries, 1000);
    }

    #[test]
    fn empty_overlay_changes_nothing() {
        let mut config = Config::default_config();
        apply_overlay_str(&mut config, "");
        assert_eq!(config.prompt.symbol, "$");
        assert_eq!(config.history.file, PathBuf::from(".pipesh_history"));
    }

    #[test]
    fn absolute_paths_are_kept() {
        let mut config = Config::default_config();
        apply_overlay_str(&mut config, "[history]\nfile = \"/var/tmp/h\"\n");
        assert_eq!(config.history_path(), PathBuf::from("/var/tmp/h"));
    }

    #[test]
    fn explicit_process_name_wins() {
        let mut config = Config::default_config();
        apply_overlay_str(&mut config, "[builtins]\nprocess_name = \"myshell\"\n");
        assert_eq!(config.process_name(), "myshell");
    }
}
