use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::logging::LogLevel;

/// appvisor 自身の設定（ecosystem ファイルとは別）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    /// ログ設定
    #[serde(default)]
    pub logging: LoggingSettings,

    /// ランチャー設定
    #[serde(default)]
    pub launcher: LauncherSettings,
}

/// ログ関連の設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// 詳細ログを有効にするか（level より優先して debug にする）
    #[serde(default)]
    pub verbose: bool,

    /// ログレベル ("error" / "warn" / "info" / "debug" / "trace")
    #[serde(default = "default_log_level")]
    pub level: String,

    /// ログファイルのパス（未指定なら標準エラー出力）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
}

/// ランチャー関連の設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LauncherSettings {
    /// 既定の ecosystem ファイル
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ecosystem_file: Option<PathBuf>,

    /// 再起動までの待ち時間
    #[serde(default = "default_restart_delay_ms")]
    pub restart_delay_ms: u64,

    /// これより短い稼働で終了した場合は不安定な再起動として数える
    #[serde(default = "default_min_uptime_ms")]
    pub min_uptime_ms: u64,

    /// 連続した不安定な再起動の上限
    #[serde(default = "default_max_restarts")]
    pub max_restarts: u32,

    /// 停止要求から強制終了までの猶予
    #[serde(default = "default_kill_timeout_ms")]
    pub kill_timeout_ms: u64,

    /// 常駐メモリの確認間隔
    #[serde(default = "default_memory_check_interval_ms")]
    pub memory_check_interval_ms: u64,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            verbose: false,
            level: default_log_level(),
            log_file: None,
        }
    }
}

impl Default for LauncherSettings {
    fn default() -> Self {
        Self {
            ecosystem_file: None,
            restart_delay_ms: default_restart_delay_ms(),
            min_uptime_ms: default_min_uptime_ms(),
            max_restarts: default_max_restarts(),
            kill_timeout_ms: default_kill_timeout_ms(),
            memory_check_interval_ms: default_memory_check_interval_ms(),
        }
    }
}

// デフォルト値関数
fn default_log_level() -> String {
    "info".to_string()
}

fn default_restart_delay_ms() -> u64 {
    1000
}

fn default_min_uptime_ms() -> u64 {
    1000
}

fn default_max_restarts() -> u32 {
    16
}

fn default_kill_timeout_ms() -> u64 {
    1600
}

fn default_memory_check_interval_ms() -> u64 {
    30_000
}

impl LoggingSettings {
    /// 実際に使うログレベル
    pub fn effective_level(&self) -> LogLevel {
        if self.verbose {
            LogLevel::Debug.max(LogLevel::from(self.level.as_str()))
        } else {
            LogLevel::from(self.level.as_str())
        }
    }
}

impl LauncherSettings {
    pub fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }

    pub fn min_uptime(&self) -> Duration {
        Duration::from_millis(self.min_uptime_ms)
    }

    pub fn kill_timeout(&self) -> Duration {
        Duration::from_millis(self.kill_timeout_ms)
    }

    /// 0 は 1ms として扱う（tokio の interval は 0 を受け付けない）
    pub fn memory_check_interval(&self) -> Duration {
        Duration::from_millis(self.memory_check_interval_ms.max(1))
    }
}

impl Config {
    /// 設定ファイルから読み込み
    pub fn from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;

        Ok(config)
    }

    /// 設定ファイルに保存
    pub fn save_to_file<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        // ディレクトリが存在しない場合は作成
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        Ok(())
    }

    /// 設定ファイルパスの候補を取得（優先順位順）
    pub fn config_path_candidates() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        // 1. カレントディレクトリの .appvisor/config.toml
        if let Ok(current_dir) = std::env::current_dir() {
            paths.push(current_dir.join(".appvisor").join("config.toml"));
        }

        // 2. ホームディレクトリの .appvisor/config.toml
        if let Some(home_dir) = home::home_dir() {
            paths.push(home_dir.join(".appvisor").join("config.toml"));
        }

        // 3. XDG規格に従った設定ディレクトリ
        if let Ok(xdg_config_home) = std::env::var("XDG_CONFIG_HOME") {
            paths.push(
                PathBuf::from(xdg_config_home)
                    .join("appvisor")
                    .join("config.toml"),
            );
        } else if let Some(home_dir) = home::home_dir() {
            paths.push(home_dir.join(".config").join("appvisor").join("config.toml"));
        }

        paths
    }

    /// 設定ファイルを自動検出して読み込み
    pub fn load_auto() -> Result<Option<(Self, PathBuf)>> {
        for path in Self::config_path_candidates() {
            if path.exists() {
                let config = Self::from_file(&path)?;
                return Ok(Some((config, path)));
            }
        }
        Ok(None)
    }

    /// 環境変数で設定を上書き
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// 任意の取得関数で上書き（テストではプロセス環境を汚さずに使う）
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        // ログ設定
        if let Some(verbose) = lookup("APPVISOR_VERBOSE") {
            self.logging.verbose = verbose == "1" || verbose.to_lowercase() == "true";
        }

        if let Some(level) = lookup("APPVISOR_LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Some(log_file) = lookup("APPVISOR_LOG_FILE") {
            self.logging.log_file = Some(PathBuf::from(log_file));
        }

        // ランチャー設定
        if let Some(ecosystem) = lookup("APPVISOR_ECOSYSTEM") {
            self.launcher.ecosystem_file = Some(PathBuf::from(ecosystem));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert!(!config.logging.verbose);
        assert_eq!(config.logging.level, "info");
        assert!(config.logging.log_file.is_none());
        assert_eq!(config.launcher.restart_delay_ms, 1000);
        assert_eq!(config.launcher.min_uptime_ms, 1000);
        assert_eq!(config.launcher.max_restarts, 16);
        assert_eq!(config.launcher.kill_timeout(), Duration::from_millis(1600));
        assert_eq!(
            config.launcher.memory_check_interval(),
            Duration::from_secs(30)
        );
    }

    #[test]
    fn test_config_deserialization() {
        let toml_content = r#"
[logging]
verbose = true

[launcher]
ecosystem_file = "/etc/appvisor/ecosystem.toml"
max_restarts = 3
memory_check_interval_ms = 0
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        assert!(config.logging.verbose);
        assert_eq!(config.logging.level, "info");
        assert_eq!(
            config.launcher.ecosystem_file,
            Some(PathBuf::from("/etc/appvisor/ecosystem.toml"))
        );
        assert_eq!(config.launcher.max_restarts, 3);
        assert_eq!(config.launcher.restart_delay_ms, 1000);
        assert_eq!(
            config.launcher.memory_check_interval(),
            Duration::from_millis(1)
        );
    }

    #[test]
    fn test_config_file_operations() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.logging.level = "debug".to_string();
        config.launcher.restart_delay_ms = 250;
        config.save_to_file(&config_path).unwrap();

        let loaded_config = Config::from_file(&config_path).unwrap();
        assert_eq!(loaded_config, config);
    }

    #[test]
    fn test_from_file_reports_parse_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        std::fs::write(&config_path, "[launcher]\nmax_restarts = \"many\"\n").unwrap();

        let err = Config::from_file(&config_path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("APPVISOR_VERBOSE", "true"),
            ("APPVISOR_LOG_LEVEL", "warn"),
            ("APPVISOR_LOG_FILE", "/tmp/appvisor.log"),
            ("APPVISOR_ECOSYSTEM", "/srv/ecosystem.json"),
        ]);

        let mut config = Config::default();
        config.apply_overrides_from(|key| vars.get(key).map(|value| value.to_string()));

        assert!(config.logging.verbose);
        assert_eq!(config.logging.level, "warn");
        assert_eq!(
            config.logging.log_file,
            Some(PathBuf::from("/tmp/appvisor.log"))
        );
        assert_eq!(
            config.launcher.ecosystem_file,
            Some(PathBuf::from("/srv/ecosystem.json"))
        );
    }

    #[test]
    fn test_effective_level() {
        let mut logging = LoggingSettings::default();
        assert_eq!(logging.effective_level(), LogLevel::Info);

        logging.verbose = true;
        assert_eq!(logging.effective_level(), LogLevel::Debug);

        logging.level = "trace".to_string();
        assert_eq!(logging.effective_level(), LogLevel::Trace);

        logging.verbose = false;
        logging.level = "error".to_string();
        assert_eq!(logging.effective_level(), LogLevel::Error);
    }
}
