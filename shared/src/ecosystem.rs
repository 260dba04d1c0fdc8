// ecosystem.rs - apps 配列を持つ設定ファイルの読み書き

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::descriptor::{validate_apps, ProcessDescriptor, RawDescriptor};
use crate::error::{ConfigParseError, LoadError, RenderError};
use crate::log_config;

/// ecosystem ファイルの形式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Json,
}

impl ConfigFormat {
    /// 拡張子から形式を判定
    pub fn from_path(path: &Path) -> Result<Self, LoadError> {
        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("toml") => Ok(ConfigFormat::Toml),
            Some("json") => Ok(ConfigFormat::Json),
            _ => Err(LoadError::UnsupportedFormat(path.to_path_buf())),
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ConfigFormat::Toml => "toml",
            ConfigFormat::Json => "json",
        }
    }
}

impl FromStr for ConfigFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "toml" => Ok(ConfigFormat::Toml),
            "json" => Ok(ConfigFormat::Json),
            other => Err(format!("unknown format: {other}")),
        }
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawEcosystem {
    apps: Vec<RawDescriptor>,
}

/// 起動順に並んだプロセス記述子の集合
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ecosystem {
    apps: Vec<ProcessDescriptor>,
}

impl Ecosystem {
    /// 文字列から読み込み（エラー表示では "<inline>" と表記）
    pub fn from_content(content: &str, format: ConfigFormat) -> Result<Self, LoadError> {
        Self::from_source(content, format, "<inline>")
    }

    /// 文字列から読み込み、検証まで行う
    pub fn from_source(
        content: &str,
        format: ConfigFormat,
        source_name: &str,
    ) -> Result<Self, LoadError> {
        let raw: RawEcosystem = match format {
            ConfigFormat::Toml => {
                toml::from_str(content).map_err(|e| ConfigParseError::new(source_name, e))?
            }
            ConfigFormat::Json => serde_json::from_str(content)
                .map_err(|e| ConfigParseError::new(source_name, e))?,
        };

        let apps = validate_apps(raw.apps)?;
        log_config!(
            debug,
            "Loaded {} app(s) from {}",
            apps.len(),
            source_name
        );

        Ok(Self { apps })
    }

    /// ファイルから読み込み（形式は拡張子で判定）
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let format = ConfigFormat::from_path(path)?;

        let content = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        Self::from_source(&content, format, &path.display().to_string())
    }

    /// 設定ファイルの形式に書き戻す
    pub fn render(&self, format: ConfigFormat) -> Result<String, RenderError> {
        match format {
            ConfigFormat::Toml => Ok(toml::to_string_pretty(self)?),
            ConfigFormat::Json => Ok(serde_json::to_string_pretty(self)?),
        }
    }

    /// ファイルに保存（形式は拡張子で判定）
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let format = ConfigFormat::from_path(path)?;
        let content = self
            .render(format)
            .context("Failed to serialize ecosystem")?;

        // ディレクトリが存在しない場合は作成
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create directory: {}", parent.display())
                })?;
            }
        }

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write ecosystem file: {}", path.display()))?;

        Ok(())
    }

    /// ecosystem ファイルパスの候補を取得（優先順位順）
    pub fn path_candidates() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        // 1. カレントディレクトリ
        if let Ok(current_dir) = std::env::current_dir() {
            paths.push(current_dir.join("ecosystem.toml"));
            paths.push(current_dir.join("ecosystem.json"));
        }

        // 2. ホームディレクトリの .appvisor/ecosystem.toml
        if let Some(home_dir) = home::home_dir() {
            paths.push(home_dir.join(".appvisor").join("ecosystem.toml"));
        }

        paths
    }

    /// ecosystem ファイルを自動検出して読み込み
    pub fn load_auto() -> Result<Option<(Self, PathBuf)>, LoadError> {
        for path in Self::path_candidates() {
            if path.exists() {
                let ecosystem = Self::from_file(&path)?;
                return Ok(Some((ecosystem, path)));
            }
        }
        Ok(None)
    }

    /// `appvisor init` が書き出すサンプル
    pub fn sample() -> Self {
        Self {
            apps: vec![ProcessDescriptor::sample()],
        }
    }

    pub fn apps(&self) -> &[ProcessDescriptor] {
        &self.apps
    }

    pub fn into_apps(self) -> Vec<ProcessDescriptor> {
        self.apps
    }

    pub fn get(&self, name: &str) -> Option<&ProcessDescriptor> {
        self.apps.iter().find(|app| app.name() == name)
    }

    pub fn len(&self) -> usize {
        self.apps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.apps.is_empty()
    }
}

/// ecosystem ファイルを読み込み、記述子を起動順で返す
pub fn load<P: AsRef<Path>>(path: P) -> Result<Vec<ProcessDescriptor>, LoadError> {
    Ecosystem::from_file(path).map(Ecosystem::into_apps)
}
