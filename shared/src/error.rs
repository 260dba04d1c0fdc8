// error.rs - 設定読み込みのエラー型

use crate::memory_size::MemorySizeError;
use std::path::PathBuf;
use thiserror::Error;

/// 設定ソースが構文的に正しくない（構文エラー、必須項目の欠落、型の不一致、未知の項目）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("failed to parse {source_name}: {message}")]
pub struct ConfigParseError {
    /// ファイルパスまたは "<inline>"
    pub source_name: String,
    pub message: String,
}

impl ConfigParseError {
    pub fn new(source_name: impl Into<String>, message: impl ToString) -> Self {
        Self {
            source_name: source_name.into(),
            message: message.to_string(),
        }
    }
}

/// フィールドが不変条件を満たさない
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigValidationError {
    #[error("apps[{index}]: name must not be empty")]
    EmptyName { index: usize },

    #[error("apps[{index}] ({name}): name is already used by apps[{first_index}]")]
    DuplicateName {
        index: usize,
        name: String,
        first_index: usize,
    },

    #[error("apps[{index}] ({name}): script must not be empty")]
    EmptyScript { index: usize, name: String },

    #[error("apps[{index}] ({name}): args has an unbalanced {quote} quote: {args:?}")]
    UnbalancedQuote {
        index: usize,
        name: String,
        args: String,
        quote: char,
    },

    #[error("apps[{index}] ({name}): cwd must be an absolute path, got {cwd:?}")]
    RelativeCwd {
        index: usize,
        name: String,
        cwd: PathBuf,
    },

    #[error("apps[{index}] ({name}): instances must be between 1 and {max}, got {value}", max = crate::descriptor::MAX_INSTANCES)]
    InvalidInstances {
        index: usize,
        name: String,
        value: i64,
    },

    #[error("apps[{index}] ({name}): invalid max_memory_restart {value:?}: {reason}")]
    InvalidMemorySize {
        index: usize,
        name: String,
        value: String,
        reason: MemorySizeError,
    },
}

impl ConfigValidationError {
    /// 違反したアプリの位置（ソース上の順番）
    pub fn index(&self) -> usize {
        match self {
            Self::EmptyName { index }
            | Self::DuplicateName { index, .. }
            | Self::EmptyScript { index, .. }
            | Self::UnbalancedQuote { index, .. }
            | Self::RelativeCwd { index, .. }
            | Self::InvalidInstances { index, .. }
            | Self::InvalidMemorySize { index, .. } => *index,
        }
    }
}

/// ecosystem ファイル読み込み時のエラー
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported ecosystem file format: {} (expected .toml or .json)", .0.display())]
    UnsupportedFormat(PathBuf),

    #[error(transparent)]
    Parse(#[from] ConfigParseError),

    #[error(transparent)]
    Validation(#[from] ConfigValidationError),
}

impl LoadError {
    pub fn is_parse(&self) -> bool {
        matches!(self, LoadError::Parse(_))
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, LoadError::Validation(_))
    }
}

/// 設定ファイル形式への書き出しエラー
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("failed to render TOML: {0}")]
    Toml(#[from] toml::ser::Error),

    #[error("failed to render JSON: {0}")]
    Json(#[from] serde_json::Error),
}
