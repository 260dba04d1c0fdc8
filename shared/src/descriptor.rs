// descriptor.rs - 管理対象プロセス1つ分の宣言

use crate::error::ConfigValidationError;
use crate::memory_size::{MemorySize, RawMemorySize};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

/// 1アプリあたりのインスタンス数の上限（インスタンスごとにタスクと子プロセスを持つ）
pub const MAX_INSTANCES: u32 = 1024;

/// 起動・再起動・メモリ上限を含む、子プロセス1つ分の設定
///
/// 読み込み時に検証済みの値しか持たないため、フィールドは非公開にしてある。
/// 構築は ecosystem の読み込み経由のみ。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessDescriptor {
    name: String,
    script: String,
    args: String,
    cwd: PathBuf,
    watch: bool,
    instances: u32,
    autorestart: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_memory_restart: Option<MemorySize>,
    env: BTreeMap<String, String>,

    #[serde(skip)]
    argv: Vec<String>,
}

impl ProcessDescriptor {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 起動するインタプリタまたは実行ファイル
    pub fn script(&self) -> &str {
        &self.script
    }

    /// 設定に書かれたままの引数行
    pub fn args(&self) -> &str {
        &self.args
    }

    /// 引数行を分割したもの
    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    pub fn watch(&self) -> bool {
        self.watch
    }

    pub fn instances(&self) -> u32 {
        self.instances
    }

    pub fn autorestart(&self) -> bool {
        self.autorestart
    }

    pub fn max_memory_restart(&self) -> Option<MemorySize> {
        self.max_memory_restart
    }

    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// `appvisor init` 用のサンプル
    pub(crate) fn sample() -> Self {
        Self {
            name: "example-app".to_string(),
            script: "python3".to_string(),
            args: "app.py".to_string(),
            cwd: PathBuf::from("/srv/example-app"),
            watch: false,
            instances: 1,
            autorestart: true,
            max_memory_restart: Some(MemorySize::from_bytes(1 << 30)),
            env: BTreeMap::from([("NODE_ENV".to_string(), "production".to_string())]),
            argv: vec!["app.py".to_string()],
        }
    }

    /// 表示用のコマンド文字列
    pub fn command_line(&self) -> String {
        if self.args.is_empty() {
            self.script.clone()
        } else {
            format!("{} {}", self.script, self.args)
        }
    }
}

/// 環境変数の生の値
///
/// 数値や真偽値も受け付け、文字列化して子プロセスに渡す。
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub(crate) enum RawEnvValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
}

impl RawEnvValue {
    fn into_string(self) -> String {
        match self {
            RawEnvValue::Text(text) => text,
            RawEnvValue::Integer(value) => value.to_string(),
            RawEnvValue::Float(value) => value.to_string(),
            RawEnvValue::Bool(value) => value.to_string(),
        }
    }
}

/// 設定ファイル上の1エントリ（型チェックのみ済み、検証前）
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RawDescriptor {
    name: String,
    script: String,
    #[serde(default)]
    args: String,
    cwd: PathBuf,
    #[serde(default)]
    watch: bool,
    #[serde(default = "default_instances")]
    instances: i64,
    #[serde(default = "default_autorestart")]
    autorestart: bool,
    #[serde(default)]
    max_memory_restart: Option<RawMemorySize>,
    #[serde(default)]
    env: BTreeMap<String, RawEnvValue>,
}

fn default_instances() -> i64 {
    1
}

fn default_autorestart() -> bool {
    true
}

/// 生のエントリ列を検証し、ソース順のまま記述子に変換する
///
/// 最初に見つかった違反を返す。
pub(crate) fn validate_apps(
    raws: Vec<RawDescriptor>,
) -> Result<Vec<ProcessDescriptor>, ConfigValidationError> {
    let mut seen: HashMap<String, usize> = HashMap::with_capacity(raws.len());
    let mut apps = Vec::with_capacity(raws.len());

    for (index, raw) in raws.into_iter().enumerate() {
        if raw.name.trim().is_empty() {
            return Err(ConfigValidationError::EmptyName { index });
        }

        if let Some(&first_index) = seen.get(&raw.name) {
            return Err(ConfigValidationError::DuplicateName {
                index,
                name: raw.name,
                first_index,
            });
        }
        seen.insert(raw.name.clone(), index);

        apps.push(validate_one(index, raw)?);
    }

    Ok(apps)
}

fn validate_one(
    index: usize,
    raw: RawDescriptor,
) -> Result<ProcessDescriptor, ConfigValidationError> {
    let RawDescriptor {
        name,
        script,
        args,
        cwd,
        watch,
        instances,
        autorestart,
        max_memory_restart,
        env,
    } = raw;

    if script.trim().is_empty() {
        return Err(ConfigValidationError::EmptyScript { index, name });
    }

    let argv = match split_args(&args) {
        Ok(argv) => argv,
        Err(quote) => {
            return Err(ConfigValidationError::UnbalancedQuote {
                index,
                name,
                args,
                quote,
            })
        }
    };

    if !cwd.is_absolute() {
        return Err(ConfigValidationError::RelativeCwd { index, name, cwd });
    }

    let instances = match u32::try_from(instances) {
        Ok(value) if (1..=MAX_INSTANCES).contains(&value) => value,
        _ => {
            return Err(ConfigValidationError::InvalidInstances {
                index,
                name,
                value: instances,
            })
        }
    };

    let max_memory_restart = match max_memory_restart {
        Some(raw_size) => match raw_size.parse() {
            Ok(size) => Some(size),
            Err(reason) => {
                return Err(ConfigValidationError::InvalidMemorySize {
                    index,
                    name,
                    value: raw_size.as_written(),
                    reason,
                })
            }
        },
        None => None,
    };

    Ok(ProcessDescriptor {
        name,
        script,
        args,
        cwd,
        watch,
        instances,
        autorestart,
        max_memory_restart,
        env: env
            .into_iter()
            .map(|(key, value)| (key, value.into_string()))
            .collect(),
        argv,
    })
}

/// 引数行を空白で分割する
///
/// シングル/ダブルクォートで囲まれた部分は1語として扱う。
/// 閉じられていないクォートがあればその文字を返す。
pub fn split_args(line: &str) -> Result<Vec<String>, char> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;

    for c in line.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None if c == '"' || c == '\'' => {
                quote = Some(c);
                in_word = true;
            }
            None if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            None => {
                current.push(c);
                in_word = true;
            }
        }
    }

    if let Some(q) = quote {
        return Err(q);
    }
    if in_word {
        words.push(current);
    }

    Ok(words)
}
