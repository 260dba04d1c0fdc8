// logging.rs - レベル・カテゴリ付きの1行ログ
//
// 出力は既定で stderr。子プロセスの stdout/stderr と混ざらないよう
// ファイルへ逃がすこともできる。

use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Mutex, OnceLock};

/// ログレベル（小さいほど重要）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
    Trace = 4,
}

impl LogLevel {
    const ALL: [LogLevel; 5] = [
        LogLevel::Error,
        LogLevel::Warn,
        LogLevel::Info,
        LogLevel::Debug,
        LogLevel::Trace,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
            LogLevel::Trace => "TRACE",
        }
    }

    fn from_u8(value: u8) -> Self {
        Self::ALL
            .get(value as usize)
            .copied()
            .unwrap_or(LogLevel::Info)
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 大文字小文字を区別しない。知らない名前は Info 扱い
impl From<&str> for LogLevel {
    fn from(s: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(s.trim()))
            .unwrap_or(LogLevel::Info)
    }
}

/// ログカテゴリ
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogCategory {
    /// 起動・終了など全体の流れ
    System,
    /// 設定ファイルと ecosystem ファイルの読み込み
    Config,
    /// アプリ単位の起動計画
    Launcher,
    /// 子プロセスの状態遷移
    Process,
    /// メモリ上限の監視
    Memory,
    Signal,
}

impl fmt::Display for LogCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogCategory::System => "SYSTEM",
            LogCategory::Config => "CONFIG",
            LogCategory::Launcher => "LAUNCHER",
            LogCategory::Process => "PROCESS",
            LogCategory::Memory => "MEMORY",
            LogCategory::Signal => "SIGNAL",
        })
    }
}

static GLOBAL_LOG_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Info as u8);

type LogSink = Box<dyn Fn(&str) + Send + Sync>;

/// 未設定なら stderr
static LOG_OUTPUT: OnceLock<LogSink> = OnceLock::new();

pub fn set_log_level(level: LogLevel) {
    GLOBAL_LOG_LEVEL.store(level as u8, Ordering::Relaxed);
}

pub fn get_log_level() -> LogLevel {
    LogLevel::from_u8(GLOBAL_LOG_LEVEL.load(Ordering::Relaxed))
}

/// ログ出力先を設定（最初の1回のみ有効、2回目以降は false）
pub fn set_log_output<F>(output: F) -> bool
where
    F: Fn(&str) + Send + Sync + 'static,
{
    LOG_OUTPUT.set(Box::new(output)).is_ok()
}

/// ログをファイルに追記する
pub fn set_log_file<P: AsRef<Path>>(path: P) -> std::io::Result<bool> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path.as_ref())?;
    let file = Mutex::new(file);

    Ok(set_log_output(move |line| {
        if let Ok(mut file) = file.lock() {
            let _ = writeln!(file, "{line}");
        }
    }))
}

/// `[時刻] [レベル] [カテゴリ] メッセージ` の1行を出力
pub fn log_message(level: LogLevel, category: LogCategory, message: &str) {
    if level > get_log_level() {
        return;
    }

    let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
    let line = format!("[{timestamp}] [{level}] [{category}] {message}");

    match LOG_OUTPUT.get() {
        Some(output) => output(&line),
        None => eprintln!("{line}"),
    }
}

#[doc(hidden)]
#[macro_export]
macro_rules! __log {
    ($level:ident, $category:expr, $($arg:tt)*) => {
        $crate::logging::log_message(
            $crate::logging::LogLevel::$level,
            $category,
            &format!($($arg)*)
        )
    };
}

/// レベル別マクロ: `log_warn!(LogCategory::Config, "...", ...)`
#[macro_export]
macro_rules! log_error {
    ($category:expr, $($arg:tt)*) => { $crate::__log!(Error, $category, $($arg)*) };
}

#[macro_export]
macro_rules! log_warn {
    ($category:expr, $($arg:tt)*) => { $crate::__log!(Warn, $category, $($arg)*) };
}

#[macro_export]
macro_rules! log_info {
    ($category:expr, $($arg:tt)*) => { $crate::__log!(Info, $category, $($arg)*) };
}

#[macro_export]
macro_rules! log_debug {
    ($category:expr, $($arg:tt)*) => { $crate::__log!(Debug, $category, $($arg)*) };
}

#[macro_export]
macro_rules! log_trace {
    ($category:expr, $($arg:tt)*) => { $crate::__log!(Trace, $category, $($arg)*) };
}

/// カテゴリ別マクロ: `log_process!(info, "...", ...)`
#[macro_export]
macro_rules! log_system {
    ($level:ident, $($arg:tt)*) => {
        $crate::paste::paste! {
            $crate::[<log_ $level>]!($crate::logging::LogCategory::System, $($arg)*)
        }
    };
}

#[macro_export]
macro_rules! log_config {
    ($level:ident, $($arg:tt)*) => {
        $crate::paste::paste! {
            $crate::[<log_ $level>]!($crate::logging::LogCategory::Config, $($arg)*)
        }
    };
}

#[macro_export]
macro_rules! log_launcher {
    ($level:ident, $($arg:tt)*) => {
        $crate::paste::paste! {
            $crate::[<log_ $level>]!($crate::logging::LogCategory::Launcher, $($arg)*)
        }
    };
}

#[macro_export]
macro_rules! log_process {
    ($level:ident, $($arg:tt)*) => {
        $crate::paste::paste! {
            $crate::[<log_ $level>]!($crate::logging::LogCategory::Process, $($arg)*)
        }
    };
}

#[macro_export]
macro_rules! log_memory {
    ($level:ident, $($arg:tt)*) => {
        $crate::paste::paste! {
            $crate::[<log_ $level>]!($crate::logging::LogCategory::Memory, $($arg)*)
        }
    };
}

#[macro_export]
macro_rules! log_signal {
    ($level:ident, $($arg:tt)*) => {
        $crate::paste::paste! {
            $crate::[<log_ $level>]!($crate::logging::LogCategory::Signal, $($arg)*)
        }
    };
}
