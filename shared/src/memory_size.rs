// memory_size.rs - max_memory_restart のサイズ表記

use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

const KIB: u64 = 1 << 10;
const MIB: u64 = 1 << 20;
const GIB: u64 = 1 << 30;

/// バイト数で正規化されたメモリサイズ
///
/// 文字列表記は `<数字>[K|M|G]`（大文字小文字は区別しない）。
/// 単位は2進接頭辞として扱う（1G = 2^30 バイト）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MemorySize(u64);

/// サイズ表記の解析エラー
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MemorySizeError {
    #[error("size is empty")]
    Empty,

    #[error("size must start with a digit: {0:?}")]
    MissingNumber(String),

    #[error("unrecognized size unit {unit:?} in {input:?} (expected K, M or G)")]
    UnknownUnit { input: String, unit: String },

    #[error("size {0:?} does not fit in 64 bits")]
    Overflow(String),

    #[error("size must not be negative: {0}")]
    Negative(String),

    #[error("size must be a whole number of bytes: {0}")]
    NotInteger(String),
}

impl MemorySize {
    pub const fn from_bytes(bytes: u64) -> Self {
        Self(bytes)
    }

    pub const fn bytes(&self) -> u64 {
        self.0
    }

    /// 割り切れる最大の単位で表記する
    pub fn to_display_string(&self) -> String {
        let bytes = self.0;
        if bytes == 0 {
            return "0".to_string();
        }

        for (unit, suffix) in [(GIB, "G"), (MIB, "M"), (KIB, "K")] {
            if bytes % unit == 0 {
                return format!("{}{suffix}", bytes / unit);
            }
        }

        bytes.to_string()
    }
}

impl FromStr for MemorySize {
    type Err = MemorySizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let input = s.trim();
        if input.is_empty() {
            return Err(MemorySizeError::Empty);
        }

        let digits_end = input
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(input.len());
        let (number, unit) = input.split_at(digits_end);

        if number.is_empty() {
            return Err(MemorySizeError::MissingNumber(input.to_string()));
        }

        let multiplier = match unit.to_ascii_uppercase().as_str() {
            "" => 1,
            "K" => KIB,
            "M" => MIB,
            "G" => GIB,
            _ => {
                return Err(MemorySizeError::UnknownUnit {
                    input: input.to_string(),
                    unit: unit.to_string(),
                })
            }
        };

        let value: u64 = number
            .parse()
            .map_err(|_| MemorySizeError::Overflow(input.to_string()))?;

        value
            .checked_mul(multiplier)
            .map(MemorySize)
            .ok_or_else(|| MemorySizeError::Overflow(input.to_string()))
    }
}

impl fmt::Display for MemorySize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_display_string())
    }
}

impl Serialize for MemorySize {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_display_string())
    }
}

/// 設定ファイル上の生の値（文字列表記または数値）
///
/// 文法チェックは読み込み後の検証で行うため、数値であれば負数や小数もここでは受け付ける。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawMemorySize {
    Bytes(u64),
    Signed(i64),
    Float(f64),
    Text(String),
}

impl RawMemorySize {
    pub fn parse(&self) -> Result<MemorySize, MemorySizeError> {
        match self {
            RawMemorySize::Bytes(bytes) => Ok(MemorySize::from_bytes(*bytes)),
            // u64 に収まらない整数は負数のみ
            RawMemorySize::Signed(value) => Err(MemorySizeError::Negative(value.to_string())),
            RawMemorySize::Float(value) if *value < 0.0 => {
                Err(MemorySizeError::Negative(value.to_string()))
            }
            RawMemorySize::Float(value) => Err(MemorySizeError::NotInteger(value.to_string())),
            RawMemorySize::Text(text) => text.parse(),
        }
    }

    /// エラー表示用の元の表記
    pub fn as_written(&self) -> String {
        match self {
            RawMemorySize::Bytes(bytes) => bytes.to_string(),
            RawMemorySize::Signed(value) => value.to_string(),
            RawMemorySize::Float(value) => value.to_string(),
            RawMemorySize::Text(text) => text.clone(),
        }
    }
}

impl From<MemorySize> for RawMemorySize {
    fn from(size: MemorySize) -> Self {
        RawMemorySize::Text(size.to_display_string())
    }
}
