// テストフィクスチャ
// Note: 統合テスト用共通関数は複数の統合テストファイルから使用されるが、
// Rustコンパイラーは各統合テストを独立してコンパイルするため
// dead_code警告が発生する。実際には使用されているため警告を抑制。

#![allow(dead_code)]

use std::path::{Path, PathBuf};

/// fixtures ディレクトリ内のファイルパス
pub fn fixture_path(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

/// 1アプリ分の TOML エントリを生成（追加フィールドは extra に書く）
pub fn app_toml(name: &str, extra: &str) -> String {
    format!(
        r#"
[[apps]]
name = "{name}"
script = "python3"
args = "bot.py"
cwd = "/srv/{name}"
{extra}
"#
    )
}

/// 一時ディレクトリにファイルを書いてパスを返す
pub fn write_temp_file(dir: &tempfile::TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, content).expect("failed to write temp file");
    path
}
