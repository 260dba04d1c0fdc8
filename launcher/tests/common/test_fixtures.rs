// ランチャー側テストフィクスチャ
// Note: 統合テスト用共通関数は複数の統合テストファイルから使用されるが、
// Rustコンパイラーは各統合テストを独立してコンパイルするため
// dead_code警告が発生する。実際には使用されているため警告を抑制。

#![allow(dead_code)]

use appvisor_shared::{ConfigFormat, Ecosystem, LauncherSettings, ProcessDescriptor};

/// TOML 文字列から記述子を読み込む
pub fn load_apps(source: &str) -> Vec<ProcessDescriptor> {
    Ecosystem::from_content(source, ConfigFormat::Toml)
        .expect("test ecosystem must be valid")
        .into_apps()
}

/// `sh -c <script>` を実行するアプリの TOML エントリ
pub fn shell_app(name: &str, script: &str, extra: &str) -> String {
    format!(
        r#"
[[apps]]
name = "{name}"
script = "sh"
args = "-c '{script}'"
cwd = "/"
{extra}
"#
    )
}

/// テスト用に短縮したタイミング設定
///
/// min_uptime を長くして、全ての終了を不安定な再起動として数える。
pub fn fast_settings(max_restarts: u32) -> LauncherSettings {
    LauncherSettings {
        ecosystem_file: None,
        restart_delay_ms: 10,
        min_uptime_ms: 60_000,
        max_restarts,
        kill_timeout_ms: 1_000,
        memory_check_interval_ms: 20,
    }
}
