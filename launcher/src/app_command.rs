use anyhow::{Context, Result};
use appvisor_shared::ProcessDescriptor;
use std::process::Stdio;
use tokio::process::{Child, Command};

/// 子プロセスに渡すアプリ名の環境変数
pub const APP_NAME_ENV: &str = "APPVISOR_APP_NAME";

/// 子プロセスに渡すインスタンス番号（0始まり）の環境変数
pub const INSTANCE_ENV: &str = "APPVISOR_INSTANCE";

/// 記述子1つ分のインスタンスを起動するコマンド
pub struct AppCommand<'a> {
    descriptor: &'a ProcessDescriptor,
    instance: u32,
}

impl<'a> AppCommand<'a> {
    pub fn new(descriptor: &'a ProcessDescriptor, instance: u32) -> Self {
        Self {
            descriptor,
            instance,
        }
    }

    /// tokio の Command を組み立てる
    pub fn build(&self) -> Command {
        let descriptor = self.descriptor;

        let mut cmd = if cfg!(windows) {
            // Windows環境では.cmdファイルも実行できるようにcmd.exeを経由する
            let mut cmd = Command::new("cmd");
            cmd.arg("/C").arg(descriptor.script()).args(descriptor.argv());
            cmd
        } else {
            let mut cmd = Command::new(descriptor.script());
            cmd.args(descriptor.argv());
            cmd
        };

        cmd.current_dir(descriptor.cwd());

        // 親の環境を引き継いだ上で記述子の env を上書きする
        cmd.envs(descriptor.env());
        cmd.env(APP_NAME_ENV, descriptor.name());
        cmd.env(INSTANCE_ENV, self.instance.to_string());

        cmd.stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        cmd
    }

    /// インスタンスを起動
    pub fn spawn(&self) -> Result<Child> {
        self.build().spawn().with_context(|| {
            format!(
                "Failed to spawn `{}` in {}",
                self.to_command_string(),
                self.descriptor.cwd().display()
            )
        })
    }

    /// コマンド文字列を生成（ログ用）
    pub fn to_command_string(&self) -> String {
        self.descriptor.command_line()
    }

    /// "name#instance" 形式のラベル
    pub fn label(&self) -> String {
        format!("{}#{}", self.descriptor.name(), self.instance)
    }
}
