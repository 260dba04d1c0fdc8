// supervisor.rs - インスタンスごとの起動・再起動ループ

use appvisor_shared::{
    log_launcher, log_memory, log_process, LauncherSettings, MemorySize, ProcessDescriptor,
};
use chrono::{DateTime, Local};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::process::Child;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;

use crate::app_command::AppCommand;
use crate::memory_probe;

/// インスタンスのライフサイクル状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    Stopped,
    Starting,
    Running,
    Restarting,
    /// 起動に失敗し続けたため諦めた
    Errored,
}

/// 1回の起動が終わった理由
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// プロセスが終了した（シグナル終了時は None）
    Exited(Option<i32>),
    /// メモリ上限を超えたため停止した（そのときの RSS）
    MemoryExceeded(u64),
    /// 停止要求により停止した
    Shutdown,
    /// 起動できなかった
    SpawnFailed,
}

/// インスタンスの最終結果
#[derive(Debug, Clone)]
pub struct InstanceReport {
    pub app: String,
    pub instance: u32,
    pub final_state: InstanceState,
    pub launches: u32,
    pub restarts: u32,
    pub last_exit: Option<ExitReason>,
    pub last_started_at: Option<DateTime<Local>>,
}

/// 停止要求を送るハンドル
#[derive(Clone)]
pub struct ShutdownHandle(Arc<watch::Sender<bool>>);

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.0.send_replace(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.0.borrow()
    }
}

/// 停止要求を待つ（送信側が消えた場合は永遠に待つ）
async fn wait_for_shutdown(rx: &mut watch::Receiver<bool>) {
    let closed = rx.wait_for(|stop| *stop).await.is_err();
    if closed {
        std::future::pending::<()>().await;
    }
}

/// 1インスタンス分の起動・監視・再起動
pub struct InstanceSupervisor {
    descriptor: Arc<ProcessDescriptor>,
    instance: u32,
    settings: LauncherSettings,
    shutdown: watch::Receiver<bool>,
    state: InstanceState,
}

impl InstanceSupervisor {
    pub fn new(
        descriptor: Arc<ProcessDescriptor>,
        instance: u32,
        settings: LauncherSettings,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            descriptor,
            instance,
            settings,
            shutdown,
            state: InstanceState::Stopped,
        }
    }

    fn label(&self) -> String {
        AppCommand::new(&self.descriptor, self.instance).label()
    }

    fn transition(&mut self, next: InstanceState) {
        if self.state != next {
            log_process!(
                debug,
                "{}: {:?} -> {:?}",
                self.label(),
                self.state,
                next
            );
            self.state = next;
        }
    }

    /// 停止するか諦めるまで起動を繰り返す
    pub async fn run(mut self) -> InstanceReport {
        let mut launches = 0u32;
        let mut restarts = 0u32;
        let mut unstable_restarts = 0u32;
        let mut last_exit = None;
        let mut last_started_at = None;

        loop {
            let stopping = *self.shutdown.borrow();
            if stopping {
                self.transition(InstanceState::Stopped);
                break;
            }

            self.transition(InstanceState::Starting);
            launches += 1;
            let started = Instant::now();
            last_started_at = Some(Local::now());

            let descriptor = self.descriptor.clone();
            let command = AppCommand::new(&descriptor, self.instance);
            let reason = match command.spawn() {
                Ok(child) => {
                    log_process!(
                        info,
                        "{}: started `{}` (pid {})",
                        command.label(),
                        command.to_command_string(),
                        child.id().map_or_else(|| "?".to_string(), |pid| pid.to_string())
                    );
                    self.transition(InstanceState::Running);
                    self.watch_child(child).await
                }
                Err(e) => {
                    log_process!(error, "{}: {:#}", command.label(), e);
                    ExitReason::SpawnFailed
                }
            };
            last_exit = Some(reason);

            match reason {
                ExitReason::Shutdown => {
                    self.transition(InstanceState::Stopped);
                    break;
                }
                ExitReason::Exited(_) if !self.descriptor.autorestart() => {
                    self.transition(InstanceState::Stopped);
                    break;
                }
                ExitReason::SpawnFailed if !self.descriptor.autorestart() => {
                    self.transition(InstanceState::Errored);
                    break;
                }
                // メモリ超過は autorestart に関係なく再起動する
                _ => {}
            }

            if started.elapsed() < self.settings.min_uptime() {
                unstable_restarts += 1;
            } else {
                unstable_restarts = 0;
            }

            if unstable_restarts > self.settings.max_restarts {
                log_process!(
                    error,
                    "{}: exited {} times within {:?} of starting, giving up",
                    self.label(),
                    unstable_restarts,
                    self.settings.min_uptime()
                );
                self.transition(InstanceState::Errored);
                break;
            }

            self.transition(InstanceState::Restarting);
            restarts += 1;

            let delay = self.settings.restart_delay();
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = wait_for_shutdown(&mut self.shutdown) => {}
            }
        }

        InstanceReport {
            app: self.descriptor.name().to_string(),
            instance: self.instance,
            final_state: self.state,
            launches,
            restarts,
            last_exit,
            last_started_at,
        }
    }

    /// 終了・停止要求・メモリ超過のいずれかまで子プロセスを見張る
    async fn watch_child(&mut self, mut child: Child) -> ExitReason {
        let label = self.label();
        let pid = child.id();
        let limit = self.descriptor.max_memory_restart();
        let kill_timeout = self.settings.kill_timeout();

        let mut memory_check = tokio::time::interval(self.settings.memory_check_interval());
        memory_check.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // 最初の tick は即座に返るので読み捨てる
        memory_check.tick().await;

        loop {
            tokio::select! {
                status = child.wait() => {
                    return match status {
                        Ok(status) => {
                            log_process!(info, "{}: exited with {}", label, status);
                            ExitReason::Exited(status.code())
                        }
                        Err(e) => {
                            log_process!(error, "{}: failed to wait for process: {}", label, e);
                            ExitReason::Exited(None)
                        }
                    };
                }
                _ = wait_for_shutdown(&mut self.shutdown) => {
                    log_process!(info, "{}: stopping", label);
                    stop_child(&mut child, kill_timeout).await;
                    return ExitReason::Shutdown;
                }
                _ = memory_check.tick(), if limit.is_some() && pid.is_some() => {
                    if let (Some(limit), Some(pid)) = (limit, pid) {
                        if let Some(rss) = exceeded_memory(pid, limit).await {
                            log_memory!(
                                warn,
                                "{}: resident memory {} exceeds max_memory_restart {}, restarting",
                                label,
                                MemorySize::from_bytes(rss),
                                limit
                            );
                            stop_child(&mut child, kill_timeout).await;
                            return ExitReason::MemoryExceeded(rss);
                        }
                    }
                }
            }
        }
    }
}

/// 上限を超えていればそのときの RSS を返す
async fn exceeded_memory(pid: u32, limit: MemorySize) -> Option<u64> {
    let rss = memory_probe::resident_bytes(pid).await?;
    (rss > limit.bytes()).then_some(rss)
}

/// SIGINT で停止を促し、猶予を過ぎたら強制終了する
async fn stop_child(child: &mut Child, kill_timeout: Duration) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        if let Some(pid) = child.id() {
            if kill(Pid::from_raw(pid as i32), Signal::SIGINT).is_ok()
                && matches!(
                    tokio::time::timeout(kill_timeout, child.wait()).await,
                    Ok(Ok(_))
                )
            {
                return;
            }
        }
    }
    #[cfg(not(unix))]
    let _ = kill_timeout;

    if let Err(e) = child.kill().await {
        log_process!(warn, "Failed to kill process: {}", e);
    }
}

/// 全アプリの全インスタンスを管理する
pub struct Supervisor {
    settings: LauncherSettings,
    shutdown_tx: Arc<watch::Sender<bool>>,
}

impl Supervisor {
    pub fn new(settings: LauncherSettings) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            settings,
            shutdown_tx: Arc::new(shutdown_tx),
        }
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle(self.shutdown_tx.clone())
    }

    /// 宣言順に起動し、全インスタンスが止まるまで待つ
    ///
    /// 結果はアプリの宣言順、インスタンス番号順に並ぶ。
    pub async fn run(&self, apps: Vec<ProcessDescriptor>) -> Vec<InstanceReport> {
        let mut tasks = JoinSet::new();

        for (order, descriptor) in apps.into_iter().enumerate() {
            if descriptor.watch() {
                log_launcher!(
                    warn,
                    "{}: watch = true is not supported, file changes will not restart it",
                    descriptor.name()
                );
            }

            log_launcher!(
                info,
                "Starting {} ({} instance(s))",
                descriptor.name(),
                descriptor.instances()
            );

            let descriptor = Arc::new(descriptor);
            for instance in 0..descriptor.instances() {
                let supervisor = InstanceSupervisor::new(
                    descriptor.clone(),
                    instance,
                    self.settings.clone(),
                    self.shutdown_tx.subscribe(),
                );
                tasks.spawn(async move { (order, supervisor.run().await) });
            }
        }

        let mut reports = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(report) => reports.push(report),
                Err(e) => log_launcher!(error, "Instance task failed: {}", e),
            }
        }

        reports.sort_by_key(|(order, report)| (*order, report.instance));
        reports.into_iter().map(|(_, report)| report).collect()
    }
}
