// スーパーバイザーの統合テスト（実際に sh / sleep を起動する）

#![cfg(unix)]

mod common;

use appvisor_launcher::supervisor::{ExitReason, InstanceState, Supervisor};
use appvisor_shared::LauncherSettings;
use common::*;
use std::time::{Duration, Instant};

#[tokio::test]
async fn test_app_without_autorestart_stops_after_one_launch() {
    let apps = load_apps(&shell_app("once", "exit 0", "autorestart = false"));
    let reports = Supervisor::new(fast_settings(5)).run(apps).await;

    assert_eq!(reports.len(), 1);
    let report = &reports[0];
    assert_eq!(report.app, "once");
    assert_eq!(report.final_state, InstanceState::Stopped);
    assert_eq!(report.launches, 1);
    assert_eq!(report.restarts, 0);
    assert_eq!(report.last_exit, Some(ExitReason::Exited(Some(0))));
    assert!(report.last_started_at.is_some());
}

#[tokio::test]
async fn test_failing_app_gives_up_after_max_restarts() {
    let apps = load_apps(&shell_app("crashy", "exit 1", ""));
    let reports = Supervisor::new(fast_settings(2)).run(apps).await;

    let report = &reports[0];
    assert_eq!(report.final_state, InstanceState::Errored);
    assert_eq!(report.launches, 3);
    assert_eq!(report.restarts, 2);
    assert_eq!(report.last_exit, Some(ExitReason::Exited(Some(1))));
}

#[tokio::test]
async fn test_successful_exit_is_restarted_when_autorestart() {
    // 正常終了でも autorestart なら再起動される
    let apps = load_apps(&shell_app("periodic", "exit 0", "autorestart = true"));
    let reports = Supervisor::new(fast_settings(1)).run(apps).await;

    let report = &reports[0];
    assert_eq!(report.launches, 2);
    assert_eq!(report.final_state, InstanceState::Errored);
}

#[tokio::test]
async fn test_instances_get_their_own_index() {
    let apps = load_apps(&shell_app(
        "indexed",
        "exit $APPVISOR_INSTANCE",
        "instances = 3\nautorestart = false",
    ));
    let reports = Supervisor::new(fast_settings(0)).run(apps).await;

    assert_eq!(reports.len(), 3);
    for (index, report) in reports.iter().enumerate() {
        assert_eq!(report.instance, index as u32);
        assert_eq!(report.final_state, InstanceState::Stopped);
        assert_eq!(report.last_exit, Some(ExitReason::Exited(Some(index as i32))));
    }
}

#[tokio::test]
async fn test_reports_follow_declaration_order() {
    let source = format!(
        "{}{}",
        shell_app("slow", "sleep 0.2", "autorestart = false"),
        shell_app("fast", "exit 0", "autorestart = false")
    );
    let reports = Supervisor::new(fast_settings(0)).run(load_apps(&source)).await;

    let names: Vec<&str> = reports.iter().map(|report| report.app.as_str()).collect();
    assert_eq!(names, ["slow", "fast"]);
}

#[tokio::test]
async fn test_env_is_injected() {
    let apps = load_apps(&shell_app(
        "env",
        "test $NODE_ENV = production",
        "autorestart = false\n\n[apps.env]\nNODE_ENV = \"production\"",
    ));
    let reports = Supervisor::new(fast_settings(0)).run(apps).await;
    assert_eq!(reports[0].last_exit, Some(ExitReason::Exited(Some(0))));
}

#[tokio::test]
async fn test_spawn_failure_without_autorestart_is_errored() {
    let apps = load_apps(
        r#"
[[apps]]
name = "missing"
script = "/nonexistent/appvisor-test-binary"
cwd = "/"
autorestart = false
"#,
    );
    let reports = Supervisor::new(fast_settings(0)).run(apps).await;

    let report = &reports[0];
    assert_eq!(report.final_state, InstanceState::Errored);
    assert_eq!(report.launches, 1);
    assert_eq!(report.last_exit, Some(ExitReason::SpawnFailed));
}

#[tokio::test]
async fn test_shutdown_stops_running_app() {
    let apps = load_apps(&shell_app("sleeper", "sleep 30", ""));
    let supervisor = Supervisor::new(fast_settings(5));
    let handle = supervisor.shutdown_handle();

    let task = tokio::spawn(async move { supervisor.run(apps).await });
    tokio::time::sleep(Duration::from_millis(300)).await;
    handle.shutdown();

    let reports = tokio::time::timeout(Duration::from_secs(10), task)
        .await
        .expect("supervisor did not stop in time")
        .unwrap();

    let report = &reports[0];
    assert_eq!(report.final_state, InstanceState::Stopped);
    assert_eq!(report.launches, 1);
    assert_eq!(report.last_exit, Some(ExitReason::Shutdown));
}

#[tokio::test]
async fn test_stable_runs_reset_unstable_counter() {
    // 稼働時間が min_uptime を超えるので、何度終了しても諦めない
    let apps = load_apps(&shell_app("steady", "sleep 0.1", ""));
    let settings = LauncherSettings {
        min_uptime_ms: 50,
        ..fast_settings(1)
    };
    let supervisor = Supervisor::new(settings);
    let handle = supervisor.shutdown_handle();

    let task = tokio::spawn(async move { supervisor.run(apps).await });
    tokio::time::sleep(Duration::from_millis(1_000)).await;
    handle.shutdown();

    let reports = tokio::time::timeout(Duration::from_secs(10), task)
        .await
        .expect("supervisor did not stop in time")
        .unwrap();

    let report = &reports[0];
    assert_eq!(report.final_state, InstanceState::Stopped);
    assert!(report.launches > 2, "launches: {}", report.launches);
}

#[tokio::test]
async fn test_child_ignoring_sigint_is_killed_after_timeout() {
    let apps = load_apps(&shell_app(
        "stubborn",
        "trap : INT; while true; do sleep 0.05; done",
        "",
    ));
    let settings = LauncherSettings {
        kill_timeout_ms: 300,
        ..fast_settings(5)
    };
    let supervisor = Supervisor::new(settings);
    let handle = supervisor.shutdown_handle();

    let task = tokio::spawn(async move { supervisor.run(apps).await });
    tokio::time::sleep(Duration::from_millis(300)).await;

    let stopping = Instant::now();
    handle.shutdown();
    let reports = tokio::time::timeout(Duration::from_secs(10), task)
        .await
        .expect("supervisor did not stop in time")
        .unwrap();
    let elapsed = stopping.elapsed();

    // SIGINT を無視するので kill_timeout まで待ってから強制終了される
    assert!(elapsed >= Duration::from_millis(300), "stopped after {elapsed:?}");
    assert!(elapsed < Duration::from_secs(5), "stopped after {elapsed:?}");

    let report = &reports[0];
    assert_eq!(report.final_state, InstanceState::Stopped);
    assert_eq!(report.launches, 1);
    assert_eq!(report.last_exit, Some(ExitReason::Shutdown));
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_memory_ceiling_forces_restart() {
    // 1バイトの上限は必ず超える。autorestart = false でも再起動される
    let apps = load_apps(&shell_app(
        "hungry",
        "sleep 30",
        "autorestart = false\nmax_memory_restart = \"1\"",
    ));
    let reports = tokio::time::timeout(
        Duration::from_secs(20),
        Supervisor::new(fast_settings(1)).run(apps),
    )
    .await
    .expect("memory ceiling was not enforced");

    let report = &reports[0];
    assert_eq!(report.final_state, InstanceState::Errored);
    assert_eq!(report.launches, 2);
    assert!(matches!(report.last_exit, Some(ExitReason::MemoryExceeded(rss)) if rss > 1));
}
