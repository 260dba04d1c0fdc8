// memory_probe.rs - 子プロセスの常駐メモリ取得

/// 常駐メモリ（RSS）をバイト数で取得
///
/// 未対応のOSやプロセスが既に終了している場合は None。
pub async fn resident_bytes(pid: u32) -> Option<u64> {
    #[cfg(target_os = "linux")]
    {
        resident_bytes_linux(pid).await
    }
    #[cfg(target_os = "macos")]
    {
        resident_bytes_macos(pid).await
    }
    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    {
        let _ = pid;
        None // 他のOSでは未対応
    }
}

#[cfg(target_os = "linux")]
async fn resident_bytes_linux(pid: u32) -> Option<u64> {
    let status_path = format!("/proc/{pid}/status");
    let content = tokio::fs::read_to_string(status_path).await.ok()?;
    parse_vm_rss(&content)
}

#[cfg(target_os = "macos")]
async fn resident_bytes_macos(pid: u32) -> Option<u64> {
    use tokio::process::Command;

    let output = Command::new("ps")
        .args(["-o", "rss=", "-p", &pid.to_string()])
        .output()
        .await
        .ok()?;

    if !output.status.success() {
        return None;
    }

    let rss_kb: u64 = String::from_utf8_lossy(&output.stdout).trim().parse().ok()?;
    Some(rss_kb * 1024)
}

/// /proc/<pid>/status の VmRSS 行（kB 単位）をバイト数に変換
pub fn parse_vm_rss(status: &str) -> Option<u64> {
    let line = status.lines().find(|line| line.starts_with("VmRSS:"))?;
    let kb: u64 = line.split_whitespace().nth(1)?.parse().ok()?;
    Some(kb * 1024)
}
