use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rvm_core::service::{ServiceManager, ServiceManagerError, ServiceState, UnitQuery};
use rvm_linux::systemd::{parse_show_output, Systemctl};
use uuid::Uuid;

fn unique_temp_dir(prefix: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("{prefix}-{}", Uuid::new_v4()));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

struct CleanupDir(PathBuf);

impl Drop for CleanupDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}

/// 模拟 systemctl 的常见输出：单元不存在、权限不足、超时。
fn write_stub(dir: &Path) -> PathBuf {
    let script = format!(
        r#"#!/bin/sh
echo "$*" >> '{log}'
case "$1 $2" in
  "show edge.service") printf 'Id=edge.service\nLoadState=loaded\nActiveState=active\nSubState=running\n' ;;
  "show ghost.service") printf 'LoadState=not-found\nActiveState=inactive\n' ;;
  "start ghost.service") echo "Failed to start ghost.service: Unit ghost.service not found." >&2; exit 5 ;;
  "stop edge.service") echo "Failed to stop edge.service: Access denied" >&2; exit 4 ;;
  "restart slow.service") sleep 30 ;;
  "restart edge.service") ;;
  "daemon-reload ") ;;
  *) echo "unexpected: $*" >&2; exit 1 ;;
esac
"#,
        log = dir.join("calls.log").display()
    );
    let path = dir.join("systemctl");
    std::fs::write(&path, script).expect("write stub");
    let mut perms = std::fs::metadata(&path).expect("stat stub").permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).expect("chmod stub");
    path
}

#[test]
fn parse_show_output_reads_load_and_active_state() {
    let q = parse_show_output("Id=x.service\nLoadState=loaded\nActiveState=failed\nSubState=failed\n");
    assert_eq!(q, UnitQuery::new("loaded", "failed"));
    assert_eq!(ServiceState::classify(&q), ServiceState::Stopped);
    assert_eq!(parse_show_output(""), UnitQuery::default());
}

#[test]
fn systemctl_adapter_maps_exit_codes_and_stderr() {
    let dir = unique_temp_dir("rvm-systemctl-stub");
    let _cleanup = CleanupDir(dir.clone());
    let stub = write_stub(&dir);
    let systemctl = Systemctl::new(&stub.to_string_lossy(), Duration::from_millis(500));

    let q = systemctl.query("edge.service").unwrap();
    assert_eq!(ServiceState::classify(&q), ServiceState::Running);
    let q = systemctl.query("ghost.service").unwrap();
    assert_eq!(ServiceState::classify(&q), ServiceState::NotInstalled);

    assert!(systemctl.restart("edge.service").is_ok());
    assert!(systemctl.daemon_reload().is_ok());
    assert_eq!(
        systemctl.start("ghost.service").unwrap_err(),
        ServiceManagerError::UnitNotFound("ghost.service".to_string())
    );
    assert!(matches!(
        systemctl.stop("edge.service").unwrap_err(),
        ServiceManagerError::PermissionDenied(msg) if msg.contains("Access denied")
    ));
    assert!(matches!(
        systemctl.restart("slow.service").unwrap_err(),
        ServiceManagerError::Timeout(_)
    ));
    assert!(matches!(
        systemctl.enable("other.service").unwrap_err(),
        ServiceManagerError::Failed(msg) if msg.contains("exit 1")
    ));

    let log = std::fs::read_to_string(dir.join("calls.log")).unwrap();
    let calls: Vec<&str> = log.lines().collect();
    assert_eq!(
        calls[0],
        "show edge.service --property=LoadState,ActiveState"
    );
    assert!(calls.contains(&"restart edge.service"));
    assert!(calls.contains(&"daemon-reload"));
}
