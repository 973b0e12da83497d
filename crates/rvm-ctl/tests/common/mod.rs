#![allow(dead_code)]

use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use uuid::Uuid;

pub fn unique_temp_dir(prefix: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("{prefix}-{}", Uuid::new_v4()));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

pub fn write_file(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create parent dir");
    }
    std::fs::write(path, content)
        .unwrap_or_else(|e| panic!("write {} failed: {e}", path.display()));
}

pub struct CleanupDir(pub PathBuf);

impl Drop for CleanupDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}

/// systemctl 桩：单元是否存在取决于单元目录中是否有同名文件，运行/自启状态记录在状态目录。
/// 状态目录中存在 `fail-<verb>` 时该动作失败。
const STUB: &str = r#"#!/bin/sh
units='@UNITS@'
state='@STATE@'
echo "$*" >> "$state/calls.log"
verb="$1"
unit="$2"
case "$verb" in
  show)
    if [ ! -e "$units/$unit" ]; then
      printf 'LoadState=not-found\nActiveState=inactive\n'
    elif [ -e "$state/$unit.active" ]; then
      printf 'LoadState=loaded\nActiveState=active\n'
    else
      printf 'LoadState=loaded\nActiveState=inactive\n'
    fi
    ;;
  daemon-reload)
    ;;
  start|stop|restart|enable|disable)
    if [ -e "$state/fail-$verb" ]; then
      echo "Job for $unit failed because the control process exited with error code." >&2
      exit 1
    fi
    if [ ! -e "$units/$unit" ]; then
      echo "Failed to $verb $unit: Unit $unit not found." >&2
      exit 5
    fi
    case "$verb" in
      start|restart) : > "$state/$unit.active" ;;
      stop) rm -f "$state/$unit.active" ;;
      enable) : > "$state/$unit.enabled" ;;
      disable) rm -f "$state/$unit.enabled" ;;
    esac
    ;;
  *)
    echo "Unknown command verb $verb." >&2
    exit 1
    ;;
esac
exit 0
"#;

/// 一台模拟设备：项目目录 + systemctl 桩 + 指向桩的配置文件。
pub struct Device {
    pub root: PathBuf,
    pub unit_dir: PathBuf,
    pub state_dir: PathBuf,
    pub config_path: PathBuf,
    _cleanup: CleanupDir,
}

impl Device {
    pub fn new(prefix: &str) -> Self {
        let base = unique_temp_dir(prefix);
        let root = base.join("project");
        let unit_dir = base.join("units");
        let state_dir = base.join("stub-state");
        for d in [&root, &unit_dir, &state_dir] {
            std::fs::create_dir_all(d).expect("create device dir");
        }

        let stub = base.join("systemctl");
        let script = STUB
            .replace("@UNITS@", &unit_dir.to_string_lossy())
            .replace("@STATE@", &state_dir.to_string_lossy());
        write_file(&stub, &script);
        let mut perms = std::fs::metadata(&stub).expect("stat stub").permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&stub, perms).expect("chmod stub");

        let config = serde_json::json!({
            "project_root": root,
            "primary_service": "myrvm-edge",
            "services": [
                { "name": "myrvm-edge", "template": "systemd/myrvm-edge.service.template" },
                {
                    "name": "myrvm-kiosk",
                    "template": "systemd/myrvm-kiosk.service.template",
                    "desired": "disabled"
                }
            ],
            "systemd": {
                "systemctl": stub,
                "timeout_secs": 10,
                "unit_dir": unit_dir,
                "service_user": "rvm"
            },
            "ipc": { "socket_path": base.join("agent.sock") }
        });
        let config_path = base.join("agent-config.json");
        write_file(
            &config_path,
            &serde_json::to_string_pretty(&config).expect("serialize config"),
        );

        Self {
            root,
            unit_dir,
            state_dir,
            config_path,
            _cleanup: CleanupDir(base),
        }
    }

    /// 在单元目录放置一个单元文件（相当于已安装）。
    pub fn install_unit(&self, unit: &str, active: bool) {
        write_file(&self.unit_dir.join(unit), "[Service]\n");
        if active {
            write_file(&self.state_dir.join(format!("{unit}.active")), "");
        }
    }

    pub fn fail_verb(&self, verb: &str) {
        write_file(&self.state_dir.join(format!("fail-{verb}")), "");
    }

    pub fn is_active(&self, unit: &str) -> bool {
        self.state_dir.join(format!("{unit}.active")).exists()
    }

    pub fn is_enabled(&self, unit: &str) -> bool {
        self.state_dir.join(format!("{unit}.enabled")).exists()
    }

    pub fn calls(&self) -> Vec<String> {
        std::fs::read_to_string(self.state_dir.join("calls.log"))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_rvm-ctl"));
        cmd.arg("--config")
            .arg(&self.config_path)
            .args(args)
            .env("RVM_TEST_ALLOW_NON_ROOT", "1")
            .env_remove("RUST_LOG");
        cmd
    }

    pub fn ctl(&self, args: &[&str]) -> Output {
        self.command(args)
            .stdin(Stdio::null())
            .output()
            .unwrap_or_else(|e| panic!("run rvm-ctl {args:?} failed: {e}"))
    }

    pub fn ctl_with_stdin(&self, args: &[&str], input: &str) -> Output {
        let mut child = self
            .command(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .unwrap_or_else(|e| panic!("spawn rvm-ctl {args:?} failed: {e}"));
        if let Some(mut stdin) = child.stdin.take() {
            let _ = stdin.write_all(input.as_bytes());
        }
        child.wait_with_output().expect("wait rvm-ctl")
    }
}

pub fn stdout(out: &Output) -> String {
    String::from_utf8_lossy(&out.stdout).to_string()
}

pub fn describe(out: &Output) -> String {
    format!(
        "status={:?}, stdout={}, stderr={}",
        out.status.code(),
        String::from_utf8_lossy(&out.stdout),
        String::from_utf8_lossy(&out.stderr)
    )
}
