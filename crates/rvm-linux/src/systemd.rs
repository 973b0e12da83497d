//! 基于 `systemctl` 的服务管理器适配器。
//!
//! 用途：
//! - 实现 `rvm_core::service::ServiceManager`，供控制器/探测器/更新编排器使用
//! - 每次调用都带超时，systemd 卡死时不会拖住心跳周期
//!
//! 作者：MyRVM Edge 项目组
//! 创建时间：2026-10-18
//! 修改时间：2026-10-18

use std::process::Command;
use std::time::Duration;

use rvm_core::service::{ServiceManager, ServiceManagerError, UnitQuery};

use crate::process::{run_with_timeout, CommandOutput, RunError};

#[derive(Debug, Clone)]
pub struct Systemctl {
    program: String,
    timeout: Duration,
}

impl Systemctl {
    /// 参数：
    /// - `program`：systemctl 可执行文件（通常为 `systemctl`）
    /// - `timeout`：单次调用超时
    pub fn new(program: &str, timeout: Duration) -> Self {
        Self {
            program: program.to_string(),
            timeout,
        }
    }

    fn run(&self, args: &[&str]) -> Result<CommandOutput, ServiceManagerError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(args);
        run_with_timeout(&mut cmd, self.timeout).map_err(|e| match e {
            RunError::TimedOut { .. } => ServiceManagerError::Timeout(args.join(" ")),
            other => ServiceManagerError::Failed(other.to_string()),
        })
    }

    fn action(&self, verb: &str, unit: &str) -> Result<(), ServiceManagerError> {
        let out = self.run(&[verb, unit])?;
        if out.success() {
            return Ok(());
        }
        Err(classify_failure(unit, &out))
    }
}

/// 根据 systemctl 的退出码与 stderr 归类失败原因。
fn classify_failure(unit: &str, out: &CommandOutput) -> ServiceManagerError {
    let stderr = out.stderr.trim();
    let lower = stderr.to_ascii_lowercase();
    if lower.contains("not found") || lower.contains("not loaded") || lower.contains("does not exist") {
        ServiceManagerError::UnitNotFound(unit.to_string())
    } else if lower.contains("access denied")
        || lower.contains("authentication required")
        || lower.contains("permission denied")
    {
        ServiceManagerError::PermissionDenied(stderr.to_string())
    } else {
        ServiceManagerError::Failed(format!("{unit}: exit {} {stderr}", out.code()))
    }
}

/// 解析 `systemctl show --property=...` 的 `Key=Value` 输出。
pub fn parse_show_output(stdout: &str) -> UnitQuery {
    let mut query = UnitQuery::default();
    for line in stdout.lines() {
        if let Some((key, value)) = line.split_once('=') {
            match key.trim() {
                "LoadState" => query.load_state = value.trim().to_string(),
                "ActiveState" => query.active_state = value.trim().to_string(),
                _ => {}
            }
        }
    }
    query
}

impl ServiceManager for Systemctl {
    fn enable(&self, unit: &str) -> Result<(), ServiceManagerError> {
        self.action("enable", unit)
    }

    fn disable(&self, unit: &str) -> Result<(), ServiceManagerError> {
        self.action("disable", unit)
    }

    fn start(&self, unit: &str) -> Result<(), ServiceManagerError> {
        self.action("start", unit)
    }

    fn stop(&self, unit: &str) -> Result<(), ServiceManagerError> {
        self.action("stop", unit)
    }

    fn restart(&self, unit: &str) -> Result<(), ServiceManagerError> {
        self.action("restart", unit)
    }

    fn query(&self, unit: &str) -> Result<UnitQuery, ServiceManagerError> {
        let out = self.run(&["show", unit, "--property=LoadState,ActiveState"])?;
        if !out.success() {
            return Err(classify_failure(unit, &out));
        }
        Ok(parse_show_output(&out.stdout))
    }

    fn daemon_reload(&self) -> Result<(), ServiceManagerError> {
        let out = self.run(&["daemon-reload"])?;
        if out.success() {
            Ok(())
        } else {
            Err(classify_failure("daemon-reload", &out))
        }
    }
}
