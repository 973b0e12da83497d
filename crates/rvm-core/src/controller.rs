//! 服务控制器：对一个或多个受管服务执行 enable/disable/start/stop/restart。
//!
//! 行为约定：
//! - 调用前先检查权限上下文；无提升权限时立即返回 [`ControlError::PermissionDenied`]，不触达服务管理器
//! - 逐个服务执行，单个服务失败不影响其他服务，结果按服务收集
//! - 执行前先探测：单元不存在时记为 `NotInstalled`，不发起修改性调用
//! - `Restarted` 直接使用服务管理器的重启原语
//!
//! 作者：MyRVM Edge 项目组
//! 创建时间：2026-10-18
//! 修改时间：2026-10-18

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::privilege::PrivilegeContext;
use crate::prober::{ServiceStatus, StatusProber};
use crate::service::{ServiceManager, ServiceManagerError, ServiceRegistry, ServiceState};

/// 目标操作。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetState {
    Enabled,
    Disabled,
    Started,
    Stopped,
    Restarted,
}

impl fmt::Display for TargetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TargetState::Enabled => "enable",
            TargetState::Disabled => "disable",
            TargetState::Started => "start",
            TargetState::Stopped => "stop",
            TargetState::Restarted => "restart",
        };
        f.write_str(s)
    }
}

/// 单个服务的执行结果。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ServiceOutcome {
    /// 服务管理器已接受该操作。
    Applied,
    /// 服务管理器中没有该单元。
    NotInstalled,
    /// 服务名未在注册表中登记。
    UnknownService,
    PermissionDenied,
    Failed { message: String },
}

impl ServiceOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, ServiceOutcome::Applied)
    }

    /// 是否应视为失败（`NotInstalled` 仅提示，不算失败）。
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            ServiceOutcome::UnknownService
                | ServiceOutcome::PermissionDenied
                | ServiceOutcome::Failed { .. }
        )
    }
}

impl fmt::Display for ServiceOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceOutcome::Applied => f.write_str("ok"),
            ServiceOutcome::NotInstalled => f.write_str("not-installed"),
            ServiceOutcome::UnknownService => f.write_str("unknown-service"),
            ServiceOutcome::PermissionDenied => f.write_str("permission-denied"),
            ServiceOutcome::Failed { message } => write!(f, "failed: {message}"),
        }
    }
}

/// 按服务收集的结果。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceReport {
    pub service: String,
    pub outcome: ServiceOutcome,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ControlError {
    #[error("服务控制需要 root 权限，请使用 sudo 运行")]
    PermissionDenied,
}

#[derive(Clone)]
pub struct ServiceController {
    manager: Arc<dyn ServiceManager>,
    registry: Arc<ServiceRegistry>,
    prober: StatusProber,
    privilege: PrivilegeContext,
}

impl ServiceController {
    pub fn new(
        manager: Arc<dyn ServiceManager>,
        registry: Arc<ServiceRegistry>,
        privilege: PrivilegeContext,
    ) -> Self {
        let prober = StatusProber::new(manager.clone(), registry.clone());
        Self {
            manager,
            registry,
            prober,
            privilege,
        }
    }

    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    pub fn prober(&self) -> &StatusProber {
        &self.prober
    }

    pub fn privilege(&self) -> PrivilegeContext {
        self.privilege
    }

    /// 对指定服务执行目标操作。
    ///
    /// 参数：
    /// - `names`：服务名列表（按给定顺序执行）
    /// - `target`：目标操作
    ///
    /// 返回值：
    /// - `Ok(reports)`：每个服务一条结果
    ///
    /// 异常处理：
    /// - 无提升权限：返回 [`ControlError::PermissionDenied`]，不调用服务管理器
    pub fn set_service_state<S: AsRef<str>>(
        &self,
        names: &[S],
        target: TargetState,
    ) -> Result<Vec<ServiceReport>, ControlError> {
        if !self.privilege.is_elevated() {
            warn!("拒绝执行 {target}: 当前进程没有 root 权限");
            return Err(ControlError::PermissionDenied);
        }
        Ok(names
            .iter()
            .map(|name| {
                let name = name.as_ref();
                ServiceReport {
                    service: name.to_string(),
                    outcome: self.apply_one(name, target),
                }
            })
            .collect())
    }

    /// 对全部受管服务执行目标操作。
    pub fn set_all(&self, target: TargetState) -> Result<Vec<ServiceReport>, ControlError> {
        self.set_service_state(&self.registry.names(), target)
    }

    /// 探测全部受管服务（无需权限）。
    pub fn status_all(&self) -> Vec<ServiceStatus> {
        self.prober.status_all()
    }

    fn apply_one(&self, name: &str, target: TargetState) -> ServiceOutcome {
        let Some(service) = self.registry.get(name) else {
            warn!("未登记的服务，跳过: {name}");
            return ServiceOutcome::UnknownService;
        };
        let unit = service.unit_name();
        if self.prober.probe(name) == ServiceState::NotInstalled {
            warn!("单元未安装，跳过 {target}: {unit}");
            return ServiceOutcome::NotInstalled;
        }

        let result = match target {
            TargetState::Enabled => self.manager.enable(&unit),
            TargetState::Disabled => self.manager.disable(&unit),
            TargetState::Started => self.manager.start(&unit),
            TargetState::Stopped => self.manager.stop(&unit),
            TargetState::Restarted => self.manager.restart(&unit),
        };
        match result {
            Ok(()) => {
                info!("{target} {unit}: ok");
                ServiceOutcome::Applied
            }
            Err(ServiceManagerError::UnitNotFound(_)) => ServiceOutcome::NotInstalled,
            Err(ServiceManagerError::PermissionDenied(msg)) => {
                warn!("{target} {unit}: 权限不足 {msg}");
                ServiceOutcome::PermissionDenied
            }
            Err(e) => {
                warn!("{target} {unit} 失败: {e}");
                ServiceOutcome::Failed {
                    message: e.to_string(),
                }
            }
        }
    }
}
