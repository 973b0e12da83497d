//! Day-0 重置：删除设备身份凭据，保留本地配置，然后重新拉起主服务进入配网流程。
//!
//! 步骤（每一步幂等，目标文件不存在不算错误）：
//! 1) 停止主服务（失败则在删除任何文件之前中止）
//! 2) 删除凭据文件（secrets.env / credentials.json / 维护模式标记），单个失败不影响其他
//! 3) 启动主服务（只要步骤 1 成功就一定尝试，即使步骤 2 部分失败）
//!
//! 本地配置文件不在删除集合中，本模块也不引用它们。
//!
//! 作者：MyRVM Edge 项目组
//! 创建时间：2026-10-18
//! 修改时间：2026-10-18

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::controller::{ControlError, ServiceController, ServiceOutcome, ServiceReport, TargetState};
use crate::paths::{CREDENTIALS_FILE, MAINTENANCE_MARKER_FILE, SECRETS_FILE};

/// 设备身份凭据文件集合。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisioningSecrets {
    pub secret_store: PathBuf,
    pub credentials: PathBuf,
    pub maintenance_marker: PathBuf,
}

impl ProvisioningSecrets {
    /// 以配置目录为基准的默认凭据集合。
    pub fn under(config_dir: &Path) -> Self {
        Self {
            secret_store: config_dir.join(SECRETS_FILE),
            credentials: config_dir.join(CREDENTIALS_FILE),
            maintenance_marker: config_dir.join(MAINTENANCE_MARKER_FILE),
        }
    }

    pub fn files(&self) -> [&Path; 3] {
        [
            self.secret_store.as_path(),
            self.credentials.as_path(),
            self.maintenance_marker.as_path(),
        ]
    }

    /// 设备是否已配网（凭据存储存在）。
    pub fn is_provisioned(&self) -> bool {
        self.secret_store.exists()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResetOutcome {
    Completed,
    PartialFailure { not_removed: Vec<PathBuf> },
    AbortedBeforeDeletion { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetReport {
    pub outcome: ResetOutcome,
    #[serde(default)]
    pub removed: Vec<PathBuf>,
    #[serde(default)]
    pub already_absent: Vec<PathBuf>,
    /// 最后一步启动主服务的结果；中止时为 `None`（未尝试）。
    #[serde(default)]
    pub restart: Option<ServiceOutcome>,
}

impl ResetReport {
    fn aborted(reason: String) -> Self {
        Self {
            outcome: ResetOutcome::AbortedBeforeDeletion { reason },
            removed: Vec::new(),
            already_absent: Vec::new(),
            restart: None,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResetError {
    #[error("Day-0 重置需要确认")]
    NotConfirmed,
    #[error("Day-0 重置需要 root 权限，请使用 sudo 运行")]
    PermissionDenied,
}

impl From<ControlError> for ResetError {
    fn from(e: ControlError) -> Self {
        match e {
            ControlError::PermissionDenied => ResetError::PermissionDenied,
        }
    }
}

pub struct ProvisioningReset {
    controller: ServiceController,
    secrets: ProvisioningSecrets,
}

impl ProvisioningReset {
    pub fn new(controller: ServiceController, secrets: ProvisioningSecrets) -> Self {
        Self { controller, secrets }
    }

    pub fn secrets(&self) -> &ProvisioningSecrets {
        &self.secrets
    }

    /// 执行 Day-0 重置。
    ///
    /// 参数：
    /// - `confirmed`：调用方已完成交互确认
    ///
    /// 返回值：
    /// - `Ok(report)`：已执行（结果可能为完成/部分失败/删除前中止）
    ///
    /// 异常处理：
    /// - 未确认：[`ResetError::NotConfirmed`]
    /// - 无提升权限：[`ResetError::PermissionDenied`]（检查先于任何操作）
    pub fn reset_to_day0(&self, confirmed: bool) -> Result<ResetReport, ResetError> {
        if !confirmed {
            return Err(ResetError::NotConfirmed);
        }
        if !self.controller.privilege().is_elevated() {
            return Err(ResetError::PermissionDenied);
        }
        let primary = self.controller.registry().primary().name.clone();

        info!("Day-0 重置：停止 {primary}");
        let stop = first_outcome(
            self.controller
                .set_service_state(&[primary.as_str()], TargetState::Stopped)?,
        );
        match &stop {
            ServiceOutcome::Applied => {}
            ServiceOutcome::NotInstalled => warn!("{primary} 未安装，视为已停止"),
            other => {
                error!("停止 {primary} 失败，中止重置且不删除任何文件: {other}");
                return Ok(ResetReport::aborted(format!("停止 {primary} 失败: {other}")));
            }
        }

        let mut removed = Vec::new();
        let mut already_absent = Vec::new();
        let mut not_removed = Vec::new();
        for path in self.secrets.files() {
            match std::fs::remove_file(path) {
                Ok(()) => {
                    info!("已删除: {}", path.display());
                    removed.push(path.to_path_buf());
                }
                Err(e) if e.kind() == ErrorKind::NotFound => already_absent.push(path.to_path_buf()),
                Err(e) => {
                    error!("删除失败: {}: {e}", path.display());
                    not_removed.push(path.to_path_buf());
                }
            }
        }

        info!("Day-0 重置：启动 {primary}");
        let restart = first_outcome(
            self.controller
                .set_service_state(&[primary.as_str()], TargetState::Started)?,
        );
        if !restart.is_applied() {
            warn!("重置后启动 {primary} 未成功: {restart}");
        }

        let outcome = if not_removed.is_empty() {
            ResetOutcome::Completed
        } else {
            ResetOutcome::PartialFailure { not_removed }
        };
        Ok(ResetReport {
            outcome,
            removed,
            already_absent,
            restart: Some(restart),
        })
    }
}

fn first_outcome(reports: Vec<ServiceReport>) -> ServiceOutcome {
    reports
        .into_iter()
        .next()
        .map(|r| r.outcome)
        .unwrap_or(ServiceOutcome::UnknownService)
}
