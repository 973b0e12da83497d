//! 更新编排器：拉取最新源码、按需重装依赖、重启主服务并做健康检查。
//!
//! 流程（每一步都返回结构化结果，不终止进程）：
//! 1) 权限检查与运行锁（锁被占用：`AlreadyRunning`，不排队）
//! 2) 拉取源码（失败：`FetchFailed`，服务保持原状）
//! 3) 依赖清单摘要变化时重装依赖（失败：`DependencyFailed`，服务保持原状，已拉取的源码不回滚）
//! 4) 重启主服务并轮询直到 `Running`（超时：尽力再启动一次，`RestartFailed`）
//! 5) 读取版本号并返回 `Success`
//! 6) 锁在所有分支释放
//!
//! 作者：MyRVM Edge 项目组
//! 创建时间：2026-10-18
//! 修改时间：2026-10-18

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::controller::{ServiceController, ServiceOutcome, TargetState};
use crate::lock::RunLock;
use crate::paths;
use crate::service::ServiceState;
use crate::version::VersionInfo;

/// 触发来源。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateTrigger {
    Timer,
    RemoteCommand,
    Manual,
}

impl fmt::Display for UpdateTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            UpdateTrigger::Timer => "timer",
            UpdateTrigger::RemoteCommand => "remote-command",
            UpdateTrigger::Manual => "manual",
        })
    }
}

/// 一次更新的结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpdateOutcome {
    Success,
    /// 当前修订已部署且依赖无变化，未重启服务。
    UpToDate,
    AlreadyRunning,
    PermissionDenied,
    FetchFailed,
    DependencyFailed,
    RestartFailed,
}

impl UpdateOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateOutcome::Success => "success",
            UpdateOutcome::UpToDate => "up-to-date",
            UpdateOutcome::AlreadyRunning => "already-running",
            UpdateOutcome::PermissionDenied => "permission-denied",
            UpdateOutcome::FetchFailed => "fetch-failed",
            UpdateOutcome::DependencyFailed => "dependency-failed",
            UpdateOutcome::RestartFailed => "restart-failed",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, UpdateOutcome::Success | UpdateOutcome::UpToDate)
    }
}

impl fmt::Display for UpdateOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 一次更新执行的记录（不落盘，仅返回给调用方上报）。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateRun {
    pub run_id: Uuid,
    pub trigger: UpdateTrigger,
    pub started_at: OffsetDateTime,
    pub finished_at: OffsetDateTime,
    pub outcome: UpdateOutcome,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
}

/// 源码拉取结果（拉取前后的修订号）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchReport {
    pub previous: String,
    pub current: String,
}

impl FetchReport {
    pub fn changed(&self) -> bool {
        self.previous != self.current
    }
}

/// 版本控制协作者（例如 `git pull`）。
pub trait SourceFetcher: Send + Sync {
    fn fetch(&self) -> Result<FetchReport>;
}

/// 依赖安装协作者（例如 `venv/bin/pip install -r requirements.txt`）。
pub trait DependencyInstaller: Send + Sync {
    fn install(&self) -> Result<()>;
}

/// 编排器参数。
#[derive(Debug, Clone)]
pub struct UpdateSettings {
    pub project_root: PathBuf,
    pub requirements_file: PathBuf,
    pub digest_file: PathBuf,
    pub deployed_revision_file: PathBuf,
    pub health_poll_attempts: u32,
    pub health_poll_interval: Duration,
}

impl UpdateSettings {
    pub fn for_root(project_root: &Path) -> Self {
        let layout = paths::ProjectLayout::new(project_root);
        Self {
            project_root: project_root.to_path_buf(),
            requirements_file: project_root.join("requirements.txt"),
            digest_file: layout.requirements_digest_file(),
            deployed_revision_file: layout.deployed_revision_file(),
            health_poll_attempts: 10,
            health_poll_interval: Duration::from_secs(1),
        }
    }
}

/// 流水线中某一步的失败。
struct StepFailure {
    outcome: UpdateOutcome,
    detail: String,
}

impl StepFailure {
    fn new(outcome: UpdateOutcome, detail: impl Into<String>) -> Self {
        Self {
            outcome,
            detail: detail.into(),
        }
    }
}

pub struct UpdateOrchestrator {
    controller: ServiceController,
    fetcher: Arc<dyn SourceFetcher>,
    installer: Arc<dyn DependencyInstaller>,
    lock: Arc<dyn RunLock>,
    settings: UpdateSettings,
}

impl UpdateOrchestrator {
    pub fn new(
        controller: ServiceController,
        fetcher: Arc<dyn SourceFetcher>,
        installer: Arc<dyn DependencyInstaller>,
        lock: Arc<dyn RunLock>,
        settings: UpdateSettings,
    ) -> Self {
        Self {
            controller,
            fetcher,
            installer,
            lock,
            settings,
        }
    }

    pub fn settings(&self) -> &UpdateSettings {
        &self.settings
    }

    /// 执行一次更新。
    ///
    /// 参数：
    /// - `trigger`：触发来源（定时器/远程命令/手动）
    ///
    /// 返回值：
    /// - 本次执行的 [`UpdateRun`]；任何失败都体现在 `outcome` 中，不返回 `Err`
    pub fn run_update(&self, trigger: UpdateTrigger) -> UpdateRun {
        let run_id = Uuid::new_v4();
        let started_at = OffsetDateTime::now_utc();
        let finish = |outcome: UpdateOutcome, detail: Option<String>| {
            let version = match outcome {
                UpdateOutcome::AlreadyRunning | UpdateOutcome::PermissionDenied => None,
                _ => VersionInfo::load(&self.settings.project_root)
                    .map(|v| v.to_string())
                    .ok(),
            };
            match &detail {
                Some(d) if !outcome.is_success() => {
                    warn!(%run_id, %trigger, "更新结束: {outcome} ({d})")
                }
                _ => info!(%run_id, %trigger, "更新结束: {outcome} version={version:?}"),
            }
            UpdateRun {
                run_id,
                trigger,
                started_at,
                finished_at: OffsetDateTime::now_utc(),
                outcome,
                version,
                detail,
            }
        };

        if !self.controller.privilege().is_elevated() {
            return finish(
                UpdateOutcome::PermissionDenied,
                Some("更新需要 root 权限".to_string()),
            );
        }

        let _guard = match self.lock.try_acquire() {
            Ok(Some(guard)) => guard,
            Ok(None) => {
                info!(%run_id, %trigger, "已有更新在执行，跳过本次");
                return finish(UpdateOutcome::AlreadyRunning, None);
            }
            Err(e) => {
                error!(%run_id, "获取更新锁失败: {e:#}");
                return finish(
                    UpdateOutcome::AlreadyRunning,
                    Some(format!("获取更新锁失败: {e:#}")),
                );
            }
        };

        info!(%run_id, %trigger, "开始更新");
        match self.pipeline() {
            Ok(outcome) => finish(outcome, None),
            Err(failure) => finish(failure.outcome, Some(failure.detail)),
        }
    }

    fn pipeline(&self) -> Result<UpdateOutcome, StepFailure> {
        let fetched = self
            .fetcher
            .fetch()
            .map_err(|e| StepFailure::new(UpdateOutcome::FetchFailed, format!("{e:#}")))?;
        if fetched.changed() {
            info!("源码已更新: {} -> {}", fetched.previous, fetched.current);
        } else {
            debug!("源码无变化: {}", fetched.current);
        }

        let reinstalled = self.sync_dependencies()?;

        // 只有重启并通过健康检查的修订才算已部署；上次重启失败时 HEAD 虽已前移，仍需重启。
        let deployed = read_trimmed(&self.settings.deployed_revision_file);
        if !reinstalled && deployed.as_deref() == Some(fetched.current.as_str()) {
            return Ok(UpdateOutcome::UpToDate);
        }
        if !fetched.changed() && !reinstalled {
            info!(
                "修订 {} 尚未部署（记录 {}），重启主服务",
                fetched.current,
                deployed.as_deref().unwrap_or("无")
            );
        }

        self.restart_primary()?;
        if let Err(e) = store_marker(&self.settings.deployed_revision_file, &fetched.current) {
            warn!("写入已部署修订号失败: {e:#}");
        }
        Ok(UpdateOutcome::Success)
    }

    /// 依赖清单摘要与上次成功安装时不同则重装依赖。
    ///
    /// 返回值：
    /// - `Ok(true)`：执行了重装
    /// - `Ok(false)`：无依赖清单或清单未变化
    fn sync_dependencies(&self) -> Result<bool, StepFailure> {
        let manifest = &self.settings.requirements_file;
        if !manifest.exists() {
            debug!("依赖清单不存在，跳过依赖安装: {}", manifest.display());
            return Ok(false);
        }
        let digest = file_digest(manifest)
            .map_err(|e| StepFailure::new(UpdateOutcome::DependencyFailed, format!("{e:#}")))?;
        let stored = read_trimmed(&self.settings.digest_file);
        if stored.as_deref() == Some(digest.as_str()) {
            debug!("依赖清单未变化");
            return Ok(false);
        }

        info!("依赖清单已变化，重新安装依赖");
        self.installer
            .install()
            .map_err(|e| StepFailure::new(UpdateOutcome::DependencyFailed, format!("{e:#}")))?;

        if let Err(e) = store_marker(&self.settings.digest_file, &digest) {
            // 摘要写入失败只会导致下次重复安装。
            warn!("写入依赖清单摘要失败: {e:#}");
        }
        Ok(true)
    }

    fn restart_primary(&self) -> Result<(), StepFailure> {
        let primary = self.controller.registry().primary().name.clone();
        let reports = self
            .controller
            .set_service_state(&[primary.as_str()], TargetState::Restarted)
            .map_err(|e| StepFailure::new(UpdateOutcome::RestartFailed, e.to_string()))?;
        let outcome = reports
            .into_iter()
            .next()
            .map(|r| r.outcome)
            .unwrap_or(ServiceOutcome::UnknownService);
        if !outcome.is_applied() {
            // restart 可能在 stop 之后失败，服务不在运行时补一次启动。
            let state = self.controller.prober().probe(&primary);
            if state != ServiceState::Running {
                warn!("{primary} 重启失败后处于 {state}，尝试再次启动");
                self.start_best_effort(&primary);
            }
            return Err(StepFailure::new(
                UpdateOutcome::RestartFailed,
                format!("重启 {primary} 失败: {outcome}"),
            ));
        }

        let state = self.controller.prober().wait_until_running(
            &primary,
            self.settings.health_poll_attempts,
            self.settings.health_poll_interval,
        );
        if state == ServiceState::Running {
            return Ok(());
        }

        warn!("{primary} 重启后未进入 running（{state}），尝试再次启动");
        self.start_best_effort(&primary);
        Err(StepFailure::new(
            UpdateOutcome::RestartFailed,
            format!("{primary} 健康检查超时，最后状态 {state}"),
        ))
    }

    /// 尽力启动主服务，结果只记录日志。
    fn start_best_effort(&self, primary: &str) {
        match self
            .controller
            .set_service_state(&[primary], TargetState::Started)
        {
            Ok(reports) => {
                for r in reports {
                    info!("补救启动 {}: {}", r.service, r.outcome);
                }
            }
            Err(e) => warn!("补救启动 {primary} 失败: {e}"),
        }
    }
}

/// 计算文件的 SHA-256 摘要（小写十六进制）。
pub fn file_digest(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path).with_context(|| format!("读取依赖清单失败: {}", path.display()))?;
    Ok(format!("{:x}", Sha256::digest(&bytes)))
}

fn read_trimmed(path: &Path) -> Option<String> {
    std::fs::read_to_string(path)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn store_marker(path: &Path, value: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        paths::ensure_dir(parent)?;
    }
    std::fs::write(path, value).with_context(|| format!("写入失败: {}", path.display()))?;
    Ok(())
}
