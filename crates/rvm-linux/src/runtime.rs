//! 按配置装配运行时组件（代理与 CLI 共用）。
//!
//! 作者：MyRVM Edge 项目组
//! 创建时间：2026-10-18
//! 修改时间：2026-10-18

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use rvm_core::command::CommandProcessor;
use rvm_core::config::AgentConfig;
use rvm_core::controller::ServiceController;
use rvm_core::ipc::IpcEndpoint;
use rvm_core::lock::{LockChain, ProcessRunLock, RunLock};
use rvm_core::paths::ProjectLayout;
use rvm_core::privilege::PrivilegeContext;
use rvm_core::reset::{ProvisioningReset, ProvisioningSecrets};
use rvm_core::service::ServiceManager;
use rvm_core::update::UpdateOrchestrator;

use crate::git::GitFetcher;
use crate::lock::FileRunLock;
use crate::pip::PipInstaller;
use crate::systemd::Systemctl;

/// 装配完成的组件集合。
pub struct EdgeRuntime {
    pub config: AgentConfig,
    pub layout: ProjectLayout,
    pub manager: Arc<dyn ServiceManager>,
    pub controller: ServiceController,
    pub orchestrator: Arc<UpdateOrchestrator>,
    pub processor: Arc<CommandProcessor>,
    pub reset: ProvisioningReset,
}

impl EdgeRuntime {
    /// 根据配置构建全部组件。
    ///
    /// 参数：
    /// - `config`：已加载的配置
    /// - `privilege`：调用方权限上下文（启动时探测一次）
    ///
    /// 异常处理：
    /// - 服务清单无效、路径字段无效时返回错误
    pub fn build(config: AgentConfig, privilege: PrivilegeContext) -> Result<Self> {
        let layout = config.layout();
        let registry = Arc::new(config.registry().context("构建服务注册表失败")?);
        let manager: Arc<dyn ServiceManager> = Arc::new(Systemctl::new(
            &config.systemd.systemctl,
            Duration::from_secs(config.systemd.timeout_secs.max(1)),
        ));
        let controller = ServiceController::new(manager.clone(), registry, privilege);

        let fetcher = Arc::new(GitFetcher::new(
            layout.root().to_path_buf(),
            &config.update.remote,
            &config.update.branch,
            Duration::from_secs(config.update.fetch_timeout_secs.max(1)),
        ));
        let installer = Arc::new(PipInstaller::new(
            config.venv_dir()?,
            config.requirements_file()?,
            Duration::from_secs(config.update.install_timeout_secs.max(1)),
        ));
        let lock: Arc<dyn RunLock> = Arc::new(LockChain::new(vec![
            Arc::new(ProcessRunLock::new()),
            Arc::new(FileRunLock::new(layout.update_lock_file())),
        ]));
        let orchestrator = Arc::new(UpdateOrchestrator::new(
            controller.clone(),
            fetcher,
            installer,
            lock,
            config.update_settings()?,
        ));
        let processor = Arc::new(CommandProcessor::new(
            orchestrator.clone(),
            controller.clone(),
            layout.root().to_path_buf(),
        ));
        let reset = ProvisioningReset::new(
            controller.clone(),
            ProvisioningSecrets::under(&layout.config_dir()),
        );

        Ok(Self {
            config,
            layout,
            manager,
            controller,
            orchestrator,
            processor,
            reset,
        })
    }

    pub fn ipc_endpoint(&self) -> IpcEndpoint {
        IpcEndpoint::new(
            self.processor.clone(),
            self.controller.prober().clone(),
            self.layout.root().to_path_buf(),
        )
    }
}
