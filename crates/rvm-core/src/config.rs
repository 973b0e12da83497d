//! 代理配置文件（agent-config.json）模型。
//!
//! 约定：
//! - 所有段落都带 `#[serde(default)]`，缺省字段使用内置默认值，以便配置向前兼容
//! - 配置文件不存在时整体使用默认值（出厂镜像可以不携带配置文件）
//! - 本模块仅做解析与派生（注册表、目录布局、更新参数），不执行系统修改
//!
//! 作者：MyRVM Edge 项目组
//! 创建时间：2026-10-18
//! 修改时间：2026-10-18

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::paths::{self, ProjectLayout};
use crate::service::{ManagedService, RegistryError, ServiceRegistry};
use crate::update::UpdateSettings;

pub const DEFAULT_PRIMARY_SERVICE: &str = "myrvm-edge";
pub const DEFAULT_KIOSK_SERVICE: &str = "myrvm-kiosk";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("读取配置文件失败: {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("解析配置文件失败: {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("服务清单无效: {0}")]
    Registry(#[from] RegistryError),
    #[error("路径无效: {0}")]
    Path(String),
}

/// 配置根对象。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// 项目根目录（包含 VERSION、config/、venv/ 等）。
    pub project_root: PathBuf,
    /// 主服务名（更新/远程重启/Day-0 重置的目标）。
    pub primary_service: String,
    /// 受管服务清单。
    pub services: Vec<ManagedService>,
    pub update: UpdateConfig,
    pub systemd: SystemdConfig,
    pub ipc: IpcConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            project_root: PathBuf::from("."),
            primary_service: DEFAULT_PRIMARY_SERVICE.to_string(),
            services: vec![
                ManagedService::new(DEFAULT_PRIMARY_SERVICE),
                ManagedService::new(DEFAULT_KIOSK_SERVICE),
            ],
            update: UpdateConfig::default(),
            systemd: SystemdConfig::default(),
            ipc: IpcConfig::default(),
        }
    }
}

/// 自动更新配置。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateConfig {
    pub interval_secs: u64,
    pub remote: String,
    pub branch: String,
    pub fetch_timeout_secs: u64,
    pub install_timeout_secs: u64,
    /// 依赖清单（相对项目根目录）。
    pub requirements: String,
    /// 隔离环境目录（相对项目根目录）。
    pub venv_dir: String,
    pub health_poll_attempts: u32,
    pub health_poll_interval_ms: u64,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            interval_secs: 900,
            remote: "origin".to_string(),
            branch: "main".to_string(),
            fetch_timeout_secs: 120,
            install_timeout_secs: 600,
            requirements: "requirements.txt".to_string(),
            venv_dir: "venv".to_string(),
            health_poll_attempts: 10,
            health_poll_interval_ms: 1000,
        }
    }
}

/// systemd 适配器配置。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemdConfig {
    /// systemctl 可执行文件（测试时可指向桩脚本）。
    pub systemctl: String,
    pub timeout_secs: u64,
    /// 单元文件安装目录。
    pub unit_dir: PathBuf,
    /// 单元模板中 `{{USER}}` 的取值；为空时取 `SUDO_USER`/`USER`。
    pub service_user: Option<String>,
}

impl Default for SystemdConfig {
    fn default() -> Self {
        Self {
            systemctl: "systemctl".to_string(),
            timeout_secs: 10,
            unit_dir: PathBuf::from("/etc/systemd/system"),
            service_user: None,
        }
    }
}

/// 本机 IPC（心跳上报进程与代理之间）配置。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IpcConfig {
    pub socket_path: PathBuf,
    pub command_timeout_secs: u64,
}

impl Default for IpcConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from("/run/myrvm-edge/agent.sock"),
            command_timeout_secs: 300,
        }
    }
}

impl AgentConfig {
    /// 读取并解析配置文件。
    ///
    /// 参数：
    /// - `path`：配置文件路径
    ///
    /// 返回值：
    /// - 文件存在：解析结果（相对的 `project_root` 以配置文件所在目录为基准）
    /// - 文件不存在：默认配置
    ///
    /// 异常处理：
    /// - 文件不可读或 JSON 解析失败返回错误
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            info!("配置文件不存在，使用默认配置: {}", path.display());
            return Ok(Self::default());
        }
        let bytes = std::fs::read(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: AgentConfig =
            serde_json::from_slice(&bytes).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        if config.project_root.is_relative() {
            let base = path.parent().unwrap_or_else(|| Path::new("."));
            config.project_root = base.join(&config.project_root);
        }
        Ok(config)
    }

    pub fn layout(&self) -> ProjectLayout {
        ProjectLayout::new(&self.project_root)
    }

    /// 构建受管服务注册表。
    pub fn registry(&self) -> Result<ServiceRegistry, ConfigError> {
        Ok(ServiceRegistry::new(
            self.services.clone(),
            &self.primary_service,
        )?)
    }

    pub fn requirements_file(&self) -> Result<PathBuf, ConfigError> {
        paths::resolve_path(&self.project_root, &self.update.requirements)
            .map_err(|e| ConfigError::Path(format!("update.requirements: {e}")))
    }

    pub fn venv_dir(&self) -> Result<PathBuf, ConfigError> {
        paths::resolve_path(&self.project_root, &self.update.venv_dir)
            .map_err(|e| ConfigError::Path(format!("update.venv_dir: {e}")))
    }

    /// 派生更新编排器参数。
    pub fn update_settings(&self) -> Result<UpdateSettings, ConfigError> {
        Ok(UpdateSettings {
            project_root: self.project_root.clone(),
            requirements_file: self.requirements_file()?,
            digest_file: self.layout().requirements_digest_file(),
            deployed_revision_file: self.layout().deployed_revision_file(),
            health_poll_attempts: self.update.health_poll_attempts,
            health_poll_interval: Duration::from_millis(self.update.health_poll_interval_ms),
        })
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update.interval_secs.max(1))
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.ipc.command_timeout_secs.max(1))
    }
}
