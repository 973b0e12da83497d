//! 受管服务注册表与服务管理器能力接口。
//!
//! 目标：
//! - 以静态清单描述本机需要管理的服务（服务名、systemd 单元、单元模板、期望启用状态）
//! - 以 [`ServiceManager`] trait 抽象 systemd 等服务管理器，上层组件只依赖该接口
//! - 将服务管理器返回的原始状态归一化为 [`ServiceState`]（全映射，任何输入都有唯一结果）
//!
//! 作者：MyRVM Edge 项目组
//! 创建时间：2026-10-18
//! 修改时间：2026-10-18

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 期望的持久化启用状态（重启后是否自动拉起）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DesiredState {
    #[default]
    Enabled,
    Disabled,
}

/// 单个受管服务定义。
///
/// 字段说明：
/// - `name`：服务标识（CLI/日志中使用）
/// - `unit`：systemd 单元名；为空时按 `<name>.service` 推导
/// - `template`：单元模板文件（相对项目根目录），安装单元时使用
/// - `desired`：期望的启用状态
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedService {
    pub name: String,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub desired: DesiredState,
}

impl ManagedService {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            unit: unit_name_for(name),
            template: Some(format!("systemd/{name}.service.template")),
            desired: DesiredState::Enabled,
        }
    }

    /// 实际使用的 systemd 单元名。
    pub fn unit_name(&self) -> String {
        if self.unit.trim().is_empty() {
            unit_name_for(&self.name)
        } else {
            self.unit.clone()
        }
    }
}

/// 将服务名补全为 systemd 单元名（已带后缀则原样返回）。
pub fn unit_name_for(name: &str) -> String {
    if name.contains('.') {
        name.to_string()
    } else {
        format!("{name}.service")
    }
}

/// 注册表构建错误。
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("服务清单为空")]
    Empty,
    #[error("服务名为空")]
    EmptyName,
    #[error("服务名重复: {0}")]
    Duplicate(String),
    #[error("主服务未在清单中注册: {0}")]
    PrimaryNotRegistered(String),
}

/// 受管服务注册表（进程生命周期内不可变）。
#[derive(Debug, Clone)]
pub struct ServiceRegistry {
    services: Vec<ManagedService>,
    primary: usize,
}

impl ServiceRegistry {
    /// 构建注册表并校验。
    ///
    /// 参数：
    /// - `services`：服务清单（顺序即批量操作顺序）
    /// - `primary`：主服务名（更新/远程重启/Day-0 重置的目标）
    ///
    /// 异常处理：
    /// - 清单为空、服务名为空或重复、主服务未注册时返回错误
    pub fn new(services: Vec<ManagedService>, primary: &str) -> Result<Self, RegistryError> {
        if services.is_empty() {
            return Err(RegistryError::Empty);
        }
        let mut seen = HashSet::new();
        for s in &services {
            if s.name.trim().is_empty() {
                return Err(RegistryError::EmptyName);
            }
            if !seen.insert(s.name.as_str()) {
                return Err(RegistryError::Duplicate(s.name.clone()));
            }
        }
        let primary = services
            .iter()
            .position(|s| s.name == primary)
            .ok_or_else(|| RegistryError::PrimaryNotRegistered(primary.to_string()))?;
        Ok(Self { services, primary })
    }

    pub fn get(&self, name: &str) -> Option<&ManagedService> {
        self.services.iter().find(|s| s.name == name)
    }

    pub fn primary(&self) -> &ManagedService {
        &self.services[self.primary]
    }

    pub fn names(&self) -> Vec<String> {
        self.services.iter().map(|s| s.name.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ManagedService> {
        self.services.iter()
    }

    /// 查询名称对应的单元名；未注册时按命名约定推导。
    pub fn unit_for(&self, name: &str) -> String {
        self.get(name)
            .map(ManagedService::unit_name)
            .unwrap_or_else(|| unit_name_for(name))
    }
}

/// 服务的观测状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    Running,
    Stopped,
    NotInstalled,
    Unknown,
}

impl ServiceState {
    /// 将服务管理器的查询结果归一化。
    ///
    /// 映射规则：
    /// - `LoadState=not-found`：`NotInstalled`
    /// - `ActiveState=active|reloading`：`Running`
    /// - `ActiveState=inactive|failed`：`Stopped`
    /// - 其余（activating/deactivating/空串/未知值）：`Unknown`
    pub fn classify(query: &UnitQuery) -> Self {
        if query.load_state.trim() == "not-found" {
            return ServiceState::NotInstalled;
        }
        match query.active_state.trim() {
            "active" | "reloading" => ServiceState::Running,
            "inactive" | "failed" => ServiceState::Stopped,
            _ => ServiceState::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceState::Running => "running",
            ServiceState::Stopped => "stopped",
            ServiceState::NotInstalled => "not-installed",
            ServiceState::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 服务管理器对单元的原始查询结果（对应 systemd 的 LoadState/ActiveState 属性）。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitQuery {
    pub load_state: String,
    pub active_state: String,
}

impl UnitQuery {
    pub fn new(load_state: &str, active_state: &str) -> Self {
        Self {
            load_state: load_state.to_string(),
            active_state: active_state.to_string(),
        }
    }
}

/// 服务管理器调用错误。
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServiceManagerError {
    #[error("权限不足: {0}")]
    PermissionDenied(String),
    #[error("单元不存在: {0}")]
    UnitNotFound(String),
    #[error("服务管理器调用超时: {0}")]
    Timeout(String),
    #[error("服务管理器调用失败: {0}")]
    Failed(String),
}

/// 服务管理器能力接口（enable/disable/start/stop/restart/query）。
///
/// 约束：
/// - 实现方必须对每次调用设置超时，不允许无限期阻塞
/// - `restart` 必须委托给服务管理器自身的重启原语，而不是 stop + start 两次调用
pub trait ServiceManager: Send + Sync {
    fn enable(&self, unit: &str) -> Result<(), ServiceManagerError>;
    fn disable(&self, unit: &str) -> Result<(), ServiceManagerError>;
    fn start(&self, unit: &str) -> Result<(), ServiceManagerError>;
    fn stop(&self, unit: &str) -> Result<(), ServiceManagerError>;
    fn restart(&self, unit: &str) -> Result<(), ServiceManagerError>;
    fn query(&self, unit: &str) -> Result<UnitQuery, ServiceManagerError>;
    /// 重新加载单元定义（安装/更新单元文件后调用）。
    fn daemon_reload(&self) -> Result<(), ServiceManagerError>;
}
