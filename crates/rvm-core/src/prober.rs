//! 服务状态探测器。
//!
//! 用途：
//! - `status` 命令的状态展示
//! - 更新编排器重启主服务后的健康检查（轮询直到 `Running` 或达到次数上限）
//!
//! 约束：
//! - 探测永不返回错误：单元不存在归为 `NotInstalled`，其他调用失败归为 `Unknown`
//! - 不缓存结果，每次调用都重新查询服务管理器
//!
//! 作者：MyRVM Edge 项目组
//! 创建时间：2026-10-18
//! 修改时间：2026-10-18

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::service::{ServiceManager, ServiceManagerError, ServiceRegistry, ServiceState};

/// 单个服务的一次探测结果。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub service: String,
    pub unit: String,
    pub state: ServiceState,
}

#[derive(Clone)]
pub struct StatusProber {
    manager: Arc<dyn ServiceManager>,
    registry: Arc<ServiceRegistry>,
}

impl StatusProber {
    pub fn new(manager: Arc<dyn ServiceManager>, registry: Arc<ServiceRegistry>) -> Self {
        Self { manager, registry }
    }

    /// 探测单个服务的当前状态。
    ///
    /// 参数：
    /// - `name`：服务名；未在注册表中的名称按 `<name>.service` 查询
    ///
    /// 返回值：
    /// - 总是返回一个 [`ServiceState`]，不会传播查询错误
    pub fn probe(&self, name: &str) -> ServiceState {
        let unit = self.registry.unit_for(name);
        match self.manager.query(&unit) {
            Ok(query) => {
                let state = ServiceState::classify(&query);
                debug!("探测 {unit}: {state} ({query:?})");
                state
            }
            Err(ServiceManagerError::UnitNotFound(_)) => ServiceState::NotInstalled,
            Err(e) => {
                warn!("探测 {unit} 失败，记为 unknown: {e}");
                ServiceState::Unknown
            }
        }
    }

    pub fn status(&self, name: &str) -> ServiceStatus {
        ServiceStatus {
            service: name.to_string(),
            unit: self.registry.unit_for(name),
            state: self.probe(name),
        }
    }

    /// 按注册顺序探测全部受管服务。
    pub fn status_all(&self) -> Vec<ServiceStatus> {
        self.registry.iter().map(|s| self.status(&s.name)).collect()
    }

    /// 轮询直到服务进入 `Running` 或达到次数上限。
    ///
    /// 参数：
    /// - `attempts`：最多探测次数（0 视为 1）
    /// - `interval`：两次探测之间的间隔（最后一次探测后不再等待）
    ///
    /// 返回值：
    /// - 最后一次观测到的状态
    pub fn wait_until_running(&self, name: &str, attempts: u32, interval: Duration) -> ServiceState {
        let attempts = attempts.max(1);
        let mut state = ServiceState::Unknown;
        for attempt in 1..=attempts {
            state = self.probe(name);
            if state == ServiceState::Running {
                return state;
            }
            debug!("等待 {name} 进入 running（{attempt}/{attempts}），当前 {state}");
            if attempt < attempts {
                std::thread::sleep(interval);
            }
        }
        state
    }
}
