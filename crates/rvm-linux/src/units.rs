//! systemd 单元文件安装（模板渲染 + 写入单元目录 + daemon-reload + enable）。
//!
//! 权限要求：
//! - 写入 `/etc/systemd/system` 与 enable 需要 root 权限
//!
//! 作者：MyRVM Edge 项目组
//! 创建时间：2026-10-18
//! 修改时间：2026-10-18

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use rvm_core::controller::{ServiceController, ServiceReport, TargetState};
use rvm_core::paths;
use rvm_core::service::{DesiredState, ManagedService, ServiceManager};
use rvm_core::unit::{render_unit_template, UnitVars};
use tracing::{info, warn};

/// 单元安装结果。
#[derive(Debug, Clone)]
pub struct UnitInstallReport {
    pub written: Vec<PathBuf>,
    /// 按 `desired` 执行 enable/disable 的结果。
    pub boot_setting: Vec<ServiceReport>,
}

/// 解析单元模板中的运行用户。
///
/// 优先级：配置值 > `SUDO_USER` > `USER`。
pub fn resolve_service_user(configured: Option<&str>) -> Result<String> {
    if let Some(user) = configured.filter(|u| !u.trim().is_empty()) {
        return Ok(user.to_string());
    }
    ["SUDO_USER", "USER"]
        .iter()
        .filter_map(|k| std::env::var(k).ok())
        .find(|v| !v.trim().is_empty())
        .ok_or_else(|| anyhow!("无法确定服务运行用户，请在 systemd.service_user 中配置"))
}

/// 渲染并安装全部受管服务的单元文件。
///
/// 参数：
/// - `controller`：服务控制器（提供注册表、权限上下文，并负责 enable/disable）
/// - `manager`：服务管理器（写入单元后执行 daemon-reload）
/// - `project_root`：项目根目录（模板相对路径的基准，也是 `{{WORKING_DIR}}` 的取值）
/// - `unit_dir`：单元文件安装目录
/// - `user`：`{{USER}}` 的取值
///
/// 异常处理：
/// - 无 root 权限：直接返回错误，不写任何文件
/// - 模板读取/渲染/写入失败返回错误（已写入的单元文件保留）
pub fn install_units(
    controller: &ServiceController,
    manager: &dyn ServiceManager,
    project_root: &Path,
    unit_dir: &Path,
    user: &str,
) -> Result<UnitInstallReport> {
    if !controller.privilege().is_elevated() {
        return Err(anyhow!("安装单元文件需要 root 权限，请使用 sudo 运行"));
    }
    let working_dir = std::fs::canonicalize(project_root)
        .unwrap_or_else(|_| project_root.to_path_buf());
    let vars = UnitVars {
        user: user.to_string(),
        working_dir: working_dir.to_string_lossy().to_string(),
    };

    paths::ensure_dir(unit_dir)?;
    let mut written = Vec::new();
    for service in controller.registry().iter() {
        let Some(template) = service.template.as_deref() else {
            warn!("服务未配置单元模板，跳过: {}", service.name);
            continue;
        };
        let template_path = paths::resolve_path(project_root, template)?;
        let text = std::fs::read_to_string(&template_path)
            .with_context(|| format!("读取单元模板失败: {}", template_path.display()))?;
        let rendered = render_unit_template(&text, &vars)
            .with_context(|| format!("渲染单元模板失败: {}", template_path.display()))?;
        let target = unit_dir.join(service.unit_name());
        std::fs::write(&target, rendered)
            .with_context(|| format!("写入单元文件失败: {}", target.display()))?;
        info!("已写入单元文件: {}", target.display());
        written.push(target);
    }

    manager
        .daemon_reload()
        .map_err(|e| anyhow!("daemon-reload 失败: {e}"))?;

    // 按期望状态设置开机自启。
    let (want_enabled, want_disabled): (Vec<_>, Vec<_>) = controller
        .registry()
        .iter()
        .partition(|s| s.desired == DesiredState::Enabled);
    let mut boot_setting = controller
        .set_service_state(&names(want_enabled), TargetState::Enabled)
        .map_err(|e| anyhow!("{e}"))?;
    boot_setting.extend(
        controller
            .set_service_state(&names(want_disabled), TargetState::Disabled)
            .map_err(|e| anyhow!("{e}"))?,
    );
    Ok(UnitInstallReport {
        written,
        boot_setting,
    })
}

fn names(services: Vec<&ManagedService>) -> Vec<String> {
    services.into_iter().map(|s| s.name.clone()).collect()
}
