//! 项目目录约定（以项目根目录为基准）。
//!
//! 目录结构（默认）：
//! - `VERSION`：版本记录
//! - `requirements.txt`：依赖清单
//! - `venv/`：隔离的 Python 运行环境
//! - `config/`：凭据与本地配置（凭据由 Day-0 重置删除，本地配置永不触碰）
//! - `.rvm/`：代理自身的运行数据（更新锁、依赖清单摘要、已部署修订号）
//!
//! 作者：MyRVM Edge 项目组
//! 创建时间：2026-10-18
//! 修改时间：2026-10-18

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};

pub const VERSION_FILE: &str = "VERSION";
pub const CONFIG_DIR: &str = "config";
pub const STATE_DIR: &str = ".rvm";
pub const UPDATE_LOCK_FILE: &str = "update.lock";
pub const REQUIREMENTS_DIGEST_FILE: &str = "requirements.sha256";
pub const DEPLOYED_REVISION_FILE: &str = "deployed_rev";

/// 设备身份凭据（Day-0 重置删除）。
pub const SECRETS_FILE: &str = "secrets.env";
pub const CREDENTIALS_FILE: &str = "credentials.json";
pub const MAINTENANCE_MARKER_FILE: &str = ".maintenance_mode";

/// 操作员可编辑的本地配置（Day-0 重置保留）。
pub const HARDWARE_MAP_FILE: &str = "hardware_map.json";
pub const LOCAL_ENV_FILE: &str = "local.env";

/// 以项目根目录为基准的路径集合。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectLayout {
    root: PathBuf,
}

impl ProjectLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn version_file(&self) -> PathBuf {
        self.root.join(VERSION_FILE)
    }

    pub fn config_dir(&self) -> PathBuf {
        self.root.join(CONFIG_DIR)
    }

    pub fn state_dir(&self) -> PathBuf {
        self.root.join(STATE_DIR)
    }

    pub fn update_lock_file(&self) -> PathBuf {
        self.state_dir().join(UPDATE_LOCK_FILE)
    }

    pub fn requirements_digest_file(&self) -> PathBuf {
        self.state_dir().join(REQUIREMENTS_DIGEST_FILE)
    }

    /// 最近一次重启且健康检查通过的源码修订号。
    pub fn deployed_revision_file(&self) -> PathBuf {
        self.state_dir().join(DEPLOYED_REVISION_FILE)
    }

    /// 本地配置文件（仅用于展示/校验，重置流程不会引用）。
    pub fn local_config_files(&self) -> Vec<PathBuf> {
        vec![
            self.config_dir().join(HARDWARE_MAP_FILE),
            self.config_dir().join(LOCAL_ENV_FILE),
        ]
    }
}

/// 确保目录存在（不存在则递归创建）。
///
/// 异常处理：
/// - 目录创建失败（权限、路径非法等）会返回错误。
pub fn ensure_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).with_context(|| format!("创建目录失败: {}", path.display()))?;
    Ok(())
}

/// 将配置中的路径字段解析为实际路径。
///
/// 参数：
/// - `base`：相对路径的基准目录（通常是项目根目录）
/// - `raw`：配置中的路径字符串
///
/// 返回值：
/// - `raw` 为绝对路径：直接返回
/// - `raw` 为相对路径：返回 `base.join(raw)`
///
/// 异常处理：
/// - `raw` 为空字符串时返回错误，避免误用导致操作基准目录本身。
pub fn resolve_path(base: &Path, raw: &str) -> Result<PathBuf> {
    if raw.is_empty() {
        return Err(anyhow!("空路径"));
    }
    let p = PathBuf::from(raw);
    if p.is_absolute() {
        Ok(p)
    } else {
        Ok(base.join(p))
    }
}
