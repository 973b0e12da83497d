//! 版本记录（项目根目录下的 `VERSION` 文件）。
//!
//! 每次读取都重新加载文件，不做缓存：更新完成后版本号预期会变化。
//!
//! 作者：MyRVM Edge 项目组
//! 创建时间：2026-10-18
//! 修改时间：2026-10-18

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::paths::VERSION_FILE;

/// 无法读取版本时对外上报的占位值。
pub const UNKNOWN_VERSION: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo(String);

#[derive(Debug, Error)]
pub enum VersionError {
    #[error("读取版本文件失败: {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("版本文件为空: {0}")]
    Empty(PathBuf),
}

impl VersionInfo {
    /// 从项目根目录读取 `VERSION`（首尾空白会被去除）。
    ///
    /// 异常处理：
    /// - 文件不存在/不可读、内容为空时返回错误
    pub fn load(project_root: &Path) -> Result<Self, VersionError> {
        let path = project_root.join(VERSION_FILE);
        let raw = std::fs::read_to_string(&path).map_err(|source| VersionError::Read {
            path: path.clone(),
            source,
        })?;
        let token = raw.trim();
        if token.is_empty() {
            return Err(VersionError::Empty(path));
        }
        Ok(Self(token.to_string()))
    }

    /// 读取版本；失败时返回 `unknown`。
    pub fn current_or_unknown(project_root: &Path) -> String {
        Self::load(project_root)
            .map(|v| v.0)
            .unwrap_or_else(|_| UNKNOWN_VERSION.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VersionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
