//! 依赖安装：在隔离环境（venv）中执行 `pip install -r requirements.txt`。
//!
//! 作者：MyRVM Edge 项目组
//! 创建时间：2026-10-18
//! 修改时间：2026-10-18

use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use rvm_core::update::DependencyInstaller;
use tracing::info;

use crate::process::run_with_timeout;

/// 失败时附带的输出尾部长度（字符）。
const OUTPUT_TAIL: usize = 800;

#[derive(Debug, Clone)]
pub struct PipInstaller {
    pub venv_dir: PathBuf,
    pub requirements: PathBuf,
    pub timeout: Duration,
}

impl PipInstaller {
    pub fn new(venv_dir: PathBuf, requirements: PathBuf, timeout: Duration) -> Self {
        Self {
            venv_dir,
            requirements,
            timeout,
        }
    }

    fn pip(&self) -> PathBuf {
        self.venv_dir.join("bin").join("pip")
    }
}

impl DependencyInstaller for PipInstaller {
    fn install(&self) -> Result<()> {
        let pip = self.pip();
        if !pip.exists() {
            return Err(anyhow!("隔离环境中缺少 pip: {}", pip.display()));
        }
        info!("安装依赖: {} -r {}", pip.display(), self.requirements.display());
        let mut cmd = Command::new(&pip);
        cmd.args(["install", "--disable-pip-version-check", "-r"])
            .arg(&self.requirements);
        let out = run_with_timeout(&mut cmd, self.timeout)
            .with_context(|| format!("执行 pip 失败: {}", pip.display()))?;
        if out.success() {
            return Ok(());
        }
        Err(anyhow!(
            "pip install 退出码异常 ({}): {}",
            out.code(),
            tail(&out.stderr, OUTPUT_TAIL)
        ))
    }
}

fn tail(s: &str, max_chars: usize) -> &str {
    let s = s.trim();
    let count = s.chars().count();
    if count <= max_chars {
        return s;
    }
    let skip = count - max_chars;
    let idx = s.char_indices().nth(skip).map(|(i, _)| i).unwrap_or(0);
    &s[idx..]
}
