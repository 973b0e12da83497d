//! 权限上下文。
//!
//! 说明：
//! - 由调用方（CLI/代理）在启动时探测一次，然后显式注入控制器与重置组件
//! - 组件在每次调用时先检查权限，再进行任何修改性操作
//!
//! 作者：MyRVM Edge 项目组
//! 创建时间：2026-10-18
//! 修改时间：2026-10-18

/// 调用方的权限上下文。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrivilegeContext {
    elevated: bool,
}

impl PrivilegeContext {
    pub fn new(elevated: bool) -> Self {
        Self { elevated }
    }

    /// 具备提升权限（root）。
    pub fn elevated() -> Self {
        Self::new(true)
    }

    /// 普通用户权限。
    pub fn unprivileged() -> Self {
        Self::new(false)
    }

    pub fn is_elevated(&self) -> bool {
        self.elevated
    }
}
