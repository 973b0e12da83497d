//! 提权/权限相关检测。
//!
//! 作者：MyRVM Edge 项目组
//! 创建时间：2026-10-18
//! 修改时间：2026-10-18

use rvm_core::privilege::PrivilegeContext;

/// 测试环境下允许非 root 运行的环境变量。
pub const ALLOW_NON_ROOT_ENV: &str = "RVM_TEST_ALLOW_NON_ROOT";

/// 判断当前进程的有效用户是否为 root。
///
/// 安全注意：
/// - 该检查仅用于“是否应继续执行需要 root 的系统修改”，不能作为完整的安全边界。
pub fn is_running_as_root() -> bool {
    unsafe { libc::geteuid() == 0 }
}

fn allow_non_root_for_tests() -> bool {
    matches!(std::env::var(ALLOW_NON_ROOT_ENV).as_deref(), Ok("1"))
}

/// 探测当前进程的权限上下文（启动时调用一次）。
pub fn current_privilege() -> PrivilegeContext {
    PrivilegeContext::new(allow_non_root_for_tests() || is_running_as_root())
}
