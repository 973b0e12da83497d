//! systemd 单元模板渲染。
//!
//! 模板中的占位符：
//! - `{{USER}}`：服务运行用户
//! - `{{WORKING_DIR}}`：项目根目录
//!
//! 渲染后仍残留 `{{...}}` 视为错误，避免把未替换的模板装进系统目录。
//!
//! 作者：MyRVM Edge 项目组
//! 创建时间：2026-10-18
//! 修改时间：2026-10-18

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitVars {
    pub user: String,
    pub working_dir: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("模板变量为空: {0}")]
    EmptyVar(&'static str),
    #[error("模板中存在未知占位符: {0}")]
    UnknownPlaceholder(String),
}

pub fn render_unit_template(template: &str, vars: &UnitVars) -> Result<String, TemplateError> {
    if vars.user.trim().is_empty() {
        return Err(TemplateError::EmptyVar("USER"));
    }
    if vars.working_dir.trim().is_empty() {
        return Err(TemplateError::EmptyVar("WORKING_DIR"));
    }
    let rendered = template
        .replace("{{USER}}", &vars.user)
        .replace("{{WORKING_DIR}}", &vars.working_dir);

    if let Some(start) = rendered.find("{{") {
        let rest = &rendered[start..];
        let end = rest.find("}}").map(|i| i + 2).unwrap_or(rest.len());
        return Err(TemplateError::UnknownPlaceholder(rest[..end].to_string()));
    }
    Ok(rendered)
}
