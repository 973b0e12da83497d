//! 本机 IPC 协议定义（心跳上报进程 <-> 代理）。
//!
//! 协议形态：
//! - 以 JSON 序列化 [`IpcRequest`] / [`IpcResponse`]，按“单行一条消息”的方式传输（Unix socket）
//! - 每条消息携带 `request_id` 用于请求-响应关联
//!
//! 约束与注意事项：
//! - `message` 字段不应包含敏感信息（凭据内容等）
//! - 心跳传输本身不在代理内实现：代理只接收解析后的命令，并返回执行结果与版本号
//!
//! 作者：MyRVM Edge 项目组
//! 创建时间：2026-10-18
//! 修改时间：2026-10-18

use std::path::PathBuf;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::command::{CommandProcessor, CommandReport, RemoteCommand};
use crate::prober::{ServiceStatus, StatusProber};
use crate::version::VersionInfo;

/// IPC 请求消息。
///
/// 序列化格式：
/// - 使用 `#[serde(tag = "type")]`，在 JSON 中通过 `type` 字段区分请求类型。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IpcRequest {
    /// 连通性探测。
    Ping { request_id: Uuid },
    /// 分派一条命令（`GIT_PULL` / `RESTART` / 其他视为空操作）。
    Dispatch { request_id: Uuid, command: String },
    /// 分派心跳响应中的 `commands` 数组（取第一条可识别命令）。
    DispatchHeartbeat {
        request_id: Uuid,
        #[serde(default)]
        commands: Vec<Value>,
    },
    /// 获取当前版本号。
    GetVersion { request_id: Uuid },
    /// 获取受管服务状态。
    GetStatus { request_id: Uuid },
}

impl IpcRequest {
    pub fn request_id(&self) -> Uuid {
        match self {
            IpcRequest::Ping { request_id }
            | IpcRequest::Dispatch { request_id, .. }
            | IpcRequest::DispatchHeartbeat { request_id, .. }
            | IpcRequest::GetVersion { request_id }
            | IpcRequest::GetStatus { request_id } => *request_id,
        }
    }
}

/// IPC 响应消息。
///
/// 异常处理：
/// - 通用错误通过 [`IpcResponse::Error`] 返回；`request_id` 应尽量回传原始请求 ID。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IpcResponse {
    Pong { request_id: Uuid },
    CommandResult { request_id: Uuid, report: CommandReport },
    Version { request_id: Uuid, version: String },
    Status {
        request_id: Uuid,
        services: Vec<ServiceStatus>,
    },
    Error { request_id: Uuid, message: String },
}

#[derive(Debug, Error)]
pub enum IpcError {
    #[error("IPC 消息编码失败: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("IPC 消息解码失败: {0}")]
    Decode(#[source] serde_json::Error),
}

/// 编码为单行 JSON（以 `\n` 结尾）。
pub fn encode_line<T: Serialize>(message: &T) -> Result<String, IpcError> {
    let mut line = serde_json::to_string(message).map_err(IpcError::Encode)?;
    line.push('\n');
    Ok(line)
}

pub fn decode_line<T: DeserializeOwned>(line: &str) -> Result<T, IpcError> {
    serde_json::from_str(line.trim()).map_err(IpcError::Decode)
}

/// 代理侧的请求处理器（同步执行；调用方负责超时控制）。
#[derive(Clone)]
pub struct IpcEndpoint {
    processor: Arc<CommandProcessor>,
    prober: StatusProber,
    project_root: PathBuf,
}

impl IpcEndpoint {
    pub fn new(processor: Arc<CommandProcessor>, prober: StatusProber, project_root: PathBuf) -> Self {
        Self {
            processor,
            prober,
            project_root,
        }
    }

    pub fn handle(&self, request: IpcRequest) -> IpcResponse {
        match request {
            IpcRequest::Ping { request_id } => IpcResponse::Pong { request_id },
            IpcRequest::Dispatch {
                request_id,
                command,
            } => IpcResponse::CommandResult {
                request_id,
                report: self.processor.dispatch(RemoteCommand::parse(&command)),
            },
            IpcRequest::DispatchHeartbeat {
                request_id,
                commands,
            } => IpcResponse::CommandResult {
                request_id,
                report: self.processor.dispatch_heartbeat(&commands),
            },
            IpcRequest::GetVersion { request_id } => IpcResponse::Version {
                request_id,
                version: VersionInfo::current_or_unknown(&self.project_root),
            },
            IpcRequest::GetStatus { request_id } => IpcResponse::Status {
                request_id,
                services: self.prober.status_all(),
            },
        }
    }
}
