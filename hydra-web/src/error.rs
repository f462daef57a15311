//! 错误类型
//!
//! 分为两个层级：
//!
//! 1. **配置层级** - 控制器构造、路由注册、路由表编译期间发现的错误（`ConfigError`）。
//!    只有无法解析的方法名、非法的 HTTP 方法和非法路径会作为错误返回，
//!    其余的配置误用只记录日志。
//! 2. **请求层级** - 处理器链执行期间产生的错误（`DispatchError`），
//!    总是中断当前处理器链并交给宿主路由的错误处理路径。

use http::StatusCode;
use serde::Serialize;
use thiserror::Error;

/// 配置层级错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// 处理器引用的方法名在控制器方法表中不存在
    #[error("Controller has no method named '{name}'")]
    UnknownMethod { name: String },

    /// 声明式路由键中的 HTTP 方法无法解析
    #[error("Invalid HTTP method '{method}' in route '{route}'")]
    InvalidMethod { method: String, route: String },

    /// 路由路径无法编译为匹配模式
    #[error("Invalid route path '{path}': {message}")]
    InvalidPath { path: String, message: String },
}

/// 请求层级错误
///
/// 处理器返回的错误和处理器内部的 panic 在这里是同一种东西，
/// 对宿主路由来说没有区别
#[derive(Error, Debug)]
pub enum DispatchError {
    /// 处理器显式转发的错误
    #[error(transparent)]
    Handler(#[from] anyhow::Error),

    /// 处理器执行时 panic
    #[error("Handler panicked: {0}")]
    Panicked(String),

    /// 路径参数校验未通过
    #[error("Invalid value for path parameter '{name}'")]
    ParamRejected { name: String },

    /// 带有明确状态码的错误
    #[error("{message}")]
    Status { status: StatusCode, message: String },
}

impl DispatchError {
    /// 创建带状态码的错误
    pub fn status(status: StatusCode, message: impl Into<String>) -> Self {
        DispatchError::Status {
            status,
            message: message.into(),
        }
    }

    /// 获取错误对应的 HTTP 状态码
    pub fn status_code(&self) -> StatusCode {
        match self {
            DispatchError::Handler(_) => StatusCode::INTERNAL_SERVER_ERROR,
            DispatchError::Panicked(_) => StatusCode::INTERNAL_SERVER_ERROR,
            DispatchError::ParamRejected { .. } => StatusCode::BAD_REQUEST,
            DispatchError::Status { status, .. } => *status,
        }
    }
}

/// 标准错误响应格式
///
/// 宿主路由在错误没有被任何控制器错误处理器处理时使用
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub timestamp: String,
    pub status: u16,
    pub error: String,
    pub message: String,
    pub path: String,
}

impl ErrorResponse {
    pub fn new(status: StatusCode, message: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            status: status.as_u16(),
            error: status
                .canonical_reason()
                .unwrap_or("Unknown Error")
                .to_string(),
            message: message.into(),
            path: path.into(),
        }
    }

    /// 根据请求层级错误生成响应体
    pub fn from_error(error: &DispatchError, path: impl Into<String>) -> Self {
        Self::new(error.status_code(), error.to_string(), path)
    }
}
