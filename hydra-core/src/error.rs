//! 统一的错误处理类型
//!
//! 框架层面的错误使用 `ApplicationError`，业务代码可以继续使用 `anyhow::Result`，
//! 通过 `.context()` 添加错误上下文信息。

use thiserror::Error;

pub use anyhow::Result;

/// 应用级错误
#[derive(Debug, Error)]
pub enum ApplicationError {
    /// 配置读取或解析失败
    #[error("Configuration error: {0}")]
    Config(String),

    /// 日志系统初始化失败（通常是重复初始化）
    #[error("Failed to initialize logging: {0}")]
    LoggingInitFailed(String),

    /// Web 服务器错误
    #[error("Server error: {0}")]
    Server(String),

    #[error("{0}")]
    Other(String),
}

/// 应用级结果类型
pub type ApplicationResult<T> = std::result::Result<T, ApplicationError>;
