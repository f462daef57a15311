//! 日志初始化
//!
//! 级别直接使用 [`tracing::Level`]，输出格式只有两种：终端用的紧凑格式和采集用的 JSON。

use crate::config::Environment;
use crate::{ApplicationError, ApplicationResult};
use std::fmt as std_fmt;
use std::str::FromStr;
use tracing::Level;
use tracing_subscriber::{fmt, EnvFilter};

/// 日志输出格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

impl FromStr for LogFormat {
    type Err = ApplicationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("compact") {
            Ok(LogFormat::Compact)
        } else if s.eq_ignore_ascii_case("json") {
            Ok(LogFormat::Json)
        } else {
            Err(ApplicationError::Config(format!("Unknown log format '{}'", s)))
        }
    }
}

impl std_fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std_fmt::Formatter<'_>) -> std_fmt::Result {
        f.write_str(match self {
            LogFormat::Compact => "compact",
            LogFormat::Json => "json",
        })
    }
}

/// 日志配置
///
/// 路由注册表在启动时以 info 级别打印，
/// 每个请求的分发过程以 debug 级别输出，排查路由问题时把级别调到 debug 即可。
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: Level,
    pub format: LogFormat,
    /// 是否输出模块路径
    pub show_target: bool,
    pub show_thread_ids: bool,
    /// 例如 `"hydra_web=debug,tower_http=warn"`，设置后忽略 `level`
    pub filter: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::Compact,
            show_target: false,
            show_thread_ids: false,
            filter: None,
        }
    }
}

impl LoggingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn show_target(mut self, show: bool) -> Self {
        self.show_target = show;
        self
    }

    pub fn show_thread_ids(mut self, show: bool) -> Self {
        self.show_thread_ids = show;
        self
    }

    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// 从环境变量读取配置
    ///
    /// `RUST_LOG` 作为过滤器，`LOG_LEVEL` / `LOG_FORMAT` 覆盖级别和格式
    pub fn from_env() -> Self {
        Self {
            level: parse_or(std::env::var("LOG_LEVEL").ok(), Level::INFO),
            format: parse_or(std::env::var("LOG_FORMAT").ok(), LogFormat::Compact),
            filter: std::env::var("RUST_LOG").ok(),
            ..Self::default()
        }
    }

    /// 从 Environment 读取 `logging.*` 配置
    pub fn from_environment(env: &Environment) -> Self {
        Self {
            level: parse_or(env.get_string("logging.level"), Level::INFO),
            format: parse_or(env.get_string("logging.format"), LogFormat::Compact),
            show_target: env.get_bool_or("logging.show-target", false),
            show_thread_ids: env.get_bool_or("logging.show-thread-ids", false),
            filter: env.get_string("logging.filter"),
        }
    }

    fn env_filter(&self) -> EnvFilter {
        let fallback = || EnvFilter::new(self.level.as_str().to_ascii_lowercase());

        match &self.filter {
            Some(filter) => EnvFilter::try_new(filter).unwrap_or_else(|_| fallback()),
            None => EnvFilter::try_from_default_env().unwrap_or_else(|_| fallback()),
        }
    }

    /// 初始化日志系统
    ///
    /// 全局订阅者只能设置一次，重复调用返回 `LoggingInitFailed`
    pub fn init(self) -> ApplicationResult<()> {
        let builder = fmt()
            .with_env_filter(self.env_filter())
            .with_target(self.show_target)
            .with_thread_ids(self.show_thread_ids);

        let result = match self.format {
            LogFormat::Compact => builder.compact().try_init(),
            LogFormat::Json => builder.json().try_init(),
        };

        result.map_err(|e| ApplicationError::LoggingInitFailed(e.to_string()))
    }
}

/// 解析失败时记录一条警告并使用默认值
fn parse_or<T>(raw: Option<String>, default: T) -> T
where
    T: FromStr,
    T::Err: std_fmt::Display,
{
    match raw {
        Some(raw) => raw.parse().unwrap_or_else(|e| {
            tracing::warn!(value = %raw, error = %e, "Ignoring invalid logging setting");
            default
        }),
        None => default,
    }
}
