// hydra-core: Hydra 控制器框架的基础设施
//
// 提供：
// - 分层配置（TOML 文件、环境变量、内存配置源）
// - 日志初始化（基于 tracing-subscriber）
// - 统一的错误类型
// - 路由路径工具函数

pub mod config;
pub mod error;
pub mod logging;
pub mod utils;

// 重新导出常用类型
pub use config::{
    ConfigValue, Environment, EnvironmentPropertySource, MapPropertySource, PropertySource,
    TomlPropertySource,
};
pub use error::{ApplicationError, ApplicationResult, Result};
pub use logging::{LogFormat, LoggingConfig};

/// Prelude 模块，包含常用的 traits 和类型
pub mod prelude {
    pub use crate::config::{
        self, ConfigValue, Environment, EnvironmentPropertySource, MapPropertySource,
        PropertySource, TomlPropertySource,
    };
    pub use crate::error::{ApplicationError, ApplicationResult, Result};
    pub use crate::logging::{LogFormat, LoggingConfig};
    pub use crate::utils;
    // Re-export anyhow for convenience
    pub use anyhow::{anyhow, Context};
}
