//! 框架常量定义
//!
//! 配置键名称以及请求头约定

// ==================== Server 配置 ====================

/// 服务器监听地址
pub const SERVER_HOST: &str = "server.host";

/// 服务器监听端口
pub const SERVER_PORT: &str = "server.port";

// ==================== Controller 配置 ====================

/// 控制器配置表前缀，`controllers.<name>` 下是单个控制器的完整配置
pub const CONTROLLERS_PREFIX: &str = "controllers";

/// 声明式路由表中携带处理器引用的字段
pub const ACTION_FIELD: &str = "action";

/// 路由选项中控制 AJAX 限制的字段
pub const AJAX_OPTION: &str = "ajax";

// ==================== 请求约定 ====================

/// AJAX 请求标记头
pub const X_REQUESTED_WITH: &str = "x-requested-with";

/// AJAX 请求标记头的取值（大小写不敏感）
pub const XML_HTTP_REQUEST: &str = "XMLHttpRequest";

/// 路由注册日志中 HTTP 方法列的宽度
pub const METHOD_COLUMN_WIDTH: usize = 7;
