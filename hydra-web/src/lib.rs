//! # Hydra Web
//!
//! 控制器路由注册与处理器链顺序执行
//!
//! ## 核心流程
//!
//! - **构造** - 原始配置经过控制器类型的配置处理管道
//! - **注册** - 声明式路由表或命令式调用规整为 `(method, path, options, handlers)`，
//!   组装为处理器链并绑定到宿主路由
//! - **请求** - 处理器链逐个执行，支持提前结束、中断和统一的错误转发
//!
//! ## 模块
//!
//! - [`pipeline`] - 配置处理管道
//! - [`route`] - 路由参数规整
//! - [`route_map`] - 声明式路由表
//! - [`chain`] - 处理器链组装
//! - [`dispatch`] - 处理器链执行
//! - [`controller`] - 控制器 API
//! - [`router`] - 宿主路由边界与进程内实现
//! - [`server`] - Axum 适配

pub mod chain;
pub mod constants;
pub mod controller;
pub mod dispatch;
pub mod error;
pub mod exchange;
pub mod handler;
pub mod middleware;
pub mod options;
pub mod pipeline;
pub mod route;
pub mod route_map;
pub mod router;
pub mod server;

pub use controller::{error_fn, Controller, ControllerClass, ErrorHandler, RouteRegistration};
pub use dispatch::Completion;
pub use error::{ConfigError, DispatchError, ErrorResponse};
pub use exchange::{Exchange, Request, Response};
pub use handler::{handler_fn, sync_fn, BoxedHandler, Handler, HandlerRef, MethodTable, Outcome};
pub use options::{ResolvedOptions, RouteOptions};
pub use route::RouteArgs;
pub use route_map::{HandlerSpec, RouteMap};
pub use router::{HostRouter, MemoryRouter};

pub mod prelude {
    //! 预导入模块

    pub use crate::chain::HandlerChain;
    pub use crate::controller::*;
    pub use crate::dispatch::{Completion, RouteEndpoint};
    pub use crate::error::*;
    pub use crate::exchange::*;
    pub use crate::handler::*;
    pub use crate::middleware::{AjaxGate, AttachOptions, MiddlewareFactory};
    pub use crate::options::*;
    pub use crate::pipeline::{ConfigInput, ConfigProcessor, RawConfig, RouterOptions};
    pub use crate::route::RouteArgs;
    pub use crate::route_map::{HandlerSpec, RouteMap};
    pub use crate::router::*;
    pub use crate::server::*;

    pub use http::{Method, StatusCode};
    pub use hydra_core::prelude::*;
}
