//! 路由参数规整
//!
//! 命令式注册接受四种调用形状，按下面的顺序区分：
//!
//! | 形状 | 路径 | 选项 |
//! |------|------|------|
//! | `Handlers(handlers)` | `/` | 控制器默认选项 |
//! | `Options(options, handlers)` | `/` | 覆盖项叠加到默认选项 |
//! | `Path(path, handlers)` | `path` | 控制器默认选项 |
//! | `PathOptions(path, options, handlers)` | `path` | 覆盖项叠加到默认选项 |
//!
//! 调用方提供的覆盖项会先经过控制器类型的全部配置处理器，再叠加到默认选项上。
//! before 钩子不在覆盖范围内：每条路由都使用控制器的 before 钩子。

use std::fmt;

use crate::error::ConfigError;
use crate::handler::{BoxedHandler, ControllerState, HandlerRef, MethodTable};
use crate::options::{CommonOptions, ResolvedOptions, RouteOptions};
use crate::pipeline::{ConfigPipeline, RawConfig};

/// 路由注册参数
pub enum RouteArgs<S: ControllerState> {
    Handlers(Vec<HandlerRef<S>>),
    Options(RouteOptions<S>, Vec<HandlerRef<S>>),
    Path(String, Vec<HandlerRef<S>>),
    PathOptions(String, RouteOptions<S>, Vec<HandlerRef<S>>),
}

impl<S: ControllerState> Clone for RouteArgs<S> {
    fn clone(&self) -> Self {
        match self {
            RouteArgs::Handlers(h) => RouteArgs::Handlers(h.clone()),
            RouteArgs::Options(o, h) => RouteArgs::Options(o.clone(), h.clone()),
            RouteArgs::Path(p, h) => RouteArgs::Path(p.clone(), h.clone()),
            RouteArgs::PathOptions(p, o, h) => RouteArgs::PathOptions(p.clone(), o.clone(), h.clone()),
        }
    }
}

impl<S: ControllerState> fmt::Debug for RouteArgs<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteArgs::Handlers(h) => f.debug_tuple("Handlers").field(h).finish(),
            RouteArgs::Options(o, h) => f.debug_tuple("Options").field(o).field(h).finish(),
            RouteArgs::Path(p, h) => f.debug_tuple("Path").field(p).field(h).finish(),
            RouteArgs::PathOptions(p, o, h) => {
                f.debug_tuple("PathOptions").field(p).field(o).field(h).finish()
            }
        }
    }
}

fn refs<S, I, H>(handlers: I) -> Vec<HandlerRef<S>>
where
    S: ControllerState,
    I: IntoIterator<Item = H>,
    H: Into<HandlerRef<S>>,
{
    handlers.into_iter().map(Into::into).collect()
}

impl<S: ControllerState> RouteArgs<S> {
    /// 只有处理器，挂在根路径上
    pub fn handlers<I, H>(handlers: I) -> Self
    where
        I: IntoIterator<Item = H>,
        H: Into<HandlerRef<S>>,
    {
        RouteArgs::Handlers(refs(handlers))
    }

    /// 选项加处理器，挂在根路径上
    pub fn options<I, H>(options: RouteOptions<S>, handlers: I) -> Self
    where
        I: IntoIterator<Item = H>,
        H: Into<HandlerRef<S>>,
    {
        RouteArgs::Options(options, refs(handlers))
    }

    /// 路径加处理器
    pub fn path<I, H>(path: impl Into<String>, handlers: I) -> Self
    where
        I: IntoIterator<Item = H>,
        H: Into<HandlerRef<S>>,
    {
        RouteArgs::Path(path.into(), refs(handlers))
    }

    /// 路径、选项加处理器
    pub fn path_options<I, H>(path: impl Into<String>, options: RouteOptions<S>, handlers: I) -> Self
    where
        I: IntoIterator<Item = H>,
        H: Into<HandlerRef<S>>,
    {
        RouteArgs::PathOptions(path.into(), options, refs(handlers))
    }

    /// 由可选的路径和选项组装，供动态拼装参数的调用方使用
    pub fn from_parts(
        path: Option<String>,
        options: Option<RouteOptions<S>>,
        handlers: Vec<HandlerRef<S>>,
    ) -> Self {
        match (path, options) {
            (None, None) => RouteArgs::Handlers(handlers),
            (None, Some(options)) => RouteArgs::Options(options, handlers),
            (Some(path), None) => RouteArgs::Path(path, handlers),
            (Some(path), Some(options)) => RouteArgs::PathOptions(path, options, handlers),
        }
    }

    fn into_parts(self) -> (String, Option<RouteOptions<S>>, Vec<HandlerRef<S>>) {
        match self {
            RouteArgs::Handlers(handlers) => ("/".to_string(), None, handlers),
            RouteArgs::Options(options, handlers) => ("/".to_string(), Some(options), handlers),
            RouteArgs::Path(path, handlers) => (path, None, handlers),
            RouteArgs::PathOptions(path, options, handlers) => (path, Some(options), handlers),
        }
    }
}

/// 规整后的路由
pub struct NormalizedRoute<S: ControllerState> {
    pub path: String,
    pub options: ResolvedOptions,
    pub handlers: Vec<BoxedHandler<S>>,
}

/// 路由参数规整器
pub struct RouteNormalizer<'a, S: ControllerState> {
    pipeline: &'a ConfigPipeline<S>,
    methods: &'a MethodTable<S>,
    common: &'a CommonOptions<S>,
}

impl<'a, S: ControllerState> RouteNormalizer<'a, S> {
    pub fn new(
        pipeline: &'a ConfigPipeline<S>,
        methods: &'a MethodTable<S>,
        common: &'a CommonOptions<S>,
    ) -> Self {
        Self {
            pipeline,
            methods,
            common,
        }
    }

    pub fn normalize(&self, args: RouteArgs<S>) -> Result<NormalizedRoute<S>, ConfigError> {
        let (path, options, handlers) = args.into_parts();
        let options = self.resolve_options(options)?;

        Ok(NormalizedRoute {
            path,
            options,
            handlers: self.methods.resolve_all(&handlers)?,
        })
    }

    /// 覆盖项经过配置处理器后叠加到默认选项上
    ///
    /// 处理器解析出的 `before` 只做校验，不进入路由选项
    fn resolve_options(
        &self,
        options: Option<RouteOptions<S>>,
    ) -> Result<ResolvedOptions, ConfigError> {
        let Some(options) = options else {
            return Ok(self.common.resolved());
        };

        let mut config = RawConfig {
            before: options.before,
            extra: options.values,
            ..RawConfig::default()
        };
        self.pipeline.apply(&mut config, self.methods)?;

        Ok(self.common.layer(config.extra))
    }
}
