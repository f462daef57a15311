//! 控制器
//!
//! 一个控制器是一组共享根路径、默认选项和 before 钩子的路由端点。
//!
//! ## 两级注册
//!
//! 1. **控制器类型** - [`ControllerClass`] 在构造任何实例之前一次性组装好，
//!    包含配置处理器、populate 钩子和中间件工厂，`build()` 之后不再改变
//! 2. **控制器实例** - [`Controller`] 由类型、状态、方法表和原始配置构造，
//!    通过声明式路由表（`compile()`）或命令式调用（`get`/`post`/...）注册路由
//!
//! ```ignore
//! let class = ControllerClass::<Users>::builder("users").build();
//! let methods = MethodTable::new()
//!     .with("checkAuth", check_auth)
//!     .with("show", show);
//!
//! let mut users = Controller::new(class, Users::default(), methods, json!({
//!     "root": "/users",
//!     "before": "checkAuth",
//!     "map": { "get /:id": "show" }
//! }))?;
//! users.compile()?;
//! ```

use async_trait::async_trait;
use futures_util::FutureExt;
use http::Method;
use hydra_core::utils::{path, text};
use hydra_core::Environment;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use uuid::Uuid;

use crate::chain::{ChainAssembler, HandlerChain};
use crate::constants::{CONTROLLERS_PREFIX, METHOD_COLUMN_WIDTH};
use crate::dispatch::{panic_message, Completion, RouteEndpoint};
use crate::error::{ConfigError, DispatchError};
use crate::exchange::Exchange;
use crate::handler::{BoxedHandler, ControllerState, HandlerRef, MethodTable, Outcome};
use crate::middleware::{self, MiddlewareFactory};
use crate::options::{CommonOptions, ResolvedOptions};
use crate::pipeline::{ConfigInput, ConfigPipeline, ConfigProcessor, MapSlot, RouterOptions};
use crate::route::{RouteArgs, RouteNormalizer};
use crate::route_map::RouteMap;
use crate::router::{ErrorEndpoint, HostRouter, Layer, MemoryRouter, NotFound, ParamValidator};

// ============================================================================
// 控制器类型
// ============================================================================

/// 控制器类型
///
/// 同一类型的所有实例共享的注册信息
pub struct ControllerClass<S: ControllerState> {
    name: String,
    pipeline: ConfigPipeline<S>,
    populates: Vec<BoxedHandler<S>>,
    middlewares: Vec<Arc<dyn MiddlewareFactory<S>>>,
}

impl<S: ControllerState> fmt::Debug for ControllerClass<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControllerClass")
            .field("name", &self.name)
            .field("processors", &self.pipeline.names())
            .field("populates", &self.populates.len())
            .field(
                "middlewares",
                &self.middlewares.iter().map(|m| m.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl<S: ControllerState> ControllerClass<S> {
    /// 创建构建器，默认的配置处理器和中间件工厂已经注册
    pub fn builder(name: impl Into<String>) -> ControllerClassBuilder<S> {
        ControllerClassBuilder {
            class: ControllerClass {
                name: name.into(),
                pipeline: ConfigPipeline::with_defaults(),
                populates: Vec::new(),
                middlewares: middleware::defaults(),
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pipeline(&self) -> &ConfigPipeline<S> {
        &self.pipeline
    }

    pub fn populates(&self) -> &[BoxedHandler<S>] {
        &self.populates
    }

    pub fn middlewares(&self) -> &[Arc<dyn MiddlewareFactory<S>>] {
        &self.middlewares
    }
}

/// 控制器类型构建器，注册只能追加
pub struct ControllerClassBuilder<S: ControllerState> {
    class: ControllerClass<S>,
}

impl<S: ControllerState> ControllerClassBuilder<S> {
    /// 追加配置处理器
    pub fn process_config<P>(mut self, processor: P) -> Self
    where
        P: ConfigProcessor<S> + 'static,
    {
        self.class.pipeline.push(Arc::new(processor));
        self
    }

    /// 追加 populate 钩子
    pub fn populate(mut self, handler: BoxedHandler<S>) -> Self {
        self.class.populates.push(handler);
        self
    }

    /// 追加中间件工厂
    pub fn middleware<M>(mut self, factory: M) -> Self
    where
        M: MiddlewareFactory<S> + 'static,
    {
        self.class.middlewares.push(Arc::new(factory));
        self
    }

    pub fn build(self) -> Arc<ControllerClass<S>> {
        tracing::debug!(
            controller = %self.class.name,
            processors = self.class.pipeline.len(),
            populates = self.class.populates.len(),
            middlewares = self.class.middlewares.len(),
            "Controller class built"
        );
        Arc::new(self.class)
    }
}

// ============================================================================
// 错误处理器
// ============================================================================

/// 控制器错误处理器
///
/// 返回值决定错误的去向：
///
/// - `Done`：已经写好错误响应
/// - `Next`：不处理，原错误继续向外传播
/// - `Interrupt`：吞掉错误，交给后续路由
/// - `Fail(e)`：换成新的错误继续传播
#[async_trait]
pub trait ErrorHandler<S: ControllerState>: Send + Sync + 'static {
    async fn handle(&self, state: &S, error: &DispatchError, exchange: &mut Exchange) -> Outcome;
}

struct SyncErrorHandler<F>(F);

#[async_trait]
impl<S, F> ErrorHandler<S> for SyncErrorHandler<F>
where
    S: ControllerState,
    F: Fn(&S, &DispatchError, &mut Exchange) -> Outcome + Send + Sync + 'static,
{
    async fn handle(&self, state: &S, error: &DispatchError, exchange: &mut Exchange) -> Outcome {
        (self.0)(state, error, exchange)
    }
}

/// 由同步闭包创建错误处理器
pub fn error_fn<S, F>(f: F) -> Arc<dyn ErrorHandler<S>>
where
    S: ControllerState,
    F: Fn(&S, &DispatchError, &mut Exchange) -> Outcome + Send + Sync + 'static,
{
    Arc::new(SyncErrorHandler(f))
}

/// 绑定了控制器状态的错误处理器，作为错误层注册到宿主路由
struct ControllerErrorLayer<S: ControllerState> {
    controller: String,
    state: Arc<S>,
    handler: Arc<dyn ErrorHandler<S>>,
}

#[async_trait]
impl<S: ControllerState> ErrorEndpoint for ControllerErrorLayer<S> {
    async fn handle_error(&self, error: DispatchError, exchange: &mut Exchange) -> Completion {
        let call = async { self.handler.handle(&self.state, &error, exchange).await };
        let outcome = match AssertUnwindSafe(call).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(panic) => Outcome::Fail(DispatchError::Panicked(panic_message(panic))),
        };

        match outcome {
            Outcome::Done => Completion::Responded,
            Outcome::Next => Completion::Failed(error),
            Outcome::Interrupt => Completion::Escaped,
            Outcome::Fail(e) => {
                tracing::warn!(controller = %self.controller, error = %e, "Controller error handler failed");
                Completion::Failed(e)
            }
        }
    }
}

// ============================================================================
// 控制器
// ============================================================================

/// 读取 `controllers.<name>` 下的控制器配置
pub fn config_from_environment(env: &Environment, name: &str) -> Option<serde_json::Value> {
    env.get_json(&format!("{}.{}", CONTROLLERS_PREFIX, name))
}

/// 已注册的路由
#[derive(Debug, Clone)]
pub struct RouteRegistration {
    pub method: Method,
    /// 根路径 + 路由路径
    pub path: String,
    pub options: Arc<ResolvedOptions>,
    /// 处理器链长度
    pub chain_len: usize,
}

/// 控制器实例
pub struct Controller<S: ControllerState, R: HostRouter = MemoryRouter> {
    id: Uuid,
    name: Option<String>,
    root: String,
    class: Arc<ControllerClass<S>>,
    state: Arc<S>,
    methods: MethodTable<S>,
    router: Arc<R>,
    router_options: RouterOptions,
    map: RouteMap<S>,
    by_autogenerated_map: bool,
    common: CommonOptions<S>,
    compiled: bool,
    error_handler: Option<Arc<dyn ErrorHandler<S>>>,
    routes: Vec<RouteRegistration>,
}

impl<S: ControllerState, R: HostRouter> fmt::Debug for Controller<S, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Controller")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("root", &self.root)
            .field("class", &self.class.name)
            .field("map", &self.map)
            .field("compiled", &self.compiled)
            .field("routes", &self.routes)
            .finish()
    }
}

impl<S: ControllerState> Controller<S> {
    /// 使用进程内路由构造控制器
    pub fn new(
        class: Arc<ControllerClass<S>>,
        state: impl Into<Arc<S>>,
        methods: MethodTable<S>,
        config: impl Into<ConfigInput<S>>,
    ) -> Result<Self, ConfigError> {
        Self::with_host(class, state, methods, config)
    }
}

impl<S: ControllerState, R: HostRouter> Controller<S, R> {
    /// 使用任意宿主路由构造控制器
    ///
    /// 配置先经过控制器类型的全部配置处理器，宿主路由按处理后的 `router` 选项创建
    pub fn with_host(
        class: Arc<ControllerClass<S>>,
        state: impl Into<Arc<S>>,
        methods: MethodTable<S>,
        config: impl Into<ConfigInput<S>>,
    ) -> Result<Self, ConfigError> {
        let config = class.pipeline().process(config.into(), &methods)?;

        let router = Arc::new(R::from_options(&config.router));
        let (map, by_autogenerated_map) = match config.map {
            MapSlot::Table(map) => (map, false),
            MapSlot::Absent | MapSlot::Malformed(_) => (RouteMap::new(), true),
        };

        let common = CommonOptions {
            before: config.before.into_resolved(),
            values: config.extra,
        };

        let controller = Self {
            id: Uuid::new_v4(),
            name: config.name,
            root: path::with_trailing_slash(config.root.as_deref().unwrap_or_default()),
            class,
            state: state.into(),
            methods,
            router,
            router_options: config.router,
            map,
            by_autogenerated_map,
            common,
            compiled: false,
            error_handler: None,
            routes: Vec::new(),
        };

        tracing::debug!(
            controller = %controller.display_name(),
            id = %controller.id,
            root = %controller.root,
            "Controller created"
        );

        Ok(controller)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.class.name)
    }

    /// 根路径，总是以 `/` 结尾
    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn class(&self) -> &Arc<ControllerClass<S>> {
        &self.class
    }

    pub fn state(&self) -> &Arc<S> {
        &self.state
    }

    pub fn methods(&self) -> &MethodTable<S> {
        &self.methods
    }

    pub fn router(&self) -> &Arc<R> {
        &self.router
    }

    pub fn router_options(&self) -> &RouterOptions {
        &self.router_options
    }

    pub fn map(&self) -> &RouteMap<S> {
        &self.map
    }

    pub fn common_options(&self) -> &CommonOptions<S> {
        &self.common
    }

    pub fn is_compiled(&self) -> bool {
        self.compiled
    }

    /// 没有通过声明式路由表构造
    pub fn by_autogenerated_map(&self) -> bool {
        self.by_autogenerated_map
    }

    pub fn error_handler(&self) -> Option<&Arc<dyn ErrorHandler<S>>> {
        self.error_handler.as_ref()
    }

    /// 目前为止注册的路由
    pub fn routes(&self) -> &[RouteRegistration] {
        &self.routes
    }

    /// 替换控制器的 before 钩子
    pub fn before<I, H>(&mut self, hooks: I) -> Result<&mut Self, ConfigError>
    where
        I: IntoIterator<Item = H>,
        H: Into<HandlerRef<S>>,
    {
        let hooks: Vec<HandlerRef<S>> = hooks.into_iter().map(Into::into).collect();
        self.common.before = self.methods.resolve_all(&hooks)?;
        Ok(self)
    }

    /// 注册路径参数校验器
    pub fn param(&mut self, name: &str, validator: Arc<dyn ParamValidator>) -> &mut Self {
        if name.trim().is_empty() {
            tracing::error!(controller = %self.display_name(), "Param name must be a non-empty string");
        }

        self.router.register_param(name, validator);
        self
    }

    /// 为多个 HTTP 方法注册同一条路由
    pub fn method<I>(&mut self, methods: I, args: RouteArgs<S>) -> Result<&mut Self, ConfigError>
    where
        I: IntoIterator<Item = Method>,
    {
        for method in methods {
            self.register(method, args.clone())?;
        }
        Ok(self)
    }

    fn sugar(&mut self, method: Method, args: RouteArgs<S>) -> Result<&mut Self, ConfigError> {
        if !self.by_autogenerated_map {
            tracing::error!(
                controller = %self.display_name(),
                method = %method,
                "Controller generated by map options"
            );
        }

        self.method([method], args)
    }

    pub fn get(&mut self, args: RouteArgs<S>) -> Result<&mut Self, ConfigError> {
        self.sugar(Method::GET, args)
    }

    pub fn post(&mut self, args: RouteArgs<S>) -> Result<&mut Self, ConfigError> {
        self.sugar(Method::POST, args)
    }

    pub fn put(&mut self, args: RouteArgs<S>) -> Result<&mut Self, ConfigError> {
        self.sugar(Method::PUT, args)
    }

    pub fn patch(&mut self, args: RouteArgs<S>) -> Result<&mut Self, ConfigError> {
        self.sugar(Method::PATCH, args)
    }

    pub fn delete(&mut self, args: RouteArgs<S>) -> Result<&mut Self, ConfigError> {
        self.sugar(Method::DELETE, args)
    }

    #[deprecated(note = "use `Controller::delete` instead")]
    pub fn del(&mut self, args: RouteArgs<S>) -> Result<&mut Self, ConfigError> {
        tracing::warn!(
            controller = %self.display_name(),
            "Controller::del is deprecated and will be removed, use Controller::delete instead"
        );
        self.delete(args)
    }

    /// 设置控制器错误处理器，并作为错误层挂到宿主路由
    pub fn error(&mut self, handler: Arc<dyn ErrorHandler<S>>) -> &mut Self {
        self.error_handler = Some(Arc::clone(&handler));
        self.router
            .register_catch_all(Layer::Error(Arc::new(ControllerErrorLayer {
                controller: self.display_name().to_string(),
                state: Arc::clone(&self.state),
                handler,
            })));
        self
    }

    /// 在当前所有路由之后挂一个 404 兜底层
    pub fn end(&mut self) -> &mut Self {
        self.router
            .register_catch_all(Layer::Handler(Arc::new(NotFound)));
        self
    }

    /// 直接向宿主路由添加兜底层
    pub fn use_layer(&mut self, layer: Layer) -> &mut Self {
        self.router.register_catch_all(layer);
        self
    }

    /// 编译声明式路由表，重复调用无效果
    pub fn compile(&mut self) -> Result<(), ConfigError> {
        if self.compiled {
            return Ok(());
        }

        let planned = self.map.plan(&self.methods)?;
        let mut prepared = Vec::with_capacity(planned.len());
        for route in planned {
            let handlers = route.handlers.into_iter().map(HandlerRef::Direct).collect();
            prepared.push(self.prepare(
                route.method,
                RouteArgs::PathOptions(route.path, route.options, handlers),
            )?);
        }

        // 先全部准备，再统一绑定
        self.compiled = true;
        for route in prepared {
            self.bind(route)?;
        }

        tracing::debug!(
            controller = %self.display_name(),
            routes = self.routes.len(),
            "Controller compiled"
        );
        Ok(())
    }

    /// 规整参数、组装处理器链并绑定到宿主路由
    fn register(&mut self, method: Method, args: RouteArgs<S>) -> Result<(), ConfigError> {
        let route = self.prepare(method, args)?;
        self.bind(route)
    }

    /// 规整参数并组装处理器链，宿主路由提前检查路径
    fn prepare(&self, method: Method, args: RouteArgs<S>) -> Result<PreparedRoute<S>, ConfigError> {
        let route = RouteNormalizer::new(self.class.pipeline(), &self.methods, &self.common)
            .normalize(args)?;

        let full_path = path::join(&self.root, &route.path);
        self.router.check_route(&full_path)?;

        let options = route.options.into_shared();
        let chain = ChainAssembler::new(self.class.populates(), self.class.middlewares())
            .assemble(&options, self.common.before.clone(), route.handlers);

        Ok(PreparedRoute {
            method,
            full_path,
            options,
            chain,
        })
    }

    fn bind(&mut self, route: PreparedRoute<S>) -> Result<(), ConfigError> {
        let PreparedRoute {
            method,
            full_path,
            options,
            chain,
        } = route;

        tracing::info!(
            "{} {}",
            text::pad_end(method.as_str(), ' ', METHOD_COLUMN_WIDTH),
            full_path
        );

        let chain_len = chain.len();
        let endpoint = RouteEndpoint::new(
            format!("{} {}", method, full_path),
            Arc::clone(&self.state),
            chain,
        );
        self.router
            .register_route(method.clone(), &full_path, Arc::new(endpoint))?;

        self.routes.push(RouteRegistration {
            method,
            path: full_path,
            options,
            chain_len,
        });
        Ok(())
    }
}

/// 已组装好、尚未绑定的路由
struct PreparedRoute<S: ControllerState> {
    method: Method,
    full_path: String,
    options: Arc<ResolvedOptions>,
    chain: HandlerChain<S>,
}
