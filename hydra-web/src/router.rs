//! 宿主路由
//!
//! 控制器只通过 [`HostRouter`] 与底层路由打交道：注册路由端点、路径参数校验器和兜底层。
//! [`MemoryRouter`] 是一个进程内的参考实现，按注册顺序匹配，
//! 支持 `:name` 路径参数、`*` 通配、错误层和子路由挂载。

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use http::Method;
use parking_lot::RwLock;
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use crate::dispatch::{panic_message, Completion};
use crate::error::{ConfigError, DispatchError, ErrorResponse};
use crate::exchange::{Exchange, Request, Response};
use crate::handler::Outcome;
use crate::pipeline::RouterOptions;

/// 路由端点
#[async_trait]
pub trait Endpoint: Send + Sync {
    async fn handle(&self, exchange: &mut Exchange) -> Completion;
}

/// 错误端点，只在有错误向外传播时被调用
#[async_trait]
pub trait ErrorEndpoint: Send + Sync {
    async fn handle_error(&self, error: DispatchError, exchange: &mut Exchange) -> Completion;
}

/// 路径参数校验器
///
/// 返回值语义与处理器相同：`Next` 放行，`Done` 直接结束，
/// `Interrupt` 跳过当前路由，`Fail` 进入错误路径
#[async_trait]
pub trait ParamValidator: Send + Sync {
    async fn validate(&self, value: &str, exchange: &mut Exchange) -> Outcome;
}

struct ParamCheck<F> {
    name: String,
    check: F,
}

#[async_trait]
impl<F> ParamValidator for ParamCheck<F>
where
    F: Fn(&str) -> bool + Send + Sync,
{
    async fn validate(&self, value: &str, _exchange: &mut Exchange) -> Outcome {
        if (self.check)(value) {
            Outcome::Next
        } else {
            Outcome::Fail(DispatchError::ParamRejected {
                name: self.name.clone(),
            })
        }
    }
}

/// 由判断函数创建参数校验器，不通过时以 [`DispatchError::ParamRejected`] 失败
pub fn param_check<F>(name: impl Into<String>, check: F) -> Arc<dyn ParamValidator>
where
    F: Fn(&str) -> bool + Send + Sync + 'static,
{
    Arc::new(ParamCheck {
        name: name.into(),
        check,
    })
}

/// 兜底层
#[derive(Clone)]
pub enum Layer {
    /// 没有错误时执行
    Handler(Arc<dyn Endpoint>),
    /// 只在有错误时执行
    Error(Arc<dyn ErrorEndpoint>),
    /// 挂载子路由
    Router(Arc<MemoryRouter>),
}

impl fmt::Debug for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Layer::Handler(_) => f.write_str("Layer::Handler"),
            Layer::Error(_) => f.write_str("Layer::Error"),
            Layer::Router(_) => f.write_str("Layer::Router"),
        }
    }
}

/// 404 兜底端点
pub struct NotFound;

#[async_trait]
impl Endpoint for NotFound {
    async fn handle(&self, exchange: &mut Exchange) -> Completion {
        exchange.response.not_found();
        Completion::Responded
    }
}

/// 宿主路由
pub trait HostRouter: Send + Sync + 'static {
    /// 按控制器配置中的 `router` 选项创建
    fn from_options(options: &RouterOptions) -> Self
    where
        Self: Sized;

    fn register_route(
        &self,
        method: Method,
        path: &str,
        endpoint: Arc<dyn Endpoint>,
    ) -> Result<(), ConfigError>;

    /// 在绑定之前检查路径能否注册，默认不做检查
    fn check_route(&self, path: &str) -> Result<(), ConfigError> {
        let _ = path;
        Ok(())
    }

    fn register_param(&self, name: &str, validator: Arc<dyn ParamValidator>);

    fn register_catch_all(&self, layer: Layer);
}

/// 编译后的路径模式
#[derive(Debug, Clone)]
pub struct RoutePattern {
    source: String,
    regex: Regex,
    params: Vec<String>,
}

impl RoutePattern {
    /// 编译路径
    ///
    /// `:name` 匹配一个路径段，`*` 匹配任意内容；
    /// 非严格模式下结尾的 `/` 可有可无，非大小写敏感模式下忽略大小写
    pub fn compile(path: &str, options: &RouterOptions) -> Result<Self, ConfigError> {
        let mut pattern = String::new();
        if !options.case_sensitive {
            pattern.push_str("(?i)");
        }
        pattern.push('^');

        let body = if options.strict || path == "/" {
            path
        } else {
            path.trim_end_matches('/')
        };
        let body = if !options.strict && body == "/" { "" } else { body };

        let mut params = Vec::new();
        let mut chars = body.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                ':' => {
                    let mut name = String::new();
                    while let Some(&next) = chars.peek() {
                        if next.is_ascii_alphanumeric() || next == '_' {
                            name.push(next);
                            chars.next();
                        } else {
                            break;
                        }
                    }
                    if name.is_empty() {
                        pattern.push_str(&regex::escape(":"));
                    } else {
                        pattern.push_str(&format!("(?P<{}>[^/]+)", name));
                        params.push(name);
                    }
                }
                '*' => pattern.push_str(".*"),
                other => pattern.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
            }
        }

        if !options.strict {
            pattern.push_str("/?");
        }
        pattern.push('$');

        let regex = Regex::new(&pattern).map_err(|e| ConfigError::InvalidPath {
            path: path.to_string(),
            message: e.to_string(),
        })?;

        Ok(Self {
            source: path.to_string(),
            regex,
            params,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// 匹配请求路径，成功时返回路径参数
    pub fn matches(&self, path: &str) -> Option<HashMap<String, String>> {
        let captures = self.regex.captures(path)?;
        Some(
            self.params
                .iter()
                .filter_map(|name| {
                    captures
                        .name(name)
                        .map(|m| (name.clone(), m.as_str().to_string()))
                })
                .collect(),
        )
    }
}

enum Entry {
    Route {
        method: Method,
        pattern: RoutePattern,
        endpoint: Arc<dyn Endpoint>,
    },
    Layer(Layer),
}

/// 进程内路由
#[derive(Default)]
pub struct MemoryRouter {
    options: RouterOptions,
    entries: RwLock<Vec<Arc<Entry>>>,
    params: RwLock<HashMap<String, Vec<Arc<dyn ParamValidator>>>>,
}

impl fmt::Debug for MemoryRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryRouter")
            .field("options", &self.options)
            .field("entries", &self.entries.read().len())
            .finish()
    }
}

impl MemoryRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn options(&self) -> &RouterOptions {
        &self.options
    }

    /// 已注册的路由，按注册顺序
    pub fn routes(&self) -> Vec<(Method, String)> {
        self.entries
            .read()
            .iter()
            .filter_map(|entry| match entry.as_ref() {
                Entry::Route {
                    method, pattern, ..
                } => Some((method.clone(), pattern.source().to_string())),
                Entry::Layer(_) => None,
            })
            .collect()
    }

    /// 挂载子路由
    pub fn mount(&self, router: Arc<MemoryRouter>) {
        self.register_catch_all(Layer::Router(router));
    }

    /// 处理一个请求，得到最终响应
    ///
    /// 没有路由处理时返回 404，错误没有被任何错误层处理时返回 JSON 错误响应
    pub async fn respond(&self, request: Request) -> Response {
        let mut exchange = Exchange::new(request);

        match self.dispatch(&mut exchange, None).await {
            Completion::Responded => exchange.response,
            Completion::Escaped => {
                let mut response = Response::default();
                response.not_found();
                response
            }
            Completion::Failed(error) => {
                let status = error.status_code();
                let path = exchange.request.path().to_string();

                if status.is_server_error() {
                    tracing::error!(path = %path, error = %error, "Unhandled request error");
                } else {
                    tracing::warn!(path = %path, error = %error, "Unhandled request error");
                }

                let mut response = Response::default();
                response.json(status, &ErrorResponse::from_error(&error, path));
                response
            }
        }
    }

    /// 按注册顺序依次尝试各条目
    ///
    /// `error` 为传入的待处理错误（子路由挂载时使用）
    pub fn dispatch<'a>(
        &'a self,
        exchange: &'a mut Exchange,
        error: Option<DispatchError>,
    ) -> BoxFuture<'a, Completion> {
        Box::pin(async move {
            let entries: Vec<Arc<Entry>> = self.entries.read().clone();
            let mut error = error;

            for entry in entries {
                let completion = match (entry.as_ref(), error.take()) {
                    (
                        Entry::Route {
                            method,
                            pattern,
                            endpoint,
                        },
                        None,
                    ) => {
                        if method != exchange.request.method() {
                            continue;
                        }
                        let Some(params) = pattern.matches(exchange.request.path()) else {
                            continue;
                        };
                        exchange.request.set_params(params);

                        match self.run_param_validators(exchange).await {
                            ParamVerdict::Pass => endpoint.handle(exchange).await,
                            ParamVerdict::Skip => Completion::Escaped,
                            ParamVerdict::Stop(completion) => completion,
                        }
                    }
                    (Entry::Layer(Layer::Handler(endpoint)), None) => endpoint.handle(exchange).await,
                    (Entry::Layer(Layer::Error(endpoint)), Some(e)) => {
                        endpoint.handle_error(e, exchange).await
                    }
                    (Entry::Layer(Layer::Router(router)), pending) => {
                        router.dispatch(exchange, pending).await
                    }
                    (_, pending) => {
                        error = pending;
                        continue;
                    }
                };

                match completion {
                    Completion::Responded => return Completion::Responded,
                    Completion::Escaped => {}
                    Completion::Failed(e) => error = Some(e),
                }
            }

            match error {
                Some(e) => Completion::Failed(e),
                None => Completion::Escaped,
            }
        })
    }

    /// 依次运行当前路由参数对应的校验器
    async fn run_param_validators(&self, exchange: &mut Exchange) -> ParamVerdict {
        let checks: Vec<(String, Arc<dyn ParamValidator>)> = {
            let validators = self.params.read();
            let mut names: Vec<&String> = exchange.request.params().keys().collect();
            names.sort();
            names
                .into_iter()
                .flat_map(|name| {
                    validators
                        .get(name)
                        .into_iter()
                        .flatten()
                        .map(move |v| (name.clone(), Arc::clone(v)))
                })
                .collect()
        };

        for (name, validator) in checks {
            let value = exchange.request.param(&name).unwrap_or_default().to_string();
            let check = async { validator.validate(&value, exchange).await };
            let outcome = match AssertUnwindSafe(check).catch_unwind().await {
                Ok(outcome) => outcome,
                Err(panic) => Outcome::Fail(DispatchError::Panicked(panic_message(panic))),
            };

            match outcome {
                Outcome::Next => {}
                Outcome::Done => return ParamVerdict::Stop(Completion::Responded),
                Outcome::Interrupt => {
                    tracing::debug!(param = %name, "Route skipped by parameter validator");
                    return ParamVerdict::Skip;
                }
                Outcome::Fail(e) => return ParamVerdict::Stop(Completion::Failed(e)),
            }
        }

        ParamVerdict::Pass
    }
}

enum ParamVerdict {
    Pass,
    Skip,
    Stop(Completion),
}

impl HostRouter for MemoryRouter {
    fn from_options(options: &RouterOptions) -> Self {
        Self {
            options: options.clone(),
            ..Self::default()
        }
    }

    fn register_route(
        &self,
        method: Method,
        path: &str,
        endpoint: Arc<dyn Endpoint>,
    ) -> Result<(), ConfigError> {
        let pattern = RoutePattern::compile(path, &self.options)?;
        self.entries.write().push(Arc::new(Entry::Route {
            method,
            pattern,
            endpoint,
        }));
        Ok(())
    }

    fn check_route(&self, path: &str) -> Result<(), ConfigError> {
        RoutePattern::compile(path, &self.options).map(|_| ())
    }

    fn register_param(&self, name: &str, validator: Arc<dyn ParamValidator>) {
        self.params
            .write()
            .entry(name.to_string())
            .or_default()
            .push(validator);
    }

    fn register_catch_all(&self, layer: Layer) {
        self.entries.write().push(Arc::new(Entry::Layer(layer)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;

    struct Text(&'static str);

    #[async_trait]
    impl Endpoint for Text {
        async fn handle(&self, exchange: &mut Exchange) -> Completion {
            let id = exchange.request.param("id").unwrap_or("-").to_string();
            exchange
                .response
                .text(StatusCode::OK, format!("{}:{}", self.0, id));
            Completion::Responded
        }
    }

    struct Pass;

    #[async_trait]
    impl Endpoint for Pass {
        async fn handle(&self, _exchange: &mut Exchange) -> Completion {
            Completion::Escaped
        }
    }

    struct Fails;

    #[async_trait]
    impl Endpoint for Fails {
        async fn handle(&self, _exchange: &mut Exchange) -> Completion {
            Completion::Failed(DispatchError::status(StatusCode::FORBIDDEN, "forbidden"))
        }
    }

    struct Recover;

    #[async_trait]
    impl ErrorEndpoint for Recover {
        async fn handle_error(&self, error: DispatchError, exchange: &mut Exchange) -> Completion {
            exchange
                .response
                .text(StatusCode::IM_A_TEAPOT, format!("recovered: {}", error));
            Completion::Responded
        }
    }

    fn get(path: &str) -> Request {
        Request::new(Method::GET, path)
    }

    #[test]
    fn test_pattern_compile() {
        let options = RouterOptions::default();
        let pattern = RoutePattern::compile("/users/:id", &options).unwrap();

        let params = pattern.matches("/users/42").unwrap();
        assert_eq!(params.get("id").map(String::as_str), Some("42"));
        assert!(pattern.matches("/users/42/").is_some());
        assert!(pattern.matches("/USERS/42").is_some());
        assert!(pattern.matches("/users").is_none());
        assert!(pattern.matches("/users/42/posts").is_none());

        let root = RoutePattern::compile("/", &options).unwrap();
        assert!(root.matches("/").is_some());
        assert!(root.matches("").is_some());
        assert!(root.matches("/x").is_none());

        let files = RoutePattern::compile("/files/*", &options).unwrap();
        assert!(files.matches("/files/a/b.txt").is_some());

        let dotted = RoutePattern::compile("/a.b", &options).unwrap();
        assert!(dotted.matches("/axb").is_none());
    }

    #[test]
    fn test_pattern_strict_and_case_sensitive() {
        let options = RouterOptions {
            case_sensitive: true,
            strict: true,
        };
        let pattern = RoutePattern::compile("/users", &options).unwrap();
        assert!(pattern.matches("/users").is_some());
        assert!(pattern.matches("/users/").is_none());
        assert!(pattern.matches("/Users").is_none());
    }

    #[test]
    fn test_duplicate_param_is_invalid_path() {
        let err = RoutePattern::compile("/:id/:id", &RouterOptions::default())
            .err()
            .unwrap();
        assert!(matches!(err, ConfigError::InvalidPath { .. }));
    }

    #[tokio::test]
    async fn test_routes_match_in_order_and_escape_falls_through() {
        let router = MemoryRouter::new();
        router.register_route(Method::GET, "/users/:id", Arc::new(Pass)).unwrap();
        router.register_route(Method::POST, "/users/:id", Arc::new(Text("post"))).unwrap();
        router.register_route(Method::GET, "/users/:id", Arc::new(Text("get"))).unwrap();

        let response = router.respond(get("/users/7")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.body().as_ref(), b"get:7");
        assert_eq!(router.routes().len(), 3);
    }

    #[tokio::test]
    async fn test_unmatched_is_not_found() {
        let router = MemoryRouter::new();
        router.register_route(Method::GET, "/a", Arc::new(Text("a"))).unwrap();
        let response = router.respond(get("/b")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_failure_skips_routes_until_error_layer() {
        let router = MemoryRouter::new();
        router.register_route(Method::GET, "/x", Arc::new(Fails)).unwrap();
        router.register_route(Method::GET, "/x", Arc::new(Text("unreachable"))).unwrap();
        router.register_catch_all(Layer::Handler(Arc::new(NotFound)));
        router.register_catch_all(Layer::Error(Arc::new(Recover)));

        let response = router.respond(get("/x")).await;
        assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);
        assert_eq!(response.body().as_ref(), b"recovered: forbidden");
    }

    #[tokio::test]
    async fn test_unhandled_error_is_json() {
        let router = MemoryRouter::new();
        router.register_route(Method::GET, "/x", Arc::new(Fails)).unwrap();

        let response = router.respond(get("/x")).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body: serde_json::Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body["message"], "forbidden");
        assert_eq!(body["path"], "/x");
    }

    #[tokio::test]
    async fn test_param_validators() {
        let router = MemoryRouter::new();
        router.register_param("id", param_check("id", |v| v.chars().all(|c| c.is_ascii_digit())));
        router.register_route(Method::GET, "/users/:id", Arc::new(Text("user"))).unwrap();

        let response = router.respond(get("/users/12")).await;
        assert_eq!(response.body().as_ref(), b"user:12");

        let response = router.respond(get("/users/abc")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_panicking_param_validator_is_failure() {
        let router = MemoryRouter::new();
        router.register_param(
            "id",
            param_check("id", |v: &str| -> bool {
                if v == "boom" {
                    panic!("bad id");
                }
                true
            }),
        );
        router.register_route(Method::GET, "/users/:id", Arc::new(Text("user"))).unwrap();

        let response = router.respond(get("/users/boom")).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: serde_json::Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body["message"], "Handler panicked: bad id");

        let response = router.respond(get("/users/3")).await;
        assert_eq!(response.body().as_ref(), b"user:3");
    }

    #[test]
    fn test_check_route_does_not_register() {
        let router = MemoryRouter::new();
        assert!(router.check_route("/users/:id").is_ok());
        assert!(matches!(
            router.check_route("/:id/:id"),
            Err(ConfigError::InvalidPath { .. })
        ));
        assert!(router.routes().is_empty());
    }

    #[tokio::test]
    async fn test_mounted_router() {
        let child = Arc::new(MemoryRouter::new());
        child.register_route(Method::GET, "/child", Arc::new(Fails)).unwrap();

        let parent = MemoryRouter::new();
        parent.mount(Arc::clone(&child));
        parent.register_route(Method::GET, "/parent", Arc::new(Text("parent"))).unwrap();
        parent.register_catch_all(Layer::Error(Arc::new(Recover)));

        let response = parent.respond(get("/parent")).await;
        assert_eq!(response.body().as_ref(), b"parent:-");

        let response = parent.respond(get("/child")).await;
        assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);
    }
}
