//! Web 服务器模块
//!
//! 把进程内路由接到 Axum 上：所有请求都进入同一个 fallback，
//! 转换为 [`Request`] 后交给 [`MemoryRouter`]，再把 [`Response`](crate::exchange::Response) 转换回来。

use axum::body::Body;
use axum::extract::Request as AxumRequest;
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response as AxumResponse};
use axum::Router;
use hydra_core::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::constants::{SERVER_HOST, SERVER_PORT};
use crate::exchange::Request;
use crate::router::MemoryRouter;

/// Web 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerProperties {
    /// 服务器监听地址
    pub host: String,

    /// 服务器监听端口
    pub port: u16,

    /// 请求体大小上限（字节）
    pub max_body_size: usize,

    /// 是否启用请求日志
    pub enable_request_logging: bool,
}

impl Default for ServerProperties {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_body_size: 2 * 1024 * 1024,
            enable_request_logging: true,
        }
    }
}

impl ServerProperties {
    /// 从 Environment 加载配置
    pub fn from_environment(env: &Environment) -> Self {
        let defaults = Self::default();
        Self {
            host: env.get_string_or(SERVER_HOST, &defaults.host),
            port: env
                .get_i64(SERVER_PORT)
                .and_then(|p| u16::try_from(p).ok())
                .unwrap_or(defaults.port),
            max_body_size: env
                .get_i64("server.max-body-size")
                .and_then(|s| usize::try_from(s).ok())
                .unwrap_or(defaults.max_body_size),
            enable_request_logging: env.get_bool_or(
                "server.enable-request-logging",
                defaults.enable_request_logging,
            ),
        }
    }

    /// 获取服务器地址
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// 请求日志中间件
pub async fn request_logging(req: AxumRequest, next: Next) -> AxumResponse {
    let method = req.method().clone();
    let uri = req.uri().clone();
    let start = Instant::now();

    let response = next.run(req).await;

    tracing::info!(
        method = %method,
        uri = %uri,
        status = %response.status().as_u16(),
        elapsed = ?start.elapsed(),
        "Request completed"
    );

    response
}

/// 把进程内路由转换为 Axum 路由
pub fn into_axum_router(router: Arc<MemoryRouter>) -> Router {
    into_axum_router_with_limit(router, ServerProperties::default().max_body_size)
}

fn into_axum_router_with_limit(router: Arc<MemoryRouter>, limit: usize) -> Router {
    Router::new().fallback(move |request: AxumRequest| {
        let router = Arc::clone(&router);
        async move { dispatch(router, request, limit).await }
    })
}

async fn dispatch(router: Arc<MemoryRouter>, request: AxumRequest, limit: usize) -> AxumResponse {
    let (parts, body) = request.into_parts();

    let body = match axum::body::to_bytes(body, limit).await {
        Ok(body) => body,
        Err(e) => {
            tracing::warn!(path = %parts.uri.path(), error = %e, "Failed to read request body");
            return (StatusCode::PAYLOAD_TOO_LARGE, "Failed to read request body").into_response();
        }
    };

    let response = router.respond(Request::from_parts(parts, body)).await;
    let (status, headers, body) = response.into_parts();

    (status, headers, Body::from(body)).into_response()
}

/// Hydra Web 服务器
pub struct WebServer {
    /// 服务器配置
    config: ServerProperties,

    /// 所有控制器挂载到的根路由
    router: Arc<MemoryRouter>,
}

impl WebServer {
    pub fn new(config: ServerProperties, router: Arc<MemoryRouter>) -> Self {
        Self { config, router }
    }

    /// 从 Environment 读取服务器配置
    pub fn from_environment(env: &Environment, router: Arc<MemoryRouter>) -> Self {
        Self::new(ServerProperties::from_environment(env), router)
    }

    pub fn config(&self) -> &ServerProperties {
        &self.config
    }

    /// 组装完整的 Axum 应用
    pub fn app(&self) -> Router {
        let app = into_axum_router_with_limit(Arc::clone(&self.router), self.config.max_body_size)
            .layer(TraceLayer::new_for_http());

        if self.config.enable_request_logging {
            app.layer(middleware::from_fn(request_logging))
        } else {
            app
        }
    }

    /// 启动服务器
    pub async fn run(self) -> ApplicationResult<()> {
        let addr = self.config.address();
        let app = self.app().into_make_service();

        tracing::info!("Starting Hydra web server on {}", addr);

        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| ApplicationError::Server(format!("Failed to bind to {}: {}", addr, e)))?;

        tracing::info!("Server listening on http://{}", addr);

        axum::serve(listener, app)
            .await
            .map_err(|e| ApplicationError::Server(format!("Server error: {}", e)))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::{Controller, ControllerClass};
    use crate::exchange::Exchange;
    use crate::handler::{sync_fn, MethodTable, Outcome};
    use crate::route::RouteArgs;
    use hydra_core::config::{ConfigValue, MapPropertySource};
    use serde_json::json;
    use tower::ServiceExt;

    fn app_router() -> Arc<MemoryRouter> {
        let class = ControllerClass::<()>::builder("echo").build();
        let echo = sync_fn(|_: &(), exchange: &mut Exchange| {
            let body = String::from_utf8_lossy(exchange.request.body()).to_string();
            let id = exchange.request.param("id").unwrap_or_default().to_string();
            exchange
                .response
                .json(http::StatusCode::OK, &json!({ "id": id, "body": body }));
            Outcome::Done
        });

        let mut controller =
            Controller::new(class, (), MethodTable::new().with("echo", echo), json!({ "root": "/echo" }))
                .unwrap();
        controller.post(RouteArgs::path("/:id", ["echo"])).unwrap();

        let root = Arc::new(MemoryRouter::new());
        root.mount(Arc::clone(controller.router()));
        root
    }

    #[tokio::test]
    async fn test_axum_adapter_dispatches() {
        let app = into_axum_router(app_router());

        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .method("POST")
                    .uri("/echo/7")
                    .body(Body::from("hello"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body, json!({ "id": "7", "body": "hello" }));
    }

    #[tokio::test]
    async fn test_axum_adapter_not_found() {
        let server = WebServer::new(ServerProperties::default(), app_router());

        let response = server
            .app()
            .oneshot(
                axum::http::Request::builder()
                    .uri("/nowhere")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_server_properties_from_environment() {
        let env = Environment::new();
        env.add_property_source(Box::new(
            MapPropertySource::new("test")
                .with_property(SERVER_HOST, ConfigValue::String("127.0.0.1".into()))
                .with_property(SERVER_PORT, ConfigValue::Int(3000))
                .with_property("server.enable-request-logging", ConfigValue::Bool(false)),
        ));

        let properties = ServerProperties::from_environment(&env);
        assert_eq!(properties.address(), "127.0.0.1:3000");
        assert!(!properties.enable_request_logging);
        assert_eq!(properties.max_body_size, ServerProperties::default().max_body_size);
    }
}
