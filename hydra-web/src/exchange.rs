//! 请求/响应
//!
//! 处理器链中的每个处理器都拿到同一个 `Exchange`，
//! 前面的处理器写入的扩展数据（例如路由选项）对后面的处理器可见。

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use http::{Extensions, HeaderMap, Method, StatusCode};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

use crate::constants::{XML_HTTP_REQUEST, X_REQUESTED_WITH};
use crate::options::ResolvedOptions;

/// 一次请求的上下文：请求和正在构造的响应
#[derive(Debug, Default)]
pub struct Exchange {
    pub request: Request,
    pub response: Response,
}

impl Exchange {
    pub fn new(request: Request) -> Self {
        Self {
            request,
            response: Response::default(),
        }
    }
}

/// 请求
#[derive(Debug)]
pub struct Request {
    method: Method,
    path: String,
    query: Option<String>,
    headers: HeaderMap,
    params: HashMap<String, String>,
    extensions: Extensions,
    body: Bytes,
}

impl Default for Request {
    fn default() -> Self {
        Self::new(Method::GET, "/")
    }
}

impl Request {
    /// 创建请求，`uri` 可以携带查询串
    pub fn new(method: Method, uri: &str) -> Self {
        let (path, query) = match uri.split_once('?') {
            Some((path, query)) => (path, Some(query.to_string())),
            None => (uri, None),
        };

        Self {
            method,
            path: if path.is_empty() { "/".to_string() } else { path.to_string() },
            query,
            headers: HeaderMap::new(),
            params: HashMap::new(),
            extensions: Extensions::new(),
            body: Bytes::new(),
        }
    }

    /// 从 `http` 请求的各部分构造
    pub fn from_parts(parts: http::request::Parts, body: Bytes) -> Self {
        let mut request = Self::new(parts.method, parts.uri.path());
        request.query = parts.uri.query().map(String::from);
        request.headers = parts.headers;
        request.extensions = parts.extensions;
        request.body = body;
        request
    }

    /// 添加请求头
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// 标记为 AJAX 请求
    pub fn with_xhr(self) -> Self {
        self.with_header(
            HeaderName::from_static(X_REQUESTED_WITH),
            HeaderValue::from_static(XML_HTTP_REQUEST),
        )
    }

    /// 设置请求体
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// 获取路径参数
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    pub fn params(&self) -> &HashMap<String, String> {
        &self.params
    }

    pub(crate) fn set_params(&mut self, params: HashMap<String, String>) {
        self.params = params;
    }

    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }

    /// 是否为 AJAX 请求（`X-Requested-With: XMLHttpRequest`）
    pub fn is_xhr(&self) -> bool {
        self.headers
            .get(X_REQUESTED_WITH)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.eq_ignore_ascii_case(XML_HTTP_REQUEST))
            .unwrap_or(false)
    }

    /// 当前路由的最终选项
    ///
    /// 由内置的选项挂载中间件写入，控制器自己的处理器运行时总是可用
    pub fn controller_options(&self) -> Option<Arc<ResolvedOptions>> {
        self.extensions.get::<Arc<ResolvedOptions>>().cloned()
    }
}

/// 响应
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl Default for Response {
    fn default() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }
}

impl Response {
    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) -> &mut Self {
        self.status = status;
        self
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// 纯文本响应
    pub fn text(&mut self, status: StatusCode, body: impl Into<String>) -> &mut Self {
        self.status = status;
        self.headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        self.body = Bytes::from(body.into());
        self
    }

    /// JSON 响应，序列化失败时退化为 500 文本响应
    pub fn json<T: Serialize>(&mut self, status: StatusCode, value: &T) -> &mut Self {
        match serde_json::to_vec(value) {
            Ok(body) => {
                self.status = status;
                self.headers
                    .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                self.body = Bytes::from(body);
                self
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize JSON response");
                self.text(StatusCode::INTERNAL_SERVER_ERROR, "Failed to serialize response")
            }
        }
    }

    /// 400 Bad Request
    pub fn bad_request(&mut self, message: impl Into<String>) -> &mut Self {
        self.text(StatusCode::BAD_REQUEST, message)
    }

    /// 404 Not Found
    pub fn not_found(&mut self) -> &mut Self {
        self.text(StatusCode::NOT_FOUND, "Not Found")
    }

    pub fn into_parts(self) -> (StatusCode, HeaderMap, Bytes) {
        (self.status, self.headers, self.body)
    }
}
