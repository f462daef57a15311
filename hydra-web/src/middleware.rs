//! 中间件工厂
//!
//! 中间件工厂注册在控制器类型上，每条路由注册时用该路由的最终选项调用一次，
//! 产出真正在请求时执行的处理器。内置两个工厂：
//!
//! - [`AttachOptions`]：把路由选项挂到请求扩展上
//! - [`AjaxGate`]：按 `ajax` 选项限制请求类型

use async_trait::async_trait;
use std::sync::Arc;

use crate::exchange::Exchange;
use crate::handler::{BoxedHandler, ControllerState, Handler, Outcome};
use crate::options::ResolvedOptions;

/// 中间件工厂
pub trait MiddlewareFactory<S: ControllerState>: Send + Sync {
    fn name(&self) -> &str {
        "middleware"
    }

    /// 为一条路由创建处理器
    fn create(&self, options: &Arc<ResolvedOptions>) -> BoxedHandler<S>;
}

impl<S, F> MiddlewareFactory<S> for F
where
    S: ControllerState,
    F: Fn(&Arc<ResolvedOptions>) -> BoxedHandler<S> + Send + Sync,
{
    fn create(&self, options: &Arc<ResolvedOptions>) -> BoxedHandler<S> {
        self(options)
    }
}

/// 路由选项挂载
pub struct AttachOptions;

struct OptionsAttachment {
    options: Arc<ResolvedOptions>,
}

#[async_trait]
impl<S: ControllerState> Handler<S> for OptionsAttachment {
    async fn call(&self, _state: &S, exchange: &mut Exchange) -> Outcome {
        exchange
            .request
            .extensions_mut()
            .insert(Arc::clone(&self.options));
        Outcome::Next
    }
}

impl<S: ControllerState> MiddlewareFactory<S> for AttachOptions {
    fn name(&self) -> &str {
        "attach-options"
    }

    fn create(&self, options: &Arc<ResolvedOptions>) -> BoxedHandler<S> {
        Arc::new(OptionsAttachment {
            options: Arc::clone(options),
        })
    }
}

/// AJAX 限制
///
/// `ajax = true` 只接受 AJAX 请求，`ajax = false` 拒绝 AJAX 请求，
/// 未设置（或不是布尔值）时两种请求都放行
pub struct AjaxGate;

struct AjaxGuard {
    only_ajax: Option<bool>,
}

#[async_trait]
impl<S: ControllerState> Handler<S> for AjaxGuard {
    async fn call(&self, _state: &S, exchange: &mut Exchange) -> Outcome {
        let xhr = exchange.request.is_xhr();

        match self.only_ajax {
            Some(true) if !xhr => {
                exchange.response.bad_request("Only AJAX request");
                Outcome::Done
            }
            Some(false) if xhr => {
                exchange.response.bad_request("AJAX request is denied");
                Outcome::Done
            }
            _ => Outcome::Next,
        }
    }
}

impl<S: ControllerState> MiddlewareFactory<S> for AjaxGate {
    fn name(&self) -> &str {
        "ajax-gate"
    }

    fn create(&self, options: &Arc<ResolvedOptions>) -> BoxedHandler<S> {
        Arc::new(AjaxGuard {
            only_ajax: options.ajax(),
        })
    }
}

/// 内置中间件工厂，按执行顺序
pub fn defaults<S: ControllerState>() -> Vec<Arc<dyn MiddlewareFactory<S>>> {
    vec![Arc::new(AttachOptions), Arc::new(AjaxGate)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::Request;
    use http::{Method, StatusCode};
    use serde_json::{json, Map};

    fn options(ajax: Option<bool>) -> Arc<ResolvedOptions> {
        let mut values = Map::new();
        if let Some(ajax) = ajax {
            values.insert("ajax".into(), json!(ajax));
        }
        ResolvedOptions::from_values(values).into_shared()
    }

    async fn run_gate(ajax: Option<bool>, xhr: bool) -> (Outcome, Exchange) {
        let handler: BoxedHandler<()> = AjaxGate.create(&options(ajax));
        let mut request = Request::new(Method::GET, "/");
        if xhr {
            request = request.with_xhr();
        }
        let mut exchange = Exchange::new(request);
        let outcome = handler.call(&(), &mut exchange).await;
        (outcome, exchange)
    }

    #[tokio::test]
    async fn test_ajax_only_rejects_plain_requests() {
        let (outcome, exchange) = run_gate(Some(true), false).await;
        assert!(matches!(outcome, Outcome::Done));
        assert_eq!(exchange.response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(exchange.response.body().as_ref(), b"Only AJAX request");

        let (outcome, _) = run_gate(Some(true), true).await;
        assert!(outcome.is_next());
    }

    #[tokio::test]
    async fn test_ajax_denied_rejects_xhr() {
        let (outcome, exchange) = run_gate(Some(false), true).await;
        assert!(matches!(outcome, Outcome::Done));
        assert_eq!(exchange.response.body().as_ref(), b"AJAX request is denied");

        let (outcome, _) = run_gate(Some(false), false).await;
        assert!(outcome.is_next());
    }

    #[tokio::test]
    async fn test_ajax_unset_passes_both() {
        assert!(run_gate(None, false).await.0.is_next());
        assert!(run_gate(None, true).await.0.is_next());
    }

    #[tokio::test]
    async fn test_attach_options() {
        let shared = options(Some(true));
        let handler: BoxedHandler<()> = AttachOptions.create(&shared);
        let mut exchange = Exchange::default();

        assert!(handler.call(&(), &mut exchange).await.is_next());
        let attached = exchange.request.controller_options().unwrap();
        assert!(Arc::ptr_eq(&attached, &shared));
        assert_eq!(attached.ajax(), Some(true));
    }
}
