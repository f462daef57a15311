//! 处理器链执行
//!
//! 每个请求拥有自己的 [`DispatchContext`]，按顺序逐个执行处理器链中的元素，
//! 根据每个元素返回的 [`Outcome`] 决定继续、结束还是把控制权交回宿主路由。
//!
//! 一次执行只产生一个 [`Completion`]：
//!
//! - `Responded`：某个处理器写好了响应
//! - `Escaped`：处理器链走完，或者被主动中断，宿主路由继续尝试后面的路由
//! - `Failed`：处理器返回错误或 panic，宿主路由进入错误处理路径

use async_trait::async_trait;
use futures_util::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::Instrument;

use crate::chain::HandlerChain;
use crate::error::DispatchError;
use crate::exchange::Exchange;
use crate::handler::{BoxedHandler, ControllerState, Outcome};
use crate::router::Endpoint;

/// 处理器链执行的终态
#[derive(Debug)]
pub enum Completion {
    Responded,
    Escaped,
    Failed(DispatchError),
}

impl Completion {
    pub fn is_responded(&self) -> bool {
        matches!(self, Completion::Responded)
    }

    pub fn is_escaped(&self) -> bool {
        matches!(self, Completion::Escaped)
    }
}

/// 单个请求的执行状态
pub struct DispatchContext<'a, S: ControllerState> {
    chain: &'a [BoxedHandler<S>],
    index: usize,
}

impl<'a, S: ControllerState> DispatchContext<'a, S> {
    pub fn new(chain: &'a [BoxedHandler<S>]) -> Self {
        Self { chain, index: 0 }
    }

    /// 已经执行完毕（或被终止）的元素个数
    pub fn index(&self) -> usize {
        self.index
    }

    fn terminate(&mut self) {
        self.index = self.chain.len();
    }

    /// 执行处理器链直到终态
    pub async fn run(mut self, state: &S, exchange: &mut Exchange) -> Completion {
        let chain = self.chain;
        while let Some(handler) = chain.get(self.index) {
            let call = async { handler.call(state, exchange).await };
            let outcome = match AssertUnwindSafe(call).catch_unwind().await {
                Ok(outcome) => outcome,
                Err(panic) => Outcome::Fail(DispatchError::Panicked(panic_message(panic))),
            };

            match outcome {
                Outcome::Next => self.index += 1,
                Outcome::Done => {
                    self.terminate();
                    return Completion::Responded;
                }
                Outcome::Interrupt => {
                    tracing::debug!(position = self.index, "Handler chain interrupted");
                    self.terminate();
                    return Completion::Escaped;
                }
                Outcome::Fail(error) => {
                    tracing::warn!(position = self.index, error = %error, "Handler chain failed");
                    self.terminate();
                    return Completion::Failed(error);
                }
            }
        }

        Completion::Escaped
    }
}

/// 执行一条处理器链
pub async fn run<S: ControllerState>(
    chain: &[BoxedHandler<S>],
    state: &S,
    exchange: &mut Exchange,
) -> Completion {
    DispatchContext::new(chain).run(state, exchange).await
}

/// 从 panic 载荷中取出消息
pub(crate) fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "Unknown panic occurred".to_string()
    }
}

/// 绑定了控制器状态的处理器链，作为一个端点注册到宿主路由
pub struct RouteEndpoint<S: ControllerState> {
    route: String,
    state: Arc<S>,
    chain: HandlerChain<S>,
}

impl<S: ControllerState> RouteEndpoint<S> {
    pub fn new(route: impl Into<String>, state: Arc<S>, chain: HandlerChain<S>) -> Self {
        Self {
            route: route.into(),
            state,
            chain,
        }
    }

    pub fn chain(&self) -> &HandlerChain<S> {
        &self.chain
    }
}

#[async_trait]
impl<S: ControllerState> Endpoint for RouteEndpoint<S> {
    async fn handle(&self, exchange: &mut Exchange) -> Completion {
        let span = tracing::debug_span!(
            "dispatch",
            route = %self.route,
            path = %exchange.request.path()
        );

        run(&self.chain, &self.state, exchange).instrument(span).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{handler_fn, sync_fn};
    use http::StatusCode;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Trace {
        calls: Mutex<Vec<usize>>,
    }

    fn step(id: usize, outcome: fn() -> Outcome) -> BoxedHandler<Trace> {
        sync_fn(move |trace: &Trace, _: &mut Exchange| {
            trace.calls.lock().push(id);
            outcome()
        })
    }

    fn chain(handlers: Vec<BoxedHandler<Trace>>) -> HandlerChain<Trace> {
        handlers.into()
    }

    #[tokio::test]
    async fn test_all_next_escapes_after_every_handler() {
        let trace = Trace::default();
        let chain = chain((0..5).map(|i| step(i, || Outcome::Next)).collect());
        let mut exchange = Exchange::default();

        let completion = run(&chain, &trace, &mut exchange).await;
        assert!(completion.is_escaped());
        assert_eq!(*trace.calls.lock(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_first_failure_stops_chain() {
        let trace = Trace::default();
        let chain = chain(vec![
            step(0, || Outcome::Next),
            step(1, || Outcome::fail(anyhow::anyhow!("denied"))),
            step(2, || Outcome::Next),
            step(3, || Outcome::fail(anyhow::anyhow!("never"))),
        ]);
        let mut exchange = Exchange::default();

        match run(&chain, &trace, &mut exchange).await {
            Completion::Failed(error) => assert_eq!(error.to_string(), "denied"),
            other => panic!("expected failure, got {:?}", other),
        }
        assert_eq!(*trace.calls.lock(), vec![0, 1]);
    }

    #[tokio::test]
    async fn test_panic_is_captured_as_failure() {
        let trace = Trace::default();
        let chain = chain(vec![
            step(0, || Outcome::Next),
            sync_fn(|_: &Trace, _: &mut Exchange| -> Outcome { panic!("boom") }),
            step(2, || Outcome::Next),
        ]);
        let mut exchange = Exchange::default();

        match run(&chain, &trace, &mut exchange).await {
            Completion::Failed(DispatchError::Panicked(message)) => assert_eq!(message, "boom"),
            other => panic!("expected panic failure, got {:?}", other),
        }
        assert_eq!(*trace.calls.lock(), vec![0]);
    }

    #[tokio::test]
    async fn test_panic_inside_future_is_captured() {
        let trace = Trace::default();
        let chain = chain(vec![handler_fn::<Trace, _>(|_, _| {
            Box::pin(async move {
                tokio::task::yield_now().await;
                let fail = true;
                if fail {
                    panic!("late {}", 42);
                }
                Outcome::Next
            })
        })]);
        let mut exchange = Exchange::default();

        match run(&chain, &trace, &mut exchange).await {
            Completion::Failed(DispatchError::Panicked(message)) => assert_eq!(message, "late 42"),
            other => panic!("expected panic failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_interrupt_escapes_without_error() {
        let trace = Trace::default();
        let chain = chain(vec![
            step(0, || Outcome::Interrupt),
            step(1, || Outcome::Next),
        ]);
        let mut exchange = Exchange::default();

        assert!(run(&chain, &trace, &mut exchange).await.is_escaped());
        assert_eq!(*trace.calls.lock(), vec![0]);
    }

    #[tokio::test]
    async fn test_done_ends_chain_with_response() {
        let trace = Trace::default();
        let chain = chain(vec![
            sync_fn(|trace: &Trace, exchange: &mut Exchange| {
                trace.calls.lock().push(0);
                exchange.response.text(StatusCode::OK, "ok");
                Outcome::Done
            }),
            step(1, || Outcome::Next),
        ]);
        let mut exchange = Exchange::default();

        assert!(run(&chain, &trace, &mut exchange).await.is_responded());
        assert_eq!(*trace.calls.lock(), vec![0]);
        assert_eq!(exchange.response.body().as_ref(), b"ok");
    }

    #[tokio::test]
    async fn test_empty_chain_escapes_immediately() {
        let trace = Trace::default();
        let mut exchange = Exchange::default();
        let context = DispatchContext::new(&[]);
        assert_eq!(context.index(), 0);
        assert!(context.run(&trace, &mut exchange).await.is_escaped());
    }

    #[tokio::test]
    async fn test_endpoint_runs_chain_with_state() {
        let trace = Arc::new(Trace::default());
        let endpoint = RouteEndpoint::new(
            "GET /",
            Arc::clone(&trace),
            chain(vec![step(7, || Outcome::Next)]),
        );
        let mut exchange = Exchange::default();

        assert!(endpoint.handle(&mut exchange).await.is_escaped());
        assert_eq!(*trace.calls.lock(), vec![7]);
        assert_eq!(endpoint.chain().len(), 1);
    }
}
