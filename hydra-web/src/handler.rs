//! 处理器
//!
//! 处理器链里的每个元素都是一个 [`Handler`]：拿到控制器状态和当前请求，
//! 返回一个 [`Outcome`] 告诉执行器接下来怎么走。
//!
//! 处理器可以直接以值的形式给出（[`HandlerRef::Direct`]），
//! 也可以以控制器方法名的形式给出（[`HandlerRef::Named`]），
//! 后者在组装处理器链时通过 [`MethodTable`] 解析，找不到的方法名是硬错误。

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{ConfigError, DispatchError};
use crate::exchange::Exchange;

/// 控制器状态的约束
///
/// 处理器链在所有并发请求之间共享，状态以 `Arc<S>` 的形式只读地传给每个处理器
pub trait ControllerState: Send + Sync + 'static {}

impl<T: Send + Sync + 'static> ControllerState for T {}

/// 处理器执行结果
#[derive(Debug)]
pub enum Outcome {
    /// 继续执行处理器链中的下一个处理器
    Next,

    /// 响应已经写好，处理器链到此结束
    Done,

    /// 提前终止处理器链，把请求交还给宿主路由（不带错误）
    Interrupt,

    /// 终止处理器链，把错误交给宿主路由的错误处理路径
    Fail(DispatchError),
}

impl Outcome {
    /// 以任意错误终止处理器链
    pub fn fail(error: impl Into<anyhow::Error>) -> Self {
        Outcome::Fail(DispatchError::Handler(error.into()))
    }

    pub fn is_next(&self) -> bool {
        matches!(self, Outcome::Next)
    }
}

impl From<DispatchError> for Outcome {
    fn from(error: DispatchError) -> Self {
        Outcome::Fail(error)
    }
}

impl<E: Into<anyhow::Error>> From<Result<(), E>> for Outcome {
    fn from(result: Result<(), E>) -> Self {
        match result {
            Ok(()) => Outcome::Next,
            Err(e) => Outcome::fail(e),
        }
    }
}

/// 处理器 trait
#[async_trait]
pub trait Handler<S: ControllerState>: Send + Sync + 'static {
    async fn call(&self, state: &S, exchange: &mut Exchange) -> Outcome;
}

/// 共享的处理器
pub type BoxedHandler<S> = Arc<dyn Handler<S>>;

/// 异步闭包处理器
pub struct FnHandler<F>(F);

#[async_trait]
impl<S, F> Handler<S> for FnHandler<F>
where
    S: ControllerState,
    F: for<'a> Fn(&'a S, &'a mut Exchange) -> BoxFuture<'a, Outcome> + Send + Sync + 'static,
{
    async fn call(&self, state: &S, exchange: &mut Exchange) -> Outcome {
        (self.0)(state, exchange).await
    }
}

/// 同步闭包处理器
pub struct SyncHandler<F>(F);

#[async_trait]
impl<S, F> Handler<S> for SyncHandler<F>
where
    S: ControllerState,
    F: Fn(&S, &mut Exchange) -> Outcome + Send + Sync + 'static,
{
    async fn call(&self, state: &S, exchange: &mut Exchange) -> Outcome {
        (self.0)(state, exchange)
    }
}

/// 由异步闭包创建处理器
///
/// ```ignore
/// let load = handler_fn(|repo: &UserRepo, exchange| Box::pin(async move {
///     let user = repo.find(exchange.request.param("id")).await?;
///     exchange.response.json(StatusCode::OK, &user);
///     Ok::<_, anyhow::Error>(())
/// }.map(Outcome::from)));
/// ```
pub fn handler_fn<S, F>(f: F) -> BoxedHandler<S>
where
    S: ControllerState,
    F: for<'a> Fn(&'a S, &'a mut Exchange) -> BoxFuture<'a, Outcome> + Send + Sync + 'static,
{
    Arc::new(FnHandler(f))
}

/// 由同步闭包创建处理器
pub fn sync_fn<S, F>(f: F) -> BoxedHandler<S>
where
    S: ControllerState,
    F: Fn(&S, &mut Exchange) -> Outcome + Send + Sync + 'static,
{
    Arc::new(SyncHandler(f))
}

/// 处理器引用：处理器本身，或者控制器方法名
pub enum HandlerRef<S: ControllerState> {
    Direct(BoxedHandler<S>),
    Named(String),
}

impl<S: ControllerState> Clone for HandlerRef<S> {
    fn clone(&self) -> Self {
        match self {
            HandlerRef::Direct(handler) => HandlerRef::Direct(Arc::clone(handler)),
            HandlerRef::Named(name) => HandlerRef::Named(name.clone()),
        }
    }
}

impl<S: ControllerState> fmt::Debug for HandlerRef<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerRef::Direct(_) => f.write_str("Direct(<handler>)"),
            HandlerRef::Named(name) => write!(f, "Named({:?})", name),
        }
    }
}

impl<S: ControllerState> From<&str> for HandlerRef<S> {
    fn from(name: &str) -> Self {
        HandlerRef::Named(name.to_string())
    }
}

impl<S: ControllerState> From<String> for HandlerRef<S> {
    fn from(name: String) -> Self {
        HandlerRef::Named(name)
    }
}

impl<S: ControllerState> From<BoxedHandler<S>> for HandlerRef<S> {
    fn from(handler: BoxedHandler<S>) -> Self {
        HandlerRef::Direct(handler)
    }
}

impl<S: ControllerState> From<&BoxedHandler<S>> for HandlerRef<S> {
    fn from(handler: &BoxedHandler<S>) -> Self {
        HandlerRef::Direct(Arc::clone(handler))
    }
}

/// 控制器方法表
///
/// 方法名到处理器的显式映射，方法名形式的处理器引用和 before 钩子都在这里解析
pub struct MethodTable<S: ControllerState> {
    methods: HashMap<String, BoxedHandler<S>>,
}

impl<S: ControllerState> Default for MethodTable<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: ControllerState> MethodTable<S> {
    pub fn new() -> Self {
        Self {
            methods: HashMap::new(),
        }
    }

    /// 添加方法（构建器风格）
    pub fn with(mut self, name: impl Into<String>, handler: BoxedHandler<S>) -> Self {
        self.insert(name, handler);
        self
    }

    /// 添加方法，同名方法会被覆盖
    pub fn insert(&mut self, name: impl Into<String>, handler: BoxedHandler<S>) {
        self.methods.insert(name.into(), handler);
    }

    pub fn get(&self, name: &str) -> Option<&BoxedHandler<S>> {
        self.methods.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    /// 解析单个处理器引用
    pub fn resolve(&self, handler: &HandlerRef<S>) -> Result<BoxedHandler<S>, ConfigError> {
        match handler {
            HandlerRef::Direct(handler) => Ok(Arc::clone(handler)),
            HandlerRef::Named(name) => {
                self.get(name)
                    .cloned()
                    .ok_or_else(|| ConfigError::UnknownMethod { name: name.clone() })
            }
        }
    }

    /// 按顺序解析一组处理器引用
    pub fn resolve_all(
        &self,
        handlers: &[HandlerRef<S>],
    ) -> Result<Vec<BoxedHandler<S>>, ConfigError> {
        handlers.iter().map(|h| self.resolve(h)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::Request;
    use http::Method;

    struct Greeter {
        greeting: &'static str,
    }

    #[tokio::test]
    async fn test_sync_handler_sees_state() {
        let handler = sync_fn(|state: &Greeter, exchange: &mut Exchange| {
            exchange
                .response
                .text(http::StatusCode::OK, state.greeting);
            Outcome::Done
        });

        let state = Greeter { greeting: "hello" };
        let mut exchange = Exchange::new(Request::new(Method::GET, "/"));
        let outcome = handler.call(&state, &mut exchange).await;

        assert!(matches!(outcome, Outcome::Done));
        assert_eq!(exchange.response.body().as_ref(), b"hello");
    }

    #[tokio::test]
    async fn test_async_handler() {
        let handler = handler_fn::<Greeter, _>(|state, exchange| {
            Box::pin(async move {
                tokio::task::yield_now().await;
                exchange
                    .response
                    .text(http::StatusCode::OK, state.greeting);
                Outcome::Next
            })
        });

        let state = Greeter { greeting: "hi" };
        let mut exchange = Exchange::default();
        assert!(handler.call(&state, &mut exchange).await.is_next());
        assert_eq!(exchange.response.body().as_ref(), b"hi");
    }

    #[test]
    fn test_method_table_resolution() {
        let show = sync_fn(|_: &Greeter, _: &mut Exchange| Outcome::Next);
        let table = MethodTable::new().with("show", Arc::clone(&show));

        let resolved = table.resolve(&HandlerRef::from("show")).unwrap();
        assert!(Arc::ptr_eq(&resolved, &show));

        let err = table.resolve(&HandlerRef::from("missing")).err().unwrap();
        assert_eq!(err, ConfigError::UnknownMethod { name: "missing".into() });
    }

    #[test]
    fn test_outcome_from_result() {
        assert!(Outcome::from(Ok::<(), anyhow::Error>(())).is_next());
        let failed = Outcome::from(Err::<(), _>(anyhow::anyhow!("nope")));
        assert!(matches!(failed, Outcome::Fail(DispatchError::Handler(_))));
    }
}
