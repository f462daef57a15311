//! 处理器链组装
//!
//! 一条路由的处理器链在注册时组装一次，之后被该路由的所有请求共享。
//! 组装顺序固定：
//!
//! 1. populate 钩子
//! 2. 中间件工厂按路由选项产出的处理器
//! 3. before 钩子
//! 4. 路由自己的处理器

use std::sync::Arc;

use crate::handler::{BoxedHandler, ControllerState};
use crate::middleware::MiddlewareFactory;
use crate::options::ResolvedOptions;

/// 组装好的处理器链
pub type HandlerChain<S> = Arc<[BoxedHandler<S>]>;

/// 处理器链组装器
pub struct ChainAssembler<'a, S: ControllerState> {
    populates: &'a [BoxedHandler<S>],
    middlewares: &'a [Arc<dyn MiddlewareFactory<S>>],
}

impl<'a, S: ControllerState> ChainAssembler<'a, S> {
    pub fn new(
        populates: &'a [BoxedHandler<S>],
        middlewares: &'a [Arc<dyn MiddlewareFactory<S>>],
    ) -> Self {
        Self {
            populates,
            middlewares,
        }
    }

    pub fn assemble(
        &self,
        options: &Arc<ResolvedOptions>,
        before: Vec<BoxedHandler<S>>,
        handlers: Vec<BoxedHandler<S>>,
    ) -> HandlerChain<S> {
        let mut chain = Vec::with_capacity(
            self.populates.len() + self.middlewares.len() + before.len() + handlers.len(),
        );

        chain.extend(self.populates.iter().cloned());
        chain.extend(self.middlewares.iter().map(|factory| factory.create(options)));
        chain.extend(before);
        chain.extend(handlers);

        chain.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::Exchange;
    use crate::handler::{sync_fn, Outcome};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Users;

    fn noop() -> BoxedHandler<Users> {
        sync_fn(|_: &Users, _: &mut Exchange| Outcome::Next)
    }

    #[test]
    fn test_assembly_order() {
        let populate = noop();
        let before = noop();
        let handler = noop();
        let from_factory = noop();

        let created = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&created);
        let produced = Arc::clone(&from_factory);
        let factory: Arc<dyn MiddlewareFactory<Users>> =
            Arc::new(move |_: &Arc<ResolvedOptions>| -> BoxedHandler<Users> {
                counter.fetch_add(1, Ordering::SeqCst);
                Arc::clone(&produced)
            });

        let populates = vec![Arc::clone(&populate)];
        let middlewares = vec![factory];
        let assembler = ChainAssembler::new(&populates, &middlewares);

        let chain = assembler.assemble(
            &ResolvedOptions::default().into_shared(),
            vec![Arc::clone(&before)],
            vec![Arc::clone(&handler)],
        );

        assert_eq!(chain.len(), 4);
        assert!(Arc::ptr_eq(&chain[0], &populate));
        assert!(Arc::ptr_eq(&chain[1], &from_factory));
        assert!(Arc::ptr_eq(&chain[2], &before));
        assert!(Arc::ptr_eq(&chain[3], &handler));
        assert_eq!(created.load(Ordering::SeqCst), 1);
    }
}
