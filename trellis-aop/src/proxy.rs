//! 拦截代理
//!
//! [`InterceptedProxy`] 持有目标对象、拦截器注册表和 Bean 定义上的绑定，
//! 手写或生成的包装类型通过 `invoke` / `invoke_async` 把方法调用转发到拦截链。
//!
//! ```rust,ignore
//! struct EngineProxy(InterceptedProxy<V8Engine>);
//!
//! impl Engine for EngineProxy {
//!     fn start(&self, rpm: u32) -> anyhow::Result<u32> {
//!         let args = Arguments::new().with("rpm", rpm);
//!         Ok(self.0.invoke("start", args, |engine, args| {
//!             engine.start(args.take::<u32>("rpm").unwrap_or(rpm))
//!         })?)
//!     }
//! }
//! ```

use std::any::type_name;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use parking_lot::RwLock;
use trellis_core::utils::naming::short_type_name;
use trellis_core::{ContainerResult, InjectionContext, InterceptorBinding};

use crate::chain::InterceptorChain;
use crate::error::{InterceptorChainError, InvocationResult};
use crate::invocation::{Arguments, MethodDescriptor, ReturnValue};
use crate::registry::InterceptorRegistry;

#[derive(Default)]
struct ChainCache {
    generation: u64,
    chains: HashMap<String, Arc<InterceptorChain>>,
}

/// 拦截代理
pub struct InterceptedProxy<T: ?Sized> {
    target: Arc<T>,
    registry: Arc<InterceptorRegistry>,
    bindings: Vec<InterceptorBinding>,
    target_type: String,
    cache: RwLock<ChainCache>,
}

impl<T: ?Sized + Send + Sync + 'static> InterceptedProxy<T> {
    pub fn new(target: Arc<T>, registry: Arc<InterceptorRegistry>, bindings: Vec<InterceptorBinding>) -> Self {
        Self {
            target,
            registry,
            bindings,
            target_type: short_type_name(type_name::<T>()),
            cache: RwLock::new(ChainCache::default()),
        }
    }

    /// 在 Bean 工厂函数中创建代理
    ///
    /// 拦截器注册表从容器获取，绑定取自正在创建的 Bean 的定义。
    pub fn from_context(target: Arc<T>, ctx: &InjectionContext<'_>) -> ContainerResult<Self> {
        let registry = ctx.get_bean::<InterceptorRegistry>()?;
        let bindings = ctx.definition().interceptor_bindings().to_vec();
        Ok(Self::new(target, registry, bindings))
    }

    /// 覆盖方法签名中使用的类型名称
    pub fn with_target_type(mut self, target_type: impl Into<String>) -> Self {
        self.target_type = target_type.into();
        self
    }

    pub fn target(&self) -> &Arc<T> {
        &self.target
    }

    pub fn bindings(&self) -> &[InterceptorBinding] {
        &self.bindings
    }

    pub fn registry(&self) -> &Arc<InterceptorRegistry> {
        &self.registry
    }

    /// 获取方法的拦截链，注册表变化后重新组装
    pub fn chain(&self, method: &str) -> Arc<InterceptorChain> {
        let generation = self.registry.generation();
        {
            let cache = self.cache.read();
            if cache.generation == generation {
                if let Some(chain) = cache.chains.get(method) {
                    return Arc::clone(chain);
                }
            }
        }

        let chain = Arc::new(
            self.registry
                .chain_for(MethodDescriptor::new(self.target_type.as_str(), method), &self.bindings),
        );

        let mut cache = self.cache.write();
        if cache.generation != generation {
            cache.chains.clear();
            cache.generation = generation;
        }
        cache.chains.insert(method.to_string(), Arc::clone(&chain));
        chain
    }

    /// 同步方法调用
    pub fn invoke<R, F>(&self, method: &str, arguments: Arguments, f: F) -> InvocationResult<R>
    where
        R: Send + 'static,
        F: FnOnce(&T, &mut Arguments) -> anyhow::Result<R> + Send,
    {
        let chain = self.chain(method);
        let target = &self.target;
        let value = chain.invoke(
            arguments,
            Box::new(move |args: &mut Arguments| {
                f(target.as_ref(), args)
                    .map(ReturnValue::ready)
                    .map_err(InterceptorChainError::Failed)
            }),
        )?;
        value.downcast::<R>(chain.method())
    }

    /// 异步方法调用
    ///
    /// 拦截链同步执行，目标方法返回的 future 在拦截链结束后等待；
    /// 拦截器通过 `proceed_with` 挂接的逻辑在 future 完成后执行。
    pub async fn invoke_async<R, F, Fut>(&self, method: &str, arguments: Arguments, f: F) -> InvocationResult<R>
    where
        R: Send + 'static,
        F: FnOnce(Arc<T>, Arguments) -> Fut + Send,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
    {
        let chain = self.chain(method);
        let target = Arc::clone(&self.target);
        let value = chain.invoke(
            arguments,
            Box::new(move |args: &mut Arguments| {
                let args = std::mem::take(args);
                Ok(ReturnValue::deferred(f(target, args)))
            }),
        )?;
        value.resolve::<R>(chain.method()).await
    }
}

impl<T: ?Sized> fmt::Debug for InterceptedProxy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptedProxy")
            .field("target_type", &self.target_type)
            .field("bindings", &self.bindings)
            .field("cached_chains", &self.cache.read().chains.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interceptor::FnInterceptor;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter {
        base: u32,
    }

    impl Counter {
        fn add(&self, n: u32) -> anyhow::Result<u32> {
            if n == 0 {
                anyhow::bail!("nothing to add");
            }
            Ok(self.base + n)
        }
    }

    fn doubling_registry() -> Arc<InterceptorRegistry> {
        let registry = Arc::new(InterceptorRegistry::new());
        registry.register(
            "double",
            Arc::new(FnInterceptor::new("double", |ctx| {
                let n = *ctx.argument::<u32>("n")?;
                ctx.arguments_mut().set("n", n * 2);
                ctx.proceed()
            })),
        );
        registry
    }

    #[test]
    fn test_invoke_routes_through_chain() {
        let proxy = InterceptedProxy::new(
            Arc::new(Counter { base: 10 }),
            doubling_registry(),
            vec![InterceptorBinding::new("double").members("add")],
        );

        let result = proxy
            .invoke("add", Arguments::new().with("n", 5u32), |counter, args| {
                counter.add(args.take::<u32>("n").unwrap_or_default())
            })
            .unwrap();

        assert_eq!(result, 20);
    }

    #[test]
    fn test_target_error_propagates_verbatim() {
        let proxy = InterceptedProxy::new(Arc::new(Counter { base: 1 }), Arc::new(InterceptorRegistry::new()), vec![]);

        let error = proxy
            .invoke("add", Arguments::new(), |counter, _| counter.add(0))
            .unwrap_err();

        assert!(error.is_failed());
        assert_eq!(error.to_string(), "nothing to add");
    }

    #[test]
    fn test_chain_cache_is_invalidated_by_registration() {
        let registry = Arc::new(InterceptorRegistry::new());
        let proxy = InterceptedProxy::new(
            Arc::new(Counter { base: 0 }),
            Arc::clone(&registry),
            vec![InterceptorBinding::new("counted")],
        );

        let first = proxy.chain("add");
        assert!(first.is_empty());
        assert!(Arc::ptr_eq(&first, &proxy.chain("add")));

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        registry.register(
            "counted",
            Arc::new(FnInterceptor::new("counted", move |ctx| {
                counter.fetch_add(1, Ordering::SeqCst);
                ctx.proceed()
            })),
        );

        assert_eq!(proxy.chain("add").len(), 1);
        proxy
            .invoke("add", Arguments::new(), |counter, _| counter.add(1))
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invoke_async_awaits_target() {
        let proxy = InterceptedProxy::new(
            Arc::new(Counter { base: 100 }),
            doubling_registry(),
            vec![InterceptorBinding::new("double")],
        );

        let result = proxy
            .invoke_async("add_later", Arguments::new().with("n", 4u32), |counter, mut args| async move {
                tokio::task::yield_now().await;
                counter.add(args.take::<u32>("n").unwrap_or_default())
            })
            .await
            .unwrap();

        assert_eq!(result, 108);
        assert_eq!(proxy.chain("add_later").method().signature(), "Counter::add_later");
    }
}
