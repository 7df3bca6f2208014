//! 拦截器注册表
//!
//! 按绑定名称管理拦截器，并为某个方法组装有序的拦截链。

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use trellis_core::InterceptorBinding;

use crate::chain::{ChainEntry, InterceptorChain};
use crate::interceptor::{interceptor_registrations, MethodInterceptor};
use crate::invocation::MethodDescriptor;
use crate::matcher::MemberMatcher;

struct RegisteredInterceptor {
    binding: String,
    interceptor: Arc<dyn MethodInterceptor>,
    sequence: usize,
}

/// 拦截器注册表
///
/// 由 `AopPlugin` 注册为容器中的 Bean，也可以手动创建。
/// 每次注册都会递增版本号，代理据此丢弃缓存的拦截链。
#[derive(Default)]
pub struct InterceptorRegistry {
    entries: RwLock<Vec<RegisteredInterceptor>>,
    generation: AtomicU64,
}

impl InterceptorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 创建注册表并加载所有通过 inventory 提交的拦截器
    pub fn with_inventory() -> Self {
        let registry = Self::new();
        registry.auto_load();
        registry
    }

    /// 注册拦截器到指定绑定
    pub fn register(&self, binding: impl Into<String>, interceptor: Arc<dyn MethodInterceptor>) {
        let binding = binding.into();
        tracing::debug!(
            "Registering interceptor '{}' for binding '{}' (order: {})",
            interceptor.name(),
            binding,
            interceptor.order()
        );

        let mut entries = self.entries.write();
        let sequence = entries.len();
        entries.push(RegisteredInterceptor {
            binding,
            interceptor,
            sequence,
        });
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    /// 从 inventory 加载所有提交的拦截器，返回加载数量
    pub fn auto_load(&self) -> usize {
        let registrations: Vec<_> = interceptor_registrations().collect();
        tracing::info!("Auto-loading {} interceptor(s) from registry", registrations.len());

        for registration in &registrations {
            let interceptor = registration.create_instance();
            tracing::debug!(
                "  ├─ Loading interceptor: {} for binding: {}",
                interceptor.name(),
                registration.binding
            );
            self.register(registration.binding, interceptor);
        }

        registrations.len()
    }

    /// 指定绑定下的拦截器，按注册顺序
    pub fn interceptors_for(&self, binding: &str) -> Vec<Arc<dyn MethodInterceptor>> {
        self.entries
            .read()
            .iter()
            .filter(|e| e.binding == binding)
            .map(|e| Arc::clone(&e.interceptor))
            .collect()
    }

    /// 所有已注册的绑定名称
    pub fn bindings(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.entries
            .read()
            .iter()
            .filter(|e| seen.insert(e.binding.clone()))
            .map(|e| e.binding.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// 注册表版本号，每次注册后递增
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// 为方法组装拦截链
    ///
    /// 只包含成员模式匹配该方法的绑定；拦截器按 `order()` 升序排列，相同时按注册顺序。
    pub fn chain_for(&self, method: MethodDescriptor, bindings: &[InterceptorBinding]) -> InterceptorChain {
        let entries = self.entries.read();
        let mut selected: Vec<(i32, usize, ChainEntry)> = Vec::new();

        for binding in bindings {
            if !MemberMatcher::for_binding(binding).matches(method.method_name()) {
                continue;
            }

            let before = selected.len();
            for registered in entries.iter().filter(|e| e.binding == binding.binding()) {
                selected.push((
                    registered.interceptor.order(),
                    registered.sequence,
                    ChainEntry::new(Arc::clone(&registered.interceptor), binding.clone()),
                ));
            }
            if selected.len() == before {
                tracing::debug!(
                    "No interceptor registered for binding '{}' on {}",
                    binding.binding(),
                    method
                );
            }
        }

        selected.sort_by_key(|(order, sequence, _)| (*order, *sequence));
        let chain = InterceptorChain::new(method, selected.into_iter().map(|(_, _, e)| e).collect());
        tracing::debug!("Built interceptor chain for {}: {:?}", chain.method(), chain.interceptor_names());
        chain
    }
}

impl std::fmt::Debug for InterceptorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterceptorRegistry")
            .field("interceptors", &self.len())
            .field("bindings", &self.bindings())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interceptor::FnInterceptor;

    fn named(name: &str, order: i32) -> Arc<dyn MethodInterceptor> {
        Arc::new(FnInterceptor::new(name, |ctx| ctx.proceed()).with_order(order))
    }

    #[test]
    fn test_chain_sorted_by_order_then_registration() {
        let registry = InterceptorRegistry::new();
        registry.register("tx", named("transaction", 20));
        registry.register("audit", named("audit-first", 10));
        registry.register("audit", named("audit-second", 10));
        registry.register("retry", named("retry", 5));

        let chain = registry.chain_for(
            MethodDescriptor::new("OrderService", "place"),
            &[
                InterceptorBinding::new("tx"),
                InterceptorBinding::new("audit"),
                InterceptorBinding::new("retry"),
            ],
        );

        assert_eq!(
            chain.interceptor_names(),
            vec!["retry", "audit-first", "audit-second", "transaction"]
        );
    }

    #[test]
    fn test_chain_respects_member_patterns() {
        let registry = InterceptorRegistry::new();
        registry.register("cache", named("cache", 0));
        registry.register("logged", named("logging", 0));

        let bindings = [
            InterceptorBinding::new("cache").members("find*"),
            InterceptorBinding::new("logged"),
        ];

        let find = registry.chain_for(MethodDescriptor::new("UserService", "find_user"), &bindings);
        assert_eq!(find.interceptor_names(), vec!["cache", "logging"]);

        let save = registry.chain_for(MethodDescriptor::new("UserService", "save_user"), &bindings);
        assert_eq!(save.interceptor_names(), vec!["logging"]);
    }

    #[test]
    fn test_unknown_binding_yields_empty_chain() {
        let registry = InterceptorRegistry::new();
        let chain = registry.chain_for(
            MethodDescriptor::new("UserService", "find_user"),
            &[InterceptorBinding::new("missing")],
        );
        assert!(chain.is_empty());
    }

    #[test]
    fn test_register_bumps_generation() {
        let registry = InterceptorRegistry::new();
        let initial = registry.generation();
        registry.register("tx", named("transaction", 0));
        assert!(registry.generation() > initial);
        assert_eq!(registry.bindings(), vec!["tx".to_string()]);
        assert_eq!(registry.interceptors_for("tx").len(), 1);
    }
}
