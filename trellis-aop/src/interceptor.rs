//! 方法拦截器
//!
//! 拦截器采用环绕模型：在 `intercept` 中决定是否以及何时调用
//! [`MethodInvocationContext::proceed`]，可以修改参数、替换返回值、转换或吞掉错误。

use std::fmt;
use std::sync::Arc;

use crate::error::InvocationResult;
use crate::invocation::{MethodInvocationContext, ReturnValue};

/// 方法拦截器 trait
pub trait MethodInterceptor: Send + Sync {
    fn name(&self) -> &str;

    /// 执行顺序（数字越小越靠外层）
    fn order(&self) -> i32 {
        0
    }

    fn intercept(&self, ctx: &mut MethodInvocationContext<'_>) -> InvocationResult<ReturnValue>;
}

type InterceptFn = dyn Fn(&mut MethodInvocationContext<'_>) -> InvocationResult<ReturnValue> + Send + Sync;

/// 基于闭包的拦截器
pub struct FnInterceptor {
    name: String,
    order: i32,
    handler: Box<InterceptFn>,
}

impl FnInterceptor {
    pub fn new<F>(name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&mut MethodInvocationContext<'_>) -> InvocationResult<ReturnValue> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            order: 0,
            handler: Box::new(handler),
        }
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }
}

impl MethodInterceptor for FnInterceptor {
    fn name(&self) -> &str {
        &self.name
    }

    fn order(&self) -> i32 {
        self.order
    }

    fn intercept(&self, ctx: &mut MethodInvocationContext<'_>) -> InvocationResult<ReturnValue> {
        (self.handler)(ctx)
    }
}

impl fmt::Debug for FnInterceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnInterceptor")
            .field("name", &self.name)
            .field("order", &self.order)
            .finish()
    }
}

/// 拦截器注册项
///
/// 由 [`submit_interceptor!`](crate::submit_interceptor) 生成，通过 inventory 在启动时收集。
pub struct InterceptorRegistration {
    /// 绑定名称
    pub binding: &'static str,

    /// 创建拦截器实例的函数
    pub create: fn() -> Arc<dyn MethodInterceptor>,
}

impl InterceptorRegistration {
    pub fn create_instance(&self) -> Arc<dyn MethodInterceptor> {
        (self.create)()
    }
}

inventory::collect!(InterceptorRegistration);

/// 获取所有通过 inventory 提交的拦截器
pub fn interceptor_registrations() -> impl Iterator<Item = &'static InterceptorRegistration> {
    inventory::iter::<InterceptorRegistration>()
}

/// 将拦截器类型提交到全局注册表
///
/// 拦截器类型需要实现 `Default`。
///
/// ```rust,ignore
/// submit_interceptor!("retry", RetryInterceptor);
/// ```
#[macro_export]
macro_rules! submit_interceptor {
    ($binding:expr, $interceptor_type:ty) => {
        $crate::inventory::submit! {
            $crate::interceptor::InterceptorRegistration {
                binding: $binding,
                create: || {
                    ::std::sync::Arc::new(<$interceptor_type>::default())
                        as ::std::sync::Arc<dyn $crate::interceptor::MethodInterceptor>
                },
            }
        }
    };
}
