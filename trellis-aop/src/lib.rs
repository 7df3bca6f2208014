//! Trellis AOP：方法拦截
//!
//! - 环绕式拦截器链，支持短路、参数改写、错误转换
//! - 按绑定名称注册拦截器，绑定可以限定方法名模式
//! - 同步和异步方法统一通过 [`ReturnValue`] 返回
//! - 前置 / 返回后 / 异常 / 后置通知适配为拦截器
//! - 通过 `AopPlugin` 把拦截器注册表注册到容器

pub mod advice;
pub mod builtin;
pub mod chain;
pub mod error;
pub mod error_info;
pub mod interceptor;
pub mod invocation;
pub mod matcher;
pub mod plugin;
pub mod proxy;
pub mod registry;

pub use advice::{Advice, AdviceInterceptor, JoinPoint};
pub use builtin::{ErrorLoggingAdvice, LoggingAdvice, PerformanceAdvice};
pub use chain::{ChainEntry, InterceptorChain};
pub use error::{InterceptorChainError, InvocationResult};
pub use error_info::ErrorInfo;
pub use interceptor::{FnInterceptor, InterceptorRegistration, MethodInterceptor};
pub use invocation::{
    AnyValue, Arguments, InvocationState, MethodDescriptor, MethodInvocationContext, ReturnValue, Terminal,
};
pub use matcher::MemberMatcher;
pub use plugin::{AopPlugin, INTERCEPTOR_REGISTRY_BEAN_NAME};
pub use proxy::InterceptedProxy;
pub use registry::InterceptorRegistry;

// 导出 inventory 供宏使用
pub use inventory;

pub mod prelude {
    pub use crate::advice::{Advice, AdviceInterceptor, JoinPoint};
    pub use crate::builtin::{
        ErrorLoggingAdvice, LoggingAdvice, PerformanceAdvice, ERROR_LOGGED_BINDING, LOGGED_BINDING, TIMED_BINDING,
    };
    pub use crate::error::{InterceptorChainError, InvocationResult};
    pub use crate::error_info::ErrorInfo;
    pub use crate::interceptor::{FnInterceptor, MethodInterceptor};
    pub use crate::invocation::{Arguments, MethodDescriptor, MethodInvocationContext, ReturnValue};
    pub use crate::plugin::AopPlugin;
    pub use crate::proxy::InterceptedProxy;
    pub use crate::registry::InterceptorRegistry;
    pub use crate::submit_interceptor;
}
