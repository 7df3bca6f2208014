//! 通知（Advice）
//!
//! 前置、返回后、异常、后置通知通过 [`AdviceInterceptor`] 适配为环绕拦截器。
//! 异步方法的返回后、异常和后置通知在 future 完成后执行。

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use trellis_core::ConfigValue;

use crate::error::{InterceptorChainError, InvocationResult};
use crate::error_info::ErrorInfo;
use crate::interceptor::MethodInterceptor;
use crate::invocation::{MethodDescriptor, MethodInvocationContext, ReturnValue};

/// 连接点：被通知的方法调用
#[derive(Debug, Clone)]
pub struct JoinPoint {
    method: MethodDescriptor,
    attributes: Arc<HashMap<String, ConfigValue>>,
    started_at: Instant,
}

impl JoinPoint {
    pub fn new(method: MethodDescriptor) -> Self {
        Self {
            method,
            attributes: Arc::new(HashMap::new()),
            started_at: Instant::now(),
        }
    }

    fn from_context(ctx: &MethodInvocationContext<'_>) -> Self {
        Self {
            method: ctx.method().clone(),
            attributes: ctx
                .binding()
                .map(|b| Arc::clone(b.attributes()))
                .unwrap_or_default(),
            started_at: ctx.started_at(),
        }
    }

    pub fn method(&self) -> &MethodDescriptor {
        &self.method
    }

    pub fn signature(&self) -> String {
        self.method.signature()
    }

    /// 绑定上声明的属性
    pub fn attribute(&self, key: &str) -> Option<&ConfigValue> {
        self.attributes.get(key)
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}

/// 通知 trait，所有回调都有空的默认实现
pub trait Advice: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn order(&self) -> i32 {
        0
    }

    /// 前置通知，返回错误时不再调用目标方法
    fn before(&self, _join_point: &JoinPoint) -> anyhow::Result<()> {
        Ok(())
    }

    /// 返回后通知
    fn after_returning(&self, _join_point: &JoinPoint, _result: &(dyn Any + Send)) {}

    /// 异常通知
    fn after_throwing(&self, _join_point: &JoinPoint, _error: &ErrorInfo) {}

    /// 后置通知（无论成功还是失败都执行）
    fn after(&self, _join_point: &JoinPoint) {}
}

/// 把 [`Advice`] 适配为 [`MethodInterceptor`]
pub struct AdviceInterceptor<A> {
    advice: Arc<A>,
}

impl<A: Advice> AdviceInterceptor<A> {
    pub fn new(advice: A) -> Self {
        Self {
            advice: Arc::new(advice),
        }
    }

    pub fn advice(&self) -> &A {
        &self.advice
    }
}

impl<A: Advice + Default> Default for AdviceInterceptor<A> {
    fn default() -> Self {
        Self::new(A::default())
    }
}

impl<A: Advice> MethodInterceptor for AdviceInterceptor<A> {
    fn name(&self) -> &str {
        self.advice.name()
    }

    fn order(&self) -> i32 {
        self.advice.order()
    }

    fn intercept(&self, ctx: &mut MethodInvocationContext<'_>) -> InvocationResult<ReturnValue> {
        let join_point = JoinPoint::from_context(ctx);
        self.advice
            .before(&join_point)
            .map_err(InterceptorChainError::Failed)?;

        let advice = Arc::clone(&self.advice);
        ctx.proceed_with(move |outcome| {
            match &outcome {
                Ok(value) => advice.after_returning(&join_point, &**value),
                Err(error) => advice.after_throwing(&join_point, &ErrorInfo::from_chain_error(error)),
            }
            advice.after(&join_point);
            outcome
        })
    }
}
